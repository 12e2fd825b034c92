use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::models::{ConnectorKind, DecimalStyle, RowPolicy, SourceDescriptor, StalePolicy, Ttl};

pub const IST_URL: &str =
    "https://www.gov.br/anatel/pt-br/regulado/competicao/tarifas-e-precos/valores-do-ist";

/// IBGE SIDRA aggregate 1737 (IPCA), variable 2266 (número-índice, dez/93 = 100).
pub const IPCA_URL: &str = "https://servicodados.ibge.gov.br/api/v3/agregados/1737/periodos/all/variaveis/2266?localidades=N1[all]";

const ONE_DAY_SECS: u64 = 24 * 60 * 60;

// Helper macro to reduce boilerplate
macro_rules! src {
    ($id:expr, $name:expr, $kind:expr, $url:expr, $ttl:expr, $decimal:expr) => {
        SourceDescriptor {
            id: $id.to_string(),
            name: $name.to_string(),
            kind: $kind,
            location: $url.to_string(),
            ttl: $ttl,
            decimal_style: $decimal,
            row_policy: RowPolicy::Strict,
            stale_policy: StalePolicy::Fail,
            render_command: None,
        }
    };
}

// ============================================================================
// STATIC SOURCE REGISTRY (Lazy initialization, O(1) lookup)
// ============================================================================

static SOURCES: Lazy<Vec<SourceDescriptor>> = Lazy::new(|| {
    vec![
        // Anatel publishes IST as one HTML table per year inside collapsible panels
        src!(
            "ist",
            "IST - Índice de Serviços de Telecomunicações",
            ConnectorKind::RenderedPage,
            IST_URL,
            Ttl::Seconds(ONE_DAY_SECS),
            DecimalStyle::Brazilian
        ),
        src!(
            "ipca",
            "IPCA - Índice Nacional de Preços ao Consumidor Amplo",
            ConnectorKind::StatisticalApi,
            IPCA_URL,
            Ttl::Forever,
            DecimalStyle::Plain
        ),
    ]
});

static SOURCE_MAP: Lazy<HashMap<String, usize>> = Lazy::new(|| {
    SOURCES
        .iter()
        .enumerate()
        .map(|(idx, s)| (s.id.clone(), idx))
        .collect()
});

pub struct Registry;

impl Registry {
    /// Built-in sources, before any configuration overrides.
    pub fn get_all_sources() -> &'static Vec<SourceDescriptor> {
        &SOURCES
    }

    /// O(1) lookup by id
    pub fn get_descriptor(id: &str) -> Option<SourceDescriptor> {
        SOURCE_MAP
            .get(id)
            .and_then(|&idx| SOURCES.get(idx))
            .cloned()
    }
}

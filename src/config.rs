use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::models::{ConnectorKind, DecimalStyle, RowPolicy, SourceDescriptor, StalePolicy, Ttl};
use crate::sources::Registry;

pub const CONFIG_ENV: &str = "READJUST_CONFIG";
pub const TIMEOUT_ENV: &str = "READJUST_TIMEOUT_SECS";
pub const LOG_JSON_ENV: &str = "READJUST_LOG_JSON";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default)]
    pub sources: Vec<SourceOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_timeout_secs(),
            log_json: false,
            sources: Vec::new(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Per-source settings. Fields left out keep the registry defaults.
///
/// An id not in the registry defines a new source and then needs `kind`,
/// `url` and `name`.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceOverride {
    pub id: String,
    pub name: Option<String>,
    pub kind: Option<ConnectorKind>,
    pub url: Option<String>,
    pub ttl: Option<TtlSetting>,
    pub decimal_style: Option<DecimalStyle>,
    pub row_policy: Option<RowPolicy>,
    pub stale_policy: Option<StalePolicy>,
    pub render_command: Option<Vec<String>>,
}

/// `ttl = 86400` or `ttl = "forever"`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum TtlSetting {
    Seconds(u64),
    Keyword(String),
}

impl TtlSetting {
    fn resolve(&self, source_id: &str) -> Result<Ttl> {
        match self {
            TtlSetting::Seconds(secs) => Ok(Ttl::Seconds(*secs)),
            TtlSetting::Keyword(k) if k.eq_ignore_ascii_case("forever") => Ok(Ttl::Forever),
            TtlSetting::Keyword(k) => Err(EngineError::Config(format!(
                "source '{}': ttl must be a number of seconds or \"forever\", got \"{}\"",
                source_id, k
            ))),
        }
    }
}

impl Config {
    /// `.env`, then the TOML file named by `READJUST_CONFIG` (if any), then
    /// env overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
            config.fetch_timeout_secs = raw
                .trim()
                .parse()
                .map_err(|_| EngineError::Config(format!("{} must be a whole number, got '{}'", TIMEOUT_ENV, raw)))?;
        }
        if let Ok(raw) = std::env::var(LOG_JSON_ENV) {
            config.log_json = matches!(raw.trim(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        if config.fetch_timeout_secs == 0 {
            return Err(EngineError::Config("fetch_timeout_secs must be positive".to_string()));
        }
        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Registry sources with overrides applied, plus any sources defined here.
    pub fn descriptors(&self) -> Result<Vec<SourceDescriptor>> {
        let mut out: Vec<SourceDescriptor> = Registry::get_all_sources().clone();

        for o in &self.sources {
            match out.iter_mut().find(|d| d.id == o.id) {
                Some(existing) => o.apply(existing)?,
                None => out.push(o.to_new_descriptor()?),
            }
        }
        Ok(out)
    }
}

impl SourceOverride {
    fn apply(&self, d: &mut SourceDescriptor) -> Result<()> {
        if let Some(name) = &self.name {
            d.name = name.clone();
        }
        if let Some(kind) = self.kind {
            d.kind = kind;
        }
        if let Some(url) = &self.url {
            d.location = url.clone();
        }
        if let Some(ttl) = &self.ttl {
            d.ttl = ttl.resolve(&self.id)?;
        }
        if let Some(style) = self.decimal_style {
            d.decimal_style = style;
        }
        if let Some(policy) = self.row_policy {
            d.row_policy = policy;
        }
        if let Some(policy) = self.stale_policy {
            d.stale_policy = policy;
        }
        if let Some(cmd) = &self.render_command {
            d.render_command = Some(cmd.clone());
        }
        Ok(())
    }

    fn to_new_descriptor(&self) -> Result<SourceDescriptor> {
        let missing = |field: &str| {
            EngineError::Config(format!("source '{}' is not built in and has no `{}`", self.id, field))
        };

        let kind = self.kind.ok_or_else(|| missing("kind"))?;
        let mut d = SourceDescriptor {
            id: self.id.clone(),
            name: self.name.clone().ok_or_else(|| missing("name"))?,
            kind,
            location: self.url.clone().ok_or_else(|| missing("url"))?,
            ttl: Ttl::Forever,
            decimal_style: match kind {
                ConnectorKind::RenderedPage => DecimalStyle::Brazilian,
                ConnectorKind::StatisticalApi => DecimalStyle::Plain,
            },
            row_policy: RowPolicy::default(),
            stale_policy: StalePolicy::default(),
            render_command: None,
        };
        self.apply(&mut d)?;
        Ok(d)
    }
}

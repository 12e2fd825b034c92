use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ConnectorKind, RawDocument, SourceDescriptor};

pub mod rendered;
pub mod sidra;

pub use rendered::{CommandRenderer, HttpRenderer, PageRenderer, RenderedPageConnector};
pub use sidra::SidraConnector;

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Obtains raw content for a source. Connectors never retry.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, descriptor: &SourceDescriptor) -> Result<RawDocument>;
}

/// Pick the connector matching the descriptor's kind.
pub fn connector_for(descriptor: &SourceDescriptor) -> Arc<dyn SourceConnector> {
    match descriptor.kind {
        ConnectorKind::RenderedPage => Arc::new(RenderedPageConnector::for_descriptor(descriptor)),
        ConnectorKind::StatisticalApi => Arc::new(SidraConnector::new()),
    }
}

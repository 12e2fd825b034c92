use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::cache::{SeriesCache, SeriesLoader};
use super::clock::{Clock, SystemClock};
use super::readjust::compute_readjustment;
use super::series::assemble;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::fetcher::{connector_for, SourceConnector};
use crate::models::{IndexPoint, IndexSeries, Readjustment, SourceDescriptor};
use crate::parsing::extract_rows;

/// Fetch -> extract -> assemble, with the connector picked per source.
struct PipelineLoader {
    connectors: HashMap<String, Arc<dyn SourceConnector>>,
}

#[async_trait]
impl SeriesLoader for PipelineLoader {
    async fn load(&self, descriptor: &SourceDescriptor) -> Result<IndexSeries> {
        let connector = self
            .connectors
            .get(&descriptor.id)
            .ok_or_else(|| EngineError::UnknownSource(descriptor.id.clone()))?;

        // 1. Raw content
        let doc = connector.fetch(descriptor).await?;

        // 2. Schema-validated rows
        let rows = extract_rows(descriptor, &doc)?;

        // 3. Typed, ordered series
        let series = assemble(descriptor, rows)?;
        info!(
            source = %descriptor.id,
            connector = connector.name(),
            points = series.len(),
            "series built"
        );
        Ok(series)
    }
}

/// Entry point for display collaborators: period listing, point lookup and
/// readjustment over cached series.
pub struct ReadjustmentEngine {
    sources: Vec<SourceDescriptor>,
    cache: SeriesCache,
    fetch_timeout: Duration,
}

impl ReadjustmentEngine {
    /// Production wiring: configured sources, real connectors, system clock.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sources = config.descriptors()?;
        let with_connectors: Vec<(SourceDescriptor, Arc<dyn SourceConnector>)> = sources
            .into_iter()
            .map(|d| {
                let connector = connector_for(&d);
                (d, connector)
            })
            .collect();

        Ok(Self::with_connectors(
            with_connectors,
            Arc::new(SystemClock),
            config.fetch_timeout(),
        ))
    }

    pub fn with_connectors(
        sources: Vec<(SourceDescriptor, Arc<dyn SourceConnector>)>,
        clock: Arc<dyn Clock>,
        fetch_timeout: Duration,
    ) -> Self {
        let connectors = sources
            .iter()
            .map(|(d, c)| (d.id.clone(), Arc::clone(c)))
            .collect();
        let loader = Arc::new(PipelineLoader { connectors });

        Self {
            sources: sources.into_iter().map(|(d, _)| d).collect(),
            cache: SeriesCache::new(loader, clock),
            fetch_timeout,
        }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn descriptor(&self, source_id: &str) -> Result<&SourceDescriptor> {
        self.sources
            .iter()
            .find(|d| d.id == source_id)
            .ok_or_else(|| EngineError::UnknownSource(source_id.to_string()))
    }

    /// Full series, fetched under the configured timeout when not cached.
    pub async fn series(&self, source_id: &str) -> Result<Arc<IndexSeries>> {
        self.series_with_timeout(source_id, self.fetch_timeout).await
    }

    pub async fn series_with_timeout(
        &self,
        source_id: &str,
        timeout: Duration,
    ) -> Result<Arc<IndexSeries>> {
        let descriptor = self.descriptor(source_id)?;
        self.cache.get_series(descriptor, timeout).await
    }

    /// Period labels in ascending date order.
    pub async fn list_periods(&self, source_id: &str) -> Result<Vec<String>> {
        Ok(self.series(source_id).await?.labels())
    }

    /// `Ok(None)` when the label is not in the series.
    pub async fn get_point(&self, source_id: &str, period_label: &str) -> Result<Option<IndexPoint>> {
        Ok(self.series(source_id).await?.get(period_label).cloned())
    }

    pub async fn compute_readjustment(
        &self,
        source_id: &str,
        original_amount: f64,
        start_label: &str,
        end_label: &str,
    ) -> Result<Readjustment> {
        let series = self.series(source_id).await?;
        compute_readjustment(&series, original_amount, start_label, end_label)
    }

    /// Oldest and latest labels: the default start/end selection.
    pub async fn default_range(&self, source_id: &str) -> Result<(String, String)> {
        let series = self.series(source_id).await?;
        match (series.first(), series.latest()) {
            (Some(first), Some(latest)) => Ok((first.period_label.clone(), latest.period_label.clone())),
            _ => Err(EngineError::EmptySeries {
                source_id: source_id.to_string(),
            }),
        }
    }

    /// Start/end for a request, taking a missing side from `default_range`.
    /// With both sides given the series is not loaded here.
    pub async fn resolve_range(
        &self,
        source_id: &str,
        start: Option<String>,
        end: Option<String>,
    ) -> Result<(String, String)> {
        match (start, end) {
            (Some(start), Some(end)) => {
                self.descriptor(source_id)?;
                Ok((start, end))
            }
            (start, end) => {
                let (oldest, latest) = self.default_range(source_id).await?;
                Ok((start.unwrap_or(oldest), end.unwrap_or(latest)))
            }
        }
    }

    pub fn invalidate(&self, source_id: &str) {
        self.cache.invalidate(source_id);
    }
}

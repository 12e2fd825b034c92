//! Per-source series cache with TTL expiry and single-flight refresh.
//!
//! Each source has one slot holding its last good `CacheEntry` and, while a
//! refresh runs, the broadcast sender of that refresh. Callers arriving during
//! a refresh subscribe to it instead of starting their own, so there is at most
//! one fetch in flight per source and every waiter sees the same outcome.
//!
//! The refresh itself runs in a spawned task. A caller that gives up does not
//! cancel it for the others; only the timeout abandons it. The loader runs in
//! a nested task, so a panicking loader still settles the slot with a `Fetch`
//! error and clears the in-flight marker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::clock::Clock;
use crate::error::{EngineError, Result};
use crate::models::{CacheEntry, IndexSeries, SourceDescriptor, StalePolicy};

/// Runs one full fetch-extract-assemble cycle for a source.
#[async_trait]
pub trait SeriesLoader: Send + Sync {
    async fn load(&self, descriptor: &SourceDescriptor) -> Result<IndexSeries>;
}

type Outcome = Result<Arc<IndexSeries>>;

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    inflight: Option<broadcast::Sender<Outcome>>,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(|p| p.into_inner())
}

pub struct SeriesCache {
    slots: Slots,
    loader: Arc<dyn SeriesLoader>,
    clock: Arc<dyn Clock>,
}

impl SeriesCache {
    pub fn new(loader: Arc<dyn SeriesLoader>, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            loader,
            clock,
        }
    }

    /// Cached series when fresh, otherwise the result of the (shared) refresh.
    ///
    /// `timeout` bounds the refresh this call starts; callers joining an
    /// existing refresh inherit its deadline.
    pub async fn get_series(&self, descriptor: &SourceDescriptor, timeout: Duration) -> Outcome {
        let mut rx = {
            let mut slots = lock(&self.slots);
            let slot = slots.entry(descriptor.id.clone()).or_default();

            if let Some(entry) = &slot.entry {
                if entry.is_fresh(self.clock.now()) {
                    debug!(source = %descriptor.id, "cache hit");
                    return Ok(Arc::clone(&entry.series));
                }
            }

            match &slot.inflight {
                Some(tx) => {
                    debug!(source = %descriptor.id, "joining in-flight refresh");
                    tx.subscribe()
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    slot.inflight = Some(tx.clone());
                    self.spawn_refresh(descriptor.clone(), timeout, tx);
                    rx
                }
            }
        };

        rx.recv().await.unwrap_or_else(|_| {
            Err(EngineError::fetch(
                &descriptor.id,
                "refresh task ended without a result",
            ))
        })
    }

    fn spawn_refresh(
        &self,
        descriptor: SourceDescriptor,
        timeout: Duration,
        tx: broadcast::Sender<Outcome>,
    ) {
        let slots = Arc::clone(&self.slots);
        let loader = Arc::clone(&self.loader);
        let clock = Arc::clone(&self.clock);

        info!(source = %descriptor.id, timeout_ms = timeout.as_millis() as u64, "refreshing series");

        tokio::spawn(async move {
            // The load gets its own task so a panic comes back as a JoinError
            let load = {
                let descriptor = descriptor.clone();
                tokio::spawn(async move { loader.load(&descriptor).await })
            };
            let abort = load.abort_handle();

            let result = match tokio::time::timeout(timeout, load).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(EngineError::fetch(
                    &descriptor.id,
                    format!("refresh task failed: {}", join_err),
                )),
                Err(_) => {
                    abort.abort();
                    Err(EngineError::Timeout {
                        source_id: descriptor.id.clone(),
                        timeout_ms: timeout.as_millis(),
                    })
                }
            };

            let outcome = {
                let mut slots = lock(&slots);
                let slot = slots.entry(descriptor.id.clone()).or_default();
                slot.inflight = None;
                settle(slot, &descriptor, result, clock.now())
            };

            // No receivers left is fine: everyone gave up
            let _ = tx.send(outcome);
        });
    }

    /// Drop a source's entry; the next call refetches.
    pub fn invalidate(&self, source_id: &str) {
        if let Some(slot) = lock(&self.slots).get_mut(source_id) {
            slot.entry = None;
        }
    }

    /// When the current entry for a source was fetched, if there is one.
    pub fn fetched_at(&self, source_id: &str) -> Option<DateTime<Utc>> {
        lock(&self.slots)
            .get(source_id)
            .and_then(|slot| slot.entry.as_ref())
            .map(|entry| entry.fetched_at)
    }
}

/// Apply a finished refresh to the slot and decide what waiters receive.
fn settle(
    slot: &mut Slot,
    descriptor: &SourceDescriptor,
    result: Result<IndexSeries>,
    now: DateTime<Utc>,
) -> Outcome {
    match result {
        Ok(series) => {
            let series = Arc::new(series);
            info!(source = %descriptor.id, points = series.len(), "series cached");
            // Whole-entry swap; readers holding the old Arc keep a complete series
            slot.entry = Some(CacheEntry {
                series: Arc::clone(&series),
                fetched_at: now,
                ttl: descriptor.ttl,
            });
            Ok(series)
        }
        Err(e @ EngineError::Timeout { .. }) => {
            warn!(source = %descriptor.id, error = %e, "refresh timed out, entry left untouched");
            Err(e)
        }
        Err(e) => match (&slot.entry, descriptor.stale_policy) {
            (Some(stale), StalePolicy::ServeStale) => {
                warn!(
                    source = %descriptor.id,
                    error = %e,
                    fetched_at = %stale.fetched_at,
                    "refresh failed, serving stale series"
                );
                Ok(Arc::clone(&stale.series))
            }
            _ => {
                warn!(source = %descriptor.id, error = %e, "refresh failed");
                Err(e)
            }
        },
    }
}

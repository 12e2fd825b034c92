//! Readjusts contract amounts by the ratio between two points of a published
//! Brazilian index series (IST from Anatel, IPCA from IBGE).
//!
//! Series are scraped or pulled from an API, typed and ordered once per fetch
//! cycle, then kept in a per-source TTL cache shared by all requests.

pub mod config;
pub mod core;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod models;
pub mod parsing;
pub mod sources;

pub use crate::config::Config;
pub use crate::core::ReadjustmentEngine;
pub use crate::error::{EngineError, Result};
pub use crate::models::{IndexPoint, IndexSeries, Readjustment, Side, SourceDescriptor};

pub mod cache;
pub mod clock;
pub mod orchestrator;
pub mod readjust;
pub mod series;

pub use orchestrator::ReadjustmentEngine;

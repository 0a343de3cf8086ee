pub mod auth;
pub mod config;
pub mod metrics_export;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{RunMode, RunOutcome, RunReport, SyncPipeline};
pub use transform::Normalizer;

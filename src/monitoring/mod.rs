//! Observability: logging setup, Prometheus metrics, request tracing and
//! the in-memory chunking history.

pub mod chunking_stats;
pub mod config;
pub mod metrics;
pub mod trace_middleware;
pub mod tracing_config;

pub use chunking_stats::{
    chunking_logging_enabled, chunking_snapshot_history, latest_chunking_snapshot,
    record_chunking_snapshot, set_chunking_history_capacity, set_chunking_logging_enabled,
    ChunkingSnapshot,
};
pub use config::{LogFormat, MonitoringConfig};
pub use trace_middleware::{RequestId, TraceMiddleware};
pub use tracing_config::init_tracing;

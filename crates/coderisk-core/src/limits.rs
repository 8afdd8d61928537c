//! Shared operational bounds.

use std::time::Duration;

/// Lookback window for temporal (Layer-2) data.
pub const WINDOW_DAYS: i64 = 90;

/// Co-change pairs below this frequency are not materialized.
pub const CO_CHANGE_FLOOR: f64 = 0.3;

/// Investigation stops once the planner reports at least this confidence.
pub const CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Hard cap on investigation hops.
pub const MAX_HOPS: u32 = 5;

/// Token budget per investigation.
pub const TOKEN_BUDGET: u64 = 10_000;

/// A hop that moves confidence by more than this is a breakthrough.
pub const BREAKTHROUGH_DELTA: f64 = 0.2;

/// Node/edge writes are chunked to bound transaction size.
pub const GRAPH_BATCH_SIZE: usize = 100;

/// Concurrent connections into the graph backend.
pub const GRAPH_IO_POOL: usize = 16;

/// Concurrent Phase-2 investigations.
pub const AGENT_POOL: usize = 4;

pub const PHASE0_BUDGET: Duration = Duration::from_millis(50);
pub const ADAPTIVE_CONFIG_BUDGET: Duration = Duration::from_millis(10);
pub const PHASE1_TIMEOUT: Duration = Duration::from_millis(500);
pub const PHASE2_TIMEOUT: Duration = Duration::from_secs(60);
pub const GRAPH_QUERY_TIMEOUT: Duration = Duration::from_millis(50);

/// Default forge quota: 5k requests/hour.
pub const FORGE_REQUESTS_PER_HOUR: u32 = 5_000;

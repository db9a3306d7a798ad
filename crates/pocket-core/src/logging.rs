//! Structured logging setup and field schema for Pocket.
//!
//! ## Field names
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `subsystem` | `db`, `inference`, `sync`, `jobs` |
//! | `component` | e.g. `queue`, `worker`, `decider`, `conflicts`, `applier` |
//! | `op` | logical operation, e.g. `recover`, `resolve`, `apply` |
//! | `capture_id`, `schedule_id`, `item_id`, `remote_event_id` | entity ids |
//! | `action`, `retry_count`, `duration_ms`, `row_count` | queue measurements |
//! | `error` | error message when an operation fails |
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Item terminally failed, derived state left incomplete |
//! | WARN  | Recoverable issue, item scheduled for retry, remote write failed |
//! | INFO  | Lifecycle events (worker start/stop, crash reset), item completions |
//! | DEBUG | Decision points (sync decision, conflict found), config choices |
//! | TRACE | Per-poll iteration |

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// | Variable | Effect |
/// |----------|--------|
/// | `RUST_LOG` | Standard env filter, default `info` |
/// | `LOG_ANSI` | `true`/`false` override of ANSI colors |
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let mut layer = tracing_subscriber::fmt::layer();
    if let Some(ansi) = log_ansi {
        layer = layer.with_ansi(ansi);
    }

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init();
}

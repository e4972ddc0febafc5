use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Install the global tracing subscriber: pretty output for local
/// runs, JSON in production. Safe to call more than once (tests
/// initialise it from several entry points).
///
/// Subsystems log under stable targets (`cache`, `session`, `router`,
/// `scheduler`, `conflict`, `marketing`, `audit`, `performance`), so a
/// single component can be turned up via RUST_LOG, e.g.
/// `RUST_LOG=info,router=debug`.
pub fn init_tracing(json: bool) {
    LOGGER_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,redis=warn"));

        let base = fmt::layer().with_target(true);

        if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(base.json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(base.pretty())
                .init();
        }

        tracing::info!(format = if json { "json" } else { "pretty" }, "logger initialized");
    });
}

/// Await `fut`, warning under the `performance` target when it runs
/// past `threshold`. Wrapped around cache transport calls and handler
/// dispatch, so a degrading collaborator shows up in the logs before
/// it starts tripping timeouts.
pub async fn warn_if_slow<F, T>(label: &'static str, threshold: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(
            target: "performance",
            label,
            threshold_ms = threshold.as_millis() as u64,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow call"
        );
    }
    out
}

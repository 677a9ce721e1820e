//! Tracing setup for binaries and integration tests.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise `default_directive`
/// (for example `"info,stageflow=debug"`). Returns quietly if a subscriber
/// is already installed, so tests can call this freely.
pub fn init_tracing(default_directive: &str) {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

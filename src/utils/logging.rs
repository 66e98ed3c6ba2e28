//! Diagnostic logging for the binary. Library code only emits `tracing`
//! events; installing a subscriber is left to whoever owns `main`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. Our own crate gets the chosen
/// level; everything else stays at `warn`.
pub fn default_directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    format!("warn,manuscript_sync={level}")
}

/// Install a stderr subscriber. `RUST_LOG` overrides the verbosity flag.
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(verbosity: u8) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .is_ok()
}

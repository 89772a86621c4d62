//! Logging setup.
//!
//! Structured logging via `tracing`. Noisy transport libraries are clamped
//! to `warn` so business logs stay readable at `info`; `RUST_LOG` overrides
//! everything when set.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Modules clamped to `warn` by default. These produce high-volume
/// debug/trace output (connection pools, TLS handshakes, WebSocket frames)
/// with little business context.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tungstenite",
    "tokio_tungstenite",
];

fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = String::from(log_level);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{module}=warn"));
    }

    EnvFilter::new(&directives)
}

/// Initialize logging with the given base level and format (`pretty` or
/// `json`).
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);
    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        "Logging initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noisy_modules_cover_the_transports() {
        assert!(NOISY_MODULES.contains(&"reqwest"));
        assert!(NOISY_MODULES.contains(&"tungstenite"));
    }

    #[test]
    fn init_is_idempotent() {
        init_logging("info", "pretty");
        init_logging("debug", "json"); // second call must not panic
    }
}

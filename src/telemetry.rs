//! Tracing setup and span constructors.

use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
pub fn init(default_level: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Span constructors for structured tracing.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span covering one session's loops.
    pub fn session(server: &str, nick: &str) -> Span {
        info_span!("session", server = %server, nick = %nick)
    }

    /// Span covering one connect attempt of the retry wrapper.
    pub fn attempt(server: &str, attempt: u32) -> Span {
        info_span!("attempt", server = %server, attempt)
    }
}

//! Process-wide logging set-up.
//!
//! Binaries call [`init_tracing`] once at start-up. Output goes through the usual
//! `EnvFilter` + fmt layer, with a [`SuppressionFilter`] on the fmt layer that drops events
//! below a minimum severity or whose message matches a known-noise pattern (for example a
//! flaky upstream's quota warnings).

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Metadata};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::{Context, Filter, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log directive: {0}")]
    Directive(#[from] ParseError),
    #[error("failed to install log subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Per-layer filter on severity and message text.
///
/// Patterns match case-insensitively anywhere in the event's message.
#[derive(Clone, Debug)]
pub struct SuppressionFilter {
    min_level: Level,
    patterns: Vec<String>,
}

impl SuppressionFilter {
    pub fn new(min_level: Level, patterns: impl IntoIterator<Item = String>) -> Self {
        Self {
            min_level,
            patterns: patterns
                .into_iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn suppresses(&self, message: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let message = message.to_lowercase();
        self.patterns.iter().any(|p| message.contains(p.as_str()))
    }
}

impl Default for SuppressionFilter {
    fn default() -> Self {
        Self::new(Level::INFO, Vec::new())
    }
}

impl<S> Filter<S> for SuppressionFilter {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        *meta.level() <= self.min_level
    }

    fn event_enabled(&self, event: &Event<'_>, _cx: &Context<'_, S>) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        !self.suppresses(&visitor.message)
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_owned();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

/// Targets of the portal's own crates and binaries.
pub const PORTAL_LOG_TARGETS: &[&str] = &[
    "portal_core",
    "portal_files",
    "api_shared",
    "api_rest",
    "portal_api_rest",
    "portal_run",
];

/// Directive enabling the portal's targets at `level` and everything else at WARN.
pub fn default_directive(level: Level) -> String {
    let level = level.to_string().to_ascii_lowercase();
    let mut directives = vec!["warn".to_owned()];
    directives.extend(PORTAL_LOG_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Filter from `rust_log` (the value of `RUST_LOG`) when set, else from `default_directive`.
pub fn env_filter(rust_log: Option<&str>, default_directive: &str) -> Result<EnvFilter, LoggingError> {
    let directives = rust_log
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default_directive);
    Ok(EnvFilter::try_new(directives)?)
}

/// Installs the global subscriber.
///
/// `default_directive` (e.g. `"portal_core=warn"`) applies only when `RUST_LOG` is unset.
pub fn init_tracing(default_directive: &str, suppression: SuppressionFilter) -> Result<(), LoggingError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = env_filter(rust_log.as_deref(), default_directive)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_filter(suppression))
        .try_init()?;
    Ok(())
}

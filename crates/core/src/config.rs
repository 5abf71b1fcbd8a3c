//! Core runtime configuration.
//!
//! Configuration is resolved once at process start-up and passed into the core services.
//! Binaries read the environment and hand the raw values to the `*_from_env_value` helpers
//! here; nothing in the core reads environment variables while serving a request.

use crate::constants::{
    DEFAULT_EVALUATOR_TIMEOUT, DEFAULT_POLL_INTERVAL, FACILITIES_DIR_NAME,
    MODIFICATION_NOTIFY_WINDOW, PATIENTS_DIR_NAME,
};
use crate::{PortalError, PortalResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for the external urgency evaluator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// When false the evaluator is never called and classification goes straight to the
    /// keyword fallback.
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            timeout: DEFAULT_EVALUATOR_TIMEOUT,
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    evaluator: EvaluatorConfig,
    poll_interval: Duration,
    notify_window: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::InvalidInput`] if `poll_interval` is zero or the evaluator is
    /// enabled without an endpoint.
    pub fn new(
        data_dir: PathBuf,
        evaluator: EvaluatorConfig,
        poll_interval: Duration,
    ) -> PortalResult<Self> {
        if poll_interval.is_zero() {
            return Err(PortalError::InvalidInput(
                "poll interval must be greater than zero".into(),
            ));
        }
        if evaluator.enabled && evaluator.endpoint.is_none() {
            return Err(PortalError::InvalidInput(
                "urgency evaluator is enabled but no endpoint is configured".into(),
            ));
        }

        Ok(Self {
            data_dir,
            evaluator,
            poll_interval,
            notify_window: MODIFICATION_NOTIFY_WINDOW,
        })
    }

    /// Configuration with the evaluator disabled and default intervals.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            evaluator: EvaluatorConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            notify_window: MODIFICATION_NOTIFY_WINDOW,
        }
    }

    pub fn with_notify_window(mut self, window: Duration) -> Self {
        self.notify_window = window;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn patients_dir(&self) -> PathBuf {
        self.data_dir.join(PATIENTS_DIR_NAME)
    }

    pub fn facilities_dir(&self) -> PathBuf {
        self.data_dir.join(FACILITIES_DIR_NAME)
    }

    pub fn evaluator(&self) -> &EvaluatorConfig {
        &self.evaluator
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn notify_window(&self) -> Duration {
        self.notify_window
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a boolean flag such as `TRIAGE_AI_ENABLED`. Missing or blank means `false`.
pub fn flag_from_env_value(name: &str, value: Option<String>) -> PortalResult<bool> {
    match non_blank(value).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(PortalError::InvalidInput(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

/// Build the evaluator settings from raw environment values.
///
/// `timeout_ms` defaults to five seconds when missing.
pub fn evaluator_config_from_env_values(
    enabled: Option<String>,
    endpoint: Option<String>,
    timeout_ms: Option<String>,
) -> PortalResult<EvaluatorConfig> {
    let enabled = flag_from_env_value("TRIAGE_AI_ENABLED", enabled)?;
    let endpoint = non_blank(endpoint);
    let timeout = match non_blank(timeout_ms) {
        None => DEFAULT_EVALUATOR_TIMEOUT,
        Some(raw) => raw.parse::<u64>().map(Duration::from_millis).map_err(|_| {
            PortalError::InvalidInput(format!(
                "TRIAGE_AI_TIMEOUT_MS must be a whole number of milliseconds, got '{raw}'"
            ))
        })?,
    };

    Ok(EvaluatorConfig {
        enabled,
        endpoint,
        timeout,
    })
}

/// Parse the poll interval in seconds. Missing or blank means the 30 second default.
pub fn poll_interval_from_env_value(value: Option<String>) -> PortalResult<Duration> {
    match non_blank(value) {
        None => Ok(DEFAULT_POLL_INTERVAL),
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) | Err(_) => Err(PortalError::InvalidInput(format!(
                "PORTAL_POLL_INTERVAL_SECS must be a positive whole number, got '{raw}'"
            ))),
            Ok(secs) => Ok(Duration::from_secs(secs)),
        },
    }
}

/// Split a comma-separated list of log message patterns to suppress.
pub fn suppressed_patterns_from_env_value(value: Option<String>) -> Vec<String> {
    non_blank(value)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse the minimum log severity (`PORTAL_LOG_LEVEL`). Missing or blank means `info`.
pub fn log_level_from_env_value(value: Option<String>) -> PortalResult<tracing::Level> {
    match non_blank(value) {
        None => Ok(tracing::Level::INFO),
        Some(raw) => raw.parse().map_err(|_| {
            PortalError::InvalidInput(format!(
                "PORTAL_LOG_LEVEL must be one of error, warn, info, debug, trace, got '{raw}'"
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(log_level_from_env_value(None).unwrap(), tracing::Level::INFO);
        assert_eq!(
            log_level_from_env_value(Some("WARN".into())).unwrap(),
            tracing::Level::WARN
        );
        assert!(log_level_from_env_value(Some("loud".into())).is_err());
    }

    #[test]
    fn test_flag_parsing() {
        assert!(!flag_from_env_value("X", None).unwrap());
        assert!(!flag_from_env_value("X", Some("  ".into())).unwrap());
        assert!(flag_from_env_value("X", Some("TRUE".into())).unwrap());
        assert!(!flag_from_env_value("X", Some("off".into())).unwrap());
        assert!(flag_from_env_value("X", Some("maybe".into())).is_err());
    }

    #[test]
    fn test_evaluator_config_defaults_to_disabled() {
        let cfg = evaluator_config_from_env_values(None, None, None).unwrap();
        assert_eq!(cfg, EvaluatorConfig::default());
    }

    #[test]
    fn test_evaluator_config_parses_timeout() {
        let cfg = evaluator_config_from_env_values(
            Some("true".into()),
            Some("http://triage.local/evaluate".into()),
            Some("250".into()),
        )
        .unwrap();

        assert!(cfg.enabled);
        assert_eq!(cfg.timeout, Duration::from_millis(250));
        assert!(evaluator_config_from_env_values(None, None, Some("soon".into())).is_err());
    }

    #[test]
    fn test_core_config_rejects_enabled_evaluator_without_endpoint() {
        let evaluator = EvaluatorConfig {
            enabled: true,
            ..EvaluatorConfig::default()
        };
        let result = CoreConfig::new(PathBuf::from("data"), evaluator, DEFAULT_POLL_INTERVAL);

        assert!(matches!(result, Err(PortalError::InvalidInput(_))));
    }

    #[test]
    fn test_core_config_paths() {
        let cfg = CoreConfig::with_data_dir(PathBuf::from("/srv/portal"));
        assert_eq!(cfg.patients_dir(), PathBuf::from("/srv/portal/patients"));
        assert_eq!(cfg.facilities_dir(), PathBuf::from("/srv/portal/facilities"));
        assert_eq!(cfg.notify_window(), MODIFICATION_NOTIFY_WINDOW);
    }

    #[test]
    fn test_poll_interval_rejects_zero() {
        assert_eq!(
            poll_interval_from_env_value(None).unwrap(),
            DEFAULT_POLL_INTERVAL
        );
        assert_eq!(
            poll_interval_from_env_value(Some("5".into())).unwrap(),
            Duration::from_secs(5)
        );
        assert!(poll_interval_from_env_value(Some("0".into())).is_err());
    }

    #[test]
    fn test_suppressed_patterns_split() {
        assert_eq!(
            suppressed_patterns_from_env_value(Some("quota exceeded, ,ResizeObserver".into())),
            vec!["quota exceeded".to_string(), "ResizeObserver".to_string()]
        );
        assert!(suppressed_patterns_from_env_value(None).is_empty());
    }
}

//! Start-up settings read from the process environment.
//!
//! # Environment Variables
//! - `PORTAL_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
//! - `PORTAL_DATA_DIR`: Directory holding patient and facility records (default: "portal_data")
//! - `PORTAL_POLL_INTERVAL_SECS`: Appointment poll interval for the refresh feed (default: 30)
//! - `TRIAGE_AI_ENABLED`, `TRIAGE_AI_ENDPOINT`, `TRIAGE_AI_TIMEOUT_MS`: external urgency evaluator
//! - `PORTAL_LOG_LEVEL`: minimum log severity (default: "info")
//! - `PORTAL_LOG_SUPPRESS`: comma-separated message fragments to drop from the log
//! - `API_KEY`: key required by privileged endpoints such as `/migration/run`

use anyhow::Context;
use portal_core::config::{
    evaluator_config_from_env_values, log_level_from_env_value, poll_interval_from_env_value,
    suppressed_patterns_from_env_value,
};
use portal_core::constants::DEFAULT_PORTAL_DATA_DIR;
use portal_core::logging::{default_directive, SuppressionFilter};
use portal_core::triage::evaluator_from_config;
use portal_core::{CoreConfig, TriageService};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub rest_addr: String,
    pub cfg: Arc<CoreConfig>,
    pub api_key: Option<String>,
    pub log_level: tracing::Level,
    pub suppressed: Vec<String>,
}

impl ServerSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the settings from an arbitrary variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let rest_addr = var("PORTAL_REST_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into());
        let data_dir = var("PORTAL_DATA_DIR")
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PORTAL_DATA_DIR.into());

        let evaluator = evaluator_config_from_env_values(
            var("TRIAGE_AI_ENABLED"),
            var("TRIAGE_AI_ENDPOINT"),
            var("TRIAGE_AI_TIMEOUT_MS"),
        )?;
        let poll_interval = poll_interval_from_env_value(var("PORTAL_POLL_INTERVAL_SECS"))?;
        let cfg = CoreConfig::new(PathBuf::from(&data_dir), evaluator, poll_interval)
            .with_context(|| format!("invalid configuration for data dir {data_dir}"))?;

        Ok(Self {
            rest_addr,
            cfg: Arc::new(cfg),
            api_key: var("API_KEY").filter(|k| !k.is_empty()),
            log_level: log_level_from_env_value(var("PORTAL_LOG_LEVEL"))?,
            suppressed: suppressed_patterns_from_env_value(var("PORTAL_LOG_SUPPRESS")),
        })
    }

    /// Log directive used when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> String {
        default_directive(self.log_level)
    }

    pub fn suppression(&self) -> SuppressionFilter {
        SuppressionFilter::new(self.log_level, self.suppressed.clone())
    }

    pub fn triage(&self) -> TriageService {
        TriageService::new(evaluator_from_config(self.cfg.evaluator()))
    }
}

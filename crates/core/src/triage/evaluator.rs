//! External urgency evaluation.
//!
//! The evaluator is a collaborator behind [`UrgencyEvaluator`]. Its failures are never
//! fatal: [`super::TriageService`] logs them and falls back to keyword matching.

use crate::config::EvaluatorConfig;
use crate::model::{Appointment, AppointmentStatus, UrgencyLevel, UrgencyResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Appointment fields sent for evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EvaluationRequest {
    pub id: String,
    pub notes: String,
    #[serde(rename = "type")]
    pub appointment_type: String,
    pub status: AppointmentStatus,
    pub date: NaiveDate,
    pub time: String,
}

impl From<&Appointment> for EvaluationRequest {
    fn from(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id.clone(),
            notes: appointment.notes.clone(),
            appointment_type: appointment.appointment_type.clone(),
            status: appointment.status,
            date: appointment.date,
            time: appointment.time.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("urgency evaluator is disabled")]
    Disabled,
    #[error("failed to build evaluator client: {0}")]
    Client(reqwest::Error),
    #[error("evaluator request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("evaluator returned HTTP {0}")]
    Status(u16),
    #[error("evaluator returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait UrgencyEvaluator: Send + Sync {
    /// When false the triage service skips the call entirely.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn evaluate(&self, request: &EvaluationRequest) -> Result<UrgencyResult, EvaluatorError>;
}

/// Evaluator used when the feature flag is off.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledEvaluator;

#[async_trait]
impl UrgencyEvaluator for DisabledEvaluator {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn evaluate(&self, _request: &EvaluationRequest) -> Result<UrgencyResult, EvaluatorError> {
        Err(EvaluatorError::Disabled)
    }
}

#[derive(Deserialize)]
struct EvaluationResponse {
    level: String,
    #[serde(default)]
    urgency: Option<String>,
}

/// Posts [`EvaluationRequest`] as JSON and expects `{ "level": .., "urgency": .. }` back.
#[derive(Clone, Debug)]
pub struct HttpUrgencyEvaluator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUrgencyEvaluator {
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> Result<Self, EvaluatorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EvaluatorError::Client)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl UrgencyEvaluator for HttpUrgencyEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<UrgencyResult, EvaluatorError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EvaluatorError::Status(status.as_u16()));
        }

        let body: EvaluationResponse = response
            .json()
            .await
            .map_err(|e| EvaluatorError::InvalidResponse(e.to_string()))?;

        parse_response(body)
    }
}

fn parse_response(body: EvaluationResponse) -> Result<UrgencyResult, EvaluatorError> {
    let level: UrgencyLevel = body.level.parse().map_err(EvaluatorError::InvalidResponse)?;
    let urgency = body
        .urgency
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| level.label().to_owned());

    Ok(UrgencyResult { level, urgency })
}

/// Picks the evaluator implied by the configuration.
pub fn evaluator_from_config(cfg: &EvaluatorConfig) -> Arc<dyn UrgencyEvaluator> {
    match (cfg.enabled, cfg.endpoint.as_deref()) {
        (true, Some(endpoint)) => match HttpUrgencyEvaluator::new(endpoint, cfg.timeout) {
            Ok(evaluator) => {
                tracing::info!(endpoint, "urgency evaluator enabled");
                Arc::new(evaluator)
            }
            Err(e) => {
                tracing::warn!("urgency evaluator unavailable, using keyword triage: {e}");
                Arc::new(DisabledEvaluator)
            }
        },
        (true, None) => {
            tracing::warn!("urgency evaluator enabled without endpoint, using keyword triage");
            Arc::new(DisabledEvaluator)
        }
        (false, _) => Arc::new(DisabledEvaluator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_uses_evaluator_label() {
        let result = parse_response(EvaluationResponse {
            level: "orange".into(),
            urgency: Some("URGENT - SAME DAY".into()),
        })
        .unwrap();

        assert_eq!(result.level, UrgencyLevel::Orange);
        assert_eq!(result.urgency, "URGENT - SAME DAY");
    }

    #[test]
    fn test_parse_response_defaults_label() {
        let result = parse_response(EvaluationResponse {
            level: "RED".into(),
            urgency: None,
        })
        .unwrap();

        assert_eq!(result.urgency, "CRITICAL");
    }

    #[test]
    fn test_parse_response_rejects_unknown_level() {
        let result = parse_response(EvaluationResponse {
            level: "PURPLE".into(),
            urgency: None,
        });

        assert!(matches!(result, Err(EvaluatorError::InvalidResponse(_))));
    }

    #[test]
    fn test_evaluator_from_config_disabled() {
        let evaluator = evaluator_from_config(&EvaluatorConfig::default());
        assert!(!evaluator.is_enabled());
    }
}

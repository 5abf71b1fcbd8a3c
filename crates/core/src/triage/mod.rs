//! Appointment urgency triage.
//!
//! Classification order for one appointment:
//!
//! 1. a stored `urgency.level` is returned unchanged
//! 2. a memoised result for the same id and text
//! 3. the external evaluator, when enabled
//! 4. keyword matching over notes and type
//!
//! Evaluator failures are logged and swallowed; callers always get a result.

mod cache;
mod evaluator;
mod keywords;

pub use cache::UrgencyCache;
pub use evaluator::{
    evaluator_from_config, DisabledEvaluator, EvaluationRequest, EvaluatorError,
    HttpUrgencyEvaluator, UrgencyEvaluator,
};
pub use keywords::{classify_by_keywords, ORANGE_KEYWORDS, RED_KEYWORDS};

use crate::model::{Appointment, ClassifiedAppointment, Urgency, UrgencyResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Clone)]
pub struct TriageService {
    evaluator: Arc<dyn UrgencyEvaluator>,
    cache: UrgencyCache,
}

impl std::fmt::Debug for TriageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageService")
            .field("evaluator_enabled", &self.evaluator.is_enabled())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl TriageService {
    pub fn new(evaluator: Arc<dyn UrgencyEvaluator>) -> Self {
        Self {
            evaluator,
            cache: UrgencyCache::new(),
        }
    }

    /// Keyword-only triage.
    pub fn keyword_only() -> Self {
        Self::new(Arc::new(DisabledEvaluator))
    }

    pub fn cache(&self) -> &UrgencyCache {
        &self.cache
    }

    /// Same evaluator, separate memo cache.
    ///
    /// For callers whose appointment ids should not share or trim the caller's cache,
    /// such as a refresh feed or one-off classification of client-supplied appointments.
    pub fn with_own_cache(&self) -> Self {
        Self {
            evaluator: self.evaluator.clone(),
            cache: UrgencyCache::new(),
        }
    }

    /// Classifies one appointment. Never fails.
    pub async fn classify_urgency(&self, appointment: &Appointment) -> UrgencyResult {
        if let Some(stored) = &appointment.urgency {
            return stored_result(stored);
        }

        if let Some(hit) = self.cache.get(appointment) {
            return hit;
        }

        let result = match self.evaluate_external(appointment).await {
            Some(result) => result,
            None => classify_by_keywords(&appointment.notes, &appointment.appointment_type),
        };

        self.cache.insert(appointment, result.clone());
        result
    }

    /// Classifies a batch concurrently.
    ///
    /// Every appointment id in `appointments` is present in the returned map. A task that
    /// dies (for example an evaluator panic) leaves its appointment as GREEN/ROUTINE.
    pub async fn classify_batch(&self, appointments: &[Appointment]) -> HashMap<String, UrgencyResult> {
        let mut tasks = JoinSet::new();
        for appointment in appointments {
            let service = self.clone();
            let appointment = appointment.clone();
            tasks.spawn(async move {
                let result = service.classify_urgency(&appointment).await;
                (appointment.id, result)
            });
        }

        let mut results = HashMap::with_capacity(appointments.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, result)) => {
                    results.insert(id, result);
                }
                Err(e) => tracing::error!("triage task failed: {e}"),
            }
        }

        for appointment in appointments {
            results
                .entry(appointment.id.clone())
                .or_insert_with(UrgencyResult::routine);
        }

        results
    }

    /// Classifies a batch and pairs each appointment with its result, preserving order.
    pub async fn annotate(&self, appointments: Vec<Appointment>) -> Vec<ClassifiedAppointment> {
        let results = self.classify_batch(&appointments).await;
        appointments
            .into_iter()
            .map(|appointment| {
                let triage = results
                    .get(&appointment.id)
                    .cloned()
                    .unwrap_or_else(UrgencyResult::routine);
                ClassifiedAppointment {
                    appointment,
                    triage,
                }
            })
            .collect()
    }

    async fn evaluate_external(&self, appointment: &Appointment) -> Option<UrgencyResult> {
        if !self.evaluator.is_enabled() {
            return None;
        }

        let request = EvaluationRequest::from(appointment);
        match self.evaluator.evaluate(&request).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(
                    appointment_id = %appointment.id,
                    "urgency evaluation failed, using keyword triage: {e}"
                );
                None
            }
        }
    }
}

fn stored_result(stored: &Urgency) -> UrgencyResult {
    let label = stored.description.trim();
    UrgencyResult {
        level: stored.level,
        urgency: if label.is_empty() {
            stored.level.label().to_owned()
        } else {
            label.to_owned()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AppointmentStatus, UrgencyLevel};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEvaluator {
        level: UrgencyLevel,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UrgencyEvaluator for FixedEvaluator {
        async fn evaluate(&self, _request: &EvaluationRequest) -> Result<UrgencyResult, EvaluatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(UrgencyResult {
                level: self.level,
                urgency: "FROM EVALUATOR".into(),
            })
        }
    }

    /// Switched off, but counts any call that slips through.
    #[derive(Default)]
    struct SwitchedOffEvaluator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UrgencyEvaluator for SwitchedOffEvaluator {
        fn is_enabled(&self) -> bool {
            false
        }

        async fn evaluate(&self, _request: &EvaluationRequest) -> Result<UrgencyResult, EvaluatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(UrgencyResult::from_level(UrgencyLevel::Red))
        }
    }

    struct FailingEvaluator;

    #[async_trait]
    impl UrgencyEvaluator for FailingEvaluator {
        async fn evaluate(&self, _request: &EvaluationRequest) -> Result<UrgencyResult, EvaluatorError> {
            Err(EvaluatorError::Status(429))
        }
    }

    struct PanickingEvaluator;

    #[async_trait]
    impl UrgencyEvaluator for PanickingEvaluator {
        async fn evaluate(&self, request: &EvaluationRequest) -> Result<UrgencyResult, EvaluatorError> {
            if request.id == "boom" {
                panic!("malformed appointment");
            }
            Err(EvaluatorError::Status(500))
        }
    }

    fn appointment(id: &str, notes: &str, kind: &str) -> Appointment {
        let mut appt = Appointment::new(
            id,
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            AppointmentStatus::Pending,
        );
        appt.notes = notes.into();
        appt.appointment_type = kind.into();
        appt
    }

    #[tokio::test]
    async fn test_disabled_evaluator_uses_keywords() {
        let triage = TriageService::keyword_only();
        let appt = appointment("a1", "severe chest pain and shortness of breath", "emergency");

        let result = triage.classify_urgency(&appt).await;

        assert_eq!(result.level, UrgencyLevel::Red);
        assert_eq!(result.urgency, "CRITICAL");
    }

    #[tokio::test]
    async fn test_switched_off_evaluator_is_never_called() {
        let evaluator = Arc::new(SwitchedOffEvaluator::default());
        let triage = TriageService::new(evaluator.clone());
        let appt = appointment("a1", "routine follow-up", "checkup");

        let result = triage.classify_urgency(&appt).await;
        triage.classify_batch(&[appointment("a2", "rash", "consultation")]).await;

        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.level, UrgencyLevel::Green);
    }

    #[tokio::test]
    async fn test_own_cache_is_separate() {
        let triage = TriageService::keyword_only();
        let feed = triage.with_own_cache();

        feed.classify_urgency(&appointment("a1", "fever", "consultation")).await;

        assert_eq!(feed.cache().len(), 1);
        assert!(triage.cache().is_empty());
    }

    #[tokio::test]
    async fn test_stored_urgency_is_returned_unchanged() {
        let evaluator = Arc::new(FixedEvaluator {
            level: UrgencyLevel::Red,
            calls: AtomicUsize::new(0),
        });
        let triage = TriageService::new(evaluator.clone());
        let mut appt = appointment("a1", "chest pain", "emergency");
        appt.urgency = Some(Urgency {
            level: UrgencyLevel::Green,
            description: "ROUTINE".into(),
        });

        let result = triage.classify_urgency(&appt).await;

        assert_eq!(result.level, UrgencyLevel::Green);
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stored_urgency_without_description_gets_label() {
        let triage = TriageService::keyword_only();
        let mut appt = appointment("a1", "", "");
        appt.urgency = Some(Urgency {
            level: UrgencyLevel::Orange,
            description: String::new(),
        });

        assert_eq!(triage.classify_urgency(&appt).await.urgency, "VERY URGENT");
    }

    #[tokio::test]
    async fn test_evaluator_result_is_used_and_memoised() {
        let evaluator = Arc::new(FixedEvaluator {
            level: UrgencyLevel::Orange,
            calls: AtomicUsize::new(0),
        });
        let triage = TriageService::new(evaluator.clone());
        let appt = appointment("a1", "annual checkup", "checkup");

        let first = triage.classify_urgency(&appt).await;
        let second = triage.classify_urgency(&appt).await;

        assert_eq!(first.urgency, "FROM EVALUATOR");
        assert_eq!(first, second);
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evaluator_failure_falls_back_to_keywords() {
        let triage = TriageService::new(Arc::new(FailingEvaluator));
        let appt = appointment("a1", "high fever for 3 days", "consultation");

        let result = triage.classify_urgency(&appt).await;

        assert_eq!(result.level, UrgencyLevel::Orange);
        assert_eq!(result.urgency, "VERY URGENT");
    }

    #[tokio::test]
    async fn test_batch_covers_every_appointment_even_on_panic() {
        let triage = TriageService::new(Arc::new(PanickingEvaluator));
        let batch = vec![
            appointment("boom", "cardiac arrest", "emergency"),
            appointment("ok", "kidney stone", "consultation"),
        ];

        let results = triage.classify_batch(&batch).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["boom"], UrgencyResult::routine());
        assert_eq!(results["ok"].level, UrgencyLevel::Orange);
    }

    #[tokio::test]
    async fn test_annotate_preserves_order() {
        let triage = TriageService::keyword_only();
        let batch = vec![
            appointment("b", "annual checkup", "checkup"),
            appointment("a", "overdose", "emergency"),
        ];

        let annotated = triage.annotate(batch).await;

        assert_eq!(annotated[0].appointment.id, "b");
        assert_eq!(annotated[0].triage.level, UrgencyLevel::Green);
        assert_eq!(annotated[1].triage.level, UrgencyLevel::Red);
    }
}

//! Detection of recent facility edits to a patient's appointments.
//!
//! Each fetched list is scanned for appointments last touched by the facility whose newest
//! audit entry falls inside the notification window. There is no persisted "already
//! notified" marker: a list re-read inside the window announces the same edit again, and the
//! window closing is what stops it.

use crate::constants::{DEFAULT_FACILITY_NAME, MODIFICATION_NOTIFY_WINDOW};
use crate::model::{Appointment, FieldChange, Party};
use crate::notify::{NotificationKind, Notifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub appointment_id: String,
    pub facility_name: String,
    pub message: String,
    pub kind: NotificationKind,
}

/// [`detect_modifications_within`] with the standard five minute window.
pub fn detect_modifications(appointments: &[Appointment], now: DateTime<Utc>) -> Vec<NotificationEvent> {
    detect_modifications_within(appointments, now, MODIFICATION_NOTIFY_WINDOW)
}

pub fn detect_modifications_within(
    appointments: &[Appointment],
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<NotificationEvent> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);

    appointments
        .iter()
        .filter(|appointment| appointment.updated_by == Some(Party::Facility))
        .filter_map(|appointment| {
            let entry = appointment.last_modification()?;
            if now.signed_duration_since(entry.timestamp) >= window {
                return None;
            }

            let summary = summarise_changes(entry.changes.iter());
            if summary.is_empty() {
                return None;
            }

            let facility_name = appointment
                .facility_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_FACILITY_NAME)
                .to_owned();

            Some(NotificationEvent {
                appointment_id: appointment.id.clone(),
                message: format!("Your appointment has been updated by {facility_name}: {summary}"),
                facility_name,
                kind: NotificationKind::Info,
            })
        })
        .collect()
}

/// Sends each event through `notifier`.
pub fn announce(events: &[NotificationEvent], notifier: &dyn Notifier) {
    for event in events {
        notifier.notify(&event.message, event.kind);
    }
}

/// `field: from → to` for every real change, joined by `", "`.
fn summarise_changes<'a>(changes: impl Iterator<Item = (&'a String, &'a FieldChange)>) -> String {
    changes
        .filter(|(_, change)| !change.is_noop())
        .map(|(field, change)| {
            format!(
                "{field}: {} → {}",
                display_value(&change.from),
                display_value(&change.to)
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "none".to_owned(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AppointmentStatus, ModificationEntry};
    use crate::notify::MemoryNotifier;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn modified(id: &str, at: DateTime<Utc>, changes: &[(&str, serde_json::Value, serde_json::Value)]) -> Appointment {
        let mut appt = Appointment::new(
            id,
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            AppointmentStatus::Confirmed,
        );
        appt.updated_by = Some(Party::Facility);
        appt.modification_history.push(ModificationEntry {
            timestamp: at,
            modified_by: Party::Facility,
            changes: changes
                .iter()
                .map(|(field, from, to)| {
                    (
                        field.to_string(),
                        FieldChange {
                            from: from.clone(),
                            to: to.clone(),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        });
        appt
    }

    #[test]
    fn test_recent_facility_edit_produces_one_event() {
        let now = Utc::now();
        let appt = modified("a1", now, &[("status", json!("scheduled"), json!("confirmed"))]);

        let events = detect_modifications(&[appt], now);

        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("status: scheduled → confirmed"));
        assert_eq!(events[0].facility_name, "the healthcare facility");
    }

    #[test]
    fn test_stale_edit_is_not_announced() {
        let now = Utc::now();
        let appt = modified(
            "a1",
            now - chrono::Duration::minutes(10),
            &[("status", json!("scheduled"), json!("confirmed"))],
        );

        assert!(detect_modifications(&[appt], now).is_empty());
    }

    #[test]
    fn test_only_the_last_entry_counts() {
        let now = Utc::now();
        let mut appt = modified("a1", now, &[("time", json!("09:00"), json!("10:00"))]);
        appt.modification_history.push(ModificationEntry {
            timestamp: now - chrono::Duration::minutes(30),
            modified_by: Party::Facility,
            changes: BTreeMap::new(),
        });

        assert!(detect_modifications(&[appt], now).is_empty());
    }

    #[test]
    fn test_patient_edits_and_empty_history_are_ignored() {
        let now = Utc::now();
        let mut by_patient = modified("a1", now, &[("time", json!("09:00"), json!("10:00"))]);
        by_patient.updated_by = Some(Party::Patient);

        let mut no_history = modified("a2", now, &[]);
        no_history.modification_history.clear();

        assert!(detect_modifications(&[by_patient, no_history], now).is_empty());
    }

    #[test]
    fn test_unchanged_fields_are_skipped_and_facility_named() {
        let now = Utc::now();
        let mut appt = modified(
            "a1",
            now - chrono::Duration::minutes(2),
            &[
                ("doctor", json!("Dr. Amari"), json!("Dr. Amari")),
                ("time", json!("09:00"), json!("11:30")),
                ("date", json!("2026-10-20"), json!("2026-10-21")),
            ],
        );
        appt.facility_name = Some("Riverside Clinic".into());

        let events = detect_modifications(&[appt], now);

        assert_eq!(
            events[0].message,
            "Your appointment has been updated by Riverside Clinic: date: 2026-10-20 → 2026-10-21, time: 09:00 → 11:30"
        );
    }

    #[test]
    fn test_all_noop_changes_emit_nothing() {
        let now = Utc::now();
        let appt = modified("a1", now, &[("notes", json!("x"), json!("x"))]);

        assert!(detect_modifications(&[appt], now).is_empty());
    }

    #[test]
    fn test_announce_forwards_to_notifier() {
        let now = Utc::now();
        let appt = modified("a1", now, &[("status", json!("pending"), json!("confirmed"))]);
        let notifier = MemoryNotifier::new();

        announce(&detect_modifications(&[appt], now), &notifier);

        let sent = notifier.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Info);
    }
}

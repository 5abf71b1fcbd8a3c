//! Keyword fallback classifier.
//!
//! Runs when the external evaluator is disabled or fails, and for background backfills.

use crate::model::{UrgencyLevel, UrgencyResult};

/// Phrases that mark an appointment as critical.
pub const RED_KEYWORDS: &[&str] = &[
    "chest pain",
    "heart attack",
    "stroke",
    "severe bleeding",
    "unconscious",
    "difficulty breathing",
    "severe trauma",
    "overdose",
    "suicide",
    "seizure",
    "cardiac arrest",
    "respiratory failure",
    "anaphylaxis",
    "severe burns",
];

/// Phrases that mark an appointment as very urgent.
pub const ORANGE_KEYWORDS: &[&str] = &[
    "high fever",
    "severe headache",
    "broken bone",
    "deep cut",
    "infection",
    "dehydration",
    "severe pain",
    "allergic reaction",
    "meningitis symptoms",
    "appendicitis",
    "gallbladder",
    "kidney stone",
    "pneumonia symptoms",
];

/// Classifies free text from an appointment's notes and type.
///
/// RED wins over ORANGE when both sets match; no match is GREEN.
pub fn classify_by_keywords(notes: &str, appointment_type: &str) -> UrgencyResult {
    let text = format!("{notes} {appointment_type}").to_lowercase();

    let level = if RED_KEYWORDS.iter().any(|k| text.contains(k)) {
        UrgencyLevel::Red
    } else if ORANGE_KEYWORDS.iter().any(|k| text.contains(k)) {
        UrgencyLevel::Orange
    } else {
        UrgencyLevel::Green
    };

    UrgencyResult::from_level(level)
}

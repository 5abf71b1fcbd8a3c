//! Tab filtering and date ordering for appointment lists.

use crate::model::{Appointment, AppointmentStatus};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Dashboard tabs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentTab {
    /// Today or later and still active.
    Upcoming,
    /// Before today, or completed.
    Past,
    Cancelled,
    /// Completed regardless of date (patient portal).
    Completed,
}

impl AppointmentTab {
    /// Returns `None` for names that are not a tab.
    pub fn parse(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    fn newest_first(self) -> bool {
        matches!(self, AppointmentTab::Past | AppointmentTab::Completed)
    }

    fn includes(self, appointment: &Appointment, today: NaiveDate) -> bool {
        match self {
            AppointmentTab::Upcoming => appointment.date >= today && appointment.status.is_active(),
            AppointmentTab::Past => {
                appointment.date < today || appointment.status == AppointmentStatus::Completed
            }
            AppointmentTab::Cancelled => appointment.status == AppointmentStatus::Cancelled,
            AppointmentTab::Completed => appointment.status == AppointmentStatus::Completed,
        }
    }
}

impl fmt::Display for AppointmentTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppointmentTab::Upcoming => "upcoming",
            AppointmentTab::Past => "past",
            AppointmentTab::Cancelled => "cancelled",
            AppointmentTab::Completed => "completed",
        };
        f.write_str(name)
    }
}

impl FromStr for AppointmentTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upcoming" => Ok(AppointmentTab::Upcoming),
            "past" => Ok(AppointmentTab::Past),
            "cancelled" => Ok(AppointmentTab::Cancelled),
            "completed" => Ok(AppointmentTab::Completed),
            other => Err(format!("unknown appointment tab '{other}'")),
        }
    }
}

/// Today's calendar date in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Keeps the appointments belonging to `tab` and orders them by date.
///
/// Past and completed tabs list the most recent first; the others list the soonest first.
/// Appointments on the same date keep their relative order.
pub fn filter_appointments(
    appointments: Vec<Appointment>,
    tab: AppointmentTab,
    today: NaiveDate,
) -> Vec<Appointment> {
    let mut selected: Vec<Appointment> = appointments
        .into_iter()
        .filter(|appointment| tab.includes(appointment, today))
        .collect();

    if tab.newest_first() {
        selected.sort_by_key(|appointment| Reverse(appointment.date));
    } else {
        selected.sort_by_key(|appointment| appointment.date);
    }

    selected
}

/// Like [`filter_appointments`] but takes the raw tab name; an unknown name returns the
/// list untouched.
pub fn filter_by_tab_name(
    appointments: Vec<Appointment>,
    tab: &str,
    today: NaiveDate,
) -> Vec<Appointment> {
    match AppointmentTab::parse(tab) {
        Some(tab) => filter_appointments(appointments, tab, today),
        None => appointments,
    }
}

use clap::{Parser, Subcommand};
use portal_core::config::{evaluator_config_from_env_values, poll_interval_from_env_value};
use portal_core::constants::DEFAULT_PORTAL_DATA_DIR;
use portal_core::filter::{filter_by_tab_name, today};
use portal_core::logging::{init_tracing, SuppressionFilter};
use portal_core::model::{Appointment, AppointmentStatus};
use portal_core::notify::TracingNotifier;
use portal_core::repositories::{
    AppointmentService, AppointmentStore, FacilityService, FileStore, PatientService,
};
use portal_core::triage::evaluator_from_config;
use portal_core::{CoreConfig, MigrationService, TriageService};
use std::path::PathBuf;
use std::sync::Arc;

/// Only warnings from the core reach stderr unless `RUST_LOG` says otherwise.
const LOG_DIRECTIVE: &str = "portal_core=warn";

#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Care portal administration CLI")]
struct Cli {
    /// Directory holding patient and facility records
    #[arg(long, env = "PORTAL_DATA_DIR", default_value = DEFAULT_PORTAL_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all patients
    Patients,
    /// List all facilities
    Facilities,
    /// Show a patient's appointments with their urgency
    Appointments {
        /// Patient id
        patient_id: String,
        /// upcoming, past, cancelled or completed
        #[arg(long)]
        tab: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Classify free-text notes without storing anything
    Classify {
        /// Appointment notes
        notes: String,
        /// Appointment type
        #[arg(long = "type", default_value = "consultation")]
        appointment_type: String,
    },
    /// Show urgency backfill progress
    Stats,
    /// Backfill urgency on appointments that have none
    Migrate,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(LOG_DIRECTIVE, SuppressionFilter::default())?;

    let evaluator = evaluator_config_from_env_values(
        std::env::var("TRIAGE_AI_ENABLED").ok(),
        std::env::var("TRIAGE_AI_ENDPOINT").ok(),
        std::env::var("TRIAGE_AI_TIMEOUT_MS").ok(),
    )?;
    let poll_interval =
        poll_interval_from_env_value(std::env::var("PORTAL_POLL_INTERVAL_SECS").ok())?;
    let cfg = Arc::new(CoreConfig::new(cli.data_dir, evaluator, poll_interval)?);
    let store: Arc<dyn AppointmentStore> = Arc::new(FileStore::new(cfg.clone()));
    let bookings = AppointmentService::new(store);

    match cli.command {
        Some(Commands::Patients) => {
            let patients = PatientService::new(cfg).list()?;
            if patients.is_empty() {
                println!("No patients found.");
            } else {
                for patient in patients {
                    println!(
                        "ID: {}, Name: {}, Email: {}, Created: {}",
                        patient.id,
                        patient.display_name(),
                        patient.email,
                        patient.created_at
                    );
                }
            }
        }
        Some(Commands::Facilities) => {
            let facilities = FacilityService::new(cfg).list()?;
            if facilities.is_empty() {
                println!("No facilities found.");
            } else {
                for facility in facilities {
                    println!(
                        "ID: {}, Name: {}, Staff: {}, Capacity: {}",
                        facility.id,
                        facility.name,
                        facility.staff.len(),
                        facility.capacity
                    );
                }
            }
        }
        Some(Commands::Appointments {
            patient_id,
            tab,
            json,
        }) => {
            let appointments = bookings.list_for_patient(&patient_id)?;
            let appointments = match tab.as_deref() {
                Some(tab) => filter_by_tab_name(appointments, tab, today()),
                None => appointments,
            };
            let triage = TriageService::new(evaluator_from_config(cfg.evaluator()));
            let classified = runtime()?.block_on(triage.annotate(appointments));

            if json {
                println!("{}", serde_json::to_string_pretty(&classified)?);
            } else if classified.is_empty() {
                println!("No appointments found.");
            } else {
                for item in classified {
                    let a = &item.appointment;
                    println!(
                        "{} {} [{}] {} {} ({})",
                        a.date,
                        a.time,
                        a.status,
                        a.appointment_type,
                        a.facility_name.as_deref().unwrap_or("-"),
                        item.triage.urgency
                    );
                }
            }
        }
        Some(Commands::Classify {
            notes,
            appointment_type,
        }) => {
            let mut appointment = Appointment::new("cli", today(), AppointmentStatus::Pending);
            appointment.notes = notes;
            appointment.appointment_type = appointment_type;

            let triage = TriageService::new(evaluator_from_config(cfg.evaluator()));
            let result = runtime()?.block_on(triage.classify_urgency(&appointment));
            println!("{} ({})", result.level, result.urgency);
        }
        Some(Commands::Stats) => {
            let stats = MigrationService::new(bookings, Arc::new(TracingNotifier))
                .get_migration_statistics()?;
            println!(
                "Patients: {}, Appointments: {}, With urgency: {}, Progress: {}%",
                stats.total_patients,
                stats.total_appointments,
                stats.migrated_appointments,
                stats.migration_progress
            );
        }
        Some(Commands::Migrate) => {
            let migrated = MigrationService::new(bookings, Arc::new(TracingNotifier))
                .migrate_existing_appointments()?;
            println!("Migrated {} appointments", migrated);
        }
        None => {
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use portal_core::logging::env_filter;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_directive_parses() {
        assert!(env_filter(None, LOG_DIRECTIVE).is_ok());
    }
}

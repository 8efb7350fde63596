use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use fhir::{Bundle, Side};
use prom_core::config::{data_dir_from_env_value, merge_order_from_env_value};
use prom_core::metrics::post_op_phase;
use prom_core::{parser, CoreConfig, JsonFileStore, PatientService};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "prom")]
#[command(about = "PROM patient record CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one bundle file and print the extracted record
    Parse {
        /// Path to a FHIR bundle JSON file
        file: PathBuf,
        /// Questionnaire side for PROM observations (left or right)
        #[arg(long, value_parser = parse_side)]
        side: Option<Side>,
    },
    /// Print the merged patient view
    View {
        /// Patient UHID
        uhid: String,
        /// Bundle store directory (defaults to PROM_DATA_DIR)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Reference date for phase status (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// List the patients a staff member looks after
    Staff {
        /// Staff member UHID
        uhid: String,
        /// Bundle store directory (defaults to PROM_DATA_DIR)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Reference date for phase status (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// List a doctor's patients with the sides the doctor operates on
    Doctor {
        /// Doctor UHID
        uhid: String,
        /// Bundle store directory (defaults to PROM_DATA_DIR)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Post-operative phase for a surgery date
    Phase {
        /// Surgery date (YYYY-MM-DD)
        date: String,
        /// Reference date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

fn parse_side(value: &str) -> Result<Side, String> {
    Side::from_wire(value).ok_or_else(|| format!("unknown side {value:?}, expected left or right"))
}

fn patient_service(data_dir: Option<PathBuf>) -> Result<PatientService, Box<dyn std::error::Error>> {
    let data_dir =
        data_dir.unwrap_or_else(|| data_dir_from_env_value(std::env::var("PROM_DATA_DIR").ok()));
    let merge_order = merge_order_from_env_value(std::env::var("PROM_MERGE_ORDER").ok())?;
    let cfg = CoreConfig::new(data_dir.clone(), merge_order)?;
    Ok(PatientService::new(
        Arc::new(cfg),
        Arc::new(JsonFileStore::new(data_dir)),
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let today = |date: Option<NaiveDate>| date.unwrap_or_else(|| Utc::now().date_naive());

    match cli.command {
        Some(Commands::Parse { file, side }) => {
            let contents = std::fs::read_to_string(&file)?;
            let bundle = Bundle::from_json_str(&contents)?;
            let record = parser::parse(&bundle, side);
            if record.unmatched_observations > 0 {
                eprintln!(
                    "{} observation(s) had no recognised code",
                    record.unmatched_observations
                );
            }
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Some(Commands::View {
            uhid,
            data_dir,
            today: date,
        }) => {
            let service = patient_service(data_dir)?;
            match service.patient_view(&uhid, today(date)) {
                Ok(view) => println!("{}", serde_json::to_string_pretty(&view)?),
                Err(e) => eprintln!("Error reading patient {}: {}", uhid, e),
            }
        }
        Some(Commands::Staff {
            uhid,
            data_dir,
            today: date,
        }) => {
            let service = patient_service(data_dir)?;
            match service.staff_patients(&uhid, today(date)) {
                Ok(patients) => println!("{}", serde_json::to_string_pretty(&patients)?),
                Err(e) => eprintln!("Error listing patients for {}: {}", uhid, e),
            }
        }
        Some(Commands::Doctor { uhid, data_dir }) => {
            let service = patient_service(data_dir)?;
            match service.doctor_patient_sides(&uhid) {
                Ok(patients) => println!("{}", serde_json::to_string_pretty(&patients)?),
                Err(e) => eprintln!("Error listing patients for doctor {}: {}", uhid, e),
            }
        }
        Some(Commands::Phase { date, today: ref_date }) => {
            let status = post_op_phase(Some(&date), today(ref_date));
            println!("{}", serde_json::to_string(&status)?);
        }
        None => {
            println!("Use 'prom --help' for commands");
        }
    }

    Ok(())
}

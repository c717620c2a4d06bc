use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patientset::cohort::CohortService;
use patientset::config::Config;
use patientset::export::{ExportOptions, RecordAssembler, UnattachedObservations};
use patientset::models::{Locale, PatientId, PatientSet};
use patientset::repository::{FixedLocale, PgStorage, Storage};

/// Export clinical records as XML, by patient id or by cohort characteristics
#[derive(Parser, Debug)]
#[command(name = "export-xml")]
#[command(about = "Export patient clinical records as XML", long_about = None)]
struct Args {
    /// Patient ids to export (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    patients: Vec<i32>,

    /// Select the cohort by gender instead of explicit ids
    #[arg(long)]
    gender: Option<String>,

    /// Earliest birthdate (YYYY-MM-DD) of the selected cohort
    #[arg(long)]
    min_birthdate: Option<NaiveDate>,

    /// Latest birthdate (YYYY-MM-DD) of the selected cohort
    #[arg(long)]
    max_birthdate: Option<NaiveDate>,

    /// Locale used for concept names (defaults to DEFAULT_LOCALE)
    #[arg(short, long)]
    locale: Option<String>,

    /// persisted-encounter or without-encounter (defaults to UNATTACHED_OBS_RULE)
    #[arg(long)]
    unattached: Option<UnattachedObservations>,

    /// Indent nested elements by this many spaces
    #[arg(long)]
    indent: Option<usize>,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Args {
    fn selects_by_characteristics(&self) -> bool {
        self.gender.is_some() || self.min_birthdate.is_some() || self.max_birthdate.is_some()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patientset=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if args.patients.is_empty() && !args.selects_by_characteristics() {
        bail!("nothing to export: pass --patients or at least one of --gender, --min-birthdate, --max-birthdate");
    }

    let config = Config::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to the clinical database")?;
    let storage: Arc<dyn Storage> = Arc::new(PgStorage::new(pool));

    let mut patients: PatientSet = args.patients.iter().copied().map(PatientId).collect();
    if args.selects_by_characteristics() {
        let cohort = CohortService::new(storage.clone())
            .query_by_characteristics(args.gender.as_deref(), args.min_birthdate, args.max_birthdate)
            .await?;
        for patient_id in cohort {
            patients.insert(patient_id);
        }
    }

    let options = ExportOptions {
        unattached: args.unattached.unwrap_or(config.unattached_observations),
        indent: args.indent,
    };
    let locale = args
        .locale
        .as_deref()
        .map(Locale::new)
        .unwrap_or_else(|| config.default_locale.clone());

    let assembler = RecordAssembler::new(storage, options);
    let xml = assembler
        .export_patient_set(&patients, &FixedLocale(locale))
        .await?;

    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, xml).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Exported {} patient(s) to {}", patients.len(), path.display());
        }
        None => println!("{}", xml),
    }

    Ok(())
}

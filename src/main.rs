use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod columns;
mod config;
mod error;
mod export;
mod filters;
mod ingest;
mod models;
mod pipeline;
mod reconcile;
mod report;

use config::FilterConfig;
use export::ExportFormat;

#[derive(Parser)]
#[command(name = "welcome-email-checker")]
#[command(about = "Find new students who still need a welcome email", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "WELCOME_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputFiles {
    /// Student records export (Salesforce)
    #[arg(long, env = "WELCOME_STUDENTS")]
    students: PathBuf,
    /// LMS gradebook export (Canvas)
    #[arg(long, env = "WELCOME_GRADEBOOK")]
    gradebook: PathBuf,
    /// Log of already-sent welcome emails
    #[arg(long, env = "WELCOME_EMAIL_LOG")]
    email_log: PathBuf,
}

#[derive(Args)]
struct FilterArgs {
    /// JSON filter config; flags below override it
    #[arg(long, env = "WELCOME_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "WELCOME_ENROLLMENT_DAYS")]
    enrollment_days: Option<u32>,
    #[arg(long)]
    no_enrollment_filter: bool,
    /// Enables the LMS activity filter
    #[arg(long, env = "WELCOME_LMS_DAYS")]
    lms_days: Option<u32>,
    /// Enables the SAA activity filter
    #[arg(long, env = "WELCOME_SAA_DAYS")]
    saa_days: Option<u32>,
    /// Enables the highest-completed-tier filter (0-12, exact match)
    #[arg(long, env = "WELCOME_TIER")]
    tier: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation and write the students to welcome
    Run {
        #[command(flatten)]
        inputs: InputFiles,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Also write a markdown run report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show required-header presence and discovered assessment columns
    Inspect {
        #[command(flatten)]
        inputs: InputFiles,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .init();
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn resolve_config(args: &FilterArgs) -> anyhow::Result<FilterConfig> {
    let mut config = match &args.config {
        Some(path) => FilterConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FilterConfig::default(),
    };

    if let Some(days) = args.enrollment_days {
        config.enrollment.enabled = true;
        config.enrollment.days = days;
    }
    if args.no_enrollment_filter {
        config.enrollment.enabled = false;
    }
    if let Some(days) = args.lms_days {
        config.lms_activity.enabled = true;
        config.lms_activity.days = days;
    }
    if let Some(days) = args.saa_days {
        config.saa_activity.enabled = true;
        config.saa_activity.days = days;
    }
    if let Some(target) = args.tier {
        config.tier.enabled = true;
        config.tier.target = target;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Commands::Run {
            inputs,
            filters,
            out_dir,
            format,
            report,
        } => {
            let config = resolve_config(&filters)?;
            let students = read_input(&inputs.students)?;
            let gradebook = read_input(&inputs.gradebook)?;
            let email_log = read_input(&inputs.email_log)?;

            let now = chrono::Local::now().naive_local();
            let outcome = pipeline::run(
                &pipeline::Inputs {
                    students: &students,
                    gradebook: &gradebook,
                    email_log: &email_log,
                },
                &config,
                now,
            )?;

            for count in &outcome.stages {
                println!("{:<24} {}", count.stage.to_string(), count.remaining);
            }

            if outcome.rows.is_empty() {
                println!("No students to welcome for this run.");
            } else {
                let export = export::export(&outcome, format)?;
                std::fs::create_dir_all(&out_dir)
                    .with_context(|| format!("failed to create {}", out_dir.display()))?;
                let path = out_dir.join(&export.filename);
                std::fs::write(&path, &export.bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!(
                    "{} students to welcome written to {}.",
                    outcome.rows.len(),
                    path.display()
                );
            }

            if let Some(path) = report {
                std::fs::write(&path, report::build_report(&outcome))?;
                info!(path = %path.display(), "report written");
                println!("Report written to {}.", path.display());
            }
        }
        Commands::Inspect { inputs } => {
            let (reports, index) = pipeline::inspect(&pipeline::Inputs {
                students: &read_input(&inputs.students)?,
                gradebook: &read_input(&inputs.gradebook)?,
                email_log: &read_input(&inputs.email_log)?,
            })?;
            let reports: Vec<&models::HeaderReport> = reports.iter().collect();
            print!("{}", report::build_inspection(&reports, &index));
        }
    }

    Ok(())
}

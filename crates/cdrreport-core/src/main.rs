//! CdrReport CLI
//!
//! Command-line interface for generating KPI and billing reports from CDR files.

use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use cdrreport::catalog::MetricCatalog;
use cdrreport::config::{Config, LoggingConfig};
use cdrreport::engine::{AggregationEngine, CancelFlag, DateRange, ProgressEvent};
use cdrreport::io::{
    default_file_name, load_records, write_json, write_report, write_report_to_path,
};
use cdrreport::models::{ReportProfile, ReportTable};

/// CdrReport - KPI and billing reports from call detail records
#[derive(Parser)]
#[command(name = "cdrreport")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "CDRREPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum ProfileArg {
    Kpi,
    Billing,
}

impl From<ProfileArg> for ReportProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Kpi => Self::Kpi,
            ProfileArg::Billing => Self::Billing,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the KPI report (per date and location, with grand total)
    Kpi {
        /// CDR file (CSV)
        #[arg(short, long)]
        input: PathBuf,

        /// First date to include (defaults to the earliest date in the file)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date to include (defaults to the latest date in the file)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Output file (defaults to a dated file in the export directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate the billing report (per date)
    Billing {
        /// CDR file (CSV)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to a dated file in the export directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the metric rules of a report profile
    Catalog {
        /// Report profile
        #[arg(value_enum)]
        profile: ProfileArg,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    init_logging(&config.logging, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Kpi {
            input,
            from,
            to,
            output,
        } => run_kpi(config, input, from, to, output, cli.format).await,
        Commands::Billing { input, output } => run_billing(config, input, output, cli.format).await,
        Commands::Catalog { profile } => run_catalog(profile.into(), cli.format),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_kpi(
    config: Config,
    input: PathBuf,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let engine = AggregationEngine::new(config.engine.clone());
    let cancel = engine.cancel_flag();
    let bar = progress_bar();
    let sink_bar = bar.clone();

    let table = run_blocking(cancel, move || {
        let records = load_records(&input)?;
        let covering = DateRange::covering(&records).ok_or(cdrreport::Error::NoRecords)?;
        let from = from.unwrap_or(covering.from);
        let to = to.unwrap_or(covering.to);
        info!(%from, %to, "Selected date range");

        let mut sink = move |event: &ProgressEvent| {
            update_bar(&sink_bar, event);
            ControlFlow::Continue(())
        };
        engine.compute_kpi_report(&records, from, to, &mut sink)
    })
    .await;
    bar.finish_and_clear();

    emit_report(&config, &table?, output, format)
}

async fn run_billing(
    config: Config,
    input: PathBuf,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let engine = AggregationEngine::new(config.engine.clone());
    let cancel = engine.cancel_flag();
    let bar = progress_bar();
    let sink_bar = bar.clone();

    let table = run_blocking(cancel, move || {
        let records = load_records(&input)?;
        let mut sink = move |event: &ProgressEvent| {
            update_bar(&sink_bar, event);
            ControlFlow::Continue(())
        };
        engine.compute_billing_report(&records, &mut sink)
    })
    .await;
    bar.finish_and_clear();

    emit_report(&config, &table?, output, format)
}

/// Run a report on the blocking pool, raising `cancel` on Ctrl+C
async fn run_blocking<T, F>(cancel: CancelFlag, job: F) -> anyhow::Result<T>
where
    F: FnOnce() -> cdrreport::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(job);

    tokio::select! {
        joined = &mut handle => Ok(joined??),
        _ = tokio::signal::ctrl_c() => {
            warn!("Ctrl+C received, cancelling report...");
            cancel.cancel();
            Ok(handle.await??)
        }
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn update_bar(bar: &ProgressBar, event: &ProgressEvent) {
    bar.set_length(event.total as u64);
    bar.set_position(event.completed as u64);
    bar.set_message(event.message());
}

fn emit_report(
    config: &Config,
    table: &ReportTable,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    for field in &table.missing_fields {
        eprintln!("warning: column {field} is empty in every record; its metrics are 0");
    }

    // Text mode always writes a file; json/csv go to stdout unless asked
    let path = match (output, format) {
        (Some(path), _) => Some(path),
        (None, OutputFormat::Text) => Some(
            config
                .export
                .output_dir
                .join(default_file_name(table.profile, Local::now().date_naive())),
        ),
        (None, _) => None,
    };

    if let Some(path) = &path {
        write_report_to_path(table, path, config.export.delimiter)?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Text => print_summary(&mut out, table, path.as_deref())?,
        OutputFormat::Json => {
            write_json(table, &mut out)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => write_report(table, &mut out, config.export.delimiter)?,
    }

    Ok(())
}

fn print_summary(out: &mut impl Write, table: &ReportTable, path: Option<&Path>) -> io::Result<()> {
    writeln!(out, "Report generation complete")?;

    if let Some(headline) = table.kpi_headline() {
        writeln!(out)?;
        writeln!(out, "  IVRS-OFFERED   {}", headline.ivrs_offered)?;
        writeln!(out, "  IVRS-DISPOSED  {}", headline.ivrs_disposed)?;
        writeln!(out, "  AGENT-OFFERED  {}", headline.agent_offered)?;
        writeln!(out, "  OVERALL-AHT    {}", headline.overall_aht)?;
    }

    writeln!(out)?;
    writeln!(out, "  {} report rows", table.len())?;
    if let Some(path) = path {
        writeln!(out, "  Written to {}", path.display())?;
    }
    Ok(())
}

fn run_catalog(profile: ReportProfile, format: OutputFormat) -> anyhow::Result<()> {
    let catalog = MetricCatalog::for_profile(profile);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if format == OutputFormat::Json {
        serde_json::to_writer_pretty(&mut out, catalog.rules())?;
        writeln!(out)?;
        return Ok(());
    }

    let width = catalog
        .rules()
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0);

    for rule in catalog.rules() {
        let reduction = match &rule.percentage_of {
            Some(target) => format!("{} as % of {target}", rule.reduction),
            None => rule.reduction.to_string(),
        };
        writeln!(
            out,
            "{:<width$}  {:<32}  {}",
            rule.name, reduction, rule.predicate
        )?;
    }

    Ok(())
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "cdrreport", &mut io::stdout());
}

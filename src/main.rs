use std::path::PathBuf;

use cbam_tools::config::RunConfig;
use cbam_tools::layout::LayoutDocument;
use cbam_tools::reference::ReferenceData;
use cbam_tools::workflow;
use cbam_tools::{Result, ToolError};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose)?;
    match cli.command {
        Command::Run(args) => execute_run(args),
        Command::Extract(args) => execute_extract(args),
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn execute_run(args: RunArgs) -> Result<()> {
    let mut config = RunConfig::load(&args.config)?;
    config.override_directories(args.input, args.output);

    let summary = workflow::run_batch(&config)?;
    for outcome in &summary.outcomes {
        match (&outcome.report_dir, &outcome.error) {
            (Some(dir), _) => println!(
                "ok      {} -> {} ({} findings)",
                outcome.name,
                dir.display(),
                outcome.findings.len()
            ),
            (None, Some(error)) => println!("failed  {}: {error}", outcome.name),
            (None, None) => println!("skipped {}", outcome.name),
        }
    }
    println!(
        "{} workbook sets processed, {} failed",
        summary.outcomes.len(),
        summary.failed()
    );
    Ok(())
}

fn execute_extract(args: ExtractArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ToolError::MissingInput(args.input));
    }
    let layouts = LayoutDocument::load(&args.layouts)?;
    let reference = ReferenceData::load(&args.reference)?;
    let extracted =
        workflow::extract_file(&args.input, &layouts, &reference, args.version.as_deref())?;
    std::fs::write(&args.output, serde_json::to_string_pretty(&extracted)?)?;
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Turn customer import spreadsheets into quarterly emission reports."
)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every workbook set of the configured input directory.
    Run(RunArgs),
    /// Extract a single workbook and write its entries as JSON.
    Extract(ExtractArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Run configuration file (YAML).
    #[arg(long)]
    config: PathBuf,

    /// Input directory overriding the configured one.
    ///
    /// Reports go to `<input>/output` unless `--output` is given.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Output directory overriding the configured one.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ExtractArgs {
    /// Layout document with the base layout and version overlays.
    #[arg(long)]
    layouts: PathBuf,

    /// Reference data workbook.
    #[arg(long)]
    reference: PathBuf,

    /// Workbook to extract.
    #[arg(long)]
    input: PathBuf,

    /// Layout version such as `1.7.2`; detected from the workbook when omitted.
    #[arg(long)]
    version: Option<String>,

    /// JSON output file.
    #[arg(long)]
    output: PathBuf,
}

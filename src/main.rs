use clap::Parser;
use solar_reconcile::analysis::{self, AnalysisInputs, LogUpload};
use solar_reconcile::config::{self, Config};
use solar_reconcile::heuristics::ManualEntry;
use solar_reconcile::report;
use std::fs;
use std::path::{Path, PathBuf};
use time::Date;
use time::macros::format_description;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "solar-reconcile")]
#[command(
    about = "Reconcile a utility invoice against inverter generation logs",
    long_about = None
)]
struct Cli {
    /// Utility invoice (PDF or plain text)
    #[arg(short, long)]
    invoice: Option<PathBuf>,

    /// Inverter generation log (CSV or spreadsheet); repeat for several
    #[arg(short, long = "log")]
    logs: Vec<PathBuf>,

    /// Billing period start (YYYY-MM-DD), overrides the invoice
    #[arg(long, value_parser = parse_date)]
    start: Option<Date>,

    /// Billing period end (YYYY-MM-DD), overrides the invoice
    #[arg(long, value_parser = parse_date)]
    end: Option<Date>,

    /// Grid consumption in kWh, overrides the invoice
    #[arg(long)]
    consumption: Option<f64>,

    /// Energy injected in kWh, overrides the invoice
    #[arg(long)]
    injected: Option<f64>,

    /// Accumulated credit balance in kWh, overrides the invoice
    #[arg(long)]
    credit: Option<f64>,

    /// Generation total in kWh; when given, the logs are not read
    #[arg(long)]
    generation: Option<f64>,

    /// Expected generation for the period in kWh
    #[arg(long)]
    target: Option<f64>,

    /// Config file
    #[arg(long, env = "SOLAR_RECONCILE_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write the PDF report; without a path, uses `[report] file_name`
    #[arg(long, num_args = 0..=1, value_name = "FILE")]
    report: Option<Option<PathBuf>>,

    /// Print the analysis as JSON instead of the text summary
    #[arg(long)]
    json: bool,
}

fn parse_date(s: &str) -> Result<Date, String> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn read_log(path: &Path) -> std::io::Result<LogUpload> {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    Ok(LogUpload {
        name,
        bytes: fs::read(path)?,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so --json output stays clean.
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load_or_default(&cli.config)?;
    if let Some(target) = cli.target {
        cfg.analysis.generation_target_kwh = Some(target);
    }

    let inputs = AnalysisInputs {
        invoice: cli.invoice.as_deref().map(fs::read).transpose()?,
        logs: cli
            .logs
            .iter()
            .map(|p| read_log(p.as_path()))
            .collect::<std::io::Result<_>>()?,
        manual: ManualEntry {
            period_start: cli.start,
            period_end: cli.end,
            grid_consumption_kwh: cli.consumption,
            energy_injected_kwh: cli.injected,
            accumulated_credit_kwh: cli.credit,
        },
        generation_kwh: cli.generation,
    };

    let analysis = analysis::analyze(&inputs, &cfg.analysis);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        let lines =
            report::report_lines(&analysis.result, analysis.window.as_ref(), &cfg.report.title);
        for line in lines {
            for _ in 0..line.gap_before {
                println!();
            }
            println!("{}", line.text);
        }
        println!();
        println!("{}", analysis.result.interpretation.message());
        if !analysis.is_complete() {
            println!();
            println!("Still needed (pass them as flags):");
            for missing in &analysis.needs_input {
                println!("  - {missing}");
            }
        }
    }

    if let Some(path) = cli.report {
        let path = path.unwrap_or_else(|| PathBuf::from(&cfg.report.file_name));
        let pdf = report::render_report(&analysis.result, analysis.window.as_ref(), &cfg.report)?;
        fs::write(&path, &pdf)?;
        info!(path = %path.display(), bytes = pdf.len(), "Report written");
    }

    Ok(())
}

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use photoflow_core::validate::{format_user_date, parse_user_date};
use photoflow_core::{BatchReport, CopyFilter, Organizer, OrganizerConfig, SourceSpec, MAX_SOURCES};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Application folder under the user's documents directory.
const APP_DIR: &str = "PhotoProManager";

#[derive(Parser)]
#[command(
    name = "photoflow",
    version,
    about = "Organize photo shoots into dated project folders"
)]
struct Cli {
    /// Destination root; projects go under <dest>/PROJETS_PHOTO/<year>/
    #[arg(short, long)]
    dest: PathBuf,

    /// Source folder as PATH, PATH|NAME or PATH|NAME|DD-MM-YYYY (repeatable)
    #[arg(short, long = "source", required = true)]
    sources: Vec<String>,

    /// Parallel copies per source
    #[arg(long)]
    workers: Option<usize>,

    /// Number of files whose EXIF date is remembered
    #[arg(long)]
    cache_size: Option<usize>,

    /// Only copy RAW and image files
    #[arg(long)]
    supported_only: bool,

    /// Do not descend into subfolders of the sources
    #[arg(long)]
    no_recursive: bool,

    /// JSON config file; command-line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Prompt for a date when none can be detected
    #[arg(long)]
    ask_date: bool,

    /// Write the batch report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Directory for log files (default: <Documents>/PhotoProManager/logs)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Do not write a log file
    #[arg(long)]
    no_log_file: bool,

    /// Also print log lines to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    if cli.sources.len() > MAX_SOURCES {
        bail!("at most {} sources can be processed at once", MAX_SOURCES);
    }

    let config = build_config(&cli)?;
    let organizer = Organizer::new(config)?;

    let token = organizer.cancel_token();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing in-flight copies...");
        token.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    let mut sources = Vec::with_capacity(cli.sources.len());
    for arg in &cli.sources {
        sources.push(parse_source(arg)?);
    }

    for source in &mut sources {
        if source.date().is_some() {
            continue;
        }
        println!("Scanning {} for capture dates...", source.path().display());
        let on_date = |file: &Path, taken: NaiveDateTime| {
            println!("  earliest so far: {} ({})", taken, file.display());
        };
        match organizer.detect_date(source, &on_date) {
            Some(date) => {
                println!("  {} -> {}", source.name(), format_user_date(date));
                source.set_date(date);
            }
            None if cli.ask_date => {
                if let Some(date) = prompt_date(source)? {
                    source.set_date(date);
                }
            }
            None => println!("  no date found for {}", source.name()),
        }
        if organizer.cancel_token().is_cancelled() {
            break;
        }
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress bar template")?
            .progress_chars("#>-"),
    );
    let on_copy = |completed: usize, total: usize, current: &Path| {
        if completed == 1 {
            bar.reset();
        }
        bar.set_length(total as u64);
        bar.set_position(completed as u64);
        if let Some(name) = current.file_name() {
            bar.set_message(name.to_string_lossy().into_owned());
        }
    };

    // The batch clears the token, so an interrupt during scanning ends here.
    if organizer.cancel_token().is_cancelled() {
        println!("Interrupted before copying.");
        return Ok(ExitCode::from(130));
    }
    println!(
        "Copying into {}",
        cli.dest.join(&organizer.config().projects_dir).display()
    );
    let report = organizer.process_multiple(sources, &cli.dest, false, &on_copy)?;
    bar.finish_and_clear();

    print_summary(&report);
    let stats = organizer.cache_stats();
    println!(
        "EXIF cache: {} hits, {} misses, {}/{} entries ({:.0}% hit rate)",
        stats.hits,
        stats.misses,
        stats.size,
        stats.capacity,
        stats.hit_rate() * 100.0
    );

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if report.cancelled {
        return Ok(ExitCode::from(130));
    }
    if report.failed() > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn build_config(cli: &Cli) -> anyhow::Result<OrganizerConfig> {
    let mut config = match &cli.config {
        Some(path) => OrganizerConfig::load(path)?,
        None => OrganizerConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(size) = cli.cache_size {
        config.cache_capacity = size;
    }
    if cli.supported_only {
        config.copy_filter = CopyFilter::Supported;
    }
    if cli.no_recursive {
        config.recursive = false;
    }
    config.validate()?;
    Ok(config)
}

/// `PATH[|NAME[|DD-MM-YYYY]]`; the name defaults to the folder name.
fn parse_source(arg: &str) -> anyhow::Result<SourceSpec> {
    let mut parts = arg.splitn(3, '|');
    let path = PathBuf::from(parts.next().unwrap_or_default().trim());
    let name = match parts.next().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => folder_name(&path),
    };
    let date = parts
        .next()
        .map(|d| parse_user_date(d.trim()))
        .transpose()?;
    SourceSpec::new(&path, &name, date).with_context(|| format!("invalid source '{}'", arg))
}

fn folder_name(path: &Path) -> String {
    fs::canonicalize(path)
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn prompt_date(source: &SourceSpec) -> anyhow::Result<Option<NaiveDate>> {
    let stdin = io::stdin();
    loop {
        print!(
            "No date found for '{}'. Enter a date (DD-MM-YYYY), or leave empty to skip: ",
            source.name()
        );
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        match parse_user_date(line) {
            Ok(date) => return Ok(Some(date)),
            Err(e) => eprintln!("{}", e),
        }
    }
}

fn print_summary(report: &BatchReport) {
    for outcome in &report.outcomes {
        if outcome.success {
            println!(
                "[OK]   {} -> {} ({} copied, {} failed, {} renamed)",
                outcome.source.name(),
                outcome.project_root.display(),
                outcome.files_copied(),
                outcome.files_failed(),
                outcome.files_renamed()
            );
        } else {
            println!(
                "[FAIL] {}: {}",
                outcome.source.name(),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    if report.cancelled {
        println!("Batch cancelled.");
    }
    println!(
        "Done! {} project(s) created, {} failed",
        report.succeeded(),
        report.failed()
    );
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let file_layer = if cli.no_log_file {
        None
    } else {
        match log_dir(cli) {
            Some(dir) => {
                let file = open_log_file(&dir)?;
                Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            }
            None => None,
        }
    };
    let stderr_layer = cli
        .verbose
        .then(|| fmt::layer().with_target(false).with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;

    if !cli.no_log_file && log_dir(cli).is_none() {
        warn!("No documents directory found, logging to file disabled");
    }
    Ok(())
}

fn log_dir(cli: &Cli) -> Option<PathBuf> {
    if let Some(dir) = &cli.log_dir {
        return Some(dir.clone());
    }
    directories::UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
        .map(|docs| docs.join(APP_DIR).join("logs"))
}

fn open_log_file(dir: &Path) -> anyhow::Result<File> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("manager_{}.log", Local::now().format("%Y%m%d")));
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::warn;
use walkdir::WalkDir;

use upscale_detector::analyzer::is_audio_file;
use upscale_detector::config::{self, AnalysisStrategy, Settings, Timings, ToolPaths};
use upscale_detector::format;
use upscale_detector::{CheckEvent, CheckStatus, Pipeline, PipelineContext, ResultCache};

const IDLE_POLL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(
    name = "upscale-detector",
    about = "Detect upscaled audio files as downloads finish"
)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true, env = "UPSCALE_DETECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Analysis strategy
    #[arg(long, global = true, value_enum)]
    strategy: Option<AnalysisStrategy>,

    /// Bitrate tolerance in percent of the declared bitrate (0-50)
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(0..=50))]
    tolerance: Option<u8>,

    /// Music root; files directly inside it get their own sidecar log
    #[arg(long, global = true)]
    music_root: Option<PathBuf>,

    /// Do not persist the cache or write sidecar logs
    #[arg(long, global = true)]
    no_logging: bool,

    /// Ignore finished-download events in watch mode
    #[arg(long, global = true)]
    no_auto_check: bool,

    /// Cache file location
    #[arg(long, global = true, env = "UPSCALE_DETECTOR_CACHE")]
    cache_file: Option<PathBuf>,

    /// Media probe binary
    #[arg(long, global = true, env = "UPSCALE_PROBE_BIN", default_value = "ffprobe")]
    probe_bin: PathBuf,

    /// True-bitrate estimator binary
    #[arg(long, global = true, env = "UPSCALE_TRUE_BITRATE_BIN", default_value = "true-bitrate")]
    true_bitrate_bin: PathBuf,

    /// Spectral cutoff checker binary
    #[arg(long, global = true, env = "UPSCALE_SPECTRAL_BIN", default_value = "spectro")]
    spectral_bin: PathBuf,

    /// Delay before each check, in milliseconds
    #[arg(long, global = true, default_value_t = 2000)]
    settle_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check files now; directories are scanned recursively for audio files
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Read finished-download paths from STDIN, one per line
    Watch,
    /// Show cached results
    Cache {
        /// Output as JSON instead of table
        #[arg(long)]
        json: bool,

        /// Only show results with this status
        #[arg(long)]
        status: Option<CheckStatus>,
    },
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };
    if let Some(strategy) = cli.strategy {
        settings.analysis_strategy = strategy;
    }
    if let Some(tolerance) = cli.tolerance {
        settings.bitrate_tolerance_percent = tolerance;
    }
    if let Some(root) = &cli.music_root {
        settings.music_root_directory = Some(root.clone());
    }
    if cli.no_logging {
        settings.enable_logging = false;
    }
    if cli.no_auto_check {
        settings.auto_check_on_download = false;
    }
    settings.validate()?;
    Ok(settings)
}

fn cache_path(cli: &Cli) -> Option<PathBuf> {
    cli.cache_file.clone().or_else(config::default_cache_path)
}

fn build_pipeline(cli: &Cli) -> Result<Pipeline> {
    let settings = resolve_settings(cli)?;
    let tools = ToolPaths {
        probe: cli.probe_bin.clone(),
        true_bitrate: cli.true_bitrate_bin.clone(),
        spectral: cli.spectral_bin.clone(),
    };
    let timings = Timings {
        settle_delay: Duration::from_millis(cli.settle_ms),
        ..Timings::default()
    };
    let cache = cache_path(cli);
    let ctx = PipelineContext::with_cache_file(settings, &tools, timings, cache.as_deref());
    Ok(Pipeline::new(ctx))
}

/// Expand directories into the audio files below them, sorted.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_audio_file(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

#[derive(Default)]
struct Tally {
    passed: usize,
    failed: usize,
    skipped: usize,
    errors: usize,
}

impl Tally {
    fn add(&mut self, status: CheckStatus) {
        match status {
            CheckStatus::Passed => self.passed += 1,
            CheckStatus::Failed => self.failed += 1,
            CheckStatus::Skipped => self.skipped += 1,
            CheckStatus::Error => self.errors += 1,
        }
    }

    fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.errors
    }
}

fn run_check(cli: &Cli, paths: &[PathBuf]) -> Result<()> {
    let files = collect_files(paths);
    if files.is_empty() {
        anyhow::bail!("No audio files found");
    }

    let pipeline = build_pipeline(cli)?;
    let events = pipeline.subscribe();
    let accepted = files.iter().filter(|f| pipeline.enqueue(f)).count();

    let mut tally = Tally::default();
    while tally.total() < accepted {
        match events.recv() {
            Ok(CheckEvent::Completed { result, .. }) => tally.add(result.status),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    pipeline.shutdown();

    eprintln!(
        "Done: {} passed, {} failed, {} errors, {} skipped (out of {} total)",
        tally.passed,
        tally.failed,
        tally.errors,
        tally.skipped,
        tally.total()
    );
    if tally.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_watch(cli: &Cli) -> Result<()> {
    let pipeline = build_pipeline(cli)?;
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read from STDIN")?;
        let path = line.trim();
        if path.is_empty() {
            continue;
        }
        pipeline.on_download_finished(Path::new(path));
    }
    while !pipeline.wait_idle(IDLE_POLL) {}
    pipeline.shutdown();
    Ok(())
}

fn run_cache(cli: &Cli, json: bool, status: Option<CheckStatus>) -> Result<()> {
    let path = cache_path(cli).context("Could not determine cache location; pass --cache-file")?;
    if !path.exists() {
        warn!("No cache at {}", path.display());
    }
    let cache = ResultCache::load(&path);
    let entries = cache
        .iter()
        .filter(|(_, result)| status.map_or(true, |s| result.status == s));
    if json {
        println!("{}", format::format_json(entries));
    } else {
        println!("{}", format::format_table(entries));
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Check { paths } => run_check(&cli, paths),
        Command::Watch => run_watch(&cli),
        Command::Cache { json, status } => run_cache(&cli, *json, *status),
    }
}

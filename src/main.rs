use anyhow::{Context, Result};
use blockrescue::report::{BadBlockLog, RescueSummary};
use blockrescue::ui::{NullProgress, ProgressReporter, StatusLine};
use blockrescue::*;
use clap::Parser;
use colored::Colorize;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Exit code for fatal errors, including bad command lines
const EXIT_FATAL: i32 = 1;

/// Exit code when `--abort-on-error` stopped the scan
const EXIT_ABORTED: i32 = 2;

#[derive(Parser)]
#[command(name = "blockrescue")]
#[command(about = "Copy what is still readable from a failing drive, resumably")]
#[command(version = "1.0.0")]
struct Cli {
    /// Device or image to rescue from (opened read-only)
    source: PathBuf,

    /// Image file (or device) to rescue into
    destination: PathBuf,

    /// Block size in bytes
    #[arg(short = 'b', long)]
    block_size: Option<usize>,

    /// State file [default: <DESTINATION>.bitmap]
    #[arg(short = 'B', long)]
    state_file: Option<PathBuf>,

    /// Stop at the first block that fails
    #[arg(short = 'A', long)]
    abort_on_error: bool,

    /// Double the step over failed blocks
    #[arg(short = 'S', long)]
    skip: bool,

    /// Skip blocks that already failed this many times
    #[arg(short = 'f', long)]
    skip_fail: Option<u32>,

    /// Copy tries per block
    #[arg(short = 'r', long)]
    retry_count: Option<u32>,

    /// First block to rescue
    #[arg(short = 's', long)]
    start_block: Option<u64>,

    /// Stop before this block [default: end of source]
    #[arg(short = 'e', long)]
    end_block: Option<u64>,

    /// Scan from the end of the range backwards
    #[arg(short = 'R', long)]
    reverse: bool,

    /// Only try blocks with a rescued block within this distance
    #[arg(short = 'G', long)]
    good_range: Option<u64>,

    /// Avoid blocks with a failed block within this distance
    #[arg(short = 'F', long)]
    failed_range: Option<u64>,

    /// Jump scan: copy runs of this many blocks from random positions
    #[arg(short = 'J', long)]
    jump: Option<u64>,

    /// Stop the jump scan after this many jumps
    #[arg(long)]
    max_jumps: Option<u64>,

    /// Seed for jump positions
    #[arg(long)]
    seed: Option<u64>,

    /// Sync the destination and state file after every block
    #[arg(long)]
    sync_state: bool,

    /// Append failed blocks to this log file
    #[arg(long)]
    bad_block_log: Option<PathBuf>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// No status line
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Apply flags on top of the file/environment configuration
    fn apply_to(&self, config: &mut RescueConfig) {
        if let Some(v) = self.block_size {
            config.block_size = v;
        }
        if let Some(v) = &self.state_file {
            config.state_file = Some(v.clone());
        }
        if let Some(v) = self.skip_fail {
            config.skip_fail = v;
        }
        if let Some(v) = self.retry_count {
            config.retry_count = v;
        }
        if let Some(v) = self.start_block {
            config.start_block = v;
        }
        if let Some(v) = self.end_block {
            config.end_block = Some(v);
        }
        if let Some(v) = self.good_range {
            config.good_range = v;
        }
        if let Some(v) = self.failed_range {
            config.failed_range = v;
        }
        if let Some(v) = self.jump {
            config.jump = v;
        }
        if let Some(v) = self.max_jumps {
            config.max_jumps = Some(v);
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        if let Some(v) = &self.bad_block_log {
            config.bad_block_log = Some(v.clone());
        }
        config.abort_on_error |= self.abort_on_error;
        config.skip |= self.skip;
        config.reverse |= self.reverse;
        config.sync_state |= self.sync_state;
    }
}

fn main() {
    // clap exits with 2 on usage errors, which is taken by aborted scans
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print().ok();
            let code = if e.exit_code() == 0 { 0 } else { EXIT_FATAL };
            std::process::exit(code);
        }
    };
    init_logging(cli.debug, cli.log_json);

    if !cfg!(feature = "color-output") {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn init_logging(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let mut config = RescueConfig::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    config.validate()?;

    let mut source = File::open(&cli.source)
        .with_context(|| format!("Failed to open source {}", cli.source.display()))?;
    // Block devices report a zero length in their metadata
    let source_len = source
        .seek(SeekFrom::End(0))
        .with_context(|| format!("Failed to size source {}", cli.source.display()))?;

    let range = config.resolve_range(source_len)?;

    let destination = open_destination(&cli.destination, source_len)?;

    let state_path = config.state_path(&cli.destination);
    let store = FileStateStore::open(&state_path)
        .with_context(|| format!("Failed to open state file {}", state_path.display()))?
        .with_sync_writes(config.sync_state);

    let progress: Box<dyn ProgressReporter> = if cli.quiet || cli.json {
        Box::new(NullProgress)
    } else {
        Box::new(StatusLine::stderr())
    };

    let settings = config.scan_settings(range);
    let mode = settings.mode();
    let copier = BlockCopier::new(source, destination, config.block_size);
    let mut engine = RescueEngine::new(copier, store, settings).with_progress(progress);

    if let Some(seed) = config.seed {
        engine = engine.with_seed(seed);
    }
    if let Some(path) = &config.bad_block_log {
        let name = cli.source.display().to_string();
        let log = BadBlockLog::open(name, path)
            .with_context(|| format!("Failed to open bad block log {}", path.display()))?;
        engine = engine.with_bad_block_log(log);
    }

    setup_signal_handlers(engine.cancel_handle())?;

    let started = Instant::now();
    let outcome = engine.run()?;
    let state = engine.store_mut().summarize(range)?;

    let summary = RescueSummary::new(
        cli.source.display().to_string(),
        cli.destination.display().to_string(),
        state_path.display().to_string(),
        config.block_size,
        range,
        mode,
        &outcome,
        state,
        started.elapsed(),
    );

    if cli.json {
        println!("{}", summary.to_json()?);
    } else if !cli.quiet {
        print_summary(&summary);
    }

    Ok(match outcome.stop {
        StopReason::Aborted { .. } => EXIT_ABORTED,
        _ => 0,
    })
}

/// Open (or create) the destination and grow it to the source length
fn open_destination(path: &Path, source_len: u64) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open destination {}", path.display()))?;

    let metadata = file.metadata()?;
    if metadata.is_file() && metadata.len() < source_len {
        file.set_len(source_len)
            .with_context(|| format!("Failed to extend destination {}", path.display()))?;
    }

    Ok(file)
}

fn print_summary(summary: &RescueSummary) {
    let text = summary.format();
    let headline = match summary.stop {
        StopReason::Aborted { .. } => "Rescue aborted".red().bold(),
        StopReason::Interrupted => "Rescue interrupted".yellow().bold(),
        _ if summary.is_complete() => "Rescue complete".green().bold(),
        _ => "Rescue finished with unreadable blocks".yellow().bold(),
    };
    println!("\n{}", headline);
    println!("{}", text);
}

// Signal handler for graceful shutdown
fn setup_signal_handlers(cancel: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::{consts::SIGINT, iterator::Signals};

    let mut signals = Signals::new([SIGINT])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGINT {
                eprintln!("\nInterrupt received, stopping after the current block...");
                cancel.store(true, Ordering::SeqCst);
            }
        }
    });

    Ok(())
}

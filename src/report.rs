/// Run reporting: the bad block log and the end-of-run summary
use crate::engine::{Counters, ScanMode, ScanOutcome, StopReason};
use crate::state::{BlockStatus, RangeSummary};
use crate::ui::progress::human_bytes;
use crate::{BlockRange, RescueResult};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Append-only text log of failed block attempts
pub struct BadBlockLog {
    file: File,
    path: PathBuf,
    source_name: String,
    entries: u64,
}

impl BadBlockLog {
    /// Open (or create) the log for appending. Called before the scan so
    /// an unusable path is a setup error.
    pub fn open(source_name: impl Into<String>, path: impl Into<PathBuf>) -> RescueResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            file,
            path,
            source_name: source_name.into(),
            entries: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries written by this log instance
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Append one failed attempt
    pub fn record(
        &mut self,
        block: u64,
        offset: u64,
        status: BlockStatus,
        reason: &str,
    ) -> std::io::Result<()> {
        writeln!(
            self.file,
            "{} | Source: {} | Block: {} | Offset: {} | Failures: {} | Reason: {}",
            chrono::Utc::now().to_rfc3339(),
            self.source_name,
            block,
            offset,
            status.failures(),
            reason
        )?;

        self.entries += 1;
        Ok(())
    }
}

/// Everything worth reporting about one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescueSummary {
    pub source: String,
    pub destination: String,
    pub state_file: String,
    pub block_size: usize,
    pub range: BlockRange,
    pub mode: ScanMode,
    pub stop: StopReason,
    pub counters: Counters,
    pub jumps: u64,
    /// State of the whole range after the run, including earlier runs
    pub state: RangeSummary,
    pub elapsed_secs: f64,
}

impl RescueSummary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        state_file: impl Into<String>,
        block_size: usize,
        range: BlockRange,
        mode: ScanMode,
        outcome: &ScanOutcome,
        state: RangeSummary,
        elapsed: Duration,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            state_file: state_file.into(),
            block_size,
            range,
            mode,
            stop: outcome.stop,
            counters: outcome.counters,
            jumps: outcome.jumps,
            state,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    pub fn rescued_bytes(&self) -> u64 {
        self.state.good.saturating_mul(self.block_size as u64)
    }

    /// Whether every block of the range has been rescued
    pub fn is_complete(&self) -> bool {
        self.state.good == self.range.len()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Format summary as human-readable text
    pub fn format(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "Rescue of {} -> {}\n",
            self.source, self.destination
        ));
        output.push_str(&format!("{}\n", "=".repeat(60)));
        output.push_str(&format!(
            "Blocks {} ({} x {} bytes), mode: {}\n",
            self.range,
            self.range.len(),
            self.block_size,
            describe_mode(self.mode)
        ));
        output.push_str(&format!("Stopped: {}\n", describe_stop(self.stop)));
        if let ScanMode::Jump { .. } = self.mode {
            output.push_str(&format!("Jumps: {}\n", self.jumps));
        }
        output.push_str(&format!(
            "This run: ok {}  bad {}\n",
            self.counters.ok, self.counters.bad
        ));
        output.push_str(&format!(
            "Range state: good {}  failed {}  untried {}  ({:.2}% rescued, {})\n",
            self.state.good,
            self.state.failed,
            self.state.untried,
            self.state.rescued_percentage(),
            human_bytes(self.rescued_bytes() as f64)
        ));
        if self.state.failed > 0 {
            output.push_str(&format!(
                "Worst block failed {} times\n",
                self.state.worst_failures
            ));
        }
        output.push_str(&format!("State file: {}\n", self.state_file));

        let elapsed = Duration::from_secs(self.elapsed_secs.round() as u64);
        output.push_str(&format!("Elapsed: {}\n", humantime::format_duration(elapsed)));

        output
    }
}

fn describe_mode(mode: ScanMode) -> String {
    match mode {
        ScanMode::Forward => "linear forward".to_string(),
        ScanMode::Reverse => "linear reverse".to_string(),
        ScanMode::Jump { run_length } => format!("jump (runs of {})", run_length),
    }
}

fn describe_stop(stop: StopReason) -> String {
    match stop {
        StopReason::Completed => "range completed".to_string(),
        StopReason::Aborted { block } => format!("aborted on failed block {}", block),
        StopReason::Interrupted => "interrupted".to_string(),
        StopReason::JumpLimitReached => "jump limit reached".to_string(),
    }
}

use crate::engine::Counters;
use crate::BlockRange;
use std::io::{self, Write};
use std::time::Instant;

/// Receives progress from the scan strategies
pub trait ProgressReporter {
    /// Called before each attempted block, and periodically while
    /// walking over already-rescued blocks
    fn update(&mut self, block: u64, range: BlockRange, counters: &Counters);

    /// Called once when the scan stops
    fn finish(&mut self, block: u64, range: BlockRange, counters: &Counters);
}

/// Discards progress (tests, `--quiet`)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn update(&mut self, _block: u64, _range: BlockRange, _counters: &Counters) {}

    fn finish(&mut self, _block: u64, _range: BlockRange, _counters: &Counters) {}
}

/// Single status line, rewritten in place with `\r`:
///
/// ```text
/// block 000001234 (000000000-000100000)   ok 000001200   bad 000000034   0:42
/// ```
pub struct StatusLine<W: Write> {
    out: W,
    start: Instant,
}

impl StatusLine<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> StatusLine<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            start: Instant::now(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, block: u64, range: BlockRange, counters: &Counters) {
        let elapsed = format_duration(self.start.elapsed().as_secs());
        // Terminal output is best effort
        write!(
            self.out,
            "\rblock {:09} ({:09}-{:09})   ok {:09}   bad {:09}   {}  ",
            block, range.start, range.end, counters.ok, counters.bad, elapsed
        )
        .ok();
        self.out.flush().ok();
    }
}

impl<W: Write> ProgressReporter for StatusLine<W> {
    fn update(&mut self, block: u64, range: BlockRange, counters: &Counters) {
        self.render(block, range, counters);
    }

    fn finish(&mut self, block: u64, range: BlockRange, counters: &Counters) {
        self.render(block, range, counters);
        writeln!(self.out).ok();
        self.out.flush().ok();
    }
}

/// Convert a byte count to a readable string
pub(crate) fn human_bytes(bps: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bps <= 0.0 {
        return "0B".to_string();
    }
    let mut val = bps;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}

/// Format seconds to H:MM:SS or M:SS
pub(crate) fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

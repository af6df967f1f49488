//! Progress tracking for a ticker's collection run.
//!
//! The runner advances one window at a time, so progress is measured in
//! windows processed out of the windows the chunker planned. This module
//! computes percentages and remaining-time estimates and formats the
//! periodic `[PROGRESS]` log lines.

use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_EMIT_INTERVAL: Duration = Duration::from_secs(60);
const MIN_RUN_DURATION: Duration = Duration::from_secs(30);

/// Cadence of `[PROGRESS]` lines.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    emit_interval: Duration,
    min_step: f64,
}

impl ProgressTracker {
    /// Tracker emitting at most every `emit_interval`, or sooner after `min_step` percent.
    pub fn new(emit_interval: Duration, min_step: f64) -> Self {
        Self {
            emit_interval,
            min_step,
        }
    }

    /// Build a [`ProgressState`] for one ticker.
    pub fn create_state(&self, ticker: &str, total_windows: usize) -> ProgressState {
        let mut state = ProgressState::new(ticker, total_windows);
        state.emit_interval = self.emit_interval;
        state.min_step = self.min_step;
        state
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_EMIT_INTERVAL, 10.0)
    }
}

/// Window-level progress of one run.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Ticker being collected.
    pub ticker: String,
    /// Windows handled so far, skipped and failed ones included.
    pub windows_done: usize,
    /// Windows planned by the chunker.
    pub total_windows: usize,
    /// Rows buffered or flushed so far.
    pub rows: u64,
    /// When the run started.
    pub started: Instant,
    /// Last emitted line.
    pub last_emit: Instant,
    /// Quiet period between lines.
    pub emit_interval: Duration,
    /// Percentage at the last emitted line.
    pub last_emitted_percent: f64,
    /// Percentage jump that emits a line before the quiet period ends.
    pub min_step: f64,
    /// Label of the window being processed.
    pub current_window: Option<String>,
}

impl ProgressState {
    /// Create a state with default intervals.
    pub fn new(ticker: &str, total_windows: usize) -> Self {
        let now = Instant::now();
        Self {
            ticker: ticker.to_string(),
            windows_done: 0,
            total_windows,
            rows: 0,
            started: now,
            last_emit: now,
            emit_interval: DEFAULT_EMIT_INTERVAL,
            last_emitted_percent: 0.0,
            min_step: 10.0,
            current_window: None,
        }
    }

    /// Record a finished window and the rows it produced.
    pub fn advance(&mut self, rows: u64) {
        self.windows_done = self.windows_done.saturating_add(1);
        self.rows = self.rows.saturating_add(rows);
    }

    /// Set the label of the window being processed.
    pub fn set_window<S: Into<String>>(&mut self, window: Option<S>) {
        self.current_window = window.map(|s| s.into());
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_windows == 0 {
            return 100.0;
        }
        (self.windows_done as f64 * 100.0 / self.total_windows as f64).min(100.0)
    }

    /// Windows handled per second since the run started.
    pub fn rate(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.windows_done as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Whether an update should be emitted based on time or percentage.
    pub fn should_emit_update(&self) -> bool {
        if self.windows_done == 0 {
            return false;
        }

        if self.percentage() - self.last_emitted_percent >= self.min_step {
            return true;
        }

        self.started.elapsed() >= MIN_RUN_DURATION
            && self.last_emit.elapsed() >= self.emit_interval
    }

    /// Call after emitting a progress log.
    pub fn mark_emitted(&mut self) {
        self.last_emit = Instant::now();
        self.last_emitted_percent = self.percentage();
    }

    /// Estimate remaining time from the window rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let rate = self.rate();
        let remaining = self.total_windows.saturating_sub(self.windows_done);
        if rate > 0.0 && remaining > 0 {
            Some(Duration::from_secs_f64(remaining as f64 / rate))
        } else {
            None
        }
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}: {}/{} windows, {} rows - {:.1}% complete",
            self.ticker,
            self.windows_done,
            self.total_windows,
            self.rows,
            self.percentage()
        )];

        if let Some(window) = &self.current_window {
            parts.push(format!("({window})"));
        }

        let rate = self.rate();
        if rate > 0.0 {
            parts.push(format!("at {rate:.1} windows/sec"));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}

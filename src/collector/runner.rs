//! Per-ticker collection loop
//!
//! One run owns its rate limiter, its row buffer and its progress counters.
//! Windows are fetched strictly one after another; a window whose retry
//! budget runs out is reported and skipped, and only a storage failure ends
//! a run early.

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use super::chunker::RangeChunker;
use super::config::SourceProfile;
use super::progress::{ProgressState, ProgressTracker};
use super::rate_limit::RateLimiter;
use super::retry::{Attempt, FetchContext, FetchOutcome, RetryPolicy, RetryingFetcher};
use super::CollectError;
use crate::metrics::{self, RunMetrics};
use crate::source::SourceAdapter;
use crate::storage::StorageSink;
use crate::CandleRow;

/// Phase of a run (T060)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// Nothing fetched yet
    Init,
    /// Selecting the next window
    Chunking,
    /// Waiting for the rate limiter before a call
    RateLimitedWait,
    /// Fetching a window
    Fetching,
    /// Writing the buffer to storage
    Flushing,
    /// Last window was before the listing floor
    Skipped,
    /// All windows handled and the buffer flushed
    Done,
}

/// Counters of the run in progress (T061)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionProgress {
    /// Ticker being collected
    pub ticker: String,
    /// Earliest epoch with data seen so far
    pub earliest_seen_epoch: Option<i64>,
    /// Rows collected, flushed or buffered
    pub row_count: u64,
    /// Rows with a null field
    pub na_row_count: u64,
    /// Rows waiting for the next flush
    pub buffered_rows: usize,
}

/// A window given up after its retry budget ran out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedWindow {
    /// First tick of the window
    pub start: DateTime<Utc>,
    /// Last tick of the window
    pub end: DateTime<Utc>,
    /// Wire attempts made
    pub attempts: u32,
    /// Last hard failure
    pub error: String,
}

/// Outcome of one ticker's run (T062)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Ticker collected
    pub ticker: String,
    /// First instant with data, `None` when nothing was found
    pub first_data_instant: Option<DateTime<Utc>>,
    /// Last tick of the requested span
    pub requested_end: DateTime<Utc>,
    /// Rows collected
    pub total_rows: u64,
    /// Rows with a null field
    pub total_na_rows: u64,
    /// Windows planned
    pub windows_total: usize,
    /// Windows that returned data
    pub fetched_windows: usize,
    /// Windows the source had no data for
    pub empty_windows: usize,
    /// Windows before the listing floor
    pub skipped_windows: usize,
    /// Windows that exhausted their retry budget
    pub failed_windows: Vec<FailedWindow>,
}

/// Drives a single ticker's collection (T063)
pub struct CollectionRunner<'a, S: StorageSink + ?Sized> {
    adapter: &'a dyn SourceAdapter,
    sink: &'a mut S,
    profile: SourceProfile,
    policy: RetryPolicy,
    tracker: ProgressTracker,
    progress_bar: Option<ProgressBar>,
    state: RunState,
    progress: CollectionProgress,
    buffer: Vec<CandleRow>,
}

impl<'a, S: StorageSink + ?Sized> CollectionRunner<'a, S> {
    /// Create a runner
    ///
    /// # Arguments
    /// * `adapter` - Source to fetch from
    /// * `sink` - Storage the buffer is flushed to
    /// * `profile` - Chunk width, rate limit and flush cadence
    pub fn new(adapter: &'a dyn SourceAdapter, sink: &'a mut S, profile: SourceProfile) -> Self {
        Self {
            adapter,
            sink,
            profile,
            policy: RetryPolicy::default(),
            tracker: ProgressTracker::default(),
            progress_bar: None,
            state: RunState::Init,
            progress: CollectionProgress::default(),
            buffer: Vec::new(),
        }
    }

    /// Override retry budget and backoffs
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override progress log cadence
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Mirror window progress and operator messages on a progress bar
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.progress_bar = Some(bar);
        self
    }

    /// Current phase
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Counters of the current or last run
    pub fn progress(&self) -> &CollectionProgress {
        &self.progress
    }

    /// Collect `[start, end of end's day]` for `ticker`
    ///
    /// # Errors
    /// [`CollectError::InvalidRange`] when `start` is after `end`,
    /// [`CollectError::Misaligned`] when either bound is off the candle grid,
    /// and [`CollectError::Storage`] when a flush fails. Window failures are
    /// reported in the returned [`Summary`] instead.
    pub async fn run(
        &mut self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Summary, CollectError> {
        if start > end {
            return Err(CollectError::InvalidRange { start, end });
        }
        let granularity_secs = self.profile.granularity.num_seconds().max(1);
        for instant in [start, end] {
            if instant.timestamp().rem_euclid(granularity_secs) != 0 {
                return Err(CollectError::Misaligned {
                    instant,
                    granularity_secs,
                });
            }
        }

        let span = info_span!("collect", ticker = %ticker, source = %self.profile.source);
        let run_metrics = RunMetrics::start(self.profile.source, ticker);

        match self.run_windows(ticker, start, end).instrument(span).await {
            Ok(summary) => {
                run_metrics.record_success(summary.total_rows, summary.failed_windows.len());
                Ok(summary)
            }
            Err(e) => {
                run_metrics.record_failure(&e.to_string());
                Err(e)
            }
        }
    }

    async fn run_windows(
        &mut self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Summary, CollectError> {
        let source = self.profile.source;
        let adapter = self.adapter;
        let schema = source.schema();

        self.state = RunState::Init;
        self.buffer.clear();
        self.progress = CollectionProgress {
            ticker: ticker.to_string(),
            ..CollectionProgress::default()
        };

        let mut fetcher = RetryingFetcher::new(
            RateLimiter::new(self.profile.rate_limit, self.profile.rate_window),
            self.policy.clone(),
        );

        let floor = if self.profile.uses_listing_floor {
            self.listing_floor(&mut fetcher, ticker, start).await
        } else {
            None
        };

        let chunker = RangeChunker::new(self.profile.chunk_width, self.profile.granularity);
        let windows = chunker.chunks(start, end);
        let requested_end = chunker.span_end(end);

        let mut summary = Summary {
            ticker: ticker.to_string(),
            first_data_instant: None,
            requested_end,
            total_rows: 0,
            total_na_rows: 0,
            windows_total: windows.len(),
            fetched_windows: 0,
            empty_windows: 0,
            skipped_windows: 0,
            failed_windows: Vec::new(),
        };

        info!(
            start = %start,
            end = %requested_end,
            windows = summary.windows_total,
            floor = ?floor,
            "Starting collection"
        );

        let mut progress = self.tracker.create_state(ticker, summary.windows_total);
        if let Some(bar) = &self.progress_bar {
            bar.set_length(summary.windows_total as u64);
            bar.set_position(0);
        }

        for window in windows {
            self.transition(RunState::Chunking);
            progress.set_window(Some(window.to_string()));
            if let Some(bar) = &self.progress_bar {
                bar.set_message(format!("{ticker} {}", window.start.format("%Y-%m-%d %H:%M")));
            }

            if floor.is_some_and(|f| window.ends_before(f)) {
                self.transition(RunState::Skipped);
                summary.skipped_windows += 1;
                metrics::record_window(source, "skipped");
                self.finish_window(&mut progress, 0);
                continue;
            }

            if fetcher.limiter().next_delay() > std::time::Duration::ZERO {
                self.transition(RunState::RateLimitedWait);
            }
            self.transition(RunState::Fetching);

            let context = FetchContext {
                source,
                ticker,
                window_start: window.start,
            };
            let window_ref = &window;
            let outcome = fetcher
                .fetch(context, move || adapter.fetch_window(ticker, window_ref))
                .await;

            let mut window_rows = 0;
            match outcome {
                FetchOutcome::Success(rows) => {
                    let na = rows.iter().filter(|row| schema.is_na(row)).count() as u64;
                    window_rows = rows.len() as u64;

                    if summary.first_data_instant.is_none() {
                        summary.first_data_instant = first_data_instant(&rows);
                        self.progress.earliest_seen_epoch =
                            summary.first_data_instant.map(|t| t.timestamp());
                    }

                    summary.total_rows += window_rows;
                    summary.total_na_rows += na;
                    summary.fetched_windows += 1;
                    self.progress.row_count = summary.total_rows;
                    self.progress.na_row_count = summary.total_na_rows;
                    metrics::record_window(source, "data");
                    metrics::record_rows(source, window_rows, na);

                    self.buffer.extend(rows);
                    self.progress.buffered_rows = self.buffer.len();

                    if summary.fetched_windows % self.profile.flush_every == 0 {
                        self.flush(ticker)?;
                    }
                }
                FetchOutcome::Empty => {
                    summary.empty_windows += 1;
                    metrics::record_window(source, "empty");
                    if summary.first_data_instant.is_some() {
                        self.report(&format!("{ticker} + {}: no data", window.start));
                    } else {
                        debug!(window = %window, "No data before first listing");
                    }
                }
                FetchOutcome::Exhausted(failure) => {
                    metrics::record_window(source, "failed");
                    self.report(&format!(
                        "{ticker} + {}: failed after {} attempts: {}",
                        window.start, failure.attempts, failure.last_error
                    ));
                    summary.failed_windows.push(FailedWindow {
                        start: window.start,
                        end: window.end,
                        attempts: failure.attempts,
                        error: failure.last_error.to_string(),
                    });
                }
            }

            self.finish_window(&mut progress, window_rows);
        }

        if !self.buffer.is_empty() {
            self.flush(ticker)?;
        }
        self.transition(RunState::Done);

        if let Some(bar) = &self.progress_bar {
            bar.finish_with_message(format!("{ticker} done"));
        }

        info!(
            rows = summary.total_rows,
            na_rows = summary.total_na_rows,
            fetched = summary.fetched_windows,
            empty = summary.empty_windows,
            skipped = summary.skipped_windows,
            failed = summary.failed_windows.len(),
            first_data = ?summary.first_data_instant,
            "Collection complete"
        );

        Ok(summary)
    }

    async fn listing_floor(
        &self,
        fetcher: &mut RetryingFetcher,
        ticker: &str,
        start: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let adapter = self.adapter;
        let context = FetchContext {
            source: self.profile.source,
            ticker,
            window_start: start,
        };

        let outcome = fetcher
            .fetch(context, move || async move {
                adapter
                    .earliest_available(ticker, start)
                    .await
                    .map(|found| found.map_or(Attempt::Empty, Attempt::Data))
            })
            .await;

        match outcome {
            FetchOutcome::Success(earliest) => {
                info!(earliest = %earliest, "Listing floor found");
                Some(earliest)
            }
            FetchOutcome::Empty => None,
            FetchOutcome::Exhausted(failure) => {
                warn!(
                    error = %failure.last_error,
                    "Listing floor lookup failed, assuming data from start"
                );
                Some(start)
            }
        }
    }

    fn flush(&mut self, ticker: &str) -> Result<(), CollectError> {
        self.transition(RunState::Flushing);
        debug!(rows = self.buffer.len(), "Flushing buffer");
        self.sink.append(ticker, &self.buffer)?;
        self.buffer.clear();
        self.progress.buffered_rows = 0;
        Ok(())
    }

    fn finish_window(&self, progress: &mut ProgressState, rows: u64) {
        progress.advance(rows);
        if let Some(bar) = &self.progress_bar {
            bar.inc(1);
        }
        if progress.should_emit_update() {
            info!("{}", progress.format_progress());
            progress.mark_emitted();
        }
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "State transition");
            self.state = next;
        }
    }

    fn report(&self, message: &str) {
        warn!("{message}");
        if let Some(bar) = &self.progress_bar {
            bar.println(message);
        }
    }
}

/// Earliest epoch carrying data in a reindexed window
fn first_data_instant(rows: &[CandleRow]) -> Option<DateTime<Utc>> {
    rows.iter()
        .filter(|row| !row.is_empty())
        .map(|row| row.epoch)
        .min()
        .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0))
}

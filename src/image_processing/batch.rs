use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::ingest::SourceImage;
use super::{EncodedResult, ProcessingEngine};
use crate::error::{ProcessingError, ProcessingResult};
use crate::utils::unique_filename;

/// Timed-out workers allowed to keep running before new items are refused
pub const MAX_STALLED_WORKERS: usize = 8;

const WORKER_RUNNING: u8 = 0;
const WORKER_DONE: u8 = 1;
const WORKER_DETACHED: u8 = 2;

/// Cooperative cancellation, checked before each item starts
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Completed-item counter with progress and ETA
pub struct ProgressTracker {
    pub total: usize,
    completed: AtomicUsize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// Increment completed count and return current count
    pub fn increment(&self) -> usize {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Option<Duration> {
        let completed = self.completed();
        if completed == 0 {
            return None;
        }

        let remaining = self.total.saturating_sub(completed);
        if remaining == 0 {
            return Some(Duration::ZERO);
        }

        let time_per_item = self.start_time.elapsed() / completed as u32;
        Some(time_per_item * remaining as u32)
    }

    /// Get processing speed (items per second)
    pub fn items_per_second(&self) -> f64 {
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        if elapsed_secs == 0.0 {
            return 0.0;
        }
        self.completed() as f64 / elapsed_secs
    }
}

/// Notifications emitted while a batch runs
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// About to process `filename`; `completed` items are already done
    Progress {
        completed: usize,
        total: usize,
        filename: String,
        eta: Option<Duration>,
    },
    Completed {
        index: usize,
        filename: String,
        output_name: String,
        size_bytes: usize,
        quality: Option<f32>,
    },
    Failed {
        index: usize,
        filename: String,
        kind: &'static str,
        message: String,
    },
    /// Always the last event
    Finished {
        succeeded: usize,
        total: usize,
        cancelled: bool,
    },
}

impl BatchEvent {
    /// Progress fraction carried by this event, if any
    pub fn fraction(&self) -> Option<f64> {
        match self {
            BatchEvent::Progress {
                completed, total, ..
            } if *total > 0 => Some(*completed as f64 / *total as f64),
            BatchEvent::Finished { .. } => Some(1.0),
            _ => None,
        }
    }
}

/// A source that did not produce a result
#[derive(Debug)]
pub struct ItemFailure {
    pub index: usize,
    pub source_id: String,
    pub filename: String,
    pub error: ProcessingError,
}

#[derive(Debug)]
pub enum ItemOutcome {
    Success(EncodedResult),
    Failure(ItemFailure),
}

/// How the results of a run are handed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Empty,
    Single,
    Archive,
}

#[derive(Debug)]
pub struct BatchReport {
    /// In input order; items skipped by cancellation have no entry
    pub outcomes: Vec<ItemOutcome>,
    pub total: usize,
    pub cancelled: bool,
    pub duration: Duration,
    /// Finished items (successes and failures) per second of wall time
    pub items_per_second: f64,
}

impl BatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &EncodedResult> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Success(result) => Some(result),
            ItemOutcome::Failure(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Failure(failure) => Some(failure),
            ItemOutcome::Success(_) => None,
        })
    }

    pub fn into_results(self) -> Vec<EncodedResult> {
        self.outcomes
            .into_iter()
            .filter_map(|o| match o {
                ItemOutcome::Success(result) => Some(result),
                ItemOutcome::Failure(_) => None,
            })
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.successes().count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn delivery_kind(&self) -> DeliveryKind {
        match self.succeeded() {
            0 => DeliveryKind::Empty,
            1 => DeliveryKind::Single,
            _ => DeliveryKind::Archive,
        }
    }

    /// "N of total succeeded"
    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.succeeded(), self.total)
    }
}

impl ProcessingEngine {
    /// Process `sources` in input order.
    ///
    /// With one job, items run strictly one after another. With more, items
    /// run on a dedicated rayon pool and outcomes are collected back into
    /// input order. A failing item is recorded and never stops the batch.
    pub fn run_batch<F>(
        &self,
        sources: &[SourceImage],
        cancel: &CancellationToken,
        on_event: F,
    ) -> BatchReport
    where
        F: FnMut(BatchEvent) + Send,
    {
        let start = Instant::now();
        let total = sources.len();
        let tracker = ProgressTracker::new(total);
        let sink = Mutex::new(on_event);
        let jobs = self.config().parallel_jobs.min(total.max(1));

        info!("Processing {} source(s) with {} job(s)", total, jobs);

        let slots = if jobs > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
                Ok(pool) => pool.install(|| {
                    sources
                        .par_iter()
                        .enumerate()
                        .map(|(index, source)| self.run_item(index, source, cancel, &tracker, &sink))
                        .collect::<Vec<_>>()
                }),
                Err(e) => {
                    warn!("Falling back to sequential processing: {}", e);
                    self.run_sequential(sources, cancel, &tracker, &sink)
                }
            }
        } else {
            self.run_sequential(sources, cancel, &tracker, &sink)
        };
        let mut outcomes: Vec<ItemOutcome> = slots.into_iter().flatten().collect();

        assign_unique_names(&mut outcomes);

        let report = BatchReport {
            outcomes,
            total,
            cancelled: cancel.is_cancelled(),
            duration: start.elapsed(),
            items_per_second: tracker.items_per_second(),
        };

        info!("{}", report.summary());
        emit(
            &sink,
            BatchEvent::Finished {
                succeeded: report.succeeded(),
                total,
                cancelled: report.cancelled,
            },
        );
        report
    }

    fn run_sequential<F>(
        &self,
        sources: &[SourceImage],
        cancel: &CancellationToken,
        tracker: &ProgressTracker,
        sink: &Mutex<F>,
    ) -> Vec<Option<ItemOutcome>>
    where
        F: FnMut(BatchEvent) + Send,
    {
        let mut outcomes = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let outcome = self.run_item(index, source, cancel, tracker, sink);
            if outcome.is_none() {
                break;
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// One item: cancellation check, progress, processing, outcome event.
    /// Returns `None` when skipped because of cancellation.
    fn run_item<F>(
        &self,
        index: usize,
        source: &SourceImage,
        cancel: &CancellationToken,
        tracker: &ProgressTracker,
        sink: &Mutex<F>,
    ) -> Option<ItemOutcome>
    where
        F: FnMut(BatchEvent) + Send,
    {
        if cancel.is_cancelled() {
            return None;
        }

        with_sink(sink, |on_event| {
            on_event(BatchEvent::Progress {
                completed: tracker.completed(),
                total: tracker.total,
                filename: source.filename.clone(),
                eta: tracker.eta(),
            })
        });

        let result = match self.config().item_timeout {
            Some(limit) => self.process_with_timeout(source, limit),
            None => self.process_single(source),
        };

        let (event, outcome) = match result {
            Ok(encoded) => (
                BatchEvent::Completed {
                    index,
                    filename: source.filename.clone(),
                    output_name: encoded.output_name.clone(),
                    size_bytes: encoded.size_bytes(),
                    quality: encoded.quality,
                },
                ItemOutcome::Success(encoded),
            ),
            Err(error) => {
                warn!("Skipping {}: {}", source.filename, error);
                (
                    BatchEvent::Failed {
                        index,
                        filename: source.filename.clone(),
                        kind: error.kind(),
                        message: error.to_string(),
                    },
                    ItemOutcome::Failure(ItemFailure {
                        index,
                        source_id: source.id.clone(),
                        filename: source.filename.clone(),
                        error,
                    }),
                )
            }
        };

        with_sink(sink, |on_event| {
            tracker.increment();
            on_event(event)
        });
        Some(outcome)
    }

    /// Run one item on a worker thread and give up after `limit`.
    ///
    /// A worker cannot be interrupted: on expiry it is detached and keeps
    /// using a CPU until its item finishes, and its result is discarded.
    /// While [`MAX_STALLED_WORKERS`] detached workers are still running, new
    /// items fail with `Timeout` without starting, so a stuck batch cannot
    /// pile up threads.
    fn process_with_timeout(&self, source: &SourceImage, limit: Duration) -> ProcessingResult<EncodedResult> {
        let stalled = self.stalled_workers.load(Ordering::SeqCst);
        if stalled >= MAX_STALLED_WORKERS {
            warn!(
                "Not starting {}: {} timed-out workers are still running",
                source.filename, stalled
            );
            return Err(ProcessingError::Timeout {
                filename: source.filename.clone(),
                limit,
            });
        }

        let (tx, rx) = mpsc::channel();
        let engine = self.clone();
        let worker_source = source.clone();
        let state = Arc::new(AtomicU8::new(WORKER_RUNNING));
        let worker_state = Arc::clone(&state);

        thread::Builder::new()
            .name(format!("item-{}", source.id))
            .spawn(move || {
                let _ = tx.send(engine.process_single(&worker_source));
                let finished = worker_state.compare_exchange(
                    WORKER_RUNNING,
                    WORKER_DONE,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                if finished.is_err() {
                    engine.stalled_workers.fetch_sub(1, Ordering::SeqCst);
                }
            })?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let detached = state.compare_exchange(
                    WORKER_RUNNING,
                    WORKER_DETACHED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                match detached {
                    Ok(_) => {
                        self.stalled_workers.fetch_add(1, Ordering::SeqCst);
                    }
                    // Finished between the deadline and the state change
                    Err(_) => {
                        if let Ok(result) = rx.try_recv() {
                            return result;
                        }
                    }
                }
                Err(ProcessingError::Timeout {
                    filename: source.filename.clone(),
                    limit,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ProcessingError::encode(
                self.config().format.extension(),
                format!("worker for {} stopped without a result", source.filename),
            )),
        }
    }

    /// Timed-out workers that have not finished yet
    pub fn stalled_workers(&self) -> usize {
        self.stalled_workers.load(Ordering::SeqCst)
    }
}

fn with_sink<F, R>(sink: &Mutex<F>, f: impl FnOnce(&mut F) -> R) -> R {
    let mut guard = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

fn emit<F>(sink: &Mutex<F>, event: BatchEvent)
where
    F: FnMut(BatchEvent),
{
    with_sink(sink, |on_event| on_event(event));
}

/// Disambiguate output names in input order so an archive never holds two
/// entries with one name
fn assign_unique_names(outcomes: &mut [ItemOutcome]) {
    let mut used = HashSet::new();
    for outcome in outcomes.iter_mut() {
        if let ItemOutcome::Success(result) = outcome {
            result.output_name = unique_filename(&result.output_name, &mut used);
        }
    }
}

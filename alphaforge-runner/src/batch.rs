//! Batch orchestration: drive many expressions through submit and poll with
//! bounded concurrency.
//!
//! Workers run on a private rayon pool sized to the concurrency limit, so at
//! most that many jobs are in flight at once. Each worker owns one
//! expression end to end (submit, then poll to a terminal state) and reports
//! its result over a channel; results therefore arrive in completion order,
//! not submission order. Every expression produces exactly one result:
//! per-expression failures are recorded, never propagated, so one bad
//! expression cannot sink the batch. The only exception is authentication
//! failure, which is unrecoverable and flips an abort flag that drains the
//! remaining work as errors.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use thiserror::Error;

use alphaforge_core::generator::AlphaExpression;
use alphaforge_core::poll::{poll, JobState, PollConfig, PollError};
use alphaforge_core::session::{ApiError, SessionManager};
use alphaforge_core::submit::{submit, SimulationSettings, SubmissionError};

/// Knobs for one batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// At most this many jobs in flight at once.
    pub concurrency_limit: usize,
    /// Settings attached to every submitted simulation.
    pub settings: SimulationSettings,
    /// Poll loop timing.
    pub poll: PollConfig,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            settings: SimulationSettings::default(),
            poll: PollConfig::default(),
        }
    }
}

/// Terminal record for one expression.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub expression: AlphaExpression,
    pub state: JobState,
    pub alpha_id: Option<String>,
    pub detail: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    /// Cancelled jobs resolve as errors with a `cancelled` detail, both when
    /// abandoned mid-poll and when never admitted.
    pub fn is_cancelled(&self) -> bool {
        self.state == JobState::Error
            && self
                .detail
                .as_deref()
                .is_some_and(|d| d.starts_with("cancelled"))
    }
}

/// Counts per terminal state, with cancelled jobs tallied separately from
/// other errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errored: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[JobResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.state {
                JobState::Succeeded => summary.succeeded += 1,
                JobState::Failed => summary.failed += 1,
                JobState::Error if result.is_cancelled() => summary.cancelled += 1,
                JobState::Error => summary.errored += 1,
            }
        }
        summary
    }
}

/// Results in completion order plus the tallied summary.
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<JobResult>,
    pub summary: BatchSummary,
}

/// Observer for batch progress. `on_submitted` and `on_resolved` are called
/// from worker threads; `on_batch_complete` from the calling thread once all
/// results are in.
pub trait BatchProgress: Send + Sync {
    fn on_submitted(&self, _expression: &AlphaExpression) {}
    fn on_resolved(&self, finished: usize, total: usize, result: &JobResult);
    fn on_batch_complete(&self, _summary: &BatchSummary) {}
}

/// Line-per-result progress on stdout.
pub struct StdoutProgress;

impl BatchProgress for StdoutProgress {
    fn on_resolved(&self, finished: usize, total: usize, result: &JobResult) {
        let verdict = match result.state {
            JobState::Succeeded => format!(
                "ok    alpha={}",
                result.alpha_id.as_deref().unwrap_or("?")
            ),
            JobState::Failed => format!(
                "fail  {}",
                result.detail.as_deref().unwrap_or("rejected")
            ),
            JobState::Error => format!(
                "error {}",
                result.detail.as_deref().unwrap_or("unknown")
            ),
        };
        println!(
            "[{finished}/{total}] {verdict}  {}",
            result.expression.expression
        );
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Run every expression through submit and poll, `concurrency_limit` at a
/// time, and return one result per expression in completion order.
pub fn run_batch(
    session: &SessionManager,
    expressions: &[AlphaExpression],
    options: &BatchOptions,
    progress: Option<&dyn BatchProgress>,
    cancel: Option<&AtomicBool>,
) -> Result<BatchReport, BatchError> {
    let total = expressions.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.concurrency_limit.max(1))
        .build()
        .map_err(|e| BatchError::ThreadPool(e.to_string()))?;

    let abort = AtomicBool::new(false);
    let finished = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<JobResult>();

    pool.install(|| {
        expressions.par_iter().for_each_with(tx, |tx, expression| {
            let result = run_one(session, expression, options, progress, &abort, cancel);
            let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(progress) = progress {
                progress.on_resolved(done, total, &result);
            }
            // The receiver outlives the pool; a send cannot fail here.
            let _ = tx.send(result);
        });
    });

    let results: Vec<JobResult> = rx.iter().collect();
    let summary = BatchSummary::from_results(&results);
    if let Some(progress) = progress {
        progress.on_batch_complete(&summary);
    }
    Ok(BatchReport { results, summary })
}

fn run_one(
    session: &SessionManager,
    expression: &AlphaExpression,
    options: &BatchOptions,
    progress: Option<&dyn BatchProgress>,
    abort: &AtomicBool,
    cancel: Option<&AtomicBool>,
) -> JobResult {
    if abort.load(Ordering::SeqCst) {
        return errored(expression, "batch aborted after authentication failure");
    }
    if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
        return errored(expression, "cancelled before submission");
    }

    let handle = match submit(session, expression, &options.settings) {
        Ok(handle) => {
            if let Some(progress) = progress {
                progress.on_submitted(expression);
            }
            handle
        }
        Err(SubmissionError::Rejected { status, body }) => {
            return JobResult {
                expression: expression.clone(),
                state: JobState::Failed,
                alpha_id: None,
                detail: Some(format!("rejected (HTTP {status}): {body}")),
                completed_at: Utc::now(),
            };
        }
        Err(err @ SubmissionError::MissingLocation { .. }) => {
            return errored(expression, err.to_string());
        }
        Err(SubmissionError::Api(err)) => {
            if matches!(err, ApiError::Auth(_)) {
                abort.store(true, Ordering::SeqCst);
            }
            return errored(expression, err.to_string());
        }
    };

    match poll(session, &handle, &options.poll, cancel) {
        Ok(resolution) => JobResult {
            expression: expression.clone(),
            state: resolution.state,
            alpha_id: resolution.alpha_id,
            detail: resolution.detail,
            completed_at: Utc::now(),
        },
        Err(err) => {
            if matches!(&err, PollError::Api(ApiError::Auth(_))) {
                abort.store(true, Ordering::SeqCst);
            }
            errored(expression, err.to_string())
        }
    }
}

fn errored(expression: &AlphaExpression, detail: impl Into<String>) -> JobResult {
    JobResult {
        expression: expression.clone(),
        state: JobState::Error,
        alpha_id: None,
        detail: Some(detail.into()),
        completed_at: Utc::now(),
    }
}

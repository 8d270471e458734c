//! Explicit units of work with a completion callback.
//!
//! A [`Batch`] fans work out onto the tokio runtime. Each unit receives a
//! [`BatchContext`] identifying the batch and its own position in it;
//! nothing is shared through ambient state. When every unit has finished,
//! [`Batch::finish`] runs the registered completion callback and returns a
//! [`BatchReport`].

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identity handed to each unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchContext {
    pub batch_id: Uuid,
    /// Position of the unit in the order it was added.
    pub index: usize,
}

/// Summary of a finished batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub completed: usize,
    /// Errors of failed units, keyed by unit index.
    pub failed: Vec<(usize, Error)>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

type CompletionCallback = Box<dyn FnOnce(&BatchReport) + Send>;

/// A set of concurrent units of work.
///
/// # Example
///
/// ```ignore
/// let mut batch = Batch::new();
/// for _ in 0..5 {
///     let log = log.clone();
///     batch.add(move |ctx| async move {
///         log.new_commit(format!("{}", ctx.index)).await.map(|_| ())
///     });
/// }
/// batch.on_complete(|report| println!("done: {}", report.completed));
/// let report = batch.finish().await;
/// ```
pub struct Batch {
    id: Uuid,
    tasks: JoinSet<(usize, Result<()>)>,
    added: usize,
    started: Instant,
    on_complete: Option<CompletionCallback>,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl Batch {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            tasks: JoinSet::new(),
            added: 0,
            started: Instant::now(),
            on_complete: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of units added so far.
    pub fn len(&self) -> usize {
        self.added
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0
    }

    /// Spawns a unit of work. Must be called within a tokio runtime.
    pub fn add<F, Fut>(&mut self, work: F)
    where
        F: FnOnce(BatchContext) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let index = self.added;
        self.added += 1;
        let fut = work(BatchContext {
            batch_id: self.id,
            index,
        });
        self.tasks.spawn(async move { (index, fut.await) });
    }

    /// Registers the callback invoked once every unit has finished.
    /// Replaces any previously registered callback.
    pub fn on_complete(&mut self, callback: impl FnOnce(&BatchReport) + Send + 'static) {
        self.on_complete = Some(Box::new(callback));
    }

    /// Waits for every unit, runs the completion callback and returns the
    /// report. A unit that panicked is reported as [`Error::Internal`].
    pub async fn finish(mut self) -> BatchReport {
        let mut completed = 0;
        let mut failed = Vec::new();
        let mut finished = vec![false; self.added];

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((index, Ok(()))) => {
                    finished[index] = true;
                    completed += 1;
                }
                Ok((index, Err(e))) => {
                    finished[index] = true;
                    failed.push((index, e));
                }
                Err(e) => {
                    tracing::warn!(batch = %self.id, "batch unit did not complete: {}", e);
                }
            }
        }

        // Units that never reported back panicked or were cancelled.
        for (index, done) in finished.into_iter().enumerate() {
            if !done {
                failed.push((
                    index,
                    Error::Internal(format!("unit {} of batch {} panicked", index, self.id)),
                ));
            }
        }
        failed.sort_by_key(|(index, _)| *index);

        let report = BatchReport {
            batch_id: self.id,
            completed,
            failed,
            elapsed: self.started.elapsed(),
        };
        tracing::debug!(
            batch = %report.batch_id,
            completed = report.completed,
            failed = report.failed.len(),
            "batch finished"
        );
        if let Some(callback) = self.on_complete.take() {
            callback(&report);
        }
        report
    }
}

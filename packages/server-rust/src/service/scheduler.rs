//! Priority scheduler: four FIFO levels drained by a fixed consumer pool.
//!
//! Producers (connection handlers) push a [`Job`] and return immediately with
//! a receiver for the job's envelope. Consumers are long-lived tokio tasks
//! that always take the oldest job of the lowest non-empty level. An idle
//! consumer parks on a `Notify` and rescans from level 1 when woken, so a
//! level-1 arrival is never passed over for a level-4 job.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nado_core::ResponseEnvelope;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::admission::AdmissionController;
use super::lifecycle;
use super::unit::{Priority, UnitInstance};

// ---------------------------------------------------------------------------
// Job / ResponseSink
// ---------------------------------------------------------------------------

/// Where a consumer delivers a finished job's envelope.
#[derive(Debug)]
pub struct ResponseSink(oneshot::Sender<ResponseEnvelope>);

impl ResponseSink {
    /// Hands the envelope over. A caller that has already gone away is not an
    /// error; the envelope is dropped.
    pub fn deliver(self, envelope: ResponseEnvelope) {
        if self.0.send(envelope).is_err() {
            debug!("response sink closed before delivery");
        }
    }
}

/// A queued unit paired with its response sink.
#[derive(Debug)]
pub struct Job {
    pub instance: UnitInstance,
    pub sink: ResponseSink,
}

/// Errors returned by [`Scheduler::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is shut down")]
    Closed,
}

// ---------------------------------------------------------------------------
// PriorityQueues
// ---------------------------------------------------------------------------

/// One FIFO per priority level, index 0 = level 1.
#[derive(Debug, Default)]
struct PriorityQueues {
    levels: [VecDeque<Job>; 4],
}

impl PriorityQueues {
    fn push(&mut self, priority: Priority, job: Job) {
        self.levels[priority.index()].push_back(job);
    }

    /// Oldest job of the highest non-empty level.
    fn pop(&mut self) -> Option<Job> {
        self.levels.iter_mut().find_map(VecDeque::pop_front)
    }

    fn lens(&self) -> [usize; 4] {
        [
            self.levels[0].len(),
            self.levels[1].len(),
            self.levels[2].len(),
            self.levels[3].len(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Shared {
    queues: Mutex<PriorityQueues>,
    wake: Notify,
    closed: AtomicBool,
    admission: Arc<AdmissionController>,
}

impl Shared {
    /// Waits for the next job. `None` once the scheduler is closed and every
    /// queue is empty.
    async fn next_job(&self) -> Option<Job> {
        loop {
            // Register interest before scanning so a submit that lands between
            // the scan and the await still wakes this consumer.
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let job = self.queues.lock().pop();
            if job.is_some() {
                return job;
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }
}

/// Priority queue plus consumer pool.
///
/// Created with [`Scheduler::start`], which spawns the consumers on the
/// current tokio runtime. [`Scheduler::shutdown`] stops accepting work, lets
/// consumers finish everything already queued, and waits for them to exit.
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawns `worker_count` consumers. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(worker_count: usize, admission: Arc<AdmissionController>) -> Self {
        let shared = Arc::new(Shared {
            queues: Mutex::new(PriorityQueues::default()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            admission,
        });

        let workers = (0..worker_count)
            .map(|id| tokio::spawn(consume(id, Arc::clone(&shared))))
            .collect();
        info!(workers = worker_count, "scheduler consumers started");

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Queues `instance` at `priority` without waiting. Returns the receiver
    /// the envelope will be delivered to.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Closed` after [`Scheduler::shutdown`].
    pub fn submit(
        &self,
        priority: impl Into<Priority>,
        instance: UnitInstance,
    ) -> Result<oneshot::Receiver<ResponseEnvelope>, SchedulerError> {
        let priority = priority.into();
        let (tx, rx) = oneshot::channel();
        {
            let mut queues = self.shared.queues.lock();
            // Checked under the queue lock so no job slips in after the last
            // consumer has seen the queues empty and exited.
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(SchedulerError::Closed);
            }
            debug!(unit = %instance.label, level = priority.level(), "unit queued");
            queues.push(
                priority,
                Job {
                    instance,
                    sink: ResponseSink(tx),
                },
            );
        }
        self.shared.wake.notify_one();
        Ok(rx)
    }

    /// Queued jobs per level, index 0 = level 1.
    #[must_use]
    pub fn pending(&self) -> [usize; 4] {
        self.shared.queues.lock().lens()
    }

    /// Number of consumers still running.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.lock().iter().filter(|h| !h.is_finished()).count()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stops accepting jobs, drains what is queued, and waits for every
    /// consumer to exit.
    pub async fn shutdown(&self) {
        {
            let _queues = self.shared.queues.lock();
            self.shared.closed.store(true, Ordering::Release);
        }
        self.shared.wake.notify_waiters();

        let handles = std::mem::take(&mut *self.workers.lock());
        for (id, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker = id, error = %e, "consumer ended abnormally");
            }
        }
        info!("scheduler stopped");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Consumer loop: take, run, deliver, repeat.
async fn consume(id: usize, shared: Arc<Shared>) {
    while let Some(job) = shared.next_job().await {
        let Job { instance, sink } = job;
        debug!(worker = id, unit = %instance.label, level = instance.priority().level(), "job picked");
        let envelope = lifecycle::execute(instance, &shared.admission).await;
        sink.deliver(envelope);
    }
    debug!(worker = id, "consumer exiting");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

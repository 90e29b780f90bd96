//! Job runner
//!
//! Drives one job through `Scheduled → Armed → Running → Draining → Done`. A single dispatch
//! loop owns pacing and limits; each query runs on its own task holding one of `queue_depth`
//! semaphore permits, so waiting on the pacer or on a free slot never blocks in-flight work.

pub mod pacer;
pub mod stats;

pub use pacer::Pacer;
pub use stats::{JobStats, Progress, LATENCY_HISTOGRAM_BUCKETS};

use crate::config::{Job, MAX_QUEUE_DEPTH};
use crate::flavor::DatabaseFlavor;
use crate::types::JobPhase;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Runtime context for one job
pub struct JobRunner {
    job: Arc<Job>,
    flavor: Arc<dyn DatabaseFlavor>,
    accepted_errors: Arc<BTreeSet<String>>,
    stats: Arc<JobStats>,
}

impl JobRunner {
    pub fn new(
        job: Arc<Job>,
        flavor: Arc<dyn DatabaseFlavor>,
        accepted_errors: Arc<BTreeSet<String>>,
        stats: Arc<JobStats>,
    ) -> Self {
        Self {
            job,
            flavor,
            accepted_errors,
            stats,
        }
    }

    /// Run to `Done`.
    ///
    /// `origin` is the benchmark's global start; `global_deadline` bounds every job. Setting
    /// `shutdown` to true moves the job to draining.
    pub async fn run(
        self,
        origin: Instant,
        global_deadline: Option<Instant>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let job = self.job.clone();
        let start_at = origin + job.start;
        let deadline = match (job.stop.is_zero(), global_deadline) {
            (true, global) => global,
            (false, None) => Some(origin + job.stop),
            (false, Some(global)) => Some(global.min(origin + job.stop)),
        };

        self.stats.set_phase(JobPhase::Armed);
        tokio::select! {
            biased;
            _ = cancelled(&mut shutdown) => {
                debug!(job = %job.name, "cancelled before start");
                self.stats.finish(Instant::now());
                return;
            }
            _ = sleep_until(start_at) => {}
        }

        self.stats.start(Instant::now());
        info!(
            job = %job.name,
            queue_depth = job.queue_depth,
            rate = job.rate,
            count = job.count,
            "job started"
        );

        let queue_depth = job.queue_depth.clamp(1, MAX_QUEUE_DEPTH);
        let slots = Arc::new(Semaphore::new(queue_depth));
        let mut pacer = job
            .is_paced()
            .then(|| Pacer::new(job.rate, job.batch_size, start_at));
        let mut issued: u64 = 0;

        'dispatch: loop {
            let quota = match pacer.as_mut() {
                Some(pacer) => {
                    let tick = pacer.next_tick();
                    tokio::select! {
                        biased;
                        _ = cancelled(&mut shutdown) => break 'dispatch,
                        _ = deadline_reached(deadline) => break 'dispatch,
                        // An exhausted schedule never ticks again
                        _ = deadline_reached(tick) => job.batch_size,
                    }
                }
                None => 1,
            };

            for _ in 0..quota {
                if self.limit_reached(issued, deadline, &shutdown) {
                    break 'dispatch;
                }

                let permit = tokio::select! {
                    biased;
                    _ = cancelled(&mut shutdown) => break 'dispatch,
                    _ = deadline_reached(deadline) => break 'dispatch,
                    permit = slots.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'dispatch,
                    },
                };

                // Time may have run out while waiting for the slot
                if self.limit_reached(issued, deadline, &shutdown) {
                    break 'dispatch;
                }

                let index = (issued % job.queries.len() as u64) as usize;
                issued += 1;
                self.dispatch(index, permit);
            }
        }

        self.stats.set_phase(JobPhase::Draining);
        debug!(job = %job.name, issued, "draining in-flight queries");
        // Every permit back means every spawned query has finished
        let _all = slots.acquire_many(queue_depth as u32).await;
        self.stats.finish(Instant::now());
        info!(job = %job.name, issued, "job done");
    }

    /// Count, deadline or cancellation: whichever holds first stops dispatch
    fn limit_reached(
        &self,
        issued: u64,
        deadline: Option<Instant>,
        shutdown: &watch::Receiver<bool>,
    ) -> bool {
        (self.job.count > 0 && issued >= self.job.count)
            || deadline.is_some_and(|d| Instant::now() >= d)
            || *shutdown.borrow()
    }

    fn dispatch(&self, index: usize, permit: OwnedSemaphorePermit) {
        let job = self.job.clone();
        let flavor = self.flavor.clone();
        let accepted = self.accepted_errors.clone();
        let stats = self.stats.clone();
        stats.note_dispatch();

        tokio::spawn(async move {
            let outcome = flavor.timed_execute(&job.queries[index]).await;
            let latency = outcome.latency;
            let outcome = outcome.classify(&accepted);
            stats.record(latency, &outcome);
            drop(permit);
        });
    }
}

/// Resolves once shutdown is signalled; never resolves if the sender is gone
pub(crate) async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

pub(crate) async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

//! Per-job statistics
//!
//! Every completion for a job goes through one mutex, so the accumulators underneath never
//! see concurrent writers.

use crate::report::JobReport;
use crate::stats::{StreamingHistogram, StreamingSample, StreamingStats};
use crate::types::{JobPhase, Outcome};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Buckets in the report's latency histogram
pub const LATENCY_HISTOGRAM_BUCKETS: usize = 10;

pub struct JobStats {
    name: String,
    state: Mutex<JobState>,
}

struct JobState {
    phase: JobPhase,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    dispatched: u64,

    /// Latency in milliseconds
    latency: StreamingStats,
    latency_sample: StreamingSample,
    /// Latency in microseconds, by magnitude
    magnitudes: StreamingHistogram,

    /// Completions per whole second of the run
    throughput: StreamingStats,
    current_second: u64,
    current_second_count: u64,

    successes: u64,
    accepted_errors: BTreeMap<String, u64>,
    failures: BTreeMap<String, u64>,
}

/// Lightweight view for progress logging
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub phase: JobPhase,
    pub completed: u64,
    pub failures: u64,
    pub mean_latency_ms: f64,
    pub elapsed: Duration,
}

impl Progress {
    pub fn qps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }
}

impl JobStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(JobState {
                phase: JobPhase::Scheduled,
                started_at: None,
                finished_at: None,
                dispatched: 0,
                latency: StreamingStats::new(),
                latency_sample: StreamingSample::new(),
                magnitudes: StreamingHistogram::new(),
                throughput: StreamingStats::new(),
                current_second: 0,
                current_second_count: 0,
                successes: 0,
                accepted_errors: BTreeMap::new(),
                failures: BTreeMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> JobPhase {
        self.state.lock().phase
    }

    pub fn set_phase(&self, phase: JobPhase) {
        let mut state = self.state.lock();
        debug!(job = %self.name, from = %state.phase, to = %phase, "job phase change");
        state.phase = phase;
    }

    /// Enter `Running` at `now`
    pub fn start(&self, now: Instant) {
        let mut state = self.state.lock();
        state.started_at = Some(now);
        debug!(job = %self.name, from = %state.phase, to = %JobPhase::Running, "job phase change");
        state.phase = JobPhase::Running;
    }

    /// Enter `Done` at `now`
    pub fn finish(&self, now: Instant) {
        let mut state = self.state.lock();
        state.finished_at = Some(now);
        debug!(job = %self.name, from = %state.phase, to = %JobPhase::Done, "job phase change");
        state.phase = JobPhase::Done;
    }

    pub fn note_dispatch(&self) {
        self.state.lock().dispatched += 1;
    }

    pub fn dispatched(&self) -> u64 {
        self.state.lock().dispatched
    }

    /// Record one completed execution.
    ///
    /// The completion time is read under the lock, so per-second buckets roll in the same order
    /// completions are applied.
    pub fn record(&self, latency: Duration, outcome: &Outcome) {
        metrics::counter!(
            "dbbench_queries_total",
            "job" => self.name.clone(),
            "outcome" => outcome.label()
        )
        .increment(1);
        metrics::histogram!("dbbench_query_latency_seconds", "job" => self.name.clone())
            .record(latency.as_secs_f64());

        let mut state = self.state.lock();
        let millis = latency.as_secs_f64() * 1_000.0;
        state.latency.add(millis);
        state.latency_sample.add(millis);
        state
            .magnitudes
            .add(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));

        match outcome {
            Outcome::Success => state.successes += 1,
            Outcome::AcceptedError(code) => {
                *state.accepted_errors.entry(code.clone()).or_default() += 1
            }
            Outcome::Failure(code) => *state.failures.entry(code.clone()).or_default() += 1,
        }

        if let Some(started) = state.started_at {
            let second = Instant::now().saturating_duration_since(started).as_secs();
            state.roll_throughput(second);
            state.current_second_count += 1;
        }
    }

    pub fn progress(&self) -> Progress {
        let state = self.state.lock();
        Progress {
            phase: state.phase,
            completed: state.latency.count(),
            failures: state.failures.values().sum(),
            mean_latency_ms: state.latency.mean(),
            elapsed: state.elapsed(Instant::now()),
        }
    }

    /// Summarize everything recorded so far
    pub fn report(&self, confidence: f64) -> JobReport {
        let state = self.state.lock();
        let elapsed = state.elapsed(Instant::now());

        JobReport {
            name: self.name.clone(),
            phase: state.phase,
            elapsed_secs: elapsed.as_secs_f64(),
            dispatched: state.dispatched,
            total: state.latency.count(),
            successes: state.successes,
            accepted_errors: state.accepted_errors.values().sum(),
            accepted_errors_by_code: state.accepted_errors.clone(),
            failures: state.failures.values().sum(),
            failures_by_code: state.failures.clone(),
            latency_mean_ms: state.latency.mean(),
            latency_std_dev_ms: state.latency.sample_std_dev(),
            latency_ci_ms: state.latency.confidence_interval(confidence),
            throughput_mean_qps: state.throughput.mean(),
            throughput_std_dev_qps: state.throughput.sample_std_dev(),
            throughput_ci_qps: state.throughput.confidence_interval(confidence),
            throughput_seconds: state.throughput.count(),
            latency_histogram_ms: state.latency_sample.histogram(LATENCY_HISTOGRAM_BUCKETS),
            latency_magnitudes_us: state.magnitudes.non_empty(),
        }
    }
}

impl JobState {
    fn elapsed(&self, now: Instant) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => now.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Close every whole second before `second`, including idle ones
    fn roll_throughput(&mut self, second: u64) {
        while self.current_second < second {
            self.throughput.add(self.current_second_count as f64);
            self.current_second_count = 0;
            self.current_second += 1;
        }
    }
}

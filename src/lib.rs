//! dbbench
//!
//! Synthetic SQL load generation with streaming latency statistics.
//!
//! ## Architecture
//! - Stats: bounded-memory accumulators (Welford, magnitude histogram, reservoir sample)
//! - Flavor: per-database execution and canonical error codes
//! - Job: paced, queue-depth-bounded dispatch of one workload
//! - Benchmark: setup, concurrent jobs against one clock origin, teardown, report

pub mod config;
pub mod error;
pub mod flavor;
pub mod job;
pub mod report;
pub mod stats;
pub mod types;

pub use config::{Config, Job};
pub use error::{BenchError, ConfigError, DriverError};
pub use flavor::{ConnectOptions, DatabaseFlavor, FlavorKind};
pub use report::{JobReport, Report};

use error::Result;
use futures::future::join_all;
use job::{deadline_reached, JobRunner, JobStats};
use report::TeardownError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Confidence level used when none is configured
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.99;

/// Runs a [`Config`] against one database flavor
pub struct Benchmark {
    config: Arc<Config>,
    flavor: Arc<dyn DatabaseFlavor>,
    confidence: f64,
    progress_interval: Option<Duration>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Stops new dispatch on every job of a running benchmark
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Benchmark {
    pub fn new(config: Config, flavor: Arc<dyn DatabaseFlavor>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            flavor,
            confidence: DEFAULT_CONFIDENCE_LEVEL,
            progress_interval: None,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Log a progress line per job at this interval while jobs run
    pub fn with_progress_interval(mut self, interval: Option<Duration>) -> Self {
        self.progress_interval = interval.filter(|d| !d.is_zero());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Setup, jobs, teardown, report
    pub async fn run(&self) -> Result<Report> {
        self.shutdown.send_replace(false);
        self.run_setup().await?;

        let origin = Instant::now();
        let global_deadline = self.config.duration.map(|d| origin + d);
        info!(
            "🚀 Starting {} job(s) on {}",
            self.config.jobs.len(),
            self.flavor.name()
        );

        let accepted = Arc::new(self.config.accepted_errors.clone());
        let mut all_stats = Vec::with_capacity(self.config.jobs.len());
        let mut handles = Vec::with_capacity(self.config.jobs.len());

        for job in self.config.jobs.values() {
            let stats = Arc::new(JobStats::new(job.name.clone()));
            let runner = JobRunner::new(
                Arc::new(job.clone()),
                self.flavor.clone(),
                accepted.clone(),
                stats.clone(),
            );
            handles.push(tokio::spawn(runner.run(
                origin,
                global_deadline,
                self.shutdown.subscribe(),
            )));
            all_stats.push(stats);
        }

        let progress = self
            .progress_interval
            .map(|interval| tokio::spawn(log_progress(all_stats.clone(), interval)));

        let jobs = join_all(handles);
        tokio::pin!(jobs);
        let results = tokio::select! {
            results = &mut jobs => results,
            _ = deadline_reached(global_deadline) => {
                info!("⏱️  Global duration elapsed, draining jobs");
                self.shutdown.send_replace(true);
                jobs.await
            }
        };
        for result in results {
            if let Err(e) = result {
                error!("Job task failed: {}", e);
            }
        }
        if let Some(progress) = progress {
            progress.abort();
        }
        let elapsed = origin.elapsed();

        let teardown_errors = self.run_teardown().await;

        info!("✅ Benchmark complete in {:.3}s", elapsed.as_secs_f64());
        Ok(Report {
            flavor: self.flavor.name().to_string(),
            confidence: self.confidence,
            elapsed_secs: elapsed.as_secs_f64(),
            jobs: all_stats.iter().map(|s| s.report(self.confidence)).collect(),
            teardown_errors,
        })
    }

    async fn run_setup(&self) -> Result<()> {
        for statement in &self.config.setup {
            info!("Setup: {}", statement);
            if let Err(source) = self.flavor.execute(statement).await {
                let code = self.flavor.classify_error(&source);
                return Err(BenchError::Setup {
                    statement: statement.clone(),
                    code,
                    source,
                });
            }
        }
        Ok(())
    }

    async fn run_teardown(&self) -> Vec<TeardownError> {
        let mut errors = Vec::new();
        for statement in &self.config.teardown {
            info!("Teardown: {}", statement);
            if let Err(e) = self.flavor.execute(statement).await {
                let code = self.flavor.classify_error(&e);
                warn!("Teardown statement `{}` failed ({}): {}", statement, code, e);
                errors.push(TeardownError {
                    statement: statement.clone(),
                    code,
                });
            }
        }
        errors
    }
}

async fn log_progress(stats: Vec<Arc<JobStats>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        for job in &stats {
            let p = job.progress();
            info!(
                "📊 {} [{}] | queries: {} | {:.1} qps | mean {:.3}ms | failures: {}",
                job.name(),
                p.phase,
                p.completed,
                p.qps(),
                p.mean_latency_ms,
                p.failures
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::SqliteFlavor;

    #[tokio::test]
    async fn test_sqlite_end_to_end() {
        let mut config = Config::new(FlavorKind::Sqlite);
        config.setup = vec![
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v INTEGER)".into(),
            "INSERT INTO t (v) VALUES (1)".into(),
        ];
        config.teardown = vec!["DROP TABLE t".into(), "DROP TABLE missing".into()];
        let mut job = Job::new(
            "reads",
            vec!["SELECT v FROM t".into(), "SELECT count(*) FROM t".into()],
        );
        job.count = 20;
        config.jobs.insert(job.name.clone(), job);

        let flavor = Arc::new(SqliteFlavor::open(flavor::sqlite::IN_MEMORY, 1).unwrap());
        let benchmark = Benchmark::new(config, flavor);
        assert_eq!(benchmark.config().jobs["reads"].count, 20);
        let report = benchmark.run().await.unwrap();

        let reads = report.job("reads").unwrap();
        assert_eq!(reads.total, 20);
        assert_eq!(reads.successes, 20);
        assert_eq!(report.teardown_errors.len(), 1);
        assert_eq!(report.teardown_errors[0].statement, "DROP TABLE missing");
    }
}

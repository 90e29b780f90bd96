//! Benchmark report
//! Serializable per-job summaries with a console rendering

use crate::stats::{ConfidenceInterval, MagnitudeBucket, SampleHistogram};
use crate::types::JobPhase;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

const BAR_WIDTH: u64 = 40;

/// Summary of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub name: String,
    pub phase: JobPhase,
    pub elapsed_secs: f64,
    pub dispatched: u64,
    /// Completed executions
    pub total: u64,
    pub successes: u64,
    pub accepted_errors: u64,
    pub accepted_errors_by_code: BTreeMap<String, u64>,
    pub failures: u64,
    pub failures_by_code: BTreeMap<String, u64>,
    pub latency_mean_ms: f64,
    pub latency_std_dev_ms: f64,
    pub latency_ci_ms: Option<ConfidenceInterval>,
    pub throughput_mean_qps: f64,
    pub throughput_std_dev_qps: f64,
    pub throughput_ci_qps: Option<ConfidenceInterval>,
    /// Whole seconds feeding the throughput statistics
    pub throughput_seconds: u64,
    pub latency_histogram_ms: SampleHistogram,
    pub latency_magnitudes_us: Vec<MagnitudeBucket>,
}

impl JobReport {
    /// Completions per second over the whole run
    pub fn overall_qps(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.total as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// Result of a full benchmark run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub flavor: String,
    pub confidence: f64,
    pub elapsed_secs: f64,
    pub jobs: Vec<JobReport>,
    /// Teardown statements that failed, with their codes
    pub teardown_errors: Vec<TeardownError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownError {
    pub statement: String,
    pub code: String,
}

impl Report {
    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn total_failures(&self) -> u64 {
        self.jobs.iter().map(|j| j.failures).sum()
    }
}

fn codes(by_code: &BTreeMap<String, u64>) -> String {
    if by_code.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = by_code.iter().map(|(c, n)| format!("{c}: {n}")).collect();
    format!(" ({})", parts.join(", "))
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "║ {}", self.name)?;
        writeln!(
            f,
            "║   {} queries in {:.3}s ({:.1} qps)",
            self.total,
            self.elapsed_secs,
            self.overall_qps()
        )?;
        writeln!(
            f,
            "║   ok: {} | accepted errors: {}{} | failures: {}{}",
            self.successes,
            self.accepted_errors,
            codes(&self.accepted_errors_by_code),
            self.failures,
            codes(&self.failures_by_code)
        )?;

        write!(
            f,
            "║   latency: mean {:.3}ms, stddev {:.3}ms",
            self.latency_mean_ms, self.latency_std_dev_ms
        )?;
        if let Some(ci) = &self.latency_ci_ms {
            write!(f, ", ±{:.3}ms @ {:.0}%", ci.margin(), ci.level * 100.0)?;
        }
        writeln!(f)?;

        if self.throughput_seconds > 0 {
            write!(
                f,
                "║   throughput: mean {:.1} qps, stddev {:.1} qps over {}s",
                self.throughput_mean_qps, self.throughput_std_dev_qps, self.throughput_seconds
            )?;
            if let Some(ci) = &self.throughput_ci_qps {
                write!(f, ", ±{:.1} qps @ {:.0}%", ci.margin(), ci.level * 100.0)?;
            }
            writeln!(f)?;
        }

        let histogram = &self.latency_histogram_ms;
        let peak = histogram.buckets.iter().copied().max().unwrap_or(0);
        if peak > 0 {
            writeln!(f, "║   latency histogram (ms):")?;
            for (i, count) in histogram.buckets.iter().enumerate() {
                let bar = "█".repeat((count * BAR_WIDTH / peak) as usize);
                writeln!(
                    f,
                    "║   {:>10.3} - {:<10.3} {:>8} {}",
                    histogram.bucket_start(i),
                    histogram.bucket_start(i + 1),
                    count,
                    bar
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════════════════════════════════╗")?;
        writeln!(
            f,
            "║ dbbench: {} | {:.3}s | {} job(s)",
            self.flavor,
            self.elapsed_secs,
            self.jobs.len()
        )?;
        for job in &self.jobs {
            writeln!(f, "╠══════════════════════════════════════════════════════════════════════════════╣")?;
            write!(f, "{job}")?;
        }
        if !self.teardown_errors.is_empty() {
            writeln!(f, "╠══════════════════════════════════════════════════════════════════════════════╣")?;
            for e in &self.teardown_errors {
                writeln!(f, "║ ⚠️  teardown `{}` failed: {}", e.statement, e.code)?;
            }
        }
        writeln!(f, "╚══════════════════════════════════════════════════════════════════════════════╝")
    }
}

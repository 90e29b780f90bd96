//! Orchestrator integration tests
//! A scripted flavor stands in for the database; virtual time keeps schedules exact.

use async_trait::async_trait;
use dbbench::flavor::SqliteFlavor;
use dbbench::types::{JobPhase, UNKNOWN_ERROR_CODE};
use dbbench::{BenchError, Benchmark, Config, DatabaseFlavor, DriverError, FlavorKind, Job};
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct ScriptedError(u16);

impl fmt::Display for ScriptedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scripted error {}", self.0)
    }
}

impl std::error::Error for ScriptedError {}

/// `ok` succeeds, `lock` fails with 1205, `boom` fails with 9999; everything sleeps `latency`
struct ScriptedFlavor {
    latency: Duration,
    log: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedFlavor {
    fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            log: Mutex::new(Vec::new()),
        })
    }

    fn starts_of(&self, statement: &str) -> Vec<Instant> {
        self.log
            .lock()
            .iter()
            .filter(|(s, _)| s == statement)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl DatabaseFlavor for ScriptedFlavor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(&self, statement: &str) -> Result<(), DriverError> {
        self.log.lock().push((statement.to_string(), Instant::now()));
        tokio::time::sleep(self.latency).await;
        match statement {
            "lock" => Err(Box::new(ScriptedError(1205))),
            "boom" => Err(Box::new(ScriptedError(9999))),
            _ => Ok(()),
        }
    }

    fn classify_error(&self, error: &DriverError) -> String {
        error
            .downcast_ref::<ScriptedError>()
            .map(|e| e.0.to_string())
            .unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string())
    }
}

fn config_with(jobs: Vec<Job>) -> Config {
    let mut config = Config::new(FlavorKind::Sqlite);
    for job in jobs {
        config.jobs.insert(job.name.clone(), job);
    }
    config
}

#[tokio::test(start_paused = true)]
async fn test_count_limit_is_exact() {
    let flavor = ScriptedFlavor::new(Duration::from_millis(3));
    let mut job = Job::new("counted", vec!["ok".into()]);
    job.count = 30;

    let report = Benchmark::new(config_with(vec![job]), flavor.clone())
        .run()
        .await
        .unwrap();

    let counted = report.job("counted").unwrap();
    assert_eq!(counted.total, 30);
    assert_eq!(counted.dispatched, 30);
    assert_eq!(counted.phase, JobPhase::Done);
    assert_eq!(flavor.starts_of("ok").len(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_start_stop_window() {
    let flavor = ScriptedFlavor::new(Duration::from_millis(1000));
    let mut job = Job::new("windowed", vec!["ok".into()]);
    job.start = Duration::from_secs(5);
    job.stop = Duration::from_secs(15);

    let origin = Instant::now();
    let report = Benchmark::new(config_with(vec![job]), flavor.clone())
        .run()
        .await
        .unwrap();

    let starts = flavor.starts_of("ok");
    assert_eq!(starts.len(), 10);
    for at in starts {
        let offset = at - origin;
        assert!(offset >= Duration::from_secs(5), "started at {offset:?}");
        assert!(offset < Duration::from_secs(15), "started at {offset:?}");
    }
    assert_eq!(report.job("windowed").unwrap().total, 10);
}

#[tokio::test(start_paused = true)]
async fn test_global_duration_drains_in_flight() {
    let flavor = ScriptedFlavor::new(Duration::from_millis(500));
    let mut job = Job::new("bounded", vec!["ok".into()]);
    job.queue_depth = 2;
    let mut config = config_with(vec![job]);
    config.duration = Some(Duration::from_secs(3));

    let origin = Instant::now();
    let report = Benchmark::new(config, flavor.clone()).run().await.unwrap();

    let starts = flavor.starts_of("ok");
    assert_eq!(starts.len(), 12);
    assert!(starts.iter().all(|at| *at - origin < Duration::from_secs(3)));
    // Everything issued also completed
    assert_eq!(report.job("bounded").unwrap().total, 12);
}

#[tokio::test(start_paused = true)]
async fn test_rate_is_honored() {
    let flavor = ScriptedFlavor::new(Duration::from_millis(5));
    let mut job = Job::new("paced", vec!["ok".into()]);
    job.rate = 20.0;
    job.queue_depth = 8;
    let mut config = config_with(vec![job]);
    config.duration = Some(Duration::from_secs(1));

    let report = Benchmark::new(config, flavor.clone()).run().await.unwrap();

    let total = report.job("paced").unwrap().total;
    assert!((19..=21).contains(&total), "total {total}");
}

#[tokio::test(start_paused = true)]
async fn test_accepted_errors_are_not_failures() {
    let flavor = ScriptedFlavor::new(Duration::from_millis(2));
    let mut job = Job::new("mixed", vec!["ok".into(), "lock".into(), "boom".into()]);
    job.count = 9;
    let mut config = config_with(vec![job]);
    config.accepted_errors.insert("1205".into());

    let report = Benchmark::new(config, flavor).run().await.unwrap();

    let mixed = report.job("mixed").unwrap();
    assert_eq!(mixed.total, 9);
    assert_eq!(mixed.successes, 3);
    assert_eq!(mixed.accepted_errors, 3);
    assert_eq!(mixed.accepted_errors_by_code["1205"], 3);
    assert_eq!(mixed.failures, 3);
    assert_eq!(mixed.failures_by_code["9999"], 3);
    assert_eq!(report.total_failures(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_setup_failure_aborts_run() {
    let flavor = ScriptedFlavor::new(Duration::from_millis(1));
    let mut job = Job::new("never", vec!["ok".into()]);
    job.count = 5;
    let mut config = config_with(vec![job]);
    config.setup = vec!["ok".into(), "boom".into(), "ok".into()];

    let err = Benchmark::new(config, flavor.clone()).run().await.unwrap_err();

    match err {
        BenchError::Setup {
            statement, code, ..
        } => {
            assert_eq!(statement, "boom");
            assert_eq!(code, "9999");
        }
        other => panic!("unexpected error: {other}"),
    }
    // Only the first setup statement ran before the failure
    assert_eq!(flavor.starts_of("ok").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_failure_is_reported() {
    let flavor = ScriptedFlavor::new(Duration::from_millis(1));
    let mut job = Job::new("short", vec!["ok".into()]);
    job.count = 3;
    let mut config = config_with(vec![job]);
    config.teardown = vec!["lock".into(), "ok".into()];

    let report = Benchmark::new(config, flavor.clone()).run().await.unwrap();

    assert_eq!(report.teardown_errors.len(), 1);
    assert_eq!(report.teardown_errors[0].statement, "lock");
    assert_eq!(report.teardown_errors[0].code, "1205");
    // The teardown statement after the failure still ran
    assert_eq!(flavor.starts_of("ok").len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_handle_stops_unbounded_job() {
    let flavor = ScriptedFlavor::new(Duration::from_millis(100));
    let job = Job::new("forever", vec!["ok".into()]);
    let benchmark = Arc::new(Benchmark::new(config_with(vec![job]), flavor.clone()));

    let shutdown = benchmark.shutdown_handle();
    let runner = benchmark.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    tokio::time::sleep(Duration::from_millis(1050)).await;
    shutdown.trigger();

    let report = handle.await.unwrap().unwrap();
    let forever = report.job("forever").unwrap();
    assert_eq!(forever.phase, JobPhase::Done);
    assert_eq!(forever.total, 11);
}

#[tokio::test]
async fn test_sqlite_job_file() {
    let ini = "\
duration=10s
error=SQLITE_CONSTRAINT

[setup]
query=CREATE TABLE kv (k INTEGER PRIMARY KEY, v TEXT)

[writes]
query=INSERT INTO kv (k, v) VALUES (1, 'x')
count=5

[teardown]
query=DROP TABLE kv
";
    let config = Config::from_ini(FlavorKind::Sqlite, ini, Path::new(".")).unwrap();
    let flavor = Arc::new(SqliteFlavor::open(":memory:", 1).unwrap());

    let report = Benchmark::new(config, flavor).run().await.unwrap();

    let writes = report.job("writes").unwrap();
    assert_eq!(writes.total, 5);
    assert_eq!(writes.successes, 1);
    assert_eq!(writes.accepted_errors_by_code["SQLITE_CONSTRAINT"], 4);
    assert_eq!(writes.failures, 0);
    assert!(report.teardown_errors.is_empty());
}

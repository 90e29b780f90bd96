//! dbbench CLI
//! Runs a job file against a database and prints the report

use anyhow::Context;
use clap::Parser;
use dbbench::config::parse_duration;
use dbbench::{Benchmark, Config, ConnectOptions, FlavorKind, DEFAULT_CONFIDENCE_LEVEL};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "dbbench", version, about = "Synthetic SQL load generator")]
struct Args {
    /// Job file (INI, or JSON when it ends in .json)
    job_file: PathBuf,

    /// Database flavor: sqlite, postgres or mysql
    #[arg(long, env = "DBBENCH_DRIVER", default_value = "sqlite")]
    driver: FlavorKind,

    /// Connection string (file path for sqlite)
    #[arg(long, env = "DBBENCH_DATABASE", default_value = ":memory:")]
    database: String,

    /// Directory for query-file paths; defaults to the job file's directory
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Connection pool size
    #[arg(long, default_value_t = num_cpus::get())]
    max_connections: usize,

    /// Confidence level for reported intervals
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE_LEVEL)]
    confidence: f64,

    /// Log per-job progress at this interval (e.g. 5s)
    #[arg(long, value_parser = parse_interval)]
    intermediate_stats: Option<Duration>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logging(args.log_json)?;

    if !(args.confidence > 0.0 && args.confidence < 1.0) {
        anyhow::bail!("--confidence must be between 0 and 1, got {}", args.confidence);
    }

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("📈 Metrics on http://{}/metrics", addr);
    }

    let base_dir = match &args.base_dir {
        Some(dir) => dir.clone(),
        None => args
            .job_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let config = Config::load(&args.job_file, args.driver, &base_dir)
        .with_context(|| format!("failed to load {}", args.job_file.display()))?;
    let options = ConnectOptions {
        database: args.database.clone(),
        max_connections: args.max_connections.max(1),
    };
    let flavor = dbbench::flavor::connect(config.flavor, &options).await?;

    let benchmark = Benchmark::new(config, flavor)
        .with_confidence(args.confidence)
        .with_progress_interval(args.intermediate_stats);
    info!(
        "✅ Loaded {} job(s) from {}",
        benchmark.config().jobs.len(),
        args.job_file.display()
    );

    let shutdown = benchmark.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Shutdown signal received, draining in-flight queries");
            shutdown.trigger();
        }
    });

    let report = benchmark.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

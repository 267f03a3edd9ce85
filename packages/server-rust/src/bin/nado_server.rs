//! Nado server binary.
//!
//! Parses flags and environment into a `ServerConfig`, installs tracing,
//! registers the built-in units, and serves until Ctrl-C.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use nado_server::service::config::{default_worker_count, AdmissionConfig, SchedulerConfig};
use nado_server::service::domain::register_defaults;
use nado_server::telemetry::{init_tracing, LogFormat};
use nado_server::{NetworkConfig, NetworkModule, ServerConfig, UnitRegistry};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "nado-server")]
#[command(about = "Authenticated priority task server", long_about = None)]
struct Args {
    /// Bind host
    #[arg(long, env = "NADO_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port
    #[arg(short, long, env = "NADO_PORT", default_value_t = nado_server::network::DEFAULT_PORT)]
    port: u16,

    /// Largest request body accepted, in bytes
    #[arg(long, env = "NADO_MAX_BODY_SIZE", default_value_t = nado_server::network::DEFAULT_MAX_BODY_SIZE)]
    max_body_size: usize,

    /// Seconds to wait for in-flight connections on shutdown
    #[arg(long, env = "NADO_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,

    /// Scheduler consumer count [default: min(32, 2*cores+4)]
    #[arg(short, long, env = "NADO_WORKERS")]
    workers: Option<usize>,

    /// Queue level-1 units instead of running them on the accepting task
    #[arg(long, env = "NADO_NO_INLINE")]
    no_inline: bool,

    /// Upper bound on threads running blocking units
    #[arg(long, env = "NADO_BLOCKING_THREADS", default_value_t = 64)]
    blocking_threads: usize,

    /// Admission counting window, seconds
    #[arg(long, env = "NADO_CHECK_WINDOW_SECS", default_value_t = 60)]
    check_window_secs: u64,

    /// Admission refresh step, seconds
    #[arg(long, env = "NADO_REFRESH_WINDOW_SECS", default_value_t = 30)]
    refresh_window_secs: u64,

    /// Requests allowed per address per window
    #[arg(long, env = "NADO_ALLOW_THRESHOLD", default_value_t = 120)]
    allow_threshold: u32,

    /// Shared signing secret
    #[arg(long, env = "NADO_SIGNING_SECRET", default_value = nado_core::signing::DEFAULT_SECRET, hide_env_values = true)]
    signing_secret: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            network: NetworkConfig {
                host: self.host,
                port: self.port,
                max_body_size: self.max_body_size,
                drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            },
            admission: AdmissionConfig {
                check_window_secs: self.check_window_secs,
                refresh_window_secs: self.refresh_window_secs,
                allow_threshold: self.allow_threshold,
            },
            scheduler: SchedulerConfig {
                worker_count: self.workers.unwrap_or_else(default_worker_count),
                inline_highest_priority: !self.no_inline,
                blocking_threads: self.blocking_threads,
            },
            signing_secret: self.signing_secret,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let config = args.into_config();
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.scheduler.blocking_threads)
        .thread_name("nado-worker")
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: ServerConfig) -> Result<()> {
    let mut registry = UnitRegistry::new();
    register_defaults(&mut registry);
    info!(units = registry.len(), namespaces = ?registry.namespaces(), "units registered");

    let mut module = NetworkModule::from_config(&config, registry)?;
    module.start().await?;

    module
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c; serving until killed");
                std::future::pending::<()>().await;
            }
            info!("ctrl-c received, shutting down");
        })
        .await
}

//! Proxyprobe - Entry Point
//!
//! Runs either a repeating probe schedule or a single probe, with immediate
//! shutdown on Ctrl+C / SIGTERM.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proxyprobe::config::{Config, LogConfig, RunMode};
use proxyprobe::output::{ConsoleSink, ResultSink};
use proxyprobe::probe::{Prober, ReqwestTransport};
use proxyprobe::scheduler::{RunOutcome, Scheduler};

/// Exit status used when the run was interrupted
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LogConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            });
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log);

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!("Probe run failed: {}", e.describe());
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> proxyprobe::Result<ExitCode> {
    info!(
        "Probing {} ({} proxies configured, {} capture)",
        config.probe.target_url,
        config.proxies.len(),
        config.probe.capture
    );

    let transport = Arc::new(ReqwestTransport::with_pool(
        config.probe.request_timeout,
        &config.proxies,
    )?);
    let prober = Prober::new(config.probe.target_url.clone(), transport, config.probe.capture);
    let mut scheduler = Scheduler::new(prober, config.proxies.clone());
    let mut sink = ConsoleSink::stdout();

    match config.probe.mode {
        RunMode::Single => {
            let result = scheduler
                .single_test(config.probe.use_proxy, config.probe.proxy_index)
                .await;
            sink.record(&result);
            Ok(ExitCode::SUCCESS)
        }
        RunMode::Schedule => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                shutdown_signal().await;
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            });

            let summary = scheduler
                .run(&config.schedule(), &mut sink, shutdown_rx)
                .await;

            match summary.outcome {
                RunOutcome::Completed => {
                    info!("Schedule finished: {} probes", summary.completed);
                    Ok(ExitCode::SUCCESS)
                }
                RunOutcome::Cancelled => {
                    info!("Schedule interrupted after {} probes", summary.completed);
                    Ok(ExitCode::from(EXIT_INTERRUPTED))
                }
            }
        }
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("proxyprobe={}", log.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use stream_processor::bus::InMemoryBus;
use stream_processor::metrics::MetricsRegistry;
use stream_processor::{Config, IngestLoop};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level);

    // The real event bus is an external collaborator (see SPEC_FULL.md §10);
    // this binary wires the in-memory implementation so the engine runs
    // standalone. A production deployment supplies its own EventConsumer/
    // EventProducer backed by a real broker client.
    let bus = InMemoryBus::new();
    let metrics = Arc::new(MetricsRegistry::new());

    let ingest_loop = IngestLoop::new(config, bus.consumer(), bus.producer(), metrics);
    let cancel = ingest_loop.cancellation_token();

    let run_handle = tokio::spawn(ingest_loop.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
        result = terminate_signal() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
            }
        }
    }

    cancel.cancel();
    run_handle.await.context("ingest loop task panicked")?;

    Ok(())
}

#[cfg(unix)]
async fn terminate_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    term.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate_signal() -> std::io::Result<()> {
    std::future::pending().await
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

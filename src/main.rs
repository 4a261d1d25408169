use tenant_schema_gateway::activity::TracingEventSink;
use tenant_schema_gateway::api::AppState;
use tenant_schema_gateway::config::Config;
use tenant_schema_gateway::pool::PoolManager;
use tenant_schema_gateway::router;
use tenant_schema_gateway::service::TenantService;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_result = dotenvy::dotenv();
    let config = Config::from_env()?;
    let _log_guard = init_tracing(&config);

    if let Err(e) = dotenv_result {
        debug!("Environment taken from process only ({})", e);
    }

    let socket_addr = config.socket_addr()?;
    info!(
        "Tenant schema gateway starting on {} (per-schema pool {}, budget {}, idle timeout {:?})",
        socket_addr,
        config.max_connections_per_schema,
        config.max_total_connections,
        config.pool_idle_timeout
    );

    let cleanup_interval = config.cleanup_interval;
    let pool_manager = Arc::new(PoolManager::new(config).await?);

    let service = Arc::new(TenantService::new(
        pool_manager.clone(),
        Arc::new(TracingEventSink),
    ));
    service.bootstrap().await?;

    let app = router(AppState {
        service,
        start_time: Instant::now(),
    });

    let reaper = spawn_pool_reaper(pool_manager.clone(), cleanup_interval);

    let listener = tokio::net::TcpListener::bind(&socket_addr).await?;
    info!("Accepting requests on {}", socket_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.abort();
    pool_manager.shutdown_all();
    info!("Tenant schema gateway stopped");

    Ok(())
}

/// Console plus daily-rolled JSON file output. The returned guard flushes the
/// file writer on drop and must live until shutdown.
fn init_tracing(config: &Config) -> WorkerGuard {
    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!(
            "Warning: cannot create log directory {}: {}",
            config.log_dir.display(),
            e
        );
    }

    let file_appender =
        RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "tenant-schema-gateway.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tenant_schema_gateway=debug,activity=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_writer(file_writer),
        )
        .init();

    debug!("Writing JSON logs to {}", config.log_dir.display());
    guard
}

/// Periodically close schema pools that have sat idle past the configured timeout.
fn spawn_pool_reaper(pool_manager: Arc<PoolManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            let evicted = pool_manager.cleanup_idle_pools();
            if evicted > 0 {
                debug!(
                    "Pool reaper evicted {} pools, {} still cached",
                    evicted,
                    pool_manager.active_pools()
                );
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received, draining connections");
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use auditix::catalog::CatalogRegistry;
use auditix::config::AppConfig;
use auditix::AppState;
use mimalloc::MiMalloc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Grace period for in-flight audits once a shutdown signal arrives.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auditix=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // rustls 0.23 needs a process-wide crypto provider before any TLS config is built.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let catalogs = CatalogRegistry::load(config.catalog_dir.as_deref())
        .context("Failed to load check catalogs")?;

    let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to resolve {}:{}", config.host, config.port))?
        .next()
        .with_context(|| format!("No address for {}:{}", config.host, config.port))?;

    let state = AppState::new(config.clone(), Arc::new(catalogs));
    let shutdown = state.shutdown.clone();
    let app = auditix::routes::router(state);

    match &config.tls {
        Some(tls) => {
            let rustls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &tls.cert_path,
                &tls.key_path,
            )
            .await
            .context("Failed to load TLS certificate and key")?;

            let handle = axum_server::Handle::new();
            let signal_handle = handle.clone();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
                signal_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            tracing::info!(host = %addr, tls = true, "Starting audit server");
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::info!(host = %addr, tls = false, "Starting audit server");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    wait_for_shutdown_signal().await;
                    tracing::info!("Shutdown signal received");
                    shutdown.cancel();
                })
                .await?;
        }
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

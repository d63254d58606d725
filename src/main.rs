use anyhow::Context as _;
use estate_proxy::config::Config;
use estate_proxy::proxy::{self, PLACES_PREFIX, PROPERTIES_PREFIX};
use estate_proxy::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;
    config.log_summary();

    let router = proxy::build_router(&config).context("failed to build proxy routes")?;
    let server = Server::bind(config.listen_addr()).await?;

    let addr = server.local_addr();
    tracing::info!(%addr, "CRM proxy server running");
    tracing::info!(route = %format!("http://{addr}{PROPERTIES_PREFIX}"), "properties");
    tracing::info!(route = %format!("http://{addr}{PLACES_PREFIX}"), "places");

    server.serve(router, shutdown_signal()).await?;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

use marketloom::bootstrap::Application;
use marketloom::config::Config;
use marketloom::infrastructure::observability;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    observability::init_tracing(&config.log_level, config.log_format);

    let _metrics_handle = match observability::install_recorder(config.observability_port) {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!(error = %e, "failed to install prometheus recorder, continuing without it");
            None
        }
    };

    info!("building application");
    let app = Application::build(config).await?;

    app.start().await?;
    info!("running until shutdown signal");

    wait_for_shutdown_signal().await;

    info!("shutdown signal received, stopping");
    app.stop().await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received ctrl-c");
}

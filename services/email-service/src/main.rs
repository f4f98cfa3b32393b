//! Email service entry point.

use acton_dispatch::Dispatcher;
use email_service::{router, EmailServiceConfig, SmtpMailer};
use std::net::SocketAddr;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting email service");

    // Load configuration
    let config = EmailServiceConfig::load()?;

    let mailer = SmtpMailer::new(&config.smtp)?;
    let dispatcher = Dispatcher::new("mail", config.dispatch, mailer)?;
    dispatcher.start()?;

    // Build the address
    let addr: SocketAddr = format!("{}:{}", config.service.host, config.service.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Email service listening");

    axum::serve(listener, router(dispatcher.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let deadline = config.service.shutdown_timeout();
    info!(?deadline, "Draining mail dispatcher");

    if let Err(err) = dispatcher.shutdown(deadline).await {
        error!(error = %err, "Email service did not shut down cleanly");
        return Ok(ExitCode::FAILURE);
    }

    info!("Email service stopped");
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

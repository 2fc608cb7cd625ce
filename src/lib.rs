pub mod auth;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod server;

use auth::{EchoUserAuth, OtpRetentionMap};
use channel::spawn_channel;
use config::Config;
use server::{build_router, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Builds the full application (Channel, OTP store, router) and serves
/// it on `config.bind_addr` until a shutdown signal arrives.
pub async fn run(config: Config) -> std::io::Result<()> {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let channel = spawn_channel(&config);
    let otp = OtpRetentionMap::new(config.otp_retention);
    otp.spawn_sweeper(config.otp_sweep_period, shutdown.clone());

    let state = AppState {
        channel: channel.clone(),
        otp,
        user_authenticator: Arc::new(EchoUserAuth),
        config: config.clone(),
    };
    let router = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    channel.stop();
    shutdown.cancel();
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
        () = shutdown.cancelled() => {}
    }
    info!("shutdown signal received");
}

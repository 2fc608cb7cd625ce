use chathub::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = Config::from_env();
    if let Err(err) = chathub::run(config).await {
        tracing::error!(error = %err, "server exited with an error");
        std::process::exit(1);
    }
}

use anyhow::Result;
use beacon_server::Config;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{
    EnvFilter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(config.log_level.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = config.build().await?;
    let cancellation_token = CancellationToken::new();

    let mut server_future = Box::pin(server.run(cancellation_token.clone()));
    tokio::select! {
        result = &mut server_future => {
            // The server stopped on its own; a deploy-path error here is
            // fatal and must fail the process.
            result?;
            tracing::info!("Server shutdown gracefully");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C signal, initiating graceful shutdown");
            cancellation_token.cancel();
            match server_future.await {
                Ok(()) => tracing::info!("Server shutdown gracefully"),
                Err(err) => tracing::error!("Server encountered an error: {err:#}"),
            }
        }
    }

    Ok(())
}

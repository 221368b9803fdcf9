use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use memory_sync::mcp::run_mcp_server;
use memory_sync::shared::{Config, MemoryService, connect_store};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries JSON-RPC only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
        )
        .init();

    let config = Config::load()?;
    let store = connect_store(&config).await?;
    let service = Arc::new(MemoryService::new(&config, store));

    let http_shutdown = CancellationToken::new();
    let http = config.http.enabled.then(|| {
        let service = service.clone();
        let bind = config.http.bind.clone();
        let shutdown = http_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = memory_sync::http::serve(service, &bind, shutdown).await {
                error!("HTTP API failed: {:#}", e);
            }
        })
    });

    let result = tokio::select! {
        result = run_mcp_server(service.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    http_shutdown.cancel();
    if let Some(http) = http {
        let _ = http.await;
    }
    service.shutdown().await;
    result
}

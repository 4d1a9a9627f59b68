//! evalserve: shared-variable command server over TCP.
//!
//! Run with: cargo run -p evalserve-server -- --port 12346
//!
//! Then connect with any line-based client, e.g. `nc 127.0.0.1 12346`.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use evalserve_core::MemoryStore;
use evalserve_executor::ScriptExecutor;
use evalserve_transport::{
    Server, ServerConfig,
    config::{DEFAULT_GREETING, DEFAULT_HOST, DEFAULT_PORT},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "evalserve",
    version,
    about = "Serve a shared variable namespace over a TCP line protocol"
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "EVALSERVE_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "EVALSERVE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Line sent to each client on connect.
    #[arg(long, default_value = DEFAULT_GREETING)]
    greeting: String,
}

impl Cli {
    fn config(self) -> ServerConfig {
        ServerConfig::new(self.host, self.port).with_greeting(self.greeting)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Cli::parse().config();
    let server = Server::bind(
        &config,
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptExecutor::new()),
    )
    .await
    .context("Failed to start server")?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                shutdown.shutdown();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {e}"),
        }
    });

    server.run().await;
    Ok(())
}

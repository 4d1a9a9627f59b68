//! Accept loop and shutdown.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use evalserve_core::{CodeExecutor, VariableStore};
use evalserve_session::Dispatcher;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_stream::{StreamExt, wrappers::TcpListenerStream};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::ServerConfig,
    connection::{ConnectionContext, handle_connection},
};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Server error.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Triggers the same graceful shutdown as a client's `/close`.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// TCP server for the line protocol.
pub struct Server {
    listener: TcpListener,
    ctx: ConnectionContext,
    tracker: TaskTracker,
}

impl Server {
    /// Bind the listening socket.
    ///
    /// # Errors
    /// Returns error if the address cannot be bound.
    pub async fn bind(
        config: &ServerConfig,
        store: Arc<dyn VariableStore>,
        executor: Arc<dyn CodeExecutor>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.address())
            .await
            .map_err(|source| ServerError::Bind {
                host: config.host.clone(),
                port: config.port,
                source,
            })?;

        Ok(Self {
            listener,
            ctx: ConnectionContext {
                dispatcher: Dispatcher::new(store, executor),
                greeting: Arc::from(config.greeting.as_str()),
                shutdown: CancellationToken::new(),
            },
            tracker: TaskTracker::new(),
        })
    }

    /// Address actually bound; useful with port 0.
    ///
    /// # Errors
    /// Returns error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.ctx.shutdown.clone(),
        }
    }

    /// Accept connections until shutdown, then wait for every connection
    /// to close.
    pub async fn run(self) {
        let Self {
            listener,
            ctx,
            tracker,
        } = self;
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Server listening on {addr}");
        }

        let mut incoming = TcpListenerStream::new(listener);
        loop {
            tokio::select! {
                biased;
                () = ctx.shutdown.cancelled() => break,
                next = incoming.next() => match next {
                    Some(Ok(stream)) => {
                        let peer = match stream.peer_addr() {
                            Ok(peer) => peer,
                            Err(e) => {
                                tracing::warn!("Dropping connection without peer address: {e}");
                                continue;
                            }
                        };
                        tracker.spawn(handle_connection(stream, peer, ctx.clone()));
                    }
                    Some(Err(e)) => {
                        tracing::error!("Accept error: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    None => break,
                },
            }
        }

        // Stop listening before waiting on open connections.
        drop(incoming);
        tracing::info!("Server shutting down");
        tracker.close();
        tracker.wait().await;
        tracing::info!("Server stopped");
    }
}

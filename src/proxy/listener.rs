//! Accept loop

use super::{serve_connection, ProxyOptions};
use crate::metrics::counters;
use crate::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::Instrument;

/// Pause after a failed accept (e.g. file descriptor exhaustion) before retrying
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP listener serving each accepted connection in its own task
pub struct Listener {
    listener: TcpListener,
    options: Arc<ProxyOptions>,
}

impl Listener {
    /// Bind to `addr`
    pub async fn bind(addr: impl ToSocketAddrs, options: ProxyOptions) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, options))
    }

    /// Serve connections from an already bound listener
    pub fn from_listener(listener: TcpListener, options: ProxyOptions) -> Self {
        Self {
            listener,
            options: Arc::new(options),
        }
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Per-connection failures are logged and never stop the loop. Sessions already
    /// running when `shutdown` fires are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = %self.local_addr()?, "listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        counters::connection_accepted();
                        let options = Arc::clone(&self.options);
                        tokio::spawn(
                            handle_connection(stream, options)
                                .instrument(tracing::info_span!("session", %peer)),
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
            }
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("options", &self.options)
            .finish()
    }
}

async fn handle_connection(stream: TcpStream, options: Arc<ProxyOptions>) {
    tracing::debug!("accepted connection");
    if let Err(e) = stream.set_nodelay(true) {
        tracing::trace!(error = %e, "failed to set TCP_NODELAY");
    }

    match serve_connection(stream, &options).await {
        Ok(closed) if closed.is_clean() => {
            tracing::info!(direction = %closed.direction, bytes = closed.bytes, "session closed");
        }
        Ok(closed) => {
            tracing::warn!(%closed, "session closed with error");
        }
        Err(e) if e.is_client_attributable() => {
            tracing::info!(kind = e.kind(), error = %e, "connection rejected");
        }
        Err(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "connection failed");
        }
    }
}

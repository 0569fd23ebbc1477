//! TLS-terminating relay
//!
//! A session runs three phases in order:
//! 1. the plaintext SSLRequest is answered with `'S'` ([`interceptor`])
//! 2. TLS is terminated, the StartupMessage is read and routed, and an encrypted
//!    connection to the backend is opened ([`backend`])
//! 3. bytes are copied both ways until one side closes ([`relay`])

mod backend;
pub mod interceptor;
mod listener;
mod options;
pub mod relay;
pub mod routing;

pub use listener::Listener;
pub use options::{ProxyOptions, ProxyOptionsBuilder};
pub use relay::{Direction, RelayClosed};
pub use routing::{BackendResolver, DatabaseRoutes, Rejection, ServerNameResolver, StaticBackend};

use crate::connection::{Connection, SessionState};
use crate::metrics::{counters, histograms};
use crate::protocol::StartupFrame;
use crate::{Error, Result};
use options::fatal;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::{client, server};

type ClientStream<S> = server::TlsStream<S>;
type BackendStream = client::TlsStream<TcpStream>;

/// Serve one accepted connection to completion.
///
/// Returns how the relay ended, or the error that stopped the session before the
/// relay started. Either way both connections are closed when this returns.
pub async fn serve_connection<S>(stream: S, options: &ProxyOptions) -> Result<RelayClosed>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let started = Instant::now();
    let mut state = SessionState::Initial;

    let (client, backend) = match establish(stream, options, &mut state).await {
        Ok(pair) => pair,
        Err(e) => {
            counters::session_error(e.kind());
            let _ = state.transition(SessionState::Closed);
            return Err(e);
        }
    };

    histograms::handshake_duration(started.elapsed().as_millis() as u64);
    counters::session_established();
    state.transition(SessionState::Relaying)?;
    tracing::debug!("relaying");

    let closed = relay::relay(client, backend).await;

    state.transition(SessionState::Closed)?;
    histograms::session_duration(started.elapsed().as_millis() as u64);
    Ok(closed)
}

/// Phases 1 and 2: everything up to a forwarded StartupMessage
async fn establish<S>(
    stream: S,
    options: &ProxyOptions,
    state: &mut SessionState,
) -> Result<(ClientStream<S>, BackendStream)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hint = options.error_hint();

    let mut plain = Connection::new(stream);
    interceptor::accept_ssl_request(&mut plain, hint).await?;
    state.transition(SessionState::NegotiatingTls)?;

    // The interceptor guarantees nothing is left buffered
    let (stream, _) = plain.into_parts();
    let (tls, server_name) = backend::accept_client_tls(stream, options).await?;
    let mut client = Connection::new(tls);
    state.transition(SessionState::AwaitingStartup)?;

    if let Err(e) = backend::check_server_name(server_name.as_deref(), options) {
        let message = match &e {
            Error::RoutingRejected(message) => message.as_str(),
            _ => backend::PROXY_MISCONFIGURED,
        };
        client.send_fatal(&fatal(message, hint)).await;
        return Err(e);
    }

    let startup = match client.receive_startup().await {
        Ok(StartupFrame::Startup(startup)) => startup,
        Ok(other) => {
            client
                .send_fatal(&fatal("unsupported startup message", hint))
                .await;
            return Err(Error::ProtocolViolation(format!(
                "expected StartupMessage after TLS, got {}",
                other.name()
            )));
        }
        Err(e @ Error::ProtocolViolation(_)) => {
            if !client.peer_closed() {
                client.send_fatal(&fatal("invalid startup packet", hint)).await;
            }
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    tracing::debug!(
        params = startup.params.len(),
        user = startup.params.get("user").unwrap_or(""),
        database = startup.params.get("database").unwrap_or(""),
        "received StartupMessage"
    );

    let addr = match options.backend_resolver().resolve(&startup.params) {
        Ok(addr) => addr,
        Err(rejection) => {
            client.send_fatal(&fatal(rejection.message(), hint)).await;
            return Err(Error::RoutingRejected(rejection.message().to_string()));
        }
    };
    state.transition(SessionState::ConnectingBackend)?;
    tracing::debug!(backend = %addr, "resolved backend");

    let backend = match backend::connect_backend(&addr, &startup, client.buffered(), options).await
    {
        Ok(backend) => backend,
        Err(e) => {
            client
                .send_fatal(&fatal(backend::BACKEND_UNAVAILABLE, hint))
                .await;
            return Err(e);
        }
    };

    let (client, _) = client.into_parts();
    Ok((client, backend))
}

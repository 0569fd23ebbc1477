//! TLS termination towards the client and the encrypted dial towards the backend

use super::options::ProxyOptions;
use crate::connection::server_name_for_addr;
use crate::protocol::constants::ssl_response;
use crate::protocol::{encode_ssl_request, encode_startup, StartupMessage};
use crate::{Error, Result};
use rustls::server::Acceptor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::{client, server, LazyConfigAcceptor, TlsConnector};

/// Sent to the client for every backend-side failure; backend error text never leaks
pub(crate) const BACKEND_UNAVAILABLE: &str = "unable to reach backend SQL server";

/// Sent to the client when the proxy itself is misconfigured
pub(crate) const PROXY_MISCONFIGURED: &str = "proxy configuration error";

/// Complete the server-side TLS handshake, capturing the SNI the client sent.
///
/// The ClientHello is read before the handshake proceeds; the shared server config is
/// used unchanged.
pub(crate) async fn accept_client_tls<S>(
    stream: S,
    options: &ProxyOptions,
) -> Result<(server::TlsStream<S>, Option<String>)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let start = LazyConfigAcceptor::new(Acceptor::default(), stream)
        .await
        .map_err(|e| Error::Tls(format!("failed to read ClientHello: {}", e)))?;

    let server_name = start.client_hello().server_name().map(str::to_owned);
    tracing::debug!(
        sni = server_name.as_deref().unwrap_or(""),
        "received ClientHello"
    );

    let tls = start
        .into_stream(options.server_tls().server_config())
        .await
        .map_err(|e| Error::Tls(format!("handshake with client failed: {}", e)))?;

    Ok((tls, server_name))
}

/// Apply the server-name policy.
///
/// Succeeds when no resolver is configured or the resolver answers "no override".
pub(crate) fn check_server_name(server_name: Option<&str>, options: &ProxyOptions) -> Result<()> {
    let Some(resolver) = options.server_name_resolver() else {
        return Ok(());
    };

    match resolver.resolve(server_name.unwrap_or("")) {
        Err(rejection) => Err(Error::RoutingRejected(rejection.message().to_string())),
        Ok(Some(addr)) if !addr.is_empty() => Err(Error::Config(format!(
            "server name resolver returned backend '{}', but routing by server name is not implemented",
            addr
        ))),
        Ok(_) => Ok(()),
    }
}

/// Dial `addr`, negotiate TLS with it and forward the client's startup.
///
/// `pipelined` holds bytes the client sent after its StartupMessage; they follow the
/// re-encoded startup in the same write.
pub(crate) async fn connect_backend(
    addr: &str,
    startup: &StartupMessage,
    pipelined: &[u8],
    options: &ProxyOptions,
) -> Result<client::TlsStream<TcpStream>> {
    let server_name = match options.backend_server_name() {
        Some(name) => name.clone(),
        None => server_name_for_addr(addr)?,
    };

    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| Error::BackendUnreachable {
            addr: addr.to_string(),
            source,
        })?;
    if let Err(e) = stream.set_nodelay(true) {
        tracing::trace!(error = %e, "failed to set TCP_NODELAY on backend socket");
    }
    tracing::debug!("connected to backend");

    request_backend_tls(&mut stream).await?;

    let connector = TlsConnector::from(options.backend_tls().client_config());
    let mut tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::backend_handshake("TLS handshake", e))?;
    tracing::debug!(mode = %options.backend_tls().mode(), "TLS established with backend");

    let mut buf = encode_startup(startup);
    buf.extend_from_slice(pipelined);
    tls.write_all(&buf)
        .await
        .map_err(|e| Error::backend_handshake("forwarding startup", e))?;
    tls.flush()
        .await
        .map_err(|e| Error::backend_handshake("forwarding startup", e))?;

    Ok(tls)
}

/// Send an SSLRequest on a plaintext backend stream and require `'S'`.
///
/// There is no plaintext fallback.
pub(crate) async fn request_backend_tls<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&encode_ssl_request())
        .await
        .map_err(|e| Error::backend_handshake("sending SSLRequest", e))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::backend_handshake("sending SSLRequest", e))?;

    let mut response = [0u8; 1];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| Error::backend_handshake("reading SSLRequest response", e))?;

    match response[0] {
        ssl_response::ACCEPT => Ok(()),
        other => Err(Error::BackendRefusedEncryption(other)),
    }
}

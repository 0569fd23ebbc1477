//! Plaintext startup: the client must ask for TLS before anything else

use super::options::fatal;
use crate::connection::Connection;
use crate::protocol::constants::ssl_response;
use crate::protocol::StartupFrame;
use crate::{Error, Result};
use tokio::io::{AsyncRead, AsyncWrite};

/// Sent when the first frame is anything but an SSLRequest
pub(crate) const REQUIRES_ENCRYPTION: &str = "server requires encryption";

/// Read the client's first frame and accept its SSLRequest.
///
/// On success exactly one byte (`'S'`) has been written and the read buffer is empty,
/// so the TLS handshake can start on the raw stream. Any other frame gets a fatal
/// ErrorResponse and fails with `ProtocolViolation`.
pub async fn accept_ssl_request<S>(conn: &mut Connection<S>, error_hint: Option<&str>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = match conn.receive_startup().await {
        Ok(frame) => frame,
        Err(e @ Error::ProtocolViolation(_)) => {
            if !conn.peer_closed() {
                conn.send_fatal(&fatal(REQUIRES_ENCRYPTION, error_hint)).await;
            }
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    if frame != StartupFrame::SslRequest {
        tracing::debug!(frame = frame.name(), "client did not request TLS");
        conn.send_fatal(&fatal(REQUIRES_ENCRYPTION, error_hint)).await;
        return Err(Error::ProtocolViolation(format!(
            "expected SSLRequest, got {}",
            frame.name()
        )));
    }

    // Plaintext sent ahead of our answer would end up inside the TLS stream
    if !conn.buffered().is_empty() {
        let stray = conn.buffered().len();
        conn.send_fatal(&fatal(REQUIRES_ENCRYPTION, error_hint)).await;
        return Err(Error::ProtocolViolation(format!(
            "{} bytes of plaintext after SSLRequest",
            stray
        )));
    }

    conn.send(&[ssl_response::ACCEPT]).await?;
    tracing::debug!("accepted SSLRequest");
    Ok(())
}

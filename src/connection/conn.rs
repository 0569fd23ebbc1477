//! Framed connection used during the startup phase

use crate::protocol::{decode_startup, encode_error_response, ErrorFields, StartupFrame};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One side of a proxied session, with a read buffer for startup framing.
///
/// Bytes read past the end of a frame stay buffered and are handed back by
/// [`Connection::into_parts`], so nothing the peer pipelined is lost.
pub struct Connection<S> {
    stream: S,
    read_buf: BytesMut,
    peer_closed: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(1024),
            peer_closed: false,
        }
    }

    /// Receive one startup frame
    ///
    /// Malformed frames and EOF before a complete frame are protocol violations.
    pub async fn receive_startup(&mut self) -> Result<StartupFrame> {
        loop {
            match decode_startup(&mut self.read_buf) {
                Ok((frame, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(frame);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(Error::ProtocolViolation(e.to_string())),
            }

            // Need more data
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                self.peer_closed = true;
                return Err(Error::ProtocolViolation(
                    "connection closed during startup".into(),
                ));
            }
        }
    }

    /// Write bytes and flush
    pub async fn send(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send a fatal ErrorResponse, then shut the stream down
    ///
    /// Best effort: the peer may already be gone, and the session is ending either way.
    pub async fn send_fatal(&mut self, error: &ErrorFields) {
        let buf = encode_error_response(error);
        if let Err(e) = self.send(&buf).await {
            tracing::debug!(error = %e, "failed to deliver error response");
        }
        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!(error = %e, "shutdown after error response failed");
        }
    }

    /// Whether the peer closed its side while a frame was expected
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Bytes received but not yet decoded
    pub fn buffered(&self) -> &[u8] {
        &self.read_buf
    }

    /// Take the stream and any buffered bytes
    pub fn into_parts(self) -> (S, BytesMut) {
        (self.stream, self.read_buf)
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("buffered", &self.read_buf.len())
            .field("peer_closed", &self.peer_closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_ssl_request, encode_startup, StartupMessage, StartupParams};
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_receive_startup_across_reads() {
        let ssl = encode_ssl_request();
        let mock = Builder::new().read(&ssl[..3]).read(&ssl[3..]).build();

        let mut conn = Connection::new(mock);
        let frame = conn.receive_startup().await.unwrap();
        assert_eq!(frame, StartupFrame::SslRequest);
        assert!(conn.buffered().is_empty());
    }

    #[tokio::test]
    async fn test_receive_startup_keeps_pipelined_bytes() {
        let msg = StartupMessage::new(
            vec![("database", "mydb")]
                .into_iter()
                .collect::<StartupParams>(),
        );
        let mut wire = encode_startup(&msg).to_vec();
        wire.extend_from_slice(b"Q\0\0\0\x0dSELECT 1\0");
        let mock = Builder::new().read(&wire).build();

        let mut conn = Connection::new(mock);
        let frame = conn.receive_startup().await.unwrap();
        assert_eq!(frame, StartupFrame::Startup(msg));

        let (_, rest) = conn.into_parts();
        assert_eq!(&rest[..], b"Q\0\0\0\x0dSELECT 1\0");
    }

    #[tokio::test]
    async fn test_receive_startup_eof() {
        let mock = Builder::new().read(&[0, 0, 0, 8]).build();

        let mut conn = Connection::new(mock);
        let err = conn.receive_startup().await.unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
        assert!(err.to_string().contains("closed during startup"));
        assert!(conn.peer_closed());
    }

    #[tokio::test]
    async fn test_receive_startup_invalid_length() {
        let mock = Builder::new().read(&[0xFF, 0xFF, 0xFF, 0xFF]).build();

        let mut conn = Connection::new(mock);
        let err = conn.receive_startup().await.unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
        assert!(!conn.peer_closed());
    }

    #[tokio::test]
    async fn test_send_fatal_writes_error_response() {
        let fields = ErrorFields::fatal("server requires encryption");
        let expected = encode_error_response(&fields);
        let mock = Builder::new().write(&expected).build();

        let mut conn = Connection::new(mock);
        conn.send_fatal(&fields).await;
    }
}

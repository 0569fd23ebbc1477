//! Bidirectional byte relay between the client and the backend

use crate::metrics::{counters, labels};
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Upper bound on closing the destination after a leg reaches EOF
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Direction of one relay leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to backend
    ClientToBackend,
    /// Backend to client
    BackendToClient,
}

impl Direction {
    /// Metric and log label
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClientToBackend => labels::CLIENT_TO_BACKEND,
            Self::BackendToClient => labels::BACKEND_TO_CLIENT,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a relay ended: the leg that finished first.
///
/// This is the normal outcome of a session, not an error. `error` is the I/O error
/// that stopped the leg, if it did not end with a clean EOF.
#[derive(Debug)]
pub struct RelayClosed {
    /// Leg that finished first
    pub direction: Direction,
    /// Bytes that leg copied
    pub bytes: u64,
    /// Error that terminated the leg
    pub error: Option<io::Error>,
}

impl RelayClosed {
    /// Whether the relay ended by EOF or an abrupt peer disconnect
    pub fn is_clean(&self) -> bool {
        self.error.as_ref().map_or(true, is_disconnect)
    }
}

impl fmt::Display for RelayClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} closed after {} bytes", self.direction, self.bytes)?;
        if let Some(ref e) = self.error {
            write!(f, ": {}", e)?;
        }
        Ok(())
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
    )
}

/// Copy bytes both ways until one leg finishes.
///
/// Each leg runs in its own task and owns one read half and one write half. The first
/// leg to finish wins; the other is aborted, and both streams are closed before this
/// returns.
pub async fn relay<C, B>(client: C, backend: B) -> RelayClosed
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (backend_read, backend_write) = tokio::io::split(backend);

    let (done_tx, mut done_rx) = mpsc::channel(2);

    let outgoing = tokio::spawn(copy_leg(
        client_read,
        backend_write,
        Direction::ClientToBackend,
        done_tx.clone(),
    ));
    let incoming = tokio::spawn(copy_leg(
        backend_read,
        client_write,
        Direction::BackendToClient,
        done_tx,
    ));

    let closed = done_rx.recv().await.unwrap_or_else(|| RelayClosed {
        direction: Direction::ClientToBackend,
        bytes: 0,
        error: Some(io::Error::new(io::ErrorKind::Other, "relay task panicked")),
    });

    outgoing.abort();
    incoming.abort();
    // Cancellation drops the halves, closing both streams
    let _ = outgoing.await;
    let _ = incoming.await;

    counters::relay_closed(closed.direction.label(), closed.is_clean());
    closed
}

async fn copy_leg<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    done: mpsc::Sender<RelayClosed>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (bytes, result) = copy_until_eof(&mut reader, &mut writer, direction).await;

    // Propagate end-of-stream (close_notify and FIN) to the destination. A peer that
    // stops reading must not hold the session open.
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::trace!(%direction, error = %e, "shutdown after copy failed"),
        Err(_) => tracing::debug!(%direction, "shutdown after copy timed out"),
    }

    tracing::debug!(%direction, bytes, "relay leg finished");
    let _ = done
        .send(RelayClosed {
            direction,
            bytes,
            error: result.err(),
        })
        .await;
}

async fn copy_until_eof<R, W>(
    reader: &mut R,
    writer: &mut W,
    direction: Direction,
) -> (u64, io::Result<()>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return (total, Ok(())),
            Ok(n) => n,
            Err(e) => return (total, Err(e)),
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            return (total, Err(e));
        }
        if let Err(e) = writer.flush().await {
            return (total, Err(e));
        }

        total += n as u64;
        counters::bytes_relayed(direction.label(), n as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, ReadBuf};

    /// Accepts writes but never reads and never finishes a shutdown, like a peer
    /// whose receive window is full
    struct StalledPeer;

    impl AsyncRead for StalledPeer {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for StalledPeer {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_relay_both_directions() {
        let (client, mut client_peer) = duplex(1024);
        let (backend, mut backend_peer) = duplex(1024);

        let relay = tokio::spawn(relay(client, backend));

        client_peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        backend_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        backend_peer.write_all(b"pong").await.unwrap();
        client_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        // Client hangs up; the backend must observe EOF
        drop(client_peer);
        let mut rest = Vec::new();
        backend_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let closed = relay.await.unwrap();
        assert_eq!(closed.direction, Direction::ClientToBackend);
        assert_eq!(closed.bytes, 4);
        assert!(closed.is_clean());
    }

    #[tokio::test]
    async fn test_backend_close_ends_session() {
        let (client, mut client_peer) = duplex(1024);
        let (backend, mut backend_peer) = duplex(1024);

        let relay = tokio::spawn(relay(client, backend));

        backend_peer.write_all(b"bye").await.unwrap();
        backend_peer.shutdown().await.unwrap();

        let mut received = Vec::new();
        client_peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");

        let closed = relay.await.unwrap();
        assert_eq!(closed.direction, Direction::BackendToClient);
        assert_eq!(closed.bytes, 3);
        assert!(closed.error.is_none());
    }

    #[tokio::test]
    async fn test_stalled_shutdown_does_not_hold_session() {
        let (client, mut client_peer) = duplex(1024);
        let relay = tokio::spawn(relay(client, StalledPeer));

        client_peer.write_all(b"Q").await.unwrap();
        client_peer.shutdown().await.unwrap();

        let closed = tokio::time::timeout(SHUTDOWN_TIMEOUT * 5, relay)
            .await
            .expect("relay ended despite a stalled shutdown")
            .unwrap();
        assert_eq!(closed.direction, Direction::ClientToBackend);
        assert_eq!(closed.bytes, 1);
        assert!(closed.error.is_none());
    }

    #[test]
    fn test_clean_classification() {
        let closed = RelayClosed {
            direction: Direction::BackendToClient,
            bytes: 10,
            error: Some(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        };
        assert!(closed.is_clean());

        let closed = RelayClosed {
            direction: Direction::BackendToClient,
            bytes: 10,
            error: Some(io::Error::new(io::ErrorKind::InvalidData, "bad record mac")),
        };
        assert!(!closed.is_clean());
        assert_eq!(
            closed.to_string(),
            "backend_to_client closed after 10 bytes: bad record mac"
        );
    }
}

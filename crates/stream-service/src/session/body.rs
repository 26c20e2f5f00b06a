//! Response body stream of a session.

use bytes::Bytes;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::sync::DropGuard;

/// Chunks relayed from the transcode stage to the HTTP response.
///
/// Holds a drop guard on the session's cancellation token, so the session
/// learns about a client disconnect the moment hyper drops the body. The
/// guard is declared first so it fires before the channel closes.
pub struct SessionBody {
    _guard: DropGuard,
    receiver: mpsc::Receiver<std::io::Result<Bytes>>,
}

impl SessionBody {
    pub(crate) fn new(receiver: mpsc::Receiver<std::io::Result<Bytes>>, guard: DropGuard) -> Self {
        Self {
            _guard: guard,
            receiver,
        }
    }
}

impl Stream for SessionBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_yields_chunks_then_ends() {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        let mut body = SessionBody::new(rx, token.clone().drop_guard());

        tx.send(Ok(Bytes::from_static(b"one"))).await.unwrap();
        drop(tx);

        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"one"));
        assert!(body.next().await.is_none());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_cancels_before_channel_closes() {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1);
        let body = SessionBody::new(rx, token.clone().drop_guard());

        drop(body);

        assert!(token.is_cancelled());
        assert!(tx.send(Ok(Bytes::new())).await.is_err());
    }
}

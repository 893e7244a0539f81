//! Bounded producer/consumer byte relay.
//!
//! A producer task pushes variable-sized chunks through a [`RelaySender`];
//! the consumer pulls them back out through [`RelayReader`], which implements
//! [`AsyncRead`] and hands the bytes out in whatever buffer size the caller
//! picks. At most `capacity` chunks are in flight: `send` waits while the
//! relay is full and reads wait until a chunk, an error or end-of-stream
//! arrives.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// Returned by [`RelaySender`] once the reader has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("relay reader was dropped")]
pub struct RelayClosed;

/// Create a relay holding at most `capacity` chunks (minimum 1).
pub fn channel(capacity: usize) -> (RelaySender, RelayReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        RelaySender { tx },
        RelayReader {
            rx,
            pending: Bytes::new(),
            finished: false,
        },
    )
}

/// Producing half of a relay. Dropping it signals end-of-stream.
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl RelaySender {
    /// Push a chunk, waiting while the relay is full.
    ///
    /// Empty chunks are skipped so that a zero-length read always means
    /// end-of-stream on the other side.
    pub async fn send(&self, chunk: Bytes) -> Result<(), RelayClosed> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx.send(Ok(chunk)).await.map_err(|_| RelayClosed)
    }

    /// Deliver `error` to the reader after any chunks already queued.
    pub async fn fail(self, error: io::Error) -> Result<(), RelayClosed> {
        self.tx.send(Err(error)).await.map_err(|_| RelayClosed)
    }

    /// Whether the reader has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half of a relay.
#[derive(Debug)]
pub struct RelayReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    pending: Bytes,
    finished: bool,
}

impl AsyncRead for RelayReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                let chunk = this.pending.split_to(n);
                buf.put_slice(&chunk);
                return Poll::Ready(Ok(()));
            }
            if this.finished {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => this.pending = chunk,
                Some(Err(error)) => {
                    this.finished = true;
                    return Poll::Ready(Err(error));
                }
                None => {
                    this.finished = true;
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}

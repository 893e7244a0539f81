//! Cancellation context shared by every suspension point of a call.
//!
//! A [`RequestContext`] pairs a [`CancellationToken`] with an optional
//! deadline. The backoff sleep, the transport call and body reads all race
//! against [`RequestContext::done`], so cancelling the token or reaching the
//! deadline stops a call at whichever of those points it is waiting on.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Done {
    /// The token was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The deadline attached to the context has passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl From<Done> for io::Error {
    fn from(reason: Done) -> Self {
        let kind = match reason {
            Done::Cancelled => io::ErrorKind::Interrupted,
            Done::DeadlineExceeded => io::ErrorKind::TimedOut,
        };
        io::Error::new(kind, reason)
    }
}

/// Cancellation token plus an optional deadline.
///
/// Clones share the same token, so cancelling any clone cancels all of them.
/// Deadlines only ever tighten: [`with_timeout`](Self::with_timeout) and
/// [`with_deadline`](Self::with_deadline) keep whichever deadline is earlier.
///
/// # Examples
///
/// ```rust
/// use krest_core::{Done, RequestContext};
/// use std::time::Duration;
///
/// # async fn example() {
/// let ctx = RequestContext::new().with_timeout(Duration::from_secs(2));
/// let child = ctx.clone();
/// ctx.cancel();
/// assert_eq!(child.done().await, Done::Cancelled);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Create a context that is never done until cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, typically one owned by the caller's task.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Attach a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Attach an absolute deadline, keeping the earlier one if already set.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the reason this context is done, or `None` if it is still live.
    pub fn done_reason(&self) -> Option<Done> {
        if self.token.is_cancelled() {
            return Some(Done::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(Done::DeadlineExceeded),
            _ => None,
        }
    }

    /// Whether the context has been cancelled or has expired.
    pub fn is_done(&self) -> bool {
        self.done_reason().is_some()
    }

    /// Resolves once the token is cancelled or the deadline passes.
    pub async fn done(&self) -> Done {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Done::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Done::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Done::Cancelled
            }
        }
    }

    /// Drive `future` to completion unless the context finishes first.
    ///
    /// The future is dropped as soon as the context is done, which is how
    /// in-flight I/O gets aborted.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, Done>
    where
        F: Future,
    {
        if let Some(reason) = self.done_reason() {
            return Err(reason);
        }

        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = future => Ok(output),
        }
    }

    /// Bind `reader` to this context.
    ///
    /// Reads fail with [`io::ErrorKind::Interrupted`] once the context is
    /// cancelled and with [`io::ErrorKind::TimedOut`] once the deadline
    /// passes, even while the inner reader is stalled.
    pub fn bind_reader<R>(&self, reader: R) -> ContextReader<R> {
        let ctx = self.clone();
        ContextReader {
            inner: reader,
            done: Box::pin(async move { ctx.done().await }),
            reason: None,
        }
    }
}

/// Reader that stops yielding data once its [`RequestContext`] is done.
///
/// Created by [`RequestContext::bind_reader`].
pub struct ContextReader<R> {
    inner: R,
    done: Pin<Box<dyn Future<Output = Done> + Send>>,
    reason: Option<Done>,
}

impl<R> ContextReader<R> {
    /// Unwrap the inner reader, detaching it from the context.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> fmt::Debug for ContextReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextReader")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ContextReader<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.reason.is_none() {
            if let Poll::Ready(reason) = this.done.as_mut().poll(cx) {
                this.reason = Some(reason);
            }
        }
        if let Some(reason) = this.reason {
            return Poll::Ready(Err(reason.into()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

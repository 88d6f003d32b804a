//! Watch-backed streams over link state
//!
//! Both streams have latest-value-wins semantics: a slow consumer sees the
//! most recent value, never a backlog.

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::types::{ConnectionState, TelemetrySnapshot};

pin_project! {
    /// Stream of telemetry snapshots.
    ///
    /// Yields the current snapshot first (if one has arrived), then each
    /// replacement. Ends when the link is dropped.
    pub struct TelemetryStream {
        #[pin]
        inner: WatchStream<Option<Arc<TelemetrySnapshot>>>,
    }
}

impl TelemetryStream {
    pub(crate) fn new(rx: watch::Receiver<Option<Arc<TelemetrySnapshot>>>) -> Self {
        Self { inner: WatchStream::new(rx) }
    }
}

impl Stream for TelemetryStream {
    type Item = Arc<TelemetrySnapshot>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Some(snapshot))) => return Poll::Ready(Some(snapshot)),
                // Nothing received yet
                Poll::Ready(Some(None)) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pin_project! {
    /// Stream of connection states, starting with the current one.
    pub struct StateStream {
        #[pin]
        inner: WatchStream<ConnectionState>,
    }
}

impl StateStream {
    pub(crate) fn new(rx: watch::Receiver<ConnectionState>) -> Self {
        Self { inner: WatchStream::new(rx) }
    }
}

impl Stream for StateStream {
    type Item = ConnectionState;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

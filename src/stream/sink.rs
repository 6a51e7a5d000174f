use super::StreamSink;
use crate::error::{Error, StreamError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Item type carried from the assembler to the response body
pub type BodyItem = Result<Bytes, Arc<Error>>;

/// Create a bounded sink/body pair.
///
/// `capacity` chunks may be buffered between the two; beyond that the
/// assembler blocks (for at most `write_timeout`). Dropping the
/// [`BodyStream`] cancels `cancel`, which aborts in-flight fetches.
pub fn channel_sink(
    capacity: usize,
    write_timeout: Duration,
    cancel: CancellationToken,
) -> (ChannelSink, BodyStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSink {
            tx: Some(tx),
            write_timeout,
        },
        BodyStream {
            inner: ReceiverStream::new(rx),
            cancel,
        },
    )
}

/// [`StreamSink`] feeding a bounded channel
pub struct ChannelSink {
    tx: Option<mpsc::Sender<BodyItem>>,
    write_timeout: Duration,
}

#[async_trait]
impl StreamSink for ChannelSink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), StreamError> {
        let tx = self.tx.as_ref().ok_or(StreamError::ConsumerGone)?;
        match tokio::time::timeout(self.write_timeout, tx.send(Ok(chunk))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(StreamError::ConsumerGone),
            Err(_) => Err(StreamError::ConsumerStalled(self.write_timeout)),
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        // Dropping the sender ends the body stream
        self.tx.take();
        Ok(())
    }

    async fn abort(&mut self, error: Arc<Error>) {
        if let Some(tx) = self.tx.take() {
            let _ = tokio::time::timeout(self.write_timeout, tx.send(Err(error))).await;
        }
    }
}

/// Receiving half of [`channel_sink`]; usable as an HTTP response body
pub struct BodyStream {
    inner: ReceiverStream<BodyItem>,
    cancel: CancellationToken,
}

impl Stream for BodyStream {
    type Item = BodyItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

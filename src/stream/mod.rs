//! Ordered streaming of one payload file from Usenet to a consumer.
//!
//! [`StreamAssembler`] fetches and decodes segments ahead of the writer (the
//! prefetch window) and hands decoded bytes to a [`StreamSink`] strictly in
//! sequence order. [`channel_sink`] connects a stream to an HTTP response body.

mod assembler;
mod sink;

pub use assembler::StreamAssembler;
pub use sink::{BodyItem, BodyStream, ChannelSink, channel_sink};

use crate::error::{Error, StreamError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Decoded bytes of one segment, tagged with its sequence number
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedChunk {
    /// 1-based segment number
    pub number: u32,
    /// Decoded payload bytes
    pub data: Bytes,
}

/// Destination for an assembled stream
#[async_trait]
pub trait StreamSink: Send {
    /// Deliver the next chunk. Chunks arrive in sequence order.
    ///
    /// Fails with [`StreamError::ConsumerGone`] or
    /// [`StreamError::ConsumerStalled`] when the consumer cannot take more.
    async fn write(&mut self, chunk: Bytes) -> Result<(), StreamError>;

    /// Signal that the stream completed successfully
    async fn close(&mut self) -> Result<(), StreamError>;

    /// Signal that the stream failed; the consumer should see an error
    /// rather than a clean end of stream.
    async fn abort(&mut self, error: Arc<Error>) {
        let _ = error;
    }
}

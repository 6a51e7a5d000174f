//! Core types for nzbio

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use utoipa::ToSchema;

/// Unique identifier for one stream (one `/play` request)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct StreamId(pub u64);

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

impl StreamId {
    /// Allocate the next process-unique id
    pub fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Assembler lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", content = "segment", rename_all = "snake_case")]
pub enum StreamState {
    /// Parsing the manifest and choosing the payload
    Selecting,
    /// Waiting for segment `n` to arrive
    Fetching(u32),
    /// Decoding segment `n`
    Decoding(u32),
    /// Writing segment `n` to the sink
    Emitting(u32),
    /// Every segment written and the sink closed
    Complete,
    /// A segment escalated or the overall deadline elapsed
    Failed,
    /// The consumer went away or the stream was cancelled
    Cancelled,
}

impl StreamState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Complete | StreamState::Failed | StreamState::Cancelled
        )
    }
}

/// Event emitted during a stream's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Payload selected, segments about to be fetched
    StreamStarted {
        /// Stream ID
        id: StreamId,
        /// Subject of the chosen file entry
        subject: String,
        /// Number of segments in the payload
        segments: u32,
        /// Sum of declared segment sizes (advisory)
        declared_bytes: u64,
    },

    /// A segment failed on one server and is being tried on another
    SegmentRetry {
        /// Stream ID
        id: StreamId,
        /// Sequence number of the segment
        segment: u32,
        /// Server (host:port) that failed
        server: String,
        /// Failure that triggered the retry
        error: String,
    },

    /// Every segment was written and the sink closed
    StreamCompleted {
        /// Stream ID
        id: StreamId,
        /// Decoded bytes emitted
        bytes: u64,
        /// Segments emitted
        segments: u32,
        /// Cross-server retries performed
        retries: u32,
    },

    /// The stream was abandoned because of an upstream fault
    StreamFailed {
        /// Stream ID
        id: StreamId,
        /// Error message
        error: String,
        /// Decoded bytes emitted before the failure
        bytes: u64,
    },

    /// The consumer went away or the stream was cancelled
    StreamCancelled {
        /// Stream ID
        id: StreamId,
        /// Decoded bytes emitted before cancellation
        bytes: u64,
    },
}

impl Event {
    /// Stream the event belongs to
    pub fn stream_id(&self) -> StreamId {
        match self {
            Event::StreamStarted { id, .. }
            | Event::SegmentRetry { id, .. }
            | Event::StreamCompleted { id, .. }
            | Event::StreamFailed { id, .. }
            | Event::StreamCancelled { id, .. } => *id,
        }
    }
}

/// Outcome of a completed stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StreamSummary {
    /// Decoded bytes emitted
    pub bytes: u64,
    /// Segments emitted
    pub segments: u32,
    /// Cross-server retries performed
    pub retries: u32,
}

/// An in-progress stream, as listed by the service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StreamInfo {
    /// Stream identifier
    pub id: StreamId,
    /// Payload filename (or subject when no quoted name is present)
    pub filename: String,
    /// Segments in the payload file
    pub segments: u32,
    /// Encoded size declared by the manifest
    pub declared_bytes: u64,
    /// Unix timestamp when the stream was opened
    pub started_at: i64,
}

/// Snapshot of one server's connection usage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServerStats {
    /// Server (host:port)
    pub server: String,
    /// Connection budget
    pub max_connections: usize,
    /// Sessions currently open (idle + checked out)
    pub open: usize,
    /// Sessions sitting idle in the pool
    pub idle: usize,
    /// Sessions checked out by fetches
    pub in_use: usize,
    /// Whether the server is skipped after an authentication failure
    pub auth_cooldown: bool,
    /// Sessions opened since startup
    pub sessions_opened: u64,
    /// Sessions discarded after an error since startup
    pub sessions_discarded: u64,
}

/// Snapshot of the whole server pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PoolStats {
    /// Per-server statistics in priority order
    pub servers: Vec<ServerStats>,
    /// Whether the pool has been shut down
    pub shut_down: bool,
}

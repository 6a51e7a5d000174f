use super::{DecodedChunk, StreamSink};
use crate::config::StreamConfig;
use crate::error::{Error, Result, StreamError};
use crate::nntp::{ServerPool, fetch_article};
use crate::nzb::{FileEntry, SegmentRef};
use crate::types::{Event, StreamId, StreamState, StreamSummary};
use crate::yenc;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fetch task for one segment, tagged with its sequence number
type SegmentTask = (u32, JoinHandle<Result<DecodedChunk>>);

/// Drives fetch and decode for every segment of one payload file and emits
/// the decoded bytes in sequence order.
///
/// Up to `prefetch_window` segments are fetched on their own tasks, so they
/// keep moving while the consumer is slow to accept earlier bytes. A segment
/// that fails on one server is retried on each other configured server in
/// turn; when none is left the stream fails with `SegmentUnavailable`.
/// Segments are never skipped.
pub struct StreamAssembler {
    id: StreamId,
    file: FileEntry,
    prefetch_window: usize,
    request_timeout: Duration,
    fetcher: Arc<SegmentFetcher>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl StreamAssembler {
    /// Create an assembler for `file`, already chosen by the payload selector
    pub fn new(
        id: StreamId,
        file: FileEntry,
        pool: Arc<ServerPool>,
        config: &StreamConfig,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        let fetcher = Arc::new(SegmentFetcher {
            stream_id: id,
            pool,
            article_timeout: config.article_timeout,
            acquire_timeout: config.acquire_timeout,
            event_tx: event_tx.clone(),
            cancel: cancel.child_token(),
            retries: AtomicU32::new(0),
        });
        Self {
            id,
            file,
            prefetch_window: config.prefetch_window.max(1),
            request_timeout: config.request_timeout,
            fetcher,
            event_tx,
            cancel,
        }
    }

    /// Stream every segment into `sink`.
    ///
    /// On success the sink is closed. On an upstream failure the sink is
    /// aborted with the error so the consumer sees a broken stream rather
    /// than a short one.
    pub async fn run<S: StreamSink>(
        self,
        mut sink: S,
    ) -> std::result::Result<StreamSummary, Arc<Error>> {
        let segments = self.file.segments.len() as u32;
        tracing::info!(
            stream_id = self.id.0,
            subject = %self.file.subject,
            segments,
            prefetch_window = self.prefetch_window,
            "stream started"
        );
        self.emit(Event::StreamStarted {
            id: self.id,
            subject: self.file.subject.clone(),
            segments,
            declared_bytes: self.file.declared_bytes(),
        });

        let mut summary = StreamSummary::default();
        let outcome = self.pump(&mut sink, &mut summary).await;
        summary.retries = self.fetcher.retries.load(Ordering::Relaxed);

        let outcome = match outcome {
            Ok(()) => sink.close().await.map_err(Error::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    stream_id = self.id.0,
                    bytes = summary.bytes,
                    segments = summary.segments,
                    retries = summary.retries,
                    state = ?StreamState::Complete,
                    "stream completed"
                );
                self.emit(Event::StreamCompleted {
                    id: self.id,
                    bytes: summary.bytes,
                    segments: summary.segments,
                    retries: summary.retries,
                });
                Ok(summary)
            }
            Err(e) if e.is_consumer_error() => {
                tracing::debug!(
                    stream_id = self.id.0,
                    bytes = summary.bytes,
                    reason = %e,
                    state = ?StreamState::Cancelled,
                    "stream cancelled"
                );
                self.emit(Event::StreamCancelled {
                    id: self.id,
                    bytes: summary.bytes,
                });
                let error = Arc::new(e);
                // A stream cancelled from above may still have a reader
                if matches!(error.as_ref(), Error::Stream(StreamError::Cancelled)) {
                    sink.abort(error.clone()).await;
                }
                Err(error)
            }
            Err(e) => {
                tracing::warn!(
                    stream_id = self.id.0,
                    bytes = summary.bytes,
                    error = %e,
                    state = ?StreamState::Failed,
                    "stream failed"
                );
                self.emit(Event::StreamFailed {
                    id: self.id,
                    error: e.to_string(),
                    bytes: summary.bytes,
                });
                let error = Arc::new(e);
                sink.abort(error.clone()).await;
                Err(error)
            }
        }
    }

    async fn pump<S: StreamSink>(&self, sink: &mut S, summary: &mut StreamSummary) -> Result<()> {
        let mut in_flight = VecDeque::with_capacity(self.prefetch_window);

        let outcome = match tokio::time::timeout(
            self.request_timeout,
            self.emit_in_order(sink, summary, &mut in_flight),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StreamError::Timeout(self.request_timeout).into()),
        };

        // Anything still in flight belongs to an abandoned stream; wait for
        // the tasks so their sessions are back with the pool on return
        self.fetcher.cancel.cancel();
        for (_, task) in in_flight {
            task.abort();
            let _ = task.await;
        }
        outcome
    }

    async fn emit_in_order<S: StreamSink>(
        &self,
        sink: &mut S,
        summary: &mut StreamSummary,
        in_flight: &mut VecDeque<SegmentTask>,
    ) -> Result<()> {
        let mut queued = self.file.segments.iter();

        loop {
            self.schedule(&mut queued, in_flight);
            let Some((number, task)) = in_flight.front_mut() else {
                break;
            };
            self.trace_state(StreamState::Fetching(*number));

            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StreamError::Cancelled.into()),
                joined = task => joined,
            };
            in_flight.pop_front();
            let chunk = joined.map_err(|e| Error::Other(format!("segment task failed: {}", e)))??;

            // Refill before writing so the window stays full while the
            // consumer takes its time
            self.schedule(&mut queued, in_flight);

            self.trace_state(StreamState::Emitting(chunk.number));
            let len = chunk.data.len() as u64;
            if len > 0 {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(StreamError::Cancelled.into()),
                    written = sink.write(chunk.data) => written?,
                }
            }

            summary.bytes += len;
            summary.segments += 1;
        }
        Ok(())
    }

    /// Start fetch tasks until the window is full or no segment is left
    fn schedule(
        &self,
        queued: &mut std::slice::Iter<'_, SegmentRef>,
        in_flight: &mut VecDeque<SegmentTask>,
    ) {
        while in_flight.len() < self.prefetch_window {
            let Some(segment) = queued.next() else { break };
            let number = segment.number;
            let segment = segment.clone();
            let fetcher = self.fetcher.clone();
            let task = tokio::spawn(async move { fetcher.fetch(&segment).await });
            in_flight.push_back((number, task));
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn trace_state(&self, state: StreamState) {
        tracing::trace!(stream_id = self.id.0, state = ?state, "stream state");
    }
}

/// Per-stream state shared by the segment fetch tasks
struct SegmentFetcher {
    stream_id: StreamId,
    pool: Arc<ServerPool>,
    article_timeout: Duration,
    acquire_timeout: Duration,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
    retries: AtomicU32,
}

impl SegmentFetcher {
    /// Fetch and decode one segment, failing over across servers
    async fn fetch(&self, segment: &SegmentRef) -> Result<DecodedChunk> {
        let mut tried = HashSet::new();
        let mut last_error: Option<Error> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(StreamError::Cancelled.into());
            }

            let acquired = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StreamError::Cancelled.into()),
                acquired = self.pool.acquire_excluding(&tried, self.acquire_timeout) => acquired,
            };
            let mut session = match acquired {
                Ok(session) => session,
                Err(e) => {
                    return Err(match last_error {
                        None => e,
                        Some(last) => StreamError::SegmentUnavailable {
                            number: segment.number,
                            message_id: segment.message_id.clone(),
                            attempts: tried.len(),
                            last_error: Box::new(last),
                        }
                        .into(),
                    });
                }
            };

            let server = session.server().to_string();
            tried.insert(session.server_index());

            // Cancelling drops the session mid-exchange, which discards it
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StreamError::Cancelled.into()),
                fetched = fetch_article(&mut session, segment, self.article_timeout) => fetched,
            };

            let error = match fetched {
                Ok(raw) => {
                    self.pool.release(session);
                    tracing::trace!(
                        stream_id = self.stream_id.0,
                        state = ?StreamState::Decoding(segment.number),
                        "stream state"
                    );
                    match decode(raw).await {
                        Ok(data) => {
                            return Ok(DecodedChunk {
                                number: segment.number,
                                data,
                            });
                        }
                        Err(e) => e,
                    }
                }
                Err(e) => {
                    if e.session_reusable() {
                        self.pool.release(session);
                    } else {
                        self.pool.discard(session);
                    }
                    Error::Article(e)
                }
            };

            if tried.len() < self.pool.server_count() {
                self.retries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    stream_id = self.stream_id.0,
                    segment = segment.number,
                    server = %server,
                    error = %error,
                    "segment failed, trying next server"
                );
                // No subscribers is fine
                let _ = self.event_tx.send(Event::SegmentRetry {
                    id: self.stream_id,
                    segment: segment.number,
                    server,
                    error: error.to_string(),
                });
            }
            last_error = Some(error);
        }
    }
}

async fn decode(raw: Vec<u8>) -> Result<bytes::Bytes> {
    let part = tokio::task::spawn_blocking(move || yenc::decode(&raw))
        .await
        .map_err(|e| Error::Other(format!("decode task failed: {}", e)))??;
    Ok(part.data)
}

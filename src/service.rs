//! Stream orchestration: from an NZB URL to a running stream.
//!
//! [`StreamService`] owns everything shared between requests: the server
//! pool, the HTTP client used for NZB, indexer and metadata requests, the
//! event channel and the registry of active streams. Each `open_stream` call
//! fetches and parses one manifest, picks the payload and spawns a
//! [`StreamAssembler`] feeding the returned body.

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{Error, Result, StreamError};
use crate::nntp::{Connector, NntpConnector, ServerPool};
use crate::nzb::{ManifestLimits, fetch_nzb, parse_manifest, select_payload};
use crate::stream::{BodyStream, StreamAssembler, channel_sink};
use crate::types::{Event, PoolStats, StreamId, StreamInfo};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A stream that has been set up and is producing its body
pub struct OpenedStream {
    /// Stream identifier (matches the events it emits)
    pub id: StreamId,
    /// Payload filename
    pub filename: String,
    /// Encoded size declared by the manifest
    pub declared_bytes: u64,
    /// Decoded bytes in order; ends with an `Err` item if the stream fails
    pub body: BodyStream,
}

struct ActiveStream {
    info: StreamInfo,
    cancel: CancellationToken,
}

/// Shared entry point for streaming and catalog requests
#[derive(Clone)]
pub struct StreamService {
    config: Arc<Config>,
    pool: Arc<ServerPool>,
    http: reqwest::Client,
    catalog: Catalog,
    event_tx: broadcast::Sender<Event>,
    active: Arc<Mutex<HashMap<StreamId, ActiveStream>>>,
    accepting_new: Arc<AtomicBool>,
}

impl StreamService {
    /// Create a service talking to real NNTP servers
    pub fn new(config: Config) -> Result<Self> {
        Self::with_connector(config, Arc::new(NntpConnector))
    }

    /// Create a service opening NNTP sessions through `connector`
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("nzbio/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))?;

        let pool = Arc::new(ServerPool::new(
            config.servers.clone(),
            connector,
            config.retry.clone(),
            &config.stream,
        ));
        let catalog = Catalog::new(http.clone(), &config);
        let (event_tx, _) = broadcast::channel(1000);

        tracing::info!(
            servers = config.servers.len(),
            indexers = config.indexers.len(),
            prefetch_window = config.stream.prefetch_window,
            "stream service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            pool,
            http,
            catalog,
            event_tx,
            active: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Current configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Catalog used for stream listings
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Subscribe to stream lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Fetch the NZB at `nzb_url` and start streaming its payload file.
    ///
    /// Returns once the manifest has been parsed and the assembler spawned;
    /// failures after that point arrive through the body.
    pub async fn open_stream(&self, nzb_url: &str) -> Result<OpenedStream> {
        if !self.accepting_new.load(Ordering::SeqCst) || self.pool.is_shut_down() {
            return Err(Error::ShuttingDown);
        }
        if self.pool.server_count() == 0 {
            return Err(StreamError::NoServerAvailable("no NNTP servers configured".into()).into());
        }

        let stream_config = &self.config.stream;
        let document = fetch_nzb(
            &self.http,
            nzb_url,
            stream_config.manifest_timeout,
            stream_config.max_manifest_bytes,
        )
        .await?;

        let limits = ManifestLimits::from(stream_config);
        let (title, file) = tokio::task::spawn_blocking(move || {
            let manifest = parse_manifest(&document, limits)?;
            let file = select_payload(&manifest)?.clone();
            Ok::<_, Error>((manifest.title().map(str::to_string), file))
        })
        .await
        .map_err(|e| Error::Other(format!("manifest task failed: {}", e)))??;

        let id = StreamId::next();
        let filename = file.filename().unwrap_or(&file.subject).to_string();
        let declared_bytes = file.declared_bytes();
        let cancel = CancellationToken::new();
        let (sink, body) = channel_sink(
            stream_config.channel_capacity,
            stream_config.sink_write_timeout,
            cancel.clone(),
        );

        tracing::info!(
            stream_id = id.0,
            title = ?title,
            filename = %filename,
            segments = file.segments.len(),
            declared_bytes,
            "stream opened"
        );

        let info = StreamInfo {
            id,
            filename: filename.clone(),
            segments: file.segments.len() as u32,
            declared_bytes,
            started_at: chrono::Utc::now().timestamp(),
        };
        self.active.lock().await.insert(
            id,
            ActiveStream {
                info,
                cancel: cancel.clone(),
            },
        );

        let assembler = StreamAssembler::new(
            id,
            file,
            self.pool.clone(),
            stream_config,
            self.event_tx.clone(),
            cancel,
        );
        let active = self.active.clone();
        tokio::spawn(async move {
            // Outcome is already logged and broadcast by the assembler
            let _ = assembler.run(sink).await;
            active.lock().await.remove(&id);
        });

        Ok(OpenedStream {
            id,
            filename,
            declared_bytes,
            body,
        })
    }

    /// Streams currently running, oldest first
    pub async fn list_streams(&self) -> Vec<StreamInfo> {
        let mut streams: Vec<StreamInfo> = self
            .active
            .lock()
            .await
            .values()
            .map(|s| s.info.clone())
            .collect();
        streams.sort_by_key(|s| s.id);
        streams
    }

    /// Connection usage across all servers
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Stop accepting streams, cancel running ones and close the pool
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);

        let cancelled = {
            let active = self.active.lock().await;
            for stream in active.values() {
                stream.cancel.cancel();
            }
            active.len()
        };
        if cancelled > 0 {
            tracing::info!(streams = cancelled, "cancelled active streams");
        }

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_streams())
            .await
            .is_err()
        {
            tracing::warn!("timeout waiting for streams to stop, closing pool anyway");
        }

        self.pool.shutdown();
        tracing::info!("shutdown complete");
        Ok(())
    }

    async fn wait_for_active_streams(&self) {
        loop {
            let active_count = self.active.lock().await.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "waiting for active streams to stop");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

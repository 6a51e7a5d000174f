//! Scripted NNTP servers for pool, fetcher and assembler tests.

use super::{ConnectError, Connector, NntpSession};
use crate::config::{RetryConfig, ServerConfig};
use crate::error::ArticleError;
use crate::nzb::{FileEntry, SegmentRef};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Behaviour of one fake server, keyed by host in [`MockConnector`]
#[derive(Default)]
pub(crate) struct MockServer {
    articles: HashMap<String, Vec<u8>>,
    delays: HashMap<String, Duration>,
    stepped: HashMap<String, (u32, Duration)>,
    broken: HashSet<String>,
    fetch_delay: Duration,
    failing_connects: AtomicU32,
    reject_auth: bool,
    connects: AtomicUsize,
    fetches: AtomicUsize,
    open_sessions: AtomicUsize,
}

impl MockServer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for the bracketed `message_id`
    pub(crate) fn with_article(mut self, message_id: &str, body: Vec<u8>) -> Self {
        self.articles.insert(message_id.to_string(), body);
        self
    }

    /// Serve every article of `payload`
    pub(crate) fn with_payload(self, payload: &TestPayload) -> Self {
        self.with_payload_except(payload, &[])
    }

    /// Serve every article of `payload` except the given segment numbers
    pub(crate) fn with_payload_except(mut self, payload: &TestPayload, missing: &[u32]) -> Self {
        for (segment, article) in payload.file.segments.iter().zip(&payload.articles) {
            if !missing.contains(&segment.number) {
                self.articles.insert(segment.bracketed_id(), article.clone());
            }
        }
        self
    }

    /// Serve a corrupted copy of the given segment (one flipped data byte)
    pub(crate) fn with_corrupt_segment(mut self, payload: &TestPayload, number: u32) -> Self {
        let index = (number - 1) as usize;
        let mut article = payload.articles[index].clone();
        let header_end = article.iter().position(|&b| b == b'\n').unwrap_or(0) + 1;
        let ypart_end = header_end
            + article[header_end..]
                .iter()
                .position(|&b| b == b'\n')
                .unwrap_or(0)
            + 1;
        if let Some(byte) = article[ypart_end..]
            .iter_mut()
            .find(|b| (b'A'..b'z').contains(&**b))
        {
            *byte += 1;
        }
        self.articles
            .insert(payload.file.segments[index].bracketed_id(), article);
        self
    }

    /// Delay the response for one article
    pub(crate) fn with_delay(mut self, message_id: &str, delay: Duration) -> Self {
        self.delays.insert(message_id.to_string(), delay);
        self
    }

    /// Answer one article only after `steps` sleeps of `step` each. Every
    /// step needs the fetch to be polled again, so the article stalls while
    /// nobody drives it.
    pub(crate) fn with_stepped_delay(mut self, message_id: &str, steps: u32, step: Duration) -> Self {
        self.stepped.insert(message_id.to_string(), (steps, step));
        self
    }

    /// Delay every article response
    pub(crate) fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Fail the transfer of one article mid-exchange
    pub(crate) fn with_broken_article(mut self, message_id: &str) -> Self {
        self.broken.insert(message_id.to_string());
        self
    }

    /// Refuse the first `n` connection attempts
    pub(crate) fn failing_connects(self, n: u32) -> Self {
        self.failing_connects.store(n, Ordering::SeqCst);
        self
    }

    /// Reject credentials on every connection
    pub(crate) fn rejecting_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }
}

/// [`Connector`] dispatching on `ServerConfig::host` to scripted servers
#[derive(Default)]
pub(crate) struct MockConnector {
    servers: Mutex<HashMap<String, Arc<MockServer>>>,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_server(self: Arc<Self>, host: &str, server: MockServer) -> Arc<Self> {
        self.servers
            .lock()
            .unwrap()
            .insert(host.to_string(), Arc::new(server));
        self
    }

    fn server(&self, host: &str) -> Option<Arc<MockServer>> {
        self.servers.lock().unwrap().get(host).cloned()
    }

    /// Connection attempts made against `host`
    pub(crate) fn connects(&self, host: &str) -> usize {
        self.server(host)
            .map(|s| s.connects.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Article requests made against `host`
    pub(crate) fn fetches(&self, host: &str) -> usize {
        self.server(host)
            .map(|s| s.fetches.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Sessions to `host` that have not been dropped yet
    pub(crate) fn open_sessions(&self, host: &str) -> usize {
        self.server(host)
            .map(|s| s.open_sessions.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn NntpSession>, ConnectError> {
        let server = self
            .server(&config.host)
            .ok_or_else(|| ConnectError::Connection(format!("unknown host {}", config.host)))?;

        server.connects.fetch_add(1, Ordering::SeqCst);

        let remaining = server.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            server.failing_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(ConnectError::Connection("connection refused".into()));
        }
        if server.reject_auth {
            return Err(ConnectError::Auth("481 authentication rejected".into()));
        }

        server.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession { server }))
    }
}

struct MockSession {
    server: Arc<MockServer>,
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.server.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NntpSession for MockSession {
    async fn fetch_article(&mut self, message_id: &str) -> Result<Vec<u8>, ArticleError> {
        self.server.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .server
            .delays
            .get(message_id)
            .copied()
            .unwrap_or(self.server.fetch_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(&(steps, step)) = self.server.stepped.get(message_id) {
            for _ in 0..steps {
                tokio::time::sleep(step).await;
            }
        }

        if self.server.broken.contains(message_id) {
            return Err(ArticleError::Transfer {
                message_id: message_id.to_string(),
                reason: "connection reset by peer".into(),
            });
        }

        self.server
            .articles
            .get(message_id)
            .cloned()
            .ok_or_else(|| ArticleError::NotFound {
                message_id: message_id.to_string(),
            })
    }
}

/// Retry policy that keeps tests fast: two retries, millisecond delays
pub(crate) fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// TLS server config for a mock host on port 563
pub(crate) fn mock_server_config(host: &str, connections: usize) -> ServerConfig {
    ServerConfig {
        host: host.to_string(),
        port: 563,
        tls: true,
        username: Some("user".to_string()),
        password: Some("pass".to_string()),
        connections,
    }
}

/// A file split into yEnc-encoded segments
pub(crate) struct TestPayload {
    /// Original bytes
    pub data: Vec<u8>,
    /// Manifest entry describing the segments
    pub file: FileEntry,
    /// Encoded article bodies, indexed like `file.segments`
    pub articles: Vec<Vec<u8>>,
}

/// Build a payload of `segments` parts of `segment_size` bytes each
pub(crate) fn build_payload(segments: usize, segment_size: usize) -> TestPayload {
    let total = segments * segment_size;
    let data: Vec<u8> = (0..total).map(|i| (i * 7 + i / 251) as u8).collect();

    let mut refs = Vec::with_capacity(segments);
    let mut articles = Vec::with_capacity(segments);
    for (index, chunk) in data.chunks(segment_size).enumerate() {
        let number = index as u32 + 1;
        let begin = (index * segment_size) as u64 + 1;
        let end = begin + chunk.len() as u64 - 1;
        let article = nntp_rs::yenc_encode(
            chunk,
            "movie.mkv",
            128,
            Some((number, segments as u32, begin, end, total as u64)),
        )
        .unwrap();
        refs.push(SegmentRef {
            number,
            bytes: article.len() as u64,
            message_id: format!("seg{}@test.example", number),
        });
        articles.push(article);
    }

    TestPayload {
        data,
        file: FileEntry {
            poster: "tester@example.com".to_string(),
            subject: format!("movie [1/1] - \"movie.mkv\" yEnc (1/{})", segments),
            date: Some(1_700_000_000),
            groups: vec!["alt.binaries.test".to_string()],
            segments: refs,
        },
        articles,
    }
}

impl TestPayload {
    /// NZB document listing this payload plus a small decoy `.nfo` file
    pub(crate) fn nzb_document(&self) -> String {
        let segments: String = self
            .file
            .segments
            .iter()
            .map(|s| {
                format!(
                    r#"<segment bytes="{}" number="{}">{}</segment>"#,
                    s.bytes, s.number, s.message_id
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <head><meta type="title">Test Movie</meta></head>
  <file poster="{}" date="1700000000" subject="{}">
    <groups><group>alt.binaries.test</group></groups>
    <segments>{}</segments>
  </file>
  <file poster="x" date="1700000000" subject="movie.nfo (1/1)">
    <groups><group>alt.binaries.test</group></groups>
    <segments><segment bytes="10" number="1">nfo@test.example</segment></segments>
  </file>
</nzb>"#,
            self.file.poster,
            self.file.subject.replace('"', "&quot;"),
            segments
        )
    }
}

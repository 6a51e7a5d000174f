//! In-memory NNTP servers behind the public `Connector` trait

use async_trait::async_trait;
use nzbio::ServerConfig;
use nzbio::error::ArticleError;
use nzbio::nntp::{ConnectError, Connector, NntpSession};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Articles held by one scripted server, keyed by bare message ID
#[derive(Default)]
pub struct ScriptedServer {
    articles: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl ScriptedServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_article(mut self, message_id: &str, body: Vec<u8>) -> Self {
        self.articles.insert(message_id.to_string(), body);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

/// Connector routing each configured host to a scripted server
#[derive(Default)]
pub struct ScriptedConnector {
    servers: HashMap<String, Arc<ScriptedServer>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, host: &str, server: ScriptedServer) -> Self {
        self.servers.insert(host.to_string(), Arc::new(server));
        self
    }

    pub fn server(&self, host: &str) -> Arc<ScriptedServer> {
        self.servers[host].clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, server: &ServerConfig) -> Result<Box<dyn NntpSession>, ConnectError> {
        match self.servers.get(&server.host) {
            Some(scripted) => Ok(Box::new(ScriptedSession {
                server: scripted.clone(),
            })),
            None => Err(ConnectError::Connection(format!(
                "no route to {}",
                server.label()
            ))),
        }
    }
}

struct ScriptedSession {
    server: Arc<ScriptedServer>,
}

#[async_trait]
impl NntpSession for ScriptedSession {
    async fn fetch_article(&mut self, message_id: &str) -> Result<Vec<u8>, ArticleError> {
        self.server.fetches.fetch_add(1, Ordering::SeqCst);
        let bare = message_id.trim_start_matches('<').trim_end_matches('>');
        self.server
            .articles
            .get(bare)
            .cloned()
            .ok_or_else(|| ArticleError::NotFound {
                message_id: message_id.to_string(),
            })
    }
}

/// Server entry for a scripted host
pub fn scripted_server_config(host: &str, connections: usize) -> ServerConfig {
    ServerConfig {
        host: host.to_string(),
        port: 563,
        tls: true,
        username: None,
        password: None,
        connections,
    }
}

//! NNTP access: session abstraction, the production connector, the shared
//! server pool and the per-article fetcher.

mod connector;
mod fetch;
mod pool;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use connector::NntpConnector;
pub use fetch::fetch_article;
pub use pool::{ServerPool, Session};

use crate::config::ServerConfig;
use crate::error::ArticleError;
use crate::retry::IsRetryable;
use async_trait::async_trait;
use thiserror::Error;

/// Opens authenticated sessions to one configured server.
///
/// The pool only ever talks to servers through this trait, so tests can swap
/// in scripted servers.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate once (when credentials are configured)
    async fn connect(&self, server: &ServerConfig) -> Result<Box<dyn NntpSession>, ConnectError>;
}

/// A live, authenticated connection.
#[async_trait]
pub trait NntpSession: Send {
    /// Retrieve the raw body of an article.
    ///
    /// `message_id` is in bracketed form (`<id@host>`).
    async fn fetch_article(&mut self, message_id: &str) -> Result<Vec<u8>, ArticleError>;
}

/// Failure to open a session
#[derive(Debug, Error)]
pub enum ConnectError {
    /// TCP/TLS connect or greeting failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server rejected our credentials
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl IsRetryable for ConnectError {
    fn is_retryable(&self) -> bool {
        matches!(self, ConnectError::Connection(_))
    }
}

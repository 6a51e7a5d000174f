use super::{ConnectError, Connector, NntpSession};
use crate::config::ServerConfig;
use crate::error::ArticleError;
use async_trait::async_trait;
use std::sync::Arc;

/// Production [`Connector`] backed by `nntp-rs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NntpConnector;

#[async_trait]
impl Connector for NntpConnector {
    async fn connect(&self, server: &ServerConfig) -> Result<Box<dyn NntpSession>, ConnectError> {
        let mut client = nntp_rs::NntpClient::connect(Arc::new(server.clone().into()))
            .await
            .map_err(|e| ConnectError::Connection(e.to_string()))?;

        if server.username.is_some() {
            client.authenticate().await.map_err(classify_auth_error)?;
        }

        tracing::debug!(server = %server.label(), "NNTP session opened");
        Ok(Box::new(NntpRsSession { client }))
    }
}

struct NntpRsSession {
    client: nntp_rs::NntpClient,
}

#[async_trait]
impl NntpSession for NntpRsSession {
    async fn fetch_article(&mut self, message_id: &str) -> Result<Vec<u8>, ArticleError> {
        // BODY rather than ARTICLE: the yEnc frame starts on the first line,
        // and dot-stuffing is already undone by the client
        match self.client.fetch_body_binary(message_id).await {
            Ok(response) => Ok(response.data),
            Err(e) if is_missing_article_error(&e) => Err(ArticleError::NotFound {
                message_id: message_id.to_string(),
            }),
            Err(e) => Err(ArticleError::Transfer {
                message_id: message_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Check whether an NNTP error indicates a missing/expired article (vs connection/protocol failure).
fn is_missing_article_error(err: &nntp_rs::NntpError) -> bool {
    match err {
        nntp_rs::NntpError::NoSuchArticle(_) => true,
        nntp_rs::NntpError::Protocol { code, .. } if *code == 430 || *code == 423 => true,
        other => other.to_string().to_lowercase().contains("no such article"),
    }
}

fn classify_auth_error(err: nntp_rs::NntpError) -> ConnectError {
    match &err {
        nntp_rs::NntpError::Protocol { code, .. } if matches!(*code, 452 | 481 | 482 | 502) => {
            ConnectError::Auth(err.to_string())
        }
        other if other.to_string().to_lowercase().contains("auth") => {
            ConnectError::Auth(err.to_string())
        }
        _ => ConnectError::Connection(err.to_string()),
    }
}

use super::Session;
use crate::error::ArticleError;
use crate::nzb::SegmentRef;
use std::time::Duration;

/// Retrieve one segment's raw article body, bounded by `timeout`.
///
/// The caller decides the session's fate from the outcome: after
/// [`ArticleError::NotFound`] it is still healthy, after any other error it
/// must be discarded (see [`ArticleError::session_reusable`]).
pub async fn fetch_article(
    session: &mut Session,
    segment: &SegmentRef,
    timeout: Duration,
) -> Result<Vec<u8>, ArticleError> {
    let message_id = segment.bracketed_id();

    match tokio::time::timeout(timeout, session.fetch_article(&message_id)).await {
        Ok(Ok(body)) => {
            tracing::trace!(
                server = %session.server(),
                segment = segment.number,
                bytes = body.len(),
                "article received"
            );
            Ok(body)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ArticleError::Timeout {
            message_id,
            timeout,
        }),
    }
}

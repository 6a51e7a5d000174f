//! Application state for the API server

use crate::service::StreamService;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The stream service behind every route
    pub service: Arc<StreamService>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(service: Arc<StreamService>) -> Self {
        Self { service }
    }
}

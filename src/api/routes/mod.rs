//! Route handlers for the HTTP API
//!
//! Handlers are organized by domain:
//! - [`addon`]: Addon manifest and stream listings
//! - [`play`]: NZB playback
//! - [`system`]: Health, statistics, events, OpenAPI

use serde::{Deserialize, Serialize};

mod addon;
mod play;
mod system;

pub use addon::*;
pub use play::*;
pub use system::*;

/// Query parameters for GET /play
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PlayQuery {
    /// URL of the NZB document to stream
    pub nzb: Option<String>,
}

/// Response for GET /stats
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    /// Connection usage per server
    pub pool: crate::types::PoolStats,
    /// Number of streams currently running
    pub active_streams: usize,
}

//! HTTP control API
//!
//! Connection management and messaging endpoints over JSON.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::media::MediaFetcher;
use crate::registry::ConnectionRegistry;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub media: Arc<MediaFetcher>,
}

impl AppState {
    pub fn new(registry: Arc<ConnectionRegistry>, media: MediaFetcher) -> Self {
        Self {
            registry,
            media: Arc::new(media),
        }
    }
}

//! Live-status resolution with a quota-limited primary and a scraping fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::Result;
use crate::youtube::is_canonical_channel_id;

/// Resolves a channel to its current live stream id, if any.
#[async_trait]
pub trait LiveStatusResolver: Send + Sync {
    /// Resolver name for logging.
    fn name(&self) -> &'static str;

    /// `Some(stream_id)` while the channel is live, `None` otherwise.
    async fn resolve_live_stream(&self, channel_id: &str) -> Result<Option<String>>;
}

/// Tries the status API for canonical channel ids and falls back to the
/// scraper on any failure, including quota exhaustion.
pub struct FallbackResolver {
    primary: Option<Arc<dyn LiveStatusResolver>>,
    fallback: Arc<dyn LiveStatusResolver>,
}

impl FallbackResolver {
    pub fn new(
        primary: Option<Arc<dyn LiveStatusResolver>>,
        fallback: Arc<dyn LiveStatusResolver>,
    ) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl LiveStatusResolver for FallbackResolver {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn resolve_live_stream(&self, channel_id: &str) -> Result<Option<String>> {
        if let Some(primary) = &self.primary
            && is_canonical_channel_id(channel_id)
        {
            match primary.resolve_live_stream(channel_id).await {
                Ok(result) => return Ok(result),
                Err(e) => warn!(
                    channel_id = %channel_id,
                    resolver = primary.name(),
                    "Status check failed, falling back to {}: {}",
                    self.fallback.name(),
                    e
                ),
            }
        } else {
            debug!(channel_id = %channel_id, resolver = self.fallback.name(), "Resolving live status");
        }

        self.fallback.resolve_live_stream(channel_id).await
    }
}

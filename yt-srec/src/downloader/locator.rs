//! Capture locator resolution.

use async_trait::async_trait;

use super::stream_selector::Quality;
use crate::Result;

/// Resolves a live stream identifier into a directly fetchable media locator.
///
/// Distinct from the liveness check: this runs once per capture attempt.
#[async_trait]
pub trait LocatorResolver: Send + Sync {
    /// Resolve a playable locator for `stream_id`, honoring `quality` when
    /// possible. Fails if no playable locator exists.
    async fn resolve_capture_locator(&self, stream_id: &str, quality: Quality) -> Result<String>;

    /// Check if the resolver can be used at all.
    fn is_available(&self) -> bool {
        true
    }
}

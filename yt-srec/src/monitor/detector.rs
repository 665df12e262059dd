//! Live-transition detection.
//!
//! Pure keyed equality-diff over the last observed stream id per channel.
//! No I/O, no failure modes.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Outcome of feeding one observation into the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// The observation differs from the previous one for this channel.
    pub changed: bool,
    /// The channel is live according to this observation.
    pub now_live: bool,
}

/// Remembers the last observed live stream id for each channel.
#[derive(Debug, Default)]
pub struct LiveDetector {
    last_seen: Mutex<HashMap<String, Option<String>>>,
}

impl LiveDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `observed` for `channel_id` and report how it compares to the
    /// previous observation (none on first call).
    ///
    /// The stored value is always overwritten. A change of live id without an
    /// intervening offline observation is reported as `changed`.
    pub fn update(&self, channel_id: &str, observed: Option<&str>) -> Transition {
        let observed = observed.map(str::to_owned);
        let now_live = observed.is_some();

        let previous = self
            .last_seen
            .lock()
            .insert(channel_id.to_owned(), observed.clone())
            .flatten();

        Transition {
            changed: previous != observed,
            now_live,
        }
    }

    /// Last observed stream id for `channel_id`, if any.
    pub fn last_seen(&self, channel_id: &str) -> Option<String> {
        self.last_seen.lock().get(channel_id).cloned().flatten()
    }
}

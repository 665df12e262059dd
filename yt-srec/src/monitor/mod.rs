//! Live-status monitoring.
//!
//! - `detector`: pure live/offline transition detection per channel
//! - `resolver`: live-status resolution with API-first fallback policy
//! - `service`: the polling loop that turns transitions into start/stop calls

mod detector;
mod resolver;
mod service;

pub use detector::{LiveDetector, Transition};
pub use resolver::{FallbackResolver, LiveStatusResolver};
pub use service::{LivePoller, PollerConfig};

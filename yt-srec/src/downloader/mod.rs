//! Capture side of recording: backends, locator resolution and resilience.
//!
//! - `engine`: the capture backend abstraction and the ffmpeg implementation
//! - `locator`: stream id → fetchable locator resolution
//! - `resilience`: per-session crash-retry backoff
//! - `stream_selector`: quality-driven HLS variant selection

pub mod engine;

mod locator;
mod resilience;
mod stream_selector;

pub use engine::{CaptureBackend, CaptureHandle, CaptureRequest, FfmpegBackend};
pub use locator::LocatorResolver;
pub use resilience::{RetryConfig, RetryState};
pub use stream_selector::{
    KNOWN_HEIGHTS, Quality, StreamFormat, available_heights, select_hls_format,
};

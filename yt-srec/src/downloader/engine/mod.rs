//! Capture backend abstraction.
//!
//! This module defines the `CaptureBackend` trait and the ffmpeg
//! implementation used in production.

mod ffmpeg;
mod traits;

pub use ffmpeg::{FfmpegBackend, SEGMENT_PREFIX, SEGMENT_SUFFIX};
pub use traits::{CaptureBackend, CaptureHandle, CaptureRequest};

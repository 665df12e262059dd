//! Recording supervision.
//!
//! - `manifest`: atomic persistence of per-session metadata
//! - `service`: the [`Recorder`] owning per-channel sessions and their
//!   crash-retry supervision

pub mod manifest;
mod service;

pub use manifest::{MANIFEST_FILE_NAME, ManifestWriter, SessionManifest};
pub use service::{Recorder, RecorderConfig, SessionControl};

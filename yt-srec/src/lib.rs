//! yt-srec library crate.
//!
//! Watches live channels, records them while they are live and restarts the
//! capture backend with backoff when it fails.

pub mod chat;
pub mod config;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod recorder;
pub mod utils;
pub mod youtube;

pub use error::{Error, Result};

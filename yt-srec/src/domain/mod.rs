//! Domain types shared by the monitor and the recorder.

pub mod state;

pub use state::RecordingState;

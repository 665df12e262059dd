//! Best-effort side-channel (live chat) capture.
//!
//! A chat capture runs next to the recording of a session and appends one
//! line per chat event to a text file. Failures never affect the recording.

mod command;

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;

pub use command::{CommandChatCapture, format_chat_line};

/// File name of the chat log inside a session directory.
pub const CHAT_FILE_NAME: &str = "chat.txt";

/// Side-channel capture backend.
#[async_trait]
pub trait ChatCapture: Send + Sync {
    fn name(&self) -> &'static str;

    /// Append chat events of `stream_id` to `output_file` until the stream
    /// ends or `cancel` fires.
    async fn capture(
        &self,
        stream_id: &str,
        output_file: &Path,
        cancel: CancellationToken,
    ) -> Result<()>;
}

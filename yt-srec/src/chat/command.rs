//! Chat capture through an external command that prints chat events on
//! stdout, one per line.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use process_utils::supervised_command;
use serde_json::Value;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ChatCapture;
use crate::utils::fs::{ensure_dir_all, io_error};
use crate::utils::lines::LossyLines;
use crate::youtube::watch_url;
use crate::{Error, Result};

/// Runs `program args… <watch url>` and appends its output to the chat log.
#[derive(Debug, Clone)]
pub struct CommandChatCapture {
    program: String,
    args: Vec<String>,
}

impl CommandChatCapture {
    /// Parse a whitespace-separated command line. Returns `None` when empty.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Render one line of chat command output.
///
/// JSON events (`timestamp` or `time_text`, `author` or `author.name`,
/// `message`) become `[time] author: message`; anything else is stamped with
/// `now`.
pub fn format_chat_line(line: &str, now: DateTime<Local>) -> String {
    let line = line.trim_end();
    if let Ok(Value::Object(event)) = serde_json::from_str::<Value>(line)
        && let Some(message) = event.get("message").and_then(value_text)
    {
        let time = event
            .get("timestamp")
            .and_then(value_text)
            .or_else(|| event.get("time_text").and_then(value_text))
            .unwrap_or_else(|| now.format("%Y-%m-%d %H:%M:%S").to_string());
        let author = match event.get("author") {
            Some(Value::Object(author)) => author.get("name").and_then(value_text),
            Some(other) => value_text(other),
            None => None,
        }
        .unwrap_or_else(|| "unknown".to_string());
        return format!("[{}] {}: {}", time, author, message);
    }

    format!("[{}] {}", now.format("%Y-%m-%d %H:%M:%S"), line)
}

#[async_trait]
impl ChatCapture for CommandChatCapture {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn capture(
        &self,
        stream_id: &str,
        output_file: &Path,
        cancel: CancellationToken,
    ) -> Result<()> {
        if let Some(parent) = output_file.parent() {
            ensure_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(output_file)
            .await
            .map_err(|e| io_error("opening chat log", output_file, e))?;

        let mut child = supervised_command(&self.program)
            .args(&self.args)
            .arg(watch_url(stream_id))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::unavailable(format!("Failed to spawn {}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("chat command stdout not captured".to_string()))?;
        let mut lines = LossyLines::new(BufReader::new(stdout));
        let mut written = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let mut rendered = format_chat_line(&line, Local::now());
                        rendered.push('\n');
                        file.write_all(rendered.as_bytes())
                            .await
                            .map_err(|e| io_error("writing chat log", output_file, e))?;
                        written += 1;
                    }
                    Ok(None) => {
                        let _ = child.wait().await;
                        break;
                    }
                    Err(e) => {
                        let _ = child.kill().await;
                        return Err(e.into());
                    }
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| io_error("flushing chat log", output_file, e))?;
        debug!(stream_id = %stream_id, lines = written, "Chat capture finished");
        Ok(())
    }
}

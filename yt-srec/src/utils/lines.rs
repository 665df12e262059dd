//! Line reader for child process output.
//!
//! Child processes do not promise UTF-8. Lines are split on raw `\n` bytes
//! and decoded lossily, so a stray byte never ends the stream and the child
//! never loses its reader.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub struct LossyLines<R> {
    reader: R,
    /// Bytes of the current line, kept across cancelled reads.
    pending: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }

    /// Next line without its `\n` / `\r\n` terminator. `None` at end of stream.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.pending).await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.pending.clear();
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_stream() {
        let input: &[u8] = b"first\r\nbad \xff\xfe bytes\nlast";
        let mut lines = LossyLines::new(input);

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        let bad = lines.next_line().await.unwrap().unwrap();
        assert!(bad.starts_with("bad "));
        assert!(bad.contains('\u{FFFD}'));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_lines_are_kept() {
        let input: &[u8] = b"\n\nx\n";
        let mut lines = LossyLines::new(input);

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("x"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}

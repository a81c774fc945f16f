use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde_json::Value;

/// Newline-delimited JSON over a pair of blocking streams.
///
/// One message per line in both directions. Reads block until a full line
/// arrives; there is no timeout, so a peer that stops answering stalls the
/// caller.
pub struct JsonLineFramer<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> JsonLineFramer<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn send(&mut self, message: &Value) -> Result<()> {
        let mut line = serde_json::to_vec(message).context("serialize outgoing message")?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .context("write to brain stdin")?;
        self.writer.flush().context("flush brain stdin")?;
        Ok(())
    }

    /// Next message, or `None` once the peer closed its output.
    pub fn receive(&mut self) -> Result<Option<Value>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .context("read from brain stdout")?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parsed = serde_json::from_str(trimmed).with_context(|| {
                format!("brain sent a line that is not JSON: {}", truncate(trimmed, 120))
            })?;
            return Ok(Some(parsed));
        }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

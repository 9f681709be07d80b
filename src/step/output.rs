//! Output capture for step subprocesses.
//!
//! Each stream gets its own [`CapturedOutput`], filled line by line by
//! [`drain`]. Every line is appended with a leading `\n` so the buffer stays
//! line-delimited. Past the byte cap the buffer stops growing but the stream
//! is still read to the end so the child never blocks on a full pipe.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const TRUNCATED_MARKER: &str = "\n[... output truncated]";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    text: String,
    limit: usize,
    truncated: bool,
}

impl CapturedOutput {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push_chunk(&mut self, chunk: &str) {
        if self.truncated {
            return;
        }
        let room = self.limit.saturating_sub(self.text.len());
        if chunk.len() < room {
            self.text.push('\n');
            self.text.push_str(chunk);
            return;
        }
        self.truncated = true;
        if room > 1 {
            let mut end = room - 1;
            while !chunk.is_char_boundary(end) {
                end -= 1;
            }
            self.text.push('\n');
            self.text.push_str(&chunk[..end]);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The captured text, with a marker when the cap was hit.
    pub fn render(&self) -> String {
        if self.truncated {
            format!("{}{TRUNCATED_MARKER}", self.text)
        } else {
            self.text.clone()
        }
    }
}

/// Reads `reader` to EOF, one line per chunk. A line is only buffered up to
/// the cap; the rest of an overlong line is read and dropped.
pub(crate) async fn drain<R>(reader: Option<R>, limit: usize) -> CapturedOutput
where
    R: AsyncRead + Unpin,
{
    let mut out = CapturedOutput::with_limit(limit);
    let Some(reader) = reader else {
        return out;
    };
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        let available = match reader.fill_buf().await {
            Ok(available) => available,
            Err(err) => {
                debug!("failed reading step output: {err}");
                break;
            }
        };
        if available.is_empty() {
            if !line.is_empty() {
                push_line(&mut out, &mut line);
            }
            break;
        }
        let newline = available.iter().position(|b| *b == b'\n');
        let len = newline.map_or(available.len(), |i| i + 1);
        if !out.is_truncated() {
            // two spare bytes so a capped line still overflows after `\r\n` is stripped
            let room = limit.saturating_add(2).saturating_sub(line.len());
            line.extend_from_slice(&available[..len.min(room)]);
        }
        reader.consume(len);
        if newline.is_some() {
            push_line(&mut out, &mut line);
        }
    }
    out
}

fn push_line(out: &mut CapturedOutput, line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    out.push_chunk(&String::from_utf8_lossy(line));
    line.clear();
}

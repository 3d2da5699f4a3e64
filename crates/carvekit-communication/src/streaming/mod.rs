//! Character-counting G-code streaming
//!
//! GRBL's receive buffer is 128 bytes. Rather than waiting for each line's
//! acknowledgement before sending the next (which leaves the planner
//! starved over high-latency links), the streamer tracks how many bytes of
//! unacknowledged data are in the controller's buffer and keeps it filled
//! up to a safe ceiling. An `ok`/`error` response retires the oldest
//! in-flight line and frees its bytes.

mod engine;

pub use engine::{JobStreamer, StreamerConfig};

use serde::{Deserialize, Serialize};

/// A preprocessed program line awaiting transmission or acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedLine {
    /// 1-based line number, monotonically increasing within a job
    pub sequence: u32,
    /// Trimmed line content (no line-number prefix, no terminator)
    pub content: String,
    /// Bytes this line occupies in the controller buffer:
    /// `N{sequence}{content}` plus the newline
    pub byte_count: usize,
}

impl QueuedLine {
    /// Build a queued line, computing its wire size
    pub fn new(sequence: u32, content: String) -> Self {
        let byte_count = wire_format(sequence, &content).len() + 1;
        Self {
            sequence,
            content,
            byte_count,
        }
    }

    /// The text transmitted for this line (without the terminator)
    pub fn wire_text(&self) -> String {
        wire_format(self.sequence, &self.content)
    }
}

fn wire_format(sequence: u32, content: &str) -> String {
    format!("N{}{}", sequence, content)
}

/// Preprocess a submitted program into queued lines
///
/// Each source line is trimmed; empty lines and comment lines (`;` or `(`
/// prefix) are dropped. Surviving lines get 1-based sequence numbers.
pub fn preprocess_program<I, S>(lines: I) -> Vec<QueuedLine>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut queued = Vec::new();
    let mut sequence = 0u32;

    for line in lines {
        let trimmed = line.as_ref().trim();
        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('(') {
            continue;
        }
        sequence += 1;
        queued.push(QueuedLine::new(sequence, trimmed.to_string()));
    }

    queued
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_and_blank_stripping() {
        let queued = preprocess_program(["G0 X0", "; comment", "(note)", "", "  G1 X10 F500  "]);
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].sequence, 1);
        assert_eq!(queued[0].content, "G0 X0");
        assert_eq!(queued[1].sequence, 2);
        assert_eq!(queued[1].content, "G1 X10 F500");
    }

    #[test]
    fn test_wire_text_and_byte_count() {
        let line = QueuedLine::new(1, "G0 X0".to_string());
        assert_eq!(line.wire_text(), "N1G0 X0");
        // 7 wire characters plus the newline
        assert_eq!(line.byte_count, 8);
    }
}

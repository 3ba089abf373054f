//! Rolling line buffer for process output

use std::collections::VecDeque;

/// Maximum number of lines kept per process
pub const DEFAULT_LOG_CAPACITY: usize = 5000;

/// Splits streamed text into lines and keeps the most recent ones
///
/// Lines are stored without their terminator; a trailing `\r` from PTY line
/// endings is dropped too.
#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    partial: String,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` lines
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            partial: String::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append streamed text; only complete lines are committed
    pub fn push(&mut self, text: &str) {
        self.partial.push_str(text);
        while let Some(pos) = self.partial.find('\n') {
            let rest = self.partial.split_off(pos + 1);
            let line = std::mem::replace(&mut self.partial, rest);
            self.commit(line);
        }
    }

    /// Commit whatever partial line is left (used once the stream ends)
    pub fn flush(&mut self) {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.commit(line);
        }
    }

    /// Snapshot of the committed lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    fn commit(&mut self, mut line: String) {
        if line.ends_with('\n') {
            line.pop();
        }
        if line.ends_with('\r') {
            line.pop();
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_lines_are_held_back() {
        let mut buffer = LogBuffer::default();
        buffer.push("Starting ser");
        assert!(buffer.lines().is_empty());

        buffer.push("ver\r\nDone (3.2s)!\r\n> ");
        assert_eq!(buffer.lines(), vec!["Starting server", "Done (3.2s)!"]);

        buffer.flush();
        assert_eq!(buffer.lines().len(), 3);
        assert_eq!(buffer.lines()[2], "> ");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.push(&format!("line {}\n", i));
        }
        assert_eq!(buffer.lines(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_empty_lines_kept() {
        let mut buffer = LogBuffer::default();
        buffer.push("a\n\nb\n");
        assert_eq!(buffer.lines(), vec!["a", "", "b"]);
    }

    #[test]
    fn test_flush_without_partial_is_noop() {
        let mut buffer = LogBuffer::default();
        buffer.push("done\n");
        buffer.flush();
        assert_eq!(buffer.lines().len(), 1);
    }
}

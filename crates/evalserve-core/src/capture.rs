//! Output capture for a single command.

use std::fmt;

/// Capture size limit (16 MB). Text past the limit is dropped.
const CAPTURE_BYTES: usize = 16 * 1024 * 1024;

/// Collects text printed while one command runs.
///
/// A capture is created by [`OutputCapture::begin`], lent to the
/// code-execution capability as `&mut`, and consumed by
/// [`OutputCapture::end`]. Nesting is not possible since `end` takes the
/// capture by value.
#[derive(Debug, Default)]
pub struct OutputCapture {
    buffer: String,
    truncated: bool,
}

impl OutputCapture {
    /// Start a new, empty capture.
    #[must_use]
    pub fn begin() -> Self {
        Self::default()
    }

    /// Append printed text.
    pub fn print(&mut self, text: &str) {
        if self.truncated {
            return;
        }
        let room = CAPTURE_BYTES.saturating_sub(self.buffer.len());
        if text.len() <= room {
            self.buffer.push_str(text);
            return;
        }

        let mut cut = room;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buffer.push_str(&text[..cut]);
        self.truncated = true;
        tracing::warn!(limit = CAPTURE_BYTES, "Captured output truncated");
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Finish the capture and return everything printed.
    #[must_use]
    pub fn end(self) -> String {
        self.buffer
    }
}

impl fmt::Write for OutputCapture {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.print(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use super::*;

    #[test]
    fn test_capture_collects_prints() {
        let mut capture = OutputCapture::begin();
        assert!(capture.is_empty());
        capture.print("hello\n");
        writeln!(capture, "{} {}", 1, 2).unwrap();
        assert_eq!(capture.end(), "hello\n1 2\n");
    }

    #[test]
    fn test_capture_truncates_on_char_boundary() {
        let mut capture = OutputCapture::begin();
        capture.print(&"a".repeat(CAPTURE_BYTES - 1));
        capture.print("\u{e9}\u{e9}");
        assert!(capture.is_truncated());
        capture.print("ignored");
        let text = capture.end();
        assert_eq!(text.len(), CAPTURE_BYTES - 1);
    }
}

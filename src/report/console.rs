//! Console rendering for run reports: message kinds, optional ANSI colour and
//! the `=`-bordered headers.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Width the headers aim for.
pub const HEADER_WIDTH: usize = 80;

const BOLD: &str = "\x1b[1m";
const BOLD_RED: &str = "\x1b[1;31m";
const BOLD_YELLOW: &str = "\x1b[1;33m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Regular,
    /// Deserves a bit more attention than regular output.
    Important,
    TaskName,
    Error,
    Traceback,
}

impl MessageKind {
    fn style(self) -> Option<&'static str> {
        match self {
            MessageKind::Regular | MessageKind::Traceback => None,
            MessageKind::Important => Some(BOLD_YELLOW),
            MessageKind::TaskName => Some(BOLD),
            MessageKind::Error => Some(BOLD_RED),
        }
    }
}

/// A shared, line-oriented output sink.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    colors: bool,
}

impl Console {
    pub fn new(out: impl Write + Send + 'static, colors: bool) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
            colors,
        }
    }

    pub fn stdout(colors: bool) -> Self {
        Self::new(io::stdout(), colors)
    }

    /// Writes `msg` followed by a newline.
    pub fn show(&self, msg: &str, kind: MessageKind) -> io::Result<()> {
        self.write_parts(&[(msg, kind)], true)
    }

    /// Writes `msg` without a trailing newline.
    pub fn show_inline(&self, msg: &str, kind: MessageKind) -> io::Result<()> {
        self.write_parts(&[(msg, kind)], false)
    }

    /// Renders `===== parts =====` centred on `target` columns and returns
    /// the width actually used. Parts longer than the target get three `=`
    /// on each side. Without parts a full `=` rule of `target` is drawn.
    pub fn show_header(&self, parts: &[(&str, MessageKind)], target: usize) -> io::Result<usize> {
        if parts.is_empty() {
            self.show(&"=".repeat(target), MessageKind::Regular)?;
            return Ok(target);
        }

        let total: usize = parts.iter().map(|(msg, _)| msg.chars().count()).sum();
        let (start, end) = match target.checked_sub(total + 2) {
            Some(diff) if diff > 0 => (diff / 2, diff - diff / 2),
            _ => (3, 3),
        };

        let opening = format!("{} ", "=".repeat(start));
        let closing = format!(" {}", "=".repeat(end));
        let mut line = Vec::with_capacity(parts.len() + 2);
        line.push((opening.as_str(), MessageKind::Regular));
        line.extend_from_slice(parts);
        line.push((closing.as_str(), MessageKind::Regular));
        self.write_parts(&line, true)?;

        Ok(start + 1 + total + 1 + end)
    }

    fn write_parts(&self, parts: &[(&str, MessageKind)], newline: bool) -> io::Result<()> {
        let mut out = self.out.lock();
        for (msg, kind) in parts {
            match kind.style().filter(|_| self.colors) {
                Some(style) => write!(out, "{style}{msg}{RESET}")?,
                None => out.write_all(msg.as_bytes())?,
            }
        }
        if newline {
            out.write_all(b"\n")?;
            out.flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("colors", &self.colors)
            .finish_non_exhaustive()
    }
}

/// In-memory sink whose clones share one buffer. Handy for capturing a
/// report.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console(colors: bool) -> (Console, SharedBuffer) {
        let buffer = SharedBuffer::new();
        (Console::new(buffer.clone(), colors), buffer)
    }

    #[test]
    fn test_header_is_centred_on_target() {
        let (console, buffer) = console(false);
        let width = console
            .show_header(
                &[("Running: ", MessageKind::Regular), ("add", MessageKind::TaskName)],
                HEADER_WIDTH,
            )
            .unwrap();

        assert_eq!(width, 80);
        let line = buffer.contents();
        let line = line.trim_end_matches('\n');
        assert_eq!(line.chars().count(), 80);
        assert!(line.starts_with(&format!("{} Running: add", "=".repeat(33))));
        assert!(line.ends_with(&format!("add {}", "=".repeat(33))));
    }

    #[test]
    fn test_header_odd_padding_goes_to_the_end() {
        let (console, buffer) = console(false);
        let width = console
            .show_header(&[("ab", MessageKind::Regular)], 11)
            .unwrap();
        assert_eq!(width, 11);
        assert_eq!(buffer.contents(), "=== ab ====\n");
    }

    #[test]
    fn test_header_longer_than_target() {
        let (console, buffer) = console(false);
        let name = "x".repeat(100);
        let width = console
            .show_header(&[(name.as_str(), MessageKind::TaskName)], HEADER_WIDTH)
            .unwrap();
        assert_eq!(width, 108);
        assert_eq!(buffer.contents(), format!("=== {name} ===\n"));
    }

    #[test]
    fn test_empty_header_is_a_rule() {
        let (console, buffer) = console(false);
        assert_eq!(console.show_header(&[], 12).unwrap(), 12);
        assert_eq!(buffer.contents(), "============\n");
    }

    #[test]
    fn test_colors() {
        let (console, buffer) = console(true);
        console.show_inline("add", MessageKind::TaskName).unwrap();
        console.show(" FAIL", MessageKind::Error).unwrap();
        console.show("plain", MessageKind::Regular).unwrap();
        assert_eq!(
            buffer.contents(),
            "\x1b[1madd\x1b[0m\x1b[1;31m FAIL\x1b[0m\nplain\n"
        );
    }

    #[test]
    fn test_no_colors() {
        let (console, buffer) = console(false);
        console.show("careful", MessageKind::Important).unwrap();
        assert_eq!(buffer.contents(), "careful\n");
    }
}

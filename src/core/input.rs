//! Script line reader
//!
//! Lines come back with their terminator so that echoing them reproduces the
//! script exactly. Prompts go to standard output, and only when standard
//! input is a terminal.

use std::io::{self, BufRead, IsTerminal, Write};

/// Prompt before a pattern line.
pub const PATTERN_PROMPT: &str = "  re> ";
/// Prompt before a data line.
pub const DATA_PROMPT: &str = "data> ";
/// Prompt for a continuation line of an unfinished pattern.
pub const CONTINUATION_PROMPT: &str = "    > ";

pub struct LineReader {
    source: Box<dyn BufRead>,
    stdin: bool,
    prompts: bool,
}

impl LineReader {
    /// Read from standard input, prompting when it is a terminal.
    pub fn stdin() -> Self {
        let stdin = io::stdin();
        let prompts = stdin.is_terminal();
        Self {
            source: Box::new(stdin.lock()),
            stdin: true,
            prompts,
        }
    }

    /// Read a script file. Lines read from a file are echoed by the caller.
    pub fn from_reader(source: Box<dyn BufRead>) -> Self {
        Self {
            source,
            stdin: false,
            prompts: false,
        }
    }

    /// True when reading standard input.
    pub fn is_stdin(&self) -> bool {
        self.stdin
    }

    /// Next line including its terminator, or `None` at end of input.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<Vec<u8>>> {
        if self.prompts {
            let mut out = io::stdout().lock();
            out.write_all(prompt.as_bytes())?;
            out.flush()?;
        }
        let mut line = Vec::new();
        if self.source.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_lines_keep_terminators() {
        let mut reader = LineReader::from_reader(Box::new(Cursor::new(b"/a/\nabc".to_vec())));
        assert_eq!(reader.read_line(PATTERN_PROMPT).unwrap(), Some(b"/a/\n".to_vec()));
        assert_eq!(reader.read_line(DATA_PROMPT).unwrap(), Some(b"abc".to_vec()));
        assert_eq!(reader.read_line(DATA_PROMPT).unwrap(), None);
        assert!(!reader.is_stdin());
    }
}

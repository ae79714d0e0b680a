//! Script session
//!
//! Chooses the tester for the selected width and runs the line loop:
//! comments and `#` commands between tests, pattern lines, data lines up to
//! the next blank line, and skipping after a failed pattern.

use std::io::Write;

use super::controls::{Control, Which};
use super::driver::{HarnessError, Outcome, Tester, Timing};
use super::input::{LineReader, DATA_PROMPT, PATTERN_PROMPT};
use super::modifiers::ModifierError;

/// Characters that may open a pattern.
pub const DELIMITERS: &[u8] = b"\"/!'`-+=:;.,";

/// Code-unit width of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Width {
    #[default]
    Eight,
    Sixteen,
    ThirtyTwo,
}

impl Width {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Width::Eight),
            16 => Some(Width::Sixteen),
            32 => Some(Width::ThirtyTwo),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Width::Eight => 8,
            Width::Sixteen => 16,
            Width::ThirtyTwo => 32,
        }
    }
}

/// The tester for the width chosen at start-up.
pub enum ActiveTester {
    Eight(Tester<u8>),
    Sixteen(Tester<u16>),
    ThirtyTwo(Tester<u32>),
}

macro_rules! dispatch {
    ($tester:expr, $t:ident => $body:expr) => {
        match $tester {
            ActiveTester::Eight($t) => $body,
            ActiveTester::Sixteen($t) => $body,
            ActiveTester::ThirtyTwo($t) => $body,
        }
    };
}

impl ActiveTester {
    pub fn new(width: Width, timing: Timing) -> Self {
        match width {
            Width::Eight => ActiveTester::Eight(Tester::new(timing)),
            Width::Sixteen => ActiveTester::Sixteen(Tester::new(timing)),
            Width::ThirtyTwo => ActiveTester::ThirtyTwo(Tester::new(timing)),
        }
    }

    pub fn has_pattern(&self) -> bool {
        dispatch!(self, t => t.has_pattern())
    }

    pub fn clear_pattern(&mut self) {
        dispatch!(self, t => t.clear_pattern())
    }

    pub fn set_default_control(&mut self, control: Control) {
        dispatch!(self, t => t.set_default_control(control))
    }

    pub fn apply_defaults(&mut self, text: &str, which: Which) -> Result<(), ModifierError> {
        dispatch!(self, t => t.apply_defaults(text, which))
    }

    pub fn timing(&self) -> &Timing {
        dispatch!(self, t => &t.timing)
    }

    fn process_pattern(
        &mut self,
        line: Vec<u8>,
        reader: &mut LineReader,
        out: &mut dyn Write,
    ) -> Result<Outcome, HarnessError> {
        dispatch!(self, t => t.process_pattern(line, reader, out))
    }

    fn process_data(&mut self, line: &[u8], out: &mut dyn Write) -> Result<Outcome, HarnessError> {
        dispatch!(self, t => t.process_data(line, out))
    }
}

/// The text after a `#` command name, when the name is followed by whitespace.
fn command_argument<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?;
    rest.starts_with(|c: char| c.is_ascii_whitespace()).then_some(rest)
}

fn process_command(tester: &mut ActiveTester, line: &[u8], out: &mut dyn Write) -> Result<Outcome, HarnessError> {
    let line = String::from_utf8_lossy(line);
    let defaults = if let Some(rest) = command_argument(&line, "#pattern") {
        Some((rest, Which::DefaultPattern))
    } else if let Some(rest) = command_argument(&line, "#data") {
        Some((rest, Which::DefaultData))
    } else if command_argument(&line, "#load").is_some() {
        writeln!(out, "** #load not yet implemented")?;
        return Err(HarnessError::Unsupported("#load".to_string()));
    } else {
        None
    };
    if let Some((text, which)) = defaults {
        if let Err(err) = tester.apply_defaults(text, which) {
            writeln!(out, "{}", err)?;
        }
    }
    Ok(Outcome::Continue)
}

/// Run a script to its end, then print the closing lines.
pub fn run(tester: &mut ActiveTester, reader: &mut LineReader, out: &mut dyn Write) -> Result<(), HarnessError> {
    let mut skipping = false;

    loop {
        let expect_data = tester.has_pattern();
        let prompt = if expect_data { DATA_PROMPT } else { PATTERN_PROMPT };
        let Some(line) = reader.read_line(prompt)? else {
            break;
        };
        if !reader.is_stdin() {
            out.write_all(&line)?;
        }
        out.flush()?;

        let blank = line.trim_ascii().is_empty();
        let outcome = if expect_data || skipping {
            if blank {
                tester.clear_pattern();
                skipping = false;
                Outcome::Continue
            } else if !skipping {
                tester.process_data(&line, out)?
            } else {
                Outcome::Continue
            }
        } else if line[0] == b'#' {
            match line.get(1) {
                None => Outcome::Continue,
                Some(&c) if c.is_ascii_whitespace() || c == b'!' => Outcome::Continue,
                Some(_) => process_command(tester, &line, out)?,
            }
        } else if DELIMITERS.contains(&line[0]) {
            tester.process_pattern(line, reader, out)?
        } else if blank {
            Outcome::Continue
        } else {
            eprintln!("** Invalid pattern delimiter '{}'.", char::from(line[0]));
            Outcome::Skip
        };

        if outcome == Outcome::Skip && !reader.is_stdin() {
            skipping = true;
        }
    }

    if reader.is_stdin() {
        writeln!(out)?;
    }
    if tester.timing().show_totals {
        tester.timing().write_totals(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_script(width: Width, script: &str) -> (String, Result<(), HarnessError>) {
        let mut tester = ActiveTester::new(width, Timing::default());
        let mut reader = LineReader::from_reader(Box::new(Cursor::new(script.as_bytes().to_vec())));
        let mut out = Vec::new();
        let result = run(&mut tester, &mut reader, &mut out);
        (String::from_utf8(out).unwrap(), result)
    }

    #[test]
    fn test_script_is_echoed_with_results() {
        let (output, result) = run_script(Width::Eight, "/b+/\nabbbc\n\n/x/\nabc\n");
        assert!(result.is_ok());
        assert_eq!(output, "/b+/\nabbbc\n 0: bbb\n\n/x/\nabc\nNo match\n");
    }

    #[test]
    fn test_comments_are_skipped() {
        let (output, _) = run_script(Width::Eight, "# a comment\n#! another\n/a/\na\n");
        assert_eq!(output, "# a comment\n#! another\n/a/\na\n 0: a\n");
    }

    #[test]
    fn test_failed_pattern_skips_its_data() {
        let (output, _) = run_script(Width::Eight, "/(a/\na\n\n/a/\na\n");
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[1].starts_with("Failed: error"));
        assert_eq!(&lines[2..], ["a", "", "/a/", "a", " 0: a"]);
    }

    #[test]
    fn test_default_pattern_command() {
        let (output, _) = run_script(Width::Eight, "#pattern aftertext\n/b/\nabc\n");
        assert!(output.ends_with(" 0: b\n 0+ c\n"));
    }

    #[test]
    fn test_default_data_command() {
        let (output, _) = run_script(Width::Eight, "#data aftertext\n/b/\nabc\n");
        assert!(output.ends_with(" 0: b\n 0+ c\n"));
    }

    #[test]
    fn test_load_aborts() {
        let (output, result) = run_script(Width::Eight, "#load x\n/a/\na\n");
        assert!(matches!(result, Err(HarnessError::Unsupported(_))));
        assert_eq!(output, "#load x\n** #load not yet implemented\n");
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        let (output, result) = run_script(Width::Eight, "#perltest\n/a/\na\n");
        assert!(result.is_ok());
        assert!(output.ends_with(" 0: a\n"));
    }

    #[test]
    fn test_invalid_delimiter_skips_to_blank_line() {
        let (output, _) = run_script(Width::Eight, "abc\ndef\n\n/a/\na\n");
        assert_eq!(output, "abc\ndef\n\n/a/\na\n 0: a\n");
    }

    #[test]
    fn test_sixteen_bit_run() {
        let (output, _) = run_script(Width::Sixteen, "/\\x{1234}/utf\n\\x{1234}\n");
        assert!(output.ends_with(" 0: \\x{1234}\n"));
    }

    #[test]
    fn test_width_round_trip() {
        for bits in [8, 16, 32] {
            assert_eq!(Width::from_bits(bits).map(Width::bits), Some(bits));
        }
        assert_eq!(Width::from_bits(7), None);
    }
}

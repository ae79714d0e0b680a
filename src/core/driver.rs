//! Pattern and data line processing
//!
//! A [`Tester`] owns everything one width mode needs: the control records,
//! the compiled pattern slot and the match buffers. The session feeds it
//! pattern lines and data lines and it writes the test output.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use bitflags::Flags;
use thiserror::Error;

use super::codec::{describe_code_unit, render_char, render_to_string, CodeUnit, Printable, TranscodeError};
use super::controls::{Bsr, Contexts, Control, DataControl, Newline, Options, PatternControl, Which};
use super::engine::{
    codes, compile, dfa_match, error_message, match_pattern, pattern_info, CompiledPattern, DfaWorkspace, InfoItem,
    InfoValue,
};
use super::input::{LineReader, CONTINUATION_PROMPT};
use super::modifiers::{apply_modifiers, ModifierError};
use super::posix::{self, CompileFlags, ExecFlags, PosixRegex};
use super::subject::SubjectBuffer;
use super::substring::{self, MatchData, UNSET};

/// Frames the program listing.
const RULE: &str = "------------------------------------------------------------------";

const POSIX_IGNORED: &str = "** Ignored with POSIX interface:";

const COMPILE_OPTION_NAMES: [(Options, &str); 21] = [
    (Options::ANCHORED, "anchored"),
    (Options::CASELESS, "caseless"),
    (Options::EXTENDED, "extended"),
    (Options::MULTILINE, "multiline"),
    (Options::FIRSTLINE, "firstline"),
    (Options::DOTALL, "dotall"),
    (Options::DOLLAR_ENDONLY, "dollar_endonly"),
    (Options::UNGREEDY, "ungreedy"),
    (Options::NO_AUTO_CAPTURE, "no_auto_capture"),
    (Options::NO_AUTO_POSSESS, "no_auto_possessify"),
    (Options::UTF, "utf"),
    (Options::UCP, "ucp"),
    (Options::NO_UTF_CHECK, "no_utf_check"),
    (Options::NO_START_OPTIMIZE, "no_start_optimize"),
    (Options::DUPNAMES, "dupnames"),
    (Options::ALT_BSUX, "alt_bsux"),
    (Options::ALLOW_EMPTY_CLASS, "allow_empty_class"),
    (Options::AUTO_CALLOUT, "auto_callout"),
    (Options::MATCH_UNSET_BACKREF, "match_unset_backref"),
    (Options::NEVER_UCP, "never_ucp"),
    (Options::NEVER_UTF, "never_utf"),
];

const MATCH_OPTION_NAMES: [(Options, &str); 11] = [
    (Options::ANCHORED, "anchored"),
    (Options::DFA_RESTART, "dfa_restart"),
    (Options::DFA_SHORTEST, "dfa_shortest"),
    (Options::NO_START_OPTIMIZE, "no_start_optimize"),
    (Options::NO_UTF_CHECK, "no_utf_check"),
    (Options::NOTBOL, "notbol"),
    (Options::NOTEMPTY, "notempty"),
    (Options::NOTEMPTY_ATSTART, "notempty_atstart"),
    (Options::NOTEOL, "noteol"),
    (Options::PARTIAL_HARD, "partial_hard"),
    (Options::PARTIAL_SOFT, "partial_soft"),
];

const COMPILE_CONTROL_NAMES: [(Control, &str); 13] = [
    (Control::AFTERTEXT, "aftertext"),
    (Control::ALLAFTERTEXT, "allaftertext"),
    (Control::ALLCAPTURES, "allcaptures"),
    (Control::ALTGLOBAL, "altglobal"),
    (Control::BYTECODE, "bytecode"),
    (Control::FLIPBYTES, "flipbytes"),
    (Control::FULLBYTECODE, "fullbytecode"),
    (Control::GLOBAL, "global"),
    (Control::INFO, "info"),
    (Control::JITVERIFY, "jitverify"),
    (Control::MARK, "mark"),
    (Control::PERLCOMPAT, "perlcompat"),
    (Control::POSIX, "posix"),
];

const MATCH_CONTROL_NAMES: [(Control, &str); 13] = [
    (Control::AFTERTEXT, "aftertext"),
    (Control::ALLAFTERTEXT, "allaftertext"),
    (Control::ALLCAPTURES, "allcaptures"),
    (Control::ALTGLOBAL, "altglobal"),
    (Control::CALLOUT_CAPTURE, "callout_capture"),
    (Control::CALLOUT_NONE, "callout_none"),
    (Control::DFA, "dfa"),
    (Control::GETALL, "getall"),
    (Control::GLOBAL, "global"),
    (Control::JITVERIFY, "jitverify"),
    (Control::LIMITS, "limits"),
    (Control::MARK, "mark"),
    (Control::MEMORY, "memory"),
];

const POSIX_FLAGS: [(Options, CompileFlags); 7] = [
    (Options::UTF, CompileFlags::UTF),
    (Options::UCP, CompileFlags::UCP),
    (Options::CASELESS, CompileFlags::ICASE),
    (Options::MULTILINE, CompileFlags::NEWLINE),
    (Options::DOTALL, CompileFlags::DOTALL),
    (Options::NO_AUTO_CAPTURE, CompileFlags::NOSUB),
    (Options::UNGREEDY, CompileFlags::UNGREEDY),
];

/// Failures that end the whole run.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected end of input inside a pattern")]
    UnexpectedEof,

    #[error("{0} is not supported")]
    Unsupported(String),

    #[error("pattern information request failed with code {0}")]
    PatternInfo(i32),
}

impl HarnessError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            HarnessError::Io(_) => "IO_ERROR",
            HarnessError::UnexpectedEof => "UNEXPECTED_EOF",
            HarnessError::Unsupported(_) => "UNSUPPORTED_COMMAND",
            HarnessError::PatternInfo(_) => "PATTERN_INFO_FAILED",
        }
    }
}

/// How the session continues after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// Ignore data lines up to the next blank line
    Skip,
}

/// Repeat counts for timing and the accumulated totals.
#[derive(Debug, Clone, Default)]
pub struct Timing {
    pub compile_repeat: u32,
    pub match_repeat: u32,
    pub show_totals: bool,
    total_compile: Duration,
    total_match: Duration,
}

impl Timing {
    /// Average milliseconds per repetition.
    fn per_run(elapsed: Duration, repeat: u32) -> f64 {
        elapsed.as_secs_f64() * 1000.0 / f64::from(repeat.max(1))
    }

    pub fn write_totals(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "--------------------------------------")?;
        if self.compile_repeat > 0 {
            writeln!(
                out,
                "Total compile time {:.4} milliseconds",
                Self::per_run(self.total_compile, self.compile_repeat)
            )?;
        }
        writeln!(
            out,
            "Total match time {:.4} milliseconds",
            Self::per_run(self.total_match, self.match_repeat)
        )
    }
}

/// Runs tests at one code-unit width.
pub struct Tester<U: CodeUnit> {
    contexts: Contexts,
    default_pattern: PatternControl,
    default_data: DataControl,
    pattern: PatternControl,
    data: DataControl,
    compiled: Option<CompiledPattern>,
    posix: Option<PosixRegex>,
    match_data: MatchData,
    subject: SubjectBuffer<U>,
    workspace: DfaWorkspace,
    printable: Printable,
    pub timing: Timing,
}

impl<U: CodeUnit> Tester<U> {
    pub fn new(timing: Timing) -> Self {
        Self {
            contexts: Contexts::default(),
            default_pattern: PatternControl::default(),
            default_data: DataControl::default(),
            pattern: PatternControl::default(),
            data: DataControl::default(),
            compiled: None,
            posix: None,
            match_data: MatchData::new(DataControl::default().oveccount as usize),
            subject: SubjectBuffer::new(),
            workspace: DfaWorkspace::default(),
            printable: Printable::Ascii,
            timing,
        }
    }

    /// True while a pattern is waiting for data lines.
    pub fn has_pattern(&self) -> bool {
        self.compiled.is_some() || self.posix.is_some()
    }

    pub fn clear_pattern(&mut self) {
        self.compiled = None;
        self.posix = None;
    }

    /// Add controls to the default pattern record.
    pub fn set_default_control(&mut self, control: Control) {
        self.default_pattern.control |= control;
    }

    /// Apply a `#pattern` or `#data` style modifier string to a default record.
    pub fn apply_defaults(&mut self, text: &str, which: Which) -> Result<(), ModifierError> {
        match which {
            Which::DefaultPattern => {
                apply_modifiers(text, which, &mut self.contexts, Some(&mut self.default_pattern), None)
            }
            _ => apply_modifiers(text, which, &mut self.contexts, None, Some(&mut self.default_data)),
        }
    }

    /// Handle a line that starts with a pattern delimiter.
    pub fn process_pattern(
        &mut self,
        mut line: Vec<u8>,
        reader: &mut LineReader,
        out: &mut dyn Write,
    ) -> Result<Outcome, HarnessError> {
        self.clear_pattern();
        self.workspace = DfaWorkspace::default();
        self.contexts.compile = self.contexts.default_compile.clone();
        self.pattern = self.default_pattern.clone();

        let delimiter = line[0];
        let mut p = 1;
        loop {
            while p < line.len() {
                if line[p] == b'\\' && p + 1 < line.len() {
                    p += 1;
                } else if line[p] == delimiter {
                    break;
                }
                p += 1;
            }
            if p < line.len() {
                break;
            }
            let Some(more) = reader.read_line(CONTINUATION_PROMPT)? else {
                writeln!(out, "** Unexpected EOF")?;
                return Err(HarnessError::UnexpectedEof);
            };
            if !reader.is_stdin() {
                out.write_all(&more)?;
            }
            line.extend_from_slice(&more);
        }

        let mut text = line[1..p].to_vec();
        let mut rest = p + 1;
        if line.get(rest) == Some(&b'\\') {
            text.push(b'\\');
            rest += 1;
        }
        let modifiers = String::from_utf8_lossy(&line[rest..]);
        if let Err(err) = apply_modifiers(&modifiers, Which::Pattern, &mut self.contexts, Some(&mut self.pattern), None)
        {
            writeln!(out, "{}", err)?;
            return Ok(Outcome::Skip);
        }
        self.printable = if self.pattern.locale.is_empty() {
            Printable::Ascii
        } else {
            Printable::Locale
        };
        let utf = self.pattern.options.contains(Options::UTF);

        if self.pattern.control.contains(Control::POSIX) {
            return self.compile_posix(&text, out);
        }

        let units = match U::from_pattern_text(&text, utf) {
            Ok(units) => units,
            Err(TranscodeError::Malformed) => {
                writeln!(
                    out,
                    "** Failed: invalid UTF-8 string cannot be converted to {}-bit string",
                    U::BITS
                )?;
                return Ok(Outcome::Skip);
            }
            Err(TranscodeError::ValueTooLargeForUtf) => {
                writeln!(out, "** Failed: character value greater than 0x10ffff cannot be converted to UTF")?;
                return Ok(Outcome::Skip);
            }
            Err(TranscodeError::ValueTooLargeNonUtf) => {
                writeln!(
                    out,
                    "** Failed: character value greater than 0xffff cannot be converted to 16-bit in non-UTF mode"
                )?;
                return Ok(Outcome::Skip);
            }
        };

        if self.timing.compile_repeat > 0 {
            let start = Instant::now();
            for _ in 0..self.timing.compile_repeat {
                let _ = compile(&units, self.pattern.options, &self.contexts.compile);
            }
            let elapsed = start.elapsed();
            self.timing.total_compile += elapsed;
            writeln!(
                out,
                "Compile time {:.4} milliseconds",
                Timing::per_run(elapsed, self.timing.compile_repeat)
            )?;
        }

        let code = match compile(&units, self.pattern.options, &self.contexts.compile) {
            Ok(code) => code,
            Err(err) => {
                writeln!(out, "Failed: error {} at offset {}: {}", err.code, err.offset, err.message)?;
                return Ok(Outcome::Skip);
            }
        };

        if self.pattern.control.contains(Control::MEMORY) {
            let size = info::<U>(&code, InfoItem::Size, out)?.number();
            writeln!(out, "Memory allocation (code space): {}", size)?;
            if self.pattern.jit != 0 {
                let size = info::<U>(&code, InfoItem::JitSize, out)?.number();
                writeln!(out, "Memory allocation (JIT code): {}", size)?;
            }
        }

        if self.pattern.control.intersects(Control::ANYINFO) {
            show_pattern_info::<U>(&code, &self.pattern, self.printable, out)?;
        }

        self.compiled = Some(code);
        Ok(Outcome::Continue)
    }

    fn compile_posix(&mut self, text: &[u8], out: &mut dyn Write) -> Result<Outcome, HarnessError> {
        if U::BITS != 8 {
            writeln!(out, "** The POSIX interface is available only in 8-bit mode")?;
            return Ok(Outcome::Skip);
        }

        let pattern = &self.pattern;
        let mut msg = POSIX_IGNORED;
        let ignored = [
            (!pattern.locale.is_empty(), "locale"),
            (pattern.tables != 0, "tables"),
            (pattern.stackguard != 0, "stackguard"),
            (self.timing.compile_repeat > 0, "timing"),
            (pattern.jit != 0, "JIT"),
            (!pattern.save.is_empty(), "save"),
        ];
        for (_, name) in ignored.iter().filter(|(set, _)| *set) {
            write!(out, "{} {}", msg, name)?;
            msg = "";
        }
        let options = pattern.options - Options::POSIX_COMPILE;
        if !options.is_empty() {
            write!(out, "{}{}", msg, names(options, &COMPILE_OPTION_NAMES))?;
            msg = "";
        }
        let control = pattern.control - Control::POSIX_COMPILE;
        if !control.is_empty() {
            write!(out, "{}{}", msg, names(control, &COMPILE_CONTROL_NAMES))?;
            msg = "";
        }
        if msg.is_empty() {
            writeln!(out)?;
        }

        let flags = POSIX_FLAGS
            .iter()
            .filter(|(option, _)| pattern.options.contains(*option))
            .fold(CompileFlags::empty(), |acc, (_, flag)| acc | *flag);
        match posix::regcomp(text, flags) {
            Ok(re) => {
                self.posix = Some(re);
                Ok(Outcome::Continue)
            }
            Err(err) => {
                writeln!(out, "Failed: POSIX code {}: {}", err.code, err.message())?;
                Ok(Outcome::Skip)
            }
        }
    }

    /// Handle a data line for the active pattern.
    pub fn process_data(&mut self, line: &[u8], out: &mut dyn Write) -> Result<Outcome, HarnessError> {
        self.contexts.matching = self.contexts.default_match.clone();
        self.data = self.default_data.clone();
        self.data.control |= self.pattern.control & Control::ALLPD;

        let posix = self.pattern.control.contains(Control::POSIX);
        let utf = !posix && self.compiled.as_ref().is_some_and(CompiledPattern::utf);

        let decoded = self.subject.decode(line, utf);
        for note in &self.subject.notes {
            writeln!(out, "{}", note)?;
        }
        let modifiers = match decoded {
            Ok(modifiers) => modifiers,
            Err(err) => {
                writeln!(out, "{}", err)?;
                return Ok(Outcome::Continue);
            }
        };
        if let Some(text) = modifiers {
            if let Err(err) = apply_modifiers(&text, Which::Data, &mut self.contexts, None, Some(&mut self.data)) {
                writeln!(out, "{}", err)?;
                return Ok(Outcome::Continue);
            }
        }

        if posix {
            return self.match_posix(out);
        }
        let Some(code) = self.compiled.as_ref() else {
            return Ok(Outcome::Continue);
        };

        if self.data.control.contains(Control::DFA | Control::LIMITS) {
            writeln!(out, "** Finding match limits is not relevant for DFA matching: ignored")?;
        }
        if self.data.control.intersects(Control::ANYGLOB) && self.data.oveccount < 1 {
            writeln!(out, "** Global matching requires a non-zero ovector count: ignored")?;
            self.data.control.remove(Control::ANYGLOB);
        }

        let printable = self.printable;
        let whole = self.subject.as_slice();
        let oveccount = self.data.oveccount as usize;
        let dfa = self.data.control.contains(Control::DFA);
        let mut base = 0;
        let mut offset = self.data.offset as usize;
        let mut g_notempty = Options::empty();
        let mut gmatched = 0u32;

        loop {
            let subject = &whole[base..];
            let ulen = subject.len();
            let options = self.data.options | g_notempty;
            let md = &mut self.match_data;
            md.ensure(oveccount);

            if self.timing.match_repeat > 0 {
                if dfa && self.data.options.contains(Options::DFA_RESTART) {
                    writeln!(out, "Timing DFA restarts is not supported")?;
                    return Ok(Outcome::Continue);
                }
                let start = Instant::now();
                for _ in 0..self.timing.match_repeat {
                    if dfa {
                        dfa_match(code, subject, offset, options, md, &mut self.workspace);
                    } else {
                        match_pattern(code, subject, offset, options, md, &self.contexts.matching);
                    }
                }
                let elapsed = start.elapsed();
                self.timing.total_match += elapsed;
                writeln!(
                    out,
                    "Match time {:.4} milliseconds",
                    Timing::per_run(elapsed, self.timing.match_repeat)
                )?;
            }

            let mut capcount = if dfa {
                let rc = dfa_match(code, subject, offset, options, md, &mut self.workspace);
                if rc == 0 {
                    writeln!(out, "Matched, but offsets vector is too small to show all matches")?;
                    oveccount as i32
                } else {
                    rc
                }
            } else {
                let rc = match_pattern(code, subject, offset, options, md, &self.contexts.matching);
                if rc == 0 {
                    writeln!(out, "Matched, but too many substrings")?;
                    oveccount as i32
                } else {
                    rc
                }
            };

            if capcount >= 0 {
                if capcount as usize > oveccount {
                    writeln!(
                        out,
                        "** PCRE error: returned count {} is too big for ovector count {}",
                        capcount, oveccount
                    )?;
                    capcount = oveccount as i32;
                    if self.data.control.intersects(Control::ANYGLOB) {
                        writeln!(out, "** Global loop abandoned")?;
                        self.data.control.remove(Control::ANYGLOB);
                    }
                }
                if self.data.control.contains(Control::ALLCAPTURES) {
                    match all_captures::<U>(code, oveccount, out)? {
                        Some(count) => capcount = count,
                        None => return Ok(Outcome::Skip),
                    }
                }
                show_captures(out, code, md, subject, &self.data, capcount as usize, utf, printable)?;
            } else if capcount == codes::PARTIAL {
                write!(out, "Partial match")?;
                if md.leftchar != md.startchar {
                    write!(out, " at offset {}", md.startchar)?;
                }
                if self.data.control.contains(Control::MARK) {
                    if let Some(mark) = &md.mark {
                        write!(out, ", mark={}", render_str(mark, utf, printable))?;
                    }
                }
                let tail = subject.get(md.leftchar..).unwrap_or_default();
                writeln!(out, ": {}", render_to_string(tail, utf, printable))?;
                break;
            } else if !g_notempty.is_empty() {
                // Step over one character after an empty match.
                let start = offset;
                let mut end = start + 1;
                if code.newline().treats_crlf_as_one()
                    && start + 1 < ulen
                    && subject[start].to_u32() == u32::from(b'\r')
                    && subject[end].to_u32() == u32::from(b'\n')
                {
                    end += 1;
                } else if utf && U::BITS != 32 {
                    while end < ulen && subject[end].is_continuation() {
                        end += 1;
                    }
                }
                md.set_pair(0, start, end);
            } else {
                match capcount {
                    codes::NOMATCH => {
                        if gmatched == 0 {
                            write!(out, "No match")?;
                            if self.data.control.contains(Control::MARK) {
                                if let Some(mark) = &md.mark {
                                    write!(out, ", mark = {}", render_str(mark, utf, printable))?;
                                }
                            }
                            writeln!(out)?;
                        }
                    }
                    codes::BADUTF => writeln!(
                        out,
                        "Error {} (bad UTF-{} string) offset={} reason={}",
                        capcount,
                        U::BITS,
                        md.startchar,
                        md.utf_reason
                    )?,
                    codes::BADUTF_OFFSET => writeln!(out, "Error {} (bad UTF-{} offset)", capcount, U::BITS)?,
                    _ => writeln!(out, "Failed: error {}: {}", capcount, error_message(capcount))?,
                }
                break;
            }

            if !self.data.control.intersects(Control::ANYGLOB) {
                break;
            }
            let (start, end) = md.pair(0);
            if start == end {
                if end == ulen {
                    break;
                }
                g_notempty = Options::NOTEMPTY_ATSTART | Options::ANCHORED;
            } else {
                g_notempty = Options::empty();
            }
            if self.data.control.contains(Control::GLOBAL) {
                offset = end;
            } else {
                base += end;
                offset = 0;
            }
            gmatched += 1;
        }

        Ok(Outcome::Continue)
    }

    fn match_posix(&mut self, out: &mut dyn Write) -> Result<Outcome, HarnessError> {
        let Some(re) = self.posix.as_ref() else {
            return Ok(Outcome::Continue);
        };
        let data = &self.data;

        let mut msg = POSIX_IGNORED;
        let ignored = [
            (data.callout_fail != [0, 0], "callout_fail"),
            (!data.copy_numbers.is_empty() || !data.copy_names.is_empty(), "copy"),
            (!data.get_numbers.is_empty() || !data.get_names.is_empty(), "get"),
            (data.jitstack != 0, "jitstack"),
        ];
        for (_, name) in ignored.iter().filter(|(set, _)| *set) {
            write!(out, "{} {}", msg, name)?;
            msg = "";
        }
        let options = data.options - Options::POSIX_MATCH;
        if !options.is_empty() {
            write!(out, "{}{}", msg, names(options, &MATCH_OPTION_NAMES))?;
            msg = "";
        }
        let control = data.control - Control::POSIX_MATCH;
        if !control.is_empty() {
            write!(out, "{}{}", msg, names(control, &MATCH_CONTROL_NAMES))?;
            msg = "";
        }
        if msg.is_empty() {
            writeln!(out)?;
        }

        let mut flags = ExecFlags::empty();
        flags.set(ExecFlags::NOTBOL, data.options.contains(Options::NOTBOL));
        flags.set(ExecFlags::NOTEOL, data.options.contains(Options::NOTEOL));
        flags.set(ExecFlags::NOTEMPTY, data.options.contains(Options::NOTEMPTY));

        let bytes: Vec<u8> = self.subject.as_slice().iter().map(|u| u.to_u32() as u8).collect();
        let subject = bytes.get(data.offset as usize..).unwrap_or_default();
        let oveccount = data.oveccount as usize;
        match re.regexec(subject, oveccount, flags) {
            Err(err) => writeln!(out, "No match: POSIX code {}: {}", err.code, err.message())?,
            Ok(_) if self.pattern.options.contains(Options::NO_AUTO_CAPTURE) => {
                writeln!(out, "Matched with REG_NOSUB")?
            }
            Ok(_) if oveccount == 0 => writeln!(out, "Matched without capture")?,
            Ok(slots) => {
                for (i, slot) in slots.iter().enumerate() {
                    let Some((start, end)) = *slot else {
                        continue;
                    };
                    let text = subject.get(start..end).unwrap_or_default();
                    writeln!(out, "{:2}: {}", i, render_to_string(text, false, self.printable))?;
                    if (i == 0 && data.control.contains(Control::AFTERTEXT))
                        || data.control.contains(Control::ALLAFTERTEXT)
                    {
                        let rest = subject.get(end..).unwrap_or_default();
                        writeln!(out, "{:2}+ {}", i, render_to_string(rest, false, self.printable))?;
                    }
                }
            }
        }
        Ok(Outcome::Continue)
    }
}

/// Names of the set flags, each preceded by a space.
fn names<T: Flags + Copy>(value: T, table: &[(T, &str)]) -> String {
    table
        .iter()
        .filter(|(flag, _)| value.contains(*flag))
        .map(|(_, name)| format!(" {}", name))
        .collect()
}

fn render_str(text: &str, utf: bool, printable: Printable) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        render_char(u32::from(c), utf, printable, Some(&mut out));
    }
    out
}

/// Print the captures and substring requests of a successful match.
#[allow(clippy::too_many_arguments)]
fn show_captures<U: CodeUnit>(
    out: &mut dyn Write,
    code: &CompiledPattern,
    md: &MatchData,
    subject: &[U],
    data: &DataControl,
    capcount: usize,
    utf: bool,
    printable: Printable,
) -> io::Result<()> {
    let show = |units: &[U]| render_to_string(units, utf, printable);

    for i in 0..capcount {
        let (raw_start, raw_end) = md.pair(i);
        let (start, end) = if raw_start > raw_end {
            writeln!(
                out,
                "Start of matched string is beyond its end - displaying from end to start."
            )?;
            (raw_end, raw_start)
        } else {
            (raw_start, raw_end)
        };
        if start == UNSET {
            writeln!(out, "{:2}: <unset>", i)?;
            continue;
        }
        writeln!(out, "{:2}: {}", i, show(subject.get(start..end).unwrap_or_default()))?;
        if data.control.contains(Control::ALLAFTERTEXT) || (i == 0 && data.control.contains(Control::AFTERTEXT)) {
            writeln!(out, "{:2}+ {}", i, show(subject.get(raw_end..).unwrap_or_default()))?;
        }
    }

    if data.control.contains(Control::MARK) {
        if let Some(mark) = &md.mark {
            writeln!(out, "MK: {}", render_str(mark, utf, printable))?;
        }
    }

    for &n in &data.copy_numbers {
        match substring::copy_by_number(code, md, subject, n) {
            Ok(text) => writeln!(out, "{:2}C {} ({})", n, show(&text), text.len())?,
            Err(rc) => writeln!(out, "copy substring {} failed {}", n, rc)?,
        }
    }
    for name in data.copy_names.iter() {
        match substring::copy_by_name(code, md, subject, name) {
            Ok(text) => writeln!(out, "  C {} ({}) {}", show(&text), text.len(), name)?,
            Err(rc) => writeln!(out, "copy substring '{}' failed {}", name, rc)?,
        }
    }
    for &n in &data.get_numbers {
        match substring::get_by_number(code, md, subject, n) {
            Ok(text) => writeln!(out, "{:2}G {} ({})", n, show(&text), text.len())?,
            Err(rc) => writeln!(out, "get substring {} failed {}", n, rc)?,
        }
    }
    for name in data.get_names.iter() {
        match substring::get_by_name(code, md, subject, name) {
            Ok(text) => writeln!(out, "  G {} ({}) {}", show(&text), text.len(), name)?,
            Err(rc) => writeln!(out, "get substring '{}' failed {}", name, rc)?,
        }
    }

    if data.control.contains(Control::GETALL) {
        match substring::list(md, subject) {
            Ok(list) => {
                for (i, text) in list.iter().take(capcount).enumerate() {
                    writeln!(out, "{:2}L {}", i, show(text))?;
                }
            }
            Err(rc) => writeln!(out, "get substring list failed {}", rc)?,
        }
    }
    Ok(())
}

/// Fetch one pattern fact, reporting failures. An unset value reads as zero.
fn info<U: CodeUnit>(code: &CompiledPattern, what: InfoItem, out: &mut dyn Write) -> Result<InfoValue, HarnessError> {
    match pattern_info::<U>(code, what) {
        Ok(value) => Ok(value),
        Err(codes::UNSET) => Ok(InfoValue::Number(0)),
        Err(rc) => {
            writeln!(out, "Error {} from pattern_info_{}({})", rc, U::BITS, what as u32)?;
            if rc == codes::BADMODE {
                writeln!(
                    out,
                    "Running in {}-bit mode but pattern was compiled in {}-bit mode",
                    U::BITS,
                    code.bits()
                )?;
            }
            Err(HarnessError::PatternInfo(rc))
        }
    }
}

/// Capture count for `allcaptures`, capped at the ovector size. `None` when
/// the count cannot be read; the failure has already been printed.
fn all_captures<U: CodeUnit>(
    code: &CompiledPattern,
    oveccount: usize,
    out: &mut dyn Write,
) -> Result<Option<i32>, HarnessError> {
    match info::<U>(code, InfoItem::CaptureCount, out) {
        Ok(count) => Ok(Some((count.number() as usize + 1).min(oveccount) as i32)),
        Err(HarnessError::PatternInfo(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

fn show_pattern_info<U: CodeUnit>(
    code: &CompiledPattern,
    pattern: &PatternControl,
    printable: Printable,
    out: &mut dyn Write,
) -> Result<(), HarnessError> {
    if pattern.control.intersects(Control::BYTECODE | Control::FULLBYTECODE) {
        writeln!(out, "{}", RULE)?;
        for line in code.info().listing(pattern.control.contains(Control::FULLBYTECODE)) {
            writeln!(out, "{}", line)?;
        }
        writeln!(out, "{}", RULE)?;
    }
    if !pattern.control.contains(Control::INFO) {
        return Ok(());
    }

    let backref_max = info::<U>(code, InfoItem::BackrefMax, out)?.number();
    let bsr = match info::<U>(code, InfoItem::Bsr, out)? {
        InfoValue::Bsr(bsr) => bsr,
        _ => Bsr::default(),
    };
    let count = info::<U>(code, InfoItem::CaptureCount, out)?.number();
    let start_bits = match info::<U>(code, InfoItem::FirstBitmap, out)? {
        InfoValue::Bitmap(bits) => bits,
        _ => None,
    };
    let first = info::<U>(code, InfoItem::FirstCodeUnit, out)?;
    let first_type = info::<U>(code, InfoItem::FirstCodeType, out)?.number();
    let has_cr_or_lf = info::<U>(code, InfoItem::HasCrOrLf, out)?.number();
    let jchanged = info::<U>(code, InfoItem::JChanged, out)?.number();
    let last = info::<U>(code, InfoItem::LastCodeUnit, out)?;
    let last_type = info::<U>(code, InfoItem::LastCodeType, out)?.number();
    let match_empty = info::<U>(code, InfoItem::MatchEmpty, out)?.number();
    let match_limit = info::<U>(code, InfoItem::MatchLimit, out)?.number();
    let max_lookbehind = info::<U>(code, InfoItem::MaxLookbehind, out)?.number();
    let min_length = info::<U>(code, InfoItem::MinLength, out)?.number();
    let name_count = info::<U>(code, InfoItem::NameCount, out)?.number();
    let entry_size = info::<U>(code, InfoItem::NameEntrySize, out)?.number();
    let names_table = match info::<U>(code, InfoItem::NameTable, out)? {
        InfoValue::Names(names) => names,
        _ => Vec::new(),
    };
    let newline = match info::<U>(code, InfoItem::Newline, out)? {
        InfoValue::Newline(newline) => newline,
        _ => Newline::default(),
    };
    let recursion_limit = info::<U>(code, InfoItem::RecursionLimit, out)?.number();

    writeln!(out, "Capturing subpattern count = {}", count)?;
    if backref_max > 0 {
        writeln!(out, "Max back reference = {}", backref_max)?;
    }
    if max_lookbehind > 0 {
        writeln!(out, "Max lookbehind = {}", max_lookbehind)?;
    }
    if match_limit > 0 {
        writeln!(out, "Match limit = {}", match_limit)?;
    }
    if recursion_limit > 0 {
        writeln!(out, "Recursion limit = {}", recursion_limit)?;
    }

    if name_count > 0 {
        writeln!(out, "Named capturing subpatterns:")?;
        let width = entry_size.saturating_sub(code.units().imm2()) as usize;
        for entry in &names_table {
            let pad = width.saturating_sub(entry.units as usize);
            writeln!(
                out,
                "  {}{}{:3}",
                render_str(&entry.name, false, printable),
                " ".repeat(pad),
                entry.number
            )?;
        }
    }

    if has_cr_or_lf != 0 {
        writeln!(out, "Contains explicit CR or LF match")?;
    }
    if match_empty != 0 {
        writeln!(out, "May match empty string")?;
    }

    let compile_options = match info::<U>(code, InfoItem::ArgOptions, out)? {
        InfoValue::Options(options) => options,
        _ => Options::empty(),
    };
    let pattern_options = code.info().pattern_options;
    if (compile_options | pattern_options).is_empty() {
        writeln!(out, "No options")?;
    } else {
        if !compile_options.is_empty() {
            writeln!(out, "Compile options:{}", names(compile_options, &COMPILE_OPTION_NAMES))?;
        }
        if !pattern_options.is_empty() {
            writeln!(out, "Pattern options:{}", names(pattern_options, &COMPILE_OPTION_NAMES))?;
        }
    }

    if jchanged != 0 {
        writeln!(out, "Duplicate name status changes")?;
    }
    if bsr != Bsr::default() {
        writeln!(out, "\\R matches CR, LF, or CRLF")?;
    }
    let newline_name = match newline {
        Newline::Cr => Some("CR"),
        Newline::Lf => Some("LF"),
        Newline::Crlf => Some("CRLF"),
        Newline::AnyCrlf => Some("CR, LF, or CRLF"),
        Newline::Any => Some("any Unicode newline"),
        Newline::Default => None,
    };
    if let Some(name) = newline_name {
        writeln!(out, "Newline is {}", name)?;
    }

    let caseless = |value: &InfoValue| match value {
        InfoValue::CodeUnit { caseless: true, .. } => " (caseless)",
        _ => "",
    };
    match first_type {
        2 => writeln!(out, "First char at start or follows newline")?,
        1 => writeln!(
            out,
            "First code unit = {}{}",
            describe_code_unit(first.number(), printable),
            caseless(&first)
        )?,
        _ => writeln!(out, "No first code unit")?,
    }
    if last_type == 0 {
        writeln!(out, "No last code unit")?;
    } else {
        writeln!(
            out,
            "Last code unit = {}{}",
            describe_code_unit(last.number(), printable),
            caseless(&last)
        )?;
    }

    writeln!(out, "Subject length lower bound = {}", min_length)?;

    match start_bits {
        None => writeln!(out, "No starting code unit list")?,
        Some(bits) => {
            let mut line = String::from("Starting code units: ");
            let mut column = 24;
            for c in 0..256u32 {
                if bits[(c / 8) as usize] & (1 << (c % 8)) == 0 {
                    continue;
                }
                if column > 75 {
                    line.push_str("\n  ");
                    column = 2;
                }
                if printable.accepts(c) && c != u32::from(b' ') {
                    line.push(char::from(c as u8));
                    line.push(' ');
                    column += 2;
                } else {
                    line.push_str(&format!("\\x{:02x} ", c));
                    column += 5;
                }
            }
            writeln!(out, "{}", line)?;
        }
    }

    if pattern.jit != 0 && info::<U>(code, InfoItem::JitSize, out)?.number() == 0 {
        writeln!(out, "JIT support is not available in this version of PCRE")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::controls::CompileContext;
    use std::io::Cursor;

    fn empty_reader() -> LineReader {
        LineReader::from_reader(Box::new(Cursor::new(Vec::new())))
    }

    /// Compile `pattern` and run each data line, returning everything printed.
    fn run<U: CodeUnit>(pattern: &str, data: &[&str]) -> String {
        let mut tester = Tester::<U>::new(Timing::default());
        let mut out = Vec::new();
        let mut reader = empty_reader();
        let outcome = tester
            .process_pattern(format!("{}\n", pattern).into_bytes(), &mut reader, &mut out)
            .unwrap();
        if outcome == Outcome::Continue {
            for line in data {
                tester.process_data(format!("{}\n", line).as_bytes(), &mut out).unwrap();
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_pattern_global_gives_three_matches() {
        assert_eq!(run::<u8>("//g", &["aa"]), " 0: \n 0: \n 0: \n");
    }

    #[test]
    fn test_global_non_empty() {
        assert_eq!(run::<u8>("/a./g", &["axbyaz"]), " 0: ax\n 0: az\n");
    }

    #[test]
    fn test_global_retry_prefers_first_alternative() {
        assert_eq!(run::<u8>("/(?:|ab|a)/g", &["ab"]), " 0: \n 0: ab\n 0: \n");
        assert_eq!(run::<u8>("/(?:|ab)(?!x)/g", &["ab"]), " 0: \n 0: ab\n 0: \n");
    }

    #[test]
    fn test_notempty_takes_first_non_empty_alternative() {
        assert_eq!(run::<u8>("/(?:|ab|a)/", &["ab\\=notempty"]), " 0: ab\n");
        assert_eq!(run::<u8>("/(?:|a)(?=b)/", &["ab\\=notempty"]), " 0: a\n");
    }

    #[test]
    fn test_global_bumps_over_crlf() {
        let empty = |n: usize| " 0: \n".repeat(n);
        assert_eq!(run::<u8>("/x*/g", &["a\\r\\nb"]), empty(5));
        assert_eq!(run::<u8>("/x*/g,newline=crlf", &["a\\r\\nb"]), empty(4));
        assert_eq!(run::<u8>("/x*/g,newline=any", &["a\\r\\nb"]), empty(4));
    }

    #[test]
    fn test_global_bumps_over_whole_characters() {
        let empty = " 0: \n".repeat(3);
        assert_eq!(run::<u8>("/x*/g,utf", &["\\x{1234}b"]), empty);
        assert_eq!(run::<u16>("/x*/g,utf", &["\\x{10000}b"]), empty);
        assert_eq!(run::<u8>("/x*/g,utf", &["\\x{e9}b"]), empty);
    }

    #[test]
    fn test_allcaptures_info_failure_is_reported() {
        let code = compile::<u16>(&[u16::from(b'a')], Options::empty(), &CompileContext::default()).unwrap();
        let mut out = Vec::new();
        assert_eq!(all_captures::<u8>(&code, 10, &mut out).unwrap(), None);
        let output = String::from_utf8(out).unwrap();
        assert!(output.starts_with("Error -7 from pattern_info_8(4)\n"));
        assert!(output.contains("Running in 8-bit mode but pattern was compiled in 16-bit mode\n"));
        let code = compile::<u8>(b"(a)(b)", Options::empty(), &CompileContext::default()).unwrap();
        assert_eq!(all_captures::<u8>(&code, 10, &mut Vec::new()).unwrap(), Some(3));
    }

    #[test]
    fn test_altglobal_restarts_subject() {
        assert_eq!(run::<u8>("/^a/G", &["aab"]), " 0: a\n 0: a\n");
        assert_eq!(run::<u8>("/^a/g", &["aab"]), " 0: a\n");
    }

    #[test]
    fn test_captures_and_aftertext() {
        let output = run::<u8>("/(a)(x)?(b)/aftertext", &["zabc"]);
        assert_eq!(output, " 0: ab\n 0+ c\n 1: a\n 2: <unset>\n 3: b\n");
    }

    #[test]
    fn test_no_match() {
        assert_eq!(run::<u8>("/abc/", &["xyz"]), "No match\n");
    }

    #[test]
    fn test_compile_failure_leaves_slot_empty() {
        let mut tester = Tester::<u8>::new(Timing::default());
        let mut out = Vec::new();
        let mut reader = empty_reader();
        let outcome = tester.process_pattern(b"/(a/\n".to_vec(), &mut reader, &mut out).unwrap();
        assert_eq!(outcome, Outcome::Skip);
        assert!(!tester.has_pattern());
        assert!(String::from_utf8_lossy(&out).starts_with("Failed: error 101 at offset"));

        let outcome = tester.process_pattern(b"/a/\n".to_vec(), &mut reader, &mut out).unwrap();
        assert_eq!(outcome, Outcome::Continue);
        assert!(tester.has_pattern());
    }

    #[test]
    fn test_modifier_error_skips() {
        let output = run::<u8>("/a/,nonsense", &["a"]);
        assert_eq!(output, "** Unrecognized modifier 'nonsense'\n");
    }

    #[test]
    fn test_continuation_lines() {
        let mut tester = Tester::<u8>::new(Timing::default());
        let mut out = Vec::new();
        let mut reader = LineReader::from_reader(Box::new(Cursor::new(b"b/\n".to_vec())));
        let outcome = tester.process_pattern(b"/a\n".to_vec(), &mut reader, &mut out).unwrap();
        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(out, b"b/\n");
    }

    #[test]
    fn test_unexpected_eof() {
        let mut tester = Tester::<u8>::new(Timing::default());
        let mut out = Vec::new();
        let mut reader = empty_reader();
        let result = tester.process_pattern(b"/abc\n".to_vec(), &mut reader, &mut out);
        assert!(matches!(result, Err(HarnessError::UnexpectedEof)));
        assert_eq!(out, b"** Unexpected EOF\n");
    }

    #[test]
    fn test_info_block() {
        let output = run::<u8>("/abc/I", &[]);
        assert!(output.starts_with("Capturing subpattern count = 0\n"));
        assert!(output.contains("No options\n"));
        assert!(output.contains("Newline is LF\n"));
        assert!(output.contains("First code unit = 'a'\n"));
        assert!(output.contains("Last code unit = 'c'\n"));
        assert!(output.contains("Subject length lower bound = 3\n"));
        assert!(output.ends_with("No starting code unit list\n"));
    }

    #[test]
    fn test_info_named_groups() {
        let output = run::<u8>("/(?P<one>a)(?P<three>b)/I", &[]);
        assert!(output.contains("Named capturing subpatterns:\n  one     1\n  three   2\n"));
    }

    #[test]
    fn test_caseless_compile_options() {
        let output = run::<u8>("/abc/Ii", &[]);
        assert!(output.contains("Compile options: caseless\n"));
        assert!(output.contains("(caseless)"));
    }

    #[test]
    fn test_bytecode_is_framed() {
        let output = run::<u8>("/abc/B", &[]);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.first(), Some(&RULE));
        assert_eq!(lines.last(), Some(&RULE));
    }

    #[test]
    fn test_copy_and_get() {
        let output = run::<u8>("/(?P<word>a)(b)/", &["ab\\=copy=2,get=word,getall"]);
        assert_eq!(
            output,
            " 0: ab\n 1: a\n 2: b\n 2C b (1)\n  G a (1) word\n 0L ab\n 1L a\n 2L b\n"
        );
    }

    #[test]
    fn test_copy_failure() {
        let output = run::<u8>("/(a)/", &["a\\=copy=5"]);
        assert_eq!(output, " 0: a\n 1: a\ncopy substring 5 failed -9\n");
    }

    #[test]
    fn test_data_modifier_error() {
        let output = run::<u8>("/a/", &["a\\=,bogus"]);
        assert_eq!(output, "** Unrecognized modifier 'bogus'\n");
    }

    #[test]
    fn test_zero_ovector_with_global() {
        let output = run::<u8>("/a/g", &["a\\=ovector=0"]);
        assert!(output.starts_with("** Global matching requires a non-zero ovector count: ignored\n"));
    }

    #[test]
    fn test_too_many_substrings() {
        let output = run::<u8>("/(a)(b)/", &["ab\\=ovector=1"]);
        assert_eq!(output, "Matched, but too many substrings\n 0: ab\n");
    }

    #[test]
    fn test_allcaptures_shows_trailing_unset() {
        let output = run::<u8>("/(a)(x)?/allcaptures", &["a"]);
        assert_eq!(output, " 0: a\n 1: a\n 2: <unset>\n");
    }

    #[test]
    fn test_sixteen_bit_offsets() {
        let output = run::<u16>("/b/utf,aftertext", &["\\x{10000}bc"]);
        assert_eq!(output, " 0: b\n 0+ c\n");
    }

    #[test]
    fn test_bad_utf_subject() {
        let output = run::<u8>("/a/utf", &["\\xffa"]);
        assert!(output.starts_with("Error -3 (bad UTF-8 string) offset=0 reason="));
    }

    #[test]
    fn test_dfa_lists_longest_first() {
        let output = run::<u8>("/a+/", &["aaa\\=dfa"]);
        assert_eq!(output, " 0: aaa\n 1: aa\n 2: a\n");
    }

    #[test]
    fn test_partial_match() {
        let output = run::<u8>("/abc/", &["xab\\=partial_hard"]);
        assert_eq!(output, "Partial match: ab\n");
    }

    #[test]
    fn test_posix_route() {
        let output = run::<u8>("/(a)b/posix", &["xab"]);
        assert_eq!(output, " 0: ab\n 1: a\n");
    }

    #[test]
    fn test_posix_ignored_modifiers() {
        let output = run::<u8>("/a/posix,extended", &["a"]);
        assert!(output.starts_with("** Ignored with POSIX interface: extended\n"));
    }

    #[test]
    fn test_posix_no_match() {
        assert_eq!(run::<u8>("/a/posix", &["b"]), "No match: POSIX code 17: match failed\n");
    }

    #[test]
    fn test_posix_only_in_eight_bit_mode() {
        assert_eq!(
            run::<u32>("/a/posix", &["a"]),
            "** The POSIX interface is available only in 8-bit mode\n"
        );
    }

    #[test]
    fn test_truncation_warning_before_match() {
        let output = run::<u8>("/./", &["\\x{100}"]);
        assert!(output.starts_with("** Character \\x{100} is greater than 255 and UTF-8 mode is not enabled.\n"));
    }

    #[test]
    fn test_option_names_follow_table_order() {
        assert_eq!(
            names(Options::DOTALL | Options::CASELESS, &COMPILE_OPTION_NAMES),
            " caseless dotall"
        );
        assert_eq!(names(Control::MARK | Control::DFA, &MATCH_CONTROL_NAMES), " dfa mark");
    }
}

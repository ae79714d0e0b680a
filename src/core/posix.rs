//! POSIX-style regcomp/regexec interface over the 8-bit engine

use bitflags::bitflags;
use thiserror::Error;

use super::controls::{CompileContext, MatchContext, Options};
use super::engine::{self, codes, CompileError, CompiledPattern};
use super::substring::MatchData;

bitflags! {
    /// regcomp flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompileFlags: u32 {
        const ICASE = 0x0001;
        const NEWLINE = 0x0002;
        const DOTALL = 0x0010;
        const NOSUB = 0x0020;
        const UTF = 0x0040;
        const UNGREEDY = 0x0200;
        const UCP = 0x0400;
    }
}

bitflags! {
    /// regexec flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExecFlags: u32 {
        const NOTBOL = 0x0004;
        const NOTEOL = 0x0008;
        const NOTEMPTY = 0x0100;
    }
}

/// POSIX error codes.
pub mod reg {
    pub const ASSERT: i32 = 1;
    pub const BADBR: i32 = 2;
    pub const BADPAT: i32 = 3;
    pub const BADRPT: i32 = 4;
    pub const EBRACE: i32 = 5;
    pub const EBRACK: i32 = 6;
    pub const EESCAPE: i32 = 9;
    pub const EPAREN: i32 = 11;
    pub const ERANGE: i32 = 12;
    pub const ESIZE: i32 = 13;
    pub const ESPACE: i32 = 14;
    pub const INVARG: i32 = 16;
    pub const NOMATCH: i32 = 17;
}

const MESSAGES: [&str; 18] = [
    "",
    "internal error",
    "invalid repeat counts in {}",
    "pattern error",
    "? * + invalid",
    "unbalanced {}",
    "unbalanced []",
    "collation error - not relevant",
    "bad class",
    "bad escape sequence",
    "empty expression",
    "unbalanced ()",
    "bad range inside []",
    "expression too big",
    "failed to get memory",
    "bad back reference",
    "bad argument",
    "match failed",
];

const COMPILE_OPTIONS: [(CompileFlags, Options); 7] = [
    (CompileFlags::ICASE, Options::CASELESS),
    (CompileFlags::NEWLINE, Options::MULTILINE),
    (CompileFlags::DOTALL, Options::DOTALL),
    (CompileFlags::NOSUB, Options::NO_AUTO_CAPTURE),
    (CompileFlags::UTF, Options::UTF),
    (CompileFlags::UNGREEDY, Options::UNGREEDY),
    (CompileFlags::UCP, Options::UCP),
];

const EXEC_OPTIONS: [(ExecFlags, Options); 3] = [
    (ExecFlags::NOTBOL, Options::NOTBOL),
    (ExecFlags::NOTEOL, Options::NOTEOL),
    (ExecFlags::NOTEMPTY, Options::NOTEMPTY),
];

/// A regcomp or regexec failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", self.message())]
pub struct PosixError {
    pub code: i32,
    /// Pattern offset, for compile failures
    pub offset: Option<usize>,
}

impl PosixError {
    fn new(code: i32) -> Self {
        Self { code, offset: None }
    }

    /// The regerror text.
    pub fn message(&self) -> String {
        let text = usize::try_from(self.code)
            .ok()
            .and_then(|i| MESSAGES.get(i))
            .copied()
            .unwrap_or("unknown error code");
        match self.offset {
            Some(offset) => format!("{} at offset {}", text, offset),
            None => text.to_string(),
        }
    }
}

/// Map an engine compile error onto the nearest POSIX code.
fn classify(err: &CompileError) -> i32 {
    match err.code {
        codes::TOO_LARGE => return reg::ESIZE,
        codes::BAD_UTF_PATTERN | codes::UTF_DISABLED | codes::UCP_DISABLED => return reg::INVARG,
        codes::PARENS_NEST => return reg::EPAREN,
        _ => {}
    }
    let message = err.message.as_str();
    if message.contains("group") {
        reg::EPAREN
    } else if message.contains("character class range") || message.contains("range boundary") {
        reg::ERANGE
    } else if message.contains("character class") {
        reg::EBRACK
    } else if message.contains("counted repetition") {
        reg::EBRACE
    } else if message.contains("repetition count") || message.contains("valid decimal") {
        reg::BADBR
    } else if message.contains("repetition operator") {
        reg::BADRPT
    } else if message.contains("escape") {
        reg::EESCAPE
    } else {
        reg::BADPAT
    }
}

/// A pattern compiled through the POSIX interface.
#[derive(Debug)]
pub struct PosixRegex {
    code: CompiledPattern,
    nosub: bool,
}

pub fn regcomp(pattern: &[u8], flags: CompileFlags) -> Result<PosixRegex, PosixError> {
    let options = COMPILE_OPTIONS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .fold(Options::empty(), |acc, (_, option)| acc | *option);
    let code = engine::compile::<u8>(pattern, options, &CompileContext::default()).map_err(|err| PosixError {
        code: classify(&err),
        offset: Some(err.offset),
    })?;
    Ok(PosixRegex {
        code,
        nosub: flags.contains(CompileFlags::NOSUB),
    })
}

impl PosixRegex {
    /// Match `subject`, returning up to `nmatch` slots; unset groups are `None`.
    pub fn regexec(
        &self,
        subject: &[u8],
        nmatch: usize,
        flags: ExecFlags,
    ) -> Result<Vec<Option<(usize, usize)>>, PosixError> {
        let nmatch = if self.nosub { 0 } else { nmatch };
        let options = EXEC_OPTIONS
            .iter()
            .filter(|(flag, _)| flags.contains(*flag))
            .fold(Options::empty(), |acc, (_, option)| acc | *option);

        let mut md = MatchData::new(nmatch.max(1));
        let rc = engine::match_pattern(&self.code, subject, 0, options, &mut md, &MatchContext::default());
        if rc < 0 {
            return Err(PosixError::new(match rc {
                codes::NOMATCH | codes::PARTIAL => reg::NOMATCH,
                codes::BADUTF | codes::BADUTF_OFFSET | codes::BADOPTION => reg::INVARG,
                codes::MATCHLIMIT | codes::NOMEMORY => reg::ESPACE,
                _ => reg::ASSERT,
            }));
        }
        Ok((0..nmatch).map(|i| md.is_set(i).then(|| md.pair(i))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_and_unset_slots() {
        let re = regcomp(b"(a)(x)?b", CompileFlags::empty()).unwrap();
        let slots = re.regexec(b"zab", 4, ExecFlags::empty()).unwrap();
        assert_eq!(slots, vec![Some((1, 3)), Some((1, 2)), None, None]);
    }

    #[test]
    fn test_nosub_returns_no_slots() {
        let re = regcomp(b"(a)", CompileFlags::NOSUB).unwrap();
        assert!(re.regexec(b"a", 3, ExecFlags::empty()).unwrap().is_empty());
    }

    #[test]
    fn test_icase() {
        let re = regcomp(b"abc", CompileFlags::ICASE).unwrap();
        assert!(re.regexec(b"xABC", 1, ExecFlags::empty()).is_ok());
    }

    #[test]
    fn test_no_match_code() {
        let re = regcomp(b"abc", CompileFlags::empty()).unwrap();
        let err = re.regexec(b"xyz", 1, ExecFlags::empty()).unwrap_err();
        assert_eq!(err.code, reg::NOMATCH);
        assert_eq!(err.message(), "match failed");
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        let err = regcomp(b"(a", CompileFlags::empty()).unwrap_err();
        assert_eq!(err.code, reg::EPAREN);
        assert!(err.message().starts_with("unbalanced ()"));
    }
}

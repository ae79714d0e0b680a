//! Control records configured by modifiers
//!
//! Pattern and data lines each get a fresh record copied from a default one;
//! the compile and match contexts hold the remaining engine settings.

use bitflags::bitflags;

/// Most copy= or get= numbers one data line may ask for.
pub const MAX_COPY_GET: usize = 10;

/// Size of the packed copy= or get= name buffer, in bytes.
pub const NAME_LIST_BYTES: usize = 64;

/// Size of the locale name field, including its terminator.
pub const LOCALE_FIELD: usize = 32;

/// Size of the save file name field, including its terminator.
pub const SAVE_FIELD: usize = 64;

/// Default ovector capacity, in capture pairs.
pub const DEFAULT_OVECCOUNT: u32 = 15;

pub const DEFAULT_MATCH_LIMIT: u32 = 10_000_000;
pub const DEFAULT_RECURSION_LIMIT: u32 = 10_000_000;
pub const DEFAULT_PARENS_NEST_LIMIT: u32 = 250;

bitflags! {
    /// Compile and match options. Pattern and data records share one namespace.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Options: u32 {
        const ANCHORED = 1 << 0;
        const CASELESS = 1 << 1;
        const EXTENDED = 1 << 2;
        const MULTILINE = 1 << 3;
        const FIRSTLINE = 1 << 4;
        const DOTALL = 1 << 5;
        const DOLLAR_ENDONLY = 1 << 6;
        const UNGREEDY = 1 << 7;
        const NO_AUTO_CAPTURE = 1 << 8;
        const NO_AUTO_POSSESS = 1 << 9;
        const UTF = 1 << 10;
        const UCP = 1 << 11;
        const NO_UTF_CHECK = 1 << 12;
        const NO_START_OPTIMIZE = 1 << 13;
        const DUPNAMES = 1 << 14;
        const ALT_BSUX = 1 << 15;
        const ALLOW_EMPTY_CLASS = 1 << 16;
        const AUTO_CALLOUT = 1 << 17;
        const MATCH_UNSET_BACKREF = 1 << 18;
        const NEVER_UCP = 1 << 19;
        const NEVER_UTF = 1 << 20;
        const NOTBOL = 1 << 21;
        const NOTEOL = 1 << 22;
        const NOTEMPTY = 1 << 23;
        const NOTEMPTY_ATSTART = 1 << 24;
        const PARTIAL_SOFT = 1 << 25;
        const PARTIAL_HARD = 1 << 26;
        const DFA_RESTART = 1 << 27;
        const DFA_SHORTEST = 1 << 28;

        /// Options the engine accepts at compile time.
        const COMPILE = Self::ANCHORED.bits() | Self::CASELESS.bits() | Self::EXTENDED.bits()
            | Self::MULTILINE.bits() | Self::FIRSTLINE.bits() | Self::DOTALL.bits()
            | Self::DOLLAR_ENDONLY.bits() | Self::UNGREEDY.bits() | Self::NO_AUTO_CAPTURE.bits()
            | Self::NO_AUTO_POSSESS.bits() | Self::UTF.bits() | Self::UCP.bits()
            | Self::NO_UTF_CHECK.bits() | Self::NO_START_OPTIMIZE.bits() | Self::DUPNAMES.bits()
            | Self::ALT_BSUX.bits() | Self::ALLOW_EMPTY_CLASS.bits() | Self::AUTO_CALLOUT.bits()
            | Self::MATCH_UNSET_BACKREF.bits() | Self::NEVER_UCP.bits() | Self::NEVER_UTF.bits();

        /// Compile options the POSIX wrapper understands.
        const POSIX_COMPILE = Self::CASELESS.bits() | Self::MULTILINE.bits() | Self::DOTALL.bits()
            | Self::UTF.bits() | Self::UCP.bits() | Self::NO_AUTO_CAPTURE.bits() | Self::UNGREEDY.bits();

        /// Match options the POSIX wrapper understands.
        const POSIX_MATCH = Self::NOTBOL.bits() | Self::NOTEOL.bits() | Self::NOTEMPTY.bits();
    }
}

bitflags! {
    /// Display and behaviour controls that are not engine options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Control: u32 {
        const AFTERTEXT = 0x0000_0001;
        const ALLAFTERTEXT = 0x0000_0002;
        const ALLCAPTURES = 0x0000_0004;
        const ALTGLOBAL = 0x0000_0008;
        const BYTECODE = 0x0000_0010;
        const CALLOUT_CAPTURE = 0x0000_0020;
        const CALLOUT_NONE = 0x0000_0040;
        const DFA = 0x0000_0080;
        const FLIPBYTES = 0x0000_0100;
        const FULLBYTECODE = 0x0000_0200;
        const GETALL = 0x0000_0400;
        const GLOBAL = 0x0000_0800;
        const INFO = 0x0000_1000;
        const JITVERIFY = 0x0000_2000;
        const LIMITS = 0x0000_4000;
        const MARK = 0x0000_8000;
        const MEMORY = 0x0001_0000;
        const PERLCOMPAT = 0x0002_0000;
        const POSIX = 0x0004_0000;

        const DEBUG = Self::FULLBYTECODE.bits() | Self::INFO.bits();
        const ANYINFO = Self::DEBUG.bits() | Self::BYTECODE.bits();
        const ANYGLOB = Self::ALTGLOBAL.bits() | Self::GLOBAL.bits();

        /// Controls valid on either a pattern or a data line; data lines
        /// inherit them from the pattern.
        const ALLPD = Self::AFTERTEXT.bits() | Self::ALLAFTERTEXT.bits() | Self::ALLCAPTURES.bits()
            | Self::ALTGLOBAL.bits() | Self::GLOBAL.bits() | Self::JITVERIFY.bits()
            | Self::MARK.bits() | Self::MEMORY.bits();

        const POSIX_COMPILE = Self::AFTERTEXT.bits() | Self::ALLAFTERTEXT.bits()
            | Self::POSIX.bits();

        const POSIX_MATCH = Self::AFTERTEXT.bits() | Self::ALLAFTERTEXT.bits();
    }
}

/// Newline convention for `^`, `$` and the global-loop bump-along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Newline {
    /// The build default, which is LF
    #[default]
    Default,
    Cr,
    Lf,
    Crlf,
    Any,
    AnyCrlf,
}

impl Newline {
    /// Names accepted by `newline=`, in table order.
    pub const NAMES: [(&'static str, Newline); 6] = [
        ("DEFAULT", Newline::Default),
        ("CR", Newline::Cr),
        ("LF", Newline::Lf),
        ("CRLF", Newline::Crlf),
        ("ANY", Newline::Any),
        ("ANYCRLF", Newline::AnyCrlf),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, nl)| nl)
    }

    /// The convention actually in force.
    pub fn effective(self) -> Newline {
        match self {
            Newline::Default => Newline::Lf,
            other => other,
        }
    }

    /// True when a CR LF pair counts as a single newline.
    pub fn treats_crlf_as_one(self) -> bool {
        matches!(self.effective(), Newline::Crlf | Newline::Any | Newline::AnyCrlf)
    }
}

/// What `\R` matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bsr {
    #[default]
    Unicode,
    AnyCrlf,
}

impl Bsr {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("anycrlf") {
            Some(Bsr::AnyCrlf)
        } else if name.eq_ignore_ascii_case("unicode") {
            Some(Bsr::Unicode)
        } else {
            None
        }
    }
}

/// Settings passed to the compiler alongside the options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileContext {
    pub bsr: Bsr,
    pub newline: Newline,
    pub parens_nest_limit: u32,
}

impl Default for CompileContext {
    fn default() -> Self {
        Self {
            bsr: Bsr::default(),
            newline: Newline::default(),
            parens_nest_limit: DEFAULT_PARENS_NEST_LIMIT,
        }
    }
}

/// Settings passed to the matcher alongside the options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchContext {
    pub match_limit: u32,
    pub recursion_limit: u32,
}

impl Default for MatchContext {
    fn default() -> Self {
        Self {
            match_limit: DEFAULT_MATCH_LIMIT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

/// The four contexts: defaults set by `#pattern`/`#data` and the command
/// line, plus the active copies used by the current test.
#[derive(Debug, Clone, Default)]
pub struct Contexts {
    pub default_compile: CompileContext,
    pub compile: CompileContext,
    pub default_match: MatchContext,
    pub matching: MatchContext,
}

/// Per-pattern settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternControl {
    pub options: Options,
    pub control: Control,
    pub jit: u32,
    pub locale: String,
    pub tables: u32,
    pub save: String,
    pub stackguard: u32,
}

/// Names packed end to end with NUL separators, within a fixed byte budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameList {
    packed: Vec<u8>,
}

impl NameList {
    /// Append a name; false when it would overflow the buffer.
    pub fn push(&mut self, name: &str) -> bool {
        if self.packed.len() + name.len() + 1 > NAME_LIST_BYTES {
            return false;
        }
        self.packed.extend_from_slice(name.as_bytes());
        self.packed.push(0);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.packed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.packed
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| std::str::from_utf8(s).unwrap_or_default())
    }
}

/// Per-data-line settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataControl {
    pub options: Options,
    pub control: Control,
    pub callout_fail: [u32; 2],
    pub copy_numbers: Vec<u32>,
    pub copy_names: NameList,
    pub get_numbers: Vec<u32>,
    pub get_names: NameList,
    pub offset: u32,
    pub oveccount: u32,
    pub jitstack: u32,
}

impl Default for DataControl {
    fn default() -> Self {
        Self {
            options: Options::empty(),
            control: Control::empty(),
            callout_fail: [0; 2],
            copy_numbers: Vec::new(),
            copy_names: NameList::default(),
            get_numbers: Vec::new(),
            get_names: NameList::default(),
            offset: 0,
            oveccount: DEFAULT_OVECCOUNT,
            jitstack: 0,
        }
    }
}

/// Which records a modifier string may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    /// Trailing modifiers of a pattern line
    Pattern,
    /// `#pattern` or `--pattern`
    DefaultPattern,
    /// `\=` modifiers of a data line
    Data,
    /// `#data` or `--data`
    DefaultData,
    /// Any default record
    AnyDefault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_fullbytecode_and_info() {
        assert!(Control::DEBUG.contains(Control::FULLBYTECODE));
        assert!(Control::DEBUG.contains(Control::INFO));
        assert!(Control::ANYINFO.contains(Control::BYTECODE));
    }

    #[test]
    fn test_newline_names_case_insensitive() {
        assert_eq!(Newline::from_name("crlf"), Some(Newline::Crlf));
        assert_eq!(Newline::from_name("AnyCRLF"), Some(Newline::AnyCrlf));
        assert_eq!(Newline::from_name("lf "), None);
        assert!(Newline::Any.treats_crlf_as_one());
        assert!(!Newline::Default.treats_crlf_as_one());
    }

    #[test]
    fn test_name_list_budget() {
        let mut names = NameList::default();
        assert!(names.push("first"));
        assert!(names.push("second"));
        assert_eq!(names.iter().collect::<Vec<_>>(), vec!["first", "second"]);
        let long = "x".repeat(NAME_LIST_BYTES);
        assert!(!names.push(&long));
        assert_eq!(names.iter().count(), 2);
    }
}

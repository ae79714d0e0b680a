//! Modifier directive language
//!
//! Modifier strings are comma-separated items such as `caseless`,
//! `-global`, `offset=3` or `copy=name`. Names are looked up in a table
//! sorted by name; a leading run of single-letter abbreviations (`gims`)
//! is accepted as the first item only.

use std::sync::LazyLock;

use thiserror::Error;

use super::controls::{
    Bsr, CompileContext, Contexts, Control, DataControl, MatchContext, Newline, Options,
    PatternControl, Which, LOCALE_FIELD, MAX_COPY_GET, SAVE_FIELD,
};

/// Where a modifier may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Compile context field
    CompileContext,
    /// Match context field
    MatchContext,
    /// Pattern control record only
    Pattern,
    /// Data control record only
    Data,
    /// Data record if there is one, else the pattern record
    PatternOrData,
}

/// Integer fields, with the record each lives in implied by the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntField {
    Jit,
    JitStack,
    MatchLimit,
    RecursionLimit,
    Offset,
    Ovector,
    ParensNestLimit,
    StackGuard,
    Tables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListField {
    Copy,
    Get,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrField {
    Locale,
    Save,
}

/// What a modifier sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Control(Control),
    Option(Options),
    Bsr,
    /// `callout_fail=n[/m]`
    IntPair,
    Int(IntField),
    Newline,
    NameOrNumber(ListField),
    Str(StrField),
}

impl Kind {
    /// Flag modifiers take no value and may be negated.
    fn is_flag(self) -> bool {
        matches!(self, Kind::Control(_) | Kind::Option(_))
    }
}

/// One entry in the modifier table.
#[derive(Debug)]
pub struct Modifier {
    pub name: &'static str,
    pub scope: Scope,
    pub kind: Kind,
}

const fn entry(name: &'static str, scope: Scope, kind: Kind) -> Modifier {
    Modifier { name, scope, kind }
}

use Kind::{Control as Ctl, Option as Opt};
use Scope::{CompileContext as Ctc, Data as Dat, MatchContext as Ctm, Pattern as Pat, PatternOrData as Pd};

/// All modifiers, sorted by name.
pub static MODIFIERS: [Modifier; 65] = [
    entry("aftertext", Pd, Ctl(Control::AFTERTEXT)),
    entry("allaftertext", Pd, Ctl(Control::ALLAFTERTEXT)),
    entry("allcaptures", Pd, Ctl(Control::ALLCAPTURES)),
    entry("allow_empty_class", Pat, Opt(Options::ALLOW_EMPTY_CLASS)),
    entry("alt_bsux", Pat, Opt(Options::ALT_BSUX)),
    entry("altglobal", Pd, Ctl(Control::ALTGLOBAL)),
    entry("anchored", Pd, Opt(Options::ANCHORED)),
    entry("auto_callout", Pat, Opt(Options::AUTO_CALLOUT)),
    entry("bsr", Ctc, Kind::Bsr),
    entry("bytecode", Pat, Ctl(Control::BYTECODE)),
    entry("callout_capture", Dat, Ctl(Control::CALLOUT_CAPTURE)),
    entry("callout_fail", Dat, Kind::IntPair),
    entry("callout_none", Dat, Ctl(Control::CALLOUT_NONE)),
    entry("caseless", Pat, Opt(Options::CASELESS)),
    entry("copy", Dat, Kind::NameOrNumber(ListField::Copy)),
    entry("debug", Pat, Ctl(Control::DEBUG)),
    entry("dfa", Dat, Ctl(Control::DFA)),
    entry("dfa_restart", Dat, Opt(Options::DFA_RESTART)),
    entry("dfa_shortest", Dat, Opt(Options::DFA_SHORTEST)),
    entry("dollar_endonly", Pat, Opt(Options::DOLLAR_ENDONLY)),
    entry("dotall", Pat, Opt(Options::DOTALL)),
    entry("dupnames", Pat, Opt(Options::DUPNAMES)),
    entry("extended", Pat, Opt(Options::EXTENDED)),
    entry("firstline", Pat, Opt(Options::FIRSTLINE)),
    entry("flipbytes", Pat, Ctl(Control::FLIPBYTES)),
    entry("fullbytecode", Pat, Ctl(Control::FULLBYTECODE)),
    entry("get", Dat, Kind::NameOrNumber(ListField::Get)),
    entry("getall", Dat, Ctl(Control::GETALL)),
    entry("global", Pd, Ctl(Control::GLOBAL)),
    entry("info", Pat, Ctl(Control::INFO)),
    entry("jit", Pat, Kind::Int(IntField::Jit)),
    entry("jitstack", Dat, Kind::Int(IntField::JitStack)),
    entry("jitverify", Pd, Ctl(Control::JITVERIFY)),
    entry("limits", Dat, Ctl(Control::LIMITS)),
    entry("locale", Pat, Kind::Str(StrField::Locale)),
    entry("mark", Pd, Ctl(Control::MARK)),
    entry("match_limit", Ctm, Kind::Int(IntField::MatchLimit)),
    entry("match_unset_backref", Pat, Opt(Options::MATCH_UNSET_BACKREF)),
    entry("memory", Pd, Ctl(Control::MEMORY)),
    entry("multiline", Pat, Opt(Options::MULTILINE)),
    entry("never_ucp", Pat, Opt(Options::NEVER_UCP)),
    entry("never_utf", Pat, Opt(Options::NEVER_UTF)),
    entry("newline", Ctc, Kind::Newline),
    entry("no_auto_capture", Pat, Opt(Options::NO_AUTO_CAPTURE)),
    entry("no_auto_possess", Pat, Opt(Options::NO_AUTO_POSSESS)),
    entry("no_start_optimize", Pd, Opt(Options::NO_START_OPTIMIZE)),
    entry("no_utf_check", Pd, Opt(Options::NO_UTF_CHECK)),
    entry("notbol", Dat, Opt(Options::NOTBOL)),
    entry("notempty", Dat, Opt(Options::NOTEMPTY)),
    entry("notempty_atstart", Dat, Opt(Options::NOTEMPTY_ATSTART)),
    entry("noteol", Dat, Opt(Options::NOTEOL)),
    entry("offset", Dat, Kind::Int(IntField::Offset)),
    entry("ovector", Dat, Kind::Int(IntField::Ovector)),
    entry("parens_nest_limit", Ctc, Kind::Int(IntField::ParensNestLimit)),
    entry("partial_hard", Dat, Opt(Options::PARTIAL_HARD)),
    entry("partial_soft", Dat, Opt(Options::PARTIAL_SOFT)),
    entry("perlcompat", Pat, Ctl(Control::PERLCOMPAT)),
    entry("posix", Pat, Ctl(Control::POSIX)),
    entry("recursion_limit", Ctm, Kind::Int(IntField::RecursionLimit)),
    entry("save", Pat, Kind::Str(StrField::Save)),
    entry("stackguard", Pat, Kind::Int(IntField::StackGuard)),
    entry("tables", Pat, Kind::Int(IntField::Tables)),
    entry("ucp", Pat, Opt(Options::UCP)),
    entry("ungreedy", Pat, Opt(Options::UNGREEDY)),
    entry("utf", Pat, Opt(Options::UTF)),
];

/// Single and doubled letter abbreviations for common flag modifiers.
const ABBREVIATIONS: [(&str, &str); 12] = [
    ("B", "bytecode"),
    ("BB", "fullbytecode"),
    ("D", "debug"),
    ("I", "info"),
    ("P", "partial_soft"),
    ("PP", "partial_hard"),
    ("g", "global"),
    ("gg", "altglobal"),
    ("i", "caseless"),
    ("m", "multiline"),
    ("s", "dotall"),
    ("x", "extended"),
];

/// Abbreviations resolved to table indices once.
static ABBREVIATION_INDEX: LazyLock<Vec<(&'static str, usize)>> = LazyLock::new(|| {
    ABBREVIATIONS
        .iter()
        .map(|&(short, full)| {
            let index = scan_modifiers(full)
                .unwrap_or_else(|| panic!("BUG: abbreviation '{}' names unknown modifier '{}'", short, full));
            (short, index)
        })
        .collect()
});

/// Errors from decoding a modifier string. The text is what gets printed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModifierError {
    #[error("** Unrecognized modifier '{0}'")]
    Unrecognized(String),

    #[error("** Unrecognized modifier '{0}'\n** Single-character modifiers must come first")]
    SingleCharacterNotFirst(String),

    #[error("** Unrecognized modifier '{letter}' in '{item}'")]
    UnrecognizedAbbreviation { letter: char, item: String },

    #[error("** '{0}' is not valid here")]
    NotValidHere(&'static str),

    #[error("** /{0} is not valid here")]
    AbbreviationNotValidHere(char),

    #[error("** '=' expected after '{0}'")]
    EqualsExpected(&'static str),

    #[error("** '-' is not valid for '{0}'")]
    NegationNotValid(&'static str),

    #[error("** Invalid value in '{0}'")]
    InvalidValue(String),

    #[error("** Too many numeric '{0}' modifiers")]
    TooManyNumbers(&'static str),

    #[error("** Too many named '{0}' modifiers")]
    TooManyNames(&'static str),

    #[error("** Comma expected after modifier item '{0}'")]
    CommaExpected(&'static str),
}

/// Find a modifier by its full name.
pub fn scan_modifiers(name: &str) -> Option<usize> {
    MODIFIERS
        .binary_search_by(|m| m.name.as_bytes().cmp(name.as_bytes()))
        .ok()
}

/// The record a modifier writes into once its scope has been checked.
enum Target<'a> {
    Compile(&'a mut CompileContext),
    Match(&'a mut MatchContext),
    Pattern(&'a mut PatternControl),
    Data(&'a mut DataControl),
}

fn resolve<'a>(
    modifier: &Modifier,
    which: Which,
    contexts: &'a mut Contexts,
    pattern: Option<&'a mut PatternControl>,
    data: Option<&'a mut DataControl>,
) -> Option<Target<'a>> {
    match modifier.scope {
        Scope::CompileContext => match which {
            Which::DefaultPattern | Which::AnyDefault => {
                Some(Target::Compile(&mut contexts.default_compile))
            }
            Which::Pattern => Some(Target::Compile(&mut contexts.compile)),
            _ => None,
        },
        Scope::MatchContext => match which {
            Which::DefaultData | Which::AnyDefault => Some(Target::Match(&mut contexts.default_match)),
            Which::Data => Some(Target::Match(&mut contexts.matching)),
            _ => None,
        },
        Scope::Data => data.map(Target::Data),
        Scope::Pattern => pattern.map(Target::Pattern),
        Scope::PatternOrData => data.map(Target::Data).or_else(|| pattern.map(Target::Pattern)),
    }
}

/// Set or clear a flag modifier in its target record.
fn set_flag(kind: Kind, off: bool, target: Target<'_>) -> bool {
    match (kind, target) {
        (Kind::Control(bits), Target::Pattern(p)) => p.control.set(bits, !off),
        (Kind::Control(bits), Target::Data(d)) => d.control.set(bits, !off),
        (Kind::Option(bits), Target::Pattern(p)) => p.options.set(bits, !off),
        (Kind::Option(bits), Target::Data(d)) => d.options.set(bits, !off),
        _ => return false,
    }
    true
}

/// Parse a leading decimal number, returning it with the unparsed rest.
fn parse_decimal(s: &str) -> Option<(u32, &str)> {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let value = s[..digits].bytes().fold(0u32, |acc, b| {
        acc.saturating_mul(10).saturating_add(u32::from(b - b'0'))
    });
    Some((value, &s[digits..]))
}

/// Copy a string into a fixed-size field, leaving room for a terminator.
fn bounded(value: &str, field: usize) -> String {
    let mut end = value.len().min(field - 1);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Store a valued modifier. `item` is the whole `name=value` text.
fn set_value(modifier: &Modifier, value: &str, item: &str, target: Target<'_>) -> Result<(), ModifierError> {
    let name = modifier.name;
    let invalid = || ModifierError::InvalidValue(item.to_string());
    let mut rest = "";

    match (modifier.kind, target) {
        (Kind::Bsr, Target::Compile(ctx)) => ctx.bsr = Bsr::from_name(value).ok_or_else(invalid)?,
        (Kind::Newline, Target::Compile(ctx)) => {
            ctx.newline = Newline::from_name(value).ok_or_else(invalid)?
        }
        (Kind::IntPair, Target::Data(d)) => {
            let (first, after) = parse_decimal(value).ok_or_else(invalid)?;
            d.callout_fail[0] = first;
            d.callout_fail[1] = 0;
            rest = after;
            if let Some(second) = after.strip_prefix('/') {
                let (n, after) = parse_decimal(second).unwrap_or((0, second));
                d.callout_fail[1] = n;
                rest = after;
            }
        }
        (Kind::Int(field), target) => {
            let (n, after) = parse_decimal(value).ok_or_else(invalid)?;
            rest = after;
            match (field, target) {
                (IntField::Jit, Target::Pattern(p)) => p.jit = n,
                (IntField::StackGuard, Target::Pattern(p)) => p.stackguard = n,
                (IntField::Tables, Target::Pattern(p)) => p.tables = n,
                (IntField::JitStack, Target::Data(d)) => d.jitstack = n,
                (IntField::Offset, Target::Data(d)) => d.offset = n,
                (IntField::Ovector, Target::Data(d)) => d.oveccount = n,
                (IntField::MatchLimit, Target::Match(m)) => m.match_limit = n,
                (IntField::RecursionLimit, Target::Match(m)) => m.recursion_limit = n,
                (IntField::ParensNestLimit, Target::Compile(c)) => c.parens_nest_limit = n,
                _ => return Err(ModifierError::NotValidHere(name)),
            }
        }
        (Kind::NameOrNumber(list), Target::Data(d)) => {
            let (numbers, names) = match list {
                ListField::Copy => (&mut d.copy_numbers, &mut d.copy_names),
                ListField::Get => (&mut d.get_numbers, &mut d.get_names),
            };
            if let Some((n, after)) = parse_decimal(value) {
                if numbers.len() >= MAX_COPY_GET {
                    return Err(ModifierError::TooManyNumbers(name));
                }
                numbers.push(n);
                rest = after;
            } else {
                if value.is_empty() {
                    return Err(invalid());
                }
                if !names.push(value) {
                    return Err(ModifierError::TooManyNames(name));
                }
            }
        }
        (Kind::Str(field), Target::Pattern(p)) => match field {
            StrField::Locale => p.locale = bounded(value, LOCALE_FIELD),
            StrField::Save => p.save = bounded(value, SAVE_FIELD),
        },
        _ => return Err(ModifierError::NotValidHere(name)),
    }

    if rest.is_empty() {
        Ok(())
    } else {
        Err(ModifierError::CommaExpected(name))
    }
}

/// Apply a run of single-letter abbreviations. They always set their bits,
/// even after a leading `-`.
fn apply_abbreviations(
    item: &str,
    which: Which,
    contexts: &mut Contexts,
    mut pattern: Option<&mut PatternControl>,
    mut data: Option<&mut DataControl>,
) -> Result<(), ModifierError> {
    let mut letters = item.char_indices().peekable();
    while let Some((at, letter)) = letters.next() {
        let mut end = at + letter.len_utf8();
        if letters.peek().is_some_and(|&(_, next)| next == letter) {
            letters.next();
            end += letter.len_utf8();
        }
        let key = &item[at..end];
        let Some(&(_, index)) = ABBREVIATION_INDEX.iter().find(|(short, _)| *short == key) else {
            return Err(ModifierError::UnrecognizedAbbreviation {
                letter,
                item: item.to_string(),
            });
        };
        let modifier = &MODIFIERS[index];
        let target = resolve(modifier, which, contexts, pattern.as_deref_mut(), data.as_deref_mut())
            .ok_or(ModifierError::AbbreviationNotValidHere(letter))?;
        if !set_flag(modifier.kind, false, target) {
            return Err(ModifierError::AbbreviationNotValidHere(letter));
        }
    }
    Ok(())
}

/// Decode a modifier string into the records selected by `which`.
///
/// At most one of `pattern` and `data` is normally supplied. Processing
/// stops at the first bad item; items before it stay applied.
pub fn apply_modifiers(
    text: &str,
    which: Which,
    contexts: &mut Contexts,
    mut pattern: Option<&mut PatternControl>,
    mut data: Option<&mut DataControl>,
) -> Result<(), ModifierError> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut p = 0;
    let mut first = true;

    loop {
        while p < len && bytes[p].is_ascii_whitespace() {
            p += 1;
        }
        if p < len && bytes[p] == b',' {
            first = false;
        }
        while p < len && (bytes[p].is_ascii_whitespace() || bytes[p] == b',') {
            p += 1;
        }
        if p == len {
            return Ok(());
        }

        let mut end = p;
        while end < len && bytes[end] != b',' && !bytes[end].is_ascii_whitespace() {
            end += 1;
        }
        let off = bytes[p] == b'-';
        let start = if off { p + 1 } else { p };
        let item = &text[start..end];
        p = end;

        let (name, value) = match item.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (item, None),
        };

        let Some(index) = scan_modifiers(name) else {
            if !first {
                return Err(if item.chars().count() == 1 {
                    ModifierError::SingleCharacterNotFirst(item.to_string())
                } else {
                    ModifierError::Unrecognized(item.to_string())
                });
            }
            // A run of abbreviations reaches to the next comma, spaces included.
            let mut run_end = end;
            while run_end < len && bytes[run_end] != b',' {
                run_end += 1;
            }
            let run = if run_end == len {
                text[start..].trim_end()
            } else {
                &text[start..run_end]
            };
            p = run_end;
            apply_abbreviations(run, which, contexts, pattern.as_deref_mut(), data.as_deref_mut())?;
            continue;
        };

        let modifier = &MODIFIERS[index];
        if modifier.kind.is_flag() {
            if value.is_some() {
                return Err(ModifierError::Unrecognized(item.to_string()));
            }
        } else {
            if value.is_none() {
                return Err(ModifierError::EqualsExpected(modifier.name));
            }
            if off {
                return Err(ModifierError::NegationNotValid(modifier.name));
            }
        }

        let target = resolve(modifier, which, contexts, pattern.as_deref_mut(), data.as_deref_mut())
            .ok_or(ModifierError::NotValidHere(modifier.name))?;
        match value {
            None => {
                if !set_flag(modifier.kind, off, target) {
                    return Err(ModifierError::NotValidHere(modifier.name));
                }
            }
            Some(value) => set_value(modifier, value, item, target)?,
        }

        while p < len && bytes[p].is_ascii_whitespace() {
            p += 1;
        }
        if p < len && bytes[p] != b',' {
            return Err(ModifierError::CommaExpected(modifier.name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_mods(text: &str) -> Result<(PatternControl, Contexts), ModifierError> {
        let mut contexts = Contexts::default();
        let mut pctl = PatternControl::default();
        apply_modifiers(text, Which::Pattern, &mut contexts, Some(&mut pctl), None)?;
        Ok((pctl, contexts))
    }

    fn data_mods(text: &str) -> Result<(DataControl, Contexts), ModifierError> {
        let mut contexts = Contexts::default();
        let mut dctl = DataControl::default();
        apply_modifiers(text, Which::Data, &mut contexts, None, Some(&mut dctl))?;
        Ok((dctl, contexts))
    }

    fn linear_scan(name: &str) -> Option<usize> {
        MODIFIERS.iter().position(|m| m.name == name)
    }

    #[test]
    fn test_table_is_sorted() {
        for pair in MODIFIERS.windows(2) {
            assert!(pair[0].name < pair[1].name, "{} >= {}", pair[0].name, pair[1].name);
        }
    }

    #[test]
    fn test_binary_search_agrees_with_linear_scan() {
        for m in MODIFIERS.iter() {
            let name = m.name;
            assert_eq!(scan_modifiers(name), linear_scan(name));
            let perturbed = [
                name[..name.len() - 1].to_string(),
                format!("{}x", name),
                format!("_{}", name),
                name.to_uppercase(),
                name[1..].to_string(),
            ];
            for p in &perturbed {
                assert_eq!(scan_modifiers(p), linear_scan(p), "perturbation {p:?}");
            }
        }
        assert_eq!(scan_modifiers(""), None);
    }

    #[test]
    fn test_abbreviations_resolve() {
        assert_eq!(ABBREVIATION_INDEX.len(), ABBREVIATIONS.len());
        let (pctl, _) = pattern_mods("imsx").unwrap();
        assert!(pctl.options.contains(
            Options::CASELESS | Options::MULTILINE | Options::DOTALL | Options::EXTENDED
        ));
    }

    #[test]
    fn test_doubled_abbreviations() {
        let (pctl, _) = pattern_mods("gg").unwrap();
        assert!(pctl.control.contains(Control::ALTGLOBAL));
        assert!(!pctl.control.contains(Control::GLOBAL));
        let (pctl, _) = pattern_mods("BBi").unwrap();
        assert!(pctl.control.contains(Control::FULLBYTECODE));
        assert!(pctl.options.contains(Options::CASELESS));
    }

    #[test]
    fn test_abbreviation_only_first() {
        let err = pattern_mods("caseless,g").unwrap_err();
        assert_eq!(
            err.to_string(),
            "** Unrecognized modifier 'g'\n** Single-character modifiers must come first"
        );
        let err = pattern_mods("caseless,zz").unwrap_err();
        assert_eq!(err.to_string(), "** Unrecognized modifier 'zz'");
    }

    #[test]
    fn test_unknown_abbreviation() {
        let err = pattern_mods("iq").unwrap_err();
        assert_eq!(err.to_string(), "** Unrecognized modifier 'q' in 'iq'");
    }

    #[test]
    fn test_abbreviation_run_ends_at_comma() {
        let err = pattern_mods("i m").unwrap_err();
        assert_eq!(err.to_string(), "** Unrecognized modifier ' ' in 'i m'");
        let (pctl, _) = pattern_mods("im  ").unwrap();
        assert!(pctl.options.contains(Options::CASELESS | Options::MULTILINE));
        let (pctl, _) = pattern_mods("i,dotall").unwrap();
        assert!(pctl.options.contains(Options::CASELESS | Options::DOTALL));
    }

    #[test]
    fn test_negated_abbreviations_still_set() {
        let (pctl, _) = pattern_mods("-ig").unwrap();
        assert!(pctl.options.contains(Options::CASELESS));
        assert!(pctl.control.contains(Control::GLOBAL));
    }

    #[test]
    fn test_negation() {
        let mut contexts = Contexts::default();
        let mut pctl = PatternControl::default();
        apply_modifiers("caseless,info", Which::Pattern, &mut contexts, Some(&mut pctl), None).unwrap();
        apply_modifiers("-caseless", Which::Pattern, &mut contexts, Some(&mut pctl), None).unwrap();
        assert!(!pctl.options.contains(Options::CASELESS));
        assert!(pctl.control.contains(Control::INFO));
        let err = data_mods("-offset=3").unwrap_err();
        assert_eq!(err.to_string(), "** '-' is not valid for 'offset'");
    }

    #[test]
    fn test_integer_values() {
        let (dctl, _) = data_mods("offset=3, ovector=20").unwrap();
        assert_eq!(dctl.offset, 3);
        assert_eq!(dctl.oveccount, 20);
        assert_eq!(
            data_mods("offset=x").unwrap_err().to_string(),
            "** Invalid value in 'offset=x'"
        );
        assert_eq!(
            data_mods("offset=3x").unwrap_err().to_string(),
            "** Comma expected after modifier item 'offset'"
        );
        assert_eq!(
            data_mods("offset").unwrap_err().to_string(),
            "** '=' expected after 'offset'"
        );
    }

    #[test]
    fn test_callout_fail_pair() {
        let (dctl, _) = data_mods("callout_fail=5/2").unwrap();
        assert_eq!(dctl.callout_fail, [5, 2]);
        let (dctl, _) = data_mods("callout_fail=7").unwrap();
        assert_eq!(dctl.callout_fail, [7, 0]);
    }

    #[test]
    fn test_copy_and_get_lists() {
        let (dctl, _) = data_mods("copy=1,copy=name,get=2,get=other").unwrap();
        assert_eq!(dctl.copy_numbers, vec![1]);
        assert_eq!(dctl.copy_names.iter().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(dctl.get_numbers, vec![2]);
        assert_eq!(dctl.get_names.iter().collect::<Vec<_>>(), vec!["other"]);

        let many = (1..=MAX_COPY_GET + 1)
            .map(|n| format!("copy={}", n))
            .collect::<Vec<_>>()
            .join(",");
        assert_eq!(
            data_mods(&many).unwrap_err().to_string(),
            "** Too many numeric 'copy' modifiers"
        );

        let long = format!("get={},get={}", "a".repeat(40), "b".repeat(40));
        assert_eq!(
            data_mods(&long).unwrap_err().to_string(),
            "** Too many named 'get' modifiers"
        );
    }

    #[test]
    fn test_newline_and_bsr() {
        let (_, contexts) = pattern_mods("newline=CrLf,bsr=anycrlf").unwrap();
        assert_eq!(contexts.compile.newline, Newline::Crlf);
        assert_eq!(contexts.compile.bsr, Bsr::AnyCrlf);
        assert_eq!(contexts.default_compile.newline, Newline::Default);
        assert_eq!(
            pattern_mods("newline=bogus").unwrap_err().to_string(),
            "** Invalid value in 'newline=bogus'"
        );
    }

    #[test]
    fn test_scope_checks() {
        assert_eq!(
            pattern_mods("offset=1").unwrap_err().to_string(),
            "** 'offset' is not valid here"
        );
        assert_eq!(
            data_mods("caseless").unwrap_err().to_string(),
            "** 'caseless' is not valid here"
        );
        assert_eq!(data_mods("i").unwrap_err().to_string(), "** /i is not valid here");
        assert_eq!(
            data_mods("newline=lf").unwrap_err().to_string(),
            "** 'newline' is not valid here"
        );
        let (_, contexts) = data_mods("match_limit=100").unwrap();
        assert_eq!(contexts.matching.match_limit, 100);
    }

    #[test]
    fn test_pattern_or_data_prefers_data() {
        let mut contexts = Contexts::default();
        let mut pctl = PatternControl::default();
        let mut dctl = DataControl::default();
        apply_modifiers("global", Which::Data, &mut contexts, Some(&mut pctl), Some(&mut dctl)).unwrap();
        assert!(dctl.control.contains(Control::GLOBAL));
        assert!(!pctl.control.contains(Control::GLOBAL));
    }

    #[test]
    fn test_default_contexts() {
        let mut contexts = Contexts::default();
        let mut pctl = PatternControl::default();
        apply_modifiers(
            "newline=any,parens_nest_limit=10",
            Which::DefaultPattern,
            &mut contexts,
            Some(&mut pctl),
            None,
        )
        .unwrap();
        assert_eq!(contexts.default_compile.newline, Newline::Any);
        assert_eq!(contexts.default_compile.parens_nest_limit, 10);
        assert_eq!(contexts.compile.newline, Newline::Default);
    }

    #[test]
    fn test_flag_with_value_is_unrecognized() {
        assert_eq!(
            pattern_mods("caseless=1").unwrap_err().to_string(),
            "** Unrecognized modifier 'caseless=1'"
        );
    }

    #[test]
    fn test_whitespace_between_items() {
        assert!(pattern_mods("  caseless ,  dotall  ").is_ok());
        assert_eq!(
            pattern_mods("caseless dotall").unwrap_err().to_string(),
            "** Comma expected after modifier item 'caseless'"
        );
    }

    #[test]
    fn test_string_fields_truncate() {
        let (pctl, _) = pattern_mods(&format!("locale={}", "z".repeat(50))).unwrap();
        assert_eq!(pctl.locale.len(), LOCALE_FIELD - 1);
    }
}

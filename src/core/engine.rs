//! Regex engine selection, compilation and matching
//!
//! Patterns go to `regex` (linear time) unless they use look-around,
//! back references or atomic groups, which need `fancy-regex`. DFA matching
//! and partial-match detection walk `regex-automata` dense DFAs. Subjects
//! arrive as code units of any width; they are decoded to text for the
//! backend and match offsets are mapped back to code units.

use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::sync::LazyLock;

use regex_automata::dfa::{dense, Automaton, StartKind};
use regex_automata::util::primitives::StateID;
use regex_automata::util::syntax;
use regex_automata::{Anchored, Input, MatchKind};
use regex_syntax::ast::{self, Ast};
use regex_syntax::hir::Hir;
use thiserror::Error;

use super::analysis::{self, Analysis, FirstUnit, GroupRole, NameEntry, PatternInfo, Units};
use super::codec::CodeUnit;
use super::controls::{Bsr, CompileContext, MatchContext, Newline, Options};
use super::substring::MatchData;

static BACKREFERENCE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\\(?:g\{?)?[1-9]").expect("BUG: backreference detection pattern is invalid")
});

/// Prefix of the internal group names that carry `(*MARK)` names.
const MARK_GROUP_PREFIX: &str = "__rxmark";

const DFA_SIZE_LIMIT: usize = 10 * (1 << 20);

/// Bytes available to a substring copy.
pub const COPY_BUFFER_BYTES: usize = 1024;

/// Engine return codes. Negative values are errors; compile errors are
/// positive and come back in [`CompileError`].
pub mod codes {
    pub const NOMATCH: i32 = -1;
    pub const PARTIAL: i32 = -2;
    pub const BADUTF: i32 = -3;
    pub const BADUTF_OFFSET: i32 = -4;
    pub const BADOPTION: i32 = -5;
    pub const BADOFFSET: i32 = -6;
    pub const BADMODE: i32 = -7;
    pub const UNSET: i32 = -8;
    pub const NOSUBSTRING: i32 = -9;
    pub const NOMEMORY: i32 = -10;
    pub const DFA_UITEM: i32 = -11;
    pub const DFA_BADRESTART: i32 = -12;
    pub const MATCHLIMIT: i32 = -13;
    pub const INTERNAL: i32 = -14;

    pub const SYNTAX: i32 = 101;
    pub const UNSUPPORTED: i32 = 102;
    pub const TOO_LARGE: i32 = 103;
    pub const PARENS_NEST: i32 = 104;
    pub const BAD_UTF_PATTERN: i32 = 105;
    pub const UTF_DISABLED: i32 = 106;
    pub const UCP_DISABLED: i32 = 107;
}

/// Text for an engine return code.
pub fn error_message(code: i32) -> String {
    let text = match code {
        codes::NOMATCH => "no match",
        codes::PARTIAL => "partial match",
        codes::BADUTF => "UTF string is invalid",
        codes::BADUTF_OFFSET => "bad offset into UTF string",
        codes::BADOPTION => "bad option value",
        codes::BADOFFSET => "bad offset value",
        codes::BADMODE => "pattern compiled in wrong mode: 8/16/32-bit error",
        codes::UNSET => "requested value is not set",
        codes::NOSUBSTRING => "unknown substring",
        codes::NOMEMORY => "no more memory",
        codes::DFA_UITEM => "item unsupported for DFA matching",
        codes::DFA_BADRESTART => "invalid data in workspace for DFA restart",
        codes::MATCHLIMIT => "match limit exceeded",
        codes::INTERNAL => "internal error",
        codes::SYNTAX => "syntax error in pattern",
        codes::UNSUPPORTED => "construct not supported by this engine",
        codes::TOO_LARGE => "regular expression is too large",
        codes::PARENS_NEST => "parentheses are too deeply nested",
        codes::BAD_UTF_PATTERN => "invalid UTF string in pattern",
        codes::UTF_DISABLED => "using UTF is disabled by the application",
        codes::UCP_DISABLED => "using UCP is disabled by the application",
        _ => return format!("unknown error code {}", code),
    };
    text.to_string()
}

/// Engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    /// Standard regex crate (linear time guaranteed)
    Regex,
    /// Fancy-regex (supports lookahead, lookbehind, backreferences)
    FancyRegex,
}

/// A pattern the engine refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("error {code} at offset {offset}: {message}")]
pub struct CompileError {
    pub code: i32,
    /// Offset in code units
    pub offset: usize,
    pub message: String,
}

impl CompileError {
    fn new(code: i32, offset: usize, message: impl Into<String>) -> Self {
        Self {
            code,
            offset,
            message: message.into(),
        }
    }
}

/// Features detected in a pattern that require fancy-regex
#[derive(Debug, Default, Clone)]
pub struct FancyFeatures {
    pub lookahead: bool,
    pub lookbehind: bool,
    pub backreference: bool,
    pub atomic_group: bool,
}

impl FancyFeatures {
    /// Returns true if any fancy feature is detected
    pub fn needs_fancy(&self) -> bool {
        self.lookahead || self.lookbehind || self.backreference || self.atomic_group
    }

    /// Get a description of why fancy-regex is needed
    pub fn reason(&self) -> Option<String> {
        let mut reasons = Vec::new();
        if self.lookahead {
            reasons.push("lookahead assertion");
        }
        if self.lookbehind {
            reasons.push("lookbehind assertion");
        }
        if self.backreference {
            reasons.push("backreference");
        }
        if self.atomic_group {
            reasons.push("atomic group");
        }

        if reasons.is_empty() {
            None
        } else {
            Some(format!("Pattern uses {}", reasons.join(", ")))
        }
    }
}

/// Detect which engine features are used in a pattern
pub fn detect_fancy_features(pattern: &str) -> FancyFeatures {
    let mut features = FancyFeatures::default();

    // regex_syntax cannot parse these; detection is by string scanning.
    if pattern.contains("(?=") || pattern.contains("(?!") {
        features.lookahead = true;
    }
    if pattern.contains("(?<=") || pattern.contains("(?<!") {
        features.lookbehind = true;
    }
    if pattern.contains("(?>") {
        features.atomic_group = true;
    }
    if BACKREFERENCE_RE.is_match(pattern) {
        features.backreference = true;
    }

    features
}

/// Select the appropriate engine for a pattern
pub fn select_engine(pattern: &str) -> (EngineType, FancyFeatures) {
    let features = detect_fancy_features(pattern);
    let engine = if features.needs_fancy() {
        EngineType::FancyRegex
    } else {
        EngineType::Regex
    };
    (engine, features)
}

/// Code units decoded to text, with offset maps in both directions.
#[derive(Debug, Clone)]
pub struct TextMap {
    pub text: String,
    /// Code unit offset for every byte offset of `text`, plus the end
    unit_of_byte: Vec<usize>,
    /// Byte offset for every code unit that starts a character, plus the end
    byte_of_unit: Vec<Option<usize>>,
}

impl TextMap {
    /// Decode `units`; values that are not scalars become U+FFFD.
    pub fn new<U: CodeUnit>(units: &[U], utf: bool) -> Self {
        let mut text = String::with_capacity(units.len());
        let mut unit_of_byte = Vec::with_capacity(units.len() + 1);
        let mut byte_of_unit = vec![None; units.len() + 1];
        let mut i = 0;
        while i < units.len() {
            let (value, len) = if utf {
                U::display_char(&units[i..], true)
            } else {
                (units[i].to_u32(), 1)
            };
            byte_of_unit[i] = Some(text.len());
            text.push(char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER));
            unit_of_byte.resize(text.len(), i);
            i += len.max(1);
        }
        byte_of_unit[units.len()] = Some(text.len());
        unit_of_byte.push(units.len());
        Self {
            text,
            unit_of_byte,
            byte_of_unit,
        }
    }

    pub fn unit_at(&self, byte: usize) -> usize {
        self.unit_of_byte[byte.min(self.unit_of_byte.len() - 1)]
    }

    pub fn byte_at(&self, unit: usize) -> Option<usize> {
        self.byte_of_unit.get(unit).copied().flatten()
    }

    /// Byte offset of the character after the one at `byte`.
    fn next_boundary(&self, byte: usize) -> Option<usize> {
        self.text[byte..].chars().next().map(|c| byte + c.len_utf8())
    }
}

/// Compile options that map onto the backends' flags.
#[derive(Debug, Clone, Copy)]
struct Flags {
    caseless: bool,
    multiline: bool,
    dotall: bool,
    extended: bool,
    ungreedy: bool,
    crlf: bool,
}

impl Flags {
    fn new(options: Options, newline: Newline) -> Self {
        Self {
            caseless: options.contains(Options::CASELESS),
            multiline: options.contains(Options::MULTILINE),
            dotall: options.contains(Options::DOTALL),
            extended: options.contains(Options::EXTENDED),
            ungreedy: options.contains(Options::UNGREEDY),
            crlf: newline.treats_crlf_as_one(),
        }
    }

    fn regex(self, body: &str) -> regex::RegexBuilder {
        let mut builder = regex::RegexBuilder::new(body);
        builder
            .case_insensitive(self.caseless)
            .multi_line(self.multiline)
            .dot_matches_new_line(self.dotall)
            .ignore_whitespace(self.extended)
            .swap_greed(self.ungreedy)
            .crlf(self.crlf);
        builder
    }

    fn syntax(self) -> syntax::Config {
        syntax::Config::new()
            .case_insensitive(self.caseless)
            .multi_line(self.multiline)
            .dot_matches_new_line(self.dotall)
            .ignore_whitespace(self.extended)
            .swap_greed(self.ungreedy)
            .crlf(self.crlf)
    }

    fn translate(self, body: &str, ast: &Ast) -> Result<Hir, regex_syntax::hir::Error> {
        regex_syntax::hir::translate::TranslatorBuilder::new()
            .case_insensitive(self.caseless)
            .multi_line(self.multiline)
            .dot_matches_new_line(self.dotall)
            .swap_greed(self.ungreedy)
            .crlf(self.crlf)
            .build()
            .translate(body, ast)
    }

    /// Inline flag prefix for the backtracking engine.
    fn prefix(self) -> String {
        let mut letters = String::new();
        for (on, letter) in [
            (self.caseless, 'i'),
            (self.multiline, 'm'),
            (self.dotall, 's'),
            (self.extended, 'x'),
        ] {
            if on {
                letters.push(letter);
            }
        }
        if letters.is_empty() {
            letters
        } else {
            format!("(?{})", letters)
        }
    }
}

/// Group spans in byte offsets, indexed by backend group number.
type Spans = Vec<Option<(usize, usize)>>;

enum Backend {
    Regex(regex::Regex),
    Fancy(fancy_regex::Regex),
}

fn build_fancy(source: &str, limit: u32) -> Result<fancy_regex::Regex, fancy_regex::Error> {
    fancy_regex::RegexBuilder::new(source)
        .backtrack_limit(limit as usize)
        .build()
}

/// A compiled pattern for one code-unit width.
pub struct CompiledPattern {
    bits: u32,
    utf: bool,
    options: Options,
    newline: Newline,
    bsr: Bsr,
    engine: EngineType,
    flags: Flags,
    body: String,
    backend: Backend,
    backtrack_limit: u32,
    /// Backtracking engine rebuilt for a non-default match limit
    limited: RefCell<Option<(u32, fancy_regex::Regex)>>,
    /// Non-empty-match variant, built on first use
    nonempty: RefCell<Option<(u32, fancy_regex::Regex)>>,
    dfa: OnceCell<Option<dense::DFA<Vec<u32>>>>,
    groups: Vec<Option<GroupRole>>,
    info: PatternInfo,
}

impl std::fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("bits", &self.bits)
            .field("engine", &self.engine)
            .field("body", &self.body)
            .finish()
    }
}

impl CompiledPattern {
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn utf(&self) -> bool {
        self.utf
    }

    /// The newline convention in force, with the default resolved.
    pub fn newline(&self) -> Newline {
        self.newline.effective()
    }

    pub fn info(&self) -> &PatternInfo {
        &self.info
    }

    pub fn units(&self) -> Units {
        Units::new(self.bits, self.utf)
    }

    /// Group numbers carrying `name`, in table order.
    pub fn numbers_for_name(&self, name: &str) -> Vec<u32> {
        self.info
            .names
            .iter()
            .filter(|entry| entry.name == name)
            .map(|entry| entry.number)
            .collect()
    }

    fn dfa(&self) -> Option<&dense::DFA<Vec<u32>>> {
        self.dfa
            .get_or_init(|| {
                if self.engine != EngineType::Regex {
                    return None;
                }
                dense::Builder::new()
                    .configure(
                        dense::DFA::config()
                            .match_kind(MatchKind::All)
                            .start_kind(StartKind::Anchored)
                            .unicode_word_boundary(true)
                            .dfa_size_limit(Some(DFA_SIZE_LIMIT))
                            .determinize_size_limit(Some(DFA_SIZE_LIMIT)),
                    )
                    .syntax(self.flags.syntax())
                    .build(&self.body)
                    .ok()
            })
            .as_ref()
    }

    fn captures_at(&self, text: &str, pos: usize, limit: u32) -> Result<Option<Spans>, i32> {
        fn spans(caps: fancy_regex::Captures<'_>) -> Spans {
            caps.iter().map(|m| m.map(|m| (m.start(), m.end()))).collect()
        }

        match &self.backend {
            Backend::Regex(re) => Ok(re
                .captures_at(text, pos)
                .map(|caps| caps.iter().map(|m| m.map(|m| (m.start(), m.end()))).collect())),
            Backend::Fancy(re) if limit == self.backtrack_limit => re
                .captures_from_pos(text, pos)
                .map(|found| found.map(spans))
                .map_err(|_| codes::MATCHLIMIT),
            Backend::Fancy(_) => {
                let mut cache = self.limited.borrow_mut();
                if cache.as_ref().map(|(l, _)| *l) != Some(limit) {
                    let source = format!("{}{}", self.flags.prefix(), self.body);
                    let rebuilt = build_fancy(&source, limit).map_err(|_| codes::INTERNAL)?;
                    *cache = Some((limit, rebuilt));
                }
                match cache.as_ref() {
                    Some((_, re)) => re
                        .captures_from_pos(text, pos)
                        .map(|found| found.map(spans))
                        .map_err(|_| codes::MATCHLIMIT),
                    None => Err(codes::INTERNAL),
                }
            }
        }
    }

    /// First non-empty match starting at `at`, in the order the backtracking
    /// engine tries alternatives.
    fn nonempty_at(&self, text: &str, at: usize, limit: u32) -> Result<Option<Spans>, i32> {
        let mut cache = self.nonempty.borrow_mut();
        if cache.as_ref().map(|(l, _)| *l) != Some(limit) {
            let rebuilt = build_fancy(&nonempty_source(self.flags, &self.body), limit).map_err(|_| codes::INTERNAL)?;
            *cache = Some((limit, rebuilt));
        }
        let Some((_, re)) = cache.as_ref() else {
            return Err(codes::INTERNAL);
        };
        let found = re.captures_from_pos(text, at).map_err(|_| codes::MATCHLIMIT)?;
        Ok(found.map(|caps| caps.iter().map(|m| m.map(|m| (m.start(), m.end()))).collect()))
    }
}

/// The pattern anchored at the search start (`\G`), with an end equal to the
/// start rejected so the body backtracks into its next alternative.
fn nonempty_source(flags: Flags, body: &str) -> String {
    // A trailing comment in extended mode must not swallow the `)`.
    let close = if flags.extended { "\n)" } else { ")" };
    format!("{}\\G(?:{}{}(?!\\G)", flags.prefix(), body, close)
}

/// Scan a pattern and return the byte offset of the first parenthesis
/// nested deeper than `limit`.
fn nesting_overflow(body: &str, limit: u32) -> Option<usize> {
    let mut depth = 0u32;
    let mut in_class = false;
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => {
                depth += 1;
                if depth > limit {
                    return Some(i);
                }
            }
            ')' if !in_class => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Rewrite `(*MARK:NAME)` and `(*:NAME)` into empty named groups.
///
/// Returns the rewritten text, the original byte offset of every rewritten
/// byte (plus the end) and the mark names in group order.
fn translate_marks(text: &str) -> (String, Vec<usize>, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut origin = Vec::with_capacity(text.len() + 1);
    let mut marks = Vec::new();
    let mut in_class = false;
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        if !in_class {
            let verb = ["(*MARK:", "(*:"].into_iter().find(|v| rest.starts_with(v));
            if let Some(verb) = verb {
                if let Some(close) = rest.find(')') {
                    let name = &rest[verb.len()..close];
                    let group = format!("(?P<{}{}>)", MARK_GROUP_PREFIX, marks.len());
                    origin.extend(std::iter::repeat(i).take(group.len()));
                    out.push_str(&group);
                    marks.push(name.to_string());
                    i += close + 1;
                    continue;
                }
            }
        }
        let Some(c) = rest.chars().next() else {
            break;
        };
        let mut len = c.len_utf8();
        match c {
            '\\' => {
                if let Some(next) = rest[len..].chars().next() {
                    len += next.len_utf8();
                }
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            _ => {}
        }
        out.push_str(&rest[..len]);
        origin.extend(i..i + len);
        i += len;
    }
    origin.push(text.len());
    (out, origin, marks)
}

/// Compile a pattern given as code units of the active width.
pub fn compile<U: CodeUnit>(
    pattern: &[U],
    options: Options,
    ctx: &CompileContext,
) -> Result<CompiledPattern, CompileError> {
    let utf = options.contains(Options::UTF);
    if utf && options.contains(Options::NEVER_UTF) {
        return Err(CompileError::new(codes::UTF_DISABLED, 0, error_message(codes::UTF_DISABLED)));
    }
    if options.contains(Options::UCP | Options::NEVER_UCP) {
        return Err(CompileError::new(codes::UCP_DISABLED, 0, error_message(codes::UCP_DISABLED)));
    }
    if utf && !options.contains(Options::NO_UTF_CHECK) {
        if let Err(err) = U::check_utf(pattern) {
            return Err(CompileError::new(
                codes::BAD_UTF_PATTERN,
                err.offset,
                format!("UTF-{} error {}", U::BITS, err.reason),
            ));
        }
    }

    let map = TextMap::new(pattern, utf);
    let (body, origin, marks) = translate_marks(&map.text);
    let unit_offset = |byte: usize| map.unit_at(origin[byte.min(origin.len() - 1)]);

    if let Some(at) = nesting_overflow(&body, ctx.parens_nest_limit) {
        return Err(CompileError::new(
            codes::PARENS_NEST,
            unit_offset(at),
            error_message(codes::PARENS_NEST),
        ));
    }

    let flags = Flags::new(options, ctx.newline);
    let (mut engine, features) = select_engine(&body);
    let fancy_source = format!("{}{}", flags.prefix(), body);

    let mut parsed: Option<(Ast, Hir)> = None;
    let mut backend = None;
    if engine == EngineType::Regex {
        let ast = ast::parse::ParserBuilder::new()
            .ignore_whitespace(flags.extended)
            .build()
            .parse(&body);
        match ast {
            Ok(ast) => {
                let hir = flags.translate(&body, &ast).map_err(|err| {
                    CompileError::new(codes::SYNTAX, unit_offset(err.span().start.offset), err.kind().to_string())
                })?;
                let re = flags.regex(&body).build().map_err(|err| match err {
                    regex::Error::CompiledTooBig(_) => {
                        CompileError::new(codes::TOO_LARGE, 0, error_message(codes::TOO_LARGE))
                    }
                    other => CompileError::new(codes::UNSUPPORTED, 0, other.to_string()),
                })?;
                parsed = Some((ast, hir));
                backend = Some(Backend::Regex(re));
            }
            Err(err) => match build_fancy(&fancy_source, DEFAULT_BACKTRACK_LIMIT) {
                // Fall back to fancy-regex if the standard syntax rejects it
                Ok(re) => {
                    engine = EngineType::FancyRegex;
                    backend = Some(Backend::Fancy(re));
                }
                Err(_) => {
                    return Err(CompileError::new(
                        codes::SYNTAX,
                        unit_offset(err.span().start.offset),
                        err.kind().to_string(),
                    ))
                }
            },
        }
    }
    let backend = match backend {
        Some(backend) => backend,
        None => Backend::Fancy(
            build_fancy(&fancy_source, DEFAULT_BACKTRACK_LIMIT)
                .map_err(|err| CompileError::new(codes::UNSUPPORTED, 0, err.to_string()))?,
        ),
    };

    let internal_names: Vec<Option<String>> = match &backend {
        Backend::Regex(re) => re.capture_names().map(|n| n.map(str::to_string)).collect(),
        Backend::Fancy(re) => re.capture_names().map(|n| n.map(str::to_string)).collect(),
    };
    let mut groups = Vec::with_capacity(internal_names.len());
    let mut names: Vec<Option<String>> = vec![None];
    for (index, name) in internal_names.iter().enumerate() {
        if index == 0 {
            groups.push(None);
            continue;
        }
        let mark = name
            .as_deref()
            .and_then(|n| n.strip_prefix(MARK_GROUP_PREFIX))
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| marks.get(n));
        match mark {
            Some(mark) => groups.push(Some(GroupRole::Mark(mark.clone()))),
            None => {
                groups.push(Some(GroupRole::Capture(names.len() as u32)));
                names.push(name.clone());
            }
        }
    }

    let units = Units::new(U::BITS, utf);
    let info = analysis::analyze(Analysis {
        text: &body,
        ast: parsed.as_ref().map(|(ast, _)| ast),
        hir: parsed.as_ref().map(|(_, hir)| hir),
        units,
        options,
        capture_count: (names.len() - 1) as u32,
        groups: &groups,
        names: &names,
        fancy: (engine == EngineType::FancyRegex).then_some(&features),
    });

    Ok(CompiledPattern {
        bits: U::BITS,
        utf,
        options,
        newline: ctx.newline,
        bsr: ctx.bsr,
        engine,
        flags,
        body,
        backend,
        backtrack_limit: DEFAULT_BACKTRACK_LIMIT,
        limited: RefCell::new(None),
        nonempty: RefCell::new(None),
        dfa: OnceCell::new(),
        groups,
        info,
    })
}

/// Backtrack limit used when the match context keeps its default.
const DEFAULT_BACKTRACK_LIMIT: u32 = super::controls::DEFAULT_MATCH_LIMIT;

/// Checks shared by both matchers. Returns the decoded subject and the
/// byte offset of `start`.
fn prepare<U: CodeUnit>(
    code: &CompiledPattern,
    subject: &[U],
    start: usize,
    options: Options,
    md: &mut MatchData,
) -> Result<(TextMap, usize), i32> {
    md.reset();
    if code.bits != U::BITS {
        return Err(codes::BADMODE);
    }
    if options.intersects(Options::NOTBOL | Options::NOTEOL) {
        return Err(codes::BADOPTION);
    }
    if start > subject.len() {
        return Err(codes::BADOFFSET);
    }
    if code.utf && !(options | code.options).contains(Options::NO_UTF_CHECK) {
        if let Err(err) = U::check_utf(subject) {
            md.startchar = err.offset;
            md.utf_reason = err.reason;
            return Err(codes::BADUTF);
        }
    }
    let map = TextMap::new(subject, code.utf);
    match map.byte_at(start) {
        Some(byte) => Ok((map, byte)),
        None => Err(codes::BADUTF_OFFSET),
    }
}

fn empty_forbidden(options: Options, at: usize, start_byte: usize) -> bool {
    options.contains(Options::NOTEMPTY) || (options.contains(Options::NOTEMPTY_ATSTART) && at == start_byte)
}

/// Leftmost match honouring the anchoring and empty-match options.
fn find_match(
    code: &CompiledPattern,
    map: &TextMap,
    start_byte: usize,
    options: Options,
    anchored: bool,
    limit: u32,
) -> Result<Option<Spans>, i32> {
    let text = map.text.as_str();
    let mut pos = start_byte;
    loop {
        let Some(spans) = code.captures_at(text, pos, limit)? else {
            return Ok(None);
        };
        let Some((s, e)) = spans.first().copied().flatten() else {
            return Ok(None);
        };
        if anchored && s != start_byte {
            return Ok(None);
        }
        if s != e || !empty_forbidden(options, s, start_byte) {
            return Ok(Some(spans));
        }
        if let Some(spans) = code.nonempty_at(text, s, limit)? {
            return Ok(Some(spans));
        }
        if anchored {
            return Ok(None);
        }
        match map.next_boundary(s) {
            Some(next) => pos = next,
            None => return Ok(None),
        }
    }
}

/// Match end offsets reachable from `at`, in increasing order.
fn match_ends(dfa: &dense::DFA<Vec<u32>>, text: &str, at: usize) -> Result<Vec<usize>, i32> {
    let input = Input::new(text).range(at..).anchored(Anchored::Yes);
    let mut state = dfa.start_state_forward(&input).map_err(|_| codes::DFA_UITEM)?;
    let mut ends = Vec::new();
    for (i, &byte) in text.as_bytes()[at..].iter().enumerate() {
        state = dfa.next_state(state, byte);
        if dfa.is_special_state(state) {
            if dfa.is_match_state(state) {
                ends.push(at + i);
            } else if dfa.is_dead_state(state) {
                return Ok(ends);
            } else if dfa.is_quit_state(state) {
                return Err(codes::DFA_UITEM);
            }
        }
    }
    if dfa.is_match_state(dfa.next_eoi_state(state)) {
        ends.push(text.len());
    }
    Ok(ends)
}

/// True when some non-empty continuation from `from` reaches a match.
fn can_extend(dfa: &dense::DFA<Vec<u32>>, from: StateID) -> bool {
    // Depth is capped at 2: the match tests only care about 0, 1 and more.
    let mut seen: HashSet<(StateID, u8)> = HashSet::new();
    let mut frontier = vec![from];
    let mut depth = 0u8;
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for &state in &frontier {
            if depth >= 1 && dfa.is_match_state(dfa.next_eoi_state(state)) {
                return true;
            }
            if depth >= 2 && dfa.is_match_state(state) {
                return true;
            }
            for byte in 0..=255u8 {
                let to = dfa.next_state(state, byte);
                if dfa.is_dead_state(to) || dfa.is_quit_state(to) {
                    continue;
                }
                if seen.insert((to, (depth + 1).min(2))) {
                    next.push(to);
                }
            }
        }
        frontier = next;
        depth = (depth + 1).min(2);
    }
    false
}

/// True when the subject tail from `at` could be the start of a match.
fn viable_prefix(dfa: &dense::DFA<Vec<u32>>, text: &str, at: usize) -> bool {
    let input = Input::new(text).range(at..).anchored(Anchored::Yes);
    let Ok(mut state) = dfa.start_state_forward(&input) else {
        return false;
    };
    for &byte in &text.as_bytes()[at..] {
        state = dfa.next_state(state, byte);
        if dfa.is_dead_state(state) || dfa.is_quit_state(state) {
            return false;
        }
    }
    can_extend(dfa, state)
}

/// Earliest start of a partial match, if the options ask for one.
fn find_partial(
    code: &CompiledPattern,
    map: &TextMap,
    start_byte: usize,
    options: Options,
    anchored: bool,
    complete_start: Option<usize>,
) -> Option<usize> {
    let hard = options.contains(Options::PARTIAL_HARD);
    if !hard && !options.contains(Options::PARTIAL_SOFT) {
        return None;
    }
    let upto = match complete_start {
        Some(at) if hard => at,
        Some(_) => return None,
        None => map.text.len(),
    };
    let dfa = code.dfa()?;
    let mut at = start_byte;
    while at <= upto && at < map.text.len() {
        if viable_prefix(dfa, &map.text, at) {
            return Some(at);
        }
        if anchored {
            break;
        }
        at = map.next_boundary(at)?;
    }
    None
}

fn record_partial(md: &mut MatchData, map: &TextMap, at: usize) -> i32 {
    let left = map.unit_at(at);
    md.leftchar = left;
    md.startchar = left;
    md.store(&[Some((left, map.unit_at(map.text.len())))]);
    md.rc = codes::PARTIAL;
    codes::PARTIAL
}

/// Map backend groups to external numbering in code units and store them.
fn fill_groups(code: &CompiledPattern, map: &TextMap, spans: &Spans, md: &mut MatchData) -> i32 {
    let external = code.info.capture_count as usize + 1;
    let mut pairs: Vec<Option<(usize, usize)>> = vec![None; external];
    let mut mark: Option<(usize, &str)> = None;
    for (index, span) in spans.iter().enumerate() {
        let Some((s, e)) = *span else {
            continue;
        };
        let units = (map.unit_at(s), map.unit_at(e));
        match code.groups.get(index).and_then(Option::as_ref) {
            None if index == 0 => pairs[0] = Some(units),
            Some(GroupRole::Capture(n)) => {
                if let Some(slot) = pairs.get_mut(*n as usize) {
                    *slot = Some(units);
                }
            }
            Some(GroupRole::Mark(name)) => {
                if mark.map_or(true, |(end, _)| e >= end) {
                    mark = Some((e, name));
                }
            }
            None => {}
        }
    }
    while pairs.len() > 1 && pairs.last().is_some_and(Option::is_none) {
        pairs.pop();
    }
    md.mark = mark.map(|(_, name)| name.to_string());
    md.startchar = pairs[0].map_or(0, |(s, _)| s);
    md.leftchar = md.startchar;
    md.rc = md.store(&pairs);
    md.rc
}

/// Run a normal match. Returns the engine return code, which is also kept in
/// `md.rc`.
pub fn match_pattern<U: CodeUnit>(
    code: &CompiledPattern,
    subject: &[U],
    start: usize,
    options: Options,
    md: &mut MatchData,
    mctx: &MatchContext,
) -> i32 {
    let (map, start_byte) = match prepare(code, subject, start, options, md) {
        Ok(prepared) => prepared,
        Err(rc) => {
            md.rc = rc;
            return rc;
        }
    };
    let anchored = (options | code.options).contains(Options::ANCHORED);
    let found = match find_match(code, &map, start_byte, options, anchored, mctx.match_limit) {
        Ok(found) => found,
        Err(rc) => {
            md.rc = rc;
            return rc;
        }
    };
    let complete_start = found.as_ref().and_then(|spans| spans[0].map(|(s, _)| s));
    if let Some(at) = find_partial(code, &map, start_byte, options, anchored, complete_start) {
        return record_partial(md, &map, at);
    }
    match found {
        Some(spans) => fill_groups(code, &map, &spans, md),
        None => {
            md.rc = codes::NOMATCH;
            codes::NOMATCH
        }
    }
}

/// State carried between DFA calls for `dfa_restart`.
#[derive(Debug, Default)]
pub struct DfaWorkspace {
    restartable: bool,
}

/// Run a DFA match: every match length at the leftmost start, longest first.
pub fn dfa_match<U: CodeUnit>(
    code: &CompiledPattern,
    subject: &[U],
    start: usize,
    options: Options,
    md: &mut MatchData,
    workspace: &mut DfaWorkspace,
) -> i32 {
    let rc = run_dfa(code, subject, start, options, md, workspace);
    workspace.restartable = rc == codes::PARTIAL;
    md.rc = rc;
    rc
}

fn run_dfa<U: CodeUnit>(
    code: &CompiledPattern,
    subject: &[U],
    start: usize,
    options: Options,
    md: &mut MatchData,
    workspace: &DfaWorkspace,
) -> i32 {
    let (map, start_byte) = match prepare(code, subject, start, options, md) {
        Ok(prepared) => prepared,
        Err(rc) => return rc,
    };
    if options.contains(Options::DFA_RESTART) && !workspace.restartable {
        return codes::DFA_BADRESTART;
    }
    let Some(dfa) = code.dfa() else {
        return codes::DFA_UITEM;
    };
    let anchored = (options | code.options).contains(Options::ANCHORED);
    let text = map.text.as_str();

    let mut found: Option<(usize, Vec<usize>)> = None;
    let mut at = start_byte;
    loop {
        let ends = match match_ends(dfa, text, at) {
            Ok(ends) => ends,
            Err(rc) => return rc,
        };
        let ends: Vec<usize> = ends
            .into_iter()
            .filter(|&e| text.is_char_boundary(e))
            .filter(|&e| e != at || !empty_forbidden(options, at, start_byte))
            .collect();
        if !ends.is_empty() {
            found = Some((at, ends));
            break;
        }
        if anchored {
            break;
        }
        match map.next_boundary(at) {
            Some(next) => at = next,
            None => break,
        }
    }

    let complete_start = found.as_ref().map(|(s, _)| *s);
    if let Some(partial) = find_partial(code, &map, start_byte, options, anchored, complete_start) {
        return record_partial(md, &map, partial);
    }
    let Some((s, mut ends)) = found else {
        return codes::NOMATCH;
    };
    ends.dedup();
    ends.reverse();
    if options.contains(Options::DFA_SHORTEST) {
        ends.drain(..ends.len() - 1);
    }
    let left = map.unit_at(s);
    let pairs: Vec<Option<(usize, usize)>> = ends.iter().map(|&e| Some((left, map.unit_at(e)))).collect();
    md.startchar = left;
    md.leftchar = left;
    md.store(&pairs)
}

/// Pattern facts that can be requested, numbered as in the info API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InfoItem {
    AllOptions = 0,
    ArgOptions = 1,
    BackrefMax = 2,
    Bsr = 3,
    CaptureCount = 4,
    FirstCodeUnit = 5,
    FirstCodeType = 6,
    FirstBitmap = 7,
    HasCrOrLf = 8,
    JChanged = 9,
    JitSize = 10,
    LastCodeUnit = 11,
    LastCodeType = 12,
    MatchEmpty = 13,
    MatchLimit = 14,
    MaxLookbehind = 15,
    MinLength = 16,
    NameCount = 17,
    NameEntrySize = 18,
    NameTable = 19,
    Newline = 20,
    RecursionLimit = 21,
    Size = 22,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    Number(u32),
    Options(Options),
    Bsr(Bsr),
    Newline(Newline),
    CodeUnit { value: u32, caseless: bool },
    Bitmap(Option<[u8; 32]>),
    Names(Vec<NameEntry>),
}

impl InfoValue {
    /// Numeric view of a value.
    pub fn number(&self) -> u32 {
        match self {
            InfoValue::Number(n) => *n,
            InfoValue::CodeUnit { value, .. } => *value,
            InfoValue::Options(options) => options.bits(),
            _ => 0,
        }
    }
}

/// Look up one fact about a compiled pattern.
pub fn pattern_info<U: CodeUnit>(code: &CompiledPattern, what: InfoItem) -> Result<InfoValue, i32> {
    if code.bits != U::BITS {
        return Err(codes::BADMODE);
    }
    let info = &code.info;
    let value = match what {
        InfoItem::AllOptions => InfoValue::Options(info.compile_options | info.pattern_options),
        InfoItem::ArgOptions => InfoValue::Options(info.compile_options),
        InfoItem::BackrefMax => InfoValue::Number(info.backref_max),
        InfoItem::Bsr => InfoValue::Bsr(code.bsr),
        InfoItem::CaptureCount => InfoValue::Number(info.capture_count),
        InfoItem::FirstCodeUnit => match info.first {
            FirstUnit::Unit { value, caseless } => InfoValue::CodeUnit { value, caseless },
            _ => InfoValue::CodeUnit {
                value: 0,
                caseless: false,
            },
        },
        InfoItem::FirstCodeType => InfoValue::Number(match info.first {
            FirstUnit::None => 0,
            FirstUnit::Unit { .. } => 1,
            FirstUnit::StartOfLine => 2,
        }),
        InfoItem::FirstBitmap => InfoValue::Bitmap(info.start_bits),
        InfoItem::HasCrOrLf => InfoValue::Number(u32::from(info.has_cr_or_lf)),
        InfoItem::JChanged => InfoValue::Number(0),
        InfoItem::JitSize => InfoValue::Number(0),
        InfoItem::LastCodeUnit => match info.last {
            Some((value, caseless)) => InfoValue::CodeUnit { value, caseless },
            None => InfoValue::CodeUnit {
                value: 0,
                caseless: false,
            },
        },
        InfoItem::LastCodeType => InfoValue::Number(u32::from(info.last.is_some())),
        InfoItem::MatchEmpty => InfoValue::Number(u32::from(info.match_empty)),
        InfoItem::MatchLimit | InfoItem::RecursionLimit => return Err(codes::UNSET),
        InfoItem::MaxLookbehind => InfoValue::Number(info.max_lookbehind),
        InfoItem::MinLength => InfoValue::Number(info.min_length),
        InfoItem::NameCount => InfoValue::Number(info.names.len() as u32),
        InfoItem::NameEntrySize => InfoValue::Number(info.name_entry_size),
        InfoItem::NameTable => InfoValue::Names(info.names.clone()),
        InfoItem::Newline => InfoValue::Newline(code.newline.effective()),
        InfoItem::Size => InfoValue::Number(info.code_size(code.units())),
    };
    Ok(value)
}

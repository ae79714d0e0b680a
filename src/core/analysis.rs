//! Pattern introspection
//!
//! Computes the facts reported by the `info` control (capture names, first
//! and last code units, minimum length, starting code units) and a bytecode
//! style listing, by walking the `regex-syntax` AST and HIR of a pattern.
//! Patterns that only the backtracking engine accepts get the subset that
//! can be read off the pattern text.

use std::sync::LazyLock;

use regex_syntax::ast::{self, Ast};
use regex_syntax::hir::{Class, Hir, HirKind, Look, Repetition};

use super::codec::{render_char, Printable};
use super::controls::Options;
use super::engine::FancyFeatures;

static BACKREFERENCE_NUMBER_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\\(?:g\{?)?([1-9][0-9]*)").expect("BUG: backreference number pattern is invalid")
});

/// Unit counts at the active width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Units {
    pub bits: u32,
    pub utf: bool,
}

impl Units {
    pub fn new(bits: u32, utf: bool) -> Self {
        Self { bits, utf }
    }

    /// Code units needed for one character.
    pub fn len(self, ch: char) -> u32 {
        match (self.bits, self.utf) {
            (8, true) => ch.len_utf8() as u32,
            (16, true) => ch.len_utf16() as u32,
            _ => 1,
        }
    }

    /// First code unit of a character.
    pub fn first(self, ch: char) -> u32 {
        match (self.bits, self.utf) {
            (8, true) => {
                let mut buf = [0u8; 4];
                u32::from(ch.encode_utf8(&mut buf).as_bytes()[0])
            }
            (16, true) => {
                let mut buf = [0u16; 2];
                u32::from(ch.encode_utf16(&mut buf)[0])
            }
            _ => ch as u32,
        }
    }

    /// Last code unit of a character.
    pub fn last(self, ch: char) -> u32 {
        match (self.bits, self.utf) {
            (8, true) => {
                let mut buf = [0u8; 4];
                let bytes = ch.encode_utf8(&mut buf).as_bytes();
                u32::from(bytes[bytes.len() - 1])
            }
            (16, true) => {
                let mut buf = [0u16; 2];
                let units = ch.encode_utf16(&mut buf);
                u32::from(units[units.len() - 1])
            }
            _ => ch as u32,
        }
    }

    /// Bytes per code unit.
    pub fn unit_bytes(self) -> u32 {
        self.bits / 8
    }

    /// Units taken by a group number in the name table.
    pub fn imm2(self) -> u32 {
        if self.bits == 8 {
            2
        } else {
            1
        }
    }
}

/// What is known about the first code unit of any match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstUnit {
    None,
    Unit { value: u32, caseless: bool },
    /// Matching can only start at the subject start or after a newline
    StartOfLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub name: String,
    pub number: u32,
    /// Name length in code units
    pub units: u32,
}

/// What an internal capture group of the backend stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRole {
    Capture(u32),
    Mark(String),
}

/// One line of the program listing.
#[derive(Debug, Clone)]
struct Op {
    text: String,
    units: u32,
    /// Bracket ops show the distance to their partner
    partner: Option<usize>,
    /// Literal runs are merged; `Some(caseless)` marks one
    run: Option<bool>,
}

/// Facts about a compiled pattern.
#[derive(Debug, Clone)]
pub struct PatternInfo {
    pub capture_count: u32,
    pub backref_max: u32,
    pub max_lookbehind: u32,
    pub names: Vec<NameEntry>,
    pub name_entry_size: u32,
    pub has_cr_or_lf: bool,
    pub match_empty: bool,
    pub compile_options: Options,
    pub pattern_options: Options,
    pub first: FirstUnit,
    pub last: Option<(u32, bool)>,
    pub min_length: u32,
    pub start_bits: Option<[u8; 32]>,
    ops: Vec<Op>,
}

impl PatternInfo {
    /// Size of the program in bytes.
    pub fn code_size(&self, units: Units) -> u32 {
        self.ops.iter().map(|op| op.units).sum::<u32>() * units.unit_bytes()
    }

    /// Render the program, one op per line, optionally with offsets and lengths.
    pub fn listing(&self, full: bool) -> Vec<String> {
        let mut offsets = Vec::with_capacity(self.ops.len());
        let mut at = 0u32;
        for op in &self.ops {
            offsets.push(at);
            at += op.units;
        }
        self.ops
            .iter()
            .enumerate()
            .map(|(i, op)| {
                let text = match op.run {
                    Some(true) => format!("/i {}", op.text),
                    _ => op.text.clone(),
                };
                if !full {
                    return format!("        {}", text);
                }
                let length = match op.partner {
                    Some(p) => format!("{:>3} ", offsets[p].abs_diff(offsets[i])),
                    None => "    ".to_string(),
                };
                format!("{:>3} {}{}", offsets[i], length, text)
            })
            .collect()
    }
}

/// Inputs to [`analyze`].
pub struct Analysis<'a> {
    /// Pattern text as compiled, without the option prefix
    pub text: &'a str,
    pub ast: Option<&'a Ast>,
    pub hir: Option<&'a Hir>,
    pub units: Units,
    pub options: Options,
    /// External capture count
    pub capture_count: u32,
    /// Role of each internal group, indexed by the backend's group number
    pub groups: &'a [Option<GroupRole>],
    /// External capture names, indexed by group number
    pub names: &'a [Option<String>],
    /// Set when the backtracking engine compiled the pattern
    pub fancy: Option<&'a FancyFeatures>,
}

/// Compute pattern information.
pub fn analyze(input: Analysis<'_>) -> PatternInfo {
    let units = input.units;

    let mut names: Vec<NameEntry> = input
        .names
        .iter()
        .enumerate()
        .filter_map(|(number, name)| {
            name.as_ref().map(|name| NameEntry {
                name: name.clone(),
                number: number as u32,
                units: name.chars().map(|c| units.len(c)).sum(),
            })
        })
        .collect();
    names.sort_by(|a, b| a.name.cmp(&b.name).then(a.number.cmp(&b.number)));
    let name_entry_size = names
        .iter()
        .map(|n| n.units)
        .max()
        .map_or(0, |longest| units.imm2() + longest + 1);

    let has_cr_or_lf = match input.ast {
        Some(ast) => ast_has_cr_or_lf(ast),
        None => {
            input.text.contains(['\r', '\n']) || input.text.contains("\\r") || input.text.contains("\\n")
        }
    };

    let mut pattern_options = input.ast.map_or(Options::empty(), leading_flags);

    let walker = Walker {
        units,
        groups: input.groups,
    };

    let mut info = PatternInfo {
        capture_count: input.capture_count,
        backref_max: backref_max(input.text),
        max_lookbehind: max_lookbehind(input.text, units),
        names,
        name_entry_size,
        has_cr_or_lf,
        match_empty: false,
        compile_options: input.options & Options::COMPILE,
        pattern_options: Options::empty(),
        first: FirstUnit::None,
        last: None,
        min_length: 0,
        start_bits: None,
        ops: Vec::new(),
    };

    match input.hir {
        Some(hir) => {
            let anchored = hir.properties().look_set_prefix().contains(Look::Start);
            if anchored {
                pattern_options |= Options::ANCHORED;
            }
            info.match_empty = hir.properties().minimum_len() == Some(0);
            info.min_length = walker.min_units(hir);
            info.first = match walker.first_char(hir) {
                Some(Lead::Char(ch, caseless)) => FirstUnit::Unit {
                    value: units.first(ch),
                    caseless,
                },
                Some(Lead::StartOfLine) => FirstUnit::StartOfLine,
                None => FirstUnit::None,
            };
            if info.min_length > 1 {
                info.last = walker.last_char(hir).map(|(ch, caseless)| (units.last(ch), caseless));
            }
            if info.first == FirstUnit::None && !anchored {
                let mut bits = [0u8; 32];
                if let Ok(false) = walker.start_units(hir, &mut bits) {
                    if bits.iter().any(|&b| b != 0) && bits.iter().any(|&b| b != 0xff) {
                        info.start_bits = Some(bits);
                    }
                }
            }
            let mut program = Program::new(walker);
            program.top(hir);
            info.ops = program.ops;
        }
        None => {
            let mut program = Program::new(walker);
            program.opaque(input.fancy);
            info.ops = program.ops;
        }
    }
    info.pattern_options = pattern_options;
    info
}

/// Highest numbered back reference written in the pattern.
fn backref_max(text: &str) -> u32 {
    BACKREFERENCE_NUMBER_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

/// Longest lookbehind body, in code units.
fn max_lookbehind(text: &str, units: Units) -> u32 {
    let mut longest = 0;
    let mut search = 0;
    while let Some(found) = text[search..].find("(?<").map(|i| search + i) {
        search = found + 3;
        if !text[search..].starts_with(['=', '!']) {
            continue;
        }
        let body_start = search + 1;
        let Some(body_end) = closing_paren(text, body_start) else {
            break;
        };
        let body = &text[body_start..body_end];
        if let Ok(hir) = regex_syntax::Parser::new().parse(body) {
            let walker = Walker { units, groups: &[] };
            if let Some(max) = walker.max_units(&hir) {
                longest = longest.max(max);
            }
        }
    }
    longest
}

/// Byte index of the parenthesis closing a group whose body starts at `from`.
fn closing_paren(text: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_class = false;
    let mut chars = text[from..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                if depth == 0 {
                    return Some(from + i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Option letters set at the very start of the pattern, e.g. `(?i)`.
fn leading_flags(ast: &Ast) -> Options {
    let first = match ast {
        Ast::Concat(concat) => concat.asts.first(),
        other => Some(other),
    };
    let Some(Ast::Flags(set)) = first else {
        return Options::empty();
    };
    let mut options = Options::empty();
    let mut negate = false;
    for item in &set.flags.items {
        let bit = match item.kind {
            ast::FlagsItemKind::Negation => {
                negate = true;
                continue;
            }
            ast::FlagsItemKind::Flag(ast::Flag::CaseInsensitive) => Options::CASELESS,
            ast::FlagsItemKind::Flag(ast::Flag::MultiLine) => Options::MULTILINE,
            ast::FlagsItemKind::Flag(ast::Flag::DotMatchesNewLine) => Options::DOTALL,
            ast::FlagsItemKind::Flag(ast::Flag::SwapGreed) => Options::UNGREEDY,
            ast::FlagsItemKind::Flag(ast::Flag::IgnoreWhitespace) => Options::EXTENDED,
            _ => continue,
        };
        if !negate {
            options |= bit;
        }
    }
    options
}

/// True when the pattern names CR or LF explicitly.
fn ast_has_cr_or_lf(ast: &Ast) -> bool {
    fn is_crlf(c: char) -> bool {
        c == '\r' || c == '\n'
    }

    fn set(class: &ast::ClassSet) -> bool {
        match class {
            ast::ClassSet::Item(item) => set_item(item),
            ast::ClassSet::BinaryOp(op) => set(&op.lhs) || set(&op.rhs),
        }
    }

    fn set_item(item: &ast::ClassSetItem) -> bool {
        match item {
            ast::ClassSetItem::Literal(lit) => is_crlf(lit.c),
            ast::ClassSetItem::Range(range) => {
                (range.start.c..=range.end.c).contains(&'\n') || (range.start.c..=range.end.c).contains(&'\r')
            }
            ast::ClassSetItem::Bracketed(inner) => set(&inner.kind),
            ast::ClassSetItem::Union(union) => union.items.iter().any(set_item),
            _ => false,
        }
    }

    fn walk(ast: &Ast) -> bool {
        match ast {
            Ast::Literal(lit) => is_crlf(lit.c),
            Ast::ClassBracketed(class) => set(&class.kind),
            Ast::Group(group) => walk(&group.ast),
            Ast::Repetition(rep) => walk(&rep.ast),
            Ast::Concat(concat) => concat.asts.iter().any(walk),
            Ast::Alternation(alt) => alt.asts.iter().any(walk),
            _ => false,
        }
    }

    walk(ast)
}

/// Leading item of a match.
enum Lead {
    Char(char, bool),
    StartOfLine,
}

/// A class matching one character, or one character in both cases.
fn single_char(class: &Class) -> Option<(char, bool)> {
    let Class::Unicode(class) = class else {
        return None;
    };
    let mut chars = Vec::new();
    for range in class.ranges() {
        if (range.end() as u32 - range.start() as u32) > 1 || chars.len() > 2 {
            return None;
        }
        let mut c = range.start();
        loop {
            chars.push(c);
            if c == range.end() {
                break;
            }
            c = char::from_u32(c as u32 + 1)?;
        }
    }
    match chars.as_slice() {
        [c] => Some((*c, false)),
        [a, b] if a.to_lowercase().eq(b.to_lowercase()) => {
            let lower = if a.is_lowercase() { *a } else { *b };
            Some((lower, true))
        }
        _ => None,
    }
}

/// HIR walks parameterised by the active width.
#[derive(Clone, Copy)]
struct Walker<'a> {
    units: Units,
    groups: &'a [Option<GroupRole>],
}

impl Walker<'_> {
    fn class_min_units(self, class: &Class) -> u32 {
        match class {
            Class::Unicode(c) => c.ranges().first().map_or(0, |r| self.units.len(r.start())),
            Class::Bytes(_) => 1,
        }
    }

    fn min_units(self, hir: &Hir) -> u32 {
        match hir.kind() {
            HirKind::Empty | HirKind::Look(_) => 0,
            HirKind::Literal(lit) => String::from_utf8_lossy(&lit.0).chars().map(|c| self.units.len(c)).sum(),
            HirKind::Class(class) => self.class_min_units(class),
            HirKind::Repetition(rep) => rep.min.saturating_mul(self.min_units(&rep.sub)),
            HirKind::Capture(cap) => self.min_units(&cap.sub),
            HirKind::Concat(items) => items.iter().fold(0u32, |acc, h| acc.saturating_add(self.min_units(h))),
            HirKind::Alternation(alts) => alts.iter().map(|h| self.min_units(h)).min().unwrap_or(0),
        }
    }

    fn max_units(self, hir: &Hir) -> Option<u32> {
        match hir.kind() {
            HirKind::Empty | HirKind::Look(_) => Some(0),
            HirKind::Literal(lit) => Some(String::from_utf8_lossy(&lit.0).chars().map(|c| self.units.len(c)).sum()),
            HirKind::Class(Class::Unicode(c)) => c.ranges().last().map(|r| self.units.len(r.end())),
            HirKind::Class(Class::Bytes(_)) => Some(1),
            HirKind::Repetition(rep) => rep.max?.checked_mul(self.max_units(&rep.sub)?),
            HirKind::Capture(cap) => self.max_units(&cap.sub),
            HirKind::Concat(items) => items.iter().try_fold(0u32, |acc, h| acc.checked_add(self.max_units(h)?)),
            HirKind::Alternation(alts) => alts.iter().map(|h| self.max_units(h)).try_fold(0, |acc, m| Some(acc.max(m?))),
        }
    }

    fn zero_width(hir: &Hir) -> bool {
        hir.properties().maximum_len() == Some(0)
    }

    fn first_char(self, hir: &Hir) -> Option<Lead> {
        match hir.kind() {
            HirKind::Literal(lit) => String::from_utf8_lossy(&lit.0).chars().next().map(|c| Lead::Char(c, false)),
            HirKind::Class(class) => single_char(class).map(|(c, caseless)| Lead::Char(c, caseless)),
            HirKind::Look(Look::StartLF | Look::StartCRLF) => Some(Lead::StartOfLine),
            HirKind::Repetition(rep) if rep.min > 0 => self.first_char(&rep.sub),
            HirKind::Capture(cap) => self.first_char(&cap.sub),
            HirKind::Concat(items) => {
                for item in items {
                    if let HirKind::Look(Look::StartLF | Look::StartCRLF) = item.kind() {
                        return Some(Lead::StartOfLine);
                    }
                    if Self::zero_width(item) {
                        continue;
                    }
                    if self.min_units(item) == 0 {
                        return None;
                    }
                    return self.first_char(item);
                }
                None
            }
            HirKind::Alternation(alts) => {
                let mut common: Option<(char, bool)> = None;
                for alt in alts {
                    match self.first_char(alt)? {
                        Lead::Char(c, caseless) => match common {
                            None => common = Some((c, caseless)),
                            Some(seen) if seen == (c, caseless) => {}
                            Some(_) => return None,
                        },
                        Lead::StartOfLine => return None,
                    }
                }
                common.map(|(c, caseless)| Lead::Char(c, caseless))
            }
            _ => None,
        }
    }

    fn last_char(self, hir: &Hir) -> Option<(char, bool)> {
        match hir.kind() {
            HirKind::Literal(lit) => String::from_utf8_lossy(&lit.0).chars().last().map(|c| (c, false)),
            HirKind::Class(class) => single_char(class),
            HirKind::Repetition(rep) if rep.min > 0 => self.last_char(&rep.sub),
            HirKind::Capture(cap) => self.last_char(&cap.sub),
            HirKind::Concat(items) => items.iter().rev().find_map(|item| self.last_char(item)),
            HirKind::Alternation(alts) => {
                let first = self.last_char(alts.first()?)?;
                alts.iter()
                    .skip(1)
                    .all(|alt| self.last_char(alt) == Some(first))
                    .then_some(first)
            }
            _ => None,
        }
    }

    fn set_bit(bits: &mut [u8; 32], unit: u32) {
        bits[(unit / 8) as usize] |= 1 << (unit % 8);
    }

    fn add_class(self, class: &Class, bits: &mut [u8; 32]) -> Result<(), ()> {
        let Class::Unicode(class) = class else {
            return Err(());
        };
        for range in class.ranges() {
            let (lo, hi) = (range.start() as u32, range.end() as u32);
            if self.units.bits == 8 && self.units.utf {
                let lo_lead = self.units.first(range.start());
                let hi_lead = self.units.first(range.end());
                for lead in lo_lead..=hi_lead {
                    if !(0x80..0xc2).contains(&lead) && lead < 0xf5 {
                        Self::set_bit(bits, lead);
                    }
                }
            } else if self.units.bits == 8 {
                for unit in lo..=hi.min(0xff) {
                    Self::set_bit(bits, unit);
                }
            } else {
                if hi > 0xff {
                    return Err(());
                }
                for unit in lo..=hi {
                    Self::set_bit(bits, unit);
                }
            }
        }
        Ok(())
    }

    /// Add the possible first code units of a match to `bits`.
    ///
    /// Returns whether the item can match the empty string, in which case
    /// the following item contributes too.
    fn start_units(self, hir: &Hir, bits: &mut [u8; 32]) -> Result<bool, ()> {
        match hir.kind() {
            HirKind::Empty | HirKind::Look(_) => Ok(true),
            HirKind::Literal(lit) => match String::from_utf8_lossy(&lit.0).chars().next() {
                Some(c) => {
                    let unit = self.units.first(c);
                    if unit > 0xff {
                        return Err(());
                    }
                    Self::set_bit(bits, unit);
                    Ok(false)
                }
                None => Ok(true),
            },
            HirKind::Class(class) => self.add_class(class, bits).map(|()| false),
            HirKind::Repetition(rep) => {
                let nullable = self.start_units(&rep.sub, bits)?;
                Ok(rep.min == 0 || nullable)
            }
            HirKind::Capture(cap) => self.start_units(&cap.sub, bits),
            HirKind::Concat(items) => {
                for item in items {
                    if !self.start_units(item, bits)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            HirKind::Alternation(alts) => {
                let mut nullable = false;
                for alt in alts {
                    nullable |= self.start_units(alt, bits)?;
                }
                Ok(nullable)
            }
        }
    }
}

/// Builds the program listing from the HIR.
struct Program<'a> {
    walker: Walker<'a>,
    ops: Vec<Op>,
}

impl<'a> Program<'a> {
    fn new(walker: Walker<'a>) -> Self {
        Self {
            walker,
            ops: Vec::new(),
        }
    }

    fn bracket_units(&self) -> u32 {
        1 + self.link_units()
    }

    fn link_units(&self) -> u32 {
        if self.walker.units.bits == 8 {
            2
        } else {
            1
        }
    }

    fn push(&mut self, text: impl Into<String>, units: u32) -> usize {
        self.ops.push(Op {
            text: text.into(),
            units,
            partner: None,
            run: None,
        });
        self.ops.len() - 1
    }

    fn chars(&mut self, text: &str, caseless: bool) {
        let units = self.walker.units;
        let mut shown = String::new();
        let mut size = 0;
        for c in text.chars() {
            render_char(c as u32, units.utf, Printable::Ascii, Some(&mut shown));
            size += 1 + units.len(c);
        }
        if let Some(last) = self.ops.last_mut() {
            if last.run == Some(caseless) {
                last.text.push_str(&shown);
                last.units += size;
                return;
            }
        }
        let index = self.push(shown, size);
        self.ops[index].run = Some(caseless);
    }

    fn top(&mut self, hir: &Hir) {
        let branches: Vec<&Hir> = match hir.kind() {
            HirKind::Alternation(alts) => alts.iter().collect(),
            _ => vec![hir],
        };
        self.bracket("Bra".to_string(), &branches, "Ket".to_string());
        self.push("End", 1);
    }

    /// Listing for a pattern the HIR cannot describe.
    fn opaque(&mut self, fancy: Option<&FancyFeatures>) {
        let open = self.push("Bra", self.bracket_units());
        let reason = fancy
            .and_then(FancyFeatures::reason)
            .unwrap_or_else(|| "Pattern needs the backtracking engine".to_string());
        self.push(format!("Backtrack ({})", reason), 1);
        let ket = self.push("Ket", self.bracket_units());
        self.ops[open].partner = Some(ket);
        self.ops[ket].partner = Some(open);
        self.push("End", 1);
    }

    fn bracket(&mut self, head: String, branches: &[&Hir], ket: String) {
        let head_units = if head.starts_with("CBra") {
            self.bracket_units() + self.walker.units.imm2()
        } else {
            self.bracket_units()
        };
        let open = self.push(head, head_units);
        let mut last = open;
        for (i, branch) in branches.iter().enumerate() {
            if i > 0 {
                let alt = self.push("Alt", self.bracket_units());
                self.ops[last].partner = Some(alt);
                last = alt;
            }
            self.emit(branch);
        }
        let close = self.push(ket, self.bracket_units());
        self.ops[last].partner = Some(close);
        self.ops[close].partner = Some(open);
    }

    fn group(&mut self, index: u32, sub: &Hir, ket: String) {
        let role = self.walker.groups.get(index as usize).cloned().flatten();
        match role {
            Some(GroupRole::Mark(name)) => {
                let size = 2 + name.chars().map(|c| self.walker.units.len(c)).sum::<u32>();
                self.push(format!("*MARK {}", name), size);
            }
            Some(GroupRole::Capture(n)) => {
                let branches = Self::branches(sub);
                self.bracket(format!("CBra {}", n), &branches, ket);
            }
            None => {
                let branches = Self::branches(sub);
                self.bracket("Bra".to_string(), &branches, ket);
            }
        }
    }

    fn branches(hir: &Hir) -> Vec<&Hir> {
        match hir.kind() {
            HirKind::Alternation(alts) => alts.iter().collect(),
            _ => vec![hir],
        }
    }

    fn emit(&mut self, hir: &Hir) {
        match hir.kind() {
            HirKind::Empty => {}
            HirKind::Literal(lit) => self.chars(&String::from_utf8_lossy(&lit.0), false),
            HirKind::Class(class) => match single_char(class) {
                Some((c, caseless)) => self.chars(&c.to_string(), caseless),
                None => {
                    let size = self.class_units(class);
                    self.push(class_text(class), size);
                }
            },
            HirKind::Look(look) => {
                self.push(look_text(*look), 1);
            }
            HirKind::Repetition(rep) => self.repeat(rep),
            HirKind::Capture(cap) => self.group(cap.index, &cap.sub, "Ket".to_string()),
            HirKind::Concat(items) => {
                for item in items {
                    self.emit(item);
                }
            }
            HirKind::Alternation(alts) => {
                let branches: Vec<&Hir> = alts.iter().collect();
                self.bracket("Bra".to_string(), &branches, "Ket".to_string());
            }
        }
    }

    /// Size of a class item: a bitmap for members below 256, plus an
    /// extended list of the wider ranges.
    fn class_units(&self, class: &Class) -> u32 {
        let units = self.walker.units;
        let bitmap = 32 / units.unit_bytes();
        let Class::Unicode(class) = class else {
            return 1 + bitmap;
        };
        if matches!(class_text(&Class::Unicode(class.clone())).as_str(), "Any" | "AllAny") {
            return 1;
        }
        let wide: Vec<(char, char)> = class
            .ranges()
            .iter()
            .filter(|r| u32::from(r.end()) > 0xff)
            .map(|r| (r.start().max('\u{100}'), r.end()))
            .collect();
        if wide.is_empty() {
            return 1 + bitmap;
        }
        let narrow = class.ranges().iter().any(|r| u32::from(r.start()) <= 0xff);
        let items: u32 = wide
            .iter()
            .map(|&(lo, hi)| 1 + units.len(lo) + if hi == lo { 0 } else { units.len(hi) })
            .sum();
        let map = if narrow { bitmap } else { 0 };
        1 + self.link_units() + 1 + map + items + 1
    }

    fn repeat(&mut self, rep: &Repetition) {
        let quant = quantifier(rep);
        let counted = !matches!((rep.min, rep.max), (0, None) | (1, None) | (0, Some(1)));
        let extra = if counted { 2 * self.walker.units.imm2() } else { 0 };

        let single = match rep.sub.kind() {
            HirKind::Literal(lit) => {
                let text = String::from_utf8_lossy(&lit.0).into_owned();
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some((c.to_string(), false, 1 + self.walker.units.len(c))),
                    _ => None,
                }
            }
            HirKind::Class(class) => Some(match single_char(class) {
                Some((c, caseless)) => (c.to_string(), caseless, 1 + self.walker.units.len(c)),
                None => (class_text(class), false, self.class_units(class)),
            }),
            _ => None,
        };

        if let Some((item, caseless, size)) = single {
            let mut shown = String::new();
            if item.chars().count() == 1 && !item.starts_with('[') && item != "Any" && item != "AllAny" {
                let units = self.walker.units;
                for c in item.chars() {
                    render_char(c as u32, units.utf, Printable::Ascii, Some(&mut shown));
                }
            } else {
                shown = item;
            }
            let prefix = if caseless { "/i " } else { "" };
            self.push(format!("{}{}{}", prefix, shown, quant), size + extra);
            return;
        }

        if rep.min == 0 {
            self.push("Brazero", 1);
        }
        let ket = match (rep.min, rep.max) {
            (_, Some(1)) => "Ket".to_string(),
            (0 | 1, None) if rep.greedy => "KetRmax".to_string(),
            (0 | 1, None) => "KetRmin".to_string(),
            _ => format!("Ket{}", quant),
        };
        match rep.sub.kind() {
            HirKind::Capture(cap) => self.group(cap.index, &cap.sub, ket),
            _ => {
                let branches = Self::branches(&rep.sub);
                self.bracket("Bra".to_string(), &branches, ket);
            }
        }
    }
}

fn quantifier(rep: &Repetition) -> String {
    let base = match (rep.min, rep.max) {
        (0, None) => "*".to_string(),
        (1, None) => "+".to_string(),
        (0, Some(1)) => "?".to_string(),
        (n, Some(m)) if n == m => format!("{{{}}}", n),
        (n, None) => format!("{{{},}}", n),
        (n, Some(m)) => format!("{{{},{}}}", n, m),
    };
    if rep.greedy {
        base
    } else {
        base + "?"
    }
}

fn look_text(look: Look) -> String {
    match look {
        Look::Start | Look::StartLF | Look::StartCRLF => "^".to_string(),
        Look::End | Look::EndLF | Look::EndCRLF => "$".to_string(),
        Look::WordAscii | Look::WordUnicode => "\\b".to_string(),
        Look::WordAsciiNegate | Look::WordUnicodeNegate => "\\B".to_string(),
        other => format!("\\b{{{:?}}}", other),
    }
}

/// Most class ranges shown before the listing elides the rest.
const CLASS_RANGES_SHOWN: usize = 8;

fn class_text(class: &Class) -> String {
    let Class::Unicode(class) = class else {
        return "[bytes]".to_string();
    };
    let ranges = class.ranges();
    let all = ranges.len() == 1 && ranges[0].start() == '\0' && ranges[0].end() == char::MAX;
    if all {
        return "AllAny".to_string();
    }

    let mut negated = class.clone();
    negated.negate();
    let excluded: Vec<(char, char)> = negated.ranges().iter().map(|r| (r.start(), r.end())).collect();
    if excluded == [('\n', '\n')] || excluded == [('\n', '\n'), ('\r', '\r')] {
        return "Any".to_string();
    }

    let (prefix, shown): (&str, Vec<(char, char)>) = if excluded.len() < ranges.len() {
        ("[^", excluded)
    } else {
        ("[", ranges.iter().map(|r| (r.start(), r.end())).collect())
    };

    let mut out = String::from(prefix);
    for &(lo, hi) in shown.iter().take(CLASS_RANGES_SHOWN) {
        render_char(lo as u32, true, Printable::Ascii, Some(&mut out));
        if hi != lo {
            out.push('-');
            render_char(hi as u32, true, Printable::Ascii, Some(&mut out));
        }
    }
    if shown.len() > CLASS_RANGES_SHOWN {
        out.push_str("...");
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_for(pattern: &str, bits: u32, utf: bool) -> PatternInfo {
        let ast = ast::parse::Parser::new().parse(pattern).unwrap();
        let hir = regex_syntax::Parser::new().parse(pattern).unwrap();
        let capture_count = hir.properties().explicit_captures_len() as u32;
        let groups: Vec<Option<GroupRole>> = (0..=capture_count)
            .map(|i| (i > 0).then_some(GroupRole::Capture(i)))
            .collect();
        let names = vec![None; capture_count as usize + 1];
        analyze(Analysis {
            text: pattern,
            ast: Some(&ast),
            hir: Some(&hir),
            units: Units::new(bits, utf),
            options: Options::empty(),
            capture_count,
            groups: &groups,
            names: &names,
            fancy: None,
        })
    }

    #[test]
    fn test_first_and_last_code_unit() {
        let info = info_for("abc", 8, false);
        assert_eq!(info.first, FirstUnit::Unit { value: 'a' as u32, caseless: false });
        assert_eq!(info.last, Some(('c' as u32, false)));
        assert_eq!(info.min_length, 3);
        assert!(!info.match_empty);
    }

    #[test]
    fn test_caseless_first_unit() {
        let info = info_for("(?i)xyz", 8, false);
        assert_eq!(info.first, FirstUnit::Unit { value: 'x' as u32, caseless: true });
        assert!(info.pattern_options.contains(Options::CASELESS));
    }

    #[test]
    fn test_single_char_has_no_last_unit() {
        let info = info_for("a", 8, false);
        assert_eq!(info.last, None);
    }

    #[test]
    fn test_start_of_line() {
        let info = info_for("(?m)^abc", 8, false);
        assert_eq!(info.first, FirstUnit::StartOfLine);
        assert_eq!(info.start_bits, None);
    }

    #[test]
    fn test_starting_units_for_class() {
        let info = info_for("[abc]x", 8, false);
        assert_eq!(info.first, FirstUnit::None);
        let bits = info.start_bits.unwrap();
        for c in [b'a', b'b', b'c'] {
            assert_ne!(bits[(c / 8) as usize] & (1 << (c % 8)), 0);
        }
        assert_eq!(bits[(b'd' / 8) as usize] & (1 << (b'd' % 8)), 0);
    }

    #[test]
    fn test_nullable_pattern_has_no_start_list() {
        let info = info_for("a*", 8, false);
        assert!(info.match_empty);
        assert_eq!(info.start_bits, None);
    }

    #[test]
    fn test_min_length_by_width() {
        assert_eq!(info_for("\u{e9}\u{1F600}", 8, true).min_length, 6);
        assert_eq!(info_for("\u{e9}\u{1F600}", 16, true).min_length, 3);
        assert_eq!(info_for("\u{e9}\u{1F600}", 32, true).min_length, 2);
    }

    #[test]
    fn test_utf8_first_unit_is_lead_byte() {
        let info = info_for("\u{e9}x", 8, true);
        assert_eq!(info.first, FirstUnit::Unit { value: 0xc3, caseless: false });
    }

    #[test]
    fn test_cr_or_lf_detection() {
        assert!(info_for(r"a\nb", 8, false).has_cr_or_lf);
        assert!(info_for(r"[\r]", 8, false).has_cr_or_lf);
        assert!(!info_for(r"a\sb", 8, false).has_cr_or_lf);
    }

    #[test]
    fn test_backref_and_lookbehind_from_text() {
        assert_eq!(backref_max(r"(a)(b)\2\1"), 2);
        assert_eq!(backref_max(r"(a)\g{12}"), 12);
        assert_eq!(max_lookbehind(r"(?<=abc)d|(?<!xy)z", Units::new(8, false)), 3);
    }

    #[test]
    fn test_listing_shape() {
        let info = info_for("ab(c|d)", 8, false);
        let plain = info.listing(false);
        assert_eq!(plain.first().map(String::as_str), Some("        Bra"));
        assert!(plain.contains(&"        ab".to_string()));
        assert!(plain.contains(&"        CBra 1".to_string()));
        assert!(plain.contains(&"        Alt".to_string()));
        assert_eq!(plain.last().map(String::as_str), Some("        End"));

        let full = info.listing(true);
        assert!(full[0].starts_with("  0 "));
        assert_eq!(full.len(), plain.len());
        assert!(info.code_size(Units::new(8, false)) > 0);
    }

    #[test]
    fn test_listing_repeats() {
        let info = info_for("a+?[xy]*", 8, false);
        let plain = info.listing(false);
        assert!(plain.contains(&"        a+?".to_string()));
        assert!(plain.contains(&"        [x-y]*".to_string()));
    }

    #[test]
    fn test_class_size_follows_contents() {
        let units = Units::new(16, true);
        let narrow = info_for("[xy]", 16, true).code_size(units);
        let wide = info_for(r"[x\x{100}-\x{200}]", 16, true).code_size(units);
        let any = info_for(".", 16, true).code_size(units);
        // link, flags, one range of two single-unit characters, end marker
        assert_eq!(wide - narrow, 6 * 2);
        // a full bitmap against a one-unit Any
        assert_eq!(narrow - any, 16 * 2);
    }
}

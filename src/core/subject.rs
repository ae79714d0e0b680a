//! Data-line decoding
//!
//! Turns the text of a data line into a subject string of the active width,
//! interpreting backslash escapes and `\[...]{n}` duplication, and splits off
//! the `\=` modifier list.

use thiserror::Error;

use super::codec::{decode_utf8_scalar, CodeUnit, DataChar};

/// Initial subject buffer size, in code units.
const INITIAL_UNITS: usize = 64;

/// Most digits read from `\o{...}`.
const MAX_OCTAL_DIGITS: usize = 11;

/// Most digits read from `\x{...}`.
const MAX_HEX_DIGITS: usize = 8;

/// A data line that cannot be turned into a subject.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubjectError {
    #[error("** Failed: invalid UTF-8 string cannot be used as input in UTF mode")]
    InvalidUtf8,

    #[error("** Expected '{{' after \\[....]")]
    ExpectedOpenBrace,

    #[error("** Expected '}}' after \\[...]{{...")]
    ExpectedCloseBrace,

    #[error("** Zero repeat not allowed")]
    ZeroRepeat,

    #[error("** Nested duplication is not supported")]
    NestedDuplication,

    #[error("** Unrecognized escape sequence \"\\{0}\"")]
    UnrecognizedEscape(char),

    #[error("** Character \\x{{{0:x}}} is greater than 0x7fffffff and so cannot be converted to UTF-8")]
    TooLargeForUtf8(u32),

    #[error("** Failed: character \\x{{{0:x}}} is greater than 0x10ffff and so cannot be converted to UTF-16")]
    TooLargeForUtf16(u32),
}

/// Growable subject buffer.
///
/// One code unit past the logical length is always zero. Storage doubles
/// when it runs out.
#[derive(Debug, Clone)]
pub struct SubjectBuffer<U> {
    units: Vec<U>,
    len: usize,
    /// Warnings produced while decoding the last line
    pub notes: Vec<String>,
}

impl<U: CodeUnit> Default for SubjectBuffer<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: CodeUnit> SubjectBuffer<U> {
    pub fn new() -> Self {
        Self {
            units: vec![U::default(); INITIAL_UNITS],
            len: 0,
            notes: Vec::new(),
        }
    }

    pub fn as_slice(&self) -> &[U] {
        &self.units[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated size in code units.
    pub fn capacity(&self) -> usize {
        self.units.len()
    }

    fn reserve(&mut self, extra: usize) {
        let mut size = self.units.len();
        while self.len + extra + 1 > size {
            size *= 2;
        }
        if size != self.units.len() {
            self.units.resize(size, U::default());
        }
    }

    fn push(&mut self, unit: U) {
        self.reserve(1);
        self.units[self.len] = unit;
        self.len += 1;
        self.units[self.len] = U::default();
    }

    fn store(&mut self, value: u32, utf: bool) -> Result<(), SubjectError> {
        let mut encoded = Vec::with_capacity(6);
        match U::push_data_char(value, utf, &mut encoded) {
            Ok(DataChar::Stored) => {}
            Ok(DataChar::Truncated) => {
                let (limit, mode) = if U::BITS == 8 {
                    ("255", "UTF-8")
                } else {
                    ("0xffff", "UTF-16")
                };
                self.notes.push(format!(
                    "** Character \\x{{{:x}}} is greater than {} and {} mode is not enabled.",
                    value, limit, mode
                ));
                self.notes.push("** Truncation will probably give the wrong result.".to_string());
            }
            Err(value) if U::BITS == 8 => return Err(SubjectError::TooLargeForUtf8(value)),
            Err(value) => return Err(SubjectError::TooLargeForUtf16(value)),
        }
        for unit in encoded {
            self.push(unit);
        }
        Ok(())
    }

    /// Decode a data line into the buffer.
    ///
    /// Returns the modifier text that followed `\=`, if any. Warnings are left
    /// in `notes`, in the order they arose.
    pub fn decode(&mut self, line: &[u8], utf: bool) -> Result<Option<String>, SubjectError> {
        self.len = 0;
        self.units[0] = U::default();
        self.notes.clear();

        let p = line.trim_ascii();
        if utf {
            let mut q = 0;
            while q < p.len() {
                match decode_utf8_scalar(&p[q..]) {
                    Ok((_, n)) => q += n,
                    Err(_) => return Err(SubjectError::InvalidUtf8),
                }
            }
        }

        let mut dup_start: Option<usize> = None;
        let mut i = 0;
        while i < p.len() {
            let c = p[i];
            i += 1;

            if c == b']' {
                if let Some(start) = dup_start {
                    i = self.duplicate(p, i, start)?;
                    dup_start = None;
                    continue;
                }
            }

            if c != b'\\' {
                let value = if utf && c >= 0xc0 {
                    match decode_utf8_scalar(&p[i - 1..]) {
                        Ok((value, n)) => {
                            i += n - 1;
                            value
                        }
                        Err(_) => u32::from(c),
                    }
                } else {
                    u32::from(c)
                };
                self.store(value, utf)?;
                continue;
            }

            let Some(&escape) = p.get(i) else {
                // A lone backslash at the end allows an empty line
                continue;
            };
            i += 1;
            let value = match escape {
                b'\\' => u32::from(b'\\'),
                b'a' => 7,
                b'b' => 8,
                b'e' => 27,
                b'f' => 12,
                b'n' => u32::from(b'\n'),
                b'r' => u32::from(b'\r'),
                b't' => u32::from(b'\t'),
                b'v' => 11,
                b'0'..=b'7' => {
                    let mut value = u32::from(escape - b'0');
                    let mut digits = 0;
                    while digits < 2 && i < p.len() && (b'0'..=b'7').contains(&p[i]) {
                        value = value * 8 + u32::from(p[i] - b'0');
                        i += 1;
                        digits += 1;
                    }
                    value
                }
                b'o' if p.get(i) == Some(&b'{') => {
                    let (value, end) = self.braced(p, i + 1, 8, MAX_OCTAL_DIGITS);
                    if p.get(end) == Some(&b'}') {
                        i = end + 1;
                    } else {
                        self.notes.push("** Missing } after \\o{ (assumed)".to_string());
                    }
                    value
                }
                b'o' => u32::from(b'o'),
                b'x' => {
                    let braced = if p.get(i) == Some(&b'{') {
                        let (value, end) = self.braced(p, i + 1, 16, MAX_HEX_DIGITS);
                        (p.get(end) == Some(&b'}')).then(|| {
                            i = end + 1;
                            value
                        })
                    } else {
                        None
                    };
                    match braced {
                        Some(value) => value,
                        None => {
                            let mut value = 0u32;
                            let mut digits = 0;
                            while digits < 2 && i < p.len() && p[i].is_ascii_hexdigit() {
                                value = value * 16 + hex_value(p[i]);
                                i += 1;
                                digits += 1;
                            }
                            if utf && U::BITS == 8 {
                                // \xHH is one raw byte in 8-bit UTF mode
                                self.push(U::from_u32(value));
                                continue;
                            }
                            value
                        }
                    }
                }
                b'=' => {
                    return Ok(Some(String::from_utf8_lossy(&p[i..]).into_owned()));
                }
                b'[' => {
                    if dup_start.is_some() {
                        return Err(SubjectError::NestedDuplication);
                    }
                    dup_start = Some(self.len);
                    continue;
                }
                other => return Err(SubjectError::UnrecognizedEscape(char::from(other))),
            };
            self.store(value, utf)?;
        }
        Ok(None)
    }

    /// Read the digits of a `\o{...}` or `\x{...}` item starting at `from`.
    ///
    /// Returns the value and the index of the first non-digit.
    fn braced(&mut self, p: &[u8], from: usize, radix: u32, max_digits: usize) -> (u32, usize) {
        let mut value = 0u32;
        let mut digits = 0;
        let mut at = from;
        while at < p.len() && char::from(p[at]).is_digit(radix) {
            digits += 1;
            if digits == max_digits + 1 {
                self.notes.push(if radix == 8 {
                    "** Too many octal digits in \\o{...} item; using only the first twelve.".to_string()
                } else {
                    "** Too many hex digits in \\x{...} item; using only the first eight.".to_string()
                });
            }
            if digits <= max_digits {
                value = value.wrapping_mul(radix).wrapping_add(hex_value(p[at]));
            }
            at += 1;
        }
        (value, at)
    }

    /// Handle `]{n}` closing a duplicated sequence; `i` is just past the `]`.
    fn duplicate(&mut self, p: &[u8], mut i: usize, start: usize) -> Result<usize, SubjectError> {
        if p.get(i) != Some(&b'{') {
            return Err(SubjectError::ExpectedOpenBrace);
        }
        i += 1;
        let mut count = 0u32;
        while i < p.len() && p[i].is_ascii_digit() {
            count = count.saturating_mul(10).saturating_add(u32::from(p[i] - b'0'));
            i += 1;
        }
        if p.get(i) != Some(&b'}') {
            return Err(SubjectError::ExpectedCloseBrace);
        }
        i += 1;
        if count == 0 {
            return Err(SubjectError::ZeroRepeat);
        }
        let seq_len = self.len - start;
        let copies = count as usize - 1;
        self.reserve(seq_len.saturating_mul(copies));
        for _ in 0..copies {
            self.units.copy_within(start..start + seq_len, self.len);
            self.len += seq_len;
        }
        self.units[self.len] = U::default();
        Ok(i)
    }
}

fn hex_value(b: u8) -> u32 {
    char::from(b).to_digit(16).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode8(line: &str, utf: bool) -> (Vec<u8>, Option<String>, Vec<String>) {
        let mut buf = SubjectBuffer::<u8>::new();
        let mods = buf.decode(line.as_bytes(), utf).unwrap();
        (buf.as_slice().to_vec(), mods, buf.notes.clone())
    }

    #[test]
    fn test_duplication() {
        let (units, _, _) = decode8(r"\x41\[\x42\x43]{3}", false);
        assert_eq!(units, b"ABCBCBC");
    }

    #[test]
    fn test_simple_escapes() {
        let (units, _, _) = decode8(r"a\tb\n\\\e\101\o{102}\x{43}", false);
        assert_eq!(units, b"a\tb\n\\\x1bABC");
    }

    #[test]
    fn test_modifiers_split() {
        let (units, mods, _) = decode8(r"  abc\=offset=1,g  ", false);
        assert_eq!(units, b"abc");
        assert_eq!(mods.as_deref(), Some("offset=1,g"));
    }

    #[test]
    fn test_trailing_backslash() {
        let (units, mods, _) = decode8("\\", false);
        assert!(units.is_empty());
        assert_eq!(mods, None);
    }

    #[test]
    fn test_raw_byte_in_utf8_mode() {
        let (units, _, _) = decode8(r"\xff\x{ff}", true);
        assert_eq!(units, vec![0xff, 0xc3, 0xbf]);
    }

    #[test]
    fn test_truncation_warning() {
        let (units, _, notes) = decode8(r"\x{100}", false);
        assert_eq!(units, vec![0]);
        assert_eq!(notes.len(), 2);
        assert!(notes[0].contains("greater than 255"));
    }

    #[test]
    fn test_missing_octal_brace() {
        let (units, _, notes) = decode8(r"\o{101", false);
        assert_eq!(notes, vec!["** Missing } after \\o{ (assumed)".to_string()]);
        assert_eq!(units, b"A{101");
    }

    #[test]
    fn test_duplication_errors() {
        let mut buf = SubjectBuffer::<u8>::new();
        assert_eq!(buf.decode(br"\[ab]x", false), Err(SubjectError::ExpectedOpenBrace));
        assert_eq!(buf.decode(br"\[ab]{2", false), Err(SubjectError::ExpectedCloseBrace));
        assert_eq!(buf.decode(br"\[ab]{0}", false), Err(SubjectError::ZeroRepeat));
        assert_eq!(buf.decode(br"\[a\[b]{2}", false), Err(SubjectError::NestedDuplication));
        assert_eq!(buf.decode(br"\q", false), Err(SubjectError::UnrecognizedEscape('q')));
    }

    #[test]
    fn test_invalid_utf8_input() {
        let mut buf = SubjectBuffer::<u8>::new();
        assert_eq!(buf.decode(&[b'a', 0xff], true), Err(SubjectError::InvalidUtf8));
    }

    #[test]
    fn test_utf16_surrogates_and_limit() {
        let mut buf = SubjectBuffer::<u16>::new();
        buf.decode(r"\x{1f600}".as_bytes(), true).unwrap();
        assert_eq!(buf.as_slice(), &[0xd83d, 0xde00]);
        assert_eq!(
            buf.decode(r"\x{110000}".as_bytes(), true),
            Err(SubjectError::TooLargeForUtf16(0x110000))
        );
    }

    #[test]
    fn test_buffer_doubles_and_stays_terminated() {
        let mut buf = SubjectBuffer::<u32>::new();
        buf.decode(r"\[x]{200}".as_bytes(), false).unwrap();
        assert_eq!(buf.len(), 200);
        assert_eq!(buf.capacity(), 256);
        assert_eq!(buf.units[200], 0);
    }
}

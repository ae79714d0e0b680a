//! Multi-width text codec
//!
//! Converts between the UTF-8 text of test scripts and the 8, 16 and 32-bit
//! code-unit strings handed to the engine, and renders code-unit strings back
//! as printable text. UTF-8 here follows RFC 2279: up to six bytes and values
//! up to 0x7fffffff, so that out-of-range test inputs can be built.

use std::fmt::{self, Write as _};

use thiserror::Error;

/// Largest value for each UTF-8 sequence length (1 to 6 bytes).
const UTF8_LIMITS: [u32; 6] = [0x7f, 0x7ff, 0xffff, 0x1f_ffff, 0x3ff_ffff, 0x7fff_ffff];

/// Payload mask for a lead byte, indexed by the number of extra bytes.
const UTF8_LEAD_MASK: [u8; 6] = [0xff, 0x1f, 0x0f, 0x07, 0x03, 0x01];

/// Lead byte marker, indexed by the number of extra bytes.
const UTF8_LEAD_MARK: [u8; 6] = [0x00, 0xc0, 0xe0, 0xf0, 0xf8, 0xfc];

/// Floor for freshly allocated re-encoding buffers, in code units.
const MIN_REENCODE_UNITS: usize = 128;

/// Failure to re-encode UTF-8 pattern text into a wider code unit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeError {
    #[error("invalid UTF-8 string")]
    Malformed,

    #[error("character value greater than 0x10ffff")]
    ValueTooLargeForUtf,

    #[error("character value greater than 0xffff in non-UTF mode")]
    ValueTooLargeNonUtf,
}

/// Which characters are printed literally rather than as hex escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Printable {
    /// 0x20 to 0x7e only
    #[default]
    Ascii,
    /// Any non-control Unicode scalar, once a locale has been selected
    Locale,
}

impl Printable {
    pub fn accepts(self, c: u32) -> bool {
        match self {
            Printable::Ascii => (0x20..0x7f).contains(&c),
            Printable::Locale => char::from_u32(c).is_some_and(|ch| !ch.is_control()),
        }
    }
}

/// A UTF validity failure in a subject string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtfError {
    /// Code-unit offset of the start of the bad character
    pub offset: usize,
    /// Width-specific reason code
    pub reason: u32,
}

/// Reason codes reported with a UTF validity failure.
pub mod utf_reason {
    pub const TRUNCATED: u32 = 1;
    pub const BAD_CONTINUATION: u32 = 2;
    pub const OVERLONG: u32 = 3;
    pub const TOO_LARGE: u32 = 4;
    pub const SURROGATE: u32 = 5;
    pub const ISOLATED_CONTINUATION: u32 = 6;
    pub const BAD_LEAD: u32 = 7;
    pub const MISSING_LOW_SURROGATE: u32 = 8;
    pub const ISOLATED_LOW_SURROGATE: u32 = 9;
}

/// Decode one RFC 2279 UTF-8 character.
///
/// On failure the error holds how many bytes were consumed before the
/// malformed byte: 0 for a bad lead byte, `n` for a bad continuation byte at
/// position `n`, and the full sequence length for an overlong encoding.
pub fn decode_utf8_scalar(bytes: &[u8]) -> Result<(u32, usize), usize> {
    let Some(&lead) = bytes.first() else {
        return Err(0);
    };
    let extra = lead.leading_ones() as usize;
    if extra == 0 {
        return Ok((u32::from(lead), 1));
    }
    if extra == 1 || extra > 6 {
        return Err(0);
    }
    let extra = extra - 1;

    let mut value = u32::from(lead & UTF8_LEAD_MASK[extra]);
    for j in 0..extra {
        match bytes.get(j + 1) {
            Some(&b) if b & 0xc0 == 0x80 => value = (value << 6) | u32::from(b & 0x3f),
            _ => return Err(j + 1),
        }
    }

    let shortest = UTF8_LIMITS
        .iter()
        .position(|&limit| value <= limit)
        .unwrap_or(UTF8_LIMITS.len());
    if shortest != extra {
        return Err(extra + 1);
    }
    Ok((value, extra + 1))
}

/// Encode a value as RFC 2279 UTF-8, appending to `out`.
///
/// Returns false, leaving `out` untouched, for values above 0x7fffffff.
pub fn encode_utf8_into(value: u32, out: &mut Vec<u8>) -> bool {
    let Some(extra) = UTF8_LIMITS.iter().position(|&limit| value <= limit) else {
        return false;
    };
    if extra == 0 {
        out.push(value as u8);
        return true;
    }
    let start = out.len();
    out.resize(start + extra + 1, 0);
    let mut v = value;
    for slot in out[start + 1..].iter_mut().rev() {
        *slot = 0x80 | (v & 0x3f) as u8;
        v >>= 6;
    }
    out[start] = UTF8_LEAD_MARK[extra] | v as u8;
    true
}

/// Encode a value as RFC 2279 UTF-8.
pub fn encode_utf8(value: u32) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(6);
    encode_utf8_into(value, &mut out).then_some(out)
}

/// Re-encode UTF-8 text as 16-bit code units.
///
/// Values above 0xffff become surrogate pairs in UTF mode and are an error
/// otherwise. Surrogate values themselves pass through so that invalid
/// UTF-16 can be constructed.
pub fn reencode_to_width16(text: &[u8], utf: bool) -> Result<Vec<u16>, TranscodeError> {
    let mut out = Vec::with_capacity(text.len().max(MIN_REENCODE_UNITS));
    let mut rest = text;
    while !rest.is_empty() {
        let (c, len) = decode_utf8_scalar(rest).map_err(|_| TranscodeError::Malformed)?;
        if c > 0x10ffff {
            return Err(TranscodeError::ValueTooLargeForUtf);
        }
        if c < 0x10000 {
            out.push(c as u16);
        } else {
            if !utf {
                return Err(TranscodeError::ValueTooLargeNonUtf);
            }
            let (high, low) = surrogate_pair(c);
            out.push(high);
            out.push(low);
        }
        rest = &rest[len..];
    }
    Ok(out)
}

/// Re-encode UTF-8 text as 32-bit code units, one per character.
///
/// The 0x10ffff ceiling applies only in UTF mode.
pub fn reencode_to_width32(text: &[u8], utf: bool) -> Result<Vec<u32>, TranscodeError> {
    let mut out = Vec::with_capacity(text.len().max(MIN_REENCODE_UNITS));
    let mut rest = text;
    while !rest.is_empty() {
        let (c, len) = decode_utf8_scalar(rest).map_err(|_| TranscodeError::Malformed)?;
        if utf && c > 0x10ffff {
            return Err(TranscodeError::ValueTooLargeForUtf);
        }
        out.push(c);
        rest = &rest[len..];
    }
    Ok(out)
}

/// Split a supplementary-plane value into a UTF-16 surrogate pair.
pub fn surrogate_pair(c: u32) -> (u16, u16) {
    let v = c - 0x10000;
    (0xd800 | (v >> 10) as u16, 0xdc00 | (v & 0x3ff) as u16)
}

/// Render one character, literally or as a hex escape.
///
/// Returns the number of characters the rendering occupies, whether or not
/// a sink is given.
pub fn render_char(c: u32, utf: bool, printable: Printable, sink: Option<&mut String>) -> usize {
    if printable.accepts(c) {
        if let (Some(out), Some(ch)) = (sink, char::from_u32(c)) {
            out.push(ch);
        }
        return 1;
    }
    let escaped = if c < 0x100 && !utf {
        format!("\\x{:02x}", c)
    } else {
        format!("\\x{{{:02x}}}", c)
    };
    let width = escaped.len();
    if let Some(out) = sink {
        out.push_str(&escaped);
    }
    width
}

/// Render a code-unit string for display.
///
/// In UTF mode multi-unit characters are decoded first; anything that does
/// not decode is shown unit by unit. With no sink the output is only counted.
pub fn render_codeunit_string<U: CodeUnit>(
    units: &[U],
    utf: bool,
    printable: Printable,
    mut sink: Option<&mut String>,
) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < units.len() {
        let (c, len) = U::display_char(&units[i..], utf);
        count += render_char(c, utf, printable, sink.as_deref_mut());
        i += len;
    }
    count
}

/// Render a code-unit string into a new `String`.
pub fn render_to_string<U: CodeUnit>(units: &[U], utf: bool, printable: Printable) -> String {
    let mut out = String::with_capacity(units.len());
    render_codeunit_string(units, utf, printable, Some(&mut out));
    out
}

/// Result of storing one data-line character at a given width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChar {
    Stored,
    /// Stored, but the value did not fit in a code unit and was cut down
    Truncated,
}

/// A fixed-width code unit the engine can be driven with.
pub trait CodeUnit: Copy + Default + Eq + Ord + fmt::Debug + Send + Sync + 'static {
    /// Width in bits
    const BITS: u32;

    /// Truncating conversion from a character value
    fn from_u32(value: u32) -> Self;

    fn to_u32(self) -> u32;

    /// Convert a pattern's UTF-8 text to this width.
    fn from_pattern_text(text: &[u8], utf: bool) -> Result<Vec<Self>, TranscodeError>;

    /// Store one data-line character.
    ///
    /// Fails with the offending value when it cannot be represented at all.
    fn push_data_char(value: u32, utf: bool, out: &mut Vec<Self>) -> Result<DataChar, u32>;

    /// Decode the character at the start of `units` for display.
    ///
    /// Never fails: a unit that does not start a valid character is returned
    /// on its own.
    fn display_char(units: &[Self], utf: bool) -> (u32, usize);

    /// Check a whole string for UTF validity at this width.
    fn check_utf(units: &[Self]) -> Result<(), UtfError>;

    /// True for units that continue a multi-unit UTF character.
    fn is_continuation(self) -> bool;
}

impl CodeUnit for u8 {
    const BITS: u32 = 8;

    fn from_u32(value: u32) -> Self {
        value as u8
    }

    fn to_u32(self) -> u32 {
        u32::from(self)
    }

    fn from_pattern_text(text: &[u8], _utf: bool) -> Result<Vec<Self>, TranscodeError> {
        Ok(text.to_vec())
    }

    fn push_data_char(value: u32, utf: bool, out: &mut Vec<Self>) -> Result<DataChar, u32> {
        if utf {
            if encode_utf8_into(value, out) {
                Ok(DataChar::Stored)
            } else {
                Err(value)
            }
        } else {
            out.push(value as u8);
            Ok(if value > 0xff {
                DataChar::Truncated
            } else {
                DataChar::Stored
            })
        }
    }

    fn display_char(units: &[Self], utf: bool) -> (u32, usize) {
        if utf {
            if let Ok(decoded) = decode_utf8_scalar(units) {
                return decoded;
            }
        }
        (u32::from(units[0]), 1)
    }

    fn check_utf(units: &[Self]) -> Result<(), UtfError> {
        let mut i = 0;
        while i < units.len() {
            let at = i;
            let fail = |reason| UtfError { offset: at, reason };
            let lead = units[i];
            if lead < 0x80 {
                i += 1;
                continue;
            }
            let extra = lead.leading_ones() as usize;
            if extra == 1 {
                return Err(fail(utf_reason::ISOLATED_CONTINUATION));
            }
            if extra > 6 {
                return Err(fail(utf_reason::BAD_LEAD));
            }
            if i + extra > units.len() {
                return Err(fail(utf_reason::TRUNCATED));
            }
            match decode_utf8_scalar(&units[i..]) {
                Ok((c, len)) => {
                    if len > 4 || c > 0x10ffff {
                        return Err(fail(utf_reason::TOO_LARGE));
                    }
                    if (0xd800..0xe000).contains(&c) {
                        return Err(fail(utf_reason::SURROGATE));
                    }
                    i += len;
                }
                Err(consumed) if consumed == extra => return Err(fail(utf_reason::OVERLONG)),
                Err(_) => return Err(fail(utf_reason::BAD_CONTINUATION)),
            }
        }
        Ok(())
    }

    fn is_continuation(self) -> bool {
        self & 0xc0 == 0x80
    }
}

impl CodeUnit for u16 {
    const BITS: u32 = 16;

    fn from_u32(value: u32) -> Self {
        value as u16
    }

    fn to_u32(self) -> u32 {
        u32::from(self)
    }

    fn from_pattern_text(text: &[u8], utf: bool) -> Result<Vec<Self>, TranscodeError> {
        reencode_to_width16(text, utf)
    }

    fn push_data_char(value: u32, utf: bool, out: &mut Vec<Self>) -> Result<DataChar, u32> {
        if utf {
            if value > 0x10ffff {
                return Err(value);
            }
            if value >= 0x10000 {
                let (high, low) = surrogate_pair(value);
                out.push(high);
                out.push(low);
            } else {
                out.push(value as u16);
            }
            Ok(DataChar::Stored)
        } else {
            out.push(value as u16);
            Ok(if value > 0xffff {
                DataChar::Truncated
            } else {
                DataChar::Stored
            })
        }
    }

    fn display_char(units: &[Self], utf: bool) -> (u32, usize) {
        let c = u32::from(units[0]);
        if utf && (0xd800..0xdc00).contains(&c) {
            if let Some(&low) = units.get(1) {
                let d = u32::from(low);
                if (0xdc00..0xe000).contains(&d) {
                    return ((((c & 0x3ff) << 10) | (d & 0x3ff)) + 0x10000, 2);
                }
            }
        }
        (c, 1)
    }

    fn check_utf(units: &[Self]) -> Result<(), UtfError> {
        let mut i = 0;
        while i < units.len() {
            let c = units[i];
            match c {
                0xd800..=0xdbff => match units.get(i + 1) {
                    Some(low) if (0xdc00..=0xdfff).contains(low) => i += 2,
                    Some(_) => {
                        return Err(UtfError {
                            offset: i,
                            reason: utf_reason::MISSING_LOW_SURROGATE,
                        })
                    }
                    None => {
                        return Err(UtfError {
                            offset: i,
                            reason: utf_reason::TRUNCATED,
                        })
                    }
                },
                0xdc00..=0xdfff => {
                    return Err(UtfError {
                        offset: i,
                        reason: utf_reason::ISOLATED_LOW_SURROGATE,
                    })
                }
                _ => i += 1,
            }
        }
        Ok(())
    }

    fn is_continuation(self) -> bool {
        self & 0xfc00 == 0xdc00
    }
}

impl CodeUnit for u32 {
    const BITS: u32 = 32;

    fn from_u32(value: u32) -> Self {
        value
    }

    fn to_u32(self) -> u32 {
        self
    }

    fn from_pattern_text(text: &[u8], utf: bool) -> Result<Vec<Self>, TranscodeError> {
        reencode_to_width32(text, utf)
    }

    fn push_data_char(value: u32, _utf: bool, out: &mut Vec<Self>) -> Result<DataChar, u32> {
        out.push(value);
        Ok(DataChar::Stored)
    }

    fn display_char(units: &[Self], _utf: bool) -> (u32, usize) {
        (units[0], 1)
    }

    fn check_utf(units: &[Self]) -> Result<(), UtfError> {
        for (offset, &c) in units.iter().enumerate() {
            if c > 0x10ffff {
                return Err(UtfError {
                    offset,
                    reason: utf_reason::TOO_LARGE,
                });
            }
            if (0xd800..0xe000).contains(&c) {
                return Err(UtfError {
                    offset,
                    reason: utf_reason::SURROGATE,
                });
            }
        }
        Ok(())
    }

    fn is_continuation(self) -> bool {
        false
    }
}

/// Format a value the way single code units are shown in pattern information.
pub fn describe_code_unit(c: u32, printable: Printable) -> String {
    let mut out = String::new();
    if printable.accepts(c) {
        let _ = write!(out, "'{}'", char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER));
    } else {
        render_char(c, false, printable, Some(&mut out));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_decodes_as_one_byte() {
        assert_eq!(decode_utf8_scalar(b"A"), Ok((0x41, 1)));
    }

    #[test]
    fn test_utf8_round_trip_sampled() {
        for v in (0..=0x10ffffu32).step_by(97).chain([0x7f, 0x80, 0x7ff, 0x800, 0xffff, 0x10000]) {
            let bytes = encode_utf8(v).unwrap();
            assert_eq!(decode_utf8_scalar(&bytes), Ok((v, bytes.len())), "value {v:#x}");
        }
    }

    #[test]
    fn test_six_byte_values() {
        let bytes = encode_utf8(0x7fff_ffff).unwrap();
        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes[0], 0xfd);
        assert_eq!(decode_utf8_scalar(&bytes), Ok((0x7fff_ffff, 6)));
        assert!(encode_utf8(0x8000_0000).is_none());
    }

    #[test]
    fn test_malformed_offsets() {
        assert_eq!(decode_utf8_scalar(&[0x80]), Err(0));
        assert_eq!(decode_utf8_scalar(&[0xff]), Err(0));
        assert_eq!(decode_utf8_scalar(&[0xe2, 0x82, 0x41]), Err(2));
        assert_eq!(decode_utf8_scalar(&[0xe2, 0x41]), Err(1));
        // Overlong encoding of '/'
        assert_eq!(decode_utf8_scalar(&[0xc0, 0xaf]), Err(2));
    }

    #[test]
    fn test_width16_surrogates() {
        let text = "a\u{1F600}b".as_bytes();
        let units = reencode_to_width16(text, true).unwrap();
        assert_eq!(units, vec![0x61, 0xd83d, 0xde00, 0x62]);
        assert_eq!(u16::display_char(&units[1..], true), (0x1F600, 2));
        assert_eq!(
            reencode_to_width16(text, false),
            Err(TranscodeError::ValueTooLargeNonUtf)
        );
    }

    #[test]
    fn test_width16_round_trip_recombines() {
        let s = "x\u{10000}\u{10FFFF}\u{E9}";
        let units = reencode_to_width16(s.as_bytes(), true).unwrap();
        let mut decoded = Vec::new();
        let mut i = 0;
        while i < units.len() {
            let (c, len) = u16::display_char(&units[i..], true);
            decoded.push(c);
            i += len;
        }
        let expected: Vec<u32> = s.chars().map(u32::from).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_surrogate_values_pass_through() {
        let bytes = encode_utf8(0xd800).unwrap();
        assert_eq!(reencode_to_width16(&bytes, true), Ok(vec![0xd800]));
        assert_eq!(reencode_to_width32(&bytes, true), Ok(vec![0xd800]));
    }

    #[test]
    fn test_width32_ceiling_only_in_utf() {
        let bytes = encode_utf8(0x110000).unwrap();
        assert_eq!(
            reencode_to_width32(&bytes, true),
            Err(TranscodeError::ValueTooLargeForUtf)
        );
        assert_eq!(reencode_to_width32(&bytes, false), Ok(vec![0x110000]));
        assert_eq!(
            reencode_to_width16(&bytes, false),
            Err(TranscodeError::ValueTooLargeForUtf)
        );
    }

    #[test]
    fn test_render_escapes() {
        let units: Vec<u8> = vec![b'a', 0x01, b' ', 0xff];
        assert_eq!(render_to_string(&units, false, Printable::Ascii), "a\\x01 \\xff");
        let wide: Vec<u32> = vec![0x263a, 0x0a];
        assert_eq!(render_to_string(&wide, true, Printable::Ascii), "\\x{263a}\\x{0a}");
        assert_eq!(render_to_string(&wide, true, Printable::Locale), "\u{263a}\\x{0a}");
    }

    #[test]
    fn test_render_count_matches_sink() {
        let units: Vec<u16> = "hello, world!".encode_utf16().collect();
        let counted = render_codeunit_string(&units, false, Printable::Ascii, None);
        let mut out = String::new();
        let written = render_codeunit_string(&units, false, Printable::Ascii, Some(&mut out));
        assert_eq!(counted, written);
        assert_eq!(counted, units.len());

        let odd: Vec<u8> = vec![0x00, 0xc3, 0xa9, 0xe2];
        let counted = render_codeunit_string(&odd, true, Printable::Ascii, None);
        let mut out = String::new();
        assert_eq!(counted, render_codeunit_string(&odd, true, Printable::Ascii, Some(&mut out)));
        assert_eq!(out, "\\x{00}\\x{e9}\\x{e2}");
        assert_eq!(counted, out.len());
    }

    #[test]
    fn test_utf8_check_reasons() {
        assert!(u8::check_utf("caf\u{e9}".as_bytes()).is_ok());
        assert_eq!(
            u8::check_utf(&[b'a', 0x80]),
            Err(UtfError { offset: 1, reason: utf_reason::ISOLATED_CONTINUATION })
        );
        assert_eq!(
            u8::check_utf(&[b'a', b'b', 0xe2, 0x82]),
            Err(UtfError { offset: 2, reason: utf_reason::TRUNCATED })
        );
        assert_eq!(
            u8::check_utf(&[0xed, 0xa0, 0x80]),
            Err(UtfError { offset: 0, reason: utf_reason::SURROGATE })
        );
    }

    #[test]
    fn test_utf16_check_reasons() {
        assert!(u16::check_utf(&[0x61, 0xd83d, 0xde00]).is_ok());
        assert_eq!(
            u16::check_utf(&[0x61, 0xde00]),
            Err(UtfError { offset: 1, reason: utf_reason::ISOLATED_LOW_SURROGATE })
        );
        assert_eq!(
            u16::check_utf(&[0xd83d, 0x61]),
            Err(UtfError { offset: 0, reason: utf_reason::MISSING_LOW_SURROGATE })
        );
    }

    #[test]
    fn test_data_char_truncation() {
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(u8::push_data_char(0x141, false, &mut out), Ok(DataChar::Truncated));
        assert_eq!(out, vec![0x41]);
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(u8::push_data_char(0x100, true, &mut out), Ok(DataChar::Stored));
        assert_eq!(out, vec![0xc4, 0x80]);
        let mut out: Vec<u16> = Vec::new();
        assert_eq!(u16::push_data_char(0x110000, true, &mut out), Err(0x110000));
    }
}

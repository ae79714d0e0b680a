//! Match result buffer and captured-substring extraction

use super::codec::CodeUnit;
use super::engine::{codes, CompiledPattern, COPY_BUFFER_BYTES};

/// Offset value of a capture that did not participate.
pub const UNSET: usize = usize::MAX;

/// The ovector plus the side results of the last match.
///
/// The allocation only ever grows; a data line asking for fewer pairs just
/// uses a prefix of it.
#[derive(Debug, Clone)]
pub struct MatchData {
    ovector: Vec<usize>,
    oveccount: usize,
    pub rc: i32,
    pub mark: Option<String>,
    /// Start of the inspected text of a partial match
    pub leftchar: usize,
    /// Start of the match, or the offset of a bad UTF unit
    pub startchar: usize,
    pub utf_reason: u32,
}

impl MatchData {
    pub fn new(oveccount: usize) -> Self {
        Self {
            ovector: vec![UNSET; 2 * oveccount.max(1)],
            oveccount,
            rc: 0,
            mark: None,
            leftchar: 0,
            startchar: 0,
            utf_reason: 0,
        }
    }

    /// Use `oveccount` pairs, growing the allocation when needed. Returns
    /// true when it grew.
    pub fn ensure(&mut self, oveccount: usize) -> bool {
        self.oveccount = oveccount;
        if 2 * oveccount > self.ovector.len() {
            self.ovector.resize(2 * oveccount, UNSET);
            return true;
        }
        false
    }

    /// Allocated pairs.
    pub fn capacity(&self) -> usize {
        self.ovector.len() / 2
    }

    /// Pairs in use.
    pub fn oveccount(&self) -> usize {
        self.oveccount
    }

    pub fn pair(&self, i: usize) -> (usize, usize) {
        (self.ovector[2 * i], self.ovector[2 * i + 1])
    }

    /// Overwrite pair `i`, as the global loop does when it steps over an
    /// empty match.
    pub fn set_pair(&mut self, i: usize, start: usize, end: usize) {
        self.ovector[2 * i] = start;
        self.ovector[2 * i + 1] = end;
    }

    pub fn is_set(&self, i: usize) -> bool {
        i < self.oveccount && self.ovector[2 * i] != UNSET
    }

    pub(crate) fn reset(&mut self) {
        self.ovector.fill(UNSET);
        self.rc = 0;
        self.mark = None;
        self.leftchar = 0;
        self.startchar = 0;
        self.utf_reason = 0;
    }

    /// Store capture pairs; returns their count, or 0 when they do not all fit.
    pub(crate) fn store(&mut self, pairs: &[Option<(usize, usize)>]) -> i32 {
        for (i, pair) in pairs.iter().take(self.oveccount).enumerate() {
            let (s, e) = pair.unwrap_or((UNSET, UNSET));
            self.ovector[2 * i] = s;
            self.ovector[2 * i + 1] = e;
        }
        if pairs.len() > self.oveccount {
            0
        } else {
            pairs.len() as i32
        }
    }

    /// Number of pairs that hold results of the last match.
    fn filled(&self) -> usize {
        if self.rc == 0 {
            self.oveccount
        } else {
            self.rc.max(0) as usize
        }
    }
}

/// Substring `n` of the last match.
pub fn get_by_number<U: CodeUnit>(
    code: &CompiledPattern,
    md: &MatchData,
    subject: &[U],
    n: u32,
) -> Result<Vec<U>, i32> {
    if n > code.info().capture_count {
        return Err(codes::NOSUBSTRING);
    }
    let n = n as usize;
    if n >= md.filled() || !md.is_set(n) {
        return Err(codes::UNSET);
    }
    let (s, e) = md.pair(n);
    let (s, e) = (s.min(e), s.max(e));
    subject.get(s..e).map(<[U]>::to_vec).ok_or(codes::INTERNAL)
}

/// Substring `n` copied into the fixed-size buffer.
pub fn copy_by_number<U: CodeUnit>(
    code: &CompiledPattern,
    md: &MatchData,
    subject: &[U],
    n: u32,
) -> Result<Vec<U>, i32> {
    let text = get_by_number(code, md, subject, n)?;
    if text.len() >= COPY_BUFFER_BYTES / (U::BITS as usize / 8) {
        return Err(codes::NOMEMORY);
    }
    Ok(text)
}

/// Group number for `name`: the first group of that name that is set,
/// otherwise the first of that name.
pub fn number_for_name(code: &CompiledPattern, md: &MatchData, name: &str) -> Result<u32, i32> {
    let numbers = code.numbers_for_name(name);
    numbers
        .iter()
        .copied()
        .find(|&n| (n as usize) < md.filled() && md.is_set(n as usize))
        .or_else(|| numbers.first().copied())
        .ok_or(codes::NOSUBSTRING)
}

pub fn get_by_name<U: CodeUnit>(
    code: &CompiledPattern,
    md: &MatchData,
    subject: &[U],
    name: &str,
) -> Result<Vec<U>, i32> {
    let n = number_for_name(code, md, name)?;
    get_by_number(code, md, subject, n)
}

pub fn copy_by_name<U: CodeUnit>(
    code: &CompiledPattern,
    md: &MatchData,
    subject: &[U],
    name: &str,
) -> Result<Vec<U>, i32> {
    let n = number_for_name(code, md, name)?;
    copy_by_number(code, md, subject, n)
}

/// Every captured substring; unset ones come back empty.
pub fn list<U: CodeUnit>(md: &MatchData, subject: &[U]) -> Result<Vec<Vec<U>>, i32> {
    (0..md.filled())
        .map(|i| {
            if !md.is_set(i) {
                return Ok(Vec::new());
            }
            let (s, e) = md.pair(i);
            subject
                .get(s.min(e)..s.max(e))
                .map(<[U]>::to_vec)
                .ok_or(codes::INTERNAL)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::controls::{CompileContext, MatchContext, Options};
    use crate::core::engine::{compile, match_pattern};

    fn matched(pattern: &str, subject: &str) -> (CompiledPattern, MatchData) {
        let code = compile::<u8>(pattern.as_bytes(), Options::empty(), &CompileContext::default()).unwrap();
        let mut md = MatchData::new(15);
        match_pattern(&code, subject.as_bytes(), 0, Options::empty(), &mut md, &MatchContext::default());
        (code, md)
    }

    #[test]
    fn test_capacity_only_grows() {
        let mut md = MatchData::new(15);
        assert!(!md.ensure(3));
        assert_eq!(md.capacity(), 15);
        assert_eq!(md.oveccount(), 3);
        assert!(md.ensure(40));
        assert!(!md.ensure(20));
        assert_eq!(md.capacity(), 40);
    }

    #[test]
    fn test_store_reports_overflow() {
        let mut md = MatchData::new(1);
        assert_eq!(md.store(&[Some((0, 1)), Some((0, 0))]), 0);
        assert_eq!(md.pair(0), (0, 1));
    }

    #[test]
    fn test_get_and_copy() {
        let (code, md) = matched("(a)(x)?(b)", "zab");
        let subject = b"zab";
        assert_eq!(get_by_number(&code, &md, subject, 1), Ok(b"a".to_vec()));
        assert_eq!(get_by_number(&code, &md, subject, 2), Err(codes::UNSET));
        assert_eq!(copy_by_number(&code, &md, subject, 3), Ok(b"b".to_vec()));
        assert_eq!(get_by_number(&code, &md, subject, 4), Err(codes::NOSUBSTRING));
    }

    #[test]
    fn test_names() {
        let (code, md) = matched("(?P<first>a)(?P<second>b)?", "a");
        let subject = b"a";
        assert_eq!(get_by_name(&code, &md, subject, "first"), Ok(b"a".to_vec()));
        assert_eq!(copy_by_name(&code, &md, subject, "second"), Err(codes::UNSET));
        assert_eq!(number_for_name(&code, &md, "third"), Err(codes::NOSUBSTRING));
    }

    #[test]
    fn test_list_fills_unset_with_empty() {
        let (_, md) = matched("(a)(x)?(b)", "ab");
        let all = list(&md, b"ab").unwrap();
        assert_eq!(all, vec![b"ab".to_vec(), b"a".to_vec(), Vec::new(), b"b".to_vec()]);
    }

    #[test]
    fn test_copy_buffer_limit() {
        let long = "a".repeat(2000);
        let (code, md) = matched("a+", &long);
        assert_eq!(copy_by_number(&code, &md, long.as_bytes(), 0), Err(codes::NOMEMORY));
        assert_eq!(get_by_number(&code, &md, long.as_bytes(), 0).map(|v| v.len()), Ok(2000));
    }
}

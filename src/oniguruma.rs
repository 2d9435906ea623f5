// oniguruma.rs - Public types, option flags, error codes and the match region.

// === Base types ===
pub type OnigCodePoint = u32;
pub type OnigUChar = u8;
pub type OnigCtype = u32;
pub type OnigLen = u32;
pub type OnigCaseFoldType = u32;
pub type OnigOptionType = u32;

pub const ONIG_INFINITE_DISTANCE: OnigLen = OnigLen::MAX;

// === Case fold flags ===
pub const ONIGENC_CASE_FOLD_TURKISH_AZERI: OnigCaseFoldType = 1 << 20;
pub const ONIGENC_CASE_FOLD_ASCII_ONLY: OnigCaseFoldType = 1 << 22;
pub const INTERNAL_ONIGENC_CASE_FOLD_MULTI_CHAR: OnigCaseFoldType = 1 << 30;
pub const ONIGENC_CASE_FOLD_MIN: OnigCaseFoldType = INTERNAL_ONIGENC_CASE_FOLD_MULTI_CHAR;
pub const ONIGENC_CASE_FOLD_DEFAULT: OnigCaseFoldType = ONIGENC_CASE_FOLD_MIN;

pub const ONIGENC_CODE_TO_MBC_MAXLEN: usize = 7;
pub const ONIGENC_MBC_CASE_FOLD_MAXLEN: usize = 18;

// === Character types ===
pub const ONIGENC_CTYPE_NEWLINE: u32 = 0;
pub const ONIGENC_CTYPE_ALPHA: u32 = 1;
pub const ONIGENC_CTYPE_BLANK: u32 = 2;
pub const ONIGENC_CTYPE_CNTRL: u32 = 3;
pub const ONIGENC_CTYPE_DIGIT: u32 = 4;
pub const ONIGENC_CTYPE_GRAPH: u32 = 5;
pub const ONIGENC_CTYPE_LOWER: u32 = 6;
pub const ONIGENC_CTYPE_PRINT: u32 = 7;
pub const ONIGENC_CTYPE_PUNCT: u32 = 8;
pub const ONIGENC_CTYPE_SPACE: u32 = 9;
pub const ONIGENC_CTYPE_UPPER: u32 = 10;
pub const ONIGENC_CTYPE_XDIGIT: u32 = 11;
pub const ONIGENC_CTYPE_WORD: u32 = 12;
pub const ONIGENC_CTYPE_ALNUM: u32 = 13;
pub const ONIGENC_CTYPE_ASCII: u32 = 14;
pub const ONIGENC_MAX_STD_CTYPE: u32 = ONIGENC_CTYPE_ASCII;

pub const ONIG_NREGION: usize = 4;
pub const ONIG_MAX_CAPTURE_HISTORY_GROUP: usize = 31;
pub const ONIG_CHAR_TABLE_SIZE: usize = 256;

// === Option flags ===
pub const ONIG_OPTION_NONE: OnigOptionType = 0;
pub const ONIG_OPTION_DEFAULT: OnigOptionType = ONIG_OPTION_NONE;
// program-level (recorded in RegexType::options)
pub const ONIG_OPTION_IGNORECASE: OnigOptionType = 1;
pub const ONIG_OPTION_EXTEND: OnigOptionType = ONIG_OPTION_IGNORECASE << 1;
pub const ONIG_OPTION_MULTILINE: OnigOptionType = ONIG_OPTION_EXTEND << 1;
pub const ONIG_OPTION_NOMATCHDATA: OnigOptionType = ONIG_OPTION_MULTILINE << 1;
pub const ONIG_OPTION_SINGLELINE: OnigOptionType = ONIG_OPTION_NOMATCHDATA << 1;
pub const ONIG_OPTION_FIND_LONGEST: OnigOptionType = ONIG_OPTION_SINGLELINE << 1;
pub const ONIG_OPTION_FIND_NOT_EMPTY: OnigOptionType = ONIG_OPTION_FIND_LONGEST << 1;
pub const ONIG_OPTION_NEGATE_SINGLELINE: OnigOptionType = ONIG_OPTION_FIND_NOT_EMPTY << 1;
pub const ONIG_OPTION_DONT_CAPTURE_GROUP: OnigOptionType = ONIG_OPTION_NEGATE_SINGLELINE << 1;
pub const ONIG_OPTION_CAPTURE_GROUP: OnigOptionType = ONIG_OPTION_DONT_CAPTURE_GROUP << 1;
// search time
pub const ONIG_OPTION_NOTBOL: OnigOptionType = ONIG_OPTION_CAPTURE_GROUP << 1;
pub const ONIG_OPTION_NOTEOL: OnigOptionType = ONIG_OPTION_NOTBOL << 1;
pub const ONIG_OPTION_NOT_BEGIN_STRING: OnigOptionType = ONIG_OPTION_NOTEOL << 1;
pub const ONIG_OPTION_NOT_END_STRING: OnigOptionType = ONIG_OPTION_NOT_BEGIN_STRING << 1;
pub const ONIG_OPTION_ASCII_RANGE: OnigOptionType = ONIG_OPTION_NOT_END_STRING << 1;
pub const ONIG_OPTION_POSIX_BRACKET_ALL_RANGE: OnigOptionType = ONIG_OPTION_ASCII_RANGE << 1;
pub const ONIG_OPTION_WORD_BOUND_ALL_RANGE: OnigOptionType =
    ONIG_OPTION_POSIX_BRACKET_ALL_RANGE << 1;
pub const ONIG_OPTION_NEWLINE_CRLF: OnigOptionType = ONIG_OPTION_WORD_BOUND_ALL_RANGE << 1;
pub const ONIG_OPTION_NOT_BEGIN_POSITION: OnigOptionType = ONIG_OPTION_NEWLINE_CRLF << 1;
pub const ONIG_OPTION_CHECK_VALIDITY_OF_STRING: OnigOptionType =
    ONIG_OPTION_NOT_BEGIN_POSITION << 1;

pub const ONIG_OPTION_MAXBIT: OnigOptionType = ONIG_OPTION_CHECK_VALIDITY_OF_STRING;

#[inline]
pub fn onig_option_on(options: &mut OnigOptionType, regopt: OnigOptionType) {
    *options |= regopt;
}

#[inline]
pub fn onig_option_off(options: &mut OnigOptionType, regopt: OnigOptionType) {
    *options &= !regopt;
}

#[inline]
pub fn onig_is_option_on(options: OnigOptionType, option: OnigOptionType) -> bool {
    (options & option) != 0
}

// === Result and error codes ===
pub const ONIG_NORMAL: i32 = 0;
pub const ONIG_MISMATCH: i32 = -1;
pub const ONIG_NO_SUPPORT_CONFIG: i32 = -2;
pub const ONIG_ABORT: i32 = -3;

// engine
pub const ONIGERR_MEMORY: i32 = -5;
pub const ONIGERR_TYPE_BUG: i32 = -6;
pub const ONIGERR_STACK_BUG: i32 = -12;
pub const ONIGERR_UNDEFINED_BYTECODE: i32 = -13;
pub const ONIGERR_UNEXPECTED_BYTECODE: i32 = -14;
pub const ONIGERR_MATCH_STACK_LIMIT_OVER: i32 = -15;
pub const ONIGERR_RETRY_LIMIT_IN_MATCH_OVER: i32 = -17;
pub const ONIGERR_RETRY_LIMIT_IN_SEARCH_OVER: i32 = -18;
pub const ONIGERR_TIME_LIMIT_OVER: i32 = -20;

// general
pub const ONIGERR_INVALID_ARGUMENT: i32 = -30;

// encoding
pub const ONIGERR_INVALID_CODE_POINT_VALUE: i32 = -400;
pub const ONIGERR_INVALID_WIDE_CHAR_VALUE: i32 = -400;
pub const ONIGERR_TOO_BIG_WIDE_CHAR_VALUE: i32 = -401;

// === Capture history tree ===

/// One recorded occurrence of a capture group.
///
/// The root node is always group 0 and spans the whole match; `childs`
/// holds nested occurrences in the order they closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnigCaptureTreeNode {
    pub group: i32,
    pub beg: i32,
    pub end: i32,
    pub childs: Vec<Box<OnigCaptureTreeNode>>,
}

impl OnigCaptureTreeNode {
    pub fn new(group: i32) -> Self {
        OnigCaptureTreeNode {
            group,
            beg: ONIG_REGION_NOTPOS,
            end: ONIG_REGION_NOTPOS,
            childs: Vec::new(),
        }
    }
}

// === OnigRegion (match result) ===

/// Capture offsets of one match.
///
/// `beg[i]`/`end[i]` are byte offsets into the subject, or
/// [`ONIG_REGION_NOTPOS`] when group `i` did not participate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnigRegion {
    pub allocated: i32,
    pub num_regs: i32,
    pub beg: Vec<i32>,
    pub end: Vec<i32>,
    pub history_root: Option<Box<OnigCaptureTreeNode>>,
}

impl OnigRegion {
    pub fn new() -> Self {
        OnigRegion {
            allocated: 0,
            num_regs: 0,
            beg: Vec::new(),
            end: Vec::new(),
            history_root: None,
        }
    }

    /// Unsets every slot and drops the capture history.
    pub fn clear(&mut self) {
        for i in 0..self.num_regs as usize {
            self.beg[i] = ONIG_REGION_NOTPOS;
            self.end[i] = ONIG_REGION_NOTPOS;
        }
        self.history_root = None;
    }

    /// Sets the number of live slots. Storage never shrinks below
    /// [`ONIG_NREGION`] once allocated.
    pub fn resize(&mut self, n: i32) {
        let n = n.max(0) as usize;
        if (self.allocated as usize) < n || self.allocated == 0 {
            let cap = n.max(ONIG_NREGION);
            self.beg.resize(cap, ONIG_REGION_NOTPOS);
            self.end.resize(cap, ONIG_REGION_NOTPOS);
            self.allocated = cap as i32;
        }
        self.num_regs = n as i32;
    }

    pub fn resize_clear(&mut self, n: i32) {
        self.resize(n);
        self.clear();
    }

    /// Stores one capture, growing the region when `at` is past the end.
    pub fn set(&mut self, at: i32, beg: i32, end: i32) -> Result<(), crate::error::RegexError> {
        if at < 0 {
            return Err(crate::error::RegexError::InvalidArgument);
        }
        if at >= self.allocated {
            self.beg.resize(at as usize + 1, ONIG_REGION_NOTPOS);
            self.end.resize(at as usize + 1, ONIG_REGION_NOTPOS);
            self.allocated = at + 1;
        }
        if at >= self.num_regs {
            self.num_regs = at + 1;
        }
        self.beg[at as usize] = beg;
        self.end[at as usize] = end;
        Ok(())
    }

    /// Deep copy of `from`, capture history included.
    pub fn copy_from(&mut self, from: &OnigRegion) {
        if std::ptr::eq(self, from) {
            return;
        }
        self.resize(from.num_regs);
        let n = from.num_regs as usize;
        self.beg[..n].copy_from_slice(&from.beg[..n]);
        self.end[..n].copy_from_slice(&from.end[..n]);
        self.history_root = from.history_root.clone();
    }

    /// Capture `i` as a byte range, if it participated.
    pub fn pos(&self, i: usize) -> Option<(usize, usize)> {
        if i >= self.num_regs as usize {
            return None;
        }
        let (b, e) = (self.beg[i], self.end[i]);
        if b == ONIG_REGION_NOTPOS {
            None
        } else {
            Some((b as usize, e as usize))
        }
    }
}

impl Default for OnigRegion {
    fn default() -> Self {
        Self::new()
    }
}

// === Capture traverse ===
pub const ONIG_TRAVERSE_CALLBACK_AT_FIRST: i32 = 1;
pub const ONIG_TRAVERSE_CALLBACK_AT_LAST: i32 = 2;
pub const ONIG_TRAVERSE_CALLBACK_AT_BOTH: i32 =
    ONIG_TRAVERSE_CALLBACK_AT_FIRST | ONIG_TRAVERSE_CALLBACK_AT_LAST;

pub const ONIG_REGION_NOTPOS: i32 = -1;

// === Repeat range ===
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OnigRepeatRange {
    pub lower: i32,
    /// `-1` for unbounded.
    pub upper: i32,
}

pub const REPEAT_INFINITE: i32 = -1;

// === Code range ===
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OnigCodeRange {
    pub from: OnigCodePoint,
    pub to: OnigCodePoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_resize_keeps_minimum_allocation() {
        let mut r = OnigRegion::new();
        r.resize(2);
        assert_eq!(r.num_regs, 2);
        assert_eq!(r.allocated as usize, ONIG_NREGION);
        r.resize(7);
        assert_eq!(r.allocated, 7);
        r.resize(1);
        assert_eq!(r.num_regs, 1);
        assert_eq!(r.allocated, 7);
    }

    #[test]
    fn region_set_grows() {
        let mut r = OnigRegion::new();
        r.resize_clear(1);
        r.set(5, 2, 4).unwrap();
        assert_eq!(r.num_regs, 6);
        assert_eq!(r.pos(5), Some((2, 4)));
        assert_eq!(r.pos(3), None);
        assert!(r.set(-1, 0, 0).is_err());
    }

    #[test]
    fn region_copy_is_deep() {
        let mut a = OnigRegion::new();
        a.resize_clear(2);
        a.set(0, 1, 3).unwrap();
        let mut root = OnigCaptureTreeNode::new(0);
        root.beg = 1;
        root.end = 3;
        a.history_root = Some(Box::new(root));

        let mut b = OnigRegion::new();
        b.copy_from(&a);
        assert_eq!(a, b);
        a.clear();
        assert_eq!(b.pos(0), Some((1, 3)));
        assert!(b.history_root.is_some());
        assert!(a.history_root.is_none());
    }

    #[test]
    fn option_helpers() {
        let mut o = ONIG_OPTION_NONE;
        onig_option_on(&mut o, ONIG_OPTION_NOTBOL | ONIG_OPTION_FIND_LONGEST);
        assert!(onig_is_option_on(o, ONIG_OPTION_NOTBOL));
        onig_option_off(&mut o, ONIG_OPTION_NOTBOL);
        assert!(!onig_is_option_on(o, ONIG_OPTION_NOTBOL));
        assert!(onig_is_option_on(o, ONIG_OPTION_FIND_LONGEST));
    }
}

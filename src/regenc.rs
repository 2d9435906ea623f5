// regenc.rs - Encoding trait and shared encoding utility functions.
//
// Positions handed to the encoding are byte offsets into one subject slice.
// Every slice passed as `p` already ends at the subject end, so a length
// probe never has to look past it.

use bitflags::bitflags;

use crate::oniguruma::*;

pub type OnigEncoding = &'static dyn Encoding;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EncodingFlags: u32 {
        const ASCII_COMPATIBLE = 1 << 0;
        const UNICODE = 1 << 1;
        /// Every character is `min_enc_len` bytes.
        const FIXED_WIDTH = 1 << 2;
    }
}

pub const ASCII_LIMIT: OnigCodePoint = 127;
pub const NEWLINE_CODE: OnigCodePoint = 0x0a;

/// Result of a precise character-length probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharLen {
    /// A complete character of this many bytes.
    Found(usize),
    /// The sequence is a valid prefix that needs this many more bytes.
    NeedMore(usize),
    /// The lead byte or a continuation byte is malformed.
    Invalid,
}

pub trait Encoding: Send + Sync {
    /// Encoding name (e.g. "US-ASCII", "UTF-8").
    fn name(&self) -> &str;

    fn max_enc_len(&self) -> usize;

    fn min_enc_len(&self) -> usize;

    /// Exact length of the character starting at `p[0]`.
    fn precise_mbc_enc_len(&self, p: &[u8]) -> CharLen;

    /// Length used while matching: never zero and never past `p.len()`.
    /// Malformed lead bytes count as one byte; truncated sequences run to
    /// the end of the subject.
    fn mbc_enc_len(&self, p: &[u8]) -> usize {
        match self.precise_mbc_enc_len(p) {
            CharLen::Found(n) => n.min(p.len()).max(1),
            CharLen::NeedMore(_) => p.len().max(1),
            CharLen::Invalid => 1,
        }
    }

    /// Is the character at `p[0]` a newline?
    fn is_mbc_newline(&self, p: &[u8]) -> bool;

    /// Decode the character at `p[0]`; truncated input decodes what is there.
    fn mbc_to_code(&self, p: &[u8]) -> OnigCodePoint;

    fn code_to_mbclen(&self, code: OnigCodePoint) -> Option<usize>;

    /// Encode `code` into `buf`, returning the byte count.
    fn code_to_mbc(&self, code: OnigCodePoint, buf: &mut [u8]) -> usize;

    /// Fold the character at `source[*pp]` into `fold_buf`, advance `*pp`
    /// past it, and return the number of folded bytes written.
    fn mbc_case_fold(
        &self,
        flag: OnigCaseFoldType,
        pp: &mut usize,
        end: usize,
        source: &[u8],
        fold_buf: &mut [u8],
    ) -> usize;

    fn is_code_ctype(&self, code: OnigCodePoint, ctype: u32) -> bool;

    /// Start of the character containing byte `s`, never before `start`.
    fn left_adjust_char_head(&self, start: usize, s: usize, data: &[u8]) -> usize;

    fn flags(&self) -> EncodingFlags;

    /// Whole-string validity check.
    fn is_valid_mbc_string(&self, s: &[u8]) -> bool {
        first_invalid_position(self, s).is_none()
    }
}

/// Offset of the first byte that does not start a complete character.
pub fn first_invalid_position<E: Encoding + ?Sized>(enc: &E, s: &[u8]) -> Option<usize> {
    let mut p = 0;
    while p < s.len() {
        match enc.precise_mbc_enc_len(&s[p..]) {
            CharLen::Found(n) => p += n,
            CharLen::NeedMore(_) | CharLen::Invalid => return Some(p),
        }
    }
    None
}

// === Encoding query helpers ===

#[inline]
pub fn onigenc_is_unicode_encoding(enc: OnigEncoding) -> bool {
    enc.flags().contains(EncodingFlags::UNICODE)
}

#[inline]
pub fn onigenc_is_singlebyte(enc: OnigEncoding) -> bool {
    enc.max_enc_len() == 1
}

/// Fixed-width encodings can step by byte count instead of decoding.
#[inline]
pub fn onigenc_is_code_word(enc: OnigEncoding, code: OnigCodePoint) -> bool {
    enc.is_code_ctype(code, ONIGENC_CTYPE_WORD)
}

#[inline]
pub fn enclen(enc: OnigEncoding, data: &[u8], s: usize) -> usize {
    enc.mbc_enc_len(&data[s..])
}

// === Case fold helpers ===

#[inline]
pub fn case_fold_is_ascii_only(flag: OnigCaseFoldType) -> bool {
    (flag & ONIGENC_CASE_FOLD_ASCII_ONLY) != 0
}

// === Ctype bits ===

#[inline]
pub fn ctype_to_bit(ctype: u32) -> u32 {
    1 << ctype
}

// Bit layout follows the ONIGENC_CTYPE_* numbering: newline=0 .. ascii=14.
pub static ONIG_ENC_ASCII_CTYPE_TABLE: [u16; 128] = [
    0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x420c, 0x4209, 0x4208,
    0x4208, 0x4208, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008,
    0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4284, 0x41a0, 0x41a0, 0x41a0,
    0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0,
    0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x41a0, 0x41a0,
    0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x7ca2, 0x7ca2, 0x7ca2, 0x7ca2, 0x7ca2, 0x7ca2, 0x74a2,
    0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2,
    0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x51a0,
    0x41a0, 0x78e2, 0x78e2, 0x78e2, 0x78e2, 0x78e2, 0x78e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2,
    0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2,
    0x70e2, 0x70e2, 0x70e2, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x4008,
];

#[inline]
pub fn onigenc_is_ascii_code_ctype(code: OnigCodePoint, ctype: u32) -> bool {
    code < 128 && (ONIG_ENC_ASCII_CTYPE_TABLE[code as usize] & ctype_to_bit(ctype) as u16) != 0
}

#[inline]
pub fn onigenc_is_ascii_code_word(code: OnigCodePoint) -> bool {
    onigenc_is_ascii_code_ctype(code, ONIGENC_CTYPE_WORD)
}

#[inline]
pub fn onigenc_ascii_code_to_lower_case(c: u8) -> u8 {
    c.to_ascii_lowercase()
}

/// Newline check for encodings where `\n` is the single byte 0x0a.
#[inline]
pub fn onigenc_is_mbc_newline_0x0a(p: &[u8]) -> bool {
    p.first() == Some(&(NEWLINE_CODE as u8))
}

// === Cursor movement ===

/// Step back `n` characters from `s`, not crossing `start`.
pub fn onigenc_step_back(
    enc: OnigEncoding,
    start: usize,
    s: usize,
    data: &[u8],
    n: usize,
) -> Option<usize> {
    let mut s = s;
    for _ in 0..n {
        if s <= start {
            return None;
        }
        s = enc.left_adjust_char_head(start, s - 1, data);
    }
    Some(s)
}

/// Count characters in `[p, end)`.
pub fn onigenc_strlen(enc: OnigEncoding, data: &[u8], p: usize, end: usize) -> usize {
    let mut n = 0;
    let mut q = p;
    while q < end {
        q += enc.mbc_enc_len(&data[q..end]);
        n += 1;
    }
    n
}

pub fn onigenc_get_prev_char_head(
    enc: OnigEncoding,
    start: usize,
    s: usize,
    data: &[u8],
) -> Option<usize> {
    if s <= start {
        None
    } else {
        Some(enc.left_adjust_char_head(start, s - 1, data))
    }
}

/// Head of the character at `s`, or of the next one when `s` is inside a
/// character.
pub fn onigenc_get_right_adjust_char_head(
    enc: OnigEncoding,
    start: usize,
    s: usize,
    data: &[u8],
) -> usize {
    let p = enc.left_adjust_char_head(start, s, data);
    if p < s {
        p + enc.mbc_enc_len(&data[p..])
    } else {
        p
    }
}

/// Like [`onigenc_get_right_adjust_char_head`], also reporting the head of
/// the preceding character.
pub fn onigenc_get_right_adjust_char_head_with_prev(
    enc: OnigEncoding,
    start: usize,
    s: usize,
    data: &[u8],
) -> (usize, Option<usize>) {
    let p = enc.left_adjust_char_head(start, s, data);
    if p < s {
        (p + enc.mbc_enc_len(&data[p..]), Some(p))
    } else {
        (p, onigenc_get_prev_char_head(enc, start, p, data))
    }
}

// encodings/ascii.rs - US-ASCII encoding.
//
// Bytes >= 0x80 are accepted as opaque single-byte characters so that
// binary subjects can be matched; they belong to no character type.

use crate::oniguruma::*;
use crate::regenc::*;

pub struct AsciiEncoding;

pub static ONIG_ENCODING_ASCII: AsciiEncoding = AsciiEncoding;

impl Encoding for AsciiEncoding {
    fn name(&self) -> &str {
        "US-ASCII"
    }

    fn max_enc_len(&self) -> usize {
        1
    }

    fn min_enc_len(&self) -> usize {
        1
    }

    fn precise_mbc_enc_len(&self, p: &[u8]) -> CharLen {
        if p.is_empty() {
            CharLen::NeedMore(1)
        } else {
            CharLen::Found(1)
        }
    }

    fn mbc_enc_len(&self, _p: &[u8]) -> usize {
        1
    }

    fn is_mbc_newline(&self, p: &[u8]) -> bool {
        onigenc_is_mbc_newline_0x0a(p)
    }

    fn mbc_to_code(&self, p: &[u8]) -> OnigCodePoint {
        p[0] as OnigCodePoint
    }

    fn code_to_mbclen(&self, code: OnigCodePoint) -> Option<usize> {
        if code < 256 {
            Some(1)
        } else {
            None
        }
    }

    fn code_to_mbc(&self, code: OnigCodePoint, buf: &mut [u8]) -> usize {
        buf[0] = (code & 0xff) as u8;
        1
    }

    fn mbc_case_fold(
        &self,
        _flag: OnigCaseFoldType,
        pp: &mut usize,
        _end: usize,
        source: &[u8],
        fold_buf: &mut [u8],
    ) -> usize {
        fold_buf[0] = onigenc_ascii_code_to_lower_case(source[*pp]);
        *pp += 1;
        1
    }

    fn is_code_ctype(&self, code: OnigCodePoint, ctype: u32) -> bool {
        ctype <= ONIGENC_MAX_STD_CTYPE && onigenc_is_ascii_code_ctype(code, ctype)
    }

    fn left_adjust_char_head(&self, _start: usize, s: usize, _data: &[u8]) -> usize {
        s
    }

    fn is_valid_mbc_string(&self, _s: &[u8]) -> bool {
        true
    }

    fn flags(&self) -> EncodingFlags {
        EncodingFlags::ASCII_COMPATIBLE | EncodingFlags::FIXED_WIDTH
    }
}

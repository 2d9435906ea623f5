// encodings/utf8.rs - UTF-8 encoding (RFC 3629 range: U+0000 - U+10FFFF).

use crate::oniguruma::*;
use crate::regenc::*;

#[inline]
fn utf8_islead(c: u8) -> bool {
    (c & 0xc0) != 0x80
}

// Maps first byte to sequence length; 1 also for bytes that cannot lead.
static ENC_LEN_UTF8: [u8; 256] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];

/// Allowed range of the second byte; the rest are plain 0x80..=0xbf.
#[inline]
fn second_byte_range(lead: u8) -> (u8, u8) {
    match lead {
        0xe0 => (0xa0, 0xbf),
        0xed => (0x80, 0x9f),
        0xf0 => (0x90, 0xbf),
        0xf4 => (0x80, 0x8f),
        _ => (0x80, 0xbf),
    }
}

pub struct Utf8Encoding;

pub static ONIG_ENCODING_UTF8: Utf8Encoding = Utf8Encoding;

impl Encoding for Utf8Encoding {
    fn name(&self) -> &str {
        "UTF-8"
    }

    fn max_enc_len(&self) -> usize {
        4
    }

    fn min_enc_len(&self) -> usize {
        1
    }

    fn precise_mbc_enc_len(&self, p: &[u8]) -> CharLen {
        let Some(&lead) = p.first() else {
            return CharLen::NeedMore(1);
        };
        if lead < 0x80 {
            return CharLen::Found(1);
        }
        let len = ENC_LEN_UTF8[lead as usize] as usize;
        if len == 1 {
            return CharLen::Invalid;
        }
        for i in 1..len {
            let Some(&b) = p.get(i) else {
                return CharLen::NeedMore(len - i);
            };
            let (lo, hi) = if i == 1 {
                second_byte_range(lead)
            } else {
                (0x80, 0xbf)
            };
            if b < lo || b > hi {
                return CharLen::Invalid;
            }
        }
        CharLen::Found(len)
    }

    fn mbc_enc_len(&self, p: &[u8]) -> usize {
        // hot path: table lookup, clamped to the subject end
        let len = ENC_LEN_UTF8[p[0] as usize] as usize;
        len.min(p.len())
    }

    fn is_mbc_newline(&self, p: &[u8]) -> bool {
        onigenc_is_mbc_newline_0x0a(p)
    }

    fn mbc_to_code(&self, p: &[u8]) -> OnigCodePoint {
        let len = (ENC_LEN_UTF8[p[0] as usize] as usize).min(p.len());
        let c = p[0] as u32;
        if len > 1 {
            let full = ENC_LEN_UTF8[p[0] as usize] as u32;
            let mut n = c & ((1u32 << (7 - full)) - 1);
            for &b in &p[1..len] {
                n = (n << 6) | ((b as u32) & 0x3f);
            }
            n
        } else {
            c
        }
    }

    fn code_to_mbclen(&self, code: OnigCodePoint) -> Option<usize> {
        if (code & 0xffffff80) == 0 {
            Some(1)
        } else if (code & 0xfffff800) == 0 {
            Some(2)
        } else if (code & 0xffff0000) == 0 {
            Some(3)
        } else if code <= 0x10ffff {
            Some(4)
        } else {
            None
        }
    }

    fn code_to_mbc(&self, code: OnigCodePoint, buf: &mut [u8]) -> usize {
        match char::from_u32(code) {
            Some(c) => c.encode_utf8(buf).len(),
            None => {
                // surrogates and out-of-range values: emit the raw low byte
                buf[0] = (code & 0xff) as u8;
                1
            }
        }
    }

    fn mbc_case_fold(
        &self,
        flag: OnigCaseFoldType,
        pp: &mut usize,
        end: usize,
        source: &[u8],
        fold_buf: &mut [u8],
    ) -> usize {
        let b = source[*pp];
        if b < 128 && (b != b'I' || flag & ONIGENC_CASE_FOLD_TURKISH_AZERI == 0) {
            fold_buf[0] = onigenc_ascii_code_to_lower_case(b);
            *pp += 1;
            1
        } else {
            crate::unicode::onigenc_unicode_mbc_case_fold(self, flag, pp, end, source, fold_buf)
        }
    }

    fn is_code_ctype(&self, code: OnigCodePoint, ctype: u32) -> bool {
        crate::unicode::onigenc_unicode_is_code_ctype(code, ctype)
    }

    fn left_adjust_char_head(&self, start: usize, s: usize, data: &[u8]) -> usize {
        if s <= start {
            return s;
        }
        let mut p = s;
        // a character is at most 4 bytes; stray continuation runs stay put
        while p > start && s - p < 3 && !utf8_islead(data[p]) {
            p -= 1;
        }
        if utf8_islead(data[p]) && p + ENC_LEN_UTF8[data[p] as usize] as usize > s {
            p
        } else {
            s
        }
    }

    fn flags(&self) -> EncodingFlags {
        EncodingFlags::ASCII_COMPATIBLE | EncodingFlags::UNICODE
    }
}

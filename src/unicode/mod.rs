// unicode/mod.rs - Unicode character types and case folding for UTF-8.
//
// Code points below 256 use the ISO 8859-1 table; the rest are classified
// with the standard library's Unicode predicates.

use smallvec::SmallVec;

use crate::oniguruma::*;
use crate::regenc::*;

// Indexed by code point, bit layout as ONIGENC_CTYPE_*.
pub static ENC_UNICODE_ISO_8859_1_CTYPE_TABLE: [u16; 256] = [
    0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008,
    0x4008, 0x428c, 0x4289, 0x4288, 0x4288, 0x4288, 0x4008, 0x4008,
    0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008,
    0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008, 0x4008,
    0x4284, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0,
    0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0,
    0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0, 0x78b0,
    0x78b0, 0x78b0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x41a0,
    0x41a0, 0x7ca2, 0x7ca2, 0x7ca2, 0x7ca2, 0x7ca2, 0x7ca2, 0x74a2,
    0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2,
    0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2, 0x74a2,
    0x74a2, 0x74a2, 0x74a2, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x51a0,
    0x41a0, 0x78e2, 0x78e2, 0x78e2, 0x78e2, 0x78e2, 0x78e2, 0x70e2,
    0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2,
    0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2, 0x70e2,
    0x70e2, 0x70e2, 0x70e2, 0x41a0, 0x41a0, 0x41a0, 0x41a0, 0x4008,
    0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0288, 0x0008, 0x0008,
    0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0008,
    0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0008,
    0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0008, 0x0008,
    0x0284, 0x01a0, 0x01a0, 0x01a0, 0x01a0, 0x01a0, 0x01a0, 0x01a0,
    0x01a0, 0x01a0, 0x30e2, 0x01a0, 0x01a0, 0x00a8, 0x01a0, 0x01a0,
    0x01a0, 0x01a0, 0x10a0, 0x10a0, 0x01a0, 0x30e2, 0x01a0, 0x01a0,
    0x01a0, 0x10a0, 0x30e2, 0x01a0, 0x10a0, 0x10a0, 0x10a0, 0x01a0,
    0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2,
    0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2,
    0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x01a0,
    0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x34a2, 0x30e2,
    0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2,
    0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2,
    0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x01a0,
    0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2, 0x30e2,
];

const DOTTED_CAPITAL_I: OnigCodePoint = 0x130;
const DOTLESS_SMALL_I: OnigCodePoint = 0x131;
const COMBINING_DOT_ABOVE: OnigCodePoint = 0x307;

// Pc (connector punctuation) outside Latin-1; these count as word chars.
const CONNECTOR_PUNCTUATION: [OnigCodePoint; 9] = [
    0x203f, 0x2040, 0x2054, 0xfe33, 0xfe34, 0xfe4d, 0xfe4e, 0xfe4f, 0xff3f,
];

/// Case folding of one code point. Multi-character folds (e.g. U+00DF to
/// "ss") are applied only when `flag` carries the multi-char bit.
pub fn unicode_fold_code(code: OnigCodePoint, flag: OnigCaseFoldType) -> SmallVec<[OnigCodePoint; 3]> {
    let mut out = SmallVec::new();
    let multi = flag & INTERNAL_ONIGENC_CASE_FOLD_MULTI_CHAR != 0;

    if flag & ONIGENC_CASE_FOLD_TURKISH_AZERI != 0 {
        if code == b'I' as OnigCodePoint {
            out.push(DOTLESS_SMALL_I);
            return out;
        }
        if code == DOTTED_CAPITAL_I {
            out.push(b'i' as OnigCodePoint);
            return out;
        }
    }
    match code {
        // final sigma and long s fold to their plain forms
        0x3c2 => out.push(0x3c3),
        0x17f => out.push(b's' as OnigCodePoint),
        0xdf | 0x1e9e if multi => {
            out.push(b's' as OnigCodePoint);
            out.push(b's' as OnigCodePoint);
        }
        0x1e9e => out.push(0xdf),
        DOTTED_CAPITAL_I if multi => {
            out.push(b'i' as OnigCodePoint);
            out.push(COMBINING_DOT_ABOVE);
        }
        _ => match char::from_u32(code) {
            Some(c) => {
                let mut lower = c.to_lowercase();
                if lower.len() == 1 || multi {
                    out.extend(lower.by_ref().map(|l| l as OnigCodePoint));
                } else {
                    out.push(code);
                }
            }
            None => out.push(code),
        },
    }
    out
}

/// Fold the character at `data[*pp]` through the Unicode rules, writing the
/// encoded result to `fold`. Malformed bytes are copied unchanged.
pub fn onigenc_unicode_mbc_case_fold(
    enc: &dyn Encoding,
    flag: OnigCaseFoldType,
    pp: &mut usize,
    end: usize,
    data: &[u8],
    fold: &mut [u8],
) -> usize {
    let p = *pp;
    let len = enc.mbc_enc_len(&data[p..end]);
    *pp += len;

    let valid = matches!(enc.precise_mbc_enc_len(&data[p..end]), CharLen::Found(_));
    let code = enc.mbc_to_code(&data[p..end]);
    if !valid || (case_fold_is_ascii_only(flag) && code > ASCII_LIMIT) {
        fold[..len].copy_from_slice(&data[p..p + len]);
        return len;
    }

    let mut n = 0;
    for c in unicode_fold_code(code, flag) {
        n += enc.code_to_mbc(c, &mut fold[n..]);
    }
    n
}

fn latin1_has(code: OnigCodePoint, ctype: u32) -> bool {
    (ENC_UNICODE_ISO_8859_1_CTYPE_TABLE[code as usize] & ctype_to_bit(ctype) as u16) != 0
}

/// Is the code point of the given ctype?
pub fn onigenc_unicode_is_code_ctype(code: OnigCodePoint, ctype: u32) -> bool {
    if ctype > ONIGENC_MAX_STD_CTYPE {
        return false;
    }
    if code < 256 {
        return latin1_has(code, ctype);
    }
    let Some(c) = char::from_u32(code) else {
        return false;
    };
    match ctype {
        ONIGENC_CTYPE_NEWLINE | ONIGENC_CTYPE_XDIGIT | ONIGENC_CTYPE_ASCII => false,
        ONIGENC_CTYPE_ALPHA => c.is_alphabetic(),
        ONIGENC_CTYPE_BLANK => c.is_whitespace() && !matches!(code, 0x2028 | 0x2029),
        ONIGENC_CTYPE_CNTRL => c.is_control(),
        ONIGENC_CTYPE_DIGIT => c.is_numeric(),
        ONIGENC_CTYPE_LOWER => c.is_lowercase(),
        ONIGENC_CTYPE_UPPER => c.is_uppercase(),
        ONIGENC_CTYPE_SPACE => c.is_whitespace(),
        ONIGENC_CTYPE_ALNUM => c.is_alphanumeric(),
        ONIGENC_CTYPE_WORD => c.is_alphanumeric() || CONNECTOR_PUNCTUATION.contains(&code),
        ONIGENC_CTYPE_GRAPH => !c.is_whitespace() && !c.is_control(),
        ONIGENC_CTYPE_PRINT => !c.is_control() && !matches!(code, 0x2028 | 0x2029),
        ONIGENC_CTYPE_PUNCT => !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control(),
        _ => false,
    }
}

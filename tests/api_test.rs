// api_test.rs - Integration tests for the idiomatic Rust API.

use onigvm::encodings::{ONIG_ENCODING_ASCII, ONIG_ENCODING_UTF8};
use onigvm::oniguruma::*;
use onigvm::prelude::*;

fn utf8() -> ProgramBuilder {
    ProgramBuilder::new(&ONIG_ENCODING_UTF8)
}

fn lower(b: &mut ProgramBuilder) {
    b.class_ranges(&[], &[(b'a' as u32, b'z' as u32)], false);
}

fn digit(b: &mut ProgramBuilder) {
    b.class(b"0123456789");
}

fn regex(b: ProgramBuilder) -> Regex {
    Regex::from_program(b.build().unwrap())
}

// === Scenarios ===

#[test]
fn letters_one_or_more() {
    let mut b = utf8();
    b.plus(true, lower);
    let re = regex(b);
    let m = re.find("abc123").unwrap().unwrap();
    assert_eq!(m.range(), 0..3);
    assert_eq!(m.as_str(), Some("abc"));
}

#[test]
fn two_groups_split_before_digits() {
    // (.)(.)\d+
    let mut b = utf8();
    b.capture(1, |b| b.any_char());
    b.capture(2, |b| b.any_char());
    b.plus(true, digit);
    let re = regex(b);
    let caps = re.captures("THX1138.").unwrap().unwrap();
    assert_eq!(caps.get(0).unwrap().as_str(), Some("HX1138"));
    assert_eq!(caps.get(1).unwrap().as_str(), Some("H"));
    assert_eq!(caps.get(2).unwrap().as_str(), Some("X"));
    assert_eq!(caps.len(), 3);
}

#[test]
fn ignore_case_literal() {
    let mut b = ProgramBuilder::with_options(&ONIG_ENCODING_UTF8, ONIG_OPTION_IGNORECASE);
    b.literal_ic(b"CAT");
    b.set_exact_ic(b"CAT", 0, 0);
    let re = regex(b);
    let m = re.find("a cat sat").unwrap().unwrap();
    assert_eq!((m.start(), m.len()), (2, 3));
    assert!(re.find("a dog sat").unwrap().is_none());
}

#[test]
fn end_of_line_only_before_newline_or_end() {
    // [a-z]+$
    let mut b = utf8();
    b.plus(true, lower);
    b.end_line();
    let re = regex(b);
    let found: Vec<_> = re.find_iter("ab cd\nef gh").map(|m| m.unwrap().range()).collect();
    assert_eq!(found, vec![3..5, 9..11]);
}

fn catastrophic(b: &mut ProgramBuilder) {
    // (a|a)*b
    b.star(true, |b| b.alt(|b| b.literal(b"a"), |b| b.literal(b"a")));
    b.literal(b"b");
}

#[test]
fn cache_bounds_catastrophic_backtracking() {
    let text = "a".repeat(40);

    let mut b = utf8();
    catastrophic(&mut b);
    let re = Regex::builder(b).retry_limit_in_match(100_000).build().unwrap();
    assert_eq!(re.find(&text).unwrap(), None);

    let mut b = utf8();
    catastrophic(&mut b);
    let re = Regex::builder(b)
        .retry_limit_in_match(100_000)
        .cache_threshold(CacheThreshold::Never)
        .build()
        .unwrap();
    assert_eq!(re.find(&text).unwrap_err(), RegexError::RetryLimitInMatchOver);
}

// === Boundaries ===

#[test]
fn empty_pattern_on_empty_input() {
    let re = regex(utf8());
    let m = re.find("").unwrap().unwrap();
    assert_eq!(m.range(), 0..0);
    assert!(m.is_empty());
    assert!(re.is_match("").unwrap());
}

#[test]
fn find_at_past_end_is_a_mismatch() {
    let mut b = utf8();
    b.star(true, lower);
    let re = regex(b);
    assert_eq!(re.find_at(b"abc", 4).unwrap(), None);
    assert_eq!(re.find_at(b"abc", 3).unwrap().map(|m| m.range()), Some(3..3));
}

#[test]
fn non_utf8_text_via_bytes() {
    let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
    b.literal(b"\xfe");
    let re = regex(b);
    let m = re.find_bytes(b"ab\xfe").unwrap().unwrap();
    assert_eq!(m.as_bytes(), b"\xfe");
    assert_eq!(m.as_str(), None);
}

#[test]
fn invalid_subject_rejected_with_validity_check() {
    let mut b = utf8();
    b.any_char();
    let re = Regex::builder(b).check_validity(true).build().unwrap();
    let err = re.find_bytes(b"ok\xc3").unwrap_err();
    assert!(matches!(err, RegexError::Encoding { .. }));
    assert_eq!(err.code(), ONIGERR_INVALID_CODE_POINT_VALUE);
}

// === Options ===

#[test]
fn not_bol_blocks_begin_line_at_start() {
    let mut b = utf8();
    b.begin_line();
    b.literal(b"a");
    let re = Regex::builder(b).not_bol(true).build().unwrap();
    assert_eq!(re.find("a\na").unwrap().map(|m| m.range()), Some(2..3));
}

#[test]
fn not_eol_blocks_end_line_at_end() {
    let mut b = utf8();
    b.literal(b"a");
    b.end_line();
    let re = Regex::builder(b).not_eol(true).build().unwrap();
    assert_eq!(re.find("a\na").unwrap().map(|m| m.range()), Some(0..1));
    assert_eq!(re.find("ba").unwrap(), None);
}

#[test]
fn find_not_empty_skips_empty_candidates() {
    let mut b = utf8();
    b.star(true, digit);
    let re = Regex::builder(b).find_not_empty(true).build().unwrap();
    assert_eq!(re.find("ab12").unwrap().map(|m| m.range()), Some(2..4));
}

#[test]
fn match_stack_limit_surfaces() {
    // a*b on a long run of a's keeps one frame per character
    let mut b = utf8();
    b.star(true, |b| b.literal(b"a"));
    b.literal(b"b");
    let re = Regex::builder(b).match_stack_limit(64).build().unwrap();
    let err = re.find(&"a".repeat(1000)).unwrap_err();
    assert_eq!(err, RegexError::MatchStackLimitOver);
    assert!(err.is_resource_limit());
}

#[test]
fn time_limit_surfaces() {
    let mut b = utf8();
    catastrophic(&mut b);
    let re = Regex::builder(b)
        .cache_threshold(CacheThreshold::Never)
        .retry_limit_in_match(0)
        .time_limit(1)
        .build()
        .unwrap();
    assert_eq!(re.find(&"a".repeat(64)).unwrap_err(), RegexError::TimeLimitOver);
}

// === Captures ===

#[test]
fn unmatched_group_is_none() {
    // (x)?(y)
    let mut b = utf8();
    b.optional(true, |b| b.capture(1, |b| b.literal(b"x")));
    b.capture(2, |b| b.literal(b"y"));
    let re = regex(b);
    let caps = re.captures("ay").unwrap().unwrap();
    assert!(caps.get(1).is_none());
    assert_eq!(caps.get(2).unwrap().range(), 1..2);
    assert!(caps.get(9).is_none());
    assert_eq!(caps.iter().len(), 3);
}

#[test]
fn history_tree_mirrors_nested_repeats() {
    // (?@(?@a)+b)+ : every iteration of both groups is recorded
    let mut b = utf8();
    b.capture_history(1);
    b.capture_history(2);
    b.plus(true, |b| {
        b.capture(1, |b| {
            b.plus(true, |b| b.capture(2, |b| b.literal(b"a")));
            b.literal(b"b");
        })
    });
    let re = regex(b);
    let caps = re.captures("aabab").unwrap().unwrap();
    let root = caps.history().unwrap();
    assert_eq!((root.group, root.beg, root.end), (0, 0, 5));
    let outer: Vec<_> = root.childs.iter().map(|c| (c.group, c.beg, c.end)).collect();
    assert_eq!(outer, vec![(1, 0, 3), (1, 3, 5)]);
    let inner: Vec<_> = root.childs[0].childs.iter().map(|c| (c.beg, c.end)).collect();
    assert_eq!(inner, vec![(0, 1), (1, 2)]);
    assert_eq!(root.childs[1].childs.len(), 1);
}

// === Iteration ===

#[test]
fn find_iter_stops_at_first_error() {
    let mut b = utf8();
    b.star(true, |b| b.literal(b"a"));
    b.literal(b"b");
    let re = Regex::builder(b).match_stack_limit(16).build().unwrap();
    let text = format!("ab{}", "a".repeat(100));
    let results: Vec<_> = re.find_iter(&text).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().range(), 0..2);
    assert!(results[1].is_err());
}

#[test]
fn rfind_returns_rightmost_start() {
    let mut b = utf8();
    b.literal(b"ab");
    b.set_exact(b"ab", 0, 0);
    let re = regex(b);
    assert_eq!(re.rfind(b"ab ab xab").unwrap().map(|m| m.start()), Some(7));
    assert_eq!(re.rfind(b"xyz").unwrap(), None);
}

#[test]
fn regex_is_shareable_across_threads() {
    let mut b = utf8();
    b.plus(true, digit);
    let re = std::sync::Arc::new(regex(b));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let re = re.clone();
            std::thread::spawn(move || {
                let text = format!("n{}", i * 11);
                re.find(&text).unwrap().map(|m| m.len())
            })
        })
        .collect();
    let lens: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(lens, vec![Some(1), Some(2), Some(2), Some(2)]);
}

// compat_opcodes.rs - Integration tests for the less common emitters.
//
// Each test assembles a program around one opcode family and checks the
// search result:
//   x2(build, string, from, to)  -> search, expect match at from..to
//   n(build, string)             -> search, expect no match

use onigvm::encodings::ONIG_ENCODING_UTF8;
use onigvm::oniguruma::*;
use onigvm::regcomp::ProgramBuilder;
use onigvm::regint::*;
use onigvm::regsearch::onig_search;
use onigvm::regtrav::onig_number_of_capture_histories;

fn compile(build: impl FnOnce(&mut ProgramBuilder)) -> RegexType {
    let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
    build(&mut b);
    b.build().unwrap_or_else(|e| panic!("assembly failed: {}", e))
}

fn find(reg: &RegexType, input: &str) -> Option<(usize, usize)> {
    let s = input.as_bytes();
    let mut region = OnigRegion::new();
    onig_search(reg, s, s.len(), 0, s.len(), Some(&mut region), ONIG_OPTION_NONE)
        .unwrap_or_else(|e| panic!("search failed on {:?}: {}", input, e))
        .and_then(|_| region.pos(0))
}

fn x2(build: impl FnOnce(&mut ProgramBuilder), input: &str, from: usize, to: usize) {
    assert_eq!(find(&compile(build), input), Some((from, to)), "on {:?}", input);
}

fn n(build: impl FnOnce(&mut ProgramBuilder), input: &str) {
    assert_eq!(find(&compile(build), input), None, "on {:?}", input);
}

// === Any char ===

#[test]
fn any_char_and_newlines() {
    let dot = |ml: bool| {
        move |b: &mut ProgramBuilder| {
            b.literal(b"a");
            if ml {
                b.any_char_ml();
            } else {
                b.any_char();
            }
            b.literal(b"b");
        }
    };
    n(dot(false), "a\nb");
    x2(dot(true), "a\nb", 0, 3);
    x2(dot(false), "aéb", 0, 4);
}

#[test]
fn any_char_star_with_peek() {
    // .*c, leaving the star only before a 'c'
    let build = |b: &mut ProgramBuilder| {
        b.any_char_star_peek_next(b'c');
        b.literal(b"c");
    };
    x2(build, "abcabd", 0, 3);
    x2(build, "xy\nzc", 3, 5);
    n(build, "abd");
}

// === Classes and words ===

#[test]
fn negated_byte_class() {
    x2(|b| b.class_not(b"abc"), "abd", 2, 3);
    x2(|b| b.class_not(b"abc"), "aé", 1, 3);
    n(|b| b.class_not(b"abc"), "cab");
}

#[test]
fn word_classes_unicode_and_ascii() {
    x2(|b| b.word(), " é", 1, 3);
    n(|b| b.ascii_word(), " é");
    x2(|b| b.not_ascii_word(), "aé", 1, 3);
    x2(|b| b.not_word(), "aé!", 3, 4);
}

#[test]
fn word_edges() {
    let word_begin_cat = |b: &mut ProgramBuilder| {
        b.word_begin();
        b.literal(b"cat");
    };
    x2(word_begin_cat, "concat cat", 7, 10);

    let inner_cat = |b: &mut ProgramBuilder| {
        b.not_word_bound();
        b.literal(b"cat");
    };
    x2(inner_cat, "cat concat", 7, 10);

    // é is a word character only to the Unicode-aware boundary
    let ascii_bound_cat = |b: &mut ProgramBuilder| {
        b.ascii_word_bound();
        b.literal(b"cat");
    };
    x2(ascii_bound_cat, "écat", 2, 5);
    n(
        |b: &mut ProgramBuilder| {
            b.word_bound();
            b.literal(b"cat");
        },
        "écat",
    );
}

// === Loops ===

#[test]
fn star_with_exact_head() {
    // (?:ab)*c
    let build = |b: &mut ProgramBuilder| {
        b.star_head_exact(b'a', |b| b.literal(b"ab"));
        b.literal(b"c");
    };
    x2(build, "ababc", 0, 5);
    x2(build, "abac", 3, 4);
}

#[test]
fn star_peeking_at_next_literal() {
    // [ab]*c
    let build = |b: &mut ProgramBuilder| {
        b.star_peek_next(b'c', |b| b.class(b"ab"));
        b.literal(b"c");
    };
    x2(build, "xabc", 1, 4);
    n(build, "abd");
}

#[test]
fn hand_assembled_null_check() {
    // (?:a?)*b with the loop written out by hand
    let build = |b: &mut ProgramBuilder| {
        let top = b.new_label();
        let exit = b.new_label();
        let id = b.new_null_check();
        b.bind(top);
        b.push(exit);
        b.null_check_start(id);
        b.optional(true, |b| b.literal(b"a"));
        b.null_check_end(id, OpCode::NullCheckEnd);
        b.jump(top);
        b.bind(exit);
        b.literal(b"b");
    };
    x2(build, "aab", 0, 3);
    x2(build, "xb", 1, 2);
    n(build, "aa");
}

#[test]
fn null_check_end_rejects_other_opcodes() {
    let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
    let id = b.new_null_check();
    b.null_check_start(id);
    b.null_check_end(id, OpCode::Jump);
    assert!(b.build().is_err());
}

// === Back-references ===

#[test]
fn backref_to_any_of_several_groups() {
    // (?:(a)|(b))\k<1,2>
    let build = |b: &mut ProgramBuilder| {
        b.alt(|b| b.capture(1, |b| b.literal(b"a")), |b| b.capture(2, |b| b.literal(b"b")));
        b.backref_multi(&[1, 2], false);
    };
    x2(build, "abb", 1, 3);
    n(build, "ba");

    let ic = |b: &mut ProgramBuilder| {
        b.alt(|b| b.capture(1, |b| b.literal(b"a")), |b| b.capture(2, |b| b.literal(b"b")));
        b.backref_multi(&[1, 2], true);
    };
    x2(ic, "bB", 0, 2);
}

#[test]
fn backref_at_same_nesting_level() {
    // (a)\k<1+0>
    let build = |b: &mut ProgramBuilder| {
        b.capture(1, |b| b.class(b"ab"));
        b.backref_with_level(&[1], 0, false);
    };
    x2(build, "abb", 1, 3);
    n(build, "ab");
}

#[test]
fn backref_check_tests_group_is_set() {
    // (a)?(?(<1>)b) written as a check
    let build = |b: &mut ProgramBuilder| {
        b.optional(true, |b| b.capture(1, |b| b.literal(b"a")));
        b.backref_check(&[1]);
        b.literal(b"b");
    };
    x2(build, "ab", 0, 2);
    n(build, "b");
}

// === Calls ===

#[test]
fn recursive_group_matches_balanced_parens() {
    // (?<p>\((?:\g<p>)*\))
    let build = |b: &mut ProgramBuilder| {
        let group = b.new_label();
        let done = b.new_label();
        b.mark_recursive(1);
        b.call(group);
        b.jump(done);
        b.bind(group);
        b.capture(1, |b| {
            b.literal(b"(");
            b.star(true, |b| b.call(group));
            b.literal(b")");
        });
        b.ret();
        b.bind(done);
    };
    x2(build, "(()(()))", 0, 8);
    x2(build, "((()", 2, 4);
    n(build, "((");
}

// === Search hints ===

#[test]
fn sub_anchors_filter_literal_hits() {
    let begin_line = |b: &mut ProgramBuilder| {
        b.begin_line();
        b.literal(b"ab");
        b.set_exact(b"ab", 0, 0);
        b.set_sub_anchor(ANCR_BEGIN_LINE);
    };
    x2(begin_line, "xab\nab", 4, 6);

    let end_line = |b: &mut ProgramBuilder| {
        b.literal(b"ab");
        b.end_line();
        b.set_exact(b"ab", 0, 0);
        b.set_sub_anchor(ANCR_END_LINE);
    };
    x2(end_line, "abx ab\nz", 4, 6);
    n(end_line, "abx");
}

#[test]
fn threshold_length_rejects_short_subjects() {
    let build = |b: &mut ProgramBuilder| {
        b.literal(b"ab");
        b.set_exact(b"ab", 0, 0);
        b.set_threshold_len(4);
    };
    n(build, "ab");
    x2(build, "xxab", 2, 4);
}

#[test]
fn capture_history_group_count() {
    let reg = compile(|b| {
        b.capture_history(1);
        b.capture_history(3);
        b.capture(1, |b| b.literal(b"a"));
        b.capture(2, |b| b.literal(b"b"));
        b.capture(3, |b| b.literal(b"c"));
    });
    assert_eq!(onig_number_of_capture_histories(&reg), 2);
    assert_eq!(onig_number_of_capture_histories(&compile(|b| b.literal(b"a"))), 0);
}

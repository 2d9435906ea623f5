// Criterion benchmark suite for the matching engine.
//
// Run: cargo bench
// Specific group: cargo bench -- catastrophic
// HTML report: target/criterion/report/index.html

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use onigvm::encodings::ONIG_ENCODING_UTF8;
use onigvm::oniguruma::{OnigRegion, ONIG_OPTION_NONE};
use onigvm::regcomp::ProgramBuilder;
use onigvm::regexec::{CacheThreshold, MatchParam};
use onigvm::regint::RegexType;
use onigvm::regsearch::onig_search_with_param;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn assemble(build: impl FnOnce(&mut ProgramBuilder)) -> RegexType {
    let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
    build(&mut b);
    b.build().expect("assembly failed")
}

fn search(reg: &RegexType, text: &[u8], region: Option<&mut OnigRegion>, param: &mut MatchParam<'_>) -> Option<usize> {
    onig_search_with_param(reg, text, text.len(), 0, text.len(), region, ONIG_OPTION_NONE, param)
        .expect("search failed")
}

fn haystack(len: usize, needle: &str) -> Vec<u8> {
    let mut text = "The quick brown fox jumps over the lazy dog. ".repeat(len / 45 + 1);
    text.truncate(len);
    text.push_str(needle);
    text.into_bytes()
}

// ---------------------------------------------------------------------------
// 1. literal search -- skip strategies
// ---------------------------------------------------------------------------

fn bench_literal_search(c: &mut Criterion) {
    let text = haystack(10_000, "riverbank");
    let cases: Vec<(&str, RegexType)> = vec![
        ("plain", assemble(|b| b.literal(b"riverbank"))),
        (
            "exact_bm",
            assemble(|b| {
                b.literal(b"riverbank");
                b.set_exact(b"riverbank", 0, 0);
            }),
        ),
        (
            "exact_ic",
            assemble(|b| {
                b.literal_ic(b"RIVERBANK");
                b.set_exact_ic(b"RIVERBANK", 0, 0);
            }),
        ),
        (
            "map",
            assemble(|b| {
                b.alt(|b| b.literal(b"riverbank"), |b| b.literal(b"valley"));
                b.set_map(b"rv", 0, 0);
            }),
        ),
    ];

    let mut group = c.benchmark_group("literal_search");
    for (name, reg) in &cases {
        let mut param = MatchParam::new();
        assert!(search(reg, &text, None, &mut param).is_some());
        group.bench_with_input(BenchmarkId::from_parameter(name), &text[..], |b, text| {
            b.iter(|| black_box(search(reg, black_box(text), None, &mut param)));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 2. capture search -- region filling and frame reuse
// ---------------------------------------------------------------------------

fn bench_capture_search(c: &mut Criterion) {
    // (\d{4})-(\d{2})-(\d{2})
    let reg = assemble(|b| {
        let digit = |b: &mut ProgramBuilder| b.class(b"0123456789");
        b.capture(1, |b| b.repeat(4, 4, true, digit));
        b.literal(b"-");
        b.capture(2, |b| b.repeat(2, 2, true, digit));
        b.literal(b"-");
        b.capture(3, |b| b.repeat(2, 2, true, digit));
    });
    let text = haystack(2_000, "2026-02-12");

    let mut group = c.benchmark_group("capture_search");
    group.bench_function("fresh_region", |b| {
        let mut param = MatchParam::new();
        b.iter(|| {
            let mut region = OnigRegion::new();
            black_box(search(&reg, black_box(&text), Some(&mut region), &mut param));
            black_box(region);
        });
    });
    group.bench_function("reused_region", |b| {
        let mut param = MatchParam::new();
        let mut region = OnigRegion::new();
        b.iter(|| black_box(search(&reg, black_box(&text), Some(&mut region), &mut param)));
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// 3. catastrophic -- nested repeats with and without the match cache
// ---------------------------------------------------------------------------

fn bench_catastrophic(c: &mut Criterion) {
    // (a|a)*b
    let reg = assemble(|b| {
        b.star(true, |b| b.alt(|b| b.literal(b"a"), |b| b.literal(b"a")));
        b.literal(b"b");
    });

    let mut group = c.benchmark_group("catastrophic");
    for n in [12usize, 16, 20] {
        let text = vec![b'a'; n];
        group.bench_with_input(BenchmarkId::new("cached", n), &text[..], |b, text| {
            let mut param = MatchParam::new();
            param.set_cache_threshold(CacheThreshold::InputLength);
            b.iter(|| black_box(search(&reg, black_box(text), None, &mut param)));
        });
        group.bench_with_input(BenchmarkId::new("uncached", n), &text[..], |b, text| {
            let mut param = MatchParam::new();
            param.set_cache_threshold(CacheThreshold::Never).set_retry_limit_in_match(0);
            b.iter(|| black_box(search(&reg, black_box(text), None, &mut param)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_literal_search, bench_capture_search, bench_catastrophic);
criterion_main!(benches);

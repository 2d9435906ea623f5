// properties.rs - Property tests over random subjects.
//
// Every program here is eligible for the match cache, so forcing the cache
// on at the first failure and forcing it off must give identical regions.
// The later programs put cache points inside lookaround and atomic scopes.

use onigvm::encodings::ONIG_ENCODING_ASCII;
use onigvm::error::RegexError;
use onigvm::oniguruma::*;
use onigvm::regcomp::ProgramBuilder;
use onigvm::regcache::onig_check_linear_time;
use onigvm::regexec::{onig_match, CacheThreshold, MatchParam};
use onigvm::regint::RegexType;
use onigvm::regsearch::onig_search_with_param;
use quickcheck::{quickcheck, Arbitrary, Gen};

#[derive(Clone, Debug)]
struct Subject(Vec<u8>);

impl Arbitrary for Subject {
    fn arbitrary(g: &mut Gen) -> Self {
        let len = usize::arbitrary(g) % 24;
        Subject((0..len).map(|_| *g.choose(&b"abcx\n"[..]).unwrap()).collect())
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.0.shrink().map(Subject))
    }
}

fn programs() -> Vec<RegexType> {
    let builds: [fn(&mut ProgramBuilder); 13] = [
        // (a|ab)*c
        |b| {
            b.star(true, |b| b.capture(1, |b| b.alt(|b| b.literal(b"a"), |b| b.literal(b"ab"))));
            b.literal(b"c");
        },
        // (ab|a)(bc|c)?
        |b| {
            b.capture(1, |b| b.alt(|b| b.literal(b"ab"), |b| b.literal(b"a")));
            b.optional(true, |b| b.capture(2, |b| b.alt(|b| b.literal(b"bc"), |b| b.literal(b"c"))));
        },
        // (a|b)*?c
        |b| {
            b.star(false, |b| b.capture(1, |b| b.class(b"ab")));
            b.literal(b"c");
        },
        // a{2,3}b
        |b| {
            b.repeat(2, 3, true, |b| b.literal(b"a"));
            b.literal(b"b");
        },
        // (?:a|b)*a(a|b)
        |b| {
            b.star(true, |b| b.alt(|b| b.literal(b"a"), |b| b.literal(b"b")));
            b.literal(b"a");
            b.capture(1, |b| b.class(b"ab"));
        },
        // ^(a|b)+$
        |b| {
            b.begin_line();
            b.plus(true, |b| b.capture(1, |b| b.class(b"ab")));
            b.end_line();
        },
        // (?=a)[abc]*?c
        |b| {
            b.lookahead(|b| b.literal(b"a"));
            b.star(false, |b| b.class(b"abc"));
            b.literal(b"c");
        },
        // a+?(b*)\n
        |b| {
            b.plus(false, |b| b.literal(b"a"));
            b.capture(1, |b| b.star(true, |b| b.literal(b"b")));
            b.literal(b"\n");
        },
        // (?!a*b)([ab]*)c
        |b| {
            b.negative_lookahead(|b| {
                b.star(true, |b| b.literal(b"a"));
                b.literal(b"b");
            });
            b.capture(1, |b| b.star(true, |b| b.class(b"ab")));
            b.literal(b"c");
        },
        // (?>a|(ab))*c
        |b| {
            b.star(true, |b| b.atomic(|b| b.alt(|b| b.literal(b"a"), |b| b.capture(1, |b| b.literal(b"ab")))));
            b.literal(b"c");
        },
        // (?<!x)(a|aa)*b
        |b| {
            b.negative_lookbehind(1, |b| b.literal(b"x"));
            b.star(true, |b| b.capture(1, |b| b.alt(|b| b.literal(b"a"), |b| b.literal(b"aa"))));
            b.literal(b"b");
        },
        // (?=(?:a|ab)*c)(a)
        |b| {
            b.lookahead(|b| {
                b.star(true, |b| b.alt(|b| b.literal(b"a"), |b| b.literal(b"ab")));
                b.literal(b"c");
            });
            b.capture(1, |b| b.literal(b"a"));
        },
        // (?<!a|x)c(?!b|\n)
        |b| {
            b.negative_lookbehind(1, |b| b.alt(|b| b.literal(b"a"), |b| b.literal(b"x")));
            b.literal(b"c");
            b.negative_lookahead(|b| b.alt(|b| b.literal(b"b"), |b| b.literal(b"\n")));
        },
    ];
    builds
        .iter()
        .map(|build| {
            let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
            build(&mut b);
            b.build().unwrap()
        })
        .collect()
}

type Outcome = Result<Option<(usize, Vec<i32>, Vec<i32>)>, RegexError>;

fn search_with(reg: &RegexType, s: &[u8], threshold: CacheThreshold) -> Outcome {
    let mut param = MatchParam::new();
    param.set_cache_threshold(threshold);
    let mut region = OnigRegion::new();
    let at = onig_search_with_param(reg, s, s.len(), 0, s.len(), Some(&mut region), 0, &mut param)?;
    Ok(at.map(|at| (at, region.beg.clone(), region.end.clone())))
}

fn regions_in_bounds(beg: &[i32], end: &[i32], len: usize) -> bool {
    beg.iter().zip(end).all(|(&b, &e)| {
        (b == ONIG_REGION_NOTPOS && e == ONIG_REGION_NOTPOS) || (0 <= b && b <= e && e as usize <= len)
    })
}

fn cache_never_changes_results(s: Subject) -> bool {
    programs().iter().all(|reg| {
        let cached = search_with(reg, &s.0, CacheThreshold::Fails(0));
        let plain = search_with(reg, &s.0, CacheThreshold::Never);
        cached.is_ok() && cached == plain
    })
}

fn search_agrees_with_match(s: Subject) -> bool {
    let s = &s.0;
    programs().iter().all(|reg| {
        let Ok(found) = search_with(reg, s, CacheThreshold::InputLength) else {
            return false;
        };
        let first = found.as_ref().map_or(s.len() + 1, |f| f.0);
        // nothing starts before the reported start
        let none_earlier = (0..first.min(s.len() + 1))
            .all(|p| onig_match(reg, s, s.len(), p, None, ONIG_OPTION_NONE) == Ok(None));
        let same_end = match &found {
            Some((at, beg, end)) => {
                beg[0] as usize == *at
                    && regions_in_bounds(beg, end, s.len())
                    && onig_match(reg, s, s.len(), *at, None, ONIG_OPTION_NONE) == Ok(Some(end[0] as usize))
            }
            None => true,
        };
        none_earlier && same_end
    })
}

fn match_is_idempotent(s: Subject, at: usize) -> bool {
    let s = &s.0;
    let at = at % (s.len() + 1);
    programs().iter().all(|reg| {
        let mut first = OnigRegion::new();
        let mut second = OnigRegion::new();
        let a = onig_match(reg, s, s.len(), at, Some(&mut first), 0);
        let b = onig_match(reg, s, s.len(), at, Some(&mut second), 0);
        a == b && first.beg == second.beg && first.end == second.end
    })
}

quickcheck! {
    fn prop_cache_never_changes_results(s: Subject) -> bool {
        cache_never_changes_results(s)
    }

    fn prop_search_agrees_with_match(s: Subject) -> bool {
        search_agrees_with_match(s)
    }

    fn prop_match_is_idempotent(s: Subject, at: usize) -> bool {
        match_is_idempotent(s, at)
    }
}

#[test]
fn every_program_is_cache_eligible() {
    for (i, reg) in programs().iter().enumerate() {
        assert!(onig_check_linear_time(reg), "program {}", i);
    }
}

#[test]
fn cache_equivalence_inside_scopes() {
    for s in [
        &b"aaab"[..],
        b"aabac",
        b"abababc",
        b"xaab",
        b"xab aab",
        b"ababac",
        b"acb ac\nac",
        b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaab",
        b"abababababababababababababababababx",
    ] {
        assert!(cache_never_changes_results(Subject(s.to_vec())), "{:?}", String::from_utf8_lossy(s));
    }
}

#[test]
fn cache_equivalence_on_long_runs() {
    // long enough that the input-length threshold activates mid-search
    for n in [30, 64] {
        let mut s = vec![b'a'; n];
        assert!(cache_never_changes_results(Subject(s.clone())));
        s.push(b'c');
        assert!(cache_never_changes_results(Subject(s)));
    }
}

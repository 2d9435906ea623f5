// regcache.rs - Match cache: static cache-point analysis and the memo
// bitsets consulted by the VM.
//
// A cache point is a choice opcode. The pair (point, position) identifies a
// VM state whose future does not depend on how it was reached, so once it is
// known to fail it never has to be explored again. Points inside a bounded
// repeat get one slot per iteration because the repeat counter is part of
// the state.

use log::debug;

use crate::error::RegexError;
use crate::regint::*;

/// Innermost backtracking scope that encloses a cache point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CacheScope {
    Plain,
    Atomic,
    /// Positive or negative lookaround; `end` is the op that closes it.
    Lookaround { end: usize },
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CachePointEntry {
    pub op: usize,
    /// Local slot, within the enclosing repeat's iteration when there is one.
    pub num: usize,
    pub outer_repeat: Option<usize>,
    pub scope: CacheScope,
}

#[derive(Clone, Copy, Debug)]
struct RepeatSlots {
    base: usize,
    inner: usize,
    lower: usize,
    upper: Option<usize>,
}

/// Cache points of one program, sorted by op index.
#[derive(Debug)]
pub struct CacheTable {
    entries: Vec<CachePointEntry>,
    repeats: Vec<Option<RepeatSlots>>,
    num_points: usize,
    has_lookaround: bool,
}

/// Outcome of analyzing a program for the match cache.
#[derive(Debug)]
pub enum CacheAnalysis {
    Ready(CacheTable),
    Disqualified(&'static str),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Lookahead,
    NegLookahead,
    NegLookbehind,
    Atomic,
}

struct OpenScope {
    kind: ScopeKind,
    id: usize,
}

struct RawEntry {
    op: usize,
    num: usize,
    outer_repeat: Option<usize>,
    scope: Option<usize>,
}

impl CacheTable {
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub(crate) fn lookup(&self, op: usize) -> Option<&CachePointEntry> {
        self.entries
            .binary_search_by_key(&op, |e| e.op)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Global point index of `entry` given the enclosing repeat's counter.
    /// For a repeat's own increment point, `count` is the value after the
    /// increment.
    pub(crate) fn point_index(&self, entry: &CachePointEntry, count: usize) -> Option<usize> {
        let point = match entry.outer_repeat {
            None => entry.num,
            Some(id) => {
                let r = self.repeats.get(id).copied().flatten()?;
                if count < r.lower {
                    r.base + r.inner * count + entry.num
                } else {
                    let k = match r.upper {
                        None => 0,
                        Some(upper) => (count - r.lower).min(upper.saturating_sub(r.lower + 1)),
                    };
                    r.base + r.inner * r.lower + (r.inner + 1) * k + entry.num
                }
            }
        };
        (point < self.num_points).then_some(point)
    }
}

/// Walks the program once and assigns cache points.
pub(crate) fn analyze(reg: &RegexType) -> CacheAnalysis {
    match build_table(reg) {
        Ok(table) => CacheAnalysis::Ready(table),
        Err(reason) => {
            debug!("match cache disabled: {}", reason);
            CacheAnalysis::Disqualified(reason)
        }
    }
}

fn build_table(reg: &RegexType) -> Result<CacheTable, &'static str> {
    let mut raw: Vec<RawEntry> = Vec::new();
    let mut scope_ends: Vec<Option<usize>> = Vec::new();
    let mut scope_kinds: Vec<ScopeKind> = Vec::new();
    let mut open: Vec<OpenScope> = Vec::new();
    let mut repeats: Vec<Option<RepeatSlots>> = vec![None; reg.num_repeat.max(reg.repeat_range.len())];

    let mut num_top = 0usize;
    // (repeat id, inner point count) of the repeat body being walked
    let mut current: Option<(usize, usize)> = None;

    for (i, op) in reg.ops.iter().enumerate() {
        let in_lookaround = open.iter().any(|s| s.kind != ScopeKind::Atomic);
        let scope = open.last().map(|s| s.id);

        match op.opcode {
            OpCode::Push
            | OpCode::PushOrJumpExact1
            | OpCode::PushIfPeekNext
            | OpCode::AnyCharStar
            | OpCode::AnyCharMlStar
            | OpCode::AnyCharStarPeekNext
            | OpCode::AnyCharMlStarPeekNext => {
                let (num, outer_repeat) = match current.as_mut() {
                    Some((id, inner)) => {
                        *inner += 1;
                        (*inner - 1, Some(*id))
                    }
                    None => {
                        num_top += 1;
                        (num_top - 1, None)
                    }
                };
                raw.push(RawEntry {
                    op: i,
                    num,
                    outer_repeat,
                    scope,
                });
            }

            OpCode::Repeat | OpCode::RepeatNg => {
                let OperationPayload::Repeat { id, .. } = op.payload else {
                    return Err("malformed repeat");
                };
                if current.is_some() {
                    return Err("nested repeat");
                }
                let range = reg.repeat_range.get(id).ok_or("repeat id out of range")?;
                if range.lower == 0 {
                    raw.push(RawEntry {
                        op: i,
                        num: num_top,
                        outer_repeat: None,
                        scope,
                    });
                    num_top += 1;
                }
                current = Some((id, 0));
            }

            OpCode::RepeatInc | OpCode::RepeatIncNg => {
                let OperationPayload::RepeatInc { id } = op.payload else {
                    return Err("malformed repeat increment");
                };
                let Some((cur, inner)) = current.take() else {
                    return Err("repeat increment outside its repeat");
                };
                if cur != id {
                    return Err("repeat increment outside its repeat");
                }
                let range = reg.repeat_range.get(id).ok_or("repeat id out of range")?;
                let lower = range.lower.max(0) as usize;
                let upper = if is_infinite_repeat(range.upper) {
                    None
                } else {
                    Some(range.upper.max(0) as usize)
                };
                let groups = match upper {
                    None => 1,
                    Some(u) => u.saturating_sub(lower),
                };
                if groups > 0 {
                    raw.push(RawEntry {
                        op: i,
                        num: inner,
                        outer_repeat: Some(id),
                        scope,
                    });
                }
                let size = inner
                    .checked_mul(lower)
                    .and_then(|a| (inner + 1).checked_mul(groups).and_then(|b| a.checked_add(b)))
                    .ok_or("too many cache points")?;
                if id >= repeats.len() {
                    repeats.resize(id + 1, None);
                }
                repeats[id] = Some(RepeatSlots {
                    base: num_top,
                    inner,
                    lower,
                    upper,
                });
                num_top = num_top.checked_add(size).ok_or("too many cache points")?;
            }

            OpCode::PushPos | OpCode::PushPosNot | OpCode::PushLookBehindNot | OpCode::PushStopBt => {
                let kind = match op.opcode {
                    OpCode::PushPos => ScopeKind::Lookahead,
                    OpCode::PushPosNot => ScopeKind::NegLookahead,
                    OpCode::PushLookBehindNot => ScopeKind::NegLookbehind,
                    _ => ScopeKind::Atomic,
                };
                open.push(OpenScope {
                    kind,
                    id: scope_ends.len(),
                });
                scope_ends.push(None);
                scope_kinds.push(kind);
            }

            OpCode::PopPos | OpCode::FailPos | OpCode::FailLookBehindNot | OpCode::PopStopBt => {
                let kind = match op.opcode {
                    OpCode::PopPos => ScopeKind::Lookahead,
                    OpCode::FailPos => ScopeKind::NegLookahead,
                    OpCode::FailLookBehindNot => ScopeKind::NegLookbehind,
                    _ => ScopeKind::Atomic,
                };
                match open.pop() {
                    Some(s) if s.kind == kind => scope_ends[s.id] = Some(i),
                    _ => return Err("unbalanced scope"),
                }
            }

            OpCode::MemoryStart
            | OpCode::MemoryStartPush
            | OpCode::MemoryEnd
            | OpCode::MemoryEndPush
            | OpCode::Keep
                if in_lookaround =>
            {
                return Err("capture inside lookaround");
            }

            OpCode::RepeatIncSg | OpCode::RepeatIncNgSg => return Err("repeat search-get increment"),
            OpCode::NullCheckEndMemst | OpCode::NullCheckEndMemstPush => {
                return Err("capture-aware null check")
            }
            OpCode::MemoryEndRec | OpCode::MemoryEndPushRec => return Err("recursive capture"),
            OpCode::Call | OpCode::Return => return Err("subexpression call"),
            OpCode::Condition => return Err("conditional"),
            OpCode::PushAbsentPos | OpCode::Absent | OpCode::AbsentEnd => {
                return Err("absent operator")
            }
            code if code.is_backref() => return Err("back-reference"),

            _ => {}
        }
    }

    if current.is_some() {
        return Err("repeat without increment");
    }
    if !open.is_empty() {
        return Err("unbalanced scope");
    }

    let mut has_lookaround = false;
    let mut entries = Vec::with_capacity(raw.len());
    for r in raw {
        let scope = match r.scope {
            None => CacheScope::Plain,
            Some(id) => match (scope_kinds[id], scope_ends[id]) {
                (ScopeKind::Atomic, _) => CacheScope::Atomic,
                (_, Some(end)) => {
                    has_lookaround = true;
                    CacheScope::Lookaround { end }
                }
                (_, None) => return Err("unbalanced scope"),
            },
        };
        entries.push(CachePointEntry {
            op: r.op,
            num: r.num,
            outer_repeat: r.outer_repeat,
            scope,
        });
    }

    Ok(CacheTable {
        entries,
        repeats,
        num_points: num_top,
        has_lookaround,
    })
}

/// The program's cache analysis, computed on first use.
pub(crate) fn cache_analysis(reg: &RegexType) -> &CacheAnalysis {
    reg.cache_analysis.get_or_init(|| analyze(reg))
}

/// Does the program qualify for the match cache, i.e. is it guaranteed to
/// match in time linear in the input length?
pub fn onig_check_linear_time(reg: &RegexType) -> bool {
    matches!(cache_analysis(reg), CacheAnalysis::Ready(_))
}

// ============================================================================
// Runtime bitsets
// ============================================================================

/// What the cache knows about one (point, position) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CacheProbe {
    Unknown { index: usize, lookaround: bool },
    Failed,
    /// The enclosing lookaround body already succeeded from here; resume at
    /// its closing op.
    Matched { end: usize },
}

/// Per-search memo: "failed" and "matched" bits, one per (position, point).
pub(crate) struct MatchCache {
    failed: Vec<u64>,
    matched: Vec<u64>,
    num_points: usize,
}

impl MatchCache {
    pub(crate) fn new(table: &CacheTable, str_len: usize) -> Result<Self, RegexError> {
        let bits = table
            .num_points
            .checked_mul(str_len.checked_add(1).ok_or(RegexError::Memory)?)
            .ok_or(RegexError::Memory)?;
        let words = bits.div_ceil(64);
        // both bitsets together must stay addressable
        if words > isize::MAX as usize / 16 {
            return Err(RegexError::Memory);
        }
        let matched = if table.has_lookaround {
            vec![0u64; words]
        } else {
            Vec::new()
        };
        debug!(
            "match cache on: {} points, {} bytes",
            table.num_points,
            (words + matched.len()) * 8
        );
        Ok(MatchCache {
            failed: vec![0u64; words],
            matched,
            num_points: table.num_points,
        })
    }

    #[inline]
    fn bit(&self, point: usize, pos: usize) -> usize {
        pos * self.num_points + point
    }

    #[inline]
    fn test(bits: &[u64], i: usize) -> bool {
        bits.get(i >> 6).map_or(false, |w| w & (1u64 << (i & 63)) != 0)
    }

    #[inline]
    fn set(bits: &mut [u64], i: usize) {
        if let Some(w) = bits.get_mut(i >> 6) {
            *w |= 1u64 << (i & 63);
        }
    }

    pub(crate) fn probe(&self, entry: &CachePointEntry, point: usize, pos: usize) -> CacheProbe {
        let index = self.bit(point, pos);
        if Self::test(&self.failed, index) {
            return CacheProbe::Failed;
        }
        match entry.scope {
            CacheScope::Lookaround { end } => {
                if Self::test(&self.matched, index) {
                    CacheProbe::Matched { end }
                } else {
                    CacheProbe::Unknown {
                        index,
                        lookaround: true,
                    }
                }
            }
            _ => CacheProbe::Unknown {
                index,
                lookaround: false,
            },
        }
    }

    #[inline]
    pub(crate) fn set_failed(&mut self, index: usize) {
        Self::set(&mut self.failed, index);
    }

    #[inline]
    pub(crate) fn set_matched(&mut self, index: usize) {
        Self::set(&mut self.matched, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regcomp::ProgramBuilder;
    use crate::encodings::ONIG_ENCODING_ASCII;
    use crate::oniguruma::REPEAT_INFINITE;

    fn table(reg: &RegexType) -> &CacheTable {
        match cache_analysis(reg) {
            CacheAnalysis::Ready(t) => t,
            CacheAnalysis::Disqualified(r) => panic!("disqualified: {}", r),
        }
    }

    #[test]
    fn alternation_points_are_top_level() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.alt(|b| b.literal(b"ab"), |b| b.literal(b"ac"));
        b.star(true, |b| b.literal(b"x"));
        let reg = b.build().unwrap();
        let t = table(&reg);
        assert_eq!(t.num_points(), 2);
        assert!(onig_check_linear_time(&reg));
    }

    #[test]
    fn bounded_repeat_slots_do_not_collide() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.repeat(1, 3, true, |b| {
            b.alt(|b| b.literal(b"a"), |b| b.literal(b"b"));
        });
        let reg = b.build().unwrap();
        let t = table(&reg);
        let mut seen = std::collections::HashSet::new();
        for e in &t.entries {
            let counts: Vec<usize> = match e.outer_repeat {
                None => vec![0],
                Some(_) if reg.ops[e.op].opcode.is_repeat_inc() => vec![1, 2],
                Some(_) => vec![0, 1, 2],
            };
            for c in counts {
                let p = t.point_index(e, c).unwrap();
                assert!(seen.insert(p), "slot {} reused", p);
            }
        }
        // inner 1, lower 1, two groups of (inner + 1)
        assert_eq!(t.num_points(), 1 + 2 * 2);
    }

    #[test]
    fn infinite_repeat_collapses_upper_iterations() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.repeat(2, REPEAT_INFINITE, true, |b| {
            b.alt(|b| b.literal(b"a"), |b| b.literal(b"b"));
        });
        let reg = b.build().unwrap();
        let t = table(&reg);
        let alt = t.entries.iter().find(|e| reg.ops[e.op].opcode == OpCode::Push).unwrap();
        assert_eq!(t.point_index(alt, 5), t.point_index(alt, 2));
        assert_ne!(t.point_index(alt, 0), t.point_index(alt, 1));
    }

    #[test]
    fn backref_disqualifies() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.capture(1, |b| b.literal(b"a"));
        b.backref(1);
        let reg = b.build().unwrap();
        assert!(!onig_check_linear_time(&reg));
    }

    #[test]
    fn capture_inside_lookahead_disqualifies() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.lookahead(|b| b.capture(1, |b| b.literal(b"a")));
        let reg = b.build().unwrap();
        assert!(matches!(
            cache_analysis(&reg),
            CacheAnalysis::Disqualified("capture inside lookaround")
        ));
    }

    #[test]
    fn lookaround_points_carry_scope_end() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.negative_lookahead(|b| b.star(true, |b| b.literal(b"a")));
        let reg = b.build().unwrap();
        let t = table(&reg);
        let e = &t.entries[0];
        match e.scope {
            CacheScope::Lookaround { end } => assert_eq!(reg.ops[end].opcode, OpCode::FailPos),
            other => panic!("unexpected scope {:?}", other),
        }
    }

    #[test]
    fn bitsets_remember_per_position() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.star(true, |b| b.literal(b"a"));
        let reg = b.build().unwrap();
        let t = table(&reg);
        let mut cache = MatchCache::new(t, 10).unwrap();
        let e = t.entries[0];
        let CacheProbe::Unknown { index, .. } = cache.probe(&e, 0, 4) else {
            panic!("fresh cache must be empty");
        };
        cache.set_failed(index);
        assert_eq!(cache.probe(&e, 0, 4), CacheProbe::Failed);
        assert!(matches!(cache.probe(&e, 0, 5), CacheProbe::Unknown { .. }));
    }

    #[test]
    fn oversized_cache_is_memory_error() {
        let t = CacheTable {
            entries: Vec::new(),
            repeats: Vec::new(),
            num_points: usize::MAX / 2,
            has_lookaround: false,
        };
        assert!(matches!(MatchCache::new(&t, 8), Err(RegexError::Memory)));
    }
}

// regexec.rs - Match VM: frame stack, limits and the bytecode interpreter.
//
// match_at runs one anchored attempt of a compiled program. All
// non-determinism lives on an explicit stack of tagged frames; failing pops
// back to the last choice point and rolls captures and repeat counters back
// on the way. The search driver (regsearch.rs) calls match_at once per
// candidate start.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::trace;

use crate::error::RegexError;
use crate::oniguruma::*;
use crate::regcache::*;
use crate::regenc::*;
use crate::regint::*;

// ============================================================================
// Global Limits
// ============================================================================

static RETRY_LIMIT_IN_MATCH: AtomicU64 = AtomicU64::new(DEFAULT_RETRY_LIMIT_IN_MATCH);
static RETRY_LIMIT_IN_SEARCH: AtomicU64 = AtomicU64::new(DEFAULT_RETRY_LIMIT_IN_SEARCH);
static MATCH_STACK_LIMIT: AtomicU32 = AtomicU32::new(DEFAULT_MATCH_STACK_LIMIT_SIZE);
static TIME_LIMIT: AtomicU64 = AtomicU64::new(DEFAULT_TIME_LIMIT_MSEC);
static MATCH_CACHE_THRESHOLD: AtomicU64 = AtomicU64::new(CacheThreshold::InputLength.to_raw());

pub fn onig_set_retry_limit_in_match(n: u64) { RETRY_LIMIT_IN_MATCH.store(n, Ordering::Relaxed); }
pub fn onig_get_retry_limit_in_match() -> u64 { RETRY_LIMIT_IN_MATCH.load(Ordering::Relaxed) }
pub fn onig_set_retry_limit_in_search(n: u64) { RETRY_LIMIT_IN_SEARCH.store(n, Ordering::Relaxed); }
pub fn onig_get_retry_limit_in_search() -> u64 { RETRY_LIMIT_IN_SEARCH.load(Ordering::Relaxed) }
pub fn onig_set_match_stack_limit_size(n: u32) { MATCH_STACK_LIMIT.store(n, Ordering::Relaxed); }
pub fn onig_get_match_stack_limit_size() -> u32 { MATCH_STACK_LIMIT.load(Ordering::Relaxed) }
pub fn onig_set_time_limit(msec: u64) { TIME_LIMIT.store(msec, Ordering::Relaxed); }
pub fn onig_get_time_limit() -> u64 { TIME_LIMIT.load(Ordering::Relaxed) }
pub fn onig_set_match_cache_threshold(t: CacheThreshold) { MATCH_CACHE_THRESHOLD.store(t.to_raw(), Ordering::Relaxed); }
pub fn onig_get_match_cache_threshold() -> CacheThreshold { CacheThreshold::from_raw(MATCH_CACHE_THRESHOLD.load(Ordering::Relaxed)) }

/// When the match cache gets built during one search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheThreshold {
    /// Once the failure count exceeds the subject length.
    InputLength,
    /// Once this many failures happened; `Fails(0)` builds it at the first one.
    Fails(u64),
    /// Plain backtracking only.
    Never,
}

const RAW_INPUT_LENGTH: u64 = u64::MAX;
const RAW_NEVER: u64 = u64::MAX - 1;

impl CacheThreshold {
    const fn to_raw(self) -> u64 {
        match self {
            CacheThreshold::InputLength => RAW_INPUT_LENGTH,
            CacheThreshold::Never => RAW_NEVER,
            CacheThreshold::Fails(n) => {
                if n >= RAW_NEVER {
                    RAW_NEVER - 1
                } else {
                    n
                }
            }
        }
    }

    fn from_raw(raw: u64) -> Self {
        match raw {
            RAW_INPUT_LENGTH => CacheThreshold::InputLength,
            RAW_NEVER => CacheThreshold::Never,
            n => CacheThreshold::Fails(n),
        }
    }

    fn fail_limit(self, str_len: usize) -> Option<u64> {
        match self {
            CacheThreshold::InputLength => Some(str_len as u64 + 1),
            CacheThreshold::Fails(n) => Some(n),
            CacheThreshold::Never => None,
        }
    }
}

// ============================================================================
// MatchParam
// ============================================================================

/// Per-call overrides of the global limits.
///
/// Besides the limits it carries an optional interrupt callback, polled
/// every [`CHECK_INTERRUPT_INTERVAL`] backtracks, and a frame stack that
/// sequential calls reuse instead of allocating their own.
pub struct MatchParam<'a> {
    retry_limit_in_match: u64,
    retry_limit_in_search: u64,
    match_stack_limit: u32,
    time_limit: u64,
    cache_threshold: CacheThreshold,
    interrupt: Option<&'a dyn Fn() -> bool>,
    pub(crate) stack: MatchStack,
}

impl<'a> MatchParam<'a> {
    /// A parameter block initialized from the global settings.
    pub fn new() -> Self {
        MatchParam {
            retry_limit_in_match: onig_get_retry_limit_in_match(),
            retry_limit_in_search: onig_get_retry_limit_in_search(),
            match_stack_limit: onig_get_match_stack_limit_size(),
            time_limit: onig_get_time_limit(),
            cache_threshold: onig_get_match_cache_threshold(),
            interrupt: None,
            stack: MatchStack::new(),
        }
    }

    pub fn set_retry_limit_in_match(&mut self, n: u64) -> &mut Self {
        self.retry_limit_in_match = n;
        self
    }

    pub fn set_retry_limit_in_search(&mut self, n: u64) -> &mut Self {
        self.retry_limit_in_search = n;
        self
    }

    pub fn set_match_stack_limit_size(&mut self, n: u32) -> &mut Self {
        self.match_stack_limit = n;
        self
    }

    pub fn set_time_limit(&mut self, msec: u64) -> &mut Self {
        self.time_limit = msec;
        self
    }

    pub fn set_cache_threshold(&mut self, t: CacheThreshold) -> &mut Self {
        self.cache_threshold = t;
        self
    }

    /// Returning `true` from `f` stops the match with
    /// [`RegexError::Interrupted`].
    pub fn set_interrupt(&mut self, f: &'a dyn Fn() -> bool) -> &mut Self {
        self.interrupt = Some(f);
        self
    }

    /// Frames the reusable stack can hold without reallocating.
    pub fn stack_capacity(&self) -> usize {
        self.stack.capacity()
    }
}

impl Default for MatchParam<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Stack Types
// ============================================================================

/// Where a capture boundary currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MemPtr {
    /// Not yet matched.
    Invalid,
    /// Index of the MemStart/MemEnd frame holding the position (push variants).
    StackIdx(usize),
    /// Direct subject offset (non-push variants).
    Pos(usize),
}

/// Bytecode index of the bottom sentinel's resume point.
const FINISH_PCODE: usize = usize::MAX;

#[derive(Clone, Debug)]
enum StackEntry {
    /// Choice point: resume at `pcode` with `s` and `keep` restored.
    Alt { pcode: usize, s: usize, keep: usize },
    /// Negative lookahead scope; resuming here means the body failed.
    PosNot { pcode: usize, s: usize, keep: usize },
    /// Negative look-behind scope; resuming here means the body failed.
    LookBehindNot { pcode: usize, s: usize, keep: usize },
    /// Capture start; holds the capture table entries it replaced.
    MemStart { num: usize, pstr: usize, prev_start: MemPtr, prev_end: MemPtr },
    /// Capture end; holds the capture table entries it replaced.
    MemEnd { num: usize, pstr: usize, prev_start: MemPtr, prev_end: MemPtr },
    /// Closes a recursive capture.
    MemEndMark { num: usize },
    /// Counter of one running repeat.
    Repeat { num: usize, pcode: usize, count: usize },
    /// One increment of the Repeat frame at `si`; popping it decrements.
    RepeatInc { si: usize },
    NullCheckStart { num: usize, pstr: usize },
    NullCheckEnd { num: usize },
    /// Positive lookahead scope. Only the position is restored on exit.
    Pos { s: usize },
    /// Atomic group scope.
    StopBt,
    CallFrame { ret_addr: usize },
    Return,
    /// Saved state of a running absent operator.
    AbsentPos { abs_pstr: usize, end_pstr: usize },
    Absent,
    /// A match cache point visited at this depth.
    CachePoint { index: usize, lookaround: bool },
    /// Committed away; skipped by every pop.
    Void,
}

impl StackEntry {
    #[inline]
    fn is_choice(&self) -> bool {
        matches!(
            self,
            StackEntry::Alt { .. } | StackEntry::PosNot { .. } | StackEntry::LookBehindNot { .. }
        )
    }
}

#[derive(Clone, Debug)]
struct StackFrame {
    entry: StackEntry,
    /// Index of the nearest null-check frame at or below this one.
    null_check: usize,
}

/// Where a failing pop resumes.
#[derive(Clone, Copy, Debug)]
struct Resume {
    pcode: usize,
    s: usize,
    keep: usize,
}

/// The frames a pop-until runs to; the frame itself is popped as well.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Barrier {
    PosNot,
    LookBehindNot,
    Absent,
}

/// Outcome of a capture-aware null check.
#[derive(Clone, Copy, PartialEq, Eq)]
enum NullCheck {
    NotNull,
    Null,
    /// Empty, but a capture moved to a different empty span.
    Changed,
}

/// Backtracking stack plus the capture tables and repeat index it drives.
///
/// Kept in a [`MatchParam`] it survives between calls with its capacity.
pub struct MatchStack {
    frames: Vec<StackFrame>,
    mem_start: Vec<MemPtr>,
    mem_end: Vec<MemPtr>,
    repeat_stk: Vec<usize>,
}

impl MatchStack {
    pub fn new() -> Self {
        MatchStack {
            frames: Vec::with_capacity(INIT_MATCH_STACK_SIZE),
            mem_start: Vec::new(),
            mem_end: Vec::new(),
            repeat_stk: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.frames.capacity()
    }

    fn reset(&mut self, num_mem: usize, num_repeat: usize) {
        self.frames.clear();
        self.mem_start.clear();
        self.mem_start.resize(num_mem + 1, MemPtr::Invalid);
        self.mem_end.clear();
        self.mem_end.resize(num_mem + 1, MemPtr::Invalid);
        self.repeat_stk.clear();
        self.repeat_stk.resize(num_repeat, 0);
    }

    #[inline]
    fn push(&mut self, entry: StackEntry, limit: u32) -> Result<(), RegexError> {
        let len = self.frames.len();
        if limit != 0 && len >= limit as usize {
            return Err(RegexError::MatchStackLimitOver);
        }
        if len == self.frames.capacity() {
            trace!("match stack grows past {} frames", len);
        }
        let null_check = match entry {
            StackEntry::NullCheckStart { .. } | StackEntry::NullCheckEnd { .. } => len,
            _ => self.frames.last().map_or(0, |f| f.null_check),
        };
        self.frames.push(StackFrame { entry, null_check });
        Ok(())
    }

    #[inline]
    fn push_alt(&mut self, pcode: usize, s: usize, keep: usize, limit: u32) -> Result<(), RegexError> {
        self.push(StackEntry::Alt { pcode, s, keep }, limit)
    }

    fn push_mem_start(&mut self, num: usize, s: usize, limit: u32) -> Result<(), RegexError> {
        let idx = self.frames.len();
        self.push(
            StackEntry::MemStart {
                num,
                pstr: s,
                prev_start: self.mem_start[num],
                prev_end: self.mem_end[num],
            },
            limit,
        )?;
        self.mem_start[num] = MemPtr::StackIdx(idx);
        self.mem_end[num] = MemPtr::Invalid;
        Ok(())
    }

    fn push_mem_end(&mut self, num: usize, s: usize, limit: u32) -> Result<(), RegexError> {
        let idx = self.frames.len();
        self.push(
            StackEntry::MemEnd {
                num,
                pstr: s,
                prev_start: self.mem_start[num],
                prev_end: self.mem_end[num],
            },
            limit,
        )?;
        self.mem_end[num] = MemPtr::StackIdx(idx);
        Ok(())
    }

    #[inline]
    fn restore_mem(&mut self, num: usize, prev_start: MemPtr, prev_end: MemPtr) {
        if let (Some(start), Some(end)) = (self.mem_start.get_mut(num), self.mem_end.get_mut(num)) {
            *start = prev_start;
            *end = prev_end;
        }
    }

    #[inline]
    fn decrement_repeat(&mut self, si: usize) {
        if let Some(StackFrame {
            entry: StackEntry::Repeat { count, .. },
            ..
        }) = self.frames.get_mut(si)
        {
            *count = count.saturating_sub(1);
        }
    }

    /// Pops to the last choice point, undoing what `level` asks for.
    /// Cache points passed on the way are recorded as failed.
    fn pop(&mut self, level: StackPopLevel, mut cache: Option<&mut MatchCache>) -> Option<Resume> {
        while let Some(frame) = self.frames.pop() {
            match frame.entry {
                StackEntry::Alt { pcode, s, keep }
                | StackEntry::PosNot { pcode, s, keep }
                | StackEntry::LookBehindNot { pcode, s, keep } => {
                    return Some(Resume { pcode, s, keep });
                }
                StackEntry::MemStart {
                    num,
                    prev_start,
                    prev_end,
                    ..
                } if level >= StackPopLevel::MemStart => self.restore_mem(num, prev_start, prev_end),
                StackEntry::MemEnd {
                    num,
                    prev_start,
                    prev_end,
                    ..
                } if level == StackPopLevel::All => self.restore_mem(num, prev_start, prev_end),
                StackEntry::RepeatInc { si } if level == StackPopLevel::All => self.decrement_repeat(si),
                StackEntry::CachePoint { index, .. } => {
                    if let Some(c) = cache.as_deref_mut() {
                        c.set_failed(index);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Drops the choice pushed by the preceding `Push`, together with the
    /// cache point recorded for it.
    fn pop_one(&mut self) {
        self.frames.pop();
        if let Some(StackFrame {
            entry: StackEntry::CachePoint { .. },
            ..
        }) = self.frames.last()
        {
            self.frames.pop();
        }
    }

    /// Pops through the nearest `barrier` frame. The scope's body succeeded,
    /// so lookaround cache points on the way are recorded as matched.
    fn pop_til(&mut self, barrier: Barrier, mut cache: Option<&mut MatchCache>) -> Result<(), RegexError> {
        while let Some(frame) = self.frames.pop() {
            match frame.entry {
                StackEntry::PosNot { .. } if barrier == Barrier::PosNot => return Ok(()),
                StackEntry::LookBehindNot { .. } if barrier == Barrier::LookBehindNot => return Ok(()),
                StackEntry::Absent if barrier == Barrier::Absent => return Ok(()),
                StackEntry::MemStart {
                    num,
                    prev_start,
                    prev_end,
                    ..
                }
                | StackEntry::MemEnd {
                    num,
                    prev_start,
                    prev_end,
                    ..
                } => self.restore_mem(num, prev_start, prev_end),
                StackEntry::RepeatInc { si } => self.decrement_repeat(si),
                StackEntry::CachePoint {
                    index,
                    lookaround: true,
                } => {
                    if let Some(c) = cache.as_deref_mut() {
                        c.set_matched(index);
                    }
                }
                _ => {}
            }
        }
        Err(stack_bug())
    }

    /// Commits a positive lookahead: voids the choices above the nearest
    /// Pos frame and the frame itself, returning the saved position.
    fn void_til_pos(&mut self, mut cache: Option<&mut MatchCache>) -> Result<usize, RegexError> {
        for frame in self.frames.iter_mut().rev() {
            match frame.entry {
                StackEntry::Pos { s } => {
                    frame.entry = StackEntry::Void;
                    return Ok(s);
                }
                StackEntry::CachePoint { index, lookaround } => {
                    if lookaround {
                        if let Some(c) = cache.as_deref_mut() {
                            c.set_matched(index);
                        }
                    }
                    frame.entry = StackEntry::Void;
                }
                ref e if e.is_choice() => frame.entry = StackEntry::Void,
                _ => {}
            }
        }
        Err(stack_bug())
    }

    /// Commits an atomic group.
    fn void_til_stop_bt(&mut self) -> Result<(), RegexError> {
        for frame in self.frames.iter_mut().rev() {
            match frame.entry {
                StackEntry::StopBt => {
                    frame.entry = StackEntry::Void;
                    return Ok(());
                }
                StackEntry::CachePoint { .. } => frame.entry = StackEntry::Void,
                ref e if e.is_choice() => frame.entry = StackEntry::Void,
                _ => {}
            }
        }
        Err(stack_bug())
    }

    fn pop_absent_pos(&mut self) -> Result<(usize, usize), RegexError> {
        match self.frames.pop() {
            Some(StackFrame {
                entry: StackEntry::AbsentPos { abs_pstr, end_pstr },
                ..
            }) => Ok((abs_pstr, end_pstr)),
            _ => Err(stack_bug()),
        }
    }

    /// Abandons a running absent operator whose body matched empty at the
    /// subject start: drops its next-iteration choice, its saved state and
    /// its exit choice. Returns the restored end.
    fn abandon_absent(&mut self) -> Result<usize, RegexError> {
        match self.frames.pop().map(|f| f.entry) {
            Some(StackEntry::Alt { .. }) => {}
            _ => return Err(stack_bug()),
        }
        let (_, end) = self.pop_absent_pos()?;
        match self.frames.pop().map(|f| f.entry) {
            Some(StackEntry::Alt { .. }) => Ok(end),
            _ => Err(stack_bug()),
        }
    }

    /// Scans from the top for the NullCheckStart of `id`. With `rec`, inner
    /// NullCheckEnd frames of recursive calls are skipped level by level.
    fn find_null_check_start(&self, id: usize, rec: bool) -> Result<usize, RegexError> {
        let top = self.frames.last().ok_or_else(stack_bug)?;
        let mut level = 0usize;
        let mut k = top.null_check;
        loop {
            match self.frames.get(k).map(|f| &f.entry) {
                Some(StackEntry::NullCheckStart { num, .. }) if *num == id => {
                    if level == 0 {
                        return Ok(k);
                    }
                    level -= 1;
                }
                Some(StackEntry::NullCheckEnd { num }) if rec && *num == id => level += 1,
                Some(_) => {}
                None => return Err(stack_bug()),
            }
            if k == 0 {
                return Err(stack_bug());
            }
            k -= 1;
        }
    }

    fn null_check(&self, id: usize, s: usize) -> Result<bool, RegexError> {
        let k = self.find_null_check_start(id, false)?;
        match self.frames[k].entry {
            StackEntry::NullCheckStart { pstr, .. } => Ok(pstr == s),
            _ => Err(stack_bug()),
        }
    }

    /// Null check that also looks at the captures opened in the iteration:
    /// a capture whose previous span was non-empty makes the iteration count.
    fn null_check_memst(&self, id: usize, s: usize, rec: bool) -> Result<NullCheck, RegexError> {
        let k = self.find_null_check_start(id, rec)?;
        let StackEntry::NullCheckStart { pstr, .. } = self.frames[k].entry else {
            return Err(stack_bug());
        };
        if pstr != s {
            return Ok(NullCheck::NotNull);
        }
        let mut result = NullCheck::Null;
        for frame in &self.frames[k..] {
            if let StackEntry::MemStart {
                prev_start,
                prev_end,
                ..
            } = frame.entry
            {
                let Some(endp) = self.mem_pos(prev_end) else {
                    return Ok(NullCheck::NotNull);
                };
                if self.mem_pos(prev_start) != Some(endp) {
                    return Ok(NullCheck::NotNull);
                }
                if endp != s {
                    result = NullCheck::Changed;
                }
            }
        }
        Ok(result)
    }

    #[inline]
    fn mem_pos(&self, ptr: MemPtr) -> Option<usize> {
        match ptr {
            MemPtr::Invalid => None,
            MemPtr::Pos(pos) => Some(pos),
            MemPtr::StackIdx(i) => match self.frames.get(i)?.entry {
                StackEntry::MemStart { pstr, .. } | StackEntry::MemEnd { pstr, .. } => Some(pstr),
                _ => None,
            },
        }
    }

    /// Current span of capture `num`, if it is set.
    #[inline]
    fn capture_span(&self, num: usize) -> Option<(usize, usize)> {
        let end = self.mem_pos(*self.mem_end.get(num)?)?;
        let start = self.mem_pos(*self.mem_start.get(num)?)?;
        Some((start, end))
    }

    /// Innermost open MemStart of `num`, skipping closed recursive levels.
    fn find_mem_start(&self, num: usize) -> Option<usize> {
        let mut level = 0usize;
        for (k, frame) in self.frames.iter().enumerate().rev() {
            match frame.entry {
                StackEntry::MemEnd { num: n, .. } | StackEntry::MemEndMark { num: n } if n == num => {
                    level += 1
                }
                StackEntry::MemStart { num: n, .. } if n == num => {
                    if level == 0 {
                        return Some(k);
                    }
                    level -= 1;
                }
                _ => {}
            }
        }
        None
    }

    fn repeat_frame(&self, id: usize) -> Option<usize> {
        let si = *self.repeat_stk.get(id)?;
        match self.frames.get(si)?.entry {
            StackEntry::Repeat { num, .. } if num == id => Some(si),
            _ => None,
        }
    }

    /// Repeat frame of `id` at the current call level.
    fn find_repeat(&self, id: usize) -> Option<usize> {
        let mut level = 0i32;
        for (k, frame) in self.frames.iter().enumerate().rev() {
            match frame.entry {
                StackEntry::Repeat { num, .. } if level == 0 && num == id => return Some(k),
                StackEntry::CallFrame { .. } => level -= 1,
                StackEntry::Return => level += 1,
                _ => {}
            }
        }
        None
    }

    fn repeat_state(&self, si: usize) -> Option<(usize, usize)> {
        match self.frames.get(si)?.entry {
            StackEntry::Repeat { pcode, count, .. } => Some((pcode, count)),
            _ => None,
        }
    }

    fn set_repeat_count(&mut self, si: usize, value: usize) {
        if let Some(StackFrame {
            entry: StackEntry::Repeat { count, .. },
            ..
        }) = self.frames.get_mut(si)
        {
            *count = value;
        }
    }

    fn repeat_count(&self, id: usize) -> Option<usize> {
        self.repeat_frame(id)
            .and_then(|si| self.repeat_state(si))
            .map(|(_, count)| count)
    }

    fn return_addr(&self) -> Option<usize> {
        let mut level = 0usize;
        for frame in self.frames.iter().rev() {
            match frame.entry {
                StackEntry::CallFrame { ret_addr } => {
                    if level == 0 {
                        return Some(ret_addr);
                    }
                    level -= 1;
                }
                StackEntry::Return => level += 1,
                _ => {}
            }
        }
        None
    }

    /// Back-reference at call nesting level `nest`: the most recent
    /// occurrence at that level of any group in `ns`.
    fn nested_level_span(&self, nest: i32, ns: &[usize]) -> Option<(usize, usize)> {
        let mut level = 0i32;
        let mut pend = None;
        for frame in self.frames.iter().rev() {
            match frame.entry {
                StackEntry::CallFrame { .. } => level -= 1,
                StackEntry::Return => level += 1,
                StackEntry::MemStart { num, pstr, .. } if level == nest && ns.contains(&num) => {
                    if let Some(end) = pend {
                        return Some((pstr, end));
                    }
                }
                StackEntry::MemEnd { num, pstr, .. } if level == nest && ns.contains(&num) => {
                    pend = Some(pstr);
                }
                _ => {}
            }
        }
        None
    }

    fn fill_region(&self, reg: &RegexType, region: &mut OnigRegion, keep: usize, s: usize) {
        let num_mem = reg.num_mem;
        region.resize(num_mem as i32 + 1);
        region.beg[0] = keep.min(s) as i32;
        region.end[0] = s as i32;
        for i in 1..=num_mem {
            match self.capture_span(i) {
                Some((beg, end)) => {
                    region.beg[i] = beg as i32;
                    region.end[i] = end as i32;
                }
                None => {
                    region.beg[i] = ONIG_REGION_NOTPOS;
                    region.end[i] = ONIG_REGION_NOTPOS;
                }
            }
        }
        if reg.capture_history != 0 {
            let mut root = OnigCaptureTreeNode::new(0);
            root.beg = keep.min(s) as i32;
            root.end = s as i32;
            let mut k = 0;
            capture_history_node(reg, &self.frames, &mut k, &mut root);
            region.history_root = Some(Box::new(root));
        } else {
            region.history_root = None;
        }
    }
}

impl Default for MatchStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects the occurrences nested in `node` from the frames starting at
/// `*k`. Returns true when the MemEnd closing `node` was found; `*k` is then
/// left on it.
fn capture_history_node(
    reg: &RegexType,
    frames: &[StackFrame],
    k: &mut usize,
    node: &mut OnigCaptureTreeNode,
) -> bool {
    while *k < frames.len() {
        match frames[*k].entry {
            StackEntry::MemStart { num, pstr, .. }
                if num <= ONIG_MAX_CAPTURE_HISTORY_GROUP && mem_status_at(reg.capture_history, num) =>
            {
                let mut child = OnigCaptureTreeNode::new(num as i32);
                child.beg = pstr as i32;
                *k += 1;
                let closed = capture_history_node(reg, frames, k, &mut child);
                if closed {
                    if let StackEntry::MemEnd { pstr, .. } = frames[*k].entry {
                        child.end = pstr as i32;
                    }
                }
                node.childs.push(Box::new(child));
                if !closed {
                    return false;
                }
            }
            StackEntry::MemEnd { num, .. } if num as i32 == node.group => return true,
            _ => {}
        }
        *k += 1;
    }
    false
}

#[inline]
fn stack_bug() -> RegexError {
    RegexError::internal(ONIGERR_STACK_BUG)
}

#[inline]
fn undefined_bytecode() -> RegexError {
    RegexError::internal(ONIGERR_UNDEFINED_BYTECODE)
}

// ============================================================================
// MatchArg
// ============================================================================

struct Limits<'a> {
    retry_limit_in_match: u64,
    retry_limit_in_search: u64,
    retry_in_match: u64,
    retry_in_search: u64,
    stack_limit: u32,
    time_limit: u64,
    started: Option<Instant>,
    interrupt: Option<&'a dyn Fn() -> bool>,
    ticks: u64,
}

impl Limits<'_> {
    #[inline]
    fn on_retry(&mut self) -> Result<(), RegexError> {
        self.retry_in_match += 1;
        if self.retry_limit_in_match != 0 && self.retry_in_match > self.retry_limit_in_match {
            return Err(RegexError::RetryLimitInMatchOver);
        }
        self.retry_in_search += 1;
        if self.retry_limit_in_search != 0 && self.retry_in_search > self.retry_limit_in_search {
            return Err(RegexError::RetryLimitInSearchOver);
        }
        self.tick()
    }

    /// Polls the interrupt callback and the deadline every
    /// `CHECK_INTERRUPT_INTERVAL` calls.
    #[inline]
    fn tick(&mut self) -> Result<(), RegexError> {
        self.ticks += 1;
        if self.ticks % CHECK_INTERRUPT_INTERVAL != 0 {
            return Ok(());
        }
        if let Some(interrupt) = self.interrupt {
            if interrupt() {
                return Err(RegexError::Interrupted);
            }
        }
        if let Some(started) = self.started {
            if started.elapsed() >= Duration::from_millis(self.time_limit) {
                return Err(RegexError::TimeLimitOver);
            }
        }
        Ok(())
    }
}

enum CacheState {
    Uninit,
    Disabled,
    Active(MatchCache),
}

impl CacheState {
    #[inline]
    fn active(&mut self) -> Option<&mut MatchCache> {
        match self {
            CacheState::Active(c) => Some(c),
            _ => None,
        }
    }
}

/// State of one match or search call.
pub(crate) struct MatchArg<'a> {
    pub(crate) options: OnigOptionType,
    pub(crate) region: Option<&'a mut OnigRegion>,
    /// `\G` position.
    pub(crate) gpos: usize,
    /// Longest length seen so far under FIND_LONGEST.
    pub(crate) best_len: Option<usize>,
    pub(crate) best_s: usize,
    limits: Limits<'a>,
    stack: &'a mut MatchStack,
    cache: CacheState,
    cache_threshold: CacheThreshold,
    num_fail: u64,
}

impl<'a> MatchArg<'a> {
    pub(crate) fn new(
        reg: &RegexType,
        option: OnigOptionType,
        region: Option<&'a mut OnigRegion>,
        gpos: usize,
        param: &'a mut MatchParam<'_>,
    ) -> Self {
        let options = option | reg.options;
        let cache = if opton_find_condition(options) || param.cache_threshold == CacheThreshold::Never {
            CacheState::Disabled
        } else {
            CacheState::Uninit
        };
        MatchArg {
            options,
            region,
            gpos,
            best_len: None,
            best_s: 0,
            limits: Limits {
                retry_limit_in_match: param.retry_limit_in_match,
                retry_limit_in_search: param.retry_limit_in_search,
                retry_in_match: 0,
                retry_in_search: 0,
                stack_limit: param.match_stack_limit,
                time_limit: param.time_limit,
                started: (param.time_limit != 0).then(Instant::now),
                interrupt: param.interrupt,
                ticks: 0,
            },
            stack: &mut param.stack,
            cache,
            cache_threshold: param.cache_threshold,
            num_fail: 0,
        }
    }

    pub(crate) fn clear_region(&mut self) {
        if let Some(region) = self.region.as_deref_mut() {
            region.clear();
        }
    }
}

fn activate_cache(reg: &RegexType, str_len: usize) -> Result<CacheState, RegexError> {
    match cache_analysis(reg) {
        CacheAnalysis::Ready(table) if table.num_points() > 0 => {
            Ok(CacheState::Active(MatchCache::new(table, str_len)?))
        }
        _ => Ok(CacheState::Disabled),
    }
}

// ============================================================================
// match_at
// ============================================================================

/// Control flow out of one opcode handler.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Fail,
    Finish,
}

enum CacheStep {
    Go,
    Fail,
    /// The enclosing lookaround already succeeded from here.
    Skip(usize),
}

/// Consults the match cache at the choice opcode `p`. An unknown state gets
/// a CachePoint frame so that popping it later records the outcome.
/// `inc_count` is the post-increment counter of a repeat's own point.
#[inline]
fn cache_point(
    reg: &RegexType,
    cache: &CacheState,
    stack: &mut MatchStack,
    limit: u32,
    p: usize,
    s: usize,
    inc_count: Option<usize>,
) -> Result<CacheStep, RegexError> {
    let CacheState::Active(mc) = cache else {
        return Ok(CacheStep::Go);
    };
    let Some(CacheAnalysis::Ready(table)) = reg.cache_analysis.get() else {
        return Ok(CacheStep::Go);
    };
    let Some(entry) = table.lookup(p) else {
        return Ok(CacheStep::Go);
    };
    let count = match (inc_count, entry.outer_repeat) {
        (Some(c), _) => c,
        (None, Some(id)) => match stack.repeat_count(id) {
            Some(c) => c,
            None => return Ok(CacheStep::Go),
        },
        (None, None) => 0,
    };
    let Some(point) = table.point_index(entry, count) else {
        return Ok(CacheStep::Go);
    };
    match mc.probe(entry, point, s) {
        CacheProbe::Failed => Ok(CacheStep::Fail),
        CacheProbe::Matched { end } => Ok(CacheStep::Skip(end)),
        CacheProbe::Unknown { index, lookaround } => {
            stack.push(StackEntry::CachePoint { index, lookaround }, limit)?;
            Ok(CacheStep::Go)
        }
    }
}

#[inline]
fn jump_target(reg: &RegexType, p: usize, addr: RelAddrType) -> Result<usize, RegexError> {
    p.checked_add_signed(addr as isize)
        .filter(|&t| t < reg.ops.len())
        .ok_or_else(undefined_bytecode)
}

/// Op index after the loop-back instruction that follows an empty
/// iteration's null check.
fn skip_null_loop(reg: &RegexType, p: usize) -> Result<usize, RegexError> {
    match reg.ops.get(p + 1).map(|op| op.opcode) {
        Some(
            OpCode::Jump
            | OpCode::Push
            | OpCode::RepeatInc
            | OpCode::RepeatIncNg
            | OpCode::RepeatIncSg
            | OpCode::RepeatIncNgSg,
        ) => Ok(p + 2),
        _ => Err(RegexError::internal(ONIGERR_UNEXPECTED_BYTECODE)),
    }
}

#[inline]
fn upper_reached(range: &OnigRepeatRange, count: usize) -> bool {
    !is_infinite_repeat(range.upper) && count as i64 >= range.upper as i64
}

#[inline]
fn char_len(enc: OnigEncoding, str: &[u8], s: usize, end: usize) -> usize {
    enc.mbc_enc_len(&str[s..end])
}

#[inline]
fn is_mbc_head(enc: OnigEncoding, str: &[u8], s: usize, end: usize) -> bool {
    char_len(enc, str, s, end) != 1
}

#[inline]
fn is_word_at(enc: OnigEncoding, str: &[u8], s: usize, end: usize, ascii: bool) -> bool {
    let code = enc.mbc_to_code(&str[s..end]);
    if ascii {
        code <= ASCII_LIMIT && onigenc_is_ascii_code_word(code)
    } else {
        onigenc_is_code_word(enc, code)
    }
}

#[inline]
fn prev_char_head(enc: OnigEncoding, str: &[u8], s: usize) -> Option<usize> {
    onigenc_get_prev_char_head(enc, 0, s, str)
}

/// Newline test honoring NEWLINE_CRLF: the `\r` of `\r\n` counts, and with
/// `check_prev` the `\n` of `\r\n` does not.
fn is_newline_ex(
    enc: OnigEncoding,
    str: &[u8],
    p: usize,
    end: usize,
    options: OnigOptionType,
    check_prev: bool,
) -> bool {
    if p >= end {
        return false;
    }
    if !opton_newline_crlf(options) {
        return enc.is_mbc_newline(&str[p..end]);
    }
    let code = enc.mbc_to_code(&str[p..end]);
    if code == NEWLINE_CODE {
        if check_prev {
            if let Some(prev) = prev_char_head(enc, str, p) {
                if enc.mbc_to_code(&str[prev..end]) == 0x0d {
                    return false;
                }
            }
        }
        return true;
    }
    if code == 0x0d {
        let next = p + char_len(enc, str, p, end);
        return next < end && enc.mbc_to_code(&str[next..end]) == NEWLINE_CODE;
    }
    false
}

#[inline]
fn is_crnl(enc: OnigEncoding, str: &[u8], p: usize, end: usize) -> bool {
    if p >= end || enc.mbc_to_code(&str[p..end]) != 0x0d {
        return false;
    }
    let next = p + char_len(enc, str, p, end);
    next < end && enc.mbc_to_code(&str[next..end]) == NEWLINE_CODE
}

/// Case-insensitive comparison of `str[pstart..pend]` with the text at `s`.
/// Returns the text position after the compared characters.
fn string_cmp_ic(
    enc: OnigEncoding,
    flag: OnigCaseFoldType,
    str: &[u8],
    pstart: usize,
    pend: usize,
    s: usize,
    end: usize,
) -> Option<usize> {
    let mut buf1 = [0u8; ONIGENC_MBC_CASE_FOLD_MAXLEN];
    let mut buf2 = [0u8; ONIGENC_MBC_CASE_FOLD_MAXLEN];
    let mut p1 = pstart;
    let mut p2 = s;
    while p1 < pend {
        if p2 >= end {
            return None;
        }
        let len1 = enc.mbc_case_fold(flag, &mut p1, pend, str, &mut buf1);
        let len2 = enc.mbc_case_fold(flag, &mut p2, end, str, &mut buf2);
        if buf1[..len1] != buf2[..len2] {
            return None;
        }
    }
    Some(p2)
}

#[inline]
fn backref_at(
    enc: OnigEncoding,
    flag: OnigCaseFoldType,
    str: &[u8],
    (pstart, pend): (usize, usize),
    s: usize,
    end: usize,
    ignore_case: bool,
) -> Option<usize> {
    let n = pend.saturating_sub(pstart);
    if end.saturating_sub(s) < n {
        return None;
    }
    if ignore_case {
        string_cmp_ic(enc, flag, str, pstart, pend, s, end)
    } else if str[pstart..pstart + n] == str[s..s + n] {
        Some(s + n)
    } else {
        None
    }
}

#[inline]
fn check_mem(num: usize, num_mem: usize) -> Result<(), RegexError> {
    if num == 0 || num > num_mem {
        Err(undefined_bytecode())
    } else {
        Ok(())
    }
}

/// Runs the program anchored at `sstart` over `str` (the whole subject up to
/// its end) and returns the match length.
pub(crate) fn match_at(
    reg: &RegexType,
    str: &[u8],
    sstart: usize,
    msa: &mut MatchArg<'_>,
) -> Result<Option<usize>, RegexError> {
    let enc = reg.enc;
    let options = msa.options;
    let case_fold_flag = reg.case_fold_flag;
    let num_mem = reg.num_mem;
    let pop_level = reg.stack_pop_level;
    let limit = msa.limits.stack_limit;
    let str_len = str.len();
    let fail_limit = msa.cache_threshold.fail_limit(str_len);

    let stack: &mut MatchStack = &mut *msa.stack;
    stack.reset(num_mem, reg.num_repeat.max(reg.repeat_range.len()));
    stack.push_alt(FINISH_PCODE, sstart, sstart, limit)?;
    msa.limits.retry_in_match = 0;

    let mut p: usize = 0;
    let mut s: usize = sstart;
    let mut keep: usize = sstart;
    // narrowed while an absent operator's body runs
    let mut end: usize = str_len;
    let mut best_len: Option<usize> = None;

    loop {
        let op = reg.ops.get(p).ok_or_else(undefined_bytecode)?;
        let flow = match op.opcode {
            OpCode::Finish => Flow::Finish,

            OpCode::End => {
                let n = s.saturating_sub(sstart);
                if opton_find_not_empty(options) && n == 0 {
                    Flow::Fail
                } else {
                    if best_len.map_or(true, |b| n > b) {
                        let record = if opton_find_longest(options) {
                            if msa.best_len.map_or(true, |b| n > b) {
                                msa.best_len = Some(n);
                                msa.best_s = sstart;
                                true
                            } else {
                                false
                            }
                        } else {
                            true
                        };
                        if record {
                            best_len = Some(n);
                            if let Some(region) = msa.region.as_deref_mut() {
                                stack.fill_region(reg, region, keep, s);
                            }
                        }
                    }
                    if opton_find_longest(options) && s < end {
                        Flow::Fail
                    } else {
                        Flow::Finish
                    }
                }
            }

            // ---- literals ----
            OpCode::Exact1
            | OpCode::Exact2
            | OpCode::Exact3
            | OpCode::Exact4
            | OpCode::Exact5
            | OpCode::ExactN
            | OpCode::ExactMb2N1
            | OpCode::ExactMb2N2
            | OpCode::ExactMb2N3
            | OpCode::ExactMb2N
            | OpCode::ExactMb3N
            | OpCode::ExactMbN => {
                let OperationPayload::Exact { s: ref lit } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let n = lit.len();
                if end.saturating_sub(s) >= n && str[s..s + n] == lit[..] {
                    s += n;
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            OpCode::Exact1Ic => {
                let OperationPayload::Exact { s: ref lit } = op.payload else {
                    return Err(undefined_bytecode());
                };
                if s >= end {
                    Flow::Fail
                } else {
                    let mut buf = [0u8; ONIGENC_MBC_CASE_FOLD_MAXLEN];
                    let mut q = s;
                    let len = enc.mbc_case_fold(case_fold_flag, &mut q, end, str, &mut buf);
                    if q <= end && buf[..len] == lit[..] {
                        s = q;
                        p += 1;
                        Flow::Next
                    } else {
                        Flow::Fail
                    }
                }
            }

            OpCode::ExactNIc => {
                let OperationPayload::Exact { s: ref lit } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let mut buf = [0u8; ONIGENC_MBC_CASE_FOLD_MAXLEN];
                let mut q = s;
                let mut i = 0;
                let mut ok = true;
                while i < lit.len() {
                    if q >= end {
                        ok = false;
                        break;
                    }
                    let len = enc.mbc_case_fold(case_fold_flag, &mut q, end, str, &mut buf);
                    if lit.len() - i < len || buf[..len] != lit[i..i + len] {
                        ok = false;
                        break;
                    }
                    i += len;
                }
                if ok && q <= end {
                    s = q;
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            // ---- character classes ----
            OpCode::CClass | OpCode::CClassNot => {
                let OperationPayload::CClass { ref bsp } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let not = op.opcode == OpCode::CClassNot;
                if s >= end || bitset_at(bsp, str[s] as usize) == not {
                    Flow::Fail
                } else {
                    s += char_len(enc, str, s, end);
                    p += 1;
                    Flow::Next
                }
            }

            OpCode::CClassMb | OpCode::CClassMix | OpCode::CClassMbNot | OpCode::CClassMixNot => {
                let (bsp, mb) = match op.payload {
                    OperationPayload::CClassMb { ref mb } => (None, mb),
                    OperationPayload::CClassMix { ref bsp, ref mb } => (Some(bsp), mb),
                    _ => return Err(undefined_bytecode()),
                };
                let not = matches!(op.opcode, OpCode::CClassMbNot | OpCode::CClassMixNot);
                if s >= end {
                    Flow::Fail
                } else if is_mbc_head(enc, str, s, end) {
                    let n = char_len(enc, str, s, end);
                    let code = enc.mbc_to_code(&str[s..end]);
                    if is_in_code_range(mb, code) == not {
                        Flow::Fail
                    } else {
                        s += n;
                        p += 1;
                        Flow::Next
                    }
                } else {
                    let hit = match bsp {
                        Some(bs) => bitset_at(bs, str[s] as usize),
                        None => false,
                    };
                    if hit == not {
                        Flow::Fail
                    } else {
                        s += 1;
                        p += 1;
                        Flow::Next
                    }
                }
            }

            OpCode::AnyChar | OpCode::AnyCharMl => {
                if s >= end {
                    Flow::Fail
                } else if op.opcode == OpCode::AnyChar && is_newline_ex(enc, str, s, end, options, false) {
                    Flow::Fail
                } else {
                    s += char_len(enc, str, s, end);
                    p += 1;
                    Flow::Next
                }
            }

            OpCode::AnyCharStar
            | OpCode::AnyCharMlStar
            | OpCode::AnyCharStarPeekNext
            | OpCode::AnyCharMlStarPeekNext => {
                let multiline = matches!(op.opcode, OpCode::AnyCharMlStar | OpCode::AnyCharMlStarPeekNext);
                let peek = match op.payload {
                    OperationPayload::AnyCharStarPeekNext { c } => Some(c),
                    OperationPayload::None => None,
                    _ => return Err(undefined_bytecode()),
                };
                let mut flow = Flow::Next;
                let mut next = p + 1;
                while s < end {
                    if peek.map_or(true, |c| str[s] == c) {
                        match cache_point(reg, &msa.cache, stack, limit, p, s, None)? {
                            CacheStep::Go => stack.push_alt(p + 1, s, keep, limit)?,
                            CacheStep::Fail => {
                                flow = Flow::Fail;
                                break;
                            }
                            CacheStep::Skip(e) => {
                                next = e;
                                break;
                            }
                        }
                    }
                    if !multiline && is_newline_ex(enc, str, s, end, options, false) {
                        flow = Flow::Fail;
                        break;
                    }
                    s += char_len(enc, str, s, end);
                }
                p = next;
                flow
            }

            // ---- word ----
            OpCode::Word | OpCode::NotWord | OpCode::AsciiWord | OpCode::NotAsciiWord => {
                let ascii = matches!(op.opcode, OpCode::AsciiWord | OpCode::NotAsciiWord);
                let want = matches!(op.opcode, OpCode::Word | OpCode::AsciiWord);
                if s >= end || is_word_at(enc, str, s, end, ascii) != want {
                    Flow::Fail
                } else {
                    s += char_len(enc, str, s, end);
                    p += 1;
                    Flow::Next
                }
            }

            OpCode::WordBound
            | OpCode::NotWordBound
            | OpCode::AsciiWordBound
            | OpCode::NotAsciiWordBound => {
                let ascii = matches!(op.opcode, OpCode::AsciiWordBound | OpCode::NotAsciiWordBound);
                let at_s = s < end && is_word_at(enc, str, s, end, ascii);
                let before = match prev_char_head(enc, str, s) {
                    Some(prev) => is_word_at(enc, str, prev, end, ascii),
                    None => false,
                };
                let bound = at_s != before;
                let want = matches!(op.opcode, OpCode::WordBound | OpCode::AsciiWordBound);
                if bound == want {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            OpCode::WordBegin | OpCode::AsciiWordBegin => {
                let ascii = op.opcode == OpCode::AsciiWordBegin;
                let ok = s < end
                    && is_word_at(enc, str, s, end, ascii)
                    && prev_char_head(enc, str, s).map_or(true, |prev| !is_word_at(enc, str, prev, end, ascii));
                if ok {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            OpCode::WordEnd | OpCode::AsciiWordEnd => {
                let ascii = op.opcode == OpCode::AsciiWordEnd;
                let ok = prev_char_head(enc, str, s).map_or(false, |prev| is_word_at(enc, str, prev, end, ascii))
                    && (s >= end || !is_word_at(enc, str, s, end, ascii));
                if ok {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            // ---- anchors ----
            OpCode::BeginBuf => {
                if s == 0 && !opton_not_begin_string(options) {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            OpCode::EndBuf => {
                if s == end && !opton_not_end_string(options) {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            OpCode::BeginLine => {
                let ok = if s == 0 {
                    !opton_notbol(options)
                } else {
                    s != end
                        && prev_char_head(enc, str, s)
                            .map_or(false, |prev| enc.is_mbc_newline(&str[prev..end]))
                };
                if ok {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            OpCode::EndLine => {
                let ok = if s == end {
                    !opton_noteol(options)
                } else {
                    is_newline_ex(enc, str, s, end, options, true)
                };
                if ok {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            OpCode::SemiEndBuf => {
                let ok = if s == end {
                    !opton_noteol(options)
                } else if is_newline_ex(enc, str, s, end, options, true)
                    && s + char_len(enc, str, s, end) == end
                {
                    true
                } else if opton_newline_crlf(options) && is_crnl(enc, str, s, end) {
                    let cr = char_len(enc, str, s, end);
                    s + cr + char_len(enc, str, s + cr, end) == end
                } else {
                    false
                };
                if ok {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            OpCode::BeginPosition => {
                if s == msa.gpos && !opton_not_begin_position(options) {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            // ---- captures ----
            OpCode::MemoryStart
            | OpCode::MemoryStartPush
            | OpCode::MemoryEnd
            | OpCode::MemoryEndPush
            | OpCode::MemoryEndRec
            | OpCode::MemoryEndPushRec => {
                let OperationPayload::MemNum { num } = op.payload else {
                    return Err(undefined_bytecode());
                };
                check_mem(num, num_mem)?;
                match op.opcode {
                    OpCode::MemoryStart => {
                        stack.mem_start[num] = MemPtr::Pos(s);
                        stack.mem_end[num] = MemPtr::Invalid;
                    }
                    OpCode::MemoryStartPush => stack.push_mem_start(num, s, limit)?,
                    OpCode::MemoryEnd => stack.mem_end[num] = MemPtr::Pos(s),
                    OpCode::MemoryEndPush => stack.push_mem_end(num, s, limit)?,
                    OpCode::MemoryEndPushRec => {
                        let si = stack.find_mem_start(num).ok_or_else(stack_bug)?;
                        stack.push_mem_end(num, s, limit)?;
                        stack.mem_start[num] = MemPtr::StackIdx(si);
                    }
                    _ => {
                        stack.mem_end[num] = MemPtr::Pos(s);
                        let si = stack.find_mem_start(num).ok_or_else(stack_bug)?;
                        stack.mem_start[num] = if mem_status_at(reg.bt_mem_start, num) {
                            MemPtr::StackIdx(si)
                        } else {
                            match stack.frames[si].entry {
                                StackEntry::MemStart { pstr, .. } => MemPtr::Pos(pstr),
                                _ => return Err(stack_bug()),
                            }
                        };
                        stack.push(StackEntry::MemEndMark { num }, limit)?;
                    }
                }
                p += 1;
                Flow::Next
            }

            OpCode::Keep => {
                keep = s;
                p += 1;
                Flow::Next
            }

            // ---- back-references ----
            OpCode::Backref1 | OpCode::Backref2 | OpCode::BackrefN | OpCode::BackrefNIc => {
                let num = match (op.opcode, &op.payload) {
                    (OpCode::Backref1, _) => 1,
                    (OpCode::Backref2, _) => 2,
                    (_, OperationPayload::MemNum { num }) => *num,
                    _ => return Err(undefined_bytecode()),
                };
                let ignore_case = op.opcode == OpCode::BackrefNIc;
                let hit = if num == 0 || num > num_mem {
                    None
                } else {
                    stack
                        .capture_span(num)
                        .and_then(|span| backref_at(enc, case_fold_flag, str, span, s, end, ignore_case))
                };
                match hit {
                    Some(next) => {
                        s = next;
                        p += 1;
                        Flow::Next
                    }
                    None => Flow::Fail,
                }
            }

            OpCode::BackrefMulti | OpCode::BackrefMultiIc => {
                let OperationPayload::BackrefMulti { ref ns } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let ignore_case = op.opcode == OpCode::BackrefMultiIc;
                let hit = ns.iter().find_map(|&num| {
                    stack
                        .capture_span(num)
                        .and_then(|span| backref_at(enc, case_fold_flag, str, span, s, end, ignore_case))
                });
                match hit {
                    Some(next) => {
                        s = next;
                        p += 1;
                        Flow::Next
                    }
                    None => Flow::Fail,
                }
            }

            OpCode::BackrefWithLevel => {
                let OperationPayload::BackrefWithLevel {
                    ignore_case,
                    nest_level,
                    ref ns,
                } = op.payload
                else {
                    return Err(undefined_bytecode());
                };
                let hit = stack
                    .nested_level_span(nest_level, ns)
                    .and_then(|span| backref_at(enc, case_fold_flag, str, span, s, end, ignore_case));
                match hit {
                    Some(next) => {
                        s = next;
                        p += 1;
                        Flow::Next
                    }
                    None => Flow::Fail,
                }
            }

            OpCode::BackrefCheck => {
                let OperationPayload::BackrefMulti { ref ns } = op.payload else {
                    return Err(undefined_bytecode());
                };
                if ns.iter().any(|&num| stack.capture_span(num).is_some()) {
                    p += 1;
                    Flow::Next
                } else {
                    Flow::Fail
                }
            }

            // ---- control flow ----
            OpCode::Fail => Flow::Fail,

            OpCode::Jump => {
                let OperationPayload::Jump { addr } = op.payload else {
                    return Err(undefined_bytecode());
                };
                p = jump_target(reg, p, addr)?;
                msa.limits.tick()?;
                Flow::Next
            }

            OpCode::Push => {
                let OperationPayload::Jump { addr } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let target = jump_target(reg, p, addr)?;
                match cache_point(reg, &msa.cache, stack, limit, p, s, None)? {
                    CacheStep::Go => {
                        stack.push_alt(target, s, keep, limit)?;
                        p += 1;
                        Flow::Next
                    }
                    CacheStep::Fail => Flow::Fail,
                    CacheStep::Skip(e) => {
                        p = e;
                        Flow::Next
                    }
                }
            }

            OpCode::Pop => {
                stack.pop_one();
                msa.num_fail += 1;
                p += 1;
                Flow::Next
            }

            OpCode::PushOrJumpExact1 | OpCode::PushIfPeekNext => {
                let OperationPayload::PushOrJumpExact1 { addr, c } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let target = jump_target(reg, p, addr)?;
                if s < end && str[s] == c {
                    match cache_point(reg, &msa.cache, stack, limit, p, s, None)? {
                        CacheStep::Go => {
                            stack.push_alt(target, s, keep, limit)?;
                            p += 1;
                            Flow::Next
                        }
                        CacheStep::Fail => Flow::Fail,
                        CacheStep::Skip(e) => {
                            p = e;
                            Flow::Next
                        }
                    }
                } else {
                    p = if op.opcode == OpCode::PushOrJumpExact1 { target } else { p + 1 };
                    Flow::Next
                }
            }

            // ---- repeats ----
            OpCode::Repeat | OpCode::RepeatNg => {
                let OperationPayload::Repeat { id, addr } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let range = reg.repeat_range.get(id).ok_or_else(undefined_bytecode)?;
                let exit = jump_target(reg, p, addr)?;
                let slot = stack.repeat_stk.get_mut(id).ok_or_else(undefined_bytecode)?;
                *slot = stack.frames.len();
                stack.push(StackEntry::Repeat { num: id, pcode: p + 1, count: 0 }, limit)?;
                if range.lower == 0 {
                    match cache_point(reg, &msa.cache, stack, limit, p, s, None)? {
                        CacheStep::Go => {
                            if op.opcode == OpCode::Repeat {
                                stack.push_alt(exit, s, keep, limit)?;
                                p += 1;
                            } else {
                                stack.push_alt(p + 1, s, keep, limit)?;
                                p = exit;
                            }
                            Flow::Next
                        }
                        CacheStep::Fail => Flow::Fail,
                        CacheStep::Skip(e) => {
                            p = e;
                            Flow::Next
                        }
                    }
                } else {
                    p += 1;
                    Flow::Next
                }
            }

            OpCode::RepeatInc | OpCode::RepeatIncSg => {
                let OperationPayload::RepeatInc { id } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let range = reg.repeat_range.get(id).ok_or_else(undefined_bytecode)?;
                let si = if op.opcode == OpCode::RepeatInc {
                    stack.repeat_frame(id)
                } else {
                    stack.find_repeat(id)
                }
                .ok_or_else(stack_bug)?;
                let (body, count) = stack.repeat_state(si).ok_or_else(stack_bug)?;
                let count = count + 1;
                // the count is only committed once the cache lets the
                // iteration go ahead
                let (flow, committed) = if upper_reached(range, count) {
                    p += 1;
                    (Flow::Next, true)
                } else if count as i64 >= range.lower as i64 {
                    let step = if op.opcode == OpCode::RepeatInc {
                        cache_point(reg, &msa.cache, stack, limit, p, s, Some(count))?
                    } else {
                        CacheStep::Go
                    };
                    match step {
                        CacheStep::Go => {
                            stack.push_alt(p + 1, s, keep, limit)?;
                            p = body;
                            (Flow::Next, true)
                        }
                        CacheStep::Fail => (Flow::Fail, false),
                        CacheStep::Skip(e) => {
                            p = e;
                            (Flow::Next, false)
                        }
                    }
                } else {
                    p = body;
                    (Flow::Next, true)
                };
                if committed {
                    stack.set_repeat_count(si, count);
                    stack.push(StackEntry::RepeatInc { si }, limit)?;
                }
                msa.limits.tick()?;
                flow
            }

            OpCode::RepeatIncNg | OpCode::RepeatIncNgSg => {
                let OperationPayload::RepeatInc { id } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let range = reg.repeat_range.get(id).ok_or_else(undefined_bytecode)?;
                let si = if op.opcode == OpCode::RepeatIncNg {
                    stack.repeat_frame(id)
                } else {
                    stack.find_repeat(id)
                }
                .ok_or_else(stack_bug)?;
                let (body, count) = stack.repeat_state(si).ok_or_else(stack_bug)?;
                let count = count + 1;
                let flow = if !upper_reached(range, count) {
                    if count as i64 >= range.lower as i64 {
                        let step = if op.opcode == OpCode::RepeatIncNg {
                            cache_point(reg, &msa.cache, stack, limit, p, s, Some(count))?
                        } else {
                            CacheStep::Go
                        };
                        match step {
                            CacheStep::Go => {
                                stack.set_repeat_count(si, count);
                                stack.push(StackEntry::RepeatInc { si }, limit)?;
                                stack.push_alt(body, s, keep, limit)?;
                                p += 1;
                                Flow::Next
                            }
                            CacheStep::Fail => Flow::Fail,
                            CacheStep::Skip(e) => {
                                p = e;
                                Flow::Next
                            }
                        }
                    } else {
                        stack.set_repeat_count(si, count);
                        stack.push(StackEntry::RepeatInc { si }, limit)?;
                        p = body;
                        Flow::Next
                    }
                } else {
                    stack.set_repeat_count(si, count);
                    stack.push(StackEntry::RepeatInc { si }, limit)?;
                    p += 1;
                    Flow::Next
                };
                msa.limits.tick()?;
                flow
            }

            // ---- null checks ----
            OpCode::NullCheckStart => {
                let OperationPayload::MemNum { num } = op.payload else {
                    return Err(undefined_bytecode());
                };
                stack.push(StackEntry::NullCheckStart { num, pstr: s }, limit)?;
                p += 1;
                Flow::Next
            }

            OpCode::NullCheckEnd => {
                let OperationPayload::MemNum { num } = op.payload else {
                    return Err(undefined_bytecode());
                };
                p = if stack.null_check(num, s)? {
                    skip_null_loop(reg, p)?
                } else {
                    p + 1
                };
                Flow::Next
            }

            OpCode::NullCheckEndMemst | OpCode::NullCheckEndMemstPush => {
                let OperationPayload::MemNum { num } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let rec = op.opcode == OpCode::NullCheckEndMemstPush;
                match stack.null_check_memst(num, s, rec)? {
                    NullCheck::Changed => Flow::Fail,
                    NullCheck::Null => {
                        p = skip_null_loop(reg, p)?;
                        Flow::Next
                    }
                    NullCheck::NotNull => {
                        if rec {
                            stack.push(StackEntry::NullCheckEnd { num }, limit)?;
                        }
                        p += 1;
                        Flow::Next
                    }
                }
            }

            // ---- lookaround and atomic groups ----
            OpCode::PushPos => {
                stack.push(StackEntry::Pos { s }, limit)?;
                p += 1;
                Flow::Next
            }

            OpCode::PopPos => {
                s = stack.void_til_pos(msa.cache.active())?;
                p += 1;
                Flow::Next
            }

            OpCode::PushPosNot => {
                let OperationPayload::Jump { addr } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let target = jump_target(reg, p, addr)?;
                stack.push(StackEntry::PosNot { pcode: target, s, keep }, limit)?;
                p += 1;
                Flow::Next
            }

            OpCode::FailPos => {
                stack.pop_til(Barrier::PosNot, msa.cache.active())?;
                Flow::Fail
            }

            OpCode::PushStopBt => {
                stack.push(StackEntry::StopBt, limit)?;
                p += 1;
                Flow::Next
            }

            OpCode::PopStopBt => {
                stack.void_til_stop_bt()?;
                p += 1;
                Flow::Next
            }

            OpCode::LookBehind => {
                let OperationPayload::LookBehind { len } = op.payload else {
                    return Err(undefined_bytecode());
                };
                match onigenc_step_back(enc, 0, s, str, len) {
                    Some(q) => {
                        s = q;
                        p += 1;
                        Flow::Next
                    }
                    None => Flow::Fail,
                }
            }

            OpCode::PushLookBehindNot => {
                let OperationPayload::PushLookBehindNot { addr, len } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let target = jump_target(reg, p, addr)?;
                match onigenc_step_back(enc, 0, s, str, len) {
                    // too little text behind: the assertion holds
                    None => p = target,
                    Some(q) => {
                        stack.push(StackEntry::LookBehindNot { pcode: target, s, keep }, limit)?;
                        s = q;
                        p += 1;
                    }
                }
                Flow::Next
            }

            OpCode::FailLookBehindNot => {
                stack.pop_til(Barrier::LookBehindNot, msa.cache.active())?;
                Flow::Fail
            }

            // ---- absent operator ----
            OpCode::PushAbsentPos => {
                stack.push(StackEntry::AbsentPos { abs_pstr: s, end_pstr: end }, limit)?;
                p += 1;
                Flow::Next
            }

            OpCode::Absent => {
                let OperationPayload::Jump { addr } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let exit = jump_target(reg, p, addr)?;
                let aend = end;
                let (absent, saved_end) = stack.pop_absent_pos()?;
                end = saved_end;
                if absent > aend && s > absent {
                    // the body matched empty at its start point: never match
                    match stack.pop(pop_level, msa.cache.active()) {
                        Some(r) if r.pcode == FINISH_PCODE => Flow::Finish,
                        Some(_) => Flow::Fail,
                        None => return Err(stack_bug()),
                    }
                } else if s >= aend && s > absent {
                    if s > aend {
                        Flow::Fail
                    } else {
                        p = exit;
                        Flow::Next
                    }
                } else if s == end {
                    p = exit;
                    Flow::Next
                } else {
                    stack.push_alt(exit, s, keep, limit)?;
                    let n = char_len(enc, str, s, end);
                    stack.push(StackEntry::AbsentPos { abs_pstr: absent, end_pstr: end }, limit)?;
                    stack.push_alt(p, s + n, keep, limit)?;
                    stack.push(StackEntry::Absent, limit)?;
                    end = aend;
                    p += 1;
                    Flow::Next
                }
            }

            OpCode::AbsentEnd => match prev_char_head(enc, str, s) {
                Some(prev) => {
                    if prev < end {
                        end = prev;
                    }
                    stack.pop_til(Barrier::Absent, msa.cache.active())?;
                    Flow::Fail
                }
                None => {
                    stack.pop_til(Barrier::Absent, msa.cache.active())?;
                    end = stack.abandon_absent()?;
                    Flow::Fail
                }
            },

            // ---- subexpression calls ----
            OpCode::Call => {
                let OperationPayload::Call { addr } = op.payload else {
                    return Err(undefined_bytecode());
                };
                if addr >= reg.ops.len() {
                    return Err(undefined_bytecode());
                }
                stack.push(StackEntry::CallFrame { ret_addr: p + 1 }, limit)?;
                p = addr;
                Flow::Next
            }

            OpCode::Return => {
                p = stack.return_addr().ok_or_else(stack_bug)?;
                stack.push(StackEntry::Return, limit)?;
                Flow::Next
            }

            OpCode::Condition => {
                let OperationPayload::Condition { mem, addr } = op.payload else {
                    return Err(undefined_bytecode());
                };
                let unset = mem > num_mem || stack.capture_span(mem).is_none();
                p = if unset { jump_target(reg, p, addr)? } else { p + 1 };
                Flow::Next
            }
        };

        match flow {
            Flow::Next => {}
            Flow::Finish => break,
            Flow::Fail => {
                msa.limits.on_retry()?;
                msa.num_fail += 1;
                if matches!(msa.cache, CacheState::Uninit) && fail_limit.map_or(false, |t| msa.num_fail >= t) {
                    msa.cache = activate_cache(reg, str_len)?;
                }
                let resume = stack.pop(pop_level, msa.cache.active()).ok_or_else(stack_bug)?;
                if resume.pcode == FINISH_PCODE {
                    break;
                }
                p = resume.pcode;
                s = resume.s;
                keep = resume.keep;
            }
        }
    }

    Ok(best_len)
}

// ============================================================================
// onig_match
// ============================================================================

/// Matches `reg` anchored at `at` within `str[..end]`.
///
/// Returns the end offset of the match, `Ok(None)` on mismatch. `region`
/// receives the captures on success and is cleared otherwise.
pub fn onig_match(
    reg: &RegexType,
    str: &[u8],
    end: usize,
    at: usize,
    region: Option<&mut OnigRegion>,
    option: OnigOptionType,
) -> Result<Option<usize>, RegexError> {
    let mut param = MatchParam::new();
    onig_match_with_param(reg, str, end, at, region, option, &mut param)
}

/// [`onig_match`] with per-call limits, cache threshold, interrupt and a
/// reusable frame stack.
pub fn onig_match_with_param(
    reg: &RegexType,
    str: &[u8],
    end: usize,
    at: usize,
    mut region: Option<&mut OnigRegion>,
    option: OnigOptionType,
    param: &mut MatchParam<'_>,
) -> Result<Option<usize>, RegexError> {
    if end > str.len() {
        return Err(RegexError::InvalidArgument);
    }
    let str = &str[..end];
    if let Some(r) = region.as_deref_mut() {
        r.resize_clear(reg.num_mem as i32 + 1);
    }
    if at > end {
        return Ok(None);
    }
    if opton_check_validity_of_string(option | reg.options) {
        if let Some(pos) = first_invalid_position(reg.enc, str) {
            return Err(RegexError::invalid_string(pos));
        }
    }

    let mut msa = MatchArg::new(reg, option, region, at, param);
    match match_at(reg, str, at, &mut msa) {
        Ok(Some(n)) => Ok(Some(at + n)),
        Ok(None) => {
            msa.clear_region();
            Ok(None)
        }
        Err(e) => {
            msa.clear_region();
            Err(e)
        }
    }
}

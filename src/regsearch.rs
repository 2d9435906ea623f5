// regsearch.rs - Search driver.
//
// Finds the leftmost (or, backwards, rightmost) start offset at which the
// VM matches. Anchors collapse the candidate range up front; a required
// literal or byte map skips straight to viable windows before the VM is
// run at all.

use log::trace;
use memchr::memchr;

use crate::error::RegexError;
use crate::oniguruma::*;
use crate::regcomp::backward_skip;
use crate::regenc::*;
use crate::regexec::{match_at, MatchArg, MatchParam};
use crate::regint::*;

// ============================================================================
// Literal scanners
// ============================================================================

/// First occurrence of `target` starting before `range`.
fn slow_search(enc: OnigEncoding, target: &[u8], str: &[u8], from: usize, range: usize) -> Option<usize> {
    let end = str.len();
    let tlen = target.len();
    if end < tlen {
        return None;
    }
    let limit = (end - tlen + 1).min(range);
    let mut s = from;
    if onigenc_is_singlebyte(enc) || onigenc_is_unicode_encoding(enc) {
        // a lead byte never occurs inside another character
        while s < limit {
            let c = s + memchr(target[0], &str[s..limit])?;
            if &str[c..c + tlen] == target {
                return Some(c);
            }
            s = c + 1;
        }
    } else {
        while s < limit {
            if &str[s..s + tlen] == target {
                return Some(s);
            }
            s += enclen(enc, str, s);
        }
    }
    None
}

/// Whether the text at `p` folds to exactly `target` before `end`.
fn fold_match(enc: OnigEncoding, flag: OnigCaseFoldType, target: &[u8], str: &[u8], p: usize, end: usize) -> bool {
    let mut buf = [0u8; ONIGENC_MBC_CASE_FOLD_MAXLEN];
    let mut t = 0;
    let mut q = p;
    while t < target.len() {
        if q >= end {
            return false;
        }
        let n = enc.mbc_case_fold(flag, &mut q, end, str, &mut buf);
        if t + n > target.len() || buf[..n] != target[t..t + n] {
            return false;
        }
        t += n;
    }
    true
}

fn slow_search_ic(reg: &RegexType, str: &[u8], from: usize, range: usize) -> Option<usize> {
    let enc = reg.enc;
    let end = str.len();
    let limit = range.min(end);
    let mut s = from;
    while s < limit {
        if fold_match(enc, reg.case_fold_flag, &reg.exact, str, s, end) {
            return Some(s);
        }
        s += enclen(enc, str, s);
    }
    None
}

/// Sunday quick search; windows may only start at character heads, which
/// any byte offset is for the encodings this is selected for.
fn bm_search(reg: &RegexType, str: &[u8], from: usize, range: usize, ignore_case: bool) -> Option<usize> {
    let target = &reg.exact;
    let end = str.len();
    let tail = target.len() - 1;
    let stop = (range + tail).min(end);
    let mut s = from + tail;
    while s < stop {
        let window = s - tail;
        let hit = if ignore_case {
            fold_match(reg.enc, reg.case_fold_flag, target, str, window, s + 1)
        } else {
            &str[window..=s] == target.as_slice()
        };
        if hit {
            return Some(window);
        }
        if s + 1 >= stop {
            break;
        }
        s += reg.bm_skip[str[s + 1] as usize];
    }
    None
}

/// Sunday quick search that re-aligns every shift to a character head.
fn bm_search_notrev(reg: &RegexType, str: &[u8], from: usize, range: usize, ignore_case: bool) -> Option<usize> {
    let enc = reg.enc;
    let target = &reg.exact;
    let end = str.len();
    let tail = target.len() - 1;
    let stop = if range + tail > end { end.checked_sub(tail)? } else { range };
    let mut s = from;
    while s < stop {
        let se = s + tail;
        let hit = if ignore_case {
            fold_match(enc, reg.case_fold_flag, target, str, s, se + 1)
        } else {
            &str[s..=se] == target.as_slice()
        };
        if hit {
            return Some(s);
        }
        if s + 1 >= stop || se + 1 >= end {
            break;
        }
        let skip = reg.bm_skip[str[se + 1] as usize];
        let t = s;
        loop {
            s += enclen(enc, str, s);
            if s - t >= skip || s >= stop {
                break;
            }
        }
    }
    None
}

fn map_search(enc: OnigEncoding, map: &[u8; CHAR_MAP_SIZE], str: &[u8], from: usize, range: usize) -> Option<usize> {
    let mut s = from;
    let limit = range.min(str.len());
    while s < limit {
        if map[str[s] as usize] != 0 {
            return Some(s);
        }
        s += enclen(enc, str, s);
    }
    None
}

fn prev_head(enc: OnigEncoding, adj: usize, s: usize, str: &[u8]) -> Option<usize> {
    onigenc_get_prev_char_head(enc, adj, s, str)
}

/// Rightmost occurrence of `target` at or before `from` and not before
/// `lower`.
fn slow_search_backward(
    reg: &RegexType,
    str: &[u8],
    lower: usize,
    adj: usize,
    from: usize,
    ignore_case: bool,
) -> Option<usize> {
    let enc = reg.enc;
    let target = &reg.exact;
    let end = str.len();
    let mut s = if ignore_case {
        from.min(end.checked_sub(1)?)
    } else {
        let last = end.checked_sub(target.len())?;
        if last > from {
            from
        } else {
            enc.left_adjust_char_head(adj, last, str)
        }
    };
    loop {
        if s < lower {
            return None;
        }
        let hit = if ignore_case {
            fold_match(enc, reg.case_fold_flag, target, str, s, end)
        } else {
            str[s..].starts_with(target)
        };
        if hit {
            return Some(s);
        }
        s = prev_head(enc, adj, s, str)?;
    }
}

/// Backward Boyer-Moore over a window of at least
/// [`BM_BACKWARD_SEARCH_LENGTH_THRESHOLD`] bytes.
fn bm_search_backward(reg: &RegexType, str: &[u8], lower: usize, adj: usize, from: usize) -> Option<usize> {
    let enc = reg.enc;
    let target = &reg.exact;
    let skip = reg.int_map_backward.get_or_init(|| backward_skip(target));
    let end = str.len();
    let last = end.checked_sub(target.len())?;
    let mut s = if from < last {
        from
    } else {
        enc.left_adjust_char_head(adj, last, str)
    };
    loop {
        if s < lower {
            return None;
        }
        if str[s..].starts_with(target) {
            return Some(s);
        }
        s = s.checked_sub(skip[str[s] as usize])?;
        if s < lower {
            return None;
        }
        s = enc.left_adjust_char_head(adj, s, str);
    }
}

fn map_search_backward(reg: &RegexType, str: &[u8], lower: usize, adj: usize, from: usize) -> Option<usize> {
    let mut s = from;
    loop {
        if s < lower {
            return None;
        }
        if s < str.len() && reg.map[str[s] as usize] != 0 {
            return Some(s);
        }
        s = prev_head(reg.enc, adj, s, str)?;
    }
}

// ============================================================================
// Candidate windows
// ============================================================================

/// Byte length of the literal hit at `p`, for the end-line sub-anchor.
fn hit_len(reg: &RegexType, str: &[u8], p: usize) -> Option<usize> {
    match reg.optimize {
        OptimizeType::Exact | OptimizeType::ExactBm | OptimizeType::ExactBmNotRev => Some(reg.exact.len()),
        OptimizeType::Map if p < str.len() => Some(enclen(reg.enc, str, p)),
        _ => None,
    }
}

/// Whether a line boundary sits where the sub-anchor asks for one: a line
/// start before the hit, a line end right after it.
fn sub_anchor_ok(reg: &RegexType, str: &[u8], p: usize) -> bool {
    let enc = reg.enc;
    if reg.sub_anchor & ANCR_BEGIN_LINE != 0 {
        if let Some(prev) = prev_head(enc, 0, p, str) {
            if !enc.is_mbc_newline(&str[prev..]) {
                return false;
            }
        }
    }
    if reg.sub_anchor & ANCR_END_LINE != 0 {
        if let Some(n) = hit_len(reg, str, p) {
            let q = p + n;
            if q < str.len() && !enc.is_mbc_newline(&str[q..]) {
                return false;
            }
        }
    }
    true
}

/// Locates the next literal hit from `s` and turns it into the range of
/// match starts `(low, high)` that can reach it.
fn forward_search_range(reg: &RegexType, str: &[u8], s: usize, range: usize) -> Option<(usize, usize)> {
    let enc = reg.enc;
    let end = str.len();
    let dmin = reg.dmin as usize;
    let mut p = s;
    if dmin > 0 {
        if onigenc_is_singlebyte(enc) {
            p += dmin;
        } else {
            let q = p + dmin;
            if q >= end {
                return None;
            }
            while p < q {
                p += enclen(enc, str, p);
            }
        }
    }

    loop {
        if p > end {
            return None;
        }
        let found = match reg.optimize {
            OptimizeType::None => return Some((s, range)),
            OptimizeType::Exact => slow_search(enc, &reg.exact, str, p, range),
            OptimizeType::ExactIc => slow_search_ic(reg, str, p, range),
            OptimizeType::ExactBm => bm_search(reg, str, p, range, false),
            OptimizeType::ExactBmIc => bm_search(reg, str, p, range, true),
            OptimizeType::ExactBmNotRev => bm_search_notrev(reg, str, p, range, false),
            OptimizeType::ExactBmNotRevIc => bm_search_notrev(reg, str, p, range, true),
            OptimizeType::Map => map_search(enc, &reg.map, str, p, range),
        };
        p = match found {
            Some(p) if p < range => p,
            _ => return None,
        };

        if p < s + dmin || !sub_anchor_ok(reg, str, p) {
            if p >= end {
                return None;
            }
            p += enclen(enc, str, p);
            continue;
        }

        let low = if reg.dmax == 0 {
            p
        } else if reg.dmax == INFINITE_LEN {
            s
        } else {
            let dmax = reg.dmax as usize;
            if p < dmax {
                0
            } else if p - dmax > s {
                onigenc_get_right_adjust_char_head(enc, s, p - dmax, str)
            } else {
                p - dmax
            }
        };
        let high = p - dmin;
        trace!("literal hit at {}, starts {}..={}", p, low, high);
        return Some((low, high));
    }
}

fn backward_search_range(
    reg: &RegexType,
    str: &[u8],
    s: usize,
    range: usize,
    adjrange: usize,
) -> Option<(usize, usize)> {
    let enc = reg.enc;
    let end = str.len();
    let dmin = reg.dmin as usize;
    let lower = range + dmin;
    let mut p = s;

    loop {
        let found = match reg.optimize {
            OptimizeType::None => return Some((range, s)),
            OptimizeType::Exact => slow_search_backward(reg, str, lower, adjrange, p, false),
            OptimizeType::ExactIc | OptimizeType::ExactBmIc | OptimizeType::ExactBmNotRevIc => {
                slow_search_backward(reg, str, lower, adjrange, p, true)
            }
            OptimizeType::ExactBm | OptimizeType::ExactBmNotRev => {
                if p.saturating_sub(range) < BM_BACKWARD_SEARCH_LENGTH_THRESHOLD {
                    slow_search_backward(reg, str, lower, adjrange, p, false)
                } else {
                    bm_search_backward(reg, str, lower, adjrange, p)
                }
            }
            OptimizeType::Map => map_search_backward(reg, str, lower, adjrange, p),
        };
        p = found?;

        if !sub_anchor_ok(reg, str, p) {
            p = prev_head(enc, adjrange, p, str)?;
            continue;
        }

        let high = onigenc_get_right_adjust_char_head(enc, adjrange, p - dmin, str).min(end);
        let low = if reg.dmax == INFINITE_LEN {
            0
        } else {
            p.saturating_sub(reg.dmax as usize)
        };
        return Some((low, high));
    }
}

// ============================================================================
// Anchors
// ============================================================================

/// Search range for a program that can only match at its first start
/// candidate (or at `gpos` when that lies inside the range).
fn begin_position_range(start: usize, range: usize, gpos: usize) -> (usize, usize) {
    if range <= start {
        return (start, start);
    }
    let range = if gpos <= start {
        start + 1
    } else if gpos < range {
        gpos + 1
    } else {
        range
    };
    (start, range)
}

/// Narrows `[start, range]` from the program's anchors; `None` when no
/// start can match.
fn collapse_anchor(reg: &RegexType, str: &[u8], start: usize, range: usize, gpos: usize) -> Option<(usize, usize)> {
    let enc = reg.enc;
    let end = str.len();
    let anchor = reg.anchor;

    if anchor & ANCR_BEGIN_POSITION != 0 {
        return Some(begin_position_range(start, range, gpos));
    }

    if anchor & ANCR_BEGIN_BUF != 0 {
        return if range > start {
            (start == 0).then_some((0, 1))
        } else if range == 0 {
            Some((0, 0))
        } else {
            None
        };
    }

    let (min_semi_end, max_semi_end) = if anchor & ANCR_END_BUF != 0 {
        (end, end)
    } else if anchor & ANCR_SEMI_END_BUF != 0 {
        match onigenc_step_back(enc, 0, end, str, 1) {
            Some(pre_end) if enc.is_mbc_newline(&str[pre_end..]) => {
                if pre_end > 0 && start <= pre_end {
                    (pre_end, end)
                } else {
                    return Some((start, range));
                }
            }
            _ => (end, end),
        }
    } else if anchor & ANCR_ANYCHAR_STAR_ML != 0 {
        // a multiline `.*` head matches from the first start or not at all
        return Some(begin_position_range(start, range, gpos));
    } else {
        return Some((start, range));
    };

    let dmin = reg.anchor_dmin as usize;
    if max_semi_end < dmin {
        return None;
    }
    let (mut start, mut range) = (start, range);
    if range > start {
        if reg.anchor_dmax != INFINITE_LEN && min_semi_end - start > reg.anchor_dmax as usize {
            start = min_semi_end - reg.anchor_dmax as usize;
            if start < end {
                start = onigenc_get_right_adjust_char_head(enc, 0, start, str);
            }
        }
        if max_semi_end - (range - 1) < dmin {
            range = max_semi_end - dmin + 1;
        }
        if start > range {
            return None;
        }
    } else {
        if reg.anchor_dmax != INFINITE_LEN && min_semi_end.saturating_sub(range) > reg.anchor_dmax as usize {
            range = min_semi_end - reg.anchor_dmax as usize;
        }
        if max_semi_end - start < dmin {
            start = enc.left_adjust_char_head(0, max_semi_end - dmin, str);
        }
        if range > start {
            return None;
        }
    }
    Some((start, range))
}

// ============================================================================
// Driver
// ============================================================================

/// Runs the VM at `s`. True when the search is over: a match outside
/// find-longest mode.
#[inline]
fn try_at(reg: &RegexType, str: &[u8], s: usize, msa: &mut MatchArg<'_>) -> Result<bool, RegexError> {
    Ok(match_at(reg, str, s, msa)?.is_some() && !opton_find_longest(msa.options))
}

fn forward(
    reg: &RegexType,
    str: &[u8],
    start: usize,
    range: usize,
    msa: &mut MatchArg<'_>,
) -> Result<Option<usize>, RegexError> {
    let enc = reg.enc;
    let end = str.len();
    let mut s = start;

    if reg.optimize != OptimizeType::None {
        if end - start < reg.threshold_len {
            return Ok(None);
        }
        let sch_range = if reg.dmax == 0 {
            range
        } else if reg.dmax == INFINITE_LEN {
            end
        } else {
            (range + reg.dmax as usize).min(end)
        };

        if reg.dmax != INFINITE_LEN {
            loop {
                let Some((low, high)) = forward_search_range(reg, str, s, sch_range) else {
                    return Ok(None);
                };
                s = s.max(low);
                let high = high.min(range);
                while s <= high {
                    if try_at(reg, str, s, msa)? {
                        return Ok(Some(s));
                    }
                    if s >= end {
                        return Ok(None);
                    }
                    s += enclen(enc, str, s);
                }
                if s >= range {
                    return Ok(None);
                }
            }
        }
        if forward_search_range(reg, str, s, sch_range).is_none() {
            return Ok(None);
        }
    }

    // a failed `.*` start rules out the rest of its line; `range` itself
    // is still a candidate
    let skip_line = reg.anchor & ANCR_ANYCHAR_STAR != 0
        && reg.anchor & (ANCR_LOOK_BEHIND | ANCR_PREC_READ_NOT) == 0;
    loop {
        if try_at(reg, str, s, msa)? {
            return Ok(Some(s));
        }
        if s >= range {
            return Ok(None);
        }
        let mut prev = s;
        s += enclen(enc, str, s);
        if skip_line {
            while s < range && !enc.is_mbc_newline(&str[prev..]) {
                prev = s;
                s += enclen(enc, str, s);
            }
        }
    }
}

fn backward(
    reg: &RegexType,
    str: &[u8],
    start: usize,
    range: usize,
    msa: &mut MatchArg<'_>,
) -> Result<Option<usize>, RegexError> {
    let enc = reg.enc;
    let end = str.len();
    let mut s = start;

    if reg.optimize != OptimizeType::None {
        let adjrange = if range < end {
            enc.left_adjust_char_head(0, range, str)
        } else {
            end
        };
        if end - range < reg.threshold_len {
            return Ok(None);
        }
        if reg.dmax != INFINITE_LEN {
            loop {
                let sch_start = (s + reg.dmax as usize).min(end);
                let Some((low, high)) = backward_search_range(reg, str, sch_start, range, adjrange) else {
                    return Ok(None);
                };
                s = s.min(high);
                let mut cur = Some(s);
                while let Some(c) = cur.filter(|&c| c >= low) {
                    if try_at(reg, str, c, msa)? {
                        return Ok(Some(c));
                    }
                    cur = prev_head(enc, 0, c, str);
                }
                match cur {
                    Some(c) if c >= range => s = c,
                    _ => return Ok(None),
                }
            }
        }
        let sch_start = if reg.dmax == 0 { s } else { end };
        if backward_search_range(reg, str, sch_start, range, adjrange).is_none() {
            return Ok(None);
        }
    }

    let mut cur = Some(s);
    while let Some(c) = cur.filter(|&c| c >= range) {
        if try_at(reg, str, c, msa)? {
            return Ok(Some(c));
        }
        cur = prev_head(enc, 0, c, str);
    }
    Ok(None)
}

fn drive(
    reg: &RegexType,
    str: &[u8],
    start: usize,
    range: usize,
    gpos: usize,
    msa: &mut MatchArg<'_>,
) -> Result<Option<usize>, RegexError> {
    let end = str.len();
    let (start, range) = if reg.anchor != 0 && end > 0 {
        match collapse_anchor(reg, str, start, range, gpos) {
            Some(r) => r,
            None => return Ok(None),
        }
    } else if end == 0 {
        if reg.threshold_len != 0 {
            return Ok(None);
        }
        return Ok(try_at(reg, str, 0, msa)?.then_some(0));
    } else {
        (start, range)
    };
    trace!(
        "search {:?} from {} to {} (anchor {:#x}, dmin {}, dmax {})",
        reg.optimize,
        start,
        range,
        reg.anchor,
        reg.dmin,
        reg.dmax
    );

    if range > start {
        forward(reg, str, start, range, msa)
    } else {
        backward(reg, str, start, range, msa)
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Searches `str[..end]` for a match starting in `start..=range`
/// (`range < start` searches backwards) and returns the match start.
pub fn onig_search(
    reg: &RegexType,
    str: &[u8],
    end: usize,
    start: usize,
    range: usize,
    region: Option<&mut OnigRegion>,
    option: OnigOptionType,
) -> Result<Option<usize>, RegexError> {
    let mut param = MatchParam::new();
    onig_search_gpos_with_param(reg, str, end, start, start, range, region, option, &mut param)
}

pub fn onig_search_with_param(
    reg: &RegexType,
    str: &[u8],
    end: usize,
    start: usize,
    range: usize,
    region: Option<&mut OnigRegion>,
    option: OnigOptionType,
    param: &mut MatchParam<'_>,
) -> Result<Option<usize>, RegexError> {
    onig_search_gpos_with_param(reg, str, end, start, start, range, region, option, param)
}

/// Like [`onig_search`], with `\G` anchored at `global_pos`.
pub fn onig_search_gpos(
    reg: &RegexType,
    str: &[u8],
    end: usize,
    global_pos: usize,
    start: usize,
    range: usize,
    region: Option<&mut OnigRegion>,
    option: OnigOptionType,
) -> Result<Option<usize>, RegexError> {
    let mut param = MatchParam::new();
    onig_search_gpos_with_param(reg, str, end, global_pos, start, range, region, option, &mut param)
}

pub fn onig_search_gpos_with_param(
    reg: &RegexType,
    str: &[u8],
    end: usize,
    global_pos: usize,
    start: usize,
    range: usize,
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
    if start > end {
        return Ok(None);
    }
    let range = range.min(end);
    if opton_check_validity_of_string(option | reg.options) {
        if let Some(pos) = first_invalid_position(reg.enc, str) {
            return Err(RegexError::invalid_string(pos));
        }
    }

    let mut msa = MatchArg::new(reg, option, region, global_pos, param);
    let r = match drive(reg, str, start, range, global_pos, &mut msa) {
        Ok(None) if opton_find_longest(msa.options) && msa.best_len.is_some() => Ok(Some(msa.best_s)),
        r => r,
    };
    if !matches!(r, Ok(Some(_))) {
        msa.clear_region();
    }
    r
}

/// Calls `callback(index, start, region)` for each successive match in
/// `str[..end]`. An empty match moves the next search one character on.
/// Returns the number of matches, or the first non-zero callback result.
pub fn onig_scan<F>(
    reg: &RegexType,
    str: &[u8],
    end: usize,
    region: &mut OnigRegion,
    option: OnigOptionType,
    mut callback: F,
) -> Result<i32, RegexError>
where
    F: FnMut(usize, usize, &OnigRegion) -> i32,
{
    if end > str.len() {
        return Err(RegexError::InvalidArgument);
    }
    let mut param = MatchParam::new();
    let mut n = 0;
    let mut start = 0;
    loop {
        let Some(at) =
            onig_search_gpos_with_param(reg, str, end, start, start, end, Some(&mut *region), option, &mut param)?
        else {
            break;
        };
        let rs = callback(n, at, region);
        n += 1;
        if rs != 0 {
            return Ok(rs);
        }
        let match_end = region.pos(0).map_or(at, |(_, e)| e);
        start = if match_end == at {
            if at >= end {
                break;
            }
            at + enclen(reg.enc, &str[..end], at)
        } else {
            match_end
        };
        if start > end {
            break;
        }
    }
    Ok(n as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encodings::{ONIG_ENCODING_ASCII, ONIG_ENCODING_UTF8};
    use crate::regcomp::ProgramBuilder;

    fn search(reg: &RegexType, s: &[u8], start: usize, range: usize) -> Option<(usize, usize)> {
        let mut region = OnigRegion::new();
        onig_search(reg, s, s.len(), start, range, Some(&mut region), ONIG_OPTION_NONE)
            .unwrap()
            .map(|at| (at, region.pos(0).unwrap().1))
    }

    fn literal(lit: &[u8], optimize: bool) -> RegexType {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
        b.literal(lit);
        if optimize {
            b.set_exact(lit, 0, 0);
        }
        b.build().unwrap()
    }

    #[test]
    fn literal_strategies_agree_with_plain_scan() {
        let text = b"the quick brown fox jumps over the lazy dog, said the fox";
        for lit in [&b"fox"[..], b"th", b"lazy dog", b"cat"] {
            let plain = literal(lit, false);
            let fast = literal(lit, true);
            assert_eq!(search(&plain, text, 0, text.len()), search(&fast, text, 0, text.len()), "{:?}", lit);
            assert_eq!(search(&plain, text, 20, text.len()), search(&fast, text, 20, text.len()));
        }
    }

    #[test]
    fn backward_search_finds_rightmost() {
        let text = b"fox fox fox";
        for optimize in [false, true] {
            let reg = literal(b"fox", optimize);
            assert_eq!(search(&reg, text, text.len(), 0), Some((8, 11)));
            assert_eq!(search(&reg, text, 7, 0), Some((4, 7)));
        }
    }

    #[test]
    fn backward_boyer_moore_on_long_window() {
        let mut text = vec![b'x'; 300];
        text[37..41].copy_from_slice(b"abcd");
        text[250..254].copy_from_slice(b"abcd");
        let reg = literal(b"abcd", true);
        assert_eq!(reg.optimize, OptimizeType::ExactBm);
        assert_eq!(search(&reg, &text, 300, 0), Some((250, 254)));
        assert_eq!(search(&reg, &text, 249, 0), Some((37, 41)));
    }

    #[test]
    fn distance_bounds_locate_match_start() {
        // [0-9]+px with "px" 1.. bytes after the start
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.plus(true, |b| b.class(b"0123456789"));
        b.literal(b"px");
        b.set_exact(b"px", 1, INFINITE_LEN);
        let reg = b.build().unwrap();
        assert_eq!(search(&reg, b"width: 120px;", 0, 13), Some((7, 12)));
        assert_eq!(search(&reg, b"width: px;", 0, 10), None);
    }

    #[test]
    fn begin_buf_anchor_collapses_range() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.begin_buf();
        b.literal(b"ab");
        b.set_anchor(ANCR_BEGIN_BUF);
        let reg = b.build().unwrap();
        assert_eq!(search(&reg, b"abab", 0, 4), Some((0, 2)));
        assert_eq!(search(&reg, b"abab", 1, 4), None);
    }

    #[test]
    fn end_buf_anchor_with_distance() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.literal(b"ab");
        b.end_buf();
        b.set_anchor(ANCR_END_BUF);
        b.set_anchor_dist(2, 2);
        let reg = b.build().unwrap();
        assert_eq!(search(&reg, b"ababab", 0, 6), Some((4, 6)));
        assert_eq!(search(&reg, b"ababa", 0, 5), None);
    }

    #[test]
    fn map_skips_to_candidate_bytes() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.class(b"xyz");
        b.set_map(b"xyz", 0, 0);
        let reg = b.build().unwrap();
        assert_eq!(search(&reg, b"aaaay", 0, 5), Some((4, 5)));
        assert_eq!(search(&reg, b"yaaaa", 5, 0), Some((0, 1)));
    }

    #[test]
    fn empty_input_matches_empty_pattern() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.star(true, |b| b.literal(b"a"));
        let reg = b.build().unwrap();
        assert_eq!(search(&reg, b"", 0, 0), Some((0, 0)));
    }

    #[test]
    fn start_past_end_is_a_mismatch() {
        let reg = literal(b"a", false);
        assert_eq!(onig_search(&reg, b"aaa", 3, 4, 3, None, ONIG_OPTION_NONE), Ok(None));
        assert_eq!(onig_search(&reg, b"aaa", 3, 0, 99, None, ONIG_OPTION_NONE), Ok(Some(0)));
    }

    #[test]
    fn gpos_anchors_begin_position() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.begin_position();
        b.literal(b"b");
        let reg = b.build().unwrap();
        let s = b"abab";
        assert_eq!(onig_search_gpos(&reg, s, 4, 3, 0, 4, None, ONIG_OPTION_NONE), Ok(Some(3)));
        assert_eq!(onig_search_gpos(&reg, s, 4, 2, 0, 4, None, ONIG_OPTION_NONE), Ok(None));
    }

    #[test]
    fn find_longest_keeps_best_start() {
        // a|bcd|bc
        let mut b = ProgramBuilder::with_options(&ONIG_ENCODING_ASCII, ONIG_OPTION_FIND_LONGEST);
        b.alternation(&[
            &|b: &mut ProgramBuilder| b.literal(b"a"),
            &|b: &mut ProgramBuilder| b.literal(b"bcd"),
            &|b: &mut ProgramBuilder| b.literal(b"bc"),
        ]);
        let reg = b.build().unwrap();
        assert_eq!(search(&reg, b"xa bcd", 0, 6), Some((3, 6)));
    }

    #[test]
    fn scan_advances_past_empty_matches() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.star(true, |b| b.literal(b"a"));
        let reg = b.build().unwrap();
        let mut region = OnigRegion::new();
        let mut seen = Vec::new();
        let n = onig_scan(&reg, b"baab", 4, &mut region, ONIG_OPTION_NONE, |i, at, r| {
            seen.push((i, at, r.pos(0).unwrap().1));
            0
        })
        .unwrap();
        assert_eq!(n, 4);
        assert_eq!(seen, vec![(0, 0, 0), (1, 1, 3), (2, 3, 3), (3, 4, 4)]);
    }

    #[test]
    fn scan_stops_on_callback_result() {
        let reg = literal(b"a", false);
        let mut region = OnigRegion::new();
        let r = onig_scan(&reg, b"aaaa", 4, &mut region, ONIG_OPTION_NONE, |i, _, _| if i == 1 { 7 } else { 0 });
        assert_eq!(r, Ok(7));
    }

    #[test]
    fn case_insensitive_literal_search() {
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_UTF8);
        b.literal_ic(b"CAT");
        b.set_exact_ic(b"CAT", 0, 0);
        let reg = b.build().unwrap();
        assert_eq!(search(&reg, b"a cat sat", 0, 9), Some((2, 5)));
        assert_eq!(search(&reg, b"A CaT", 0, 5), Some((2, 5)));
    }

    #[test]
    fn begin_position_range_narrows_to_one_start() {
        assert_eq!(begin_position_range(0, 10, 0), (0, 1));
        assert_eq!(begin_position_range(0, 10, 4), (0, 5));
        assert_eq!(begin_position_range(0, 10, 12), (0, 10));
        assert_eq!(begin_position_range(5, 2, 0), (5, 5));
    }

    #[test]
    fn buffer_anchor_outranks_multiline_anychar_star() {
        // \A(?m:.*)b
        let mut b = ProgramBuilder::with_options(&ONIG_ENCODING_ASCII, ONIG_OPTION_MULTILINE);
        b.begin_buf();
        b.any_char_star();
        b.literal(b"b");
        b.set_anchor(ANCR_BEGIN_BUF | ANCR_ANYCHAR_STAR_ML);
        let reg = b.build().unwrap();
        let text = b"a\nb";
        assert_eq!(collapse_anchor(&reg, text, 0, 3, 0), Some((0, 1)));
        assert_eq!(collapse_anchor(&reg, text, 2, 3, 0), None);
        assert_eq!(search(&reg, text, 0, 3), Some((0, 3)));
        assert_eq!(search(&reg, text, 2, 3), None);

        let mut b = ProgramBuilder::with_options(&ONIG_ENCODING_ASCII, ONIG_OPTION_MULTILINE);
        b.any_char_star();
        b.literal(b"b");
        b.set_anchor(ANCR_ANYCHAR_STAR_ML);
        let reg = b.build().unwrap();
        assert_eq!(collapse_anchor(&reg, text, 2, 3, 0), Some((2, 3)));
        assert_eq!(search(&reg, text, 2, 3), Some((2, 3)));
    }

    #[test]
    fn line_skip_still_tries_range_end() {
        // .*b: the failed start at 0 skips to the next line, which begins
        // exactly at the last candidate
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.any_char_star();
        b.literal(b"b");
        b.set_anchor(ANCR_ANYCHAR_STAR);
        let reg = b.build().unwrap();
        assert_eq!(search(&reg, b"a\nb", 0, 2), Some((2, 3)));
        assert_eq!(search(&reg, b"ax\nzb", 0, 3), Some((3, 5)));

        // ^b walks every start; no line skip applies
        let mut b = ProgramBuilder::new(&ONIG_ENCODING_ASCII);
        b.begin_line();
        b.literal(b"b");
        b.set_anchor(ANCR_BEGIN_LINE);
        let reg = b.build().unwrap();
        assert_eq!(search(&reg, b"ab\nb", 0, 4), Some((3, 4)));
        assert_eq!(search(&reg, b"ab\nb", 0, 2), None);
    }
}

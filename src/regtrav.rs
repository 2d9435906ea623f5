// regtrav.rs - Capture history queries.
//
// A region's history tree holds one node per recorded occurrence of a
// group, nested the way the occurrences nested in the subject.

use crate::oniguruma::*;
use crate::regint::*;

fn walk<F>(node: &OnigCaptureTreeNode, at: i32, level: i32, callback: &mut F) -> i32
where
    F: FnMut(i32, i32, i32, i32, i32) -> i32,
{
    let visit = |callback: &mut F, when: i32| {
        if at & when != 0 {
            callback(node.group, node.beg, node.end, level, when)
        } else {
            0
        }
    };
    let r = visit(callback, ONIG_TRAVERSE_CALLBACK_AT_FIRST);
    if r != 0 {
        return r;
    }
    for child in &node.childs {
        let r = walk(child, at, level + 1, callback);
        if r != 0 {
            return r;
        }
    }
    visit(callback, ONIG_TRAVERSE_CALLBACK_AT_LAST)
}

/// Walks the capture history depth-first.
///
/// `callback(group, beg, end, level, at)` runs before a node's children
/// when `at` has `ONIG_TRAVERSE_CALLBACK_AT_FIRST`, after them with
/// `ONIG_TRAVERSE_CALLBACK_AT_LAST`. A non-zero result ends the walk and
/// is returned.
pub fn onig_capture_tree_traverse<F>(region: &OnigRegion, at: i32, mut callback: F) -> i32
where
    F: FnMut(i32, i32, i32, i32, i32) -> i32,
{
    match region.history_root.as_deref() {
        Some(root) => walk(root, at, 0, &mut callback),
        None => 0,
    }
}

/// Number of groups whose occurrences are recorded.
pub fn onig_number_of_capture_histories(reg: &RegexType) -> usize {
    (1..=ONIG_MAX_CAPTURE_HISTORY_GROUP)
        .filter(|&n| mem_status_at(reg.capture_history, n))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(group: i32, beg: i32, end: i32, childs: Vec<OnigCaptureTreeNode>) -> OnigCaptureTreeNode {
        let mut n = OnigCaptureTreeNode::new(group);
        n.beg = beg;
        n.end = end;
        n.childs = childs.into_iter().map(Box::new).collect();
        n
    }

    fn sample() -> OnigRegion {
        let mut region = OnigRegion::new();
        region.history_root = Some(Box::new(node(
            0,
            0,
            4,
            vec![node(1, 0, 2, vec![node(2, 1, 2, vec![])]), node(1, 2, 4, vec![])],
        )));
        region
    }

    #[test]
    fn visits_in_both_orders() {
        let region = sample();
        let mut seen = Vec::new();
        let r = onig_capture_tree_traverse(&region, ONIG_TRAVERSE_CALLBACK_AT_BOTH, |g, b, _, lvl, at| {
            seen.push((g, b, lvl, at));
            0
        });
        assert_eq!(r, 0);
        let first = ONIG_TRAVERSE_CALLBACK_AT_FIRST;
        let last = ONIG_TRAVERSE_CALLBACK_AT_LAST;
        assert_eq!(
            seen,
            vec![
                (0, 0, 0, first),
                (1, 0, 1, first),
                (2, 1, 2, first),
                (2, 1, 2, last),
                (1, 0, 1, last),
                (1, 2, 1, first),
                (1, 2, 1, last),
                (0, 0, 0, last),
            ]
        );
    }

    #[test]
    fn nonzero_result_stops_walk() {
        let region = sample();
        let mut calls = 0;
        let r = onig_capture_tree_traverse(&region, ONIG_TRAVERSE_CALLBACK_AT_FIRST, |g, _, _, _, _| {
            calls += 1;
            if g == 2 {
                -5
            } else {
                0
            }
        });
        assert_eq!(r, -5);
        assert_eq!(calls, 3);
    }

    #[test]
    fn empty_region_has_nothing_to_walk() {
        let region = OnigRegion::new();
        assert_eq!(onig_capture_tree_traverse(&region, ONIG_TRAVERSE_CALLBACK_AT_BOTH, |_, _, _, _, _| 1), 0);
    }
}

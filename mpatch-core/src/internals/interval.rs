//! Interval Resolution
//!
//! A slot's chain of patches is an undo log, newest first. When replaying it, a newer patch must win over an older
//! one wherever their ranges overlap, and an older patch entirely covered by newer ones is obsolete.
//!
//! The resolution uses an ephemeral interval tree, recording which fragments of memory were already claimed by the
//! patches visited so far: a binary search tree keyed by the low bound of each fragment, with each node tracking the
//! highest bound within its sub-tree.
//!
//! The tree is rebuilt for each chain, within a scratch area of nodes provided by the caller; no allocation occurs.

use core::cmp;

use log::trace;

use crate::{Address, Error, Range};

const NONE: u32 = u32::MAX;

/// A node of the interval tree.
///
/// Exposed so that the scratch area can be declared by the user, typically as a static array.
#[derive(Clone, Copy, Debug)]
pub struct IntervalNode {
    low: Address,
    high: Address,
    max_high: Address,
    left: u32,
    right: u32,
}

impl IntervalNode {
    /// An unused node.
    pub const EMPTY: IntervalNode = IntervalNode { low: 0, high: 0, max_high: 0, left: NONE, right: NONE };

    fn leaf(range: Range) -> Self {
        Self { low: range.low(), high: range.high(), max_high: range.high(), left: NONE, right: NONE }
    }

    fn range(&self) -> Range { Range::between(self.low, self.high) }
}

impl Default for IntervalNode {
    fn default() -> Self { Self::EMPTY }
}

/// IntervalTree
pub(crate) struct IntervalTree<'a> {
    nodes: &'a mut [IntervalNode],
    len: usize,
    root: u32,
}

impl<'a> IntervalTree<'a> {
    /// Creates an empty tree, using `nodes` as storage.
    pub(crate) fn new(nodes: &'a mut [IntervalNode]) -> Self { Self { nodes, len: 0, root: NONE } }

    /// Returns the number of fragments recorded.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize { self.len }

    /// Returns a recorded fragment overlapping `range`, if any.
    pub(crate) fn find_overlap(&self, range: Range) -> Option<Range> {
        let mut current = self.root;

        while current != NONE {
            let node = &self.nodes[current as usize];

            if node.low <= range.high() && range.low() <= node.high {
                return Some(node.range());
            }

            //  If the left sub-tree reaches `range.low()` yet does not overlap, then neither does the right sub-tree,
            //  as all its fragments start after those of the left sub-tree.
            current = match node.left {
                left if left != NONE && self.nodes[left as usize].max_high >= range.low() => left,
                _ => node.right,
            };
        }

        None
    }

    /// Records `range`.
    pub(crate) fn insert(&mut self, range: Range) -> Result<(), Error> {
        if self.len == self.nodes.len() {
            return Err(Error::ScratchExhausted);
        }

        let index = self.len as u32;

        self.nodes[self.len] = IntervalNode::leaf(range);
        self.len += 1;

        if self.root == NONE {
            self.root = index;
            return Ok(());
        }

        let mut current = self.root;

        loop {
            let node = &mut self.nodes[current as usize];
            node.max_high = cmp::max(node.max_high, range.high());

            let next = if range.low() < node.low { &mut node.left } else { &mut node.right };

            if *next == NONE {
                *next = index;
                return Ok(());
            }

            current = *next;
        }
    }

    /// Resolves `range` against the recorded fragments.
    ///
    /// Each sub-range of `range` not yet recorded is passed to `emit`, then recorded. Returns whether any such
    /// sub-range exists; if not, whatever `range` designates is entirely shadowed.
    pub(crate) fn resolve<F>(&mut self, range: Range, emit: &mut F) -> Result<bool, Error>
        where
            F: FnMut(Range) -> Result<(), Error>
    {
        let covered = match self.find_overlap(range) {
            Some(covered) => covered,
            None => {
                trace!("Fragment {:?} applies", range);

                emit(range)?;
                self.insert(range)?;

                return Ok(true);
            }
        };

        let mut contributed = false;

        if range.low() < covered.low() {
            contributed |= self.resolve(Range::between(range.low(), covered.low() - 1), emit)?;
        }

        if range.high() > covered.high() {
            contributed |= self.resolve(Range::between(covered.high() + 1, range.high()), emit)?;
        }

        Ok(contributed)
    }
}

#[cfg(test)]
mod tests {

use std::vec::Vec;

use super::*;

fn range(low: Address, high: Address) -> Range { Range::new(low, high).unwrap() }

//  Resolves each range in turn, newest first, returning (contributed, fragments) per range.
fn resolve_all(ranges: &[Range]) -> Vec<(bool, Vec<Range>)> {
    let mut nodes = [IntervalNode::EMPTY; 64];
    let mut tree = IntervalTree::new(&mut nodes);

    ranges.iter()
        .map(|range| {
            let mut fragments = Vec::new();
            let contributed = tree.resolve(*range, &mut |fragment| { fragments.push(fragment); Ok(()) }).unwrap();
            fragments.sort_by_key(|r| r.low());
            (contributed, fragments)
        })
        .collect()
}

#[test]
fn interval_tree_find_overlap() {
    let mut nodes = [IntervalNode::EMPTY; 8];
    let mut tree = IntervalTree::new(&mut nodes);

    tree.insert(range(50, 59)).unwrap();
    tree.insert(range(10, 19)).unwrap();
    tree.insert(range(90, 99)).unwrap();
    tree.insert(range(30, 39)).unwrap();

    assert_eq!(4, tree.len());

    assert_eq!(None, tree.find_overlap(range(20, 29)));
    assert_eq!(None, tree.find_overlap(range(60, 89)));
    assert_eq!(Some(range(30, 39)), tree.find_overlap(range(25, 30)));
    assert_eq!(Some(range(10, 19)), tree.find_overlap(range(19, 19)));
    assert_eq!(Some(range(90, 99)), tree.find_overlap(range(99, 120)));
}

#[test]
fn interval_tree_insert_exhausted() {
    let mut nodes = [IntervalNode::EMPTY; 2];
    let mut tree = IntervalTree::new(&mut nodes);

    tree.insert(range(1, 2)).unwrap();
    tree.insert(range(3, 4)).unwrap();

    assert_eq!(Err(Error::ScratchExhausted), tree.insert(range(5, 6)));
}

#[test]
fn interval_tree_resolve_disjoint() {
    let results = resolve_all(&[range(10, 19), range(20, 29)]);

    assert_eq!((true, vec_of(&[range(10, 19)])), results[0]);
    assert_eq!((true, vec_of(&[range(20, 29)])), results[1]);
}

#[test]
fn interval_tree_resolve_sub_range() {
    //  Newer covers a sub-range of the older.
    let results = resolve_all(&[range(0, 50), range(0, 99)]);

    assert_eq!((true, vec_of(&[range(51, 99)])), results[1]);
}

#[test]
fn interval_tree_resolve_super_range() {
    //  Newer covers the whole older: obsolete.
    let results = resolve_all(&[range(0, 99), range(20, 30)]);

    assert_eq!((false, vec_of(&[])), results[1]);
}

#[test]
fn interval_tree_resolve_exact_match() {
    //  Ties go to the newest, visited first.
    let results = resolve_all(&[range(20, 30), range(20, 30)]);

    assert_eq!((true, vec_of(&[range(20, 30)])), results[0]);
    assert_eq!((false, vec_of(&[])), results[1]);
}

#[test]
fn interval_tree_resolve_split() {
    //  Newer sits in the middle of the older: the older is split in 2.
    let results = resolve_all(&[range(40, 59), range(0, 99)]);

    assert_eq!((true, vec_of(&[range(0, 39), range(60, 99)])), results[1]);
}

#[test]
fn interval_tree_resolve_multiple_holes() {
    let results = resolve_all(&[range(10, 19), range(30, 39), range(50, 59), range(0, 69), range(0, 69)]);

    assert_eq!(
        (true, vec_of(&[range(0, 9), range(20, 29), range(40, 49), range(60, 69)])),
        results[3]
    );
    assert_eq!((false, vec_of(&[])), results[4]);
}

#[test]
fn interval_tree_resolve_partial_overlaps() {
    let results = resolve_all(&[range(20, 39), range(10, 29), range(30, 49)]);

    assert_eq!((true, vec_of(&[range(10, 19)])), results[1]);
    assert_eq!((true, vec_of(&[range(40, 49)])), results[2]);
}

#[test]
fn interval_tree_resolve_emit_failure() {
    let mut nodes = [IntervalNode::EMPTY; 4];
    let mut tree = IntervalTree::new(&mut nodes);

    let result = tree.resolve(range(1, 9), &mut |_| Err(Error::CorruptChain(3)));

    assert_eq!(Err(Error::CorruptChain(3)), result);
    assert_eq!(None, tree.find_overlap(range(1, 9)));
}

fn vec_of(ranges: &[Range]) -> Vec<Range> { ranges.to_vec() }

} // mod tests

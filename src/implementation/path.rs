// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The per-worker recomputation stack: the series of branchings from the
//! root down to the current frontier, with just enough stored clones that
//! any live entry can be reconstructed in bounded work.

use std::sync::Arc;

use crate::abstraction::{BranchingDesc, Space};

struct Entry {
    desc: Arc<dyn BranchingDesc>,
    /// The alternative of `desc` this entry currently stands for.
    alt: u32,
    /// Present only at entries chosen by the copying-distance or
    /// adaptive-distance policy; `None` elsewhere.
    clone: Option<Box<dyn Space>>,
}

#[derive(Default)]
pub(crate) struct Path {
    entries: Vec<Entry>,
}

impl Path {
    pub(crate) fn new() -> Self {
        Path { entries: Vec::new() }
    }

    /// Number of live entries.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Approximate memory footprint, in path-entry units: one unit per
    /// entry, plus one per stored clone.
    pub(crate) fn size(&self) -> usize {
        self.entries.len() + self.entries.iter().filter(|e| e.clone.is_some()).count()
    }

    /// Record the branching just committed at the frontier. `clone` is
    /// `Some` exactly when the copying-distance policy decided to pay for a
    /// snapshot at this depth.
    pub(crate) fn push(&mut self, desc: Arc<dyn BranchingDesc>, clone: Option<Box<dyn Space>>) {
        self.entries.push(Entry { desc, alt: 0, clone });
    }

    /// Advance to the next untried alternative, popping exhausted entries.
    /// Returns `false` when the path becomes empty (nothing left to try).
    pub(crate) fn next(&mut self) -> bool {
        while let Some(top) = self.entries.last_mut() {
            top.alt += 1;
            if top.alt < top.desc.alternatives() {
                return true;
            }
            self.entries.pop();
        }
        false
    }

    /// Cheap, lock-free-readable summary: does any entry have an untried
    /// sibling alternative a thief could take?
    pub(crate) fn has_stealable(&self) -> bool {
        self.entries.iter().any(|e| e.alt + 1 < e.desc.alternatives())
    }

    /// Claim the shallowest untried sibling alternative for a thief. Returns
    /// the sub-path the thief needs to recompute that alternative (sharing
    /// branching descriptions and cloning stored snapshots) together with
    /// its depth. Returns `None` if no entry currently has an untried
    /// sibling.
    pub(crate) fn steal(&mut self) -> Option<(Path, usize)> {
        let idx = self.entries.iter().position(|e| e.alt + 1 < e.desc.alternatives())?;
        self.entries[idx].alt += 1;

        let stolen = self.entries[..=idx]
            .iter()
            .map(|e| Entry {
                desc: Arc::clone(&e.desc),
                alt: e.alt,
                clone: e.clone.as_ref().map(|c| c.clone_space(true)),
            })
            .collect();

        Some((Path { entries: stolen }, idx))
    }

    /// Drop every entry and the clones it owns.
    pub(crate) fn reset(&mut self) {
        self.entries.clear();
    }

    /// Rebuild the current frontier node. Starts from the nearest ancestor
    /// entry that carries a clone and replays `commit` forward. `d` is reset
    /// to 0 whenever this materializes a fresh frontier. If `best` is
    /// supplied, every entry at index >= `mark` is constrained against it
    /// while replaying (entries below `mark` are already known to be
    /// constrained, per the path's own invariant). If the adaptive distance
    /// `a_d` is exceeded by this replay, a clone is stored at the midpoint
    /// to bound future recomputation cost.
    pub(crate) fn recompute(
        &mut self,
        d: &mut usize,
        a_d: usize,
        best: Option<&dyn Space>,
        mark: usize,
    ) -> Box<dyn Space> {
        let start = self
            .entries
            .iter()
            .rposition(|e| e.clone.is_some())
            .expect("path has no stored clone to recompute from");

        // `entries[start].clone` is a snapshot taken *before* that entry's
        // own alternative was committed, so replay begins at `start`, not
        // `start + 1`.
        let steps = self.entries.len() - start;
        let midpoint = start + steps / 2;

        let mut cur = self.entries[start].clone.as_ref().unwrap().clone_space(true);

        for i in start..self.entries.len() {
            if let Some(best) = best {
                if i >= mark {
                    cur.constrain(best);
                }
            }
            cur.commit(self.entries[i].desc.as_ref(), self.entries[i].alt);
            if steps > a_d && i == midpoint && self.entries[i].clone.is_none() {
                self.entries[i].clone = Some(cur.clone_space(false));
            }
        }

        *d = 0;
        cur
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_path {
    use super::*;
    use std::any::Any;
    use crate::abstraction::Status;
    use crate::common::WorkerStatistics;

    struct BinaryDesc;
    impl BranchingDesc for BinaryDesc {
        fn alternatives(&self) -> u32 {
            2
        }
    }

    /// A node identified by the bit string of alternatives taken from the
    /// root. Branches down to `depth_limit`, then is always solved.
    #[derive(Clone)]
    struct Counter {
        bits: Vec<u32>,
        depth_limit: usize,
    }
    impl Space for Counter {
        fn status(&mut self, _stats: &mut WorkerStatistics) -> Status {
            if self.bits.len() >= self.depth_limit {
                Status::Solved
            } else {
                Status::Branch
            }
        }
        fn clone_space(&self, _share: bool) -> Box<dyn Space> {
            Box::new(self.clone())
        }
        fn constrain(&mut self, _best: &dyn Space) {}
        fn commit(&mut self, _desc: &dyn BranchingDesc, alternative: u32) {
            self.bits.push(alternative);
        }
        fn description(&mut self) -> Arc<dyn BranchingDesc> {
            Arc::new(BinaryDesc)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn root() -> Box<dyn Space> {
        Box::new(Counter { bits: vec![], depth_limit: 3 })
    }

    #[test]
    fn next_pops_exhausted_entries_and_reports_empty() {
        let mut path = Path::new();
        path.push(Arc::new(BinaryDesc), Some(root()));
        assert!(path.next()); // alt 0 -> 1
        assert!(!path.next()); // alt 1 -> 2, exhausted, pop -> empty
        assert_eq!(0, path.len());
    }

    #[test]
    fn has_stealable_reflects_untried_siblings() {
        let mut path = Path::new();
        path.push(Arc::new(BinaryDesc), Some(root()));
        assert!(path.has_stealable());
        let (_, _) = path.steal().unwrap();
        assert!(!path.has_stealable());
    }

    #[test]
    fn steal_returns_none_when_nothing_to_take() {
        let mut path = Path::new();
        assert!(path.steal().is_none());
    }

    #[test]
    fn recompute_replays_commits_from_nearest_clone() {
        let mut path = Path::new();
        path.push(Arc::new(BinaryDesc), Some(root()));
        path.push(Arc::new(BinaryDesc), None);

        let mut d = 2;
        let frontier = path.recompute(&mut d, 100, None, 0);
        assert_eq!(0, d);
        let counter = (&*frontier as &dyn Any).downcast_ref::<Counter>().unwrap();
        assert_eq!(vec![0, 0], counter.bits);
    }

    #[test]
    fn steal_produces_an_independently_recomputable_path() {
        let mut path = Path::new();
        path.push(Arc::new(BinaryDesc), Some(root()));
        path.push(Arc::new(BinaryDesc), None);

        let (mut stolen, depth) = path.steal().unwrap();
        assert_eq!(0, depth);

        let mut d = 0;
        let frontier = stolen.recompute(&mut d, 100, None, 0);
        let counter = (&*frontier as &dyn Any).downcast_ref::<Counter>().unwrap();
        assert_eq!(vec![1], counter.bits);
    }

    #[test]
    fn reset_drops_all_entries() {
        let mut path = Path::new();
        path.push(Arc::new(BinaryDesc), Some(root()));
        path.push(Arc::new(BinaryDesc), None);
        path.reset();
        assert_eq!(0, path.len());
        assert!(!path.has_stealable());
    }

    #[test]
    fn size_counts_entries_and_clones() {
        let mut path = Path::new();
        path.push(Arc::new(BinaryDesc), Some(root()));
        path.push(Arc::new(BinaryDesc), None);
        assert_eq!(3, path.size()); // 2 entries + 1 clone
    }
}

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

//! This module defines the plain data types shared by every part of the
//! engine: the tunable [`Options`], and the [`WorkerStatistics`] /
//! [`Statistics`] counters.

use std::fmt;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// --- STATISTICS ---------------------------------------------------------------
// ----------------------------------------------------------------------------

/// Per-worker counters, updated as that worker explores its subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatistics {
    /// Number of [`Status::Branch`](crate::Status::Branch) nodes committed.
    pub nodes: u64,
    /// Number of [`Status::Failed`](crate::Status::Failed) nodes reached.
    pub failed: u64,
    /// Number of [`Status::Solved`](crate::Status::Solved) nodes reached
    /// (including ones later dropped by constraint under a better bound).
    pub solved: u64,
    /// Current depth of this worker's recomputation path.
    pub depth: usize,
    /// Approximate memory footprint of this worker's recomputation path, in
    /// path-entry units (not bytes).
    pub memory: usize,
}

/// Aggregate counters across all workers, as returned by [`Engine::statistics`](crate::Engine::statistics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Total branch nodes committed across all workers.
    pub nodes: u64,
    /// Total failed nodes across all workers.
    pub failed: u64,
    /// Total solved nodes across all workers.
    pub solved: u64,
    /// Total path memory footprint across all workers.
    pub memory: usize,
}

impl Statistics {
    pub(crate) fn accumulate(&mut self, worker: &WorkerStatistics) {
        self.nodes += worker.nodes;
        self.failed += worker.failed;
        self.solved += worker.solved;
        self.memory += worker.memory;
    }
}

// ----------------------------------------------------------------------------
// --- OPTIONS ------------------------------------------------------------------
// ----------------------------------------------------------------------------

/// An externally supplied predicate consulted by every worker before it
/// expands a node. `stats` is the worker's own counters so far, `path_depth`
/// is the size of its current recomputation path. Returning `true` makes the
/// worker surface a stop condition to the engine.
pub type StopPredicate = dyn Fn(&WorkerStatistics, usize) -> bool + Send + Sync;

/// Tunables consumed by the engine. There is no configuration-file or
/// environment-variable layer here: an embedding application builds an
/// `Options` value with typed constructor arguments, same as it would build
/// any other in-process value.
#[derive(Clone)]
pub struct Options {
    /// Number of worker threads.
    pub threads: usize,
    /// Copying distance: the maximum number of path entries between two
    /// entries that store a clone.
    pub c_d: usize,
    /// Adaptive distance: the maximum recomputation traversal length before
    /// a midpoint clone is materialized.
    pub a_d: usize,
    /// Consulted before each node expansion; see [`StopPredicate`].
    pub stop: Arc<StopPredicate>,
}

impl Options {
    /// Default options: one worker thread per hardware thread, `c_d = 8`,
    /// `a_d = 2`, and a stop predicate that never triggers.
    pub fn new() -> Self {
        Self::custom(num_cpus::get())
    }

    /// Like [`Options::new`], but with an explicit thread count.
    pub fn custom(threads: usize) -> Self {
        Options {
            threads: threads.max(1),
            c_d: 8,
            a_d: 2,
            stop: Arc::new(|_, _| false),
        }
    }

    /// Overrides the copying/adaptive recomputation distances.
    pub fn with_recomputation(mut self, c_d: usize, a_d: usize) -> Self {
        self.c_d = c_d.max(1);
        self.a_d = a_d.max(1);
        self
    }

    /// Overrides the stop predicate.
    pub fn with_stop<F>(mut self, stop: F) -> Self
    where
        F: Fn(&WorkerStatistics, usize) -> bool + Send + Sync + 'static,
    {
        self.stop = Arc::new(stop);
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("threads", &self.threads)
            .field("c_d", &self.c_d)
            .field("a_d", &self.a_d)
            .finish()
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_options {
    use super::*;

    #[test]
    fn default_never_stops() {
        let opts = Options::new();
        let stats = WorkerStatistics::default();
        assert!(!(opts.stop)(&stats, 0));
    }

    #[test]
    fn custom_clamps_zero_threads_to_one() {
        let opts = Options::custom(0);
        assert_eq!(1, opts.threads);
    }

    #[test]
    fn with_recomputation_overrides_distances() {
        let opts = Options::new().with_recomputation(4, 1);
        assert_eq!(4, opts.c_d);
        assert_eq!(1, opts.a_d);
    }

    #[test]
    fn with_stop_is_honored() {
        let opts = Options::new().with_stop(|stats, _depth| stats.nodes >= 10);
        let mut stats = WorkerStatistics::default();
        assert!(!(opts.stop)(&stats, 0));
        stats.nodes = 10;
        assert!((opts.stop)(&stats, 0));
    }

    #[test]
    fn statistics_accumulate_sums_fields() {
        let mut total = Statistics::default();
        total.accumulate(&WorkerStatistics { nodes: 3, failed: 1, solved: 2, depth: 0, memory: 5 });
        total.accumulate(&WorkerStatistics { nodes: 4, failed: 0, solved: 1, depth: 0, memory: 2 });
        assert_eq!(7, total.nodes);
        assert_eq!(1, total.failed);
        assert_eq!(3, total.solved);
        assert_eq!(7, total.memory);
    }
}

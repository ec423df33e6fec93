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

//! This module defines the contract a search node must satisfy in order to be
//! explored by the parallel branch-and-bound engine. The engine never looks
//! inside a node: it only evaluates its status, clones it, constrains it
//! against a known-better solution, and commits one alternative of its
//! branching.

use std::any::Any;
use std::sync::Arc;

use crate::common::WorkerStatistics;

/// The outcome of evaluating a [`Space`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The node is infeasible; nothing more can be derived from it.
    Failed,
    /// The node is a complete, feasible assignment.
    Solved,
    /// The node still has unexplored alternatives.
    Branch,
}

/// An opaque description of the alternatives available at a [`Branch`](Status::Branch)
/// node. The engine only ever asks for the number of alternatives and commits
/// them back by index; it never inspects what an alternative means.
pub trait BranchingDesc: Send + Sync {
    /// How many alternatives this branching offers. Always at least 1.
    fn alternatives(&self) -> u32;
}

/// A node in the search tree.
///
/// Implementations are exclusively owned by at most one worker at a time
/// (see the crate-level invariant on ownership): the engine hands off work
/// by cloning or by transferring a `Box<dyn Space>`, never by sharing a
/// reference across threads.
pub trait Space: Any + Send {
    /// Evaluate this node, optionally updating `stats` with any bookkeeping
    /// the concrete problem wants attributed to the owning worker.
    fn status(&mut self, stats: &mut WorkerStatistics) -> Status;

    /// Produce an independent copy of this node. `share = true` permits an
    /// implementation to keep cheap, read-only data (e.g. problem instance
    /// data) shared between the two copies; `share = false` is used whenever
    /// the clone crosses a worker boundary (publication of a solution or of
    /// the best bound) and must own everything it needs.
    fn clone_space(&self, share: bool) -> Box<dyn Space>;

    /// Tighten this node's bound using `best`, a solution already known to
    /// dominate it. A subsequent `status()` call may now return
    /// [`Status::Failed`] where it previously would not have.
    fn constrain(&mut self, best: &dyn Space);

    /// Apply the `alternative`-th choice of `desc` to this node.
    fn commit(&mut self, desc: &dyn BranchingDesc, alternative: u32);

    /// Obtain the branching description for the current node. Calling this
    /// on a [`Status::Solved`] node is legal and is used purely for its
    /// side effect of finalizing any pending internal bookkeeping before the
    /// node is cloned out as a solution.
    fn description(&mut self) -> Arc<dyn BranchingDesc>;

    /// Upcast to `&dyn Any`, so that a concrete `constrain` implementation
    /// can downcast `best` back to its own type. The engine only ever
    /// compares nodes of the same concrete type.
    fn as_any(&self) -> &dyn Any;
}

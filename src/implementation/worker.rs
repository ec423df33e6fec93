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

//! One worker thread's exploration loop: depth-first search over its own
//! [`Path`], with work stealing from peers when its own path runs dry.

use parking_lot::Mutex;

use crate::abstraction::{Space, Status};
use crate::common::WorkerStatistics;
use crate::implementation::engine::{Cmd, EngineCore};
use crate::implementation::path::Path;

struct WorkerState {
    path: Path,
    cur: Option<Box<dyn Space>>,
    /// Path entries since the last stored clone.
    d: usize,
    /// Entries at index >= `mark` are already constrained by `best`.
    mark: usize,
    /// This worker's private snapshot of the engine's best solution.
    best: Option<Box<dyn Space>>,
    idle: bool,
    stats: WorkerStatistics,
}

pub(crate) struct Worker {
    index: usize,
    state: Mutex<WorkerState>,
}

impl Worker {
    pub(crate) fn new(index: usize, initial: Option<Box<dyn Space>>) -> Self {
        Worker {
            index,
            state: Mutex::new(WorkerState {
                path: Path::new(),
                cur: initial,
                d: 0,
                mark: 0,
                best: None,
                idle: false,
                stats: WorkerStatistics::default(),
            }),
        }
    }

    /// The thread body: read the command, dispatch, repeat until `TERMINATE`
    /// has been fully handled.
    pub(crate) fn run(&self, core: &EngineCore) {
        loop {
            match core.cmd() {
                Cmd::Wait => core.wait(),
                Cmd::Terminate => {
                    core.acknowledge();
                    core.wait_terminate();
                    core.terminated();
                    return;
                }
                Cmd::Work => self.work_step(core),
            }
        }
    }

    fn work_step(&self, core: &EngineCore) {
        let mut state = self.state.lock();

        if state.idle {
            drop(state);
            self.find(core);
            return;
        }

        if let Some(mut cur) = state.cur.take() {
            if (core.options().stop)(&state.stats, state.path.size()) {
                state.cur = Some(cur);
                drop(state);
                core.stop();
                return;
            }

            match cur.status(&mut state.stats) {
                Status::Failed => {
                    state.stats.failed += 1;
                    state.cur = None;
                }
                Status::Solved => {
                    // Forces any pending internal bookkeeping to finalize
                    // before the node is cloned out as a solution.
                    let _ = cur.description();
                    let solution = cur.clone_space(false);
                    state.stats.solved += 1;
                    state.cur = None;
                    drop(state);
                    core.solution(solution);
                }
                Status::Branch => {
                    let c_d = core.options().c_d;
                    let desc = cur.description();
                    // The snapshot, if any, must be taken before committing
                    // this entry's own alternative: `Path::recompute` treats
                    // a stored clone as the pre-commit state.
                    let clone = if state.d == 0 || state.d >= c_d {
                        state.d = 1;
                        Some(cur.clone_space(false))
                    } else {
                        state.d += 1;
                        None
                    };
                    state.path.push(desc.clone(), clone);
                    cur.commit(desc.as_ref(), 0);
                    state.stats.nodes += 1;
                    state.cur = Some(cur);
                }
            }
            return;
        }

        if state.path.next() {
            let a_d = core.options().a_d;
            let WorkerState { path, best, mark, d, .. } = &mut *state;
            let cur = path.recompute(d, a_d, best.as_deref(), *mark);
            state.cur = Some(cur);
            return;
        }

        state.idle = true;
        drop(state);
        core.idle();
    }

    /// Scan peers in index order for stealable work.
    fn find(&self, core: &EngineCore) {
        for peer in core.workers() {
            if peer.index == self.index {
                continue;
            }
            if let Some((stolen_path, depth)) = peer.try_steal(core) {
                let mut state = self.state.lock();
                state.path = stolen_path;
                state.mark = 0;
                state.d = 0;
                let a_d = core.options().a_d;
                let WorkerState { path, best, d, .. } = &mut *state;
                let cur = path.recompute(d, a_d, best.as_deref(), 0);
                state.cur = Some(cur);
                state.idle = false;
                state.stats.depth = depth;
                return;
            }
        }
    }

    /// Called on a peer by a worker attempting to steal. Claims the
    /// shallowest untried sibling alternative, if any, and tells the engine
    /// this worker is about to become busy with work on the thief's behalf
    /// before handing it over.
    fn try_steal(&self, core: &EngineCore) -> Option<(Path, usize)> {
        let mut state = self.state.lock();
        if !state.path.has_stealable() {
            return None;
        }
        let stolen = state.path.steal();
        drop(state);
        if stolen.is_some() {
            core.busy();
        }
        stolen
    }

    /// Broadcast of a newly published best solution. Must only be called
    /// while holding the engine's search mutex and never while holding this
    /// worker's own mutex, since this method takes it.
    pub(crate) fn better(&self, best: &dyn Space) {
        let mut state = self.state.lock();
        state.best = Some(best.clone_space(false));
        state.mark = state.path.len();
        if let Some(cur) = state.cur.as_mut() {
            cur.constrain(best);
        }
    }

    pub(crate) fn statistics(&self) -> WorkerStatistics {
        let state = self.state.lock();
        let mut stats = state.stats;
        stats.depth = state.path.len();
        stats.memory = state.path.size();
        stats
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_worker {
    use super::*;

    #[test]
    fn fresh_worker_with_no_work_is_not_idle() {
        let worker = Worker::new(0, None);
        let state = worker.state.lock();
        assert!(!state.idle);
        assert_eq!(0, state.path.len());
    }

    #[test]
    fn statistics_start_at_zero() {
        let worker = Worker::new(0, None);
        let stats = worker.statistics();
        assert_eq!(0, stats.nodes);
        assert_eq!(0, stats.failed);
        assert_eq!(0, stats.solved);
    }
}

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

//! The coordination core: command broadcast, busy/idle accounting, solution
//! publication, global-best propagation and the two-phase termination
//! handshake. This is the only module that owns the worker pool.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::abstraction::Space;
use crate::common::{Options, Statistics};
use crate::implementation::sync::Gate;
use crate::implementation::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cmd {
    Work,
    Wait,
    Terminate,
}

impl Cmd {
    fn to_u8(self) -> u8 {
        match self {
            Cmd::Work => 0,
            Cmd::Wait => 1,
            Cmd::Terminate => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Cmd::Work,
            1 => Cmd::Wait,
            2 => Cmd::Terminate,
            _ => unreachable!("corrupt command byte {v}"),
        }
    }
}

/// State guarded by a single mutex and condvar, mirroring the
/// `m_search`/`e_search` pair of the design this engine is modeled on.
struct SearchState {
    solutions: VecDeque<Box<dyn Space>>,
    best: Option<Box<dyn Space>>,
    n_busy: usize,
    has_stopped: bool,
}

/// State guarded during the two-phase termination handshake.
struct TerminateState {
    not_acknowledged: usize,
    not_terminated: usize,
}

pub(crate) struct EngineCore {
    options: Options,
    workers: Vec<Worker>,
    cmd: AtomicU8,
    wait_gate: Gate,
    wait_terminate_gate: Gate,
    search: Mutex<SearchState>,
    search_cv: Condvar,
    terminate: Mutex<TerminateState>,
    acknowledged_cv: Condvar,
    terminated_cv: Condvar,
}

impl EngineCore {
    fn new(root: Box<dyn Space>, options: Options) -> Arc<Self> {
        let threads = options.threads.max(1);
        let mut workers = Vec::with_capacity(threads);
        workers.push(Worker::new(0, Some(root)));
        for i in 1..threads {
            workers.push(Worker::new(i, None));
        }

        Arc::new(EngineCore {
            options,
            workers,
            cmd: AtomicU8::new(Cmd::Wait.to_u8()),
            wait_gate: Gate::new_closed(),
            wait_terminate_gate: Gate::new_open(),
            search: Mutex::new(SearchState {
                solutions: VecDeque::new(),
                best: None,
                n_busy: threads,
                has_stopped: false,
            }),
            search_cv: Condvar::new(),
            terminate: Mutex::new(TerminateState { not_acknowledged: 0, not_terminated: 0 }),
            acknowledged_cv: Condvar::new(),
            terminated_cv: Condvar::new(),
        })
    }

    pub(crate) fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub(crate) fn cmd(&self) -> Cmd {
        Cmd::from_u8(self.cmd.load(Ordering::Acquire))
    }

    /// Park until the wait gate opens.
    pub(crate) fn wait(&self) {
        self.wait_gate.park();
    }

    /// Park until the terminate gate opens.
    pub(crate) fn wait_terminate(&self) {
        self.wait_terminate_gate.park();
    }

    /// Switch the broadcast command to `Wait` and close the wait gate, so
    /// the next `Cmd::Work`/`Cmd::Wait` reader parks.
    fn block(&self) {
        self.cmd.store(Cmd::Wait.to_u8(), Ordering::Release);
        self.wait_gate.close();
    }

    /// Switch the broadcast command and open the wait gate, unparking every
    /// worker waiting on it.
    fn release(&self, cmd: Cmd) {
        self.cmd.store(cmd.to_u8(), Ordering::Release);
        self.wait_gate.open();
    }

    fn signal(search: &SearchState) -> bool {
        search.solutions.is_empty() && search.n_busy > 0 && !search.has_stopped
    }

    /// A worker has finished exploring a `Solved` node; `s` is its clone.
    pub(crate) fn solution(&self, mut s: Box<dyn Space>) {
        let mut search = self.search.lock();

        if let Some(best) = &search.best {
            s.constrain(best.as_ref());
            let mut scratch = crate::common::WorkerStatistics::default();
            if matches!(s.status(&mut scratch), crate::abstraction::Status::Failed) {
                return;
            }
        }

        let published = s.clone_space(false);
        search.best = Some(published);

        // Every worker is notified while `search` is held; no worker ever
        // takes `search` while holding its own mutex, so this cannot
        // deadlock. See `Worker::better`.
        for worker in &self.workers {
            worker.better(search.best.as_ref().unwrap().as_ref());
        }

        let should_signal = Self::signal(&search);
        search.solutions.push_back(s);
        if should_signal {
            self.search_cv.notify_one();
        }
    }

    /// A worker ran out of work.
    pub(crate) fn idle(&self) {
        let mut search = self.search.lock();
        let should_signal = Self::signal(&search);
        assert!(search.n_busy > 0, "idle() called with n_busy already 0");
        search.n_busy -= 1;
        if should_signal && search.n_busy == 0 {
            self.search_cv.notify_one();
        }
    }

    /// A thief is about to start exploring stolen work on a victim's behalf.
    pub(crate) fn busy(&self) {
        let mut search = self.search.lock();
        assert!(search.n_busy < self.workers.len(), "busy() overflow");
        search.n_busy += 1;
    }

    /// A worker's stop predicate triggered.
    pub(crate) fn stop(&self) {
        let mut search = self.search.lock();
        let should_signal = Self::signal(&search);
        search.has_stopped = true;
        if should_signal {
            self.search_cv.notify_one();
        }
    }

    pub(crate) fn acknowledge(&self) {
        let mut term = self.terminate.lock();
        term.not_acknowledged -= 1;
        if term.not_acknowledged == 0 {
            self.acknowledged_cv.notify_all();
        }
    }

    pub(crate) fn terminated(&self) {
        let mut term = self.terminate.lock();
        term.not_terminated -= 1;
        if term.not_terminated == 0 {
            self.terminated_cv.notify_all();
        }
    }
}

/// The public facade: what an embedding application actually holds.
pub struct Engine {
    core: Arc<EngineCore>,
    handles: Vec<JoinHandle<()>>,
    stopped: bool,
}

impl Engine {
    /// Start the engine: `root` seeds worker 0; every other worker begins
    /// idle-capable but with no work, and will pick it up by stealing.
    pub fn new(root: Box<dyn Space>, options: Options) -> Self {
        let core = EngineCore::new(root, options);
        let handles = (0..core.workers.len())
            .map(|i| {
                let core = Arc::clone(&core);
                thread::spawn(move || core.workers[i].run(&core))
            })
            .collect();

        Engine { core, handles, stopped: false }
    }

    /// Return the next solution strictly better than all previously
    /// returned ones, or `None` once the tree is exhausted or a stop
    /// triggered ([`Engine::stopped`] distinguishes the two).
    pub fn next(&mut self) -> Option<Box<dyn Space>> {
        let mut search = self.core.search.lock();

        if let Some(sol) = search.solutions.pop_front() {
            self.stopped = false;
            return Some(sol);
        }
        if search.n_busy == 0 {
            self.stopped = false;
            return None;
        }
        search.has_stopped = false;
        drop(search);

        self.core.release(Cmd::Work);

        let mut search = self.core.search.lock();
        loop {
            if let Some(sol) = search.solutions.pop_front() {
                drop(search);
                self.core.block();
                self.stopped = false;
                return Some(sol);
            }
            if search.n_busy == 0 || search.has_stopped {
                self.stopped = search.has_stopped;
                drop(search);
                self.core.block();
                return None;
            }
            self.core.search_cv.wait(&mut search);
        }
    }

    /// Whether the last call to [`Engine::next`] returned `None` because of
    /// the stop predicate rather than exhaustion.
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    /// Sum of every worker's counters. Consistent per worker, not globally
    /// atomic across workers.
    pub fn statistics(&self) -> Statistics {
        let mut total = Statistics::default();
        for worker in self.core.workers() {
            total.accumulate(&worker.statistics());
        }
        total
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let threads = self.core.workers.len();
        {
            let mut term = self.core.terminate.lock();
            term.not_acknowledged = threads;
            term.not_terminated = threads;
        }

        self.core.wait_terminate_gate.close();
        self.core.release(Cmd::Terminate);

        {
            let mut term = self.core.terminate.lock();
            while term.not_acknowledged > 0 {
                self.core.acknowledged_cv.wait(&mut term);
            }
        }

        self.core.wait_terminate_gate.open();

        {
            let mut term = self.core.terminate.lock();
            while term.not_terminated > 0 {
                self.core.terminated_cv.wait(&mut term);
            }
        }

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

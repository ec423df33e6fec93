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

//! A park/release gate used to hold the worker pool still between calls to
//! [`Engine::next`](crate::Engine::next) and during the termination
//! handshake.
//!
//! The gate is asymmetric: one thread (the engine) closes it and later
//! opens it; any number of other threads (the workers) only ever park on it,
//! by acquiring and immediately releasing it. A scoped `MutexGuard` cannot
//! model this, since "acquire here, release from a different call" is a
//! self-referential borrow; a raw mutex is the natural fit.

use lock_api::RawMutex as _;
use parking_lot::RawMutex;

pub(crate) struct Gate {
    raw: RawMutex,
}

impl Gate {
    /// A gate that starts closed: the first worker to park on it blocks
    /// immediately, until [`Gate::open`] is called.
    pub(crate) fn new_closed() -> Self {
        let raw = RawMutex::INIT;
        raw.lock();
        Gate { raw }
    }

    /// A gate that starts open: [`Gate::park`] returns immediately until the
    /// next [`Gate::close`].
    pub(crate) fn new_open() -> Self {
        Gate { raw: RawMutex::INIT }
    }

    /// Close the gate. Must only be called by the single thread that owns
    /// the gate (the engine); never called re-entrantly.
    pub(crate) fn close(&self) {
        self.raw.lock();
    }

    /// Open the gate, releasing every worker currently parked on it.
    ///
    /// # Safety discipline
    /// Must only be called by the thread that most recently called
    /// [`Gate::close`] on this gate; this mirrors the ordinary mutex
    /// requirement that only the lock holder may unlock it.
    pub(crate) fn open(&self) {
        unsafe { self.raw.unlock() };
    }

    /// Park until the gate is open, then return immediately.
    pub(crate) fn park(&self) {
        self.raw.lock();
        unsafe { self.raw.unlock() };
    }
}

// `RawMutex` itself is `Send + Sync`; the wrapper adds no extra shared
// state, so it inherits both.
unsafe impl Send for Gate {}
unsafe impl Sync for Gate {}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_gate {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn closed_gate_blocks_park() {
        let gate = Arc::new(Gate::new_closed());
        let passed = Arc::new(AtomicBool::new(false));

        let g = Arc::clone(&gate);
        let p = Arc::clone(&passed);
        let handle = thread::spawn(move || {
            g.park();
            p.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!passed.load(Ordering::SeqCst));

        gate.open();
        handle.join().unwrap();
        assert!(passed.load(Ordering::SeqCst));
    }

    #[test]
    fn open_gate_does_not_block_park() {
        let gate = Gate::new_open();
        gate.park();
    }

    #[test]
    fn close_then_open_unparks_waiters() {
        let gate = Arc::new(Gate::new_open());
        gate.close();

        let g = Arc::clone(&gate);
        let handle = thread::spawn(move || g.park());

        thread::sleep(Duration::from_millis(20));
        gate.open();
        handle.join().unwrap();
    }
}

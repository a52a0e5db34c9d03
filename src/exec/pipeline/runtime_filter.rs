// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Runtime-filter wait gating.
//!
//! Responsibilities:
//! - Counts outstanding runtime filters on a scan-side dependency and keeps
//!   the dependency blocked until every filter arrives or times out.
//! - `RuntimeFilterTimer` arbitrates arrival against timeout per filter so the
//!   outstanding count is decremented exactly once either way.
//!
//! Key exported interfaces:
//! - `RuntimeFilterDependency` (extension methods on `Dependency`),
//!   `RuntimeFilterTimer`.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::exec::pipeline::dependency::{Dependency, DependencyHandle};

/// Extension surface of runtime-filter dependencies built with
/// [`Dependency::new_runtime_filter`]. Calling these on any other dependency
/// variant panics.
pub trait RuntimeFilterDependency {
    /// Declares `count` filters still in flight.
    fn add_filters(&self, count: i32);
    /// Records one filter settled (arrived or timed out); the last one readies
    /// the dependency.
    fn sub_filters(&self);
    /// Installs the shared cancellation flag. While the flag reads false the
    /// dependency never blocks, regardless of outstanding filters.
    fn set_blocked_by_rf(&self, flag: Arc<AtomicBool>);
    /// Outstanding filter count, for diagnostics.
    fn outstanding_filters(&self) -> i32;
}

impl RuntimeFilterDependency for Dependency {
    fn add_filters(&self, count: i32) {
        let gate = self.runtime_filter_gate();
        for _ in 0..count {
            gate.add();
        }
    }

    fn sub_filters(&self) {
        if self.runtime_filter_gate().sub() {
            self.set_ready();
        }
    }

    fn set_blocked_by_rf(&self, flag: Arc<AtomicBool>) {
        self.runtime_filter_gate().set_blocked_by_rf(flag);
    }

    fn outstanding_filters(&self) -> i32 {
        self.runtime_filter_gate().outstanding()
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum TimerOutcome {
    Pending,
    Ready,
    TimedOut,
}

struct TimerState {
    outcome: TimerOutcome,
    released: bool,
}

/// Per-filter arrival/timeout latch.
///
/// `call_ready` and `call_timeout` race; the first caller wins, flips the
/// latch to its terminal outcome, and decrements the parent dependency's
/// outstanding count. The loser observes the terminal state and does nothing,
/// so the parent count moves exactly once per timer.
pub struct RuntimeFilterTimer {
    parent: DependencyHandle,
    registration_time: Instant,
    wait_time: Duration,
    state: Mutex<TimerState>,
}

impl RuntimeFilterTimer {
    pub fn new(parent: DependencyHandle, wait_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            parent,
            registration_time: Instant::now(),
            wait_time,
            state: Mutex::new(TimerState {
                outcome: TimerOutcome::Pending,
                released: false,
            }),
        })
    }

    /// Filter arrived. First terminal call wins.
    pub fn call_ready(&self) {
        let mut guard = self.state.lock().expect("runtime filter timer lock");
        if guard.outcome != TimerOutcome::Pending {
            return;
        }
        guard.outcome = TimerOutcome::Ready;
        drop(guard);
        self.parent.sub_filters();
    }

    /// Wait budget exhausted. First terminal call wins.
    pub fn call_timeout(&self) {
        let mut guard = self.state.lock().expect("runtime filter timer lock");
        if guard.outcome != TimerOutcome::Pending {
            return;
        }
        guard.outcome = TimerOutcome::TimedOut;
        drop(guard);
        self.parent.sub_filters();
    }

    /// Whether the filter arrived before any timeout.
    pub fn has_ready(&self) -> bool {
        let guard = self.state.lock().expect("runtime filter timer lock");
        guard.outcome == TimerOutcome::Ready
    }

    /// Arrived and not yet released by its consumer.
    pub fn call_has_ready(&self) -> bool {
        let guard = self.state.lock().expect("runtime filter timer lock");
        guard.outcome == TimerOutcome::Ready && !guard.released
    }

    /// Marks the arrived filter consumed.
    pub fn call_has_release(&self) {
        let mut guard = self.state.lock().expect("runtime filter timer lock");
        guard.released = true;
    }

    /// Whether the wait budget is exhausted at `now`. The background timer
    /// task polls this and calls `call_timeout` when it answers true.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.registration_time) >= self.wait_time
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }
}

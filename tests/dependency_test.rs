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
//! End-to-end coordination tests: pipeline boundaries, composite gating, and
//! a randomized registration-vs-ready race harness.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use rand::Rng;

use rockpipe::exec::chunk::{Chunk, field_with_slot_id};
use rockpipe::exec::pipeline::dependency::{
    BlockedTask, Dependency, DependencyHandle, FakeSharedState, SharedState,
};
use rockpipe::exec::pipeline::local_exchange::{LocalExchangeSharedState, PartitionedChunk};
use rockpipe::exec::pipeline::runtime_filter::{RuntimeFilterDependency, RuntimeFilterTimer};
use rockpipe::common::ids::SlotId;

fn int_chunk(values: Vec<i32>) -> Chunk {
    use arrow::array::{Int32Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};
    let schema = Arc::new(Schema::new(vec![field_with_slot_id(
        Field::new("c0", DataType::Int32, true),
        SlotId::new(0),
    )]));
    let batch = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(values))])
        .expect("record batch");
    Chunk::new(batch)
}

/// Test double for a scheduler task: wake() flips a condvar-guarded flag.
struct ParkedTask {
    id: usize,
    woken: Mutex<bool>,
    cv: Condvar,
    wake_count: AtomicUsize,
}

impl ParkedTask {
    fn new(id: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            woken: Mutex::new(false),
            cv: Condvar::new(),
            wake_count: AtomicUsize::new(0),
        })
    }

    fn wait_woken(&self, timeout: Duration) -> bool {
        let guard = self.woken.lock().expect("task lock");
        let (guard, result) = self
            .cv
            .wait_timeout_while(guard, timeout, |woken| !*woken)
            .expect("task lock");
        drop(guard);
        !result.timed_out()
    }
}

impl BlockedTask for ParkedTask {
    fn task_id(&self) -> usize {
        self.id
    }

    fn wake(&self) {
        self.wake_count.fetch_add(1, Ordering::AcqRel);
        let mut guard = self.woken.lock().expect("task lock");
        *guard = true;
        self.cv.notify_all();
    }
}

fn as_blocked(task: &Arc<ParkedTask>) -> Arc<dyn BlockedTask> {
    Arc::clone(task) as Arc<dyn BlockedTask>
}

#[test]
fn eos_crosses_pipeline_boundary_synchronously() {
    let sink_dep = Dependency::new_write(0, 1, "AGG_SINK_DEP", false);
    let source_dep = Dependency::new(1, 1, "AGG_SOURCE_DEP");
    let shared: Arc<dyn SharedState> = Arc::new(FakeSharedState::new());
    shared.basic().set_sink_dep(&sink_dep);
    shared.basic().set_source_dep(&source_dep);
    sink_dep.set_shared_state(Arc::clone(&shared));
    source_dep.set_shared_state(shared);

    let task = ParkedTask::new(1);
    assert!(source_dep.is_blocked_by(Some(&as_blocked(&task))).is_some());

    sink_dep.set_eos();
    // propagation is synchronous: already visible without waiting
    assert!(source_dep.eos());
    assert!(source_dep.is_blocked_by(None).is_none());
    assert_eq!(task.wake_count.load(Ordering::Acquire), 1);

    sink_dep.set_eos();
    assert_eq!(task.wake_count.load(Ordering::Acquire), 1);
}

#[test]
fn and_dependency_gates_on_all_children() {
    let and_dep = Dependency::new_and(0, 2);
    let children: Vec<DependencyHandle> = (0..3)
        .map(|i| Dependency::new(i, 2, format!("CHILD_DEP_{i}")))
        .collect();
    for child in &children {
        and_dep.add_child(Arc::clone(child));
    }

    for ready_first in 0..2 {
        assert!(and_dep.is_blocked_by(None).is_some(), "iter {ready_first}");
        children[ready_first].set_ready();
    }
    let blocking = and_dep.is_blocked_by(None).expect("still blocked");
    assert_eq!(blocking.name(), "CHILD_DEP_2");
    children[2].set_ready();
    assert!(and_dep.is_blocked_by(None).is_none());
}

#[test]
fn local_exchange_broadcast_after_last_sink() {
    let state = LocalExchangeSharedState::new(4);
    let deps: Vec<_> = (0..4)
        .map(|i| Dependency::new(i, 3, "LOCAL_EXCHANGE_SOURCE_DEP"))
        .collect();
    for (i, dep) in deps.iter().enumerate() {
        state.set_dep_by_channel_id(i, dep);
    }
    state.add_running_sink_operators(3);

    state.push_chunk(0, PartitionedChunk::whole(Arc::new(int_chunk(vec![1, 2]))));
    assert!(deps[0].is_blocked_by(None).is_none());
    assert!(deps[1].is_blocked_by(None).is_some());

    // drain channel 0 and park again
    assert_eq!(state.pop_chunk(0).expect("chunk").len, 2);
    deps[0].block();

    let counters: Vec<_> = (0..4).map(|i| ParkedTask::new(i)).collect();
    for (dep, task) in deps.iter().zip(&counters) {
        assert!(dep.is_blocked_by(Some(&as_blocked(task))).is_some());
    }

    state.sub_running_sink_operators();
    state.sub_running_sink_operators();
    for task in &counters {
        assert_eq!(task.wake_count.load(Ordering::Acquire), 0);
    }

    state.sub_running_sink_operators();
    for (dep, task) in deps.iter().zip(&counters) {
        assert!(dep.is_blocked_by(None).is_none());
        assert_eq!(task.wake_count.load(Ordering::Acquire), 1);
    }
}

#[test]
fn runtime_filter_timers_race_arrival_against_timeout() {
    let dep = Dependency::new_runtime_filter(0, 5, "RUNTIME_FILTER_DEP");
    dep.add_filters(2);

    let t1 = RuntimeFilterTimer::new(Arc::clone(&dep), Duration::from_millis(50));
    let t2 = RuntimeFilterTimer::new(Arc::clone(&dep), Duration::from_millis(50));
    assert!(dep.is_blocked_by(None).is_some());

    // filter 1 arrives, filter 2 times out; both settle the count once
    t1.call_ready();
    t1.call_timeout();
    assert!(t1.has_ready());
    assert!(dep.is_blocked_by(None).is_some());

    t2.call_timeout();
    t2.call_ready();
    assert!(!t2.has_ready());
    assert!(dep.is_blocked_by(None).is_none());
    assert_eq!(dep.outstanding_filters(), 0);
}

#[test]
fn parked_task_is_woken_across_threads() {
    let dep = Dependency::new(0, 1, "SCAN_DEP");
    let task = ParkedTask::new(42);
    assert!(dep.is_blocked_by(Some(&as_blocked(&task))).is_some());

    let producer = {
        let dep = Arc::clone(&dep);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            dep.set_ready();
        })
    };
    assert!(task.wait_woken(Duration::from_secs(5)), "missed wakeup");
    producer.join().expect("producer thread");
    assert!(dep.is_blocked_by(None).is_none());
}

// Registration racing set_ready from another thread: whatever the
// interleaving, a task that saw "blocked" must be woken.
#[test]
fn no_missed_wakeup_under_randomized_interleaving() {
    let mut rng = rand::thread_rng();
    for round in 0..200 {
        let dep = Dependency::new(round, 1, "RACE_DEP");
        let task = ParkedTask::new(round as usize);
        let barrier = Arc::new(Barrier::new(2));
        let producer_delay = rng.gen_range(0..20u64);

        let producer = {
            let dep = Arc::clone(&dep);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..producer_delay {
                    std::hint::spin_loop();
                }
                dep.set_ready();
            })
        };

        barrier.wait();
        let blocked = dep.is_blocked_by(Some(&as_blocked(&task)));
        producer.join().expect("producer thread");

        match blocked {
            Some(_) => {
                assert!(
                    task.wait_woken(Duration::from_secs(5)),
                    "missed wakeup in round {round}"
                );
            }
            None => {
                // saw readiness directly; no registration happened
                assert!(dep.is_blocked_by(None).is_none());
            }
        }
    }
}

// Same race through add_block_task, which registers without answering the
// blocked question first.
#[test]
fn add_block_task_never_loses_a_waiter() {
    for round in 0..200 {
        let dep = Dependency::new(round, 1, "RACE_DEP");
        let task = ParkedTask::new(round as usize);
        let barrier = Arc::new(Barrier::new(2));

        let producer = {
            let dep = Arc::clone(&dep);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                dep.set_ready();
            })
        };

        barrier.wait();
        dep.add_block_task(as_blocked(&task));
        producer.join().expect("producer thread");

        assert!(
            task.wait_woken(Duration::from_secs(5)),
            "missed wakeup in round {round}"
        );
    }
}

#[test]
fn many_waiters_race_one_readier() {
    let mut rng = rand::thread_rng();
    for round in 0..50 {
        let dep = Dependency::new(round, 1, "RACE_DEP");
        let waiters = 4;
        let barrier = Arc::new(Barrier::new(waiters + 1));
        let tasks: Vec<_> = (0..waiters).map(ParkedTask::new).collect();

        let mut handles = Vec::new();
        for task in &tasks {
            let dep = Arc::clone(&dep);
            let task = Arc::clone(task);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                if dep.is_blocked_by(Some(&(Arc::clone(&task) as Arc<dyn BlockedTask>))).is_none() {
                    // already ready; count self as woken
                    task.wake();
                }
            }));
        }

        let producer_delay = rng.gen_range(0..50u64);
        let producer = {
            let dep = Arc::clone(&dep);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..producer_delay {
                    std::hint::spin_loop();
                }
                dep.set_ready();
            })
        };

        for h in handles {
            h.join().expect("waiter thread");
        }
        producer.join().expect("producer thread");
        for (i, task) in tasks.iter().enumerate() {
            assert!(
                task.wait_woken(Duration::from_secs(5)),
                "waiter {i} missed wakeup in round {round}"
            );
        }
    }
}

#[test]
fn concurrent_sinks_feed_local_exchange() {
    let channels = 4;
    let sinks = 3;
    let chunks_per_sink = 50;
    let state = LocalExchangeSharedState::new(channels);
    let deps: Vec<_> = (0..channels)
        .map(|i| Dependency::new(i as i32, 3, "LOCAL_EXCHANGE_SOURCE_DEP"))
        .collect();
    for (i, dep) in deps.iter().enumerate() {
        state.set_dep_by_channel_id(i, dep);
    }
    state.add_running_sink_operators(sinks);

    let mut producers = Vec::new();
    for sink in 0..sinks {
        let state = Arc::clone(&state);
        producers.push(thread::spawn(move || {
            for n in 0..chunks_per_sink {
                let channel = (sink as usize + n) % channels;
                state.push_chunk(
                    channel,
                    PartitionedChunk::whole(Arc::new(int_chunk(vec![n as i32]))),
                );
            }
            state.sub_running_sink_operators();
        }));
    }
    for p in producers {
        p.join().expect("producer thread");
    }

    assert_eq!(state.running_sink_operators(), 0);
    let mut total = 0;
    for (i, dep) in deps.iter().enumerate() {
        assert!(dep.is_blocked_by(None).is_none());
        while state.pop_chunk(i).is_some() {
            total += 1;
        }
    }
    assert_eq!(total, sinks as usize * chunks_per_sink);
}

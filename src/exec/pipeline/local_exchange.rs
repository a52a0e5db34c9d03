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
//! Local exchange shared state.
//!
//! Responsibilities:
//! - Multi-producer multi-channel chunk exchange inside one fragment: each
//!   sink partitions rows into per-channel lock-free queues, each source
//!   channel drains its own queue gated by its own dependency.
//! - Tracks live sink operators so source channels observe exhaustion exactly
//!   once after the last sink finishes.
//!
//! Key exported interfaces:
//! - `LocalExchangeSharedState`, `PartitionedChunk`.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crossbeam::queue::SegQueue;

use crate::exec::chunk::Chunk;
use crate::exec::pipeline::dependency::{BasicSharedState, Dependency, DependencyHandle, SharedState};

/// A contiguous run of one partitioning pass over a source chunk.
///
/// `row_ids` is the full shuffle permutation shared by every run of the same
/// chunk; this run covers `row_ids[offset..offset + len]`.
#[derive(Clone)]
pub struct PartitionedChunk {
    pub chunk: Arc<Chunk>,
    pub row_ids: Arc<Vec<u32>>,
    pub offset: usize,
    pub len: usize,
}

impl PartitionedChunk {
    /// Run covering a whole chunk, for passthrough-style exchanges.
    pub fn whole(chunk: Arc<Chunk>) -> Self {
        let len = chunk.len();
        Self {
            chunk,
            row_ids: Arc::new((0..len as u32).collect()),
            offset: 0,
            len,
        }
    }

    pub fn selected_row_ids(&self) -> &[u32] {
        &self.row_ids[self.offset..self.offset + self.len]
    }
}

pub struct LocalExchangeSharedState {
    basic: BasicSharedState,
    queues: Vec<SegQueue<PartitionedChunk>>,
    channel_deps: Mutex<Vec<Option<Weak<Dependency>>>>,
    running_sink_operators: AtomicI32,
}

impl LocalExchangeSharedState {
    pub fn new(num_channels: usize) -> Arc<Self> {
        let mut queues = Vec::with_capacity(num_channels);
        for _ in 0..num_channels {
            queues.push(SegQueue::new());
        }
        Arc::new(Self {
            basic: BasicSharedState::new(),
            queues,
            channel_deps: Mutex::new(vec![None; num_channels]),
            running_sink_operators: AtomicI32::new(0),
        })
    }

    pub fn num_channels(&self) -> usize {
        self.queues.len()
    }

    /// Binds a source channel's dependency and blocks it until data arrives.
    pub fn set_dep_by_channel_id(&self, channel_id: usize, dep: &DependencyHandle) {
        {
            let mut guard = self.channel_deps.lock().expect("local exchange dep lock");
            guard[channel_id] = Some(Arc::downgrade(dep));
        }
        dep.block();
    }

    pub fn add_running_sink_operators(&self, count: i32) {
        self.running_sink_operators.fetch_add(count, Ordering::AcqRel);
    }

    /// One sink finished. The last finisher broadcasts readiness so every
    /// channel can observe exhaustion; the broadcast runs exactly once.
    pub fn sub_running_sink_operators(&self) {
        if self.running_sink_operators.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.broadcast_ready_for_read();
        }
    }

    pub fn running_sink_operators(&self) -> i32 {
        self.running_sink_operators.load(Ordering::Acquire)
    }

    fn broadcast_ready_for_read(&self) {
        let deps = {
            let guard = self.channel_deps.lock().expect("local exchange dep lock");
            guard.clone()
        };
        for dep in deps.into_iter().flatten() {
            if let Some(dep) = dep.upgrade() {
                dep.set_ready();
            }
        }
    }

    /// Marks one channel ready, typically because a chunk just arrived.
    pub fn set_ready_for_read(&self, channel_id: usize) {
        let dep = {
            let guard = self.channel_deps.lock().expect("local exchange dep lock");
            guard[channel_id].clone()
        };
        if let Some(dep) = dep
            && let Some(dep) = dep.upgrade()
        {
            dep.set_ready();
        }
    }

    /// Sink side: enqueue one partition run and wake the channel's source.
    pub fn push_chunk(&self, channel_id: usize, chunk: PartitionedChunk) {
        self.queues[channel_id].push(chunk);
        self.set_ready_for_read(channel_id);
    }

    /// Source side: dequeue the next run for this channel. An empty answer
    /// with live sinks means the channel should re-block and wait.
    pub fn pop_chunk(&self, channel_id: usize) -> Option<PartitionedChunk> {
        self.queues[channel_id].pop()
    }
}

impl SharedState for LocalExchangeSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "LocalExchangeSharedState"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::chunk::tests::test_chunk;

    fn channel_dep(id: i32) -> DependencyHandle {
        Dependency::new(id, 0, "LOCAL_EXCHANGE_DEP")
    }

    #[test]
    fn push_readies_only_the_target_channel() {
        let state = LocalExchangeSharedState::new(2);
        let d0 = channel_dep(0);
        let d1 = channel_dep(1);
        state.set_dep_by_channel_id(0, &d0);
        state.set_dep_by_channel_id(1, &d1);
        assert!(d0.is_blocked_by(None).is_some());
        assert!(d1.is_blocked_by(None).is_some());

        state.push_chunk(1, PartitionedChunk::whole(Arc::new(test_chunk(vec![1, 2]))));
        assert!(d0.is_blocked_by(None).is_some());
        assert!(d1.is_blocked_by(None).is_none());

        let run = state.pop_chunk(1).expect("chunk");
        assert_eq!(run.len, 2);
        assert_eq!(run.selected_row_ids(), &[0, 1]);
        assert!(state.pop_chunk(1).is_none());
        assert!(state.pop_chunk(0).is_none());
    }

    #[test]
    fn last_sink_broadcasts_readiness_exactly_once() {
        let state = LocalExchangeSharedState::new(3);
        let deps: Vec<_> = (0..3).map(channel_dep).collect();
        for (i, dep) in deps.iter().enumerate() {
            state.set_dep_by_channel_id(i, dep);
        }
        state.add_running_sink_operators(3);

        state.sub_running_sink_operators();
        state.sub_running_sink_operators();
        for dep in &deps {
            assert!(dep.is_blocked_by(None).is_some());
        }

        state.sub_running_sink_operators();
        assert_eq!(state.running_sink_operators(), 0);
        for dep in &deps {
            assert!(dep.is_blocked_by(None).is_none());
        }
    }

    #[test]
    fn partition_runs_share_one_permutation() {
        let chunk = Arc::new(test_chunk(vec![10, 20, 30, 40]));
        let row_ids = Arc::new(vec![2u32, 0, 3, 1]);
        let first = PartitionedChunk {
            chunk: Arc::clone(&chunk),
            row_ids: Arc::clone(&row_ids),
            offset: 0,
            len: 2,
        };
        let second = PartitionedChunk {
            chunk,
            row_ids,
            offset: 2,
            len: 2,
        };
        assert_eq!(first.selected_row_ids(), &[2, 0]);
        assert_eq!(second.selected_row_ids(), &[3, 1]);
    }
}

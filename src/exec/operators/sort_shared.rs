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
//! Sort shared states.
//!
//! Responsibilities:
//! - `SortSharedState` carries the single sorter instance of a blocking sort
//!   boundary; the sink feeds it, the source drains it after the sink
//!   finalizes.
//! - `PartitionSortSharedState` is the partitioned flavor: one sorted run per
//!   partition, drained partition by partition.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::exec::chunk::Chunk;
use crate::exec::pipeline::dependency::{BasicSharedState, SharedState};

/// Full-input sorter owned exclusively by one sort boundary. `done_sort` is
/// called once after the last `update`; `pull_chunk` is only valid afterwards.
pub trait ChunksSorter: Send {
    fn update(&mut self, chunk: Chunk) -> Result<(), String>;
    fn done_sort(&mut self) -> Result<(), String>;
    fn pull_chunk(&mut self) -> Result<Option<Chunk>, String>;
}

pub struct SortSharedState {
    basic: BasicSharedState,
    sorter: Mutex<Option<Box<dyn ChunksSorter>>>,
}

impl SortSharedState {
    pub fn new() -> Self {
        Self {
            basic: BasicSharedState::new(),
            sorter: Mutex::new(None),
        }
    }

    pub fn set_sorter(&self, sorter: Box<dyn ChunksSorter>) {
        let mut guard = self.sorter.lock().expect("sort state lock");
        *guard = Some(sorter);
    }

    pub fn with_sorter<R>(
        &self,
        f: impl FnOnce(&mut dyn ChunksSorter) -> Result<R, String>,
    ) -> Result<R, String> {
        let mut guard = self.sorter.lock().expect("sort state lock");
        let sorter = guard.as_mut().ok_or("sorter not attached")?;
        f(sorter.as_mut())
    }
}

impl Default for SortSharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState for SortSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "SortSharedState"
    }
}

/// Partitioned sort: the sink produces one fully sorted run per partition and
/// the source drains runs in partition order.
pub struct PartitionSortSharedState {
    basic: BasicSharedState,
    sorted_runs: Mutex<VecDeque<VecDeque<Chunk>>>,
    sink_finished: Mutex<bool>,
}

impl PartitionSortSharedState {
    pub fn new() -> Self {
        Self {
            basic: BasicSharedState::new(),
            sorted_runs: Mutex::new(VecDeque::new()),
            sink_finished: Mutex::new(false),
        }
    }

    pub fn push_sorted_run(&self, run: VecDeque<Chunk>) {
        let mut guard = self.sorted_runs.lock().expect("partition sort lock");
        guard.push_back(run);
    }

    pub fn set_sink_finished(&self) {
        let mut guard = self.sink_finished.lock().expect("partition sort lock");
        *guard = true;
    }

    pub fn sink_finished(&self) -> bool {
        *self.sink_finished.lock().expect("partition sort lock")
    }

    /// Next chunk of the current partition run; exhausted runs are discarded.
    pub fn pull_chunk(&self) -> Option<Chunk> {
        let mut guard = self.sorted_runs.lock().expect("partition sort lock");
        while let Some(run) = guard.front_mut() {
            if let Some(chunk) = run.pop_front() {
                return Some(chunk);
            }
            guard.pop_front();
        }
        None
    }

    pub fn pending_partitions(&self) -> usize {
        self.sorted_runs.lock().expect("partition sort lock").len()
    }
}

impl Default for PartitionSortSharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState for PartitionSortSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "PartitionSortSharedState"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::chunk::tests::test_chunk;

    struct CollectSorter {
        chunks: Vec<Chunk>,
        done: bool,
    }

    impl ChunksSorter for CollectSorter {
        fn update(&mut self, chunk: Chunk) -> Result<(), String> {
            if self.done {
                return Err("update after done_sort".to_string());
            }
            self.chunks.push(chunk);
            Ok(())
        }

        fn done_sort(&mut self) -> Result<(), String> {
            self.done = true;
            Ok(())
        }

        fn pull_chunk(&mut self) -> Result<Option<Chunk>, String> {
            if !self.done {
                return Err("pull before done_sort".to_string());
            }
            if self.chunks.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.chunks.remove(0)))
            }
        }
    }

    #[test]
    fn sorter_attach_and_lifecycle() {
        let state = SortSharedState::new();
        let err = state.with_sorter(|_| Ok(())).expect_err("no sorter yet");
        assert!(err.contains("not attached"));

        state.set_sorter(Box::new(CollectSorter {
            chunks: Vec::new(),
            done: false,
        }));
        state
            .with_sorter(|s| s.update(test_chunk(vec![3, 1, 2])))
            .expect("update");
        state.with_sorter(|s| s.done_sort()).expect("done");
        let chunk = state
            .with_sorter(|s| s.pull_chunk())
            .expect("pull")
            .expect("chunk");
        assert_eq!(chunk.len(), 3);
        assert!(state.with_sorter(|s| s.pull_chunk()).expect("pull").is_none());
    }

    #[test]
    fn partition_runs_drain_in_order() {
        let state = PartitionSortSharedState::new();
        state.push_sorted_run(VecDeque::from(vec![test_chunk(vec![1]), test_chunk(vec![2])]));
        state.push_sorted_run(VecDeque::from(vec![test_chunk(vec![3])]));
        assert_eq!(state.pending_partitions(), 2);

        let mut seen = Vec::new();
        while let Some(chunk) = state.pull_chunk() {
            seen.push(chunk.len());
        }
        assert_eq!(seen, vec![1, 1, 1]);
        assert_eq!(state.pending_partitions(), 0);
        assert!(!state.sink_finished());
        state.set_sink_finished();
        assert!(state.sink_finished());
    }
}

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
//! Aggregation shared state.
//!
//! Responsibilities:
//! - Holds the cross-boundary payload of a blocking aggregation: the grouped
//!   hash table, the arena that owns per-group aggregate state rows, and the
//!   spill partitioning scheme.
//! - Aggregate state rows live in the arena for the whole aggregation; the
//!   spill partitioning, once initialized, is immutable.
//!
//! Key exported interfaces:
//! - `AggSharedState`, `AggregatedDataVariants`, `Arena`, `AggStateOffset`,
//!   `SpillPartitionHelper`, `AggFnEvaluator`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use arrow::datatypes::DataType;

use crate::exec::hash_table::{HashTableVariants, key_kind_for_types};
use crate::exec::operators::data_queue::DataQueue;
use crate::exec::pipeline::dependency::{BasicSharedState, SharedState};

const ARENA_BLOCK_BYTES: usize = 64 * 1024;

/// Stable handle to one allocation inside an [`Arena`]. Valid for the arena's
/// lifetime; the arena never frees individual allocations.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AggStateOffset {
    block: usize,
    offset: usize,
    len: usize,
}

/// Bump allocator for aggregate state rows. Allocations are append-only and
/// released all at once when the arena drops, matching the lifetime of the
/// aggregation itself.
pub struct Arena {
    inner: Mutex<ArenaInner>,
}

struct ArenaInner {
    blocks: Vec<Vec<u8>>,
    allocated: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ArenaInner {
                blocks: Vec::new(),
                allocated: 0,
            }),
        }
    }

    /// Allocates `len` zeroed bytes at the given power-of-two alignment.
    pub fn allocate(&self, len: usize, align: usize) -> AggStateOffset {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        let mut inner = self.inner.lock().expect("arena lock");
        let block_bytes = ARENA_BLOCK_BYTES.max(len + align);
        let need_new_block = match inner.blocks.last() {
            Some(block) => {
                let aligned = (block.len() + align - 1) & !(align - 1);
                aligned + len > block.capacity()
            }
            None => true,
        };
        if need_new_block {
            inner.blocks.push(Vec::with_capacity(block_bytes));
        }
        let block_index = inner.blocks.len() - 1;
        let block = &mut inner.blocks[block_index];
        let aligned = (block.len() + align - 1) & !(align - 1);
        block.resize(aligned + len, 0);
        inner.allocated += len;
        AggStateOffset {
            block: block_index,
            offset: aligned,
            len,
        }
    }

    pub fn with_state<R>(&self, handle: AggStateOffset, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut inner = self.inner.lock().expect("arena lock");
        let block = &mut inner.blocks[handle.block];
        f(&mut block[handle.offset..handle.offset + handle.len])
    }

    pub fn allocated_bytes(&self) -> usize {
        self.inner.lock().expect("arena lock").allocated
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a group hash to a spill partition. Chosen once when spilling first
/// triggers and fixed afterwards, so spilled and in-memory rows agree on the
/// partition of every group.
pub struct SpillPartitionHelper {
    partition_count: usize,
}

impl SpillPartitionHelper {
    pub fn new(partition_count: usize) -> Self {
        assert!(
            partition_count.is_power_of_two(),
            "spill partition count must be a power of two"
        );
        Self { partition_count }
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn partition_for_hash(&self, hash: u64) -> usize {
        (hash as usize) & (self.partition_count - 1)
    }
}

/// Descriptor of one aggregate function slot in the per-group state row.
pub struct AggFnEvaluator {
    pub name: String,
    pub state_size: usize,
    pub state_align: usize,
}

/// Grouped aggregation data, either a single global state (no group-by keys)
/// or a hash table keyed per the group-by key widths.
pub enum AggregatedDataVariants {
    WithoutKey(Option<AggStateOffset>),
    Keyed(HashTableVariants<AggStateOffset>),
}

impl AggregatedDataVariants {
    pub fn init(group_by_types: &[DataType]) -> Self {
        if group_by_types.is_empty() {
            Self::WithoutKey(None)
        } else {
            Self::Keyed(HashTableVariants::with_kind(key_kind_for_types(
                group_by_types,
            )))
        }
    }

    pub fn group_count(&self) -> usize {
        match self {
            Self::WithoutKey(state) => usize::from(state.is_some()),
            Self::Keyed(table) => table.len(),
        }
    }
}

/// Arena/state byte accounting, read by the spill trigger.
#[derive(Clone, Copy, Default, Debug)]
pub struct MemoryRecord {
    pub used_in_arena: usize,
    pub used_in_state: usize,
}

/// Byte layout of one per-group aggregate state row, computed once from the
/// evaluators at prepare time.
pub struct AggStateLayout {
    pub total_size_of_aggregate_states: usize,
    pub align_aggregate_states: usize,
    pub offsets_of_aggregate_states: Vec<usize>,
}

impl AggStateLayout {
    fn from_evaluators(evaluators: &[AggFnEvaluator]) -> Self {
        let mut offsets = Vec::with_capacity(evaluators.len());
        let mut offset = 0usize;
        let mut align = 1usize;
        for e in evaluators {
            offset = (offset + e.state_align - 1) & !(e.state_align - 1);
            offsets.push(offset);
            offset += e.state_size;
            align = align.max(e.state_align);
        }
        Self {
            total_size_of_aggregate_states: offset,
            align_aggregate_states: align,
            offsets_of_aggregate_states: offsets,
        }
    }
}

pub struct AggSharedState {
    basic: BasicSharedState,
    pub arena: Arena,
    pub data: Mutex<AggregatedDataVariants>,
    pub evaluators: Vec<AggFnEvaluator>,
    pub layout: AggStateLayout,
    pub make_nullable_keys: bool,
    input_num_rows: AtomicU64,
    sink_finished: AtomicBool,
    spill_partition: OnceLock<SpillPartitionHelper>,
    // present only in streaming pre-aggregation mode
    data_queue: Option<Arc<DataQueue>>,
}

impl AggSharedState {
    pub fn new(group_by_types: &[DataType], evaluators: Vec<AggFnEvaluator>) -> Self {
        let layout = AggStateLayout::from_evaluators(&evaluators);
        Self {
            basic: BasicSharedState::new(),
            arena: Arena::new(),
            data: Mutex::new(AggregatedDataVariants::init(group_by_types)),
            evaluators,
            layout,
            make_nullable_keys: false,
            input_num_rows: AtomicU64::new(0),
            sink_finished: AtomicBool::new(false),
            spill_partition: OnceLock::new(),
            data_queue: None,
        }
    }

    /// Streaming pre-aggregation variant: partial results flow through a
    /// data queue instead of a single final hash table handoff.
    pub fn new_streaming(
        group_by_types: &[DataType],
        evaluators: Vec<AggFnEvaluator>,
        data_queue: Arc<DataQueue>,
    ) -> Self {
        let mut state = Self::new(group_by_types, evaluators);
        state.data_queue = Some(data_queue);
        state
    }

    pub fn data_queue(&self) -> Option<&Arc<DataQueue>> {
        self.data_queue.as_ref()
    }

    pub fn add_input_rows(&self, rows: u64) {
        self.input_num_rows.fetch_add(rows, Ordering::AcqRel);
    }

    pub fn input_num_rows(&self) -> u64 {
        self.input_num_rows.load(Ordering::Acquire)
    }

    pub fn set_sink_finished(&self) {
        self.sink_finished.store(true, Ordering::Release);
    }

    pub fn sink_finished(&self) -> bool {
        self.sink_finished.load(Ordering::Acquire)
    }

    pub fn memory_record(&self) -> MemoryRecord {
        let used_in_arena = self.arena.allocated_bytes();
        let groups = self.data.lock().expect("agg data lock").group_count();
        MemoryRecord {
            used_in_arena,
            used_in_state: groups * self.layout.total_size_of_aggregate_states,
        }
    }

    /// Installs the spill partitioning; later calls with a different scheme
    /// are ignored, the first one wins.
    pub fn init_spill_partition(&self, partition_count: usize) -> &SpillPartitionHelper {
        self.spill_partition
            .get_or_init(|| SpillPartitionHelper::new(partition_count))
    }

    pub fn spill_partition(&self) -> Option<&SpillPartitionHelper> {
        self.spill_partition.get()
    }
}

impl SharedState for AggSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "AggSharedState"
    }
}

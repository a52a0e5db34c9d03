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
//! Set operation (INTERSECT / EXCEPT) shared state.
//!
//! Responsibilities:
//! - Holds the hash table all set children probe into, keyed by a width
//!   dispatched layout chosen once from the first child's key types and never
//!   re-dispatched.
//! - Children probe strictly in order: finishing child i readies child i+1's
//!   dependency, so at most one child mutates the table at a time.
//!
//! Key exported interfaces:
//! - `SetSharedState`, `SetRowMark`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use arrow::datatypes::DataType;
use hashbrown::HashMap;

use crate::common::ids::SlotId;
use crate::exec::hash_table::{HashTableKeyKind, HashTableVariants, RowRef, key_kind_for_types};
use crate::exec::pipeline::dependency::{
    BasicSharedState, Dependency, DependencyHandle, SharedState,
};

/// Per-key record: where the key's row lives in the first child's output, and
/// which children have seen the key (bit i set means child i matched).
#[derive(Clone, Copy, Debug)]
pub struct SetRowMark {
    pub build_row: RowRef,
    pub child_presence: u64,
}

impl SetRowMark {
    pub fn new(build_row: RowRef) -> Self {
        Self {
            build_row,
            child_presence: 1,
        }
    }

    pub fn mark_child(&mut self, child_id: usize) {
        self.child_presence |= 1 << child_id;
    }

    pub fn seen_by(&self, child_id: usize) -> bool {
        self.child_presence & (1 << child_id) != 0
    }
}

pub struct SetSharedState {
    basic: BasicSharedState,
    pub table: Mutex<Option<HashTableVariants<SetRowMark>>>,
    probe_deps: Mutex<Vec<Weak<Dependency>>>,
    // key-expression slot ids per child, in child order
    child_result_slots: Mutex<Vec<Vec<SlotId>>>,
    // first-child column index per key column, for result materialization
    build_col_idx: Mutex<HashMap<usize, usize>>,
    valid_element_in_hash_tbl: AtomicU64,
    ready_for_read: AtomicBool,
    child_count: usize,
}

impl SetSharedState {
    pub fn new(child_count: usize) -> Self {
        assert!(child_count <= 64, "child presence mask is 64 bits wide");
        Self {
            basic: BasicSharedState::new(),
            table: Mutex::new(None),
            probe_deps: Mutex::new(Vec::new()),
            child_result_slots: Mutex::new(vec![Vec::new(); child_count]),
            build_col_idx: Mutex::new(HashMap::new()),
            valid_element_in_hash_tbl: AtomicU64::new(0),
            ready_for_read: AtomicBool::new(false),
            child_count,
        }
    }

    pub fn child_count(&self) -> usize {
        self.child_count
    }

    pub fn set_child_result_slots(&self, child_id: usize, slots: Vec<SlotId>) {
        let mut guard = self.child_result_slots.lock().expect("set state slots lock");
        guard[child_id] = slots;
    }

    pub fn child_result_slots(&self, child_id: usize) -> Vec<SlotId> {
        let guard = self.child_result_slots.lock().expect("set state slots lock");
        guard[child_id].clone()
    }

    pub fn set_build_col_idx(&self, key_column: usize, build_column: usize) {
        let mut guard = self.build_col_idx.lock().expect("set state col lock");
        guard.insert(key_column, build_column);
    }

    pub fn build_col_idx(&self, key_column: usize) -> Option<usize> {
        let guard = self.build_col_idx.lock().expect("set state col lock");
        guard.get(&key_column).copied()
    }

    /// Keys still surviving the set operation; EXCEPT/INTERSECT probes shrink
    /// this as they rule keys out.
    pub fn set_valid_element_in_hash_tbl(&self, count: u64) {
        self.valid_element_in_hash_tbl.store(count, Ordering::Release);
    }

    pub fn valid_element_in_hash_tbl(&self) -> u64 {
        self.valid_element_in_hash_tbl.load(Ordering::Acquire)
    }

    pub fn ready_for_read(&self) -> bool {
        self.ready_for_read.load(Ordering::Acquire)
    }

    /// Chooses the hash table layout from the first child's key types. Called
    /// exactly once, at first-child prepare time.
    pub fn hash_table_init(&self, key_types: &[DataType]) -> HashTableKeyKind {
        let mut guard = self.table.lock().expect("set state table lock");
        assert!(guard.is_none(), "set hash table initialized twice");
        let kind = key_kind_for_types(key_types);
        *guard = Some(HashTableVariants::with_kind(kind));
        kind
    }

    pub fn table_kind(&self) -> Option<HashTableKeyKind> {
        let guard = self.table.lock().expect("set state table lock");
        guard.as_ref().map(|t| t.kind())
    }

    /// Registers the per-child probe dependencies, in child order. Child 0
    /// (the build child) starts ready; the rest wait their turn. Ownership of
    /// the handles stays with the operator local-states.
    pub fn set_probe_deps(&self, deps: &[DependencyHandle]) {
        assert_eq!(deps.len(), self.child_count, "one dependency per child");
        if let Some(first) = deps.first() {
            first.set_ready();
        }
        for dep in deps.iter().skip(1) {
            dep.block();
        }
        let mut guard = self.probe_deps.lock().expect("set state dep lock");
        *guard = deps.iter().map(Arc::downgrade).collect();
    }

    pub fn probe_dep(&self, child_id: usize) -> Option<DependencyHandle> {
        let guard = self.probe_deps.lock().expect("set state dep lock");
        guard[child_id].upgrade()
    }

    /// Child `child_id` finished probing; hands the table to the next child,
    /// or to the source side when it was the last.
    pub fn set_child_finished(&self, child_id: usize) {
        if child_id + 1 < self.child_count {
            let next = {
                let guard = self.probe_deps.lock().expect("set state dep lock");
                guard[child_id + 1].upgrade()
            };
            if let Some(dep) = next {
                dep.set_ready();
            }
            return;
        }
        self.ready_for_read.store(true, Ordering::Release);
        if let Some(source_dep) = self.basic.source_dep() {
            source_dep.set_ready();
        }
    }
}

impl SharedState for SetSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "SetSharedState"
    }
}

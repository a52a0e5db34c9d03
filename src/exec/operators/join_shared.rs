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
//! Join shared states.
//!
//! Responsibilities:
//! - Carries the build side of a join across the build/probe boundary. The
//!   build artifact is published write-once after full materialization;
//!   probe-side readiness is raised only afterwards, so probes never observe
//!   a partially built table.
//! - `short_circuit_for_probe` lets an empty build side skip probing
//!   entirely for join types where that is sound.
//!
//! Key exported interfaces:
//! - `JoinSharedState`, `HashJoinSharedState`, `HashJoinBuildArtifact`,
//!   `NestedLoopJoinSharedState`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::exec::chunk::Chunk;
use crate::exec::hash_table::{HashTableVariants, RowRefList};
use crate::exec::pipeline::dependency::{BasicSharedState, SharedState};

/// State common to every join flavor.
pub struct JoinSharedState {
    basic: BasicSharedState,
    short_circuit_for_probe: AtomicBool,
    has_null_in_build_side: AtomicBool,
    // empty build side still needs one probe pass for left/full outer joins
    empty_build_side_need_probe_dispose: AtomicBool,
}

impl JoinSharedState {
    pub fn new() -> Self {
        Self {
            basic: BasicSharedState::new(),
            short_circuit_for_probe: AtomicBool::new(false),
            has_null_in_build_side: AtomicBool::new(false),
            empty_build_side_need_probe_dispose: AtomicBool::new(false),
        }
    }

    pub fn set_short_circuit_for_probe(&self) {
        self.short_circuit_for_probe.store(true, Ordering::Release);
    }

    pub fn short_circuit_for_probe(&self) -> bool {
        self.short_circuit_for_probe.load(Ordering::Acquire)
    }

    pub fn set_has_null_in_build_side(&self) {
        self.has_null_in_build_side.store(true, Ordering::Release);
    }

    pub fn has_null_in_build_side(&self) -> bool {
        self.has_null_in_build_side.load(Ordering::Acquire)
    }

    pub fn set_empty_build_side_need_probe_dispose(&self) {
        self.empty_build_side_need_probe_dispose
            .store(true, Ordering::Release);
    }

    pub fn empty_build_side_need_probe_dispose(&self) -> bool {
        self.empty_build_side_need_probe_dispose.load(Ordering::Acquire)
    }
}

impl Default for JoinSharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState for JoinSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "JoinSharedState"
    }
}

/// Fully materialized build side of a hash join. Immutable after publication.
pub struct HashJoinBuildArtifact {
    pub table: HashTableVariants<RowRefList>,
    pub build_chunks: Vec<Arc<Chunk>>,
    pub has_null_key: bool,
    // per equi-join key column
    pub is_null_safe_eq_join: Vec<bool>,
    pub store_null_in_hash_table: Vec<bool>,
    pub probe_ignore_null: bool,
}

pub struct HashJoinSharedState {
    join: JoinSharedState,
    artifact: OnceLock<Arc<HashJoinBuildArtifact>>,
}

impl HashJoinSharedState {
    pub fn new() -> Self {
        Self {
            join: JoinSharedState::new(),
            artifact: OnceLock::new(),
        }
    }

    pub fn join(&self) -> &JoinSharedState {
        &self.join
    }

    /// Publishes the finished build side. Write-once; a second publication is
    /// a build-operator bug.
    pub fn publish_build_artifact(&self, artifact: HashJoinBuildArtifact) {
        if self.artifact.set(Arc::new(artifact)).is_err() {
            panic!("hash join build artifact published twice");
        }
    }

    /// The probe side calls this only after its dependency reported ready, at
    /// which point the artifact is guaranteed present.
    pub fn build_artifact(&self) -> Option<Arc<HashJoinBuildArtifact>> {
        self.artifact.get().cloned()
    }
}

impl Default for HashJoinSharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState for HashJoinSharedState {
    fn basic(&self) -> &BasicSharedState {
        self.join.basic()
    }

    fn name(&self) -> &str {
        "HashJoinSharedState"
    }
}

/// Nested loop join: the build side is the ordered chunk list, plus per-chunk
/// visited bitmaps for outer-join semantics on the build rows.
pub struct NestedLoopJoinSharedState {
    join: JoinSharedState,
    build_chunks: Mutex<Vec<Arc<Chunk>>>,
    visited: Mutex<Vec<Vec<bool>>>,
    build_finished: AtomicBool,
    left_side_eos: AtomicBool,
}

impl NestedLoopJoinSharedState {
    pub fn new() -> Self {
        Self {
            join: JoinSharedState::new(),
            build_chunks: Mutex::new(Vec::new()),
            visited: Mutex::new(Vec::new()),
            build_finished: AtomicBool::new(false),
            left_side_eos: AtomicBool::new(false),
        }
    }

    pub fn join(&self) -> &JoinSharedState {
        &self.join
    }

    pub fn append_build_chunk(&self, chunk: Chunk) {
        assert!(
            !self.build_finished.load(Ordering::Acquire),
            "build chunk appended after build finished"
        );
        let rows = chunk.len();
        let mut chunks = self.build_chunks.lock().expect("nlj build lock");
        let mut visited = self.visited.lock().expect("nlj visited lock");
        chunks.push(Arc::new(chunk));
        visited.push(vec![false; rows]);
    }

    pub fn set_build_finished(&self) {
        self.build_finished.store(true, Ordering::Release);
    }

    pub fn build_finished(&self) -> bool {
        self.build_finished.load(Ordering::Acquire)
    }

    pub fn set_left_side_eos(&self) {
        self.left_side_eos.store(true, Ordering::Release);
    }

    pub fn left_side_eos(&self) -> bool {
        self.left_side_eos.load(Ordering::Acquire)
    }

    pub fn build_chunks(&self) -> Vec<Arc<Chunk>> {
        let guard = self.build_chunks.lock().expect("nlj build lock");
        guard.clone()
    }

    pub fn mark_visited(&self, chunk_index: usize, row_index: usize) {
        let mut guard = self.visited.lock().expect("nlj visited lock");
        guard[chunk_index][row_index] = true;
    }

    /// Build rows never matched by any probe row, in (chunk, row) order.
    pub fn unvisited_rows(&self) -> Vec<(usize, usize)> {
        let guard = self.visited.lock().expect("nlj visited lock");
        let mut out = Vec::new();
        for (chunk_index, rows) in guard.iter().enumerate() {
            for (row_index, visited) in rows.iter().enumerate() {
                if !visited {
                    out.push((chunk_index, row_index));
                }
            }
        }
        out
    }
}

impl Default for NestedLoopJoinSharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState for NestedLoopJoinSharedState {
    fn basic(&self) -> &BasicSharedState {
        self.join.basic()
    }

    fn name(&self) -> &str {
        "NestedLoopJoinSharedState"
    }
}

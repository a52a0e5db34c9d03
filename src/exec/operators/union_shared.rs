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
//! Union shared state.
//!
//! A thin wrapper over [`DataQueue`]: each union child is one producer, the
//! union source is the single consumer. Queue capacity in producers is fixed
//! at construction to the child count.

use std::sync::Arc;

use crate::exec::chunk::Chunk;
use crate::exec::operators::data_queue::DataQueue;
use crate::exec::pipeline::dependency::{BasicSharedState, Dependency, SharedState};

pub struct UnionSharedState {
    basic: BasicSharedState,
    pub data_queue: DataQueue,
}

impl UnionSharedState {
    pub fn new(child_count: usize) -> Self {
        Self {
            basic: BasicSharedState::new(),
            data_queue: DataQueue::new(child_count),
        }
    }

    pub fn child_count(&self) -> usize {
        self.data_queue.child_count()
    }

    pub fn set_source_dep(&self, dep: &Arc<Dependency>) {
        self.basic.set_source_dep(dep);
        self.data_queue.set_source_dep(dep);
    }

    /// Child `child_id` produced one chunk.
    pub fn push_chunk(&self, child_id: usize, chunk: Chunk) {
        self.data_queue.push_chunk(child_id, chunk);
    }

    /// Child `child_id` reached end-of-stream.
    pub fn set_child_finished(&self, child_id: usize) {
        self.data_queue.set_finish(child_id);
    }

    pub fn pop_chunk(&self) -> Option<(usize, Chunk)> {
        self.data_queue.pop_chunk()
    }

    pub fn is_exhausted(&self) -> bool {
        self.data_queue.is_exhausted()
    }
}

impl SharedState for UnionSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "UnionSharedState"
    }
}

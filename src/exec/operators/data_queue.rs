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
//! Multi-producer chunk queue.
//!
//! Responsibilities:
//! - Buffers chunks from a fixed set of producer children and hands them to a
//!   single consumer in round-robin child order.
//! - Drives the attached source dependency: ready while any chunk is buffered
//!   or every child has finished, blocked otherwise.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::exec::chunk::Chunk;
use crate::exec::pipeline::dependency::Dependency;

pub struct DataQueue {
    queues: Vec<Mutex<VecDeque<Chunk>>>,
    finished: Vec<Mutex<bool>>,
    finished_children: AtomicUsize,
    buffered_chunks: AtomicUsize,
    buffered_bytes: AtomicUsize,
    next_child: Mutex<usize>,
    source_dep: Mutex<Weak<Dependency>>,
}

impl DataQueue {
    /// `child_count` of zero is legal and yields an immediately exhausted
    /// queue.
    pub fn new(child_count: usize) -> Self {
        let mut queues = Vec::with_capacity(child_count);
        let mut finished = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            queues.push(Mutex::new(VecDeque::new()));
            finished.push(Mutex::new(false));
        }
        Self {
            queues,
            finished,
            finished_children: AtomicUsize::new(0),
            buffered_chunks: AtomicUsize::new(0),
            buffered_bytes: AtomicUsize::new(0),
            next_child: Mutex::new(0),
            source_dep: Mutex::new(Weak::new()),
        }
    }

    pub fn child_count(&self) -> usize {
        self.queues.len()
    }

    pub fn set_source_dep(&self, dep: &Arc<Dependency>) {
        {
            let mut guard = self.source_dep.lock().expect("data queue dep lock");
            *guard = Arc::downgrade(dep);
        }
        if self.is_all_finished() || self.has_data() {
            self.notify_source();
        } else {
            dep.block();
        }
    }

    fn notify_source(&self) {
        let dep = {
            let guard = self.source_dep.lock().expect("data queue dep lock");
            guard.upgrade()
        };
        if let Some(dep) = dep {
            dep.set_ready();
        }
    }

    pub fn push_chunk(&self, child_id: usize, chunk: Chunk) {
        let bytes = chunk.estimated_bytes();
        {
            let mut queue = self.queues[child_id].lock().expect("data queue lock");
            queue.push_back(chunk);
        }
        self.buffered_chunks.fetch_add(1, Ordering::AcqRel);
        self.buffered_bytes.fetch_add(bytes, Ordering::AcqRel);
        self.notify_source();
    }

    /// Marks one child done. Idempotent per child.
    pub fn set_finish(&self, child_id: usize) {
        {
            let mut flag = self.finished[child_id].lock().expect("data queue finish lock");
            if *flag {
                return;
            }
            *flag = true;
        }
        self.finished_children.fetch_add(1, Ordering::AcqRel);
        if self.is_all_finished() {
            self.notify_source();
        }
    }

    pub fn is_finished(&self, child_id: usize) -> bool {
        *self.finished[child_id].lock().expect("data queue finish lock")
    }

    pub fn is_all_finished(&self) -> bool {
        self.finished_children.load(Ordering::Acquire) == self.queues.len()
    }

    pub fn has_data(&self) -> bool {
        self.buffered_chunks.load(Ordering::Acquire) > 0
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes.load(Ordering::Acquire)
    }

    /// Consumer has drained everything there will ever be.
    pub fn is_exhausted(&self) -> bool {
        self.is_all_finished() && !self.has_data()
    }

    /// Next buffered chunk in round-robin child order, with the producing
    /// child's id. Answers `None` when nothing is buffered right now; the
    /// consumer then distinguishes "wait" from "done" via `is_exhausted` and
    /// re-blocks its dependency in the former case.
    pub fn pop_chunk(&self) -> Option<(usize, Chunk)> {
        let child_count = self.queues.len();
        if child_count == 0 {
            return None;
        }
        let mut cursor = self.next_child.lock().expect("data queue cursor lock");
        for step in 0..child_count {
            let child_id = (*cursor + step) % child_count;
            let chunk = {
                let mut queue = self.queues[child_id].lock().expect("data queue lock");
                queue.pop_front()
            };
            if let Some(chunk) = chunk {
                *cursor = (child_id + 1) % child_count;
                self.buffered_chunks.fetch_sub(1, Ordering::AcqRel);
                self.buffered_bytes
                    .fetch_sub(chunk.estimated_bytes(), Ordering::AcqRel);
                return Some((child_id, chunk));
            }
        }
        None
    }
}

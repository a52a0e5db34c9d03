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
//! Multi-cast shared state.
//!
//! Responsibilities:
//! - Broadcasts one sink's chunk stream to N independent receivers. Chunks
//!   are appended once and retained until every live receiver has passed
//!   them; a cancelled receiver stops holding chunks back.
//! - Drives each receiver's source dependency: ready while the receiver has
//!   unread chunks or the stream is finished.

use std::sync::{Arc, Mutex, Weak};

use crate::exec::chunk::Chunk;
use crate::exec::pipeline::dependency::{BasicSharedState, Dependency, SharedState};

struct CastReceiver {
    // absolute index into the stream of all chunks ever appended
    next_index: usize,
    cancelled: bool,
    dep: Weak<Dependency>,
}

struct StreamerInner {
    chunks: Vec<Arc<Chunk>>,
    // how many leading chunks were dropped after all receivers passed them
    dropped: usize,
    receivers: Vec<CastReceiver>,
    finished: bool,
}

/// Single-producer broadcast buffer with per-receiver cursors.
pub struct MultiCastDataStreamer {
    inner: Mutex<StreamerInner>,
}

impl MultiCastDataStreamer {
    pub fn new(receiver_count: usize) -> Self {
        let receivers = (0..receiver_count)
            .map(|_| CastReceiver {
                next_index: 0,
                cancelled: false,
                dep: Weak::new(),
            })
            .collect();
        Self {
            inner: Mutex::new(StreamerInner {
                chunks: Vec::new(),
                dropped: 0,
                receivers,
                finished: false,
            }),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.inner.lock().expect("multi cast lock").receivers.len()
    }

    pub fn set_dep_by_receiver_id(&self, receiver_id: usize, dep: &Arc<Dependency>) {
        let notify = {
            let mut inner = self.inner.lock().expect("multi cast lock");
            inner.receivers[receiver_id].dep = Arc::downgrade(dep);
            inner.finished || inner.receivers[receiver_id].next_index < inner.dropped + inner.chunks.len()
        };
        if notify {
            dep.set_ready();
        } else {
            dep.block();
        }
    }

    /// Sink side: append one chunk and wake every live receiver.
    pub fn push_chunk(&self, chunk: Chunk) {
        let deps = {
            let mut inner = self.inner.lock().expect("multi cast lock");
            inner.chunks.push(Arc::new(chunk));
            inner
                .receivers
                .iter()
                .filter(|r| !r.cancelled)
                .map(|r| r.dep.clone())
                .collect::<Vec<_>>()
        };
        for dep in deps {
            if let Some(dep) = dep.upgrade() {
                dep.set_ready();
            }
        }
    }

    /// Sink side: no more chunks will arrive. Wakes every receiver so each
    /// can observe exhaustion.
    pub fn set_finished(&self) {
        let deps = {
            let mut inner = self.inner.lock().expect("multi cast lock");
            inner.finished = true;
            inner
                .receivers
                .iter()
                .map(|r| r.dep.clone())
                .collect::<Vec<_>>()
        };
        for dep in deps {
            if let Some(dep) = dep.upgrade() {
                dep.set_ready();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.lock().expect("multi cast lock").finished
    }

    /// Receiver side: next unread chunk, or `None` when caught up. A `None`
    /// with `is_finished()` true means the receiver is done; otherwise it
    /// should re-block and wait.
    pub fn pull_chunk(&self, receiver_id: usize) -> Option<Arc<Chunk>> {
        let mut inner = self.inner.lock().expect("multi cast lock");
        let absolute = inner.receivers[receiver_id].next_index;
        let relative = absolute.checked_sub(inner.dropped)?;
        let chunk = inner.chunks.get(relative)?.clone();
        inner.receivers[receiver_id].next_index += 1;
        Self::trim(&mut inner);
        Some(chunk)
    }

    /// Receiver gives up; its cursor no longer retains chunks.
    pub fn cancel_receiver(&self, receiver_id: usize) {
        let mut inner = self.inner.lock().expect("multi cast lock");
        inner.receivers[receiver_id].cancelled = true;
        Self::trim(&mut inner);
    }

    /// Chunks retained for the slowest live receiver.
    pub fn buffered_chunks(&self) -> usize {
        let inner = self.inner.lock().expect("multi cast lock");
        inner.chunks.len()
    }

    fn trim(inner: &mut StreamerInner) {
        let total = inner.dropped + inner.chunks.len();
        let min_cursor = inner
            .receivers
            .iter()
            .filter(|r| !r.cancelled)
            .map(|r| r.next_index)
            .min()
            .unwrap_or(total);
        let drop_count = min_cursor - inner.dropped;
        if drop_count > 0 {
            inner.chunks.drain(..drop_count);
            inner.dropped = min_cursor;
        }
    }
}

pub struct MultiCastSharedState {
    basic: BasicSharedState,
    pub streamer: MultiCastDataStreamer,
}

impl MultiCastSharedState {
    pub fn new(receiver_count: usize) -> Self {
        Self {
            basic: BasicSharedState::new(),
            streamer: MultiCastDataStreamer::new(receiver_count),
        }
    }
}

impl SharedState for MultiCastSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "MultiCastSharedState"
    }
}

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
//! Analytic (window function) shared state.
//!
//! Responsibilities:
//! - Buffers input chunks across the sink/source boundary of a window
//!   operator and tracks the partition scan cursor over the buffered row
//!   stream.
//! - Partition end positions only move forward; the source side consumes
//!   rows strictly behind the discovered partition end.

use std::sync::Mutex;

use crate::exec::chunk::Chunk;
use crate::exec::pipeline::dependency::{BasicSharedState, SharedState};

/// Position of one row in the buffered chunk stream. `pos` is the absolute
/// row index; `chunk_index`/`row_index` locate it inside the buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ChunkRowPos {
    pub chunk_index: usize,
    pub row_index: usize,
    pub pos: u64,
}

struct AnalyticInner {
    input_chunks: Vec<Chunk>,
    input_chunk_first_row_positions: Vec<u64>,
    input_total_rows: u64,
    input_eos: bool,
    current_row_position: u64,
    partition_by_end: ChunkRowPos,
    found_partition_end: bool,
    order_by_end: ChunkRowPos,
    partition_col_idxs: Vec<usize>,
    order_col_idxs: Vec<usize>,
}

pub struct AnalyticSharedState {
    basic: BasicSharedState,
    inner: Mutex<AnalyticInner>,
}

impl AnalyticSharedState {
    pub fn new(partition_col_idxs: Vec<usize>, order_col_idxs: Vec<usize>) -> Self {
        Self {
            basic: BasicSharedState::new(),
            inner: Mutex::new(AnalyticInner {
                input_chunks: Vec::new(),
                input_chunk_first_row_positions: Vec::new(),
                input_total_rows: 0,
                input_eos: false,
                current_row_position: 0,
                partition_by_end: ChunkRowPos::default(),
                found_partition_end: false,
                order_by_end: ChunkRowPos::default(),
                partition_col_idxs,
                order_col_idxs,
            }),
        }
    }

    pub fn partition_col_idxs(&self) -> Vec<usize> {
        self.inner
            .lock()
            .expect("analytic state lock")
            .partition_col_idxs
            .clone()
    }

    pub fn order_col_idxs(&self) -> Vec<usize> {
        self.inner
            .lock()
            .expect("analytic state lock")
            .order_col_idxs
            .clone()
    }

    pub fn append_chunk(&self, chunk: Chunk) {
        let mut inner = self.inner.lock().expect("analytic state lock");
        let first_row = inner.input_total_rows;
        inner.input_chunk_first_row_positions.push(first_row);
        inner.input_total_rows += chunk.len() as u64;
        inner.input_chunks.push(chunk);
    }

    pub fn input_total_rows(&self) -> u64 {
        self.inner.lock().expect("analytic state lock").input_total_rows
    }

    pub fn buffered_chunks(&self) -> usize {
        self.inner.lock().expect("analytic state lock").input_chunks.len()
    }

    pub fn first_row_position(&self, chunk_index: usize) -> u64 {
        self.inner.lock().expect("analytic state lock").input_chunk_first_row_positions
            [chunk_index]
    }

    pub fn set_input_eos(&self) {
        let mut inner = self.inner.lock().expect("analytic state lock");
        inner.input_eos = true;
    }

    pub fn input_eos(&self) -> bool {
        self.inner.lock().expect("analytic state lock").input_eos
    }

    /// Publishes the end (exclusive) of the partition being scanned. Must not
    /// move backwards.
    pub fn set_partition_by_end(&self, end: ChunkRowPos, found: bool) {
        let mut inner = self.inner.lock().expect("analytic state lock");
        assert!(
            end.pos >= inner.partition_by_end.pos,
            "partition end moved backwards: {} after {}",
            end.pos,
            inner.partition_by_end.pos
        );
        assert!(end.pos <= inner.input_total_rows, "partition end past buffered rows");
        inner.partition_by_end = end;
        inner.found_partition_end = found;
    }

    pub fn partition_by_end(&self) -> (ChunkRowPos, bool) {
        let inner = self.inner.lock().expect("analytic state lock");
        (inner.partition_by_end, inner.found_partition_end)
    }

    /// Publishes the end (exclusive) of the current peer group. Must not move
    /// backwards.
    pub fn set_order_by_end(&self, end: ChunkRowPos) {
        let mut inner = self.inner.lock().expect("analytic state lock");
        assert!(
            end.pos >= inner.order_by_end.pos,
            "order end moved backwards: {} after {}",
            end.pos,
            inner.order_by_end.pos
        );
        inner.order_by_end = end;
    }

    pub fn order_by_end(&self) -> ChunkRowPos {
        self.inner.lock().expect("analytic state lock").order_by_end
    }

    pub fn current_row_position(&self) -> u64 {
        self.inner.lock().expect("analytic state lock").current_row_position
    }

    /// Advances the consumption cursor by `rows`, bounded by the discovered
    /// partition end.
    pub fn advance_current_row(&self, rows: u64) {
        let mut inner = self.inner.lock().expect("analytic state lock");
        let next = inner.current_row_position + rows;
        assert!(
            next <= inner.partition_by_end.pos,
            "current row advanced past partition end"
        );
        inner.current_row_position = next;
    }

    /// Locates an absolute row position inside the buffered chunks.
    pub fn locate(&self, pos: u64) -> ChunkRowPos {
        let inner = self.inner.lock().expect("analytic state lock");
        assert!(pos <= inner.input_total_rows, "position past buffered rows");
        let chunk_index = match inner.input_chunk_first_row_positions.binary_search(&pos) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let row_index = match inner.input_chunk_first_row_positions.get(chunk_index) {
            Some(first) => (pos - first) as usize,
            None => 0,
        };
        ChunkRowPos {
            chunk_index,
            row_index,
            pos,
        }
    }
}

impl SharedState for AnalyticSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "AnalyticSharedState"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::chunk::tests::test_chunk;

    fn state_with_chunks() -> AnalyticSharedState {
        let state = AnalyticSharedState::new(vec![0], vec![0]);
        state.append_chunk(test_chunk(vec![1, 2, 3]));
        state.append_chunk(test_chunk(vec![4, 5]));
        state
    }

    #[test]
    fn locate_walks_chunk_boundaries() {
        let state = state_with_chunks();
        assert_eq!(state.input_total_rows(), 5);
        assert_eq!(state.first_row_position(1), 3);

        let pos = state.locate(2);
        assert_eq!((pos.chunk_index, pos.row_index, pos.pos), (0, 2, 2));
        let pos = state.locate(3);
        assert_eq!((pos.chunk_index, pos.row_index, pos.pos), (1, 0, 3));
        let pos = state.locate(4);
        assert_eq!((pos.chunk_index, pos.row_index, pos.pos), (1, 1, 4));
    }

    #[test]
    fn cursor_is_bounded_by_partition_end() {
        let state = state_with_chunks();
        state.set_partition_by_end(state.locate(3), true);
        let (end, found) = state.partition_by_end();
        assert!(found);
        assert_eq!(end.pos, 3);

        state.advance_current_row(2);
        state.advance_current_row(1);
        assert_eq!(state.current_row_position(), 3);
    }

    #[test]
    #[should_panic(expected = "past partition end")]
    fn advancing_past_partition_end_panics() {
        let state = state_with_chunks();
        state.set_partition_by_end(state.locate(2), true);
        state.advance_current_row(3);
    }

    #[test]
    #[should_panic(expected = "moved backwards")]
    fn backwards_partition_end_panics() {
        let state = state_with_chunks();
        state.set_partition_by_end(state.locate(3), false);
        state.set_partition_by_end(state.locate(1), true);
    }

    #[test]
    fn eos_and_order_end_latch() {
        let state = state_with_chunks();
        assert!(!state.input_eos());
        state.set_input_eos();
        assert!(state.input_eos());

        state.set_order_by_end(state.locate(2));
        state.set_order_by_end(state.locate(2));
        assert_eq!(state.order_by_end().pos, 2);
        assert_eq!(state.partition_col_idxs(), vec![0]);
        assert_eq!(state.order_col_idxs(), vec![0]);
    }
}

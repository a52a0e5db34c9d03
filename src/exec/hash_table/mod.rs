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
//! Hash table key-width specialization.
//!
//! Responsibilities:
//! - Provides the closed set of hash table layouts shared by hash join and
//!   set operators, specialized by key byte width with a serialized fallback
//!   for composite or variable-length keys.
//! - Maps Arrow key types to a layout once, at build-operator prepare time.
//!
//! Key exported interfaces:
//! - `HashTableVariants`, `HashTableKeyKind`, `RowRef`, `RowRefList`,
//!   `key_kind_for_types`.

use arrow::datatypes::DataType;
use hashbrown::HashMap;

/// Position of one row inside a build-side chunk sequence.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RowRef {
    pub chunk_index: u32,
    pub row_index: u32,
}

/// All build rows sharing one key, insertion-ordered. The first row lives
/// inline because single-row keys dominate in practice.
#[derive(Clone, Debug)]
pub struct RowRefList {
    first: RowRef,
    rest: Vec<RowRef>,
}

impl RowRefList {
    pub fn new(first: RowRef) -> Self {
        Self {
            first,
            rest: Vec::new(),
        }
    }

    pub fn push(&mut self, row: RowRef) {
        self.rest.push(row);
    }

    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef> + '_ {
        std::iter::once(self.first).chain(self.rest.iter().copied())
    }
}

/// Key layout selected for a hash table. The set is closed; every consumer
/// matches exhaustively.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HashTableKeyKind {
    I8,
    I16,
    I32,
    I64,
    I128,
    Serialized,
}

/// Picks the narrowest fixed-width layout that can hold the key columns, or
/// the serialized fallback for multi-column and variable-length keys.
pub fn key_kind_for_types(key_types: &[DataType]) -> HashTableKeyKind {
    if key_types.len() != 1 {
        return HashTableKeyKind::Serialized;
    }
    match &key_types[0] {
        DataType::Boolean | DataType::Int8 | DataType::UInt8 => HashTableKeyKind::I8,
        DataType::Int16 | DataType::UInt16 => HashTableKeyKind::I16,
        DataType::Int32 | DataType::UInt32 | DataType::Date32 | DataType::Float32 => {
            HashTableKeyKind::I32
        }
        DataType::Int64
        | DataType::UInt64
        | DataType::Date64
        | DataType::Float64
        | DataType::Timestamp(_, _) => HashTableKeyKind::I64,
        DataType::Decimal128(_, _) => HashTableKeyKind::I128,
        _ => HashTableKeyKind::Serialized,
    }
}

/// One hash table, laid out per key width. `V` is the per-key payload: a
/// [`RowRefList`] for joins, a presence bitmap for set operators.
pub enum HashTableVariants<V> {
    I8(HashMap<i8, V>),
    I16(HashMap<i16, V>),
    I32(HashMap<i32, V>),
    I64(HashMap<i64, V>),
    I128(HashMap<i128, V>),
    Serialized(HashMap<Vec<u8>, V>),
}

impl<V> HashTableVariants<V> {
    pub fn with_kind(kind: HashTableKeyKind) -> Self {
        match kind {
            HashTableKeyKind::I8 => Self::I8(HashMap::new()),
            HashTableKeyKind::I16 => Self::I16(HashMap::new()),
            HashTableKeyKind::I32 => Self::I32(HashMap::new()),
            HashTableKeyKind::I64 => Self::I64(HashMap::new()),
            HashTableKeyKind::I128 => Self::I128(HashMap::new()),
            HashTableKeyKind::Serialized => Self::Serialized(HashMap::new()),
        }
    }

    pub fn kind(&self) -> HashTableKeyKind {
        match self {
            Self::I8(_) => HashTableKeyKind::I8,
            Self::I16(_) => HashTableKeyKind::I16,
            Self::I32(_) => HashTableKeyKind::I32,
            Self::I64(_) => HashTableKeyKind::I64,
            Self::I128(_) => HashTableKeyKind::I128,
            Self::Serialized(_) => HashTableKeyKind::Serialized,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::I8(m) => m.len(),
            Self::I16(m) => m.len(),
            Self::I32(m) => m.len(),
            Self::I64(m) => m.len(),
            Self::I128(m) => m.len(),
            Self::Serialized(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

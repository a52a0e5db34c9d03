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
//! Operator shared-state payloads.
//!
//! Responsibilities:
//! - One module per operator family, each defining the cross-boundary payload
//!   that the sink side fills and the source side drains, plus the readiness
//!   hooks it drives on the boundary's dependencies.

pub mod agg_shared;
pub mod analytic_shared;
pub mod data_queue;
pub mod join_shared;
pub mod multi_cast_shared;
pub mod set_shared;
pub mod sort_shared;
pub mod union_shared;

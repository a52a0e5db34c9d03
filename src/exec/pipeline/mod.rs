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
//! Pipeline readiness/blocking module exports.
//!
//! Responsibilities:
//! - Exposes dependency primitives, runtime-filter gating, and local-exchange
//!   shared state used to coordinate pipeline task scheduling.
//! - Defines the coordination surface consumed by the external task scheduler
//!   and by operator local-states.

pub mod dependency;
pub mod local_exchange;
pub mod runtime_filter;

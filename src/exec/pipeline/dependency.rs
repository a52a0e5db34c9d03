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
//! Pipeline dependency primitives.
//!
//! Responsibilities:
//! - Defines dependency handles, readiness/eos flags, waiter registration, and
//!   blocked-time watching for pipeline task coordination.
//! - Couples sink-side and source-side dependencies of one pipeline boundary
//!   through reference-counted shared state.
//!
//! Key exported interfaces:
//! - Types: `DependencyHandle`, `Dependency`, `BlockedTask`, `BasicSharedState`,
//!   `SharedState`, `FakeSharedState`, `BlockWatcher`, `DependencyLogThrottle`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::rockpipe_logging::{debug, warn};

/// Blocking longer than this is considered abnormal and becomes eligible for
/// slow-dependency logging.
pub const SLOW_DEPENDENCY_THRESHOLD: Duration = Duration::from_secs(60);
/// Minimum interval between two slow-dependency log lines of one instance.
pub const DEPENDENCY_LOG_INTERVAL: Duration = Duration::from_secs(30);
const _: () = assert!(
    DEPENDENCY_LOG_INTERVAL.as_nanos() < SLOW_DEPENDENCY_THRESHOLD.as_nanos(),
    "log interval must be shorter than the slow threshold"
);

/// Reference-counted handle to one pipeline dependency object.
pub type DependencyHandle = Arc<Dependency>;

/// Execution task waiting on a dependency.
///
/// Implemented by the external scheduler's task type. `wake` must re-admit the
/// task to the run queue; it is called without any dependency lock held and
/// must not call back into the dependency that woke it.
pub trait BlockedTask: Send + Sync {
    fn task_id(&self) -> usize;
    fn wake(&self);
}

/// Elapsed-time accumulator counting how long a dependency blocks its task.
///
/// Purely diagnostic: started when the task first parks, stopped when the
/// dependency becomes ready, accumulating across multiple blocking episodes.
pub struct BlockWatcher {
    inner: Mutex<BlockWatcherInner>,
}

struct BlockWatcherInner {
    started_at: Option<Instant>,
    accumulated: Duration,
}

impl BlockWatcher {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BlockWatcherInner {
                started_at: None,
                accumulated: Duration::ZERO,
            }),
        }
    }

    pub fn start(&self) {
        let mut guard = self.inner.lock().expect("block watcher lock");
        if guard.started_at.is_none() {
            guard.started_at = Some(Instant::now());
        }
    }

    pub fn stop(&self) {
        let mut guard = self.inner.lock().expect("block watcher lock");
        if let Some(started_at) = guard.started_at.take() {
            guard.accumulated += started_at.elapsed();
        }
    }

    pub fn elapsed(&self) -> Duration {
        let guard = self.inner.lock().expect("block watcher lock");
        match guard.started_at {
            Some(started_at) => guard.accumulated + started_at.elapsed(),
            None => guard.accumulated,
        }
    }
}

impl Default for BlockWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-dependency rate limiter for slow-block diagnostics.
///
/// `should_log` answers true at most once per [`DEPENDENCY_LOG_INTERVAL`], and
/// only once the blocked time crosses [`SLOW_DEPENDENCY_THRESHOLD`].
pub struct DependencyLogThrottle {
    last_log_time_ns: AtomicU64,
}

impl DependencyLogThrottle {
    pub fn new() -> Self {
        Self {
            last_log_time_ns: AtomicU64::new(0),
        }
    }

    pub fn should_log(&self, blocked: Duration) -> bool {
        let cur_ns = u64::try_from(blocked.as_nanos()).unwrap_or(u64::MAX);
        if cur_ns < SLOW_DEPENDENCY_THRESHOLD.as_nanos() as u64 {
            return false;
        }
        let last = self.last_log_time_ns.load(Ordering::Acquire);
        if cur_ns.saturating_sub(last) < DEPENDENCY_LOG_INTERVAL.as_nanos() as u64 {
            return false;
        }
        self.last_log_time_ns
            .compare_exchange(last, cur_ns, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for DependencyLogThrottle {
    fn default() -> Self {
        Self::new()
    }
}

/// Links the source-side and sink-side dependencies of one pipeline boundary.
///
/// Both references are non-owning; the operator local-states on either side
/// own the dependency handles and the shared state itself.
pub struct BasicSharedState {
    source_dep: Mutex<Weak<Dependency>>,
    sink_dep: Mutex<Weak<Dependency>>,
}

impl BasicSharedState {
    pub fn new() -> Self {
        Self {
            source_dep: Mutex::new(Weak::new()),
            sink_dep: Mutex::new(Weak::new()),
        }
    }

    pub fn set_source_dep(&self, dep: &DependencyHandle) {
        let mut guard = self.source_dep.lock().expect("shared state dep lock");
        *guard = Arc::downgrade(dep);
    }

    pub fn source_dep(&self) -> Option<DependencyHandle> {
        let guard = self.source_dep.lock().expect("shared state dep lock");
        guard.upgrade()
    }

    pub fn set_sink_dep(&self, dep: &DependencyHandle) {
        let mut guard = self.sink_dep.lock().expect("shared state dep lock");
        *guard = Arc::downgrade(dep);
    }

    pub fn sink_dep(&self) -> Option<DependencyHandle> {
        let guard = self.sink_dep.lock().expect("shared state dep lock");
        guard.upgrade()
    }
}

impl Default for BasicSharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload object exchanged across one pipeline boundary.
///
/// Operator families embed a [`BasicSharedState`] and add the cross-stage
/// payload (hash tables, buffered chunks, counters). The payload is mutated
/// only by the two operator instances on its sides; dependency readiness is
/// the memory-visibility barrier between them.
pub trait SharedState: Send + Sync {
    fn basic(&self) -> &BasicSharedState;
    fn name(&self) -> &str;
}

/// Null shared state for operators that join the pipeline-task protocol but
/// carry no cross-stage payload.
pub struct FakeSharedState {
    basic: BasicSharedState,
}

impl FakeSharedState {
    pub fn new() -> Self {
        Self {
            basic: BasicSharedState::new(),
        }
    }
}

impl Default for FakeSharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState for FakeSharedState {
    fn basic(&self) -> &BasicSharedState {
        &self.basic
    }

    fn name(&self) -> &str {
        "FakeSharedState"
    }
}

/// Closed set of dependency behaviors. The variant set is stable; adding a
/// variant requires touching every dispatch site in this module.
pub(crate) enum DependencyKind {
    Default,
    And,
    RuntimeFilter(RuntimeFilterGate),
    AsyncWriter,
    Fake,
}

/// Gating state of a runtime-filter dependency: outstanding-filter count plus
/// an externally-owned cancellation flag.
pub(crate) struct RuntimeFilterGate {
    filters: AtomicI32,
    blocked_by_rf: Mutex<Option<Arc<AtomicBool>>>,
}

/// Dependency primitive modelling one gating condition of a pipeline task.
pub struct Dependency {
    id: i32,
    node_id: i32,
    name: String,
    is_write_dependency: bool,
    ready: AtomicBool,
    eos: AtomicBool,
    shared_state: Mutex<Option<Arc<dyn SharedState>>>,
    parent: Mutex<Weak<Dependency>>,
    children: Mutex<Vec<DependencyHandle>>,
    blocked_tasks: Mutex<Vec<Arc<dyn BlockedTask>>>,
    watcher: BlockWatcher,
    throttle: DependencyLogThrottle,
    kind: DependencyKind,
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("name", &self.name())
            .field("ready", &self.is_ready())
            .field("eos", &self.eos())
            .finish()
    }
}

impl Dependency {
    fn with_kind(
        id: i32,
        node_id: i32,
        name: impl Into<String>,
        is_write_dependency: bool,
        ready: bool,
        kind: DependencyKind,
    ) -> DependencyHandle {
        Arc::new(Self {
            id,
            node_id,
            name: name.into(),
            is_write_dependency,
            ready: AtomicBool::new(ready),
            eos: AtomicBool::new(false),
            shared_state: Mutex::new(None),
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(Vec::new()),
            blocked_tasks: Mutex::new(Vec::new()),
            watcher: BlockWatcher::new(),
            throttle: DependencyLogThrottle::new(),
            kind,
        })
    }

    /// Default (source-consumed) dependency, initially blocked.
    pub fn new(id: i32, node_id: i32, name: impl Into<String>) -> DependencyHandle {
        Self::with_kind(id, node_id, name, false, false, DependencyKind::Default)
    }

    /// Write (sink-produced) dependency with explicit initial readiness.
    pub fn new_write(
        id: i32,
        node_id: i32,
        name: impl Into<String>,
        ready: bool,
    ) -> DependencyHandle {
        Self::with_kind(id, node_id, name, true, ready, DependencyKind::Default)
    }

    /// Conjunction of child dependencies: blocked while any child is blocked.
    pub fn new_and(id: i32, node_id: i32) -> DependencyHandle {
        Self::with_kind(id, node_id, "AndDependency", false, false, DependencyKind::And)
    }

    /// Null dependency that never blocks.
    pub fn new_fake(id: i32, node_id: i32) -> DependencyHandle {
        Self::with_kind(id, node_id, "FakeDependency", false, true, DependencyKind::Fake)
    }

    /// Write dependency pre-initialized to ready; the sink's actual readiness
    /// is governed by an external asynchronous writer.
    pub fn new_async_writer(id: i32, node_id: i32) -> DependencyHandle {
        Self::with_kind(
            id,
            node_id,
            "AsyncWriterDependency",
            true,
            true,
            DependencyKind::AsyncWriter,
        )
    }

    /// Dependency gated on dynamically pushed runtime filters.
    pub fn new_runtime_filter(id: i32, node_id: i32, name: impl Into<String>) -> DependencyHandle {
        Self::with_kind(
            id,
            node_id,
            name,
            false,
            false,
            DependencyKind::RuntimeFilter(RuntimeFilterGate {
                filters: AtomicI32::new(0),
                blocked_by_rf: Mutex::new(None),
            }),
        )
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    /// Human-readable label; composite dependencies synthesize it from their
    /// children.
    pub fn name(&self) -> String {
        match self.kind {
            DependencyKind::And => {
                let children = self.children.lock().expect("dependency children lock");
                let mut out = format!("{}[", self.name);
                for child in children.iter() {
                    out.push_str(&child.name());
                    out.push_str(", ");
                }
                out.push(']');
                out
            }
            _ => self.name.clone(),
        }
    }

    pub fn is_write_dependency(&self) -> bool {
        self.is_write_dependency
    }

    pub fn set_parent(&self, parent: &DependencyHandle) {
        let mut guard = self.parent.lock().expect("dependency parent lock");
        *guard = Arc::downgrade(parent);
    }

    pub fn parent(&self) -> Option<DependencyHandle> {
        let guard = self.parent.lock().expect("dependency parent lock");
        guard.upgrade()
    }

    pub fn add_child(self: &Arc<Self>, child: DependencyHandle) {
        child.set_parent(self);
        let mut guard = self.children.lock().expect("dependency children lock");
        guard.push(child);
    }

    pub fn shared_state(&self) -> Option<Arc<dyn SharedState>> {
        let guard = self.shared_state.lock().expect("dependency state lock");
        guard.clone()
    }

    pub fn set_shared_state(&self, shared_state: Arc<dyn SharedState>) {
        let mut guard = self.shared_state.lock().expect("dependency state lock");
        *guard = Some(shared_state);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn eos(&self) -> bool {
        self.eos.load(Ordering::Acquire)
    }

    fn done(&self) -> bool {
        self.eos() || self.is_ready()
    }

    /// Which dependency the current pipeline task is blocked by; `None` if
    /// this dependency is ready. Passing a task registers it as a waiter.
    pub fn is_blocked_by(
        self: &Arc<Self>,
        task: Option<&Arc<dyn BlockedTask>>,
    ) -> Option<DependencyHandle> {
        match &self.kind {
            DependencyKind::Fake => None,
            DependencyKind::And => {
                let children = {
                    let guard = self.children.lock().expect("dependency children lock");
                    guard.clone()
                };
                for child in &children {
                    if let Some(dep) = child.is_blocked_by(task) {
                        return Some(dep);
                    }
                }
                None
            }
            DependencyKind::RuntimeFilter(gate) => {
                if let Some(flag) = gate.blocked_by_rf() {
                    if !flag.load(Ordering::Acquire) {
                        return None;
                    }
                }
                if gate.filters.load(Ordering::Acquire) == 0 {
                    return None;
                }
                let blocked = self.base_is_blocked_by(task);
                if blocked.is_some() {
                    self.log_slow_block(gate.filters.load(Ordering::Acquire));
                }
                blocked
            }
            DependencyKind::Default | DependencyKind::AsyncWriter => {
                let blocked = self.base_is_blocked_by(task);
                if blocked.is_some() {
                    self.log_slow_block(0);
                }
                blocked
            }
        }
    }

    // Readiness check and waiter registration share one lock with the drain
    // in set_ready, so a registering task is either rejected (already ready)
    // or guaranteed to be drained by a later set_ready.
    fn base_is_blocked_by(
        self: &Arc<Self>,
        task: Option<&Arc<dyn BlockedTask>>,
    ) -> Option<DependencyHandle> {
        let mut guard = self.blocked_tasks.lock().expect("dependency task lock");
        if self.done() {
            return None;
        }
        if let Some(task) = task {
            guard.push(Arc::clone(task));
        }
        Some(Arc::clone(self))
    }

    /// Registers a waiter without answering the blocked question. Safe against
    /// a concurrent `set_ready`: readiness is re-checked after registration
    /// and the registry flushed, so the waiter cannot be left parked.
    pub fn add_block_task(&self, task: Arc<dyn BlockedTask>) {
        {
            let mut guard = self.blocked_tasks.lock().expect("dependency task lock");
            guard.push(task);
        }
        if self.done() {
            self.wake_blocked_tasks();
        }
    }

    /// Idempotently publishes readiness and wakes every registered waiter.
    pub fn set_ready(&self) {
        if self.ready.swap(true, Ordering::AcqRel) {
            return;
        }
        self.watcher.stop();
        self.wake_blocked_tasks();
    }

    fn wake_blocked_tasks(&self) {
        let drained = {
            let mut guard = self.blocked_tasks.lock().expect("dependency task lock");
            std::mem::take(&mut *guard)
        };
        if !drained.is_empty() {
            debug!(
                "Dependency ready: dep_id={} node_id={} name={} waiters={}",
                self.id,
                self.node_id,
                self.name(),
                drained.len()
            );
        }
        for task in drained {
            task.wake();
        }
    }

    /// Transitions back to blocked; a no-op once eos is reached.
    pub fn block(&self) {
        if self.eos() {
            return;
        }
        self.ready.store(false, Ordering::Release);
    }

    /// Idempotently enters the terminal end-of-stream state: readiness becomes
    /// permanent, and a write dependency propagates eos to the paired source
    /// dependency of its shared state before returning.
    pub fn set_eos(&self) {
        if self.eos.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_ready();
        if self.is_write_dependency
            && let Some(shared_state) = self.shared_state()
            && let Some(source_dep) = shared_state.basic().source_dep()
        {
            source_dep.set_eos();
        }
    }

    /// Write-dependency helper: readies the paired source dependency once the
    /// sink has produced enough state for the downstream source to proceed.
    pub fn set_ready_to_read(&self) {
        assert!(
            self.is_write_dependency,
            "set_ready_to_read on non-write dependency: {}",
            self.debug_string(0)
        );
        let shared_state = self
            .shared_state()
            .unwrap_or_else(|| panic!("set_ready_to_read without shared state: {}", self.debug_string(0)));
        let source_dep = shared_state.basic().source_dep().unwrap_or_else(|| {
            panic!(
                "set_ready_to_read without paired source dependency: {}",
                self.debug_string(0)
            )
        });
        source_dep.set_ready();
    }

    /// Starts blocked-time measurement, recursively through children first.
    pub fn start_watcher(&self) {
        let children = {
            let guard = self.children.lock().expect("dependency children lock");
            guard.clone()
        };
        for child in &children {
            child.start_watcher();
        }
        self.watcher.start();
    }

    pub fn watcher_elapse_time(&self) -> Duration {
        self.watcher.elapsed()
    }

    fn log_slow_block(&self, outstanding_filters: i32) {
        let blocked = self.watcher.elapsed();
        if self.throttle.should_log(blocked) {
            warn!(
                "Dependency blocked too long: dep_id={} node_id={} name={} blocked_ms={} outstanding_filters={}",
                self.id,
                self.node_id,
                self.name(),
                blocked.as_millis(),
                outstanding_filters
            );
        }
    }

    pub fn debug_string(&self, indentation_level: usize) -> String {
        let indent = "  ".repeat(indentation_level);
        let mut out = format!(
            "{}{}: id={}, node_id={}, ready={}, eos={}, is_write={}",
            indent,
            self.name(),
            self.id,
            self.node_id,
            self.is_ready(),
            self.eos(),
            self.is_write_dependency
        );
        let children = self.children.lock().expect("dependency children lock");
        for child in children.iter() {
            out.push('\n');
            out.push_str(&child.debug_string(indentation_level + 1));
        }
        out
    }

    pub(crate) fn runtime_filter_gate(&self) -> &RuntimeFilterGate {
        match &self.kind {
            DependencyKind::RuntimeFilter(gate) => gate,
            _ => panic!(
                "not a runtime filter dependency: {}",
                self.debug_string(0)
            ),
        }
    }
}

impl RuntimeFilterGate {
    fn blocked_by_rf(&self) -> Option<Arc<AtomicBool>> {
        let guard = self.blocked_by_rf.lock().expect("runtime filter gate lock");
        guard.clone()
    }

    pub(crate) fn set_blocked_by_rf(&self, flag: Arc<AtomicBool>) {
        let mut guard = self.blocked_by_rf.lock().expect("runtime filter gate lock");
        *guard = Some(flag);
    }

    pub(crate) fn add(&self) {
        self.filters.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns true on the 1 -> 0 edge, which must be detected exactly once.
    pub(crate) fn sub(&self) -> bool {
        self.filters.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn outstanding(&self) -> i32 {
        self.filters.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    pub(crate) struct TestTask {
        id: usize,
        wakes: AtomicUsize,
    }

    impl TestTask {
        pub(crate) fn new(id: usize) -> Arc<Self> {
            Arc::new(Self {
                id,
                wakes: AtomicUsize::new(0),
            })
        }

        pub(crate) fn wake_count(&self) -> usize {
            self.wakes.load(Ordering::Acquire)
        }
    }

    impl BlockedTask for TestTask {
        fn task_id(&self) -> usize {
            self.id
        }

        fn wake(&self) {
            self.wakes.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn as_blocked(task: &Arc<TestTask>) -> Arc<dyn BlockedTask> {
        Arc::clone(task) as Arc<dyn BlockedTask>
    }

    #[test]
    fn blocked_until_ready_then_permanently_unblocked() {
        let dep = Dependency::new(0, 1, "TEST_DEP");
        assert!(dep.is_blocked_by(None).is_some());
        dep.set_ready();
        assert!(dep.is_blocked_by(None).is_none());
        dep.block();
        assert!(dep.is_blocked_by(None).is_some());
        dep.set_eos();
        assert!(dep.is_blocked_by(None).is_none());
        // eos wins over block
        dep.block();
        assert!(dep.is_blocked_by(None).is_none());
    }

    #[test]
    fn registered_waiter_is_woken_by_set_ready() {
        let dep = Dependency::new(0, 1, "TEST_DEP");
        let task = TestTask::new(7);
        let blocked = dep.is_blocked_by(Some(&as_blocked(&task)));
        assert!(blocked.is_some());
        assert_eq!(task.wake_count(), 0);
        dep.set_ready();
        assert_eq!(task.wake_count(), 1);
        // idempotent: no double wake
        dep.set_ready();
        assert_eq!(task.wake_count(), 1);
    }

    #[test]
    fn add_block_task_after_ready_still_wakes() {
        let dep = Dependency::new(0, 1, "TEST_DEP");
        dep.set_ready();
        let task = TestTask::new(3);
        dep.add_block_task(as_blocked(&task));
        assert_eq!(task.wake_count(), 1);
    }

    #[test]
    fn eos_propagates_to_paired_source_dependency() {
        let sink_dep = Dependency::new_write(0, 1, "SINK_DEP", false);
        let source_dep = Dependency::new(1, 1, "SOURCE_DEP");
        let shared: Arc<dyn SharedState> = Arc::new(FakeSharedState::new());
        shared.basic().set_source_dep(&source_dep);
        shared.basic().set_sink_dep(&sink_dep);
        sink_dep.set_shared_state(Arc::clone(&shared));

        sink_dep.set_eos();
        assert!(source_dep.eos());
        assert!(source_dep.is_blocked_by(None).is_none());

        // second call must not re-propagate (source waiters woken once)
        let task = TestTask::new(1);
        source_dep.add_block_task(as_blocked(&task));
        let woken_after_first = task.wake_count();
        sink_dep.set_eos();
        assert_eq!(task.wake_count(), woken_after_first);
    }

    #[test]
    fn set_ready_to_read_readies_source_side() {
        let sink_dep = Dependency::new_write(0, 2, "BUILD_DEP", false);
        let source_dep = Dependency::new(1, 2, "PROBE_DEP");
        let shared: Arc<dyn SharedState> = Arc::new(FakeSharedState::new());
        shared.basic().set_source_dep(&source_dep);
        sink_dep.set_shared_state(shared);

        assert!(source_dep.is_blocked_by(None).is_some());
        sink_dep.set_ready_to_read();
        assert!(source_dep.is_blocked_by(None).is_none());
        assert!(!source_dep.eos());
    }

    #[test]
    #[should_panic(expected = "non-write dependency")]
    fn set_ready_to_read_asserts_write_dependency() {
        let dep = Dependency::new(0, 1, "READ_DEP");
        dep.set_ready_to_read();
    }

    #[test]
    fn and_dependency_blocks_on_first_blocked_child() {
        let and_dep = Dependency::new_and(0, 5);
        let c1 = Dependency::new(1, 5, "C1");
        let c2 = Dependency::new(2, 5, "C2");
        c2.set_ready();
        and_dep.add_child(Arc::clone(&c1));
        and_dep.add_child(Arc::clone(&c2));

        let blocking = and_dep.is_blocked_by(None).expect("blocked");
        assert_eq!(blocking.id(), c1.id());
        assert_eq!(blocking.name(), "C1");

        c1.set_ready();
        assert!(and_dep.is_blocked_by(None).is_none());
        assert!(and_dep.name().starts_with("AndDependency["));
        assert_eq!(c1.parent().expect("parent").id(), and_dep.id());
    }

    #[test]
    fn fake_dependency_never_blocks() {
        let dep = Dependency::new_fake(0, 1);
        assert!(dep.is_blocked_by(None).is_none());
        dep.block();
        assert!(dep.is_blocked_by(None).is_none());
    }

    #[test]
    fn async_writer_dependency_starts_ready() {
        let dep = Dependency::new_async_writer(0, 1);
        assert!(dep.is_write_dependency());
        assert!(dep.is_blocked_by(None).is_none());
        // an external writer may still block it explicitly
        dep.block();
        assert!(dep.is_blocked_by(None).is_some());
        dep.set_ready();
        assert!(dep.is_blocked_by(None).is_none());
    }

    #[test]
    fn watcher_accumulates_across_episodes() {
        let dep = Dependency::new(0, 1, "TEST_DEP");
        dep.start_watcher();
        std::thread::sleep(Duration::from_millis(5));
        dep.set_ready();
        let first = dep.watcher_elapse_time();
        assert!(first >= Duration::from_millis(5));
        // stopped: no further accumulation
        std::thread::sleep(Duration::from_millis(5));
        let second = dep.watcher_elapse_time();
        assert_eq!(first, second);
        dep.block();
        dep.start_watcher();
        std::thread::sleep(Duration::from_millis(5));
        assert!(dep.watcher_elapse_time() > second);
    }

    #[test]
    fn throttle_only_fires_past_threshold_and_interval() {
        let throttle = DependencyLogThrottle::new();
        assert!(!throttle.should_log(Duration::from_secs(1)));
        assert!(!throttle.should_log(SLOW_DEPENDENCY_THRESHOLD - Duration::from_nanos(1)));
        assert!(throttle.should_log(SLOW_DEPENDENCY_THRESHOLD));
        assert!(!throttle.should_log(SLOW_DEPENDENCY_THRESHOLD + Duration::from_secs(1)));
        assert!(throttle.should_log(SLOW_DEPENDENCY_THRESHOLD + DEPENDENCY_LOG_INTERVAL));
    }
}

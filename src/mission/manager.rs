//! Process Manager: admission, capacity enforcement, the monitor loop
//! (spec §4.5).
//!
//! Grounded on the teacher's `server::manager::Manager` (a `DashMap` of
//! domain objects behind constructor-injected capabilities, plus a
//! `thiserror` error enum) and `server::server::Server`'s `CancellationToken`
//! for shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Configuration;
use crate::container_host::ContainerHost;
use crate::state_store::StateStore;

use super::process::{Process, ProcessStatus, ProcessTuning};
use super::queue::{AdmissionQueue, QueueItem};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("operation already scheduled: {0}")]
    DuplicateOperation(String),

    #[error("container host error: {0}")]
    ContainerHost(#[from] crate::container_host::ContainerHostError),

    #[error("state store error: {0}")]
    StateStore(#[from] crate::state_store::StateStoreError),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// `processes_info()`'s shape (spec §4.5): a map of id to bare state name
/// for each of the active and old sets. Detail text and `error_code` are
/// not part of this projection (spec §7) — fetch those from the
/// StateStore. An empty set serializes to `null`, mirroring
/// `__get_active_processes` returning `None` when nothing is tracked.
#[derive(Debug, Default, serde::Serialize)]
pub struct ProcessesInfo {
    #[serde(serialize_with = "null_if_empty")]
    pub active: std::collections::HashMap<Uuid, String>,
    #[serde(serialize_with = "null_if_empty")]
    pub old: std::collections::HashMap<Uuid, String>,
}

fn null_if_empty<S>(
    map: &std::collections::HashMap<Uuid, String>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if map.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.collect_map(map.iter())
    }
}

/// Admits submissions, enforces capacity (O2) and operation uniqueness
/// (O1), runs the monitor loop, and delegates every status change to the
/// StateStore (O4).
pub struct ProcessManager {
    active: DashMap<Uuid, Arc<Process>>,
    old: DashMap<Uuid, Arc<Process>>,
    queue: AdmissionQueue,
    host: Arc<dyn ContainerHost>,
    store: Arc<dyn StateStore>,
    tuning: ProcessTuning,
    max_concurrent_processes: usize,
    monitor_idle: Duration,
    running_count: AtomicUsize,
    shutdown: CancellationToken,
}

impl ProcessManager {
    /// Boot sequence (spec §4.5): clear dangling records, then start the
    /// monitor loop as a background task.
    pub async fn new(
        config: Arc<Configuration>,
        host: Arc<dyn ContainerHost>,
        store: Arc<dyn StateStore>,
    ) -> ManagerResult<Arc<Self>> {
        let cleared = store.cleanup_dangling().await?;
        if cleared > 0 {
            warn!(count = cleared, "cleared dangling process records from a prior run");
        }

        let tuning = ProcessTuning {
            wait_quantum: Duration::from_secs(config.process.wait_quantum_secs),
            stop_grace: Duration::from_secs(config.process.stop_grace_secs),
            delete_containers: config.docker.delete_containers,
        };

        let manager = Arc::new(Self {
            active: DashMap::new(),
            old: DashMap::new(),
            queue: AdmissionQueue::new(),
            host,
            store,
            tuning,
            max_concurrent_processes: config.process.max_concurrent_processes,
            monitor_idle: Duration::from_secs(config.process.monitor_idle_secs),
            running_count: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        });

        let loop_handle = manager.clone();
        tokio::spawn(async move { loop_handle.monitor_loop().await });

        Ok(manager)
    }

    /// Stops the monitor loop. Supervisor tasks already spawned run to
    /// completion independently; this only ends admission of new work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// `schedule` (spec §4.5): `None` if the image is unavailable,
    /// `DuplicateOperation` if an active Process shares `operation_id`,
    /// otherwise enqueues and returns the freshly minted id. `operation_id`
    /// and `effective_start_time` are read from `mission_payload` (spec §6:
    /// the core treats the payload as opaque except for these fields).
    pub async fn schedule(
        &self,
        image: String,
        mission_payload: Value,
        issuer_id: String,
    ) -> ManagerResult<Option<Uuid>> {
        if !self.host.has_image(&image).await? {
            return Ok(None);
        }

        let operation_id = super::payload::extract_operation_id(&mission_payload);
        if self.active.iter().any(|entry| entry.value().operation_id() == operation_id) {
            return Err(ManagerError::DuplicateOperation(operation_id));
        }

        let effective_start_time =
            super::payload::extract_effective_start_time(&mission_payload, now_secs());

        let id = Uuid::new_v4();
        self.queue.put(QueueItem {
            effective_start_time,
            id,
            image,
            mission_payload,
            issuer_id,
        });
        debug!(id = %id, operation_id = %operation_id, "mission enqueued");
        Ok(Some(id))
    }

    /// `halt` (spec §4.5): true if the process was found active and halt
    /// requested; false otherwise (including already-terminal or still
    /// queued, neither of which this core supports halting).
    pub fn halt(&self, process_id: Uuid) -> bool {
        match self.active.get(&process_id) {
            Some(entry) => {
                entry.value().halt();
                true
            }
            None => false,
        }
    }

    pub fn get_queue_for(&self, issuer_id: &str) -> Vec<QueueItem> {
        self.queue.snapshot_for(issuer_id)
    }

    pub fn processes_info(&self) -> ProcessesInfo {
        let mut info = ProcessesInfo::default();
        for entry in self.active.iter() {
            info.active.insert(*entry.key(), entry.value().status().0.as_str().to_string());
        }
        for entry in self.old.iter() {
            info.old.insert(*entry.key(), entry.value().status().0.as_str().to_string());
        }
        info
    }

    /// The monitor loop (spec §4.5): classify the active set, sweep
    /// terminal entries into `old`, admit from the queue while capacity and
    /// time permit, and sleep adaptively when nothing is due.
    async fn monitor_loop(self: Arc<Self>) {
        info!("monitor loop started");
        loop {
            if self.shutdown.is_cancelled() {
                info!("monitor loop stopping");
                return;
            }

            self.sweep_terminal();
            self.dequeue_step().await;

            let idle = self.next_sleep();
            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = self.shutdown.cancelled() => {
                    info!("monitor loop stopping");
                    return;
                }
            }
        }
    }

    fn sweep_terminal(&self) {
        let terminal: Vec<Uuid> = self
            .active
            .iter()
            .filter(|entry| entry.value().is_terminal())
            .map(|entry| *entry.key())
            .collect();

        for id in terminal {
            if let Some((id, process)) = self.active.remove(&id) {
                self.old.insert(id, process);
            }
        }

        let running = self
            .active
            .iter()
            .filter(|entry| entry.value().status().0 == ProcessStatus::Running)
            .count();
        self.running_count.store(running, Ordering::Relaxed);
    }

    async fn dequeue_step(self: &Arc<Self>) {
        let running = self.running_count.load(Ordering::Relaxed);
        if running >= self.max_concurrent_processes {
            return;
        }

        let Some(item) = self.queue.try_pop_due(now_secs()) else {
            return;
        };

        let operation_id = super::payload::extract_operation_id(&item.mission_payload);
        let group_id = super::payload::extract_group_id(&item.mission_payload);

        let process = Arc::new(Process::new(
            item.id,
            item.issuer_id,
            group_id,
            operation_id,
            item.image,
            item.mission_payload,
            now_secs(),
        ));

        if let Err(err) = self.store.store_new_process(&process.to_record()).await {
            warn!(id = %item.id, error = %err, "failed to persist new process record");
        }

        self.active.insert(item.id, process.clone());
        self.running_count.fetch_add(1, Ordering::Relaxed);

        let manager = self.clone();
        let host = self.host.clone();
        let tuning = self.tuning.clone();
        tokio::spawn(async move {
            process
                .supervise(host, tuning, |record| {
                    let manager = manager.clone();
                    async move {
                        manager.on_status_changed(record).await;
                    }
                })
                .await;
        });
    }

    /// Callback invoked by a Process after every transition (O4): forwards
    /// the record to the StateStore before returning, so the store mirror
    /// is always consistent by the time the supervisor proceeds.
    async fn on_status_changed(&self, record: crate::mission::process::ProcessRecord) {
        if let Err(err) = self.store.update_process_status(&record).await {
            warn!(id = %record.id, error = %err, "failed to persist status transition");
        }
    }

    /// Sleep duration for the monitor's idle wait: flat `monitor_idle` when
    /// the queue is empty, else `min(monitor_idle, head.start - now)` so
    /// earliest-start observance tightens without busy-waiting (SPEC_FULL
    /// §4.5 dequeue timing refinement).
    fn next_sleep(&self) -> Duration {
        match self.queue.peek_start_time() {
            None => self.monitor_idle,
            Some(start) => {
                let now = now_secs();
                if start <= now {
                    Duration::from_millis(0)
                } else {
                    std::cmp::min(self.monitor_idle, Duration::from_secs(start - now))
                }
            }
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::container_host::{ContainerHandle, ContainerHost, ContainerHostResult, WaitOutcome};
    use crate::mission::exit_code;
    use crate::state_store::SqliteStateStore;

    use super::*;

    /// Per-container script: how many `wait` calls to stall on (`TimedOut`)
    /// before exiting with `exit_code`.
    struct Script {
        remaining_waits: AtomicI64,
        exit_code: i64,
    }

    /// In-memory fake standing in for a Docker daemon in tests. Behavior is
    /// scripted per `operation_id` (read from the mission payload at
    /// `create` time) via [`FakeContainerHost::script`].
    struct FakeContainerHost {
        available: parking_lot::Mutex<std::collections::HashSet<String>>,
        scripts_by_operation: DashMap<String, (usize, i64)>,
        containers: DashMap<String, Script>,
    }

    impl FakeContainerHost {
        fn new() -> Self {
            Self {
                available: parking_lot::Mutex::new(std::collections::HashSet::new()),
                scripts_by_operation: DashMap::new(),
                containers: DashMap::new(),
            }
        }

        fn register_image(&self, image: &str) {
            self.available.lock().insert(image.to_string());
        }

        /// Script a mission: stall `hold_waits` times on `wait`, then exit
        /// with `exit_code`.
        fn script(&self, operation_id: &str, hold_waits: usize, exit_code: i64) {
            self.scripts_by_operation.insert(operation_id.to_string(), (hold_waits, exit_code));
        }
    }

    #[async_trait]
    impl ContainerHost for FakeContainerHost {
        async fn has_image(&self, image: &str) -> ContainerHostResult<bool> {
            Ok(self.available.lock().contains(image))
        }

        async fn create(&self, _image: &str, payload: &Value) -> ContainerHostResult<ContainerHandle> {
            let operation_id = super::super::payload::extract_operation_id(payload);
            let (hold_waits, exit_code) =
                self.scripts_by_operation.get(&operation_id).map(|e| *e).unwrap_or((0, 0));

            let id = format!("fake-{}", Uuid::new_v4());
            self.containers.insert(
                id.clone(),
                Script {
                    remaining_waits: AtomicI64::new(hold_waits as i64),
                    exit_code,
                },
            );
            Ok(ContainerHandle(id))
        }

        async fn start(&self, _handle: &ContainerHandle) -> ContainerHostResult<()> {
            Ok(())
        }

        async fn wait(&self, handle: &ContainerHandle, _timeout: StdDuration) -> ContainerHostResult<WaitOutcome> {
            let script = self.containers.get(handle.id()).expect("wait on unknown container");
            if script.remaining_waits.fetch_sub(1, Ordering::Relaxed) > 0 {
                return Ok(WaitOutcome::TimedOut);
            }
            Ok(WaitOutcome::Exited(script.exit_code))
        }

        async fn stop(&self, _handle: &ContainerHandle, _grace: StdDuration) -> ContainerHostResult<()> {
            Ok(())
        }

        async fn remove(&self, _handle: &ContainerHandle) -> ContainerHostResult<()> {
            Ok(())
        }
    }

    async fn new_manager(
        host: Arc<FakeContainerHost>,
        max_concurrent: usize,
    ) -> (Arc<ProcessManager>, Arc<SqliteStateStore>) {
        let mut config = Configuration::default();
        config.process.max_concurrent_processes = max_concurrent;
        config.process.monitor_idle_secs = 0;
        config.process.wait_quantum_secs = 1;
        config.process.stop_grace_secs = 1;
        let config = Arc::new(config);

        let store = Arc::new(SqliteStateStore::open_in_memory().unwrap());
        let manager = ProcessManager::new(config, host, store.clone()).await.unwrap();
        (manager, store)
    }

    fn payload(operation_id: &str, group_id: &str, effective_start_time: u64) -> Value {
        json!({
            "operation_id": operation_id,
            "group_id": group_id,
            "effective_start_time": effective_start_time,
        })
    }

    async fn wait_until<F: Fn() -> bool>(predicate: F, max_iters: u32) -> bool {
        for _ in 0..max_iters {
            if predicate() {
                return true;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        predicate()
    }

    #[tokio::test]
    async fn happy_path_reaches_terminated() {
        let host = Arc::new(FakeContainerHost::new());
        host.register_image("sim:ok");
        host.script("op-happy", 0, exit_code::OK);
        let (manager, _store) = new_manager(host, 2).await;

        let id = manager
            .schedule("sim:ok".into(), payload("op-happy", "g1", now_secs() - 10), "issuer-1".into())
            .await
            .unwrap()
            .unwrap();

        let reached = wait_until(
            || manager.processes_info().old.get(&id).map(|s| s.starts_with("TERMINATED")).unwrap_or(false),
            50,
        )
        .await;
        assert!(reached, "process did not reach TERMINATED in time");
    }

    #[tokio::test]
    async fn image_unavailable_returns_none() {
        let host = Arc::new(FakeContainerHost::new());
        let (manager, _store) = new_manager(host, 2).await;

        let result = manager
            .schedule("sim:missing".into(), payload("op-x", "g1", now_secs()), "issuer-1".into())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn duplicate_operation_is_rejected_while_active() {
        let host = Arc::new(FakeContainerHost::new());
        host.register_image("sim:hang");
        host.script("op-dup", 10_000, exit_code::OK);
        let (manager, _store) = new_manager(host, 2).await;

        manager
            .schedule("sim:hang".into(), payload("op-dup", "g1", now_secs() - 10), "issuer-1".into())
            .await
            .unwrap()
            .unwrap();

        wait_until(|| !manager.processes_info().active.is_empty(), 50).await;

        let dup = manager
            .schedule("sim:hang".into(), payload("op-dup", "g1", now_secs() - 10), "issuer-1".into())
            .await;
        assert!(matches!(dup, Err(ManagerError::DuplicateOperation(_))));
    }

    #[tokio::test]
    async fn halt_drives_active_process_to_halted() {
        let host = Arc::new(FakeContainerHost::new());
        host.register_image("sim:hang");
        host.script("op-halt", 10_000, exit_code::OK);
        let (manager, _store) = new_manager(host, 2).await;

        let id = manager
            .schedule("sim:hang".into(), payload("op-halt", "g1", now_secs() - 10), "issuer-1".into())
            .await
            .unwrap()
            .unwrap();

        wait_until(|| manager.processes_info().active.contains_key(&id), 50).await;
        assert!(manager.halt(id));

        let halted = wait_until(
            || manager.processes_info().old.get(&id).map(|s| s.starts_with("HALTED")).unwrap_or(false),
            50,
        )
        .await;
        assert!(halted, "process did not reach HALTED in time");
    }

    #[tokio::test]
    async fn domain_error_translates_with_message_and_code() {
        let host = Arc::new(FakeContainerHost::new());
        host.register_image("sim:wind");
        host.script("op-wind", 0, exit_code::TOO_MUCH_WIND);
        let (manager, store) = new_manager(host, 2).await;

        let id = manager
            .schedule("sim:wind".into(), payload("op-wind", "g1", now_secs() - 10), "issuer-1".into())
            .await
            .unwrap()
            .unwrap();

        let reached = wait_until(
            || {
                manager
                    .processes_info()
                    .old
                    .get(&id)
                    .map(|s| s == "ERROR")
                    .unwrap_or(false)
            },
            50,
        )
        .await;
        assert!(reached, "process did not reach ERROR in time");

        let record = store.fetch_for_test(id).await;
        assert_eq!(record.error_code, Some(exit_code::TOO_MUCH_WIND));
        assert!(record.status_message.unwrap_or_default().contains("too much wind"));
    }

    #[tokio::test]
    async fn earliest_start_time_is_respected() {
        let host = Arc::new(FakeContainerHost::new());
        host.register_image("sim:future");
        host.script("op-future", 0, exit_code::OK);
        let (manager, _store) = new_manager(host, 2).await;

        let id = manager
            .schedule("sim:future".into(), payload("op-future", "g1", now_secs() + 3600), "issuer-1".into())
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert!(!manager.processes_info().active.contains_key(&id));
        assert!(manager.processes_info().old.get(&id).is_none());
        assert_eq!(manager.get_queue_for("issuer-1").len(), 1);
    }

    #[tokio::test]
    async fn capacity_cap_limits_concurrent_running_processes() {
        let host = Arc::new(FakeContainerHost::new());
        host.register_image("sim:hang");
        host.script("op-cap-1", 10_000, exit_code::OK);
        host.script("op-cap-2", 10_000, exit_code::OK);
        let (manager, _store) = new_manager(host, 1).await;

        manager
            .schedule("sim:hang".into(), payload("op-cap-1", "g1", now_secs() - 10), "issuer-1".into())
            .await
            .unwrap()
            .unwrap();
        manager
            .schedule("sim:hang".into(), payload("op-cap-2", "g1", now_secs() - 10), "issuer-1".into())
            .await
            .unwrap()
            .unwrap();

        wait_until(|| manager.processes_info().active.len() == 1, 50).await;
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        assert_eq!(manager.processes_info().active.len(), 1);
        assert_eq!(manager.get_queue_for("issuer-1").len(), 1);
    }
}

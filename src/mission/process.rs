//! Process: one container's lifecycle (spec §4.1, §4.3)
//!
//! Grounded on the teacher's per-server supervision in
//! `environment/docker/power.rs` (create → start → wait/attach race) and
//! `server/state.rs` (atomic, cross-thread-observable flag); generalized
//! here to a `CancellationToken` should-stop signal and the domain exit-code
//! translation in [`crate::mission::exit_code`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::container_host::{ContainerHandle, ContainerHost, WaitOutcome};
use crate::mission::exit_code::{self, UNDEFINED_ERROR};

/// Process lifecycle state (spec §4.3). Terminal variants are absorbing:
/// once reached, no further transition is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessStatus {
    Created,
    Running,
    Terminated,
    Error,
    Halted,
}

impl ProcessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Terminated | ProcessStatus::Error | ProcessStatus::Halted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Created => "CREATED",
            ProcessStatus::Running => "RUNNING",
            ProcessStatus::Terminated => "TERMINATED",
            ProcessStatus::Error => "ERROR",
            ProcessStatus::Halted => "HALTED",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ProcessStatus::Created,
            1 => ProcessStatus::Running,
            2 => ProcessStatus::Terminated,
            3 => ProcessStatus::Error,
            _ => ProcessStatus::Halted,
        }
    }
}

/// A structured snapshot of a Process, the shape persisted to the
/// StateStore and surfaced to introspection callers (spec §3 "Process
/// record").
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRecord {
    pub id: Uuid,
    pub issuer_id: String,
    pub group_id: String,
    pub operation_id: String,
    pub image: String,
    pub mission_payload: Value,
    pub status: ProcessStatus,
    pub status_message: Option<String>,
    pub error_code: Option<i64>,
    pub created_at: u64,
}

/// Tunables the supervisor needs that don't belong on the record itself.
#[derive(Debug, Clone)]
pub struct ProcessTuning {
    pub wait_quantum: Duration,
    pub stop_grace: Duration,
    pub delete_containers: bool,
}

/// One container's lifecycle, the spec's `Process` (§4.1). Wraps a
/// `CancellationToken` should-stop flag that is single-writer (halt
/// caller) and single-reader (the supervisor task).
pub struct Process {
    id: Uuid,
    issuer_id: String,
    group_id: String,
    operation_id: String,
    image: String,
    mission_payload: Value,
    created_at: u64,
    status: AtomicU8,
    status_message: parking_lot::Mutex<Option<String>>,
    error_code: ErrorCodeCell,
    should_stop: CancellationToken,
}

struct ErrorCodeCell(parking_lot::Mutex<Option<i64>>);

impl ErrorCodeCell {
    fn new() -> Self {
        Self(parking_lot::Mutex::new(None))
    }
    fn set(&self, v: Option<i64>) {
        *self.0.lock() = v;
    }
    fn get(&self) -> Option<i64> {
        *self.0.lock()
    }
}

impl Process {
    pub fn new(
        id: Uuid,
        issuer_id: String,
        group_id: String,
        operation_id: String,
        image: String,
        mission_payload: Value,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            issuer_id,
            group_id,
            operation_id,
            image,
            mission_payload,
            created_at,
            status: AtomicU8::new(0),
            status_message: parking_lot::Mutex::new(None),
            error_code: ErrorCodeCell::new(),
            should_stop: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn issuer_id(&self) -> &str {
        &self.issuer_id
    }
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }
    pub fn image(&self) -> &str {
        &self.image
    }
    pub fn mission_payload(&self) -> &Value {
        &self.mission_payload
    }

    /// Current status and its formatted `"STATE (message)"` display string.
    pub fn status(&self) -> (ProcessStatus, String) {
        let status = ProcessStatus::from_u8(self.status.load(Ordering::Acquire));
        let message = self.status_message.lock().clone();
        let display = match &message {
            Some(m) => format!("{} ({})", status.as_str(), m),
            None => status.as_str().to_string(),
        };
        (status, display)
    }

    pub fn is_terminal(&self) -> bool {
        ProcessStatus::from_u8(self.status.load(Ordering::Acquire)).is_terminal()
    }

    /// Request forced termination. Cooperative: sets the should-stop flag
    /// polled by the supervisor. A no-op on an already-terminal Process
    /// (spec §4.1 "Halting an already-terminal Process is a no-op").
    pub fn halt(&self) {
        if !self.is_terminal() {
            self.should_stop.cancel();
        }
    }

    /// Structured snapshot for the StateStore (spec §4.1 `to_dict`).
    pub fn to_record(&self) -> ProcessRecord {
        let (status, _) = self.status();
        ProcessRecord {
            id: self.id,
            issuer_id: self.issuer_id.clone(),
            group_id: self.group_id.clone(),
            operation_id: self.operation_id.clone(),
            image: self.image.clone(),
            mission_payload: self.mission_payload.clone(),
            status,
            status_message: self.status_message.lock().clone(),
            error_code: self.error_code.get(),
            created_at: self.created_at,
        }
    }

    fn set_status(&self, status: ProcessStatus, message: Option<String>, error_code: Option<i64>) {
        self.status.store(status as u8, Ordering::Release);
        *self.status_message.lock() = message;
        self.error_code.set(error_code);
    }

    /// Run the supervisor algorithm (spec §4.1 steps 1-6) to completion,
    /// invoking `on_status_changed` after every transition (O4: the store
    /// mirror must be updated before the manager's callback returns, which
    /// this enforces by awaiting the callback before proceeding).
    pub async fn supervise<F, Fut>(
        self: Arc<Self>,
        host: Arc<dyn ContainerHost>,
        tuning: ProcessTuning,
        on_status_changed: F,
    ) where
        F: Fn(ProcessRecord) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        self.set_status(ProcessStatus::Running, None, None);
        info!(id = %self.id, operation_id = %self.operation_id, "process starting");
        on_status_changed(self.to_record()).await;

        let handle = match host.create(&self.image, &self.mission_payload).await {
            Ok(h) => h,
            Err(err) => {
                error!(id = %self.id, error = %err, "container create failed");
                self.set_status(ProcessStatus::Error, Some(err.to_string()), None);
                on_status_changed(self.to_record()).await;
                return;
            }
        };

        if let Err(err) = host.start(&handle).await {
            error!(id = %self.id, error = %err, "container start failed");
            self.set_status(ProcessStatus::Error, Some(err.to_string()), None);
            on_status_changed(self.to_record()).await;
            return;
        }

        let terminal = self.wait_loop(&host, &handle, &tuning).await;

        if tuning.delete_containers {
            if let Err(err) = host.remove(&handle).await {
                warn!(id = %self.id, error = %err, "container removal failed, leaking container");
            }
        }

        self.set_status(terminal.0, terminal.1, terminal.2);
        on_status_changed(self.to_record()).await;
        debug!(id = %self.id, status = ?self.status().0, "process reached terminal state");
    }

    /// The monitor loop of step 4: poll should-stop, else wait with a
    /// bounded timeout and translate the exit code when it resolves.
    async fn wait_loop(
        &self,
        host: &Arc<dyn ContainerHost>,
        handle: &ContainerHandle,
        tuning: &ProcessTuning,
    ) -> (ProcessStatus, Option<String>, Option<i64>) {
        loop {
            if self.should_stop.is_cancelled() {
                return match host.stop(handle, tuning.stop_grace).await {
                    Ok(()) => (ProcessStatus::Halted, Some("process was halted".to_string()), None),
                    Err(err) => {
                        error!(id = %self.id, error = %err, "stop during halt failed");
                        (
                            ProcessStatus::Error,
                            Some(err.to_string()),
                            Some(UNDEFINED_ERROR),
                        )
                    }
                };
            }

            match host.wait(handle, tuning.wait_quantum).await {
                Ok(WaitOutcome::TimedOut) => continue,
                Ok(WaitOutcome::Exited(code)) => {
                    let translation = exit_code::translate(code);
                    return (translation.status, Some(translation.message), translation.error_code);
                }
                Err(err) => {
                    warn!(id = %self.id, error = %err, "transient wait error, retrying");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Process {
        Process::new(
            Uuid::new_v4(),
            "issuer-1".into(),
            "group-1".into(),
            "op-1".into(),
            "sim:ok".into(),
            serde_json::json!({}),
            1000,
        )
    }

    #[test]
    fn starts_created_and_not_terminal() {
        let p = sample();
        assert_eq!(p.status().0, ProcessStatus::Created);
        assert!(!p.is_terminal());
    }

    #[test]
    fn halt_on_terminal_process_is_noop() {
        let p = sample();
        p.set_status(ProcessStatus::Terminated, None, None);
        p.halt();
        assert!(!p.should_stop.is_cancelled());
    }

    #[test]
    fn halt_on_active_process_cancels_token() {
        let p = sample();
        p.set_status(ProcessStatus::Running, None, None);
        p.halt();
        assert!(p.should_stop.is_cancelled());
    }

    #[test]
    fn status_display_includes_message() {
        let p = sample();
        p.set_status(ProcessStatus::Error, Some("boom".to_string()), Some(99));
        let (status, display) = p.status();
        assert_eq!(status, ProcessStatus::Error);
        assert_eq!(display, "ERROR (boom)");
    }

    #[test]
    fn to_record_reflects_current_state() {
        let p = sample();
        p.set_status(ProcessStatus::Terminated, None, None);
        let record = p.to_record();
        assert_eq!(record.status, ProcessStatus::Terminated);
        assert_eq!(record.operation_id, "op-1");
        assert!(record.error_code.is_none());
    }
}

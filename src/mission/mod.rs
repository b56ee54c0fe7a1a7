//! Mission process management
//!
//! The Process Manager core (spec §1): the admission queue, the
//! capacity-bounded supervision of active processes, the lifecycle state
//! machine, the monitor loop, and the persistence hooks.

pub mod exit_code;
pub mod manager;
pub mod payload;
pub mod process;
pub mod queue;

pub use manager::{ManagerError, ProcessManager, ProcessesInfo};
pub use payload::{extract_operation_id, MISSION_PAYLOAD_REQUIRED_KEYS};
pub use process::{Process, ProcessRecord, ProcessStatus};
pub use queue::{AdmissionQueue, QueueItem};

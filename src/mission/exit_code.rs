//! Exit-code translation (spec §4.2)
//!
//! Grounded on `examples/original_source/Orchestrator/process_manager.py`'s
//! `Process.__code_to_result`: the five domain failure branches set a
//! message and fall through to a single `Process.ERROR` return, which this
//! translator preserves by resolving all of them to `ProcessStatus::Error`.

use crate::mission::process::ProcessStatus;

pub const OK: i64 = 0;
pub const SIGTERM: i64 = 143;
pub const SIGKILL: i64 = 137;
pub const MISSION_UPLOAD_FAIL: i64 = 10;
pub const STREAM_READ_FAILURE: i64 = 11;
pub const VEHICLE_TIMED_OUT: i64 = 12;
pub const PREMATURE_LANDING: i64 = 13;
pub const UNKNOWN_VEHICLE: i64 = 14;
pub const PX4_SIM_DESYNC: i64 = 15;
pub const TOO_MUCH_WIND: i64 = 16;
pub const UNDEFINED_ERROR: i64 = 99;

/// The outcome of translating a container's exit code: the terminal
/// status it maps to, a human-readable message, and (only for ERROR) the
/// domain error code to report (spec §4.2: "Error_code is reported only
/// when the status is not TERMINATED or HALTED").
pub struct Translation {
    pub status: ProcessStatus,
    pub message: String,
    pub error_code: Option<i64>,
}

/// Translate a container exit code per the table in spec §4.2.
pub fn translate(code: i64) -> Translation {
    match code {
        OK => Translation {
            status: ProcessStatus::Terminated,
            message: "container exited normally".to_string(),
            error_code: None,
        },
        SIGTERM | SIGKILL => Translation {
            status: ProcessStatus::Halted,
            message: "process was halted".to_string(),
            error_code: None,
        },
        MISSION_UPLOAD_FAIL => error(code, "Mission upload fail."),
        STREAM_READ_FAILURE => error(code, "Failed in starting up simulation stack."),
        VEHICLE_TIMED_OUT => error(code, "Vehicle Mavlink connection timed out!"),
        PREMATURE_LANDING => error(
            code,
            "Vehicle has landed before reaching landing spot. Check vehicle configuration!",
        ),
        UNKNOWN_VEHICLE => error(code, "Unknown vehicle model, check available vehicles."),
        PX4_SIM_DESYNC => error(code, "PX4 simulation desync -- server may be overloaded."),
        TOO_MUCH_WIND => error(code, "There is too much wind to fly safely."),
        other => error(other, &format!("container exited with unrecognized code {other}")),
    }
}

fn error(code: i64, message: &str) -> Translation {
    Translation {
        status: ProcessStatus::Error,
        message: message.to_string(),
        error_code: Some(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_terminates_without_error_code() {
        let t = translate(OK);
        assert_eq!(t.status, ProcessStatus::Terminated);
        assert!(t.error_code.is_none());
    }

    #[test]
    fn sigterm_and_sigkill_halt_without_error_code() {
        for code in [SIGTERM, SIGKILL] {
            let t = translate(code);
            assert_eq!(t.status, ProcessStatus::Halted);
            assert!(t.error_code.is_none());
        }
    }

    #[test]
    fn domain_codes_error_with_passthrough_code() {
        for code in [
            MISSION_UPLOAD_FAIL,
            STREAM_READ_FAILURE,
            VEHICLE_TIMED_OUT,
            PREMATURE_LANDING,
            UNKNOWN_VEHICLE,
            PX4_SIM_DESYNC,
            TOO_MUCH_WIND,
        ] {
            let t = translate(code);
            assert_eq!(t.status, ProcessStatus::Error);
            assert_eq!(t.error_code, Some(code));
        }
    }

    #[test]
    fn too_much_wind_message_mentions_wind() {
        let t = translate(TOO_MUCH_WIND);
        assert!(t.message.contains("too much wind"));
    }

    #[test]
    fn unknown_code_falls_through_to_error() {
        let t = translate(255);
        assert_eq!(t.status, ProcessStatus::Error);
        assert_eq!(t.error_code, Some(255));
    }
}

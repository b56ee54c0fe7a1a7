//! Mission payload handling
//!
//! The core treats the mission payload as an opaque JSON blob (spec §6,
//! "The core treats the payload as opaque except for `operation_id`,
//! `group_id`, `effective_start_time`"). Full structural validation is a
//! boundary concern performed upstream of the core, carried over from
//! `examples/original_source/Orchestrator/helpers.py::validate_mission`.

use serde_json::Value;

/// The complete set of keys a mission payload must carry, per spec §6.
pub const MISSION_PAYLOAD_REQUIRED_KEYS: &[&str] = &[
    "waypoints",
    "operation_id",
    "group_id",
    "delivery_id",
    "control_area_id",
    "operation_reference_number",
    "drone_id",
    "drone_registration_number",
    "cvms_auth_token",
    "dis_auth_token",
    "dis_refresh_token",
    "thermal_model_timestep",
    "aeroacoustic_model_timestep",
    "drone_config_file",
    "g_acceleration",
    "initial_lon_lat_alt",
    "final_lon_lat_alt",
    "effective_start_time",
];

/// Boundary validation: is `payload` a JSON object carrying every required
/// key? Returns the list of missing keys, empty when valid.
pub fn missing_keys(payload: &Value) -> Vec<&'static str> {
    let Some(obj) = payload.as_object() else {
        return MISSION_PAYLOAD_REQUIRED_KEYS.to_vec();
    };

    MISSION_PAYLOAD_REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !obj.contains_key(*key))
        .collect()
}

pub fn validate(payload: &Value) -> Result<(), String> {
    let missing = missing_keys(payload);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing keys: {}", missing.join(", ")))
    }
}

/// Extract `operation_id` (spec §3, uniqueness key O1). Absent or
/// non-string values are treated as an empty operation id; validation at
/// the boundary is expected to have already rejected such payloads.
pub fn extract_operation_id(payload: &Value) -> String {
    payload
        .get("operation_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Extract `group_id` (spec §3).
pub fn extract_group_id(payload: &Value) -> String {
    payload
        .get("group_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Extract `effective_start_time` as a wall-clock epoch second (spec §3).
/// Missing or non-numeric values default to "now", making the mission
/// immediately eligible rather than stuck forever.
pub fn extract_effective_start_time(payload: &Value, now: u64) -> u64 {
    payload
        .get("effective_start_time")
        .and_then(Value::as_u64)
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_payload() -> Value {
        let mut obj = serde_json::Map::new();
        for key in MISSION_PAYLOAD_REQUIRED_KEYS {
            obj.insert(key.to_string(), json!(1));
        }
        obj.insert("operation_id".into(), json!("op1"));
        obj.insert("group_id".into(), json!("g1"));
        obj.insert("effective_start_time".into(), json!(1000));
        Value::Object(obj)
    }

    #[test]
    fn full_payload_validates() {
        assert!(validate(&full_payload()).is_ok());
    }

    #[test]
    fn missing_key_is_reported() {
        let mut payload = full_payload();
        payload.as_object_mut().unwrap().remove("waypoints");
        let err = validate(&payload).unwrap_err();
        assert!(err.contains("waypoints"));
    }

    #[test]
    fn non_object_payload_is_entirely_missing() {
        let payload = json!("not an object");
        assert_eq!(missing_keys(&payload).len(), MISSION_PAYLOAD_REQUIRED_KEYS.len());
    }

    #[test]
    fn extracts_operation_and_group_id() {
        let payload = full_payload();
        assert_eq!(extract_operation_id(&payload), "op1");
        assert_eq!(extract_group_id(&payload), "g1");
        assert_eq!(extract_effective_start_time(&payload, 0), 1000);
    }
}

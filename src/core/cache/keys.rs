//! Cache key layout for per-call state.
//!
//! Every key ends with the id it belongs to, so `*:{call_connection_id}`
//! sweeps a finished call in one pattern delete.

/// Media WebSocket id (context GUID) for a call connection
pub fn websocket_id(call_connection_id: &str) -> String {
    format!("websocket_id:{call_connection_id}")
}

/// Call connection id for a media WebSocket id
pub fn acs_call_id(websocket_id: &str) -> String {
    format!("acs_call_id:{websocket_id}")
}

/// Caller details posted with the outbound call request
pub fn payload_dict(call_connection_id: &str) -> String {
    format!("payload_dict:{call_connection_id}")
}

pub fn participant_id(call_connection_id: &str) -> String {
    format!("participant_id:{call_connection_id}")
}

pub fn current_participants(call_connection_id: &str) -> String {
    format!("current_participants:{call_connection_id}")
}

pub fn chat_history(call_connection_id: &str) -> String {
    format!("chat_history:{call_connection_id}")
}

pub fn call_active(call_connection_id: &str) -> String {
    format!("call_active:{call_connection_id}")
}

pub fn recognize_retry(call_connection_id: &str) -> String {
    format!("recognize_retry:{call_connection_id}")
}

/// PSTN number the agent talks to (callee for outbound, caller for inbound)
pub fn target_phone(call_connection_id: &str) -> String {
    format!("target_phone:{call_connection_id}")
}

/// Pattern matching every key of one call connection
pub fn all_for_call(call_connection_id: &str) -> String {
    format!("*:{call_connection_id}")
}

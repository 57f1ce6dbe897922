//! MessageCodec (C3): the wire envelope and the typed request/response/
//! notification payloads carried inside it.
//!
//! `payload` is nested JSON for anything this process constructs. On decode
//! a `payload` that arrives as a JSON string is also tried as
//! base64-of-JSON before being rejected, for wire compatibility with
//! clients that send the base64 form.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn decode(raw: &str) -> Result<Envelope, HubError> {
        let env: Envelope =
            serde_json::from_str(raw).map_err(|e| HubError::Protocol(e.to_string()))?;
        if env.message_id.is_empty() {
            return Err(HubError::Protocol("message_id must be non-empty".into()));
        }
        Ok(env)
    }

    /// Decode `payload` into a typed request/notification struct, following
    /// the base64-of-JSON fallback when `payload` is a bare JSON string.
    pub fn decode_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, HubError> {
        if let Value::String(s) = &self.payload {
            if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(s) {
                if let Ok(value) = serde_json::from_slice::<Value>(&decoded) {
                    return serde_json::from_value(value)
                        .map_err(|e| HubError::Protocol(e.to_string()));
                }
            }
        }
        serde_json::from_value(self.payload.clone()).map_err(|e| HubError::Protocol(e.to_string()))
    }

    pub fn response(message_id: &str, kind: &str, payload: impl Serialize) -> Envelope {
        Envelope {
            message_id: message_id.to_string(),
            kind: kind.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    pub fn notification(kind: &str, payload: impl Serialize) -> Envelope {
        Envelope {
            message_id: new_message_id(),
            kind: kind.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    pub fn error(message_id: &str, err: &HubError) -> Envelope {
        // `INTERNAL` messages must never leak store internals onto the wire.
        let message = if matches!(err, HubError::Internal(_)) {
            "internal error".to_string()
        } else {
            err.to_string()
        };
        Envelope::response(
            message_id,
            "Error",
            ErrorPayload {
                kind: err.kind().to_string(),
                message,
            },
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn new_message_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Canonical byte form signed by clients and verified by `AuthVerifier`:
/// the JSON object of a payload's fields excluding `signature`, with object
/// keys sorted lexicographically and no insignificant whitespace.
pub fn canonicalize(payload: &Value) -> Result<Vec<u8>, HubError> {
    let resolved = resolve_wire_payload(payload);
    let Value::Object(map) = &resolved else {
        return Err(HubError::Protocol("payload must be a JSON object".into()));
    };
    let mut filtered: Vec<(&String, &Value)> =
        map.iter().filter(|(k, _)| k.as_str() != "signature").collect();
    filtered.sort_by(|a, b| a.0.cmp(b.0));
    let sorted_value = sort_value(&Value::Object(
        filtered
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    ));
    serde_json::to_vec(&sorted_value).map_err(|e| HubError::Protocol(e.to_string()))
}

/// Same base64-of-JSON fallback `decode_payload` applies, so a `Kick`/
/// `Rename` signature verifies identically whether the client sent `payload`
/// as nested JSON or as a base64 string of it.
pub(crate) fn resolve_wire_payload(payload: &Value) -> Value {
    if let Value::String(s) = payload {
        if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(s) {
            if let Ok(value) = serde_json::from_slice::<Value>(&decoded) {
                return value;
            }
        }
    }
    payload.clone()
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.iter().map(|(k, v)| (k.clone(), sort_value(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

// ─── Request payloads ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNetworkRequest {
    pub public_key: String,
    pub network_name: String,
    pub pin: String,
    #[serde(default)]
    pub computer_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinNetworkRequest {
    pub public_key: String,
    pub network_id: String,
    pub pin: String,
    #[serde(default)]
    pub computer_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectNetworkRequest {
    pub network_id: String,
    #[serde(default)]
    pub computer_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectNetworkRequest {
    pub network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveNetworkRequest {
    pub network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickRequest {
    pub network_id: String,
    pub target_public_key: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub network_id: String,
    pub new_name: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetComputerNetworksRequest {
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub network_id: String,
    pub target_public_key: String,
    #[serde(default)]
    pub body: Value,
}

// ─── Response / notification payloads ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCreatedResponse {
    pub network_id: String,
    pub name: String,
    pub assigned_ip: String,
    pub subnet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkJoinedResponse {
    pub network_id: String,
    pub name: String,
    pub assigned_ip: String,
    pub subnet: String,
    pub members: Vec<MemberInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub public_key: String,
    pub computer_name: String,
    pub assigned_ip: String,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConnectedResponse {
    pub network_id: String,
    pub assigned_ip: String,
    pub members: Vec<MemberInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDisconnectedResponse {
    pub network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveNetworkResponse {
    pub network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickSuccessResponse {
    pub network_id: String,
    pub target_public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameSuccessResponse {
    pub network_id: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerNetworksResponse {
    pub networks: Vec<NetworkSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSummary {
    pub network_id: String,
    pub name: String,
    pub assigned_ip: String,
    pub is_owner: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerJoinedNotification {
    pub network_id: String,
    #[serde(flatten)]
    pub member: MemberInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerConnectedNotification {
    pub network_id: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerDisconnectedNotification {
    pub network_id: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerLeftNotification {
    pub network_id: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickedNotification {
    pub network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeletedNotification {
    pub network_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRenamedNotification {
    pub network_id: String,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerShutdownNotification {
    pub shutdown_in_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIpInfoNotification {
    pub network_id: String,
    pub assigned_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_rejects_malformed_json() {
        assert!(Envelope::decode("not json").is_err());
    }

    #[test]
    fn decode_rejects_empty_message_id() {
        let raw = r#"{"message_id":"","type":"Ping","payload":{}}"#;
        assert!(Envelope::decode(raw).is_err());
    }

    #[test]
    fn error_envelope_scrubs_internal_message() {
        let err = HubError::Internal("database is locked at /var/lib/hub.db".into());
        let env = Envelope::error("id1", &err);
        let payload: ErrorPayload = env.decode_payload().unwrap();
        assert_eq!(payload.kind, "INTERNAL");
        assert_eq!(payload.message, "internal error");
    }

    #[test]
    fn decode_accepts_well_formed_envelope() {
        let raw = r#"{"message_id":"abc","type":"Ping","payload":{}}"#;
        let env = Envelope::decode(raw).unwrap();
        assert_eq!(env.kind, "Ping");
        assert_eq!(env.message_id, "abc");
    }

    #[test]
    fn decode_payload_accepts_base64_json_string() {
        let inner = json!({"networkId": "net1"});
        let b64 = base64::engine::general_purpose::STANDARD
            .encode(serde_json::to_vec(&inner).unwrap());
        let env = Envelope {
            message_id: "x".into(),
            kind: "LeaveNetwork".into(),
            payload: Value::String(b64),
        };
        let req: LeaveNetworkRequest = env.decode_payload().unwrap();
        assert_eq!(req.network_id, "net1");
    }

    #[test]
    fn canonicalize_sorts_keys_and_drops_signature() {
        let payload = json!({
            "zeta": 1,
            "alpha": 2,
            "signature": "should-be-dropped"
        });
        let bytes = canonicalize(&payload).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s, r#"{"alpha":2,"zeta":1}"#);
    }

    #[test]
    fn canonicalize_rejects_non_object_payload() {
        assert!(canonicalize(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn canonicalize_decodes_base64_wrapped_object() {
        let inner = json!({ "zeta": 1, "alpha": 2, "signature": "drop-me" });
        let wrapped = Value::String(
            base64::engine::general_purpose::STANDARD
                .encode(serde_json::to_vec(&inner).unwrap()),
        );
        let bytes = canonicalize(&wrapped).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"alpha":2,"zeta":1}"#);
    }
}

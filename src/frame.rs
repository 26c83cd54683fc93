//! Frame: the message type exchanged with the game server.
//!
//! ARCHITECTURE
//! ============
//! Every group and shape notification is a Frame. Local mutations produce
//! request frames that the session pushes to its outbox; the server pushes
//! frames back which the session routes by syscall prefix.
//!
//! DESIGN
//! ======
//! - Flat data: payload is always `Map<String, Value>` at the top level.
//!   Batches travel under a single `members` key.
//! - Replies correlate to requests via `parent_id`.
//! - Typed payloads are read with `decode`, written with `to_data`.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// Lifecycle position of a frame in a request/response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Request,
    Item,
    Done,
    Error,
    Cancel,
}

impl Status {
    /// Terminal statuses end a response stream.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Error | Status::Cancel)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub syscall: String,
    pub status: Status,
    #[serde(default)]
    pub data: Data,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for structured log fields.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create a request frame. Entry point for every notification.
    pub fn request(syscall: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            from: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    /// Create a done reply carrying one result.
    #[must_use]
    pub fn done_with(&self, data: Data) -> Self {
        self.reply(Status::Done, data)
    }

    fn reply(&self, status: Status, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            from: None,
            syscall: self.syscall.clone(),
            status,
            data,
        }
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Frame {
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Flatten a serializable record into frame data. Non-object values
/// produce empty data.
pub fn to_data<T: Serialize>(value: &T) -> Data {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => Data::new(),
    }
}

impl Frame {
    /// Decode the whole data map into a typed record.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the data does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let map: serde_json::Map<String, serde_json::Value> =
            self.data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        serde_json::from_value(serde_json::Value::Object(map))
    }

    /// Extract the syscall prefix (everything before the first ':').
    #[must_use]
    pub fn prefix(&self) -> &str {
        let Some((prefix, _)) = self.syscall.split_once(':') else {
            return &self.syscall;
        };
        prefix
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_sets_fields() {
        let frame = Frame::request("group:create", Data::new());
        assert_eq!(frame.syscall, "group:create");
        assert_eq!(frame.status, Status::Request);
        assert!(frame.parent_id.is_none());
        assert!(frame.ts > 0);
    }

    #[test]
    fn done_with_correlates_to_request() {
        let req = Frame::request("group:info", Data::new());
        let reply = req.done_with(Data::new());

        assert_eq!(reply.parent_id, Some(req.id));
        assert_eq!(reply.syscall, "group:info");
        assert!(reply.status.is_terminal());
    }

    #[test]
    fn prefix_extraction() {
        let frame = Frame::request("group:join", Data::new());
        assert_eq!(frame.prefix(), "group");

        let frame = Frame::request("noseparator", Data::new());
        assert_eq!(frame.prefix(), "noseparator");
    }

    #[test]
    fn decode_reads_typed_payload() {
        #[derive(Deserialize)]
        struct Payload {
            id: Uuid,
            badge: u32,
        }

        let id = Uuid::new_v4();
        let frame = Frame::request("shape:add", Data::new())
            .with_data("id", id.to_string())
            .with_data("badge", 7);

        let payload: Payload = frame.decode().expect("decode");
        assert_eq!(payload.id, id);
        assert_eq!(payload.badge, 7);
    }

    #[test]
    fn decode_reports_missing_fields() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Payload {
            id: Uuid,
        }

        let frame = Frame::request("group:remove", Data::new());
        assert!(frame.decode::<Payload>().is_err());
    }

    #[test]
    fn to_data_flattens_struct() {
        #[derive(Serialize)]
        struct Record {
            id: u32,
            name: &'static str,
        }

        let data = to_data(&Record { id: 3, name: "goblins" });
        assert_eq!(data.get("id").and_then(serde_json::Value::as_u64), Some(3));
        assert_eq!(data.get("name").and_then(|v| v.as_str()), Some("goblins"));
    }

    #[test]
    fn sender_is_optional_on_the_wire() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"id":"{id}","parent_id":null,"ts":1,"from":"dm","syscall":"group:leave","status":"request"}}"#
        );
        let frame: Frame = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(frame.from.as_deref(), Some("dm"));
        assert!(frame.data.is_empty());

        let local = serde_json::to_value(Frame::request("group:leave", Data::new())).expect("serialize");
        assert!(local.get("from").is_none());
    }
}

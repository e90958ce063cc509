//! Storage-neutral record encoding.
//!
//! A record is one JSON object on a single line (UTF-8). Byte payloads are
//! base64 encoded, UIDs are decimal strings, timestamps are RFC 3339.

use serde::Deserialize;

use crate::model::MessageLog;
use crate::uid::Uid;

/// Encode a record as a single line, without the trailing newline.
pub fn encode_line(log: &MessageLog) -> serde_json::Result<String> {
    serde_json::to_string(log)
}

/// Decode a full record from one line.
pub fn decode_line(line: &str) -> serde_json::Result<MessageLog> {
    serde_json::from_str(line)
}

/// The subset of fields needed to index a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RecordKeys {
    pub uid: Uid,
    #[serde(default)]
    pub id: i64,
}

/// Extract just the UID and backend ID from a line, ignoring the payload.
pub fn peek_keys(line: &str) -> serde_json::Result<RecordKeys> {
    serde_json::from_str(line)
}

/// Serde adapter storing `Vec<u8>` as standard base64.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = <Option<String>>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

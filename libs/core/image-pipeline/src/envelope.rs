//! Work item envelope and its wire codec
//!
//! Work items travel as JSON objects:
//!
//! ```json
//! {"resource_id": 42, "payload": "uploads/a.jpg", "attempt": 0}
//! ```

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// A request to process one image of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Product that owns the image
    pub resource_id: i64,

    /// Image reference (URL or storage path)
    pub payload: String,

    /// Number of earlier processing attempts of this logical item
    #[serde(default)]
    pub attempt: u32,
}

impl WorkItem {
    /// Create a fresh work item with no prior attempts
    pub fn new(resource_id: i64, payload: impl Into<String>) -> Self {
        Self {
            resource_id,
            payload: payload.into(),
            attempt: 0,
        }
    }

    /// Set the attempt count
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::json!({
            "resource_id": self.resource_id,
            "payload": self.payload,
            "attempt": self.attempt,
        })
        .to_string()
        .into_bytes()
    }

    /// Parse a message body. Bodies that are not a JSON envelope, or that
    /// carry a blank payload, are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let item: WorkItem =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        if item.payload.trim().is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        Ok(item)
    }
}

//! Creation-time payload validation.
//!
//! Payloads are opaque to the lifecycle; the only checks are that one was
//! supplied and that its serialized form fits the configured bound.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use jobrelay_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadLimits {
    /// Maximum serialized size in bytes.
    pub max_bytes: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1_000_000,
        }
    }
}

impl PayloadLimits {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn validate(&self, payload: &JsonValue) -> DomainResult<()> {
        let empty = match payload {
            JsonValue::Null => true,
            JsonValue::String(s) => s.is_empty(),
            JsonValue::Array(a) => a.is_empty(),
            JsonValue::Object(o) => o.is_empty(),
            JsonValue::Bool(_) | JsonValue::Number(_) => false,
        };
        if empty {
            return Err(DomainError::validation("payload cannot be empty"));
        }

        let size = serde_json::to_vec(payload)
            .map_err(|e| DomainError::validation(format!("payload is not serializable: {e}")))?
            .len();
        if size > self.max_bytes {
            return Err(DomainError::validation(format!(
                "payload too large: {size} bytes (limit {})",
                self.max_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_empty_shapes() {
        let limits = PayloadLimits::default();
        for v in [json!(null), json!(""), json!([]), json!({})] {
            assert!(limits.validate(&v).is_err(), "{v}");
        }
    }

    #[test]
    fn accepts_scalars_and_documents() {
        let limits = PayloadLimits::default();
        for v in [json!(0), json!(false), json!("a"), json!({"x": 1}), json!([1])] {
            assert!(limits.validate(&v).is_ok(), "{v}");
        }
    }

    #[test]
    fn enforces_size_bound() {
        let limits = PayloadLimits::new(16);
        assert!(limits.validate(&json!({"k": "short"})).is_ok());
        let err = limits
            .validate(&json!({"k": "this value is definitely too long"}))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(m) if m.contains("too large")));
    }
}

//! Flat response records returned across the command boundary

use crate::error::{Error, ErrorKind};
use serde::Serialize;
use serde_json::{Map, Value};

/// `{success: true, message, ...}` or `{error: true, message, kind}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CommandResponse(Map<String, Value>);

impl CommandResponse {
    pub fn success(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(true));
        map.insert("message".into(), Value::String(message.into()));
        Self(map)
    }

    pub fn failure(message: impl Into<String>, kind: ErrorKind) -> Self {
        let mut map = Map::new();
        map.insert("error".into(), Value::Bool(true));
        map.insert("message".into(), Value::String(message.into()));
        map.insert(
            "kind".into(),
            serde_json::to_value(kind).unwrap_or(Value::Null),
        );
        Self(map)
    }

    pub fn from_error(err: &Error) -> Self {
        Self::failure(err.to_string(), err.kind())
    }

    /// Add one field
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.0.insert(
            key.to_string(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    /// Merge the fields of a serializable struct into the response
    pub fn with_fields(mut self, fields: impl Serialize) -> Self {
        if let Ok(Value::Object(fields)) = serde_json::to_value(fields) {
            for (key, value) in fields {
                self.0.entry(key).or_insert(value);
            }
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.0.get("success") == Some(&Value::Bool(true))
    }

    pub fn message(&self) -> &str {
        self.0
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PermissionError;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let response = CommandResponse::success("done").with("directoryName", "docs");
        assert!(response.is_success());
        assert_eq!(
            response.into_value(),
            json!({"success": true, "message": "done", "directoryName": "docs"})
        );
    }

    #[test]
    fn test_error_shape() {
        let err: Error = PermissionError::NoActiveGrant.into();
        let response = CommandResponse::from_error(&err);
        assert!(!response.is_success());
        assert_eq!(response.get("error"), Some(&json!(true)));
        assert_eq!(response.get("kind"), Some(&json!("permission")));
        assert!(response.message().contains("no directory access granted"));
    }

    #[test]
    fn test_with_fields_does_not_override_status() {
        #[derive(Serialize)]
        struct Payload {
            success: bool,
            size: u64,
        }

        let response = CommandResponse::success("ok").with_fields(Payload { success: false, size: 5 });
        assert!(response.is_success());
        assert_eq!(response.get("size"), Some(&json!(5)));
    }
}

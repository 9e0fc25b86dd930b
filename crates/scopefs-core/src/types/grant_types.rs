//! Persisted grant records and their listing view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, host-issued reference to a directory or file.
///
/// The core stores and hands it back to the host verbatim; it never
/// interprets the contents and never assumes the host still honors it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityToken(String);

impl CapabilityToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CapabilityToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A persisted permission scope rooted at one user-selected directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: String,
    pub display_name: String,
    pub capability_token: CapabilityToken,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// Create a grant with a fresh id
    pub fn new(display_name: impl Into<String>, capability_token: CapabilityToken) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            capability_token,
            created_at: Utc::now(),
        }
    }
}

/// Grant as reported by a listing, with its current permission state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantStatus {
    pub id: String,
    pub display_name: String,
    pub has_permission: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Why the permission check failed, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

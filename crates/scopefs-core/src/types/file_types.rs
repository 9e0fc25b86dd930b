//! File and directory views returned by the access layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Raw entry as enumerated by a directory handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Directory listing entry with its path relative to the grant root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub relative_path: String,
}

/// File metadata as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// How `FileContent::content` is encoded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentEncoding {
    /// UTF-8 text
    Text,
    /// `data:<mime>;base64,<payload>`
    DataUrl,
}

/// Result of a read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub content: String,
    pub encoding: ContentEncoding,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of a write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub name: String,
    pub relative_path: String,
    pub size: u64,
    pub sha256: String,
}

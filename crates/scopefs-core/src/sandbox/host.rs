//! Host capability provider abstractions
//!
//! The host owns every directory and file handle and decides whether a
//! permission is granted. The access layer only holds handles for the span
//! of one operation and always asks the host before relying on them:
//! - `HostProvider` - pickers and token restoration
//! - `DirectoryHandle` - permission queries, child lookup, enumeration
//! - `FileHandle` - metadata, content, writable streams

use crate::error::Result;
use crate::types::{CapabilityToken, FileInfo, HandleEntry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Access level requested from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    ReadWrite,
}

/// Host answer to a permission query or request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; a request would prompt the user
    Prompt,
}

impl PermissionState {
    pub fn is_granted(self) -> bool {
        self == PermissionState::Granted
    }
}

/// Hints passed to the host pickers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PickerOptions {
    pub suggested_name: Option<String>,
    pub mode: Option<AccessMode>,
}

impl PickerOptions {
    pub fn read_write() -> Self {
        Self {
            suggested_name: None,
            mode: Some(AccessMode::ReadWrite),
        }
    }

    pub fn suggesting(name: impl Into<String>) -> Self {
        Self {
            suggested_name: Some(name.into()),
            mode: None,
        }
    }
}

/// Entry point into the host: pickers and handle restoration.
///
/// Pickers return `Ok(None)` when the user cancels.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostProvider: Send + Sync {
    async fn pick_directory(&self, options: PickerOptions) -> Result<Option<Arc<dyn DirectoryHandle>>>;

    async fn pick_file_to_open(&self, options: PickerOptions) -> Result<Option<Arc<dyn FileHandle>>>;

    async fn pick_file_to_save(&self, options: PickerOptions) -> Result<Option<Arc<dyn FileHandle>>>;

    /// Rebuild a directory handle from a persisted token
    async fn restore_directory(&self, token: &CapabilityToken) -> Result<Arc<dyn DirectoryHandle>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryHandle: Send + Sync {
    fn name(&self) -> String;

    /// Token that `HostProvider::restore_directory` turns back into this handle
    fn token(&self) -> CapabilityToken;

    async fn query_permission(&self, mode: AccessMode) -> Result<PermissionState>;

    async fn request_permission(&self, mode: AccessMode) -> Result<PermissionState>;

    async fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryHandle>>;

    async fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileHandle>>;

    async fn entries(&self) -> Result<Vec<HandleEntry>>;
}

#[async_trait]
pub trait FileHandle: Send + Sync {
    fn name(&self) -> String;

    async fn metadata(&self) -> Result<FileInfo>;

    async fn read_bytes(&self) -> Result<Vec<u8>>;

    /// Open an exclusive stream that replaces the file contents
    async fn open_writable(&self) -> Result<Box<dyn WritableStream>>;
}

#[async_trait]
pub trait WritableStream: Send {
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flush and release the stream; further writes fail
    async fn close(&mut self) -> Result<()>;
}

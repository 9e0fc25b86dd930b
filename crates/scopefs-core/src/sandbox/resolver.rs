//! Resolution strategies for file operations
//!
//! With an active grant, paths resolve beneath the grant root. Without one,
//! each operation falls back to a one-shot host picker whose handle is used
//! once and never persisted.

use super::grants::DirectoryGrantManager;
use super::host::{DirectoryHandle, FileHandle, HostProvider, PickerOptions};
use super::validation::ValidatedPath;
use crate::error::{PermissionError, Result, ValidationError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    Grant,
    Ephemeral,
}

#[async_trait]
pub trait FileResolver: Send + Sync {
    fn kind(&self) -> ResolverKind;

    async fn open_file(&self, path: &ValidatedPath) -> Result<Arc<dyn FileHandle>>;

    /// Resolve a file for writing, creating it if needed
    async fn save_file(&self, path: &ValidatedPath) -> Result<Arc<dyn FileHandle>>;

    async fn open_directory(&self, path: &ValidatedPath) -> Result<Arc<dyn DirectoryHandle>>;
}

/// Resolves beneath the active grant
pub struct GrantResolver<'a> {
    manager: &'a DirectoryGrantManager,
}

impl<'a> GrantResolver<'a> {
    pub fn new(manager: &'a DirectoryGrantManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl<'a> FileResolver for GrantResolver<'a> {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Grant
    }

    async fn open_file(&self, path: &ValidatedPath) -> Result<Arc<dyn FileHandle>> {
        self.manager.resolve_file(&path.as_relative(), false).await
    }

    async fn save_file(&self, path: &ValidatedPath) -> Result<Arc<dyn FileHandle>> {
        self.manager.resolve_file(&path.as_relative(), true).await
    }

    async fn open_directory(&self, path: &ValidatedPath) -> Result<Arc<dyn DirectoryHandle>> {
        self.manager.resolve_directory(&path.as_relative()).await
    }
}

/// Asks the host picker for every operation
pub struct EphemeralResolver<'a> {
    host: &'a dyn HostProvider,
}

impl<'a> EphemeralResolver<'a> {
    pub fn new(host: &'a dyn HostProvider) -> Self {
        Self { host }
    }
}

fn suggested(path: &ValidatedPath) -> Result<PickerOptions> {
    let name = path.file_name().ok_or(ValidationError::Empty)?;
    Ok(PickerOptions::suggesting(name))
}

#[async_trait]
impl<'a> FileResolver for EphemeralResolver<'a> {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Ephemeral
    }

    async fn open_file(&self, path: &ValidatedPath) -> Result<Arc<dyn FileHandle>> {
        debug!("No active grant, asking host to open {}", path.as_relative());
        let file = self.host.pick_file_to_open(suggested(path)?).await?;
        file.ok_or_else(|| PermissionError::Cancelled.into())
    }

    async fn save_file(&self, path: &ValidatedPath) -> Result<Arc<dyn FileHandle>> {
        debug!("No active grant, asking host to save {}", path.as_relative());
        let file = self.host.pick_file_to_save(suggested(path)?).await?;
        file.ok_or_else(|| PermissionError::Cancelled.into())
    }

    async fn open_directory(&self, path: &ValidatedPath) -> Result<Arc<dyn DirectoryHandle>> {
        debug!("No active grant, asking host for directory {}", path.as_relative());
        let dir = self.host.pick_directory(PickerOptions::default()).await?;
        dir.ok_or_else(|| PermissionError::Cancelled.into())
    }
}

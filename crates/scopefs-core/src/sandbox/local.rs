//! Local filesystem host provider
//!
//! Backs capability handles with real directories via `tokio::fs`. Permission
//! state lives in a host-side table keyed by canonical path, so a grant
//! covers everything beneath the directory it was given for. The interactive
//! parts (pickers, permission prompts) go through a [`Picker`].

use super::content;
use super::host::{
    AccessMode, DirectoryHandle, FileHandle, HostProvider, PermissionState, PickerOptions,
    WritableStream,
};
use crate::error::{Error, HostError, NotFoundError, Result};
use crate::types::{CapabilityToken, EntryKind, FileInfo, HandleEntry};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// User-facing dialogs the host shows on behalf of the access layer.
///
/// `None` / `false` means the user cancelled or declined.
#[async_trait]
pub trait Picker: Send + Sync {
    async fn choose_directory(&self, options: &PickerOptions) -> Option<PathBuf>;

    async fn choose_file_to_open(&self, options: &PickerOptions) -> Option<PathBuf>;

    async fn choose_file_to_save(&self, options: &PickerOptions) -> Option<PathBuf>;

    async fn confirm_permission(&self, path: &Path, mode: AccessMode) -> bool;
}

/// Picker answering from pre-loaded queues, for headless hosts and tests.
///
/// An exhausted queue behaves like a cancelled dialog or a declined prompt.
#[derive(Debug, Default)]
pub struct ScriptedPicker {
    directories: Mutex<VecDeque<PathBuf>>,
    opens: Mutex<VecDeque<PathBuf>>,
    saves: Mutex<VecDeque<PathBuf>>,
    permissions: Mutex<VecDeque<bool>>,
}

impl ScriptedPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_directory(&self, path: impl Into<PathBuf>) -> &Self {
        self.directories.lock().push_back(path.into());
        self
    }

    pub fn push_open(&self, path: impl Into<PathBuf>) -> &Self {
        self.opens.lock().push_back(path.into());
        self
    }

    pub fn push_save(&self, path: impl Into<PathBuf>) -> &Self {
        self.saves.lock().push_back(path.into());
        self
    }

    pub fn push_permission(&self, allow: bool) -> &Self {
        self.permissions.lock().push_back(allow);
        self
    }
}

#[async_trait]
impl Picker for ScriptedPicker {
    async fn choose_directory(&self, _options: &PickerOptions) -> Option<PathBuf> {
        self.directories.lock().pop_front()
    }

    async fn choose_file_to_open(&self, _options: &PickerOptions) -> Option<PathBuf> {
        self.opens.lock().pop_front()
    }

    async fn choose_file_to_save(&self, _options: &PickerOptions) -> Option<PathBuf> {
        self.saves.lock().pop_front()
    }

    async fn confirm_permission(&self, _path: &Path, _mode: AccessMode) -> bool {
        self.permissions.lock().pop_front().unwrap_or(false)
    }
}

/// Host-side permission table
#[derive(Debug, Default)]
struct PermissionTable {
    grants: RwLock<HashMap<PathBuf, AccessMode>>,
}

impl PermissionTable {
    /// Strongest mode granted on `path` or any ancestor
    fn mode_for(&self, path: &Path) -> Option<AccessMode> {
        let grants = self.grants.read();
        path.ancestors().filter_map(|p| grants.get(p).copied()).max()
    }

    fn grant(&self, path: &Path, mode: AccessMode) {
        let mut grants = self.grants.write();
        let entry = grants.entry(path.to_path_buf()).or_insert(mode);
        if mode > *entry {
            *entry = mode;
        }
    }

    fn revoke(&self, path: &Path) -> usize {
        let mut grants = self.grants.write();
        let before = grants.len();
        grants.retain(|p, _| !p.starts_with(path));
        before - grants.len()
    }

    fn ensure(&self, path: &Path, mode: AccessMode) -> Result<()> {
        match self.mode_for(path) {
            Some(granted) if granted >= mode => Ok(()),
            _ => Err(Error::Host(HostError::NotAllowed(
                path.to_string_lossy().to_string(),
            ))),
        }
    }
}

struct Shared {
    picker: Arc<dyn Picker>,
    permissions: PermissionTable,
}

/// `HostProvider` over the local filesystem
#[derive(Clone)]
pub struct LocalHost {
    shared: Arc<Shared>,
}

impl LocalHost {
    pub fn new(picker: Arc<dyn Picker>) -> Self {
        Self {
            shared: Arc::new(Shared {
                picker,
                permissions: PermissionTable::default(),
            }),
        }
    }

    /// Withdraw every permission on `path` and below, as a user would from
    /// the host's settings. Returns how many entries were dropped.
    pub fn revoke(&self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let removed = self.shared.permissions.revoke(&path);
        info!("Revoked {} permission entries under {:?}", removed, path);
        removed
    }

    fn directory(&self, path: PathBuf) -> Arc<dyn DirectoryHandle> {
        Arc::new(LocalDirectory {
            path,
            shared: self.shared.clone(),
        })
    }

    fn file(&self, path: PathBuf) -> Arc<dyn FileHandle> {
        Arc::new(LocalFile {
            path,
            shared: self.shared.clone(),
        })
    }
}

async fn canonical_dir(path: &Path) -> Result<PathBuf> {
    let canonical = fs::canonicalize(path)
        .await
        .map_err(|e| Error::from_io(e, NotFoundError::Directory(path.to_string_lossy().to_string())))?;
    if !fs::metadata(&canonical).await?.is_dir() {
        return Err(Error::Host(HostError::TypeMismatch(format!(
            "{:?} is not a directory",
            canonical
        ))));
    }
    Ok(canonical)
}

#[async_trait]
impl HostProvider for LocalHost {
    async fn pick_directory(&self, options: PickerOptions) -> Result<Option<Arc<dyn DirectoryHandle>>> {
        let Some(path) = self.shared.picker.choose_directory(&options).await else {
            return Ok(None);
        };
        let path = canonical_dir(&path).await?;

        // Picking a directory implies read access to it.
        self.shared.permissions.grant(&path, AccessMode::Read);
        debug!("Directory picked: {:?}", path);
        Ok(Some(self.directory(path)))
    }

    async fn pick_file_to_open(&self, options: PickerOptions) -> Result<Option<Arc<dyn FileHandle>>> {
        let Some(path) = self.shared.picker.choose_file_to_open(&options).await else {
            return Ok(None);
        };
        let path = fs::canonicalize(&path)
            .await
            .map_err(|e| Error::from_io(e, NotFoundError::File(path.to_string_lossy().to_string())))?;
        if !fs::metadata(&path).await?.is_file() {
            return Err(Error::Host(HostError::TypeMismatch(format!("{:?} is not a file", path))));
        }

        self.shared.permissions.grant(&path, AccessMode::Read);
        debug!("File picked for open: {:?}", path);
        Ok(Some(self.file(path)))
    }

    async fn pick_file_to_save(&self, options: PickerOptions) -> Result<Option<Arc<dyn FileHandle>>> {
        let Some(path) = self.shared.picker.choose_file_to_save(&options).await else {
            return Ok(None);
        };
        let name = path
            .file_name()
            .ok_or_else(|| Error::Host(HostError::InvalidName(path.to_string_lossy().to_string())))?
            .to_owned();
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let path = canonical_dir(parent).await?.join(name);

        self.shared.permissions.grant(&path, AccessMode::ReadWrite);
        debug!("File picked for save: {:?}", path);
        Ok(Some(self.file(path)))
    }

    async fn restore_directory(&self, token: &CapabilityToken) -> Result<Arc<dyn DirectoryHandle>> {
        let path = PathBuf::from(token.as_str());
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(self.directory(path)),
            _ => Err(Error::Host(HostError::StaleToken(token.as_str().to_string()))),
        }
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::Host(HostError::InvalidName(name.to_string())));
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

struct LocalDirectory {
    path: PathBuf,
    shared: Arc<Shared>,
}

impl LocalDirectory {
    fn child_directory(&self, path: PathBuf) -> Arc<dyn DirectoryHandle> {
        Arc::new(LocalDirectory {
            path,
            shared: self.shared.clone(),
        })
    }
}

#[async_trait]
impl DirectoryHandle for LocalDirectory {
    fn name(&self) -> String {
        display_name(&self.path)
    }

    fn token(&self) -> CapabilityToken {
        CapabilityToken::new(self.path.to_string_lossy())
    }

    async fn query_permission(&self, mode: AccessMode) -> Result<PermissionState> {
        match self.shared.permissions.mode_for(&self.path) {
            Some(granted) if granted >= mode => Ok(PermissionState::Granted),
            _ => Ok(PermissionState::Prompt),
        }
    }

    async fn request_permission(&self, mode: AccessMode) -> Result<PermissionState> {
        if self.query_permission(mode).await?.is_granted() {
            return Ok(PermissionState::Granted);
        }
        if self.shared.picker.confirm_permission(&self.path, mode).await {
            self.shared.permissions.grant(&self.path, mode);
            info!("Permission {:?} granted on {:?}", mode, self.path);
            Ok(PermissionState::Granted)
        } else {
            Ok(PermissionState::Denied)
        }
    }

    async fn get_directory(&self, name: &str, create: bool) -> Result<Arc<dyn DirectoryHandle>> {
        check_name(name)?;
        let mode = if create { AccessMode::ReadWrite } else { AccessMode::Read };
        self.shared.permissions.ensure(&self.path, mode)?;

        let child = self.path.join(name);
        match fs::symlink_metadata(&child).await {
            Ok(meta) if meta.is_dir() => Ok(self.child_directory(child)),
            Ok(_) => Err(Error::Host(HostError::TypeMismatch(format!(
                "{} is not a directory",
                name
            )))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => {
                fs::create_dir(&child).await?;
                debug!("Created directory {:?}", child);
                Ok(self.child_directory(child))
            }
            Err(e) => Err(Error::from_io(e, NotFoundError::Directory(name.to_string()))),
        }
    }

    async fn get_file(&self, name: &str, create: bool) -> Result<Arc<dyn FileHandle>> {
        check_name(name)?;
        let mode = if create { AccessMode::ReadWrite } else { AccessMode::Read };
        self.shared.permissions.ensure(&self.path, mode)?;

        let child = self.path.join(name);
        match fs::symlink_metadata(&child).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(Error::Host(HostError::TypeMismatch(format!(
                    "{} is not a file",
                    name
                ))))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => {
                fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&child)
                    .await?;
                debug!("Created file {:?}", child);
            }
            Err(e) => return Err(Error::from_io(e, NotFoundError::File(name.to_string()))),
        }

        Ok(Arc::new(LocalFile {
            path: child,
            shared: self.shared.clone(),
        }))
    }

    async fn entries(&self) -> Result<Vec<HandleEntry>> {
        self.shared.permissions.ensure(&self.path, AccessMode::Read)?;

        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&self.path)
            .await
            .map_err(|e| Error::from_io(e, NotFoundError::Directory(self.name())))?;

        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                // Symlinks and special files are not exposed
                continue;
            };
            entries.push(HandleEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                kind,
            });
        }

        // Sort: directories first, then by name
        entries.sort_by(|a, b| match (a.kind, b.kind) {
            (EntryKind::Directory, EntryKind::File) => std::cmp::Ordering::Less,
            (EntryKind::File, EntryKind::Directory) => std::cmp::Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });

        Ok(entries)
    }
}

struct LocalFile {
    path: PathBuf,
    shared: Arc<Shared>,
}

#[async_trait]
impl FileHandle for LocalFile {
    fn name(&self) -> String {
        display_name(&self.path)
    }

    async fn metadata(&self) -> Result<FileInfo> {
        self.shared.permissions.ensure(&self.path, AccessMode::Read)?;

        let metadata = fs::metadata(&self.path)
            .await
            .map_err(|e| Error::from_io(e, NotFoundError::File(self.name())))?;

        Ok(FileInfo {
            name: self.name(),
            size: metadata.len(),
            mime_type: content::mime_for(&self.name()),
            last_modified: metadata.modified().ok().map(|t| t.into()),
        })
    }

    async fn read_bytes(&self) -> Result<Vec<u8>> {
        self.shared.permissions.ensure(&self.path, AccessMode::Read)?;
        fs::read(&self.path)
            .await
            .map_err(|e| Error::from_io(e, NotFoundError::File(self.name())))
    }

    async fn open_writable(&self) -> Result<Box<dyn WritableStream>> {
        self.shared.permissions.ensure(&self.path, AccessMode::ReadWrite)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::from_io(e, NotFoundError::File(self.name())))?;

        Ok(Box::new(LocalWritable { file: Some(file) }))
    }
}

struct LocalWritable {
    file: Option<fs::File>,
}

#[async_trait]
impl WritableStream for LocalWritable {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or(Error::Host(HostError::StreamClosed))?;
        file.write_all(data).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut file = self.file.take().ok_or(Error::Host(HostError::StreamClosed))?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

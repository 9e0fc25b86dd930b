//! Permission-checked list/read/write for an untrusted client

use super::content;
use super::grants::DirectoryGrantManager;
use super::host::HostProvider;
use super::resolver::{EphemeralResolver, FileResolver, GrantResolver};
use super::validation::{PathValidator, ValidatedPath};
use crate::config::AccessConfig;
use crate::error::{ErrorKind, LimitError, Result, ValidationError};
use crate::storage::{GrantStore, SqliteGrantStore};
use crate::types::{CommandResponse, DirEntry, FileContent, GrantStatus, WriteOutcome};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File access gated by path validation and the active directory grant.
///
/// Every path is validated before any host lookup. Each call then picks a
/// resolver: the active grant when there is one, a one-shot picker otherwise.
pub struct FileAccessService {
    config: AccessConfig,
    validator: PathValidator,
    grants: DirectoryGrantManager,
}

impl FileAccessService {
    pub fn new(config: AccessConfig, host: Arc<dyn HostProvider>, store: Arc<dyn GrantStore>) -> Self {
        let validator = PathValidator::new(config.sensitive_names.iter().cloned());
        Self {
            config,
            validator,
            grants: DirectoryGrantManager::new(host, store),
        }
    }

    /// Open the SQLite store configured in `config` and, if enabled, resume
    /// the grant that was active last time.
    pub async fn open(config: AccessConfig, host: Arc<dyn HostProvider>) -> Result<Self> {
        let store = Arc::new(SqliteGrantStore::new(config.database_path()));
        store.init().await?;

        let resume = config.resume_last_grant;
        let service = Self::new(config, host, store);
        if resume {
            if let Some(grant) = service.grants.resume().await? {
                info!("Resumed access to {}", grant.display_name);
            }
        }
        Ok(service)
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn grants(&self) -> &DirectoryGrantManager {
        &self.grants
    }

    fn validate(&self, path: &str) -> Result<ValidatedPath> {
        Ok(self.validator.validate(path, self.grants.has_active_grant())?)
    }

    /// Strategy for this call, chosen from the current session state
    fn resolver(&self) -> Box<dyn FileResolver + '_> {
        if self.grants.has_active_grant() {
            Box::new(GrantResolver::new(&self.grants))
        } else {
            Box::new(EphemeralResolver::new(&**self.grants.host()))
        }
    }

    /// Ask the user for a directory and make it the active grant
    pub async fn request_access(&self) -> CommandResponse {
        match self.grants.request_new_grant().await {
            Ok(grant) => CommandResponse::success(format!(
                "Access granted to directory \"{}\"",
                grant.display_name
            ))
            .with("directoryName", &grant.display_name)
            .with("grantId", &grant.id),
            Err(e) => {
                warn!("Directory access request failed: {}", e);
                CommandResponse::from_error(&e)
            }
        }
    }

    /// List a directory's immediate entries
    pub async fn list(&self, relative_dir: &str) -> Result<Vec<DirEntry>> {
        let dir_path = self.validate(relative_dir)?;
        let resolver = self.resolver();
        debug!("Listing {:?} via {:?}", dir_path.as_relative(), resolver.kind());

        let dir = resolver.open_directory(&dir_path).await?;
        let entries = dir
            .entries()
            .await?
            .into_iter()
            .map(|entry| DirEntry {
                relative_path: dir_path.child(&entry.name),
                name: entry.name,
                kind: entry.kind,
            })
            .collect();

        Ok(entries)
    }

    /// Read a file, as text or as a base64 data URL depending on its type
    pub async fn read(&self, relative_path: &str) -> Result<FileContent> {
        let path = self.validate(relative_path)?;
        if path.is_root() {
            return Err(ValidationError::Empty.into());
        }
        let resolver = self.resolver();
        debug!("Reading {:?} via {:?}", path.as_relative(), resolver.kind());

        let file = resolver.open_file(&path).await?;
        let info = file.metadata().await?;
        self.check_size(&info.name, info.size)?;
        self.check_extension(&info.name)?;

        let bytes = file.read_bytes().await?;
        // The file may have grown since the metadata call
        self.check_size(&info.name, bytes.len() as u64)?;

        let (content, encoding) = content::encode_payload(&bytes, &info.name, &info.mime_type);
        info!("Read {} bytes from {}", bytes.len(), path.as_relative());

        Ok(FileContent {
            content,
            encoding,
            name: info.name,
            size: bytes.len() as u64,
            mime_type: info.mime_type,
            last_modified: info.last_modified,
        })
    }

    /// Replace a file's contents, creating it and its parent directories.
    ///
    /// Not atomic: a failure mid-write can leave a partially written file.
    pub async fn write(&self, relative_path: &str, data: &str) -> Result<WriteOutcome> {
        let path = self.validate(relative_path)?;
        let name = path.file_name().ok_or(ValidationError::Empty)?.to_string();
        self.check_size(&name, data.len() as u64)?;
        self.check_extension(&name)?;

        let resolver = self.resolver();
        debug!("Writing {:?} via {:?}", path.as_relative(), resolver.kind());

        let file = resolver.save_file(&path).await?;
        let mut stream = file.open_writable().await?;
        stream.write(data.as_bytes()).await?;
        stream.close().await?;

        info!("Wrote {} bytes to {}", data.len(), path.as_relative());

        Ok(WriteOutcome {
            name: file.name(),
            relative_path: path.as_relative(),
            size: data.len() as u64,
            sha256: hex::encode(Sha256::digest(data.as_bytes())),
        })
    }

    fn check_size(&self, name: &str, size: u64) -> Result<()> {
        if size > self.config.max_file_size {
            return Err(LimitError::FileTooLarge {
                name: name.to_string(),
                size,
                limit: self.config.max_file_size,
            }
            .into());
        }
        Ok(())
    }

    fn check_extension(&self, name: &str) -> Result<()> {
        if !self
            .config
            .is_extension_allowed(content::extension(name).as_deref())
        {
            return Err(LimitError::DisallowedType(name.to_string()).into());
        }
        Ok(())
    }

    /// Whether the active grant still holds permission; never prompts
    pub async fn has_directory_permission(&self) -> bool {
        self.grants.has_permission().await.unwrap_or_else(|e| {
            warn!("Permission check failed: {}", e);
            false
        })
    }

    pub async fn root_directory_name(&self) -> Option<String> {
        self.grants.root_directory_name().await.unwrap_or_else(|e| {
            warn!("Could not read root directory name: {}", e);
            None
        })
    }

    pub async fn stored_directories(&self) -> Result<Vec<GrantStatus>> {
        self.grants.list_grants().await
    }

    pub async fn switch_directory(&self, id: &str) -> CommandResponse {
        match self.grants.switch_active(id).await {
            Ok(true) => {
                let name = self.root_directory_name().await;
                CommandResponse::success("Switched active directory")
                    .with("directoryName", name)
                    .with("grantId", id)
            }
            Ok(false) => CommandResponse::failure(
                format!(
                    "Could not switch to directory {}: it no longer exists or permission was refused",
                    id
                ),
                ErrorKind::Permission,
            ),
            Err(e) => CommandResponse::from_error(&e),
        }
    }

    pub async fn remove_directory(&self, id: &str) -> CommandResponse {
        match self.grants.remove_grant(id).await {
            Ok(_) => CommandResponse::success("Directory access removed").with("grantId", id),
            Err(e) => CommandResponse::from_error(&e),
        }
    }
}

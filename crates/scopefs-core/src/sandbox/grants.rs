//! Directory grant lifecycle and path resolution
//!
//! [`DirectoryGrantManager`] owns the session's active grant. The state
//! machine is small:
//!
//! ```text
//! NoGrant --request_new_grant--> Active(A)
//! Active(A) --switch_active(B)--> Active(B)   (failure keeps Active(A))
//! Active(A) --remove_grant(A)--> NoGrant
//! ```
//!
//! Permission is re-verified with the host on every resolution. When the
//! host withdraws it, the cached root handle is dropped but the grant stays
//! active, so a later call can re-request and recover.

use super::host::{AccessMode, DirectoryHandle, FileHandle, HostProvider, PickerOptions};
use crate::error::{Error, NotFoundError, PermissionError, Result, ValidationError};
use crate::storage::GrantStore;
use crate::types::{Grant, GrantStatus};
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings key remembering the active grant across restarts
const ACTIVE_GRANT_KEY: &str = "active_grant_id";

/// Per-manager session state.
///
/// `active_root` is `Some` only while `active_grant_id` is `Some` and the last
/// verification succeeded.
#[derive(Default)]
struct SessionState {
    active_grant_id: Option<String>,
    cached_permission: bool,
    active_root: Option<Arc<dyn DirectoryHandle>>,
}

impl SessionState {
    fn activate(&mut self, grant_id: String, root: Arc<dyn DirectoryHandle>) {
        self.active_grant_id = Some(grant_id);
        self.active_root = Some(root);
        self.cached_permission = true;
    }

    /// Verification failed; keep the grant selected but drop the handle
    fn suspend(&mut self) {
        self.active_root = None;
        self.cached_permission = false;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn is_active(&self, grant_id: &str) -> bool {
        self.active_grant_id.as_deref() == Some(grant_id)
    }
}

fn split_segments(relative_path: &str) -> Vec<&str> {
    relative_path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// Owns the active grant and resolves relative paths beneath it
pub struct DirectoryGrantManager {
    host: Arc<dyn HostProvider>,
    store: Arc<dyn GrantStore>,
    session: RwLock<SessionState>,
}

impl DirectoryGrantManager {
    pub fn new(host: Arc<dyn HostProvider>, store: Arc<dyn GrantStore>) -> Self {
        Self {
            host,
            store,
            session: RwLock::new(SessionState::default()),
        }
    }

    pub fn host(&self) -> &Arc<dyn HostProvider> {
        &self.host
    }

    /// Id of the selected grant, whether or not its permission is currently held
    pub fn active_grant_id(&self) -> Option<String> {
        self.session.read().active_grant_id.clone()
    }

    pub fn has_active_grant(&self) -> bool {
        self.session.read().active_grant_id.is_some()
    }

    /// Permission result of the most recent verification
    pub fn cached_permission(&self) -> bool {
        self.session.read().cached_permission
    }

    /// Re-check the active grant with the host without prompting
    pub async fn has_permission(&self) -> Result<bool> {
        match self.active_root(false).await {
            Ok(_) => Ok(true),
            Err(Error::Permission(_)) | Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Ask the user for a directory, obtain read-write permission, persist
    /// the grant and make it active.
    pub async fn request_new_grant(&self) -> Result<Grant> {
        let handle = self
            .host
            .pick_directory(PickerOptions::read_write())
            .await?
            .ok_or(PermissionError::Cancelled)?;

        if !self.verify_permission(handle.as_ref(), true).await? {
            warn!("Read-write permission declined for {}", handle.name());
            return Err(PermissionError::Denied(handle.name()).into());
        }

        let grant = Grant::new(handle.name(), handle.token());
        self.store.put(&grant).await?;
        self.store.set_setting(ACTIVE_GRANT_KEY, &grant.id).await?;
        self.session.write().activate(grant.id.clone(), handle);

        info!("Granted directory {} ({})", grant.display_name, grant.id);
        Ok(grant)
    }

    /// Check read-write permission on `handle`, prompting when allowed.
    ///
    /// A denial is `Ok(false)`; only host malfunctions are errors.
    pub async fn verify_permission(&self, handle: &dyn DirectoryHandle, ask_if_missing: bool) -> Result<bool> {
        if handle.query_permission(AccessMode::ReadWrite).await?.is_granted() {
            return Ok(true);
        }
        if !ask_if_missing {
            return Ok(false);
        }

        debug!("Re-requesting permission for {}", handle.name());
        Ok(handle
            .request_permission(AccessMode::ReadWrite)
            .await?
            .is_granted())
    }

    /// List every stored grant with its current permission.
    ///
    /// Grants are checked without prompting. A failing check is reported on
    /// that grant and never fails the listing.
    pub async fn list_grants(&self) -> Result<Vec<GrantStatus>> {
        let grants = self.store.get_all().await?;
        let active = self.active_grant_id();

        let checks = grants.iter().map(|grant| async move {
            let handle = self.host.restore_directory(&grant.capability_token).await?;
            self.verify_permission(handle.as_ref(), false).await
        });
        let results = join_all(checks).await;

        Ok(grants
            .into_iter()
            .zip(results)
            .map(|(grant, result)| {
                let (has_permission, note) = match result {
                    Ok(granted) => (granted, None),
                    Err(e) => {
                        warn!("Permission check failed for grant {}: {}", grant.id, e);
                        (false, Some(e.to_string()))
                    }
                };
                GrantStatus {
                    is_active: active.as_deref() == Some(grant.id.as_str()),
                    id: grant.id,
                    display_name: grant.display_name,
                    has_permission,
                    created_at: grant.created_at,
                    note,
                }
            })
            .collect())
    }

    /// Make grant `id` active, prompting for permission if needed.
    ///
    /// Returns false, leaving the current grant in place, when the id is
    /// unknown, its token no longer restores, or permission is refused.
    pub async fn switch_active(&self, id: &str) -> Result<bool> {
        let Some(grant) = self.store.get(id).await? else {
            warn!("Cannot switch: {}", NotFoundError::Grant(id.to_string()));
            return Ok(false);
        };

        let handle = match self.host.restore_directory(&grant.capability_token).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot switch to {}: {}", id, e);
                return Ok(false);
            }
        };

        match self.verify_permission(handle.as_ref(), true).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Cannot switch to {}: permission refused", id);
                return Ok(false);
            }
            Err(e) => {
                warn!("Cannot switch to {}: {}", id, e);
                return Ok(false);
            }
        }

        self.session.write().activate(grant.id.clone(), handle);
        self.store.set_setting(ACTIVE_GRANT_KEY, &grant.id).await?;
        info!("Switched active directory to {} ({})", grant.display_name, grant.id);
        Ok(true)
    }

    /// Delete grant `id`, clearing the session if it was active. Idempotent.
    pub async fn remove_grant(&self, id: &str) -> Result<bool> {
        self.store.delete(id).await?;

        let was_active = {
            let mut session = self.session.write();
            if session.is_active(id) {
                session.clear();
                true
            } else {
                false
            }
        };
        if was_active {
            self.store.remove_setting(ACTIVE_GRANT_KEY).await?;
        }

        info!("Removed grant {} (active: {})", id, was_active);
        Ok(true)
    }

    /// Drop every stored grant and the session's active grant
    pub async fn forget_all(&self) -> Result<()> {
        self.store.clear().await?;
        self.store.remove_setting(ACTIVE_GRANT_KEY).await?;
        self.session.write().clear();
        info!("Forgot all grants");
        Ok(())
    }

    /// Reactivate the grant that was active in a previous session.
    ///
    /// Never prompts: the grant is only resumed when the host still reports
    /// permission for it.
    pub async fn resume(&self) -> Result<Option<Grant>> {
        let Some(id) = self.store.get_setting(ACTIVE_GRANT_KEY).await? else {
            return Ok(None);
        };
        let Some(grant) = self.store.get(&id).await? else {
            self.store.remove_setting(ACTIVE_GRANT_KEY).await?;
            return Ok(None);
        };

        let handle = match self.host.restore_directory(&grant.capability_token).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot resume grant {}: {}", id, e);
                return Ok(None);
            }
        };
        if !self.verify_permission(handle.as_ref(), false).await? {
            debug!("Grant {} needs a new permission prompt, not resuming", id);
            return Ok(None);
        }

        self.session.write().activate(grant.id.clone(), handle);
        info!("Resumed directory {} ({})", grant.display_name, grant.id);
        Ok(Some(grant))
    }

    /// Display name of the active root, if any
    pub async fn root_directory_name(&self) -> Result<Option<String>> {
        let (id, root) = {
            let session = self.session.read();
            (session.active_grant_id.clone(), session.active_root.clone())
        };
        if let Some(root) = root {
            return Ok(Some(root.name()));
        }
        match id {
            Some(id) => Ok(self.store.get(&id).await?.map(|g| g.display_name)),
            None => Ok(None),
        }
    }

    /// Resolve a file beneath the active root, walking one directory per
    /// segment. Missing directories and the file itself are only created
    /// when `create_if_missing` is set.
    pub async fn resolve_file(&self, relative_path: &str, create_if_missing: bool) -> Result<Arc<dyn FileHandle>> {
        let root = self.active_root(true).await?;

        let segments = split_segments(relative_path);
        let Some((file_name, parents)) = segments.split_last() else {
            return Err(ValidationError::Empty.into());
        };

        let mut dir = root;
        for segment in parents {
            dir = dir.get_directory(segment, create_if_missing).await?;
        }

        debug!("Resolving file {} (create: {})", relative_path, create_if_missing);
        dir.get_file(file_name, create_if_missing).await
    }

    /// Resolve a directory beneath the active root; never creates.
    /// `""`, `.` and `/` resolve to the root itself.
    pub async fn resolve_directory(&self, relative_path: &str) -> Result<Arc<dyn DirectoryHandle>> {
        let mut dir = self.active_root(true).await?;

        for segment in split_segments(relative_path) {
            dir = dir.get_directory(segment, false).await?;
        }

        Ok(dir)
    }

    /// Current root handle, re-verified with the host
    async fn active_root(&self, ask_if_missing: bool) -> Result<Arc<dyn DirectoryHandle>> {
        let (id, cached) = {
            let session = self.session.read();
            (session.active_grant_id.clone(), session.active_root.clone())
        };
        let Some(id) = id else {
            return Err(PermissionError::NoActiveGrant.into());
        };

        let root = match cached {
            Some(root) => root,
            None => {
                let Some(grant) = self.store.get(&id).await? else {
                    // Removed underneath us
                    let mut session = self.session.write();
                    if session.is_active(&id) {
                        session.clear();
                    }
                    return Err(PermissionError::NoActiveGrant.into());
                };
                self.host.restore_directory(&grant.capability_token).await?
            }
        };

        let granted = self.verify_permission(root.as_ref(), ask_if_missing).await?;

        let mut session = self.session.write();
        if !session.is_active(&id) {
            // Switched or removed while we were verifying
            return Err(PermissionError::NoActiveGrant.into());
        }
        if granted {
            session.activate(id, root.clone());
            Ok(root)
        } else {
            warn!("Permission for {} is no longer granted", root.name());
            session.suspend();
            Err(PermissionError::Denied(root.name()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::sandbox::host::{MockDirectoryHandle, MockHostProvider};
    use crate::sandbox::local::{LocalHost, ScriptedPicker};
    use crate::storage::SqliteGrantStore;
    use crate::types::CapabilityToken;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        root: TempDir,
        picker: Arc<ScriptedPicker>,
        host: LocalHost,
        store: Arc<SqliteGrantStore>,
        manager: DirectoryGrantManager,
    }

    fn fixture() -> Fixture {
        let root = tempdir().unwrap();
        let picker = Arc::new(ScriptedPicker::new());
        let host = LocalHost::new(picker.clone());
        let store = Arc::new(SqliteGrantStore::in_memory());
        let manager = DirectoryGrantManager::new(Arc::new(host.clone()), store.clone());
        Fixture {
            root,
            picker,
            host,
            store,
            manager,
        }
    }

    impl Fixture {
        fn subdir(&self, name: &str) -> std::path::PathBuf {
            let path = self.root.path().join(name);
            std::fs::create_dir_all(&path).unwrap();
            path
        }

        async fn grant(&self, name: &str) -> Grant {
            self.picker.push_directory(self.subdir(name)).push_permission(true);
            self.manager.request_new_grant().await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_request_new_grant_activates_and_persists() {
        let fx = fixture();
        assert!(!fx.manager.has_permission().await.unwrap());
        let before = fx.manager.list_grants().await.unwrap().len();

        let grant = fx.grant("docs").await;

        assert!(fx.manager.has_permission().await.unwrap());
        assert_eq!(fx.manager.active_grant_id(), Some(grant.id.clone()));
        let listed = fx.manager.list_grants().await.unwrap();
        assert_eq!(listed.len(), before + 1);
        assert!(listed[0].is_active);
        assert_eq!(listed[0].display_name, "docs");
    }

    #[tokio::test]
    async fn test_cancelled_or_declined_request_fails() {
        let fx = fixture();

        let err = fx.manager.request_new_grant().await.unwrap_err();
        assert!(matches!(err, Error::Permission(PermissionError::Cancelled)));

        fx.picker.push_directory(fx.subdir("docs")).push_permission(false);
        let err = fx.manager.request_new_grant().await.unwrap_err();
        assert!(matches!(err, Error::Permission(PermissionError::Denied(_))));

        assert!(fx.manager.list_grants().await.unwrap().is_empty());
        assert!(!fx.manager.has_active_grant());
    }

    #[tokio::test]
    async fn test_switch_unknown_id_keeps_active() {
        let fx = fixture();
        let grant = fx.grant("docs").await;

        assert!(!fx.manager.switch_active("no-such-grant").await.unwrap());
        assert_eq!(fx.manager.active_grant_id(), Some(grant.id));
        assert!(fx.manager.has_permission().await.unwrap());
    }

    #[tokio::test]
    async fn test_switch_between_grants() {
        let fx = fixture();
        let first = fx.grant("first").await;
        let second = fx.grant("second").await;
        assert_eq!(fx.manager.active_grant_id(), Some(second.id.clone()));

        assert!(fx.manager.switch_active(&first.id).await.unwrap());
        assert_eq!(fx.manager.active_grant_id(), Some(first.id));
        assert_eq!(
            fx.manager.root_directory_name().await.unwrap().as_deref(),
            Some("first")
        );
    }

    #[tokio::test]
    async fn test_switch_refused_keeps_previous_grant() {
        let fx = fixture();
        let first = fx.grant("first").await;
        let second = fx.grant("second").await;

        fx.host.revoke(fx.root.path().join("first"));
        fx.picker.push_permission(false);

        assert!(!fx.manager.switch_active(&first.id).await.unwrap());
        assert_eq!(fx.manager.active_grant_id(), Some(second.id));
        assert!(fx.manager.has_permission().await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_active_grant_clears_session() {
        let fx = fixture();
        let grant = fx.grant("docs").await;

        assert!(fx.manager.remove_grant(&grant.id).await.unwrap());
        assert!(!fx.manager.has_active_grant());
        assert!(!fx.manager.cached_permission());

        let err = fx.manager.resolve_file("notes/a.txt", true).await.err().unwrap();
        assert!(matches!(err, Error::Permission(PermissionError::NoActiveGrant)));

        // Idempotent
        assert!(fx.manager.remove_grant(&grant.id).await.unwrap());
        assert!(fx.manager.remove_grant("never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_inactive_grant_keeps_session() {
        let fx = fixture();
        let first = fx.grant("first").await;
        let second = fx.grant("second").await;

        fx.manager.remove_grant(&first.id).await.unwrap();
        assert_eq!(fx.manager.active_grant_id(), Some(second.id));
        assert_eq!(fx.manager.list_grants().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_file_creates_only_when_asked() {
        let fx = fixture();
        fx.grant("docs").await;

        let err = fx.manager.resolve_file("notes/a.txt", false).await.err().unwrap();
        assert!(matches!(err, Error::NotFound(NotFoundError::Directory(_))));

        let file = fx.manager.resolve_file("notes/drafts/a.txt", true).await.unwrap();
        assert_eq!(file.name(), "a.txt");
        assert!(fx.root.path().join("docs/notes/drafts/a.txt").is_file());

        let err = fx.manager.resolve_file("notes/b.txt", false).await.err().unwrap();
        assert!(matches!(err, Error::NotFound(NotFoundError::File(_))));

        let err = fx.manager.resolve_file("", true).await.err().unwrap();
        assert!(matches!(err, Error::Validation(ValidationError::Empty)));
    }

    #[tokio::test]
    async fn test_resolve_directory_root_aliases() {
        let fx = fixture();
        fx.grant("docs").await;
        std::fs::create_dir_all(fx.root.path().join("docs/notes")).unwrap();

        for alias in ["", ".", "/"] {
            assert_eq!(fx.manager.resolve_directory(alias).await.unwrap().name(), "docs");
        }
        assert_eq!(fx.manager.resolve_directory("notes").await.unwrap().name(), "notes");
        assert!(matches!(
            fx.manager.resolve_directory("missing").await,
            Err(Error::NotFound(NotFoundError::Directory(_)))
        ));
    }

    #[tokio::test]
    async fn test_revoked_permission_is_re_requested() {
        let fx = fixture();
        let grant = fx.grant("docs").await;

        fx.host.revoke(fx.root.path().join("docs"));
        fx.picker.push_permission(false);

        let err = fx.manager.resolve_directory("").await.err().unwrap();
        assert!(matches!(err, Error::Permission(PermissionError::Denied(_))));
        assert_eq!(fx.manager.active_grant_id(), Some(grant.id.clone()));
        assert!(!fx.manager.cached_permission());
        assert!(!fx.manager.has_permission().await.unwrap());

        fx.picker.push_permission(true);
        assert!(fx.manager.resolve_directory("").await.is_ok());
        assert!(fx.manager.cached_permission());
    }

    #[tokio::test]
    async fn test_list_grants_reports_stale_token() {
        let fx = fixture();
        let stale = fx.grant("gone").await;
        fx.grant("kept").await;
        std::fs::remove_dir_all(fx.root.path().join("gone")).unwrap();

        let listed = fx.manager.list_grants().await.unwrap();
        assert_eq!(listed.len(), 2);
        let gone = listed.iter().find(|g| g.id == stale.id).unwrap();
        assert!(!gone.has_permission);
        assert!(gone.note.is_some());
        let kept = listed.iter().find(|g| g.id != stale.id).unwrap();
        assert!(kept.has_permission);
        assert!(kept.note.is_none());
    }

    #[tokio::test]
    async fn test_list_grants_survives_throwing_permission_check() {
        let mut handle = MockDirectoryHandle::new();
        handle
            .expect_query_permission()
            .returning(|_| Err(Error::Host(HostError::Api("boom".into()))));
        let handle: Arc<dyn DirectoryHandle> = Arc::new(handle);

        let mut host = MockHostProvider::new();
        host.expect_restore_directory()
            .returning(move |_| Ok(handle.clone()));

        let store = Arc::new(SqliteGrantStore::in_memory());
        store
            .put(&Grant::new("docs", CapabilityToken::new("token-1")))
            .await
            .unwrap();
        let manager = DirectoryGrantManager::new(Arc::new(host), store);

        let listed = manager.list_grants().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].has_permission);
        assert!(listed[0].note.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_resume_restores_last_active_grant() {
        let fx = fixture();
        let grant = fx.grant("docs").await;

        let next_session = DirectoryGrantManager::new(Arc::new(fx.host.clone()), fx.store.clone());
        assert!(!next_session.has_active_grant());

        let resumed = next_session.resume().await.unwrap().unwrap();
        assert_eq!(resumed.id, grant.id);
        assert!(next_session.has_permission().await.unwrap());
    }

    #[tokio::test]
    async fn test_resume_skips_revoked_grant() {
        let fx = fixture();
        fx.grant("docs").await;
        fx.host.revoke(fx.root.path().join("docs"));

        let next_session = DirectoryGrantManager::new(Arc::new(fx.host.clone()), fx.store.clone());
        assert!(next_session.resume().await.unwrap().is_none());
        assert!(!next_session.has_active_grant());
    }

    #[tokio::test]
    async fn test_forget_all() {
        let fx = fixture();
        fx.grant("first").await;
        fx.grant("second").await;

        fx.manager.forget_all().await.unwrap();
        assert!(fx.manager.list_grants().await.unwrap().is_empty());
        assert!(!fx.manager.has_active_grant());
        assert!(fx.manager.resume().await.unwrap().is_none());
    }
}

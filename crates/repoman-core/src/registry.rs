use std::sync::{Arc, Mutex};

use crate::engine::TransactionEngine;
use crate::models::{CoreError, CoreErrorKind, InstallScope, InstalledRef, Remote};

pub type RegistryResult<T> = Result<T, CoreError>;

/// Owns the two fixed installation scopes and mediates every read against
/// the transaction engine. The remote-list cache for a scope is dropped
/// before each listing, so a concurrent process adding or removing remotes
/// is never observed stale; the fresh result then repopulates the cache for
/// cheap re-reads by the front-end.
pub struct InstallationRegistry {
    engine: Arc<dyn TransactionEngine>,
    user: InstallationHandle,
    system: InstallationHandle,
}

struct InstallationHandle {
    scope: InstallScope,
    remotes: Mutex<Option<Vec<Remote>>>,
}

impl InstallationHandle {
    fn new(scope: InstallScope) -> Self {
        Self {
            scope,
            remotes: Mutex::new(None),
        }
    }

    fn invalidate(&self) {
        if let Ok(mut cache) = self.remotes.lock() {
            *cache = None;
        }
    }

    fn store(&self, remotes: Vec<Remote>) {
        if let Ok(mut cache) = self.remotes.lock() {
            *cache = Some(remotes);
        }
    }

    fn cached(&self) -> Option<Vec<Remote>> {
        self.remotes.lock().ok().and_then(|cache| cache.clone())
    }
}

impl InstallationRegistry {
    pub fn new(engine: Arc<dyn TransactionEngine>) -> Self {
        Self {
            engine,
            user: InstallationHandle::new(InstallScope::User),
            system: InstallationHandle::new(InstallScope::System),
        }
    }

    fn handle(&self, scope: InstallScope) -> &InstallationHandle {
        match scope {
            InstallScope::User => &self.user,
            InstallScope::System => &self.system,
        }
    }

    pub fn invalidate(&self, scope: InstallScope) {
        tracing::debug!(?scope, "dropping remote-list cache");
        self.handle(scope).invalidate();
    }

    /// Last listing result for the scope, without touching the engine.
    /// `None` after an invalidation that has not been followed by a read.
    pub fn cached_remotes(&self, scope: InstallScope) -> Option<Vec<Remote>> {
        self.handle(scope).cached()
    }

    pub async fn list_remotes(&self, scope: InstallScope) -> RegistryResult<Vec<Remote>> {
        let handle = self.handle(scope);
        handle.invalidate();
        let remotes = self.engine.list_remotes(scope).await?;
        handle.store(remotes.clone());
        Ok(remotes)
    }

    pub async fn remote_by_name(
        &self,
        scope: InstallScope,
        name: &str,
    ) -> RegistryResult<Remote> {
        self.list_remotes(scope)
            .await?
            .into_iter()
            .find(|remote| remote.name == name)
            .ok_or_else(|| CoreError {
                scope: Some(scope),
                task: None,
                kind: CoreErrorKind::ValidationFailure,
                message: format!("no remote named '{name}' in the {scope:?} installation"),
            })
    }

    pub async fn list_installed_refs(
        &self,
        scope: InstallScope,
    ) -> RegistryResult<Vec<InstalledRef>> {
        self.handle(scope).invalidate();
        self.engine.list_installed_refs(scope).await
    }

    /// Filters the full enumeration by origin. Installed-ref counts are
    /// small; the linear scan is deliberate.
    pub async fn list_installed_refs_for_remote(
        &self,
        scope: InstallScope,
        remote_name: &str,
    ) -> RegistryResult<Vec<InstalledRef>> {
        Ok(self
            .list_installed_refs(scope)
            .await?
            .into_iter()
            .filter(|installed| installed.origin == remote_name)
            .collect())
    }
}

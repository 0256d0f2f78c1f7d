pub mod process;

pub use process::ProcessFlatpakEngine;

use std::future::Future;
use std::pin::Pin;

use crate::models::{CoreError, InstallScope, InstalledRef, Remote};

pub type EngineResult<T> = Result<T, CoreError>;

pub type EngineFuture<T> = Pin<Box<dyn Future<Output = EngineResult<T>> + Send>>;

/// Seam over the external package-transaction engine. Production code talks
/// to the flatpak tooling through this trait; workers and the registry never
/// see the engine's own error types.
pub trait TransactionEngine: Send + Sync {
    fn list_remotes(&self, scope: InstallScope) -> EngineFuture<Vec<Remote>>;

    fn list_installed_refs(&self, scope: InstallScope) -> EngineFuture<Vec<InstalledRef>>;

    fn add_remote(&self, scope: InstallScope, name: String, source_url: String)
    -> EngineFuture<()>;

    fn remove_remote(&self, scope: InstallScope, name: String) -> EngineFuture<()>;

    fn uninstall_ref(&self, scope: InstallScope, installed: InstalledRef) -> EngineFuture<()>;

    fn install_bundle(&self, scope: InstallScope, bundle_path: String) -> EngineFuture<()>;
}

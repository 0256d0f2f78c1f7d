use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::sync::mpsc;

use crate::engine::TransactionEngine;
use crate::icon::{IconOutcome, IconStore};
use crate::models::{
    CoreError, CoreErrorKind, InstallScope, Remote, TaskId, TaskKind, TaskStatus,
};
use crate::registry::InstallationRegistry;
use crate::repofile::{fetch_repofile, is_flatpakref_path, is_flatpakrepo_url};

pub type WorkerResultReceiver = mpsc::UnboundedReceiver<WorkerResult>;

/// Handler for completed background work, injected into the pool at
/// construction time. Implementations forward results into the UI context;
/// they must not block.
pub trait CompletionSink: Send + Sync {
    fn task_finished(&self, result: WorkerResult);
}

pub struct ChannelCompletionSink {
    tx: mpsc::UnboundedSender<WorkerResult>,
}

impl CompletionSink for ChannelCompletionSink {
    fn task_finished(&self, result: WorkerResult) {
        // The receiver side lives on the UI loop; if it is gone there is
        // nobody left to notify.
        let _ = self.tx.send(result);
    }
}

/// Builds the channel pair used to hand results back to the single-threaded
/// consumer side.
pub fn channel_sink() -> (Arc<ChannelCompletionSink>, WorkerResultReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelCompletionSink { tx }), rx)
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome {
    RemoteAdded { remote: Remote },
    RemoteRemoved { refs_removed: usize },
    BundleInstalled,
    Icon(IconOutcome),
    Failed(CoreError),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Outcome of one dispatched worker. Produced exactly once per submitted
/// task and consumed exactly once by the sink.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub task: TaskId,
    pub kind: TaskKind,
    pub scope: InstallScope,
    pub remote: Option<String>,
    pub outcome: TaskOutcome,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WorkerRequest {
    AddRemote {
        scope: InstallScope,
        name: String,
        source_url: String,
    },
    RemoveRemote {
        scope: InstallScope,
        name: String,
    },
    InstallBundle {
        scope: InstallScope,
        bundle_path: String,
    },
    FetchIcon {
        scope: InstallScope,
        name: String,
        icon_url: Option<String>,
    },
}

impl WorkerRequest {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::AddRemote { .. } => TaskKind::AddRemote,
            Self::RemoveRemote { .. } => TaskKind::RemoveRemote,
            Self::InstallBundle { .. } => TaskKind::InstallBundle,
            Self::FetchIcon { .. } => TaskKind::FetchIcon,
        }
    }

    pub fn scope(&self) -> InstallScope {
        match self {
            Self::AddRemote { scope, .. }
            | Self::RemoveRemote { scope, .. }
            | Self::InstallBundle { scope, .. }
            | Self::FetchIcon { scope, .. } => *scope,
        }
    }

    pub fn remote_name(&self) -> Option<&str> {
        match self {
            Self::AddRemote { name, .. }
            | Self::RemoveRemote { name, .. }
            | Self::FetchIcon { name, .. } => Some(name),
            Self::InstallBundle { .. } => None,
        }
    }
}

/// Bounded pool of background transaction workers. Submission validates
/// synchronously and fails fast; the actual engine work runs on the runtime
/// under a concurrency bound, with operations on the same `(scope, remote)`
/// serialized through a per-remote lock.
pub struct WorkerPool {
    engine: Arc<dyn TransactionEngine>,
    registry: Arc<InstallationRegistry>,
    icons: IconStore,
    sink: Arc<dyn CompletionSink>,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    next_task_id: u64,
    statuses: HashMap<TaskId, TaskStatus>,
    remote_locks: HashMap<(InstallScope, String), Arc<tokio::sync::Mutex<()>>>,
}

impl WorkerPool {
    pub fn new(
        engine: Arc<dyn TransactionEngine>,
        registry: Arc<InstallationRegistry>,
        icons: IconStore,
        sink: Arc<dyn CompletionSink>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            engine,
            registry,
            icons,
            sink,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn status(&self, task: TaskId) -> Option<TaskStatus> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.statuses.get(&task).copied())
    }

    pub fn submit(self: &Arc<Self>, request: WorkerRequest) -> Result<TaskId, CoreError> {
        validate_request(&request)?;

        let kind = request.kind();
        let scope = request.scope();
        let remote = request.remote_name().map(str::to_owned);

        let (task, remote_lock) = {
            let mut state = self.state.lock().map_err(|_| CoreError {
                scope: Some(scope),
                task: Some(kind),
                kind: CoreErrorKind::Internal,
                message: "worker pool mutex poisoned".to_string(),
            })?;

            let task = TaskId(state.next_task_id);
            state.next_task_id = state.next_task_id.saturating_add(1);
            state.statuses.insert(task, TaskStatus::Queued);

            let remote_lock = remote.as_ref().map(|name| {
                state
                    .remote_locks
                    .entry((scope, name.clone()))
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                    .clone()
            });

            (task, remote_lock)
        };

        let pool = self.clone();
        tracing::debug!(?kind, ?scope, remote = remote.as_deref(), "dispatching worker");
        tokio::spawn(async move {
            let _permit = pool.permits.clone().acquire_owned().await.ok();
            let _remote_guard = match remote_lock {
                Some(lock) => Some(lock.lock_owned().await),
                None => None,
            };

            pool.set_status(task, TaskStatus::Running);
            let outcome = pool.run(request).await;
            pool.set_status(
                task,
                if outcome.is_success() {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                },
            );

            pool.sink.task_finished(WorkerResult {
                task,
                kind,
                scope,
                remote,
                outcome,
            });
        });

        Ok(task)
    }

    fn set_status(&self, task: TaskId, status: TaskStatus) {
        if let Ok(mut state) = self.state.lock() {
            state.statuses.insert(task, status);
        }
    }

    async fn run(&self, request: WorkerRequest) -> TaskOutcome {
        match request {
            WorkerRequest::AddRemote {
                scope,
                name,
                source_url,
            } => self
                .add_remote(scope, name, source_url)
                .await
                .unwrap_or_else(TaskOutcome::Failed),
            WorkerRequest::RemoveRemote { scope, name } => self
                .remove_remote(scope, name)
                .await
                .unwrap_or_else(TaskOutcome::Failed),
            WorkerRequest::InstallBundle { scope, bundle_path } => self
                .install_bundle(scope, bundle_path)
                .await
                .unwrap_or_else(TaskOutcome::Failed),
            WorkerRequest::FetchIcon {
                scope,
                name,
                icon_url,
            } => {
                let outcome = self
                    .icons
                    .refresh(scope, &name, icon_url.as_deref())
                    .await;
                TaskOutcome::Icon(outcome)
            }
        }
    }

    async fn add_remote(
        &self,
        scope: InstallScope,
        name: String,
        source_url: String,
    ) -> Result<TaskOutcome, CoreError> {
        tracing::info!(remote = %name, url = %source_url, "adding remote");
        // The engine performs the authoritative download of the repofile;
        // this fetch only supplies display metadata and may fail quietly.
        let fetch_url = source_url.clone();
        let metadata = tokio::task::spawn_blocking(move || fetch_repofile(&fetch_url))
            .await
            .ok()
            .and_then(|fetched| match fetched {
                Ok(repofile) => Some(repofile),
                Err(error) => {
                    tracing::debug!(%error, "repofile metadata unavailable");
                    None
                }
            })
            .unwrap_or_default();

        self.engine
            .add_remote(scope, name.clone(), source_url.clone())
            .await?;
        self.registry.invalidate(scope);

        Ok(TaskOutcome::RemoteAdded {
            remote: Remote {
                name,
                title: metadata.title,
                url: metadata.url.unwrap_or(source_url),
                icon_url: metadata.icon,
                scope,
            },
        })
    }

    async fn remove_remote(
        &self,
        scope: InstallScope,
        name: String,
    ) -> Result<TaskOutcome, CoreError> {
        // Refs first, remote last: a crash mid-operation must never leave
        // installed refs pointing at a remote that no longer exists.
        let refs = self
            .registry
            .list_installed_refs_for_remote(scope, &name)
            .await?;
        let refs_removed = refs.len();

        for installed in refs {
            tracing::warn!(installed_ref = %installed.name, remote = %name, "removing ref");
            self.engine.uninstall_ref(scope, installed).await?;
        }

        tracing::info!(remote = %name, "removing remote");
        self.engine.remove_remote(scope, name).await?;
        self.registry.invalidate(scope);

        Ok(TaskOutcome::RemoteRemoved { refs_removed })
    }

    async fn install_bundle(
        &self,
        scope: InstallScope,
        bundle_path: String,
    ) -> Result<TaskOutcome, CoreError> {
        tracing::info!(bundle = %bundle_path, "installing ref bundle");
        self.engine.install_bundle(scope, bundle_path).await?;
        self.registry.invalidate(scope);
        Ok(TaskOutcome::BundleInstalled)
    }
}

fn validate_request(request: &WorkerRequest) -> Result<(), CoreError> {
    let reject = |message: String| CoreError {
        scope: Some(request.scope()),
        task: Some(request.kind()),
        kind: CoreErrorKind::ValidationFailure,
        message,
    };

    if let Some(name) = request.remote_name()
        && name.trim().is_empty()
    {
        return Err(reject("remote name must not be empty".to_string()));
    }

    match request {
        WorkerRequest::AddRemote { source_url, .. } => {
            if !is_flatpakrepo_url(source_url) {
                return Err(reject(format!(
                    "'{source_url}' does not look like a flatpakrepo file"
                )));
            }
        }
        WorkerRequest::InstallBundle { bundle_path, .. } => {
            if !is_flatpakref_path(bundle_path) {
                return Err(reject(format!(
                    "'{bundle_path}' does not look like a flatpakref file"
                )));
            }
        }
        WorkerRequest::RemoveRemote { .. } | WorkerRequest::FetchIcon { .. } => {}
    }

    Ok(())
}

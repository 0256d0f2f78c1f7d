use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use repoman_core::engine::{EngineFuture, TransactionEngine};
use repoman_core::icon::IconStore;
use repoman_core::models::{
    CoreError, CoreErrorKind, InstallScope, InstalledRef, RefKind, Remote, TaskKind, TaskStatus,
};
use repoman_core::registry::InstallationRegistry;
use repoman_core::workers::{TaskOutcome, WorkerPool, WorkerRequest, channel_sink};

// Unreachable immediately (connection refused), keeps the best-effort
// metadata fetch from stalling the tests.
const DEAD_REPOFILE_URL: &str = "http://127.0.0.1:9/vendor.flatpakrepo";

#[derive(Default)]
struct RecordingEngine {
    remotes: Mutex<Vec<Remote>>,
    refs: Mutex<Vec<InstalledRef>>,
    events: Mutex<Vec<String>>,
    op_delay: Option<Duration>,
    running_ops: AtomicUsize,
    peak_ops: AtomicUsize,
    fail_remove_remote: bool,
}

impl RecordingEngine {
    fn with_delay(delay: Duration) -> Self {
        Self {
            op_delay: Some(delay),
            ..Self::default()
        }
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn mutation<T: Send + 'static>(
        self: &Arc<Self>,
        result: Result<T, CoreError>,
    ) -> EngineFuture<T> {
        let engine = self.clone();
        Box::pin(async move {
            let now = engine.running_ops.fetch_add(1, Ordering::SeqCst) + 1;
            engine.peak_ops.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = engine.op_delay {
                tokio::time::sleep(delay).await;
            }
            engine.running_ops.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

struct EngineHandle(Arc<RecordingEngine>);

impl TransactionEngine for EngineHandle {
    fn list_remotes(&self, scope: InstallScope) -> EngineFuture<Vec<Remote>> {
        let result: Vec<Remote> = self
            .0
            .remotes
            .lock()
            .unwrap()
            .iter()
            .filter(|remote| remote.scope == scope)
            .cloned()
            .collect();
        Box::pin(async move { Ok(result) })
    }

    fn list_installed_refs(&self, _scope: InstallScope) -> EngineFuture<Vec<InstalledRef>> {
        let result = self.0.refs.lock().unwrap().clone();
        Box::pin(async move { Ok(result) })
    }

    fn add_remote(
        &self,
        scope: InstallScope,
        name: String,
        source_url: String,
    ) -> EngineFuture<()> {
        self.0.record(format!("add-remote:{name}"));
        self.0.remotes.lock().unwrap().push(Remote {
            name,
            title: None,
            url: source_url,
            icon_url: None,
            scope,
        });
        self.0.mutation(Ok(()))
    }

    fn remove_remote(&self, _scope: InstallScope, name: String) -> EngineFuture<()> {
        self.0.record(format!("remove-remote:{name}"));
        if self.0.fail_remove_remote {
            return self.0.mutation(Err(CoreError {
                scope: None,
                task: Some(TaskKind::RemoveRemote),
                kind: CoreErrorKind::TransactionFailure,
                message: "remote is in use".to_string(),
            }));
        }
        self.0.remotes.lock().unwrap().retain(|remote| remote.name != name);
        self.0.mutation(Ok(()))
    }

    fn uninstall_ref(&self, _scope: InstallScope, installed: InstalledRef) -> EngineFuture<()> {
        self.0.record(format!("uninstall:{}", installed.name));
        self.0
            .refs
            .lock()
            .unwrap()
            .retain(|candidate| candidate.name != installed.name);
        self.0.mutation(Ok(()))
    }

    fn install_bundle(&self, _scope: InstallScope, bundle_path: String) -> EngineFuture<()> {
        self.0.record(format!("install-bundle:{bundle_path}"));
        self.0.mutation(Ok(()))
    }
}

fn pool_for(
    engine: Arc<RecordingEngine>,
    max_concurrency: usize,
) -> (
    Arc<WorkerPool>,
    Arc<InstallationRegistry>,
    repoman_core::workers::WorkerResultReceiver,
) {
    let registry = Arc::new(InstallationRegistry::new(Arc::new(EngineHandle(
        engine.clone(),
    )) as Arc<dyn TransactionEngine>));
    let icons = IconStore::new(std::env::temp_dir().join(format!(
        "repoman-pool-icons-{}",
        std::process::id()
    )));
    let (sink, rx) = channel_sink();
    let pool = Arc::new(WorkerPool::new(
        Arc::new(EngineHandle(engine)) as Arc<dyn TransactionEngine>,
        registry.clone(),
        icons,
        sink,
        max_concurrency,
    ));
    (pool, registry, rx)
}

#[tokio::test]
async fn add_remote_delivers_one_result_and_refreshes_listing() {
    let engine = Arc::new(RecordingEngine::default());
    let (pool, registry, mut rx) = pool_for(engine, 4);

    let task = pool
        .submit(WorkerRequest::AddRemote {
            scope: InstallScope::User,
            name: "vendor".to_string(),
            source_url: DEAD_REPOFILE_URL.to_string(),
        })
        .unwrap();

    let result = rx.recv().await.unwrap();
    assert_eq!(result.task, task);
    assert_eq!(result.kind, TaskKind::AddRemote);
    assert!(result.outcome.is_success());
    assert_eq!(pool.status(task), Some(TaskStatus::Completed));

    // The completion consumer refreshes the list and must see the addition.
    let names: Vec<String> = registry
        .list_remotes(InstallScope::User)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["vendor"]);

    // Exactly one result per dispatched worker.
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn remove_remote_uninstalls_refs_before_the_remote() {
    let engine = Arc::new(RecordingEngine::default());
    *engine.remotes.lock().unwrap() = vec![Remote {
        name: "vendor".to_string(),
        title: None,
        url: "https://vendor.example.com/repo/".to_string(),
        icon_url: None,
        scope: InstallScope::User,
    }];
    *engine.refs.lock().unwrap() = vec![
        InstalledRef {
            name: "org.example.App".to_string(),
            kind: RefKind::App,
            branch: "stable".to_string(),
            origin: "vendor".to_string(),
        },
        InstalledRef {
            name: "org.example.Platform".to_string(),
            kind: RefKind::Runtime,
            branch: "23.08".to_string(),
            origin: "vendor".to_string(),
        },
        InstalledRef {
            name: "org.other.App".to_string(),
            kind: RefKind::App,
            branch: "stable".to_string(),
            origin: "flathub".to_string(),
        },
    ];
    let (pool, registry, mut rx) = pool_for(engine.clone(), 4);

    pool.submit(WorkerRequest::RemoveRemote {
        scope: InstallScope::User,
        name: "vendor".to_string(),
    })
    .unwrap();

    let result = rx.recv().await.unwrap();
    assert_eq!(
        result.outcome,
        TaskOutcome::RemoteRemoved { refs_removed: 2 }
    );

    // Refs owned by the remote are gone before the registration is.
    let events = engine.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "uninstall:org.example.App",
            "uninstall:org.example.Platform",
            "remove-remote:vendor",
        ]
    );

    let remaining = registry
        .list_installed_refs_for_remote(InstallScope::User, "vendor")
        .await
        .unwrap();
    assert!(remaining.is_empty());
    assert!(
        !registry
            .list_remotes(InstallScope::User)
            .await
            .unwrap()
            .iter()
            .any(|remote| remote.name == "vendor")
    );
}

#[tokio::test]
async fn engine_failures_come_back_as_failed_results() {
    let engine = Arc::new(RecordingEngine {
        fail_remove_remote: true,
        ..RecordingEngine::default()
    });
    let (pool, _registry, mut rx) = pool_for(engine, 4);

    let task = pool
        .submit(WorkerRequest::RemoveRemote {
            scope: InstallScope::System,
            name: "vendor".to_string(),
        })
        .unwrap();

    let result = rx.recv().await.unwrap();
    match result.outcome {
        TaskOutcome::Failed(error) => {
            assert_eq!(error.kind, CoreErrorKind::TransactionFailure);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(pool.status(task), Some(TaskStatus::Failed));
}

#[tokio::test]
async fn invalid_repofile_url_is_rejected_before_dispatch() {
    let engine = Arc::new(RecordingEngine::default());
    let (pool, _registry, mut rx) = pool_for(engine.clone(), 4);

    let error = pool
        .submit(WorkerRequest::AddRemote {
            scope: InstallScope::User,
            name: "vendor".to_string(),
            source_url: "https://example.com/not-a-repo.txt".to_string(),
        })
        .unwrap_err();

    assert_eq!(error.kind, CoreErrorKind::ValidationFailure);
    assert!(engine.events.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn bundle_path_extension_is_validated() {
    let engine = Arc::new(RecordingEngine::default());
    let (pool, _registry, _rx) = pool_for(engine, 4);

    let error = pool
        .submit(WorkerRequest::InstallBundle {
            scope: InstallScope::User,
            bundle_path: "/tmp/app.deb".to_string(),
        })
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ValidationFailure);
}

#[tokio::test]
async fn same_remote_operations_are_serialized() {
    let engine = Arc::new(RecordingEngine::with_delay(Duration::from_millis(60)));
    let (pool, _registry, mut rx) = pool_for(engine.clone(), 8);

    pool.submit(WorkerRequest::AddRemote {
        scope: InstallScope::User,
        name: "vendor".to_string(),
        source_url: DEAD_REPOFILE_URL.to_string(),
    })
    .unwrap();
    pool.submit(WorkerRequest::RemoveRemote {
        scope: InstallScope::User,
        name: "vendor".to_string(),
    })
    .unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert!(first.outcome.is_success(), "{:?}", first.outcome);
    assert!(second.outcome.is_success(), "{:?}", second.outcome);

    // The add must have fully finished before the remove began.
    assert_eq!(engine.peak_ops.load(Ordering::SeqCst), 1);
    assert_eq!(first.kind, TaskKind::AddRemote);
    assert_eq!(second.kind, TaskKind::RemoveRemote);
}

#[tokio::test]
async fn pool_bound_limits_concurrent_engine_work() {
    let engine = Arc::new(RecordingEngine::with_delay(Duration::from_millis(40)));
    let (pool, _registry, mut rx) = pool_for(engine.clone(), 1);

    for index in 0..3 {
        pool.submit(WorkerRequest::InstallBundle {
            scope: InstallScope::User,
            bundle_path: format!("/tmp/app-{index}.flatpakref"),
        })
        .unwrap();
    }

    for _ in 0..3 {
        let result = rx.recv().await.unwrap();
        assert!(result.outcome.is_success());
    }

    assert_eq!(engine.peak_ops.load(Ordering::SeqCst), 1);
}

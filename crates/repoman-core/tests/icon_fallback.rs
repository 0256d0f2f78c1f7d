use std::sync::atomic::{AtomicUsize, Ordering};

use repoman_core::icon::{IconOutcome, IconStore};
use repoman_core::models::InstallScope;

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

fn temp_store() -> IconStore {
    let root = std::env::temp_dir().join(format!(
        "repoman-icons-{}-{}",
        std::process::id(),
        NEXT_DIR.fetch_add(1, Ordering::SeqCst)
    ));
    IconStore::new(root)
}

#[tokio::test]
async fn unreachable_icon_url_degrades_to_placeholder() {
    let store = temp_store();

    let outcome = store
        .refresh(
            InstallScope::User,
            "vendor",
            Some("http://127.0.0.1:9/icon.svg"),
        )
        .await;

    assert_eq!(outcome, IconOutcome::Placeholder);
}

#[tokio::test]
async fn fetch_failure_falls_back_to_the_cached_copy() {
    let store = temp_store();
    let cached = store.cache_path(InstallScope::User, "vendor");
    std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
    std::fs::write(&cached, "<svg/>").unwrap();

    let outcome = store
        .refresh(
            InstallScope::User,
            "vendor",
            Some("http://127.0.0.1:9/icon.svg"),
        )
        .await;

    assert_eq!(outcome, IconOutcome::Cached(cached));
}

#[tokio::test]
async fn missing_icon_url_uses_cache_when_present() {
    let store = temp_store();
    let cached = store.cache_path(InstallScope::System, "vendor");
    std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
    std::fs::write(&cached, "<svg/>").unwrap();

    let outcome = store.refresh(InstallScope::System, "vendor", None).await;
    assert_eq!(outcome, IconOutcome::Cached(cached));
}

#[tokio::test]
async fn no_icon_anywhere_is_still_not_an_error() {
    let store = temp_store();
    let outcome = store.refresh(InstallScope::User, "vendor", None).await;
    assert_eq!(outcome, IconOutcome::Placeholder);
}

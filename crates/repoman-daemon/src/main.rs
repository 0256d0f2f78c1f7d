use std::sync::Arc;

use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use repoman_core::sources::FileSourceList;
use repoman_daemon::gate::{AuthorizationGate, DEFAULT_DENIAL_LOG, DenialLog};
use repoman_daemon::polkit::{BusCallerResolver, PolkitConnector};
use repoman_daemon::service::{OBJECT_PATH, RepoService, SERVICE_NAME};

const SOURCE_LIST_PATH: &str = "/etc/apt/sources.list.d/repoman.list";

#[tokio::main]
async fn main() -> zbus::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let connection = zbus::Connection::system().await?;

    let resolver = Arc::new(BusCallerResolver::new(&connection).await?);
    let connector = Arc::new(PolkitConnector::new(connection.clone()));
    let gate = Arc::new(AuthorizationGate::new(
        resolver,
        connector,
        DenialLog::new(DEFAULT_DENIAL_LOG),
    ));

    let sources = Arc::new(FileSourceList::new(SOURCE_LIST_PATH));
    let shutdown = Arc::new(Notify::new());
    let service = RepoService::new(gate, sources, shutdown.clone());

    connection.object_server().at(OBJECT_PATH, service).await?;
    connection.request_name(SERVICE_NAME).await?;
    tracing::info!(name = SERVICE_NAME, path = OBJECT_PATH, "service ready");

    shutdown.notified().await;
    tracing::info!("shutting down");
    Ok(())
}

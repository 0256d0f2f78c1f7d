use std::sync::Arc;

use tokio::sync::Notify;
use zbus::message::Header;

use repoman_core::models::CoreErrorKind;
use repoman_core::sources::SourceListEditor;

use crate::error::ServiceError;
use crate::gate::{AuthorizationGate, Caller};

pub const SERVICE_NAME: &str = "org.example.repoman";
pub const OBJECT_PATH: &str = "/org/example/repoman";
pub const INTERFACE_NAME: &str = "org.example.repoman1";
pub const MODIFY_SOURCES_PRIVILEGE: &str = "org.example.repoman.modifysources";

// Status codes returned across the bus instead of faults; IPC error
// propagation is coarser than in-process errors.
pub const STATUS_OK: i32 = 0;
pub const STATUS_PERMISSION_DENIED: i32 = 1;
pub const STATUS_INVALID_LINE: i32 = 2;
pub const STATUS_WRITE_FAILED: i32 = 3;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceOp {
    Add,
    Remove,
}

/// The privileged mutation service. Every mutating operation authorizes
/// the caller before the source list is touched; `Exit` is process
/// lifecycle control and deliberately unauthenticated.
pub struct RepoService {
    gate: Arc<AuthorizationGate>,
    sources: Arc<dyn SourceListEditor>,
    shutdown: Arc<Notify>,
}

impl RepoService {
    pub fn new(
        gate: Arc<AuthorizationGate>,
        sources: Arc<dyn SourceListEditor>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            gate,
            sources,
            shutdown,
        }
    }

    /// Authorization, sanitization and the source-list edit for one
    /// mutating call, folded into a numeric status.
    pub async fn apply(&self, caller: &Caller, line: &str, op: SourceOp) -> i32 {
        match self.gate.check(caller, MODIFY_SOURCES_PRIVILEGE).await {
            Ok(()) => {}
            Err(ServiceError::PermissionDeniedByPolicy(privilege)) => {
                tracing::warn!(%caller, privilege, "refusing source list mutation");
                return STATUS_PERMISSION_DENIED;
            }
            Err(error) => {
                // No decision is a denial.
                tracing::error!(%caller, %error, "authorization unavailable, failing closed");
                return STATUS_PERMISSION_DENIED;
            }
        }

        let result = match op {
            SourceOp::Add => self.sources.add_line(line),
            SourceOp::Remove => self.sources.remove_line(line),
        };

        match result {
            Ok(()) => {
                tracing::info!(%caller, ?op, "source list updated");
                STATUS_OK
            }
            Err(error) if error.kind == CoreErrorKind::ValidationFailure => {
                tracing::warn!(%caller, %error, "rejecting malformed source line");
                STATUS_INVALID_LINE
            }
            Err(error) => {
                tracing::error!(%caller, %error, "source list edit failed");
                STATUS_WRITE_FAILED
            }
        }
    }

    pub fn request_exit(&self) {
        self.shutdown.notify_one();
    }
}

fn caller_from_header(header: &Header<'_>) -> Caller {
    match header.sender() {
        Some(sender) => Caller::Bus {
            sender: sender.to_string(),
        },
        None => Caller::Local,
    }
}

#[zbus::interface(name = "org.example.repoman1")]
impl RepoService {
    #[zbus(name = "add_repo")]
    async fn add_repo(&self, line: &str, #[zbus(header)] header: Header<'_>) -> i32 {
        self.apply(&caller_from_header(&header), line, SourceOp::Add)
            .await
    }

    #[zbus(name = "remove_repo")]
    async fn remove_repo(&self, line: &str, #[zbus(header)] header: Header<'_>) -> i32 {
        self.apply(&caller_from_header(&header), line, SourceOp::Remove)
            .await
    }

    #[zbus(name = "Exit")]
    fn exit(&self) {
        tracing::info!("exit requested over the bus");
        self.request_exit();
    }
}

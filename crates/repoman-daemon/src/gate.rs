use std::fmt::{Display, Formatter};
use std::fs::OpenOptions;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::ServiceError;

/// How long one policy-authority query may block the dispatch thread.
pub const AUTHORITY_TIMEOUT: Duration = Duration::from_secs(600);

pub const DEFAULT_DENIAL_LOG: &str = "/tmp/repoman.log";

pub type AuthorityFuture<T> = Pin<Box<dyn Future<Output = Result<T, AuthorityError>> + Send>>;

/// Failures talking to the external policy authority. `ServiceUnknown` is
/// the one class that triggers the reconnect-and-retry path; everything
/// else surfaces to the caller.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("policy authority not on the bus: {0}")]
    ServiceUnknown(String),
    #[error("policy authority unreachable: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PolicyDecision {
    pub authorized: bool,
    pub detail: String,
}

pub trait PolicyAuthority: Send + Sync {
    fn check(&self, pid: u32, privilege: &str) -> AuthorityFuture<PolicyDecision>;
}

/// Produces fresh authority handles. The gate resolves one lazily, caches
/// it, and asks for a replacement after a `ServiceUnknown` fault.
pub trait AuthorityConnector: Send + Sync {
    fn connect(&self) -> AuthorityFuture<Arc<dyn PolicyAuthority>>;
}

/// Resolves a bus sender name to the calling process id.
pub trait CallerResolver: Send + Sync {
    fn pid_of(&self, sender: &str) -> AuthorityFuture<u32>;
}

/// Identity of the party invoking a privileged operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Caller {
    /// In-process/API call with no bus session behind it; trusted.
    Local,
    /// A connection on the bus, identified by its unique sender name.
    Bus { sender: String },
}

impl Display for Caller {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Bus { sender } => write!(f, "{sender}"),
        }
    }
}

/// Append-only diagnostic record of refused privileged calls. Writing is
/// best-effort: a log failure must never fail the authorization flow.
pub struct DenialLog {
    path: PathBuf,
}

impl DenialLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, message: &str) {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc2822)
            .unwrap_or_else(|_| {
                let seconds = SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs())
                    .unwrap_or(0);
                seconds.to_string()
            });

        let _ = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{timestamp} : {message}"));
    }
}

/// Verifies that the caller of a privileged operation holds a given
/// privilege, querying the external policy authority through a lazily
/// cached handle. Fails closed: no decision means no access.
pub struct AuthorizationGate {
    resolver: Arc<dyn CallerResolver>,
    connector: Arc<dyn AuthorityConnector>,
    authority: Mutex<Option<Arc<dyn PolicyAuthority>>>,
    denial_log: DenialLog,
    enforce: bool,
}

impl AuthorizationGate {
    pub fn new(
        resolver: Arc<dyn CallerResolver>,
        connector: Arc<dyn AuthorityConnector>,
        denial_log: DenialLog,
    ) -> Self {
        Self {
            resolver,
            connector,
            authority: Mutex::new(None),
            denial_log,
            enforce: true,
        }
    }

    /// Disables policy enforcement. Only sensible on a session bus during
    /// development, where restricting operations has no meaning.
    pub fn without_enforcement(mut self) -> Self {
        self.enforce = false;
        self
    }

    pub async fn check(&self, caller: &Caller, privilege: &str) -> Result<(), ServiceError> {
        let sender = match caller {
            Caller::Local => return Ok(()),
            Caller::Bus { sender } => sender,
        };
        if !self.enforce {
            return Ok(());
        }

        let pid = self
            .resolver
            .pid_of(sender)
            .await
            .map_err(|error| ServiceError::RepomanException(error.to_string()))?;

        let decision = self.query(pid, privilege).await.map_err(|error| {
            tracing::error!(%error, privilege, "policy authority query failed");
            ServiceError::RepomanException(error.to_string())
        })?;

        if decision.authorized {
            return Ok(());
        }

        self.denial_log.append(&format!(
            "sender {sender} pid {pid} is not authorized for {privilege}: {}",
            decision.detail
        ));
        tracing::warn!(%caller, pid, privilege, "authorization denied");
        Err(ServiceError::PermissionDeniedByPolicy(privilege.to_string()))
    }

    async fn query(&self, pid: u32, privilege: &str) -> Result<PolicyDecision, AuthorityError> {
        let authority = self.cached_or_connect().await?;
        match self.ask(authority.as_ref(), pid, privilege).await {
            Err(AuthorityError::ServiceUnknown(detail)) => {
                // The authority timed out off the bus; reconnect and retry
                // exactly once.
                tracing::debug!(detail, "reconnecting to policy authority");
                {
                    let mut cached = self.authority.lock().await;
                    *cached = None;
                }
                let authority = self.cached_or_connect().await?;
                self.ask(authority.as_ref(), pid, privilege).await
            }
            other => other,
        }
    }

    async fn ask(
        &self,
        authority: &dyn PolicyAuthority,
        pid: u32,
        privilege: &str,
    ) -> Result<PolicyDecision, AuthorityError> {
        match timeout(AUTHORITY_TIMEOUT, authority.check(pid, privilege)).await {
            Ok(decision) => decision,
            Err(_) => Err(AuthorityError::Transport(format!(
                "authorization check did not complete within {AUTHORITY_TIMEOUT:?}"
            ))),
        }
    }

    async fn cached_or_connect(&self) -> Result<Arc<dyn PolicyAuthority>, AuthorityError> {
        let mut cached = self.authority.lock().await;
        if let Some(authority) = cached.as_ref() {
            return Ok(authority.clone());
        }
        let authority = self.connector.connect().await?;
        *cached = Some(authority.clone());
        Ok(authority)
    }
}

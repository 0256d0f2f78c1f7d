use std::collections::HashMap;
use std::sync::Arc;

use zbus::names::BusName;
use zbus::zvariant::Value;
use zbus::{fdo, proxy};

use crate::gate::{
    AuthorityConnector, AuthorityError, AuthorityFuture, CallerResolver, PolicyAuthority,
    PolicyDecision,
};

const ALLOW_USER_INTERACTION: u32 = 1;
const SERVICE_UNKNOWN_ERROR: &str = "org.freedesktop.DBus.Error.ServiceUnknown";

#[proxy(
    interface = "org.freedesktop.PolicyKit1.Authority",
    default_service = "org.freedesktop.PolicyKit1",
    default_path = "/org/freedesktop/PolicyKit1/Authority"
)]
trait PolicyKit1Authority {
    #[allow(clippy::type_complexity)]
    fn check_authorization(
        &self,
        subject: &(&str, HashMap<&str, Value<'_>>),
        action_id: &str,
        details: HashMap<&str, &str>,
        flags: u32,
        cancellation_id: &str,
    ) -> zbus::Result<(bool, bool, HashMap<String, String>)>;
}

/// Production policy authority backed by the PolicyKit daemon on the
/// system bus.
pub struct PolkitAuthority {
    proxy: PolicyKit1AuthorityProxy<'static>,
}

impl PolkitAuthority {
    pub async fn new(connection: &zbus::Connection) -> zbus::Result<Self> {
        let proxy = PolicyKit1AuthorityProxy::new(connection).await?;
        Ok(Self { proxy })
    }
}

impl PolicyAuthority for PolkitAuthority {
    fn check(&self, pid: u32, privilege: &str) -> AuthorityFuture<PolicyDecision> {
        let proxy = self.proxy.clone();
        let privilege = privilege.to_string();

        Box::pin(async move {
            let mut subject_details: HashMap<&str, Value<'_>> = HashMap::new();
            subject_details.insert("pid", Value::from(pid));
            subject_details.insert("start-time", Value::from(0u64));

            let (authorized, _is_challenge, details) = proxy
                .check_authorization(
                    &("unix-process", subject_details),
                    &privilege,
                    HashMap::new(),
                    ALLOW_USER_INTERACTION,
                    "",
                )
                .await
                .map_err(map_bus_error)?;

            let detail = details
                .into_iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");

            Ok(PolicyDecision { authorized, detail })
        })
    }
}

/// Resolves authority handles against a live bus connection, so a restart
/// of the authority daemon only costs a fresh proxy.
pub struct PolkitConnector {
    connection: zbus::Connection,
}

impl PolkitConnector {
    pub fn new(connection: zbus::Connection) -> Self {
        Self { connection }
    }
}

impl AuthorityConnector for PolkitConnector {
    fn connect(&self) -> AuthorityFuture<Arc<dyn PolicyAuthority>> {
        let connection = self.connection.clone();
        Box::pin(async move {
            let authority = PolkitAuthority::new(&connection)
                .await
                .map_err(map_bus_error)?;
            Ok(Arc::new(authority) as Arc<dyn PolicyAuthority>)
        })
    }
}

/// Resolves a sender's unique bus name to its process id through the bus
/// daemon itself.
pub struct BusCallerResolver {
    proxy: fdo::DBusProxy<'static>,
}

impl BusCallerResolver {
    pub async fn new(connection: &zbus::Connection) -> zbus::Result<Self> {
        let proxy = fdo::DBusProxy::new(connection).await?;
        Ok(Self { proxy })
    }
}

impl CallerResolver for BusCallerResolver {
    fn pid_of(&self, sender: &str) -> AuthorityFuture<u32> {
        let proxy = self.proxy.clone();
        let sender = sender.to_string();

        Box::pin(async move {
            let name = BusName::try_from(sender.as_str()).map_err(|error| {
                AuthorityError::Transport(format!("invalid sender name '{sender}': {error}"))
            })?;
            proxy
                .get_connection_unix_process_id(name)
                .await
                .map_err(|error| map_bus_error(error.into()))
        })
    }
}

fn map_bus_error(error: zbus::Error) -> AuthorityError {
    match &error {
        zbus::Error::FDO(fdo_error) => {
            if matches!(**fdo_error, fdo::Error::ServiceUnknown(_)) {
                return AuthorityError::ServiceUnknown(error.to_string());
            }
        }
        zbus::Error::MethodError(name, _, _) => {
            if name.as_str() == SERVICE_UNKNOWN_ERROR {
                return AuthorityError::ServiceUnknown(error.to_string());
            }
        }
        _ => {}
    }
    AuthorityError::Transport(error.to_string())
}

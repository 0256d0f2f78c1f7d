/// Fault kinds visible across the bus boundary. Only these two names are
/// part of the service contract; everything else is folded into a numeric
/// status by the dispatch layer.
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.example.repoman")]
pub enum ServiceError {
    #[zbus(error)]
    ZBus(zbus::Error),
    RepomanException(String),
    PermissionDeniedByPolicy(String),
}

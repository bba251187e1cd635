use std::fmt;
use std::sync::Arc;

use super::device_service::DeviceService;
use super::settings::ServiceEndpoint;
use crate::error::BindError;

/// Platform bind call for the primary device service.
///
/// `bind` returns as soon as the request is issued. Completion is reported
/// later as a [`ServiceEvent`].
pub trait ServiceBinder: Send + Sync {
    fn bind(&self, endpoint: &ServiceEndpoint) -> Result<(), BindError>;
}

/// Secondary capability bound once the primary connection is up
pub trait DependentServiceBinder: Send + Sync {
    fn bind(&self, service: Arc<dyn DeviceService>) -> Result<(), BindError>;

    fn unbind(&self);
}

/// Lifecycle notifications delivered by the platform
#[derive(Clone)]
pub enum ServiceEvent {
    Connected(Arc<dyn DeviceService>),
    Disconnected,
}

impl fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(_) => f.write_str("Connected"),
            Self::Disconnected => f.write_str("Disconnected"),
        }
    }
}

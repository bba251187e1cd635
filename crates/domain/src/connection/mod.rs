mod binder;
mod connection_state;
mod device_service;
mod listener;
mod settings;

pub use binder::{DependentServiceBinder, ServiceBinder, ServiceEvent};
pub use connection_state::ConnectionState;
pub use device_service::DeviceService;
pub use listener::ReadyListener;
pub use settings::{
    DEFAULT_SERVICE_ACTION, DEFAULT_SERVICE_PACKAGE, MAX_RETRY_COUNT, RETRY_INTERVAL,
    ServiceEndpoint, SupervisorConfig,
};

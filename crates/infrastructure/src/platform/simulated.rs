use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use domain::{
    BindError, DeviceService, RemoteError, ServiceBinder, ServiceEndpoint, ServiceEvent,
    VectorPrinter,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::printer::RecordingPrinter;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulatorConfig {
    #[serde(default = "default_service_version")]
    pub service_version: String,
    /// Bind requests to reject before the service becomes reachable
    #[serde(default)]
    pub bind_failures: u32,
    /// Delay before the platform reports a bind as established
    #[serde(default)]
    pub connect_delay_ms: u64,
    /// JSON-lines file receiving every finished print job
    #[serde(default)]
    pub spool_path: Option<String>,
}

fn default_service_version() -> String {
    "3.2.0-sim".to_string()
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            service_version: default_service_version(),
            bind_failures: 0,
            connect_delay_ms: 0,
            spool_path: None,
        }
    }
}

/// In-process stand-in for the platform binding mechanism.
///
/// Lifecycle events are delivered on the channel returned by
/// [`SimulatedPlatform::new`], which the connection supervisor consumes.
pub struct SimulatedPlatform {
    config: SimulatorConfig,
    events: mpsc::UnboundedSender<ServiceEvent>,
    bind_failures: AtomicU32,
    bind_requests: AtomicUsize,
    service: Arc<SimulatedDeviceService>,
}

impl SimulatedPlatform {
    pub fn new(config: SimulatorConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Arc::new(SimulatedDeviceService::new(
            &config.service_version,
            config.spool_path.as_deref(),
        ));
        let platform = Self {
            bind_failures: AtomicU32::new(config.bind_failures),
            bind_requests: AtomicUsize::new(0),
            config,
            events: tx,
            service,
        };
        (Arc::new(platform), rx)
    }

    pub fn service(&self) -> Arc<SimulatedDeviceService> {
        self.service.clone()
    }

    /// Number of bind requests issued so far, failed ones included
    pub fn bind_requests(&self) -> usize {
        self.bind_requests.load(Ordering::SeqCst)
    }

    pub fn fail_next_binds(&self, count: u32) {
        self.bind_failures.store(count, Ordering::SeqCst);
    }

    /// Kill the service process without telling anyone
    pub fn kill_service(&self) {
        warn!("💀 Simulated device service killed");
        self.service.kill();
    }

    /// Kill the service process and report the binding as lost
    pub fn crash_service(&self) {
        self.kill_service();
        self.deliver(ServiceEvent::Disconnected);
    }

    fn deliver(&self, event: ServiceEvent) {
        if self.events.send(event).is_err() {
            warn!("No supervisor is listening for service events");
        }
    }
}

impl ServiceBinder for SimulatedPlatform {
    fn bind(&self, endpoint: &ServiceEndpoint) -> Result<(), BindError> {
        self.bind_requests.fetch_add(1, Ordering::SeqCst);

        let rejected = self
            .bind_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(BindError::ServiceNotFound(endpoint.to_string()));
        }

        self.service.revive();
        let service: Arc<dyn DeviceService> = self.service.clone();
        let delay = Duration::from_millis(self.config.connect_delay_ms);

        if delay.is_zero() {
            self.deliver(ServiceEvent::Connected(service));
        } else {
            let tx = self.events.clone();
            let deadline = tokio::time::Instant::now() + delay;
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                if tx.send(ServiceEvent::Connected(service)).is_err() {
                    warn!("No supervisor is listening for service events");
                }
            });
        }
        Ok(())
    }
}

/// Device service hosted by the simulated platform
pub struct SimulatedDeviceService {
    version: String,
    alive: Arc<AtomicBool>,
    registered: AtomicBool,
    debug_log: AtomicBool,
    printer: Arc<RecordingPrinter>,
}

impl SimulatedDeviceService {
    pub fn new(version: &str, spool_path: Option<&str>) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        Self {
            version: version.to_string(),
            printer: Arc::new(RecordingPrinter::new(alive.clone(), spool_path)),
            alive,
            registered: AtomicBool::new(false),
            debug_log: AtomicBool::new(false),
        }
    }

    pub fn printer(&self) -> Arc<RecordingPrinter> {
        self.printer.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn debug_log_enabled(&self) -> bool {
        self.debug_log.load(Ordering::SeqCst)
    }

    /// A dead process forgets its registrations
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.registered.store(false, Ordering::SeqCst);
    }

    pub fn revive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    fn ensure_alive(&self) -> Result<(), RemoteError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(RemoteError::DeadObject)
        }
    }
}

impl DeviceService for SimulatedDeviceService {
    fn version(&self) -> Result<String, RemoteError> {
        self.ensure_alive()?;
        Ok(self.version.clone())
    }

    fn debug_log(&self, enabled: bool) -> Result<(), RemoteError> {
        self.ensure_alive()?;
        self.debug_log.store(enabled, Ordering::SeqCst);
        info!(enabled, "Device service debug log toggled");
        Ok(())
    }

    fn register(&self, use_epay_module: bool) -> Result<(), RemoteError> {
        self.ensure_alive()?;
        self.registered.store(true, Ordering::SeqCst);
        info!(use_epay_module, "Client registered with device service");
        Ok(())
    }

    fn unregister(&self) -> Result<(), RemoteError> {
        self.ensure_alive()?;
        if !self.registered.swap(false, Ordering::SeqCst) {
            return Err(RemoteError::Remote("client not registered".to_string()));
        }
        Ok(())
    }

    fn vector_printer(&self) -> Result<Arc<dyn VectorPrinter>, RemoteError> {
        self.ensure_alive()?;
        if !self.is_registered() {
            return Err(RemoteError::Security(
                "client not registered with device service".to_string(),
            ));
        }
        Ok(self.printer.clone())
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use domain::{BindError, DependentServiceBinder, DeviceService};
use tracing::info;

/// Binds the limited-access companion service once the device service is up
#[derive(Default)]
pub struct LimitedServiceBinder {
    bound: AtomicBool,
}

impl LimitedServiceBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }
}

impl DependentServiceBinder for LimitedServiceBinder {
    fn bind(&self, service: Arc<dyn DeviceService>) -> Result<(), BindError> {
        // The companion service refuses a device service that does not answer
        let version = service
            .version()
            .map_err(|e| BindError::Rejected(e.to_string()))?;
        self.bound.store(true, Ordering::SeqCst);
        info!(version = %version, "Limited service bound");
        Ok(())
    }

    fn unbind(&self) {
        if self.bound.swap(false, Ordering::SeqCst) {
            info!("Limited service unbound");
        }
    }
}

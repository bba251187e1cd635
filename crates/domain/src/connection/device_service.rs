use std::sync::Arc;

use crate::error::RemoteError;
use crate::printer::VectorPrinter;

/// The remote device service reached through the platform binding.
///
/// Every method is one remote transaction and may fail with a [`RemoteError`].
pub trait DeviceService: Send + Sync {
    /// Version string reported by the remote service
    fn version(&self) -> Result<String, RemoteError>;

    /// Toggle the service's common and master-control logs
    fn debug_log(&self, enabled: bool) -> Result<(), RemoteError>;

    /// Register this client with the service
    fn register(&self, use_epay_module: bool) -> Result<(), RemoteError>;

    fn unregister(&self) -> Result<(), RemoteError>;

    /// Printer sub-interface; only valid while the service handle is
    fn vector_printer(&self) -> Result<Arc<dyn VectorPrinter>, RemoteError>;
}

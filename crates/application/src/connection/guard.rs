//! Uniform failure handling for single remote invocations.

use domain::{DeviceService, RemoteError, ServiceError};
use tracing::warn;

/// Maps a remote failure onto the local error taxonomy
pub fn classify(error: RemoteError) -> ServiceError {
    match error {
        RemoteError::DeadObject => ServiceError::ProcessDead,
        RemoteError::Remote(message) | RemoteError::Security(message) => {
            ServiceError::TransportFailure(message)
        }
    }
}

/// Runs `operation` against a live service handle and classifies its failure.
///
/// Holds no state: invalidating the handle on [`ServiceError::ProcessDead`] is
/// left to the owner of the handle.
pub fn invoke<T, F>(service: &dyn DeviceService, operation: F) -> Result<T, ServiceError>
where
    F: FnOnce(&dyn DeviceService) -> Result<T, RemoteError>,
{
    operation(service).map_err(|e| {
        warn!(error = %e, "Remote call failed");
        classify(e)
    })
}

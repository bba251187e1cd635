use thiserror::Error;

/// Errors surfaced to callers of the connection supervisor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// No live handle; a bind was triggered as a side effect
    #[error("Service unbound, please retry later")]
    NotConnected,

    #[error("Service bind failed {attempts} times, giving up")]
    BindRetryExhausted { attempts: u32 },

    /// The remote process died mid-call; the handle was invalidated
    #[error("Service process has stopped, please retry later")]
    ProcessDead,

    #[error("Remote call failed: {0}")]
    TransportFailure(String),
}

/// Failures a single remote invocation can report
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The process hosting the remote object is gone
    #[error("Remote object is dead")]
    DeadObject,

    #[error("Remote exception: {0}")]
    Remote(String),

    #[error("Permission denied: {0}")]
    Security(String),
}

/// Synchronous failure to even issue a bind request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Bind rejected: {0}")]
    Rejected(String),
}

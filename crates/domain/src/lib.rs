//! Domain layer - Pure connection and printer model with no runtime dependencies
//!
//! This crate contains:
//! - The connection state machine (ConnectionState)
//! - Ports the platform must provide (ServiceBinder, DependentServiceBinder)
//! - The remote service contracts (DeviceService, VectorPrinter)
//! - The error taxonomy shared by every layer
//!
//! Principles:
//! - No dependencies on infrastructure or on an async runtime
//! - Remote calls are synchronous, like binder transactions
//! - Testable in isolation

pub mod connection;
pub mod error;
pub mod printer;

// Re-export commonly used types
pub use connection::{
    ConnectionState, DependentServiceBinder, DeviceService, ReadyListener, ServiceBinder,
    ServiceEndpoint, ServiceEvent, SupervisorConfig,
};
pub use error::{BindError, RemoteError, ServiceError};
pub use printer::{PrintFormat, PrintListener, PrintOutcome, PrinterError, VectorPrinter};

//! Infrastructure layer - Platform adapters and configuration

pub mod config;
pub mod platform;
pub mod printer;

pub use platform::{LimitedServiceBinder, SimulatedDeviceService, SimulatedPlatform, SimulatorConfig};
pub use printer::RecordingPrinter;

mod limited;
mod simulated;

pub use limited::LimitedServiceBinder;
pub use simulated::{SimulatedDeviceService, SimulatedPlatform, SimulatorConfig};

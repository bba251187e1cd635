//! Application layer - Connection supervision and the printer command facade

pub mod connection;
pub mod printer;

pub use connection::ConnectionSupervisor;
pub use printer::{PrinterService, PrinterSettings};

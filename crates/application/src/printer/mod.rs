mod service;

pub use service::{PrinterService, PrinterSettings};

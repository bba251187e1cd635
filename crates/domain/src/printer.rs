use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{RemoteError, ServiceError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PrinterError {
    #[error("Printer not registered, call register() first")]
    NotRegistered,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Job-wide format applied when the printer is initialized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrintFormat {
    pub letter_spacing: f32,
    pub auto_cut_paper: bool,
}

impl Default for PrintFormat {
    fn default() -> Self {
        Self {
            letter_spacing: 0.0,
            auto_cut_paper: true,
        }
    }
}

/// How a print job ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintOutcome {
    Finished,
    Failed { code: i32, message: String },
}

/// Progress callbacks of a running print job
pub trait PrintListener: Send + Sync {
    fn on_start(&self);
    fn on_finish(&self);
    fn on_error(&self, code: i32, message: &str);
}

/// Remote printer sub-interface of the device service
pub trait VectorPrinter: Send + Sync {
    fn init(&self, format: &PrintFormat) -> Result<(), RemoteError>;

    fn add_text(&self, text: &str) -> Result<(), RemoteError>;

    /// Advance the paper by a number of pixels
    fn feed_pix(&self, pixels: u32) -> Result<(), RemoteError>;

    /// Add an already encoded image (decoding happens on the remote side)
    fn add_image(&self, encoded: &[u8]) -> Result<(), RemoteError>;

    fn start_print(&self, listener: Arc<dyn PrintListener>) -> Result<(), RemoteError>;
}

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use domain::{PrintFormat, PrintListener, RemoteError, VectorPrinter};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Job-level error codes reported through `PrintListener::on_error`
pub const ERROR_NO_CONTENT: i32 = -1;
pub const ERROR_SPOOL: i32 = -2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PrintCommand {
    Text { text: String },
    Feed { pixels: u32 },
    Image { bytes: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintedJob {
    pub printed_at: DateTime<Utc>,
    pub format: PrintFormat,
    pub commands: Vec<PrintCommand>,
}

impl PrintedJob {
    /// Text lines of the job in print order
    pub fn lines(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                PrintCommand::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Printer that buffers commands and keeps every finished job
pub struct RecordingPrinter {
    alive: Arc<AtomicBool>,
    format: Mutex<PrintFormat>,
    pending: Mutex<Vec<PrintCommand>>,
    jobs: Mutex<Vec<PrintedJob>>,
    spool: Option<PathBuf>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingPrinter {
    /// `alive` is shared with the hosting service process
    pub fn new(alive: Arc<AtomicBool>, spool_path: Option<&str>) -> Self {
        Self {
            alive,
            format: Mutex::new(PrintFormat::default()),
            pending: Mutex::new(Vec::new()),
            jobs: Mutex::new(Vec::new()),
            spool: spool_path.map(PathBuf::from),
        }
    }

    pub fn printed_jobs(&self) -> Vec<PrintedJob> {
        lock(&self.jobs).clone()
    }

    pub fn pending_commands(&self) -> Vec<PrintCommand> {
        lock(&self.pending).clone()
    }

    fn ensure_alive(&self) -> Result<(), RemoteError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::DeadObject)
        }
    }

    fn push(&self, command: PrintCommand) -> Result<(), RemoteError> {
        self.ensure_alive()?;
        lock(&self.pending).push(command);
        Ok(())
    }

    fn append_to_spool(&self, job: &PrintedJob) -> Result<()> {
        let Some(path) = &self.spool else {
            return Ok(());
        };

        // Open, write, close per job so the spool can live on a network share
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open spool file {:?}", path))?;
        let line = serde_json::to_string(job)?;
        writeln!(file, "{}", line).context("Failed to write spool file")?;
        file.flush().context("Failed to flush spool file")?;
        Ok(())
    }
}

impl VectorPrinter for RecordingPrinter {
    fn init(&self, format: &PrintFormat) -> Result<(), RemoteError> {
        self.ensure_alive()?;
        *lock(&self.format) = *format;
        lock(&self.pending).clear();
        Ok(())
    }

    fn add_text(&self, text: &str) -> Result<(), RemoteError> {
        self.push(PrintCommand::Text {
            text: text.to_string(),
        })
    }

    fn feed_pix(&self, pixels: u32) -> Result<(), RemoteError> {
        self.push(PrintCommand::Feed { pixels })
    }

    fn add_image(&self, encoded: &[u8]) -> Result<(), RemoteError> {
        if encoded.is_empty() {
            return Err(RemoteError::Remote("empty image".to_string()));
        }
        self.push(PrintCommand::Image {
            bytes: encoded.len(),
        })
    }

    fn start_print(&self, listener: Arc<dyn PrintListener>) -> Result<(), RemoteError> {
        self.ensure_alive()?;
        let commands = std::mem::take(&mut *lock(&self.pending));

        listener.on_start();
        if commands.is_empty() {
            listener.on_error(ERROR_NO_CONTENT, "no content to print");
            return Ok(());
        }

        let job = PrintedJob {
            printed_at: Utc::now(),
            format: *lock(&self.format),
            commands,
        };

        if let Err(e) = self.append_to_spool(&job) {
            error!("Failed to spool print job: {:#}", e);
            listener.on_error(ERROR_SPOOL, &e.to_string());
            return Ok(());
        }

        info!(commands = job.commands.len(), "Print job completed");
        lock(&self.jobs).push(job);
        listener.on_finish();
        Ok(())
    }
}

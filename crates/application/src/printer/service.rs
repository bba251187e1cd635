use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::{PrintFormat, PrintListener, PrintOutcome, PrinterError, VectorPrinter};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionSupervisor;

/// Paper advance that follows every text line or image
pub const LINE_FEED_PIXELS: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct PrinterSettings {
    pub format: PrintFormat,
    pub line_feed_pixels: u32,
    pub use_epay_module: bool,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            format: PrintFormat::default(),
            line_feed_pixels: LINE_FEED_PIXELS,
            use_epay_module: true,
        }
    }
}

/// Printer commands on top of the supervised device service connection.
///
/// Every remote call goes through [`ConnectionSupervisor::guarded_call`], so a
/// printer handle left over from a previous connection fails fast instead of
/// reaching a dead process.
pub struct PrinterService {
    supervisor: ConnectionSupervisor,
    settings: PrinterSettings,
    printer: Mutex<Option<Arc<dyn VectorPrinter>>>,
}

impl PrinterService {
    pub fn new(supervisor: ConnectionSupervisor, settings: PrinterSettings) -> Self {
        if let Err(e) = supervisor.connect() {
            error!(error = %e, "Initial device service bind failed");
        }

        Self {
            supervisor,
            settings,
            printer: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &PrinterSettings {
        &self.settings
    }

    pub fn is_registered(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn VectorPrinter>>> {
        self.printer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn printer(&self) -> Result<Arc<dyn VectorPrinter>, PrinterError> {
        self.slot().clone().ok_or(PrinterError::NotRegistered)
    }

    /// Register with the device service and initialize the printer
    pub fn register(&self) -> Result<(), PrinterError> {
        self.supervisor.register(self.settings.use_epay_module)?;

        let printer = self.supervisor.vector_printer()?;
        let format = self.settings.format;
        self.supervisor.guarded_call(|_| printer.init(&format))?;

        *self.slot() = Some(printer);
        info!(
            letter_spacing = format.letter_spacing,
            auto_cut_paper = format.auto_cut_paper,
            "🖨️ Printer registered"
        );
        Ok(())
    }

    pub fn unregister(&self) -> Result<(), PrinterError> {
        let result = self.supervisor.unregister();
        *self.slot() = None;
        result?;
        info!("🖨️ Printer unregistered");
        Ok(())
    }

    /// Print a line of text followed by a line feed
    pub fn add_text(&self, text: &str) -> Result<(), PrinterError> {
        let printer = self.printer()?;
        let feed = self.settings.line_feed_pixels;
        self.supervisor.guarded_call(|_| printer.add_text(text))?;
        self.supervisor.guarded_call(|_| printer.feed_pix(feed))?;
        Ok(())
    }

    /// Like [`add_text`](Self::add_text) for raw bytes; invalid UTF-8 is replaced
    pub fn add_text_bytes(&self, text: &[u8]) -> Result<(), PrinterError> {
        self.add_text(&String::from_utf8_lossy(text))
    }

    pub fn add_new_line(&self, count: u32) -> Result<(), PrinterError> {
        let printer = self.printer()?;
        let pixels = self.settings.line_feed_pixels.saturating_mul(count);
        self.supervisor.guarded_call(|_| printer.feed_pix(pixels))?;
        Ok(())
    }

    /// Print an encoded image (PNG, BMP...) followed by a line feed
    pub fn add_image(&self, encoded: &[u8]) -> Result<(), PrinterError> {
        let printer = self.printer()?;
        let feed = self.settings.line_feed_pixels;
        self.supervisor.guarded_call(|_| printer.add_image(encoded))?;
        self.supervisor.guarded_call(|_| printer.feed_pix(feed))?;
        Ok(())
    }

    /// Start printing the buffered content.
    ///
    /// The returned receiver resolves once the printer reports the job
    /// finished or failed.
    pub fn start_print(&self) -> Result<oneshot::Receiver<PrintOutcome>, PrinterError> {
        let printer = self.printer()?;
        let (tx, rx) = oneshot::channel();
        let listener: Arc<dyn PrintListener> = Arc::new(JobListener::new(tx));
        self.supervisor
            .guarded_call(|_| printer.start_print(listener))?;
        Ok(rx)
    }
}

/// Logs job progress and reports the outcome once
struct JobListener {
    outcome: Mutex<Option<oneshot::Sender<PrintOutcome>>>,
}

impl JobListener {
    fn new(tx: oneshot::Sender<PrintOutcome>) -> Self {
        Self {
            outcome: Mutex::new(Some(tx)),
        }
    }

    fn complete(&self, outcome: PrintOutcome) {
        let sender = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!("Print outcome dropped, nobody is waiting");
                }
            }
            None => warn!("Print job reported more than one outcome"),
        }
    }
}

impl PrintListener for JobListener {
    fn on_start(&self) {
        info!("🖨️ Print job started");
    }

    fn on_finish(&self) {
        info!("✅ Print job finished");
        self.complete(PrintOutcome::Finished);
    }

    fn on_error(&self, code: i32, message: &str) {
        error!(code, "❌ Print job failed: {}", message);
        self.complete(PrintOutcome::Failed {
            code,
            message: message.to_string(),
        });
    }
}

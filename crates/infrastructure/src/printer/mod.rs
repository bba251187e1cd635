mod recording_printer;

pub use recording_printer::{PrintCommand, PrintedJob, RecordingPrinter};

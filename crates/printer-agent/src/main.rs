use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use application::{ConnectionSupervisor, PrinterService, PrinterSettings};
use domain::PrintOutcome;
use infrastructure::config::BrokerConfig;
use infrastructure::{LimitedServiceBinder, SimulatedPlatform};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config directory
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Text line to print (repeat for several lines)
    #[arg(long = "line")]
    lines: Vec<String>,

    /// Encoded image file printed after the text
    #[arg(long)]
    image: Option<PathBuf>,

    /// Turn on the device service debug log
    #[arg(long)]
    debug_log: bool,

    /// Override the number of simulated bind failures
    #[arg(long)]
    bind_failures: Option<u32>,

    /// Seconds to wait for the device service to become ready
    #[arg(long, default_value_t = 30)]
    ready_timeout_secs: u64,
}

async fn run() -> Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,printer_agent=debug,application=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🖨️ Printer Agent Starting...");
    info!("🆔 Process ID: {}", std::process::id());

    let args = Args::parse();

    // Fall back to the crate's own config when run from the workspace root
    let dev_config = "crates/printer-agent/config";
    let config_dir = if !std::path::Path::new(&args.config_dir).exists()
        && std::path::Path::new(dev_config).exists()
    {
        dev_config.to_string()
    } else {
        args.config_dir.clone()
    };
    info!("📂 Config directory: {}", config_dir);

    // 1. Load Configuration
    let mut config = BrokerConfig::load(&config_dir)?;
    if let Some(failures) = args.bind_failures {
        config.simulator.bind_failures = failures;
    }
    info!(endpoint = %config.service.supervisor_config().endpoint, "✅ Configuration loaded");

    // 2. Platform + connection supervisor
    let (platform, events) = SimulatedPlatform::new(config.simulator.clone());
    let supervisor = ConnectionSupervisor::new(
        config.service.supervisor_config(),
        platform.clone(),
        Arc::new(LimitedServiceBinder::new()),
    );

    let cancel = CancellationToken::new();
    let supervisor_handle = tokio::spawn(supervisor.clone().run(events, cancel.clone()));

    let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
    supervisor.register_listener(move |version: &str| {
        let _ = ready_tx.send(version.to_string());
    });

    // 3. Printer facade (starts binding)
    let settings = PrinterSettings {
        format: config.printer.print_format(),
        line_feed_pixels: config.printer.line_feed_pixels,
        use_epay_module: config.printer.use_epay_module,
    };
    let printer = PrinterService::new(supervisor.clone(), settings);

    let version = tokio::time::timeout(
        Duration::from_secs(args.ready_timeout_secs),
        ready_rx.recv(),
    )
    .await
    .context("Timed out waiting for the device service")?
    .context("Ready listener dropped")?;
    info!(version = %version, "✅ Device service ready");

    // 4. Print
    supervisor.debug_log(args.debug_log)?;
    printer.register()?;

    let lines = if args.lines.is_empty() {
        vec!["EL SISTEMAS".to_string(), "Printer test".to_string()]
    } else {
        args.lines.clone()
    };
    for line in &lines {
        printer.add_text(line)?;
    }
    printer.add_text(&Local::now().format("%Y-%m-%d %H:%M:%S").to_string())?;

    if let Some(path) = &args.image {
        let encoded =
            std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
        printer.add_image(&encoded)?;
    }
    printer.add_new_line(2)?;

    match printer.start_print()?.await {
        Ok(PrintOutcome::Finished) => info!(lines = lines.len(), "✅ Ticket printed"),
        Ok(PrintOutcome::Failed { code, message }) => {
            warn!(code, "⚠️ Ticket not printed: {}", message)
        }
        Err(_) => warn!("⚠️ Printer never reported an outcome"),
    }

    // 5. Shutdown
    if let Err(e) = printer.unregister() {
        warn!(error = %e, "Unregister failed");
    }
    cancel.cancel();
    let _ = supervisor_handle.await;

    info!("👋 Good bye!");
    Ok(())
}

fn main() {
    let result = tokio::runtime::Runtime::new()
        .context("Failed to start Tokio runtime")
        .and_then(|rt| rt.block_on(run()));

    if let Err(e) = result {
        eprintln!("\n❌ CRITICAL ERROR: {:?}", e);
        std::process::exit(1);
    }
}

use acqsource::core::HostGraph;
use acqsource::hal::{DriverRegistry, NamingScheme};
use acqsource::source::{EnablementState, SourceAdapter, SourceSettings};
use acqsource::AdapterConfig;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run a simulated acquisition source through the block-processing path
#[derive(Debug, Parser)]
#[command(name = "acqsource", version)]
struct Args {
    /// Backend name ("Custom FPGA", "Rhythm FPGA", "eCube")
    #[arg(long, default_value = "Rhythm FPGA")]
    source: String,

    /// Adapter config JSON; overrides --source when given
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of processing ticks to run
    #[arg(long, default_value_t = 200)]
    blocks: usize,

    /// Samples requested per tick
    #[arg(long, default_value_t = 1024)]
    block_size: usize,

    /// Apply a default naming scheme (0, 1 or 2) before acquiring
    #[arg(long)]
    naming_scheme: Option<i32>,

    /// Load channel settings from this file before acquiring and save
    /// them back afterwards
    #[arg(long)]
    settings: Option<PathBuf>,
}

struct LoggingHost;

impl HostGraph for LoggingHost {
    fn show_editor(&self, state: EnablementState) {
        info!("Editor now {}", state.as_str());
    }

    fn request_ui_refresh(&self) {
        info!("Editor refresh requested");
    }

    fn disable_callbacks(&self) {
        info!("UI callbacks disabled");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match args.config.as_ref() {
        Some(path) => AdapterConfig::load(path)?,
        None => AdapterConfig {
            poll_interval_ms: 250,
            ..AdapterConfig::for_source(args.source.clone())
        },
    };

    let drivers = DriverRegistry::with_simulated_backends();
    let mut adapter = SourceAdapter::new(config, &drivers, Arc::new(LoggingHost));
    let control = adapter.control();

    info!(
        "Source: {:?}, {} channels at {} Hz, {} event lines",
        control.backend(),
        control.default_num_outputs(),
        control.sample_rate(),
        control.num_event_channels()
    );

    if let Some(path) = args.settings.as_ref().filter(|p| p.exists()) {
        let settings = SourceSettings::load_from_file(path)?;
        control.load_settings(&settings);
        info!("Loaded channel settings from {:?}", path);
    }

    if let Some(code) = args.naming_scheme {
        let scheme = NamingScheme::from_code(code)
            .with_context(|| format!("Unknown naming scheme {}", code))?;
        control.set_default_naming_scheme(scheme);
    }

    let Some(poller) = control.spawn_poller() else {
        info!("No driver for this source; nothing to acquire");
        let output = adapter.process(args.block_size);
        info!("Block returned {} samples", output.sample_count);
        return Ok(());
    };

    let mut waited = Duration::ZERO;
    while !control.is_enabled() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    if !control.is_enabled() {
        info!("Input source never appeared");
        poller.shutdown().await;
        return Ok(());
    }

    control.enable();

    let blocks = args.blocks;
    let block_size = args.block_size;
    let processing = std::thread::Builder::new()
        .name("block-tick".to_string())
        .spawn(move || {
            let mut samples = 0usize;
            let mut edges = 0usize;
            for _ in 0..blocks {
                let output = adapter.process(block_size);
                samples += output.sample_count;
                edges += output.events.len().saturating_sub(1);
                std::thread::sleep(Duration::from_millis(10));
            }
            (samples, edges)
        })
        .context("Failed to spawn processing thread")?;

    let (samples, edges) = tokio::task::spawn_blocking(move || processing.join())
        .await?
        .map_err(|_| anyhow::anyhow!("Processing thread panicked"))?;

    control.disable();
    info!("Processed {} samples, {} digital edges", samples, edges);
    info!("Metrics: {:?}", control.metrics());

    if let Some(path) = args.settings.as_ref() {
        control.save_settings().save_to_file(path)?;
        info!("Saved channel settings to {:?}", path);
    }

    poller.shutdown().await;
    control.shutdown()?;
    Ok(())
}

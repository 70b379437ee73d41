mod audio;
mod config;
mod error;
mod hazard;
mod panic_monitor;
mod processing;
mod stems;

use anyhow::Context;
use audio::{AlsaCapabilities, AlsaDuplex, AudioStreamDriver, DriverEvent};
use config::Config;
use hazard::HazardEffect;
use panic_monitor::MarkerFileMonitor;
use processing::ProcessingCore;
use stems::StemsConfig;
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    let config = Config::new().context("Failed to load build-time config")?;
    log::info!("{} v{} starting", config.app_name, config.app_version);

    // Startup probes, each run exactly once and frozen for the stream
    let channels = audio::negotiator::negotiate(&AlsaCapabilities::new(config.playback_device));
    let core = ProcessingCore::new(
        Box::new(MarkerFileMonitor::new(config.panic_marker_path)),
        HazardEffect::new(audio::SAMPLE_RATE),
        stems::probe(&StemsConfig::from(&config)),
        channels,
    );
    let backend_name = if core.stems_available() { "NPU" } else { "Passthrough" };

    let (tx_driver_event, mut rx_driver_event) = mpsc::channel::<DriverEvent>(4);
    let capture_device = config.capture_device;
    let playback_device = config.playback_device;
    let mut driver = AudioStreamDriver::start(
        move || {
            AlsaDuplex::open(
                capture_device,
                playback_device,
                audio::SAMPLE_RATE,
                channels.input_channels,
                channels.output_channels,
                audio::BLOCK_SIZE,
            )
        },
        core,
        tx_driver_event,
    )?;

    log::info!(
        "Prism engine active ({}), watching {}",
        backend_name,
        config.panic_marker_path
    );

    let outcome = tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
        event = rx_driver_event.recv() => match event {
            Some(DriverEvent::Failed(e)) => Err(anyhow::Error::new(e).context("Audio stream terminated")),
            Some(DriverEvent::Stopped { blocks }) => {
                log::info!("Audio stream ended after {} blocks", blocks);
                Ok(())
            }
            None => Ok(()),
        },
    };

    if driver.is_running() {
        log::info!("Stopping audio stream...");
    }
    // Blocking join off the async workers
    tokio::task::spawn_blocking(move || driver.stop()).await?;
    outcome
}

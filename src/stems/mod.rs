//! Stem separation backend.
//!
//! The neural separation model runs in a companion inference process next to
//! the accelerator; this module only owns the contract toward it. Backend
//! availability is probed once at startup and never re-checked.

mod udp_bridge;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioBlock, BLOCK_SIZE, INPUT_CHANNELS, SAMPLE_RATE};
use crate::config::Config;
use crate::error::PrismError;

pub use udp_bridge::UdpStemBridge;

/// Number of stems produced per input block.
pub const STEM_CHANNELS: usize = 8;

/// Splits a stereo block into `STEM_CHANNELS` stems.
///
/// Called from the realtime loop; must return well within the block period.
pub trait StemSeparator: Send {
    fn separate(&mut self, input: &AudioBlock, output: &mut AudioBlock) -> Result<(), PrismError>;
}

/// Startup probe result, held immutably for the stream's lifetime.
pub enum StemBackend {
    Real(Box<dyn StemSeparator>),
    Unavailable(String),
}

impl StemBackend {
    pub fn is_available(&self) -> bool {
        matches!(self, StemBackend::Real(_))
    }
}

impl std::fmt::Debug for StemBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StemBackend::Real(_) => f.write_str("Real"),
            StemBackend::Unavailable(reason) => write!(f, "Unavailable({})", reason),
        }
    }
}

/// Settings for reaching the inference process.
#[derive(Debug, Clone)]
pub struct StemsConfig {
    pub enabled: bool,
    pub model_path: PathBuf,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub handshake_timeout: Duration,
    pub block_timeout: Duration,
}

impl From<&Config> for StemsConfig {
    fn from(config: &Config) -> Self {
        Self {
            enabled: config.stems_enabled,
            model_path: PathBuf::from(config.stems_model_path),
            local_addr: SocketAddr::from(([127, 0, 0, 1], config.stems_local_port)),
            remote_addr: SocketAddr::from(([127, 0, 0, 1], config.stems_remote_port)),
            handshake_timeout: Duration::from_millis(config.stems_handshake_timeout_ms),
            block_timeout: Duration::from_millis(config.stems_block_timeout_ms),
        }
    }
}

/// Decide once whether stem separation can run for this stream.
pub fn probe(config: &StemsConfig) -> StemBackend {
    match try_open(config) {
        Ok(bridge) => {
            log::info!(
                "Stem backend ready: model={}, bridge={}",
                config.model_path.display(),
                config.remote_addr
            );
            StemBackend::Real(Box::new(bridge))
        }
        Err(e) => {
            log::warn!("{}; stem separation disabled for this run", e);
            StemBackend::Unavailable(e.to_string())
        }
    }
}

fn try_open(config: &StemsConfig) -> Result<UdpStemBridge, PrismError> {
    if !config.enabled {
        return Err(PrismError::BackendUnavailable("disabled in config".into()));
    }
    if !config.model_path.exists() {
        return Err(PrismError::BackendUnavailable(format!(
            "model {} not found",
            config.model_path.display()
        )));
    }
    let mut bridge = UdpStemBridge::connect(config.local_addr, config.remote_addr, config.block_timeout)
        .map_err(|e| PrismError::BackendUnavailable(format!("bridge socket: {}", e)))?;
    bridge.handshake(
        &config.model_path.to_string_lossy(),
        BLOCK_SIZE,
        INPUT_CHANNELS,
        STEM_CHANNELS,
        SAMPLE_RATE,
        config.handshake_timeout,
    )?;
    Ok(bridge)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model_path: PathBuf, remote_addr: SocketAddr) -> StemsConfig {
        StemsConfig {
            enabled: true,
            model_path,
            local_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            remote_addr,
            handshake_timeout: Duration::from_millis(100),
            block_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn disabled_backend_is_unavailable() {
        let mut cfg = config(PathBuf::from("/nonexistent"), SocketAddr::from(([127, 0, 0, 1], 9)));
        cfg.enabled = false;
        let backend = probe(&cfg);
        assert!(!backend.is_available());
    }

    #[test]
    fn missing_model_is_unavailable() {
        let cfg = config(
            PathBuf::from("/nonexistent/model.hef"),
            SocketAddr::from(([127, 0, 0, 1], 9)),
        );
        match probe(&cfg) {
            StemBackend::Unavailable(reason) => assert!(reason.contains("not found")),
            StemBackend::Real(_) => panic!("expected unavailable backend"),
        }
    }

    #[test]
    fn silent_bridge_is_unavailable() {
        let model = tempfile::NamedTempFile::new().expect("model");
        // Bound but never answering
        let peer = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind");
        let cfg = config(model.path().to_path_buf(), peer.local_addr().expect("addr"));
        assert!(!probe(&cfg).is_available());
    }

    #[test]
    fn answering_bridge_is_available() {
        let model = tempfile::NamedTempFile::new().expect("model");
        let server = udp_bridge::tests::FakeInference::spawn(udp_bridge::tests::Behavior::Echo);
        let cfg = config(model.path().to_path_buf(), server.addr);
        assert!(probe(&cfg).is_available());
    }
}

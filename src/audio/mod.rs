//! audio - Block type, ALSA device plumbing and the realtime stream driver.
//!
//! The stream is opened with fixed parameters; only the output channel count
//! is negotiated with the hardware at startup.

mod alsa_device;
mod block;
pub mod driver;
pub mod negotiator;

pub use alsa_device::AlsaDuplex;
pub use block::AudioBlock;
pub use driver::{AudioStreamDriver, DriverEvent};
pub use negotiator::{AlsaCapabilities, ChannelConfig};

pub const SAMPLE_RATE: u32 = 44_100;
/// Frames per block (one ALSA period).
pub const BLOCK_SIZE: usize = 1024;
pub const INPUT_CHANNELS: usize = 2;
pub const DESIRED_OUTPUT_CHANNELS: u32 = 8;

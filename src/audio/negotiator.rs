//! Output channel negotiation, run once before the stream opens.

use alsa::pcm::{HwParams, PCM};
use alsa::Direction;

use super::{DESIRED_OUTPUT_CHANNELS, INPUT_CHANNELS};
use crate::error::PrismError;

/// Fallback when the device cannot be queried.
const FALLBACK_OUTPUT_CHANNELS: usize = 2;

/// Channel layout frozen for the lifetime of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub input_channels: usize,
    pub output_channels: usize,
}

impl ChannelConfig {
    pub fn with_outputs(output_channels: usize) -> Self {
        Self {
            input_channels: INPUT_CHANNELS,
            output_channels,
        }
    }
}

/// Capability query against the output device.
pub trait OutputCapabilities {
    fn max_output_channels(&self) -> Result<u32, PrismError>;
}

/// Queries an ALSA playback device for its channel range.
#[derive(Debug, Clone)]
pub struct AlsaCapabilities {
    device: String,
}

impl AlsaCapabilities {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
        }
    }
}

impl OutputCapabilities for AlsaCapabilities {
    fn max_output_channels(&self) -> Result<u32, PrismError> {
        let query = |what: &str, e: alsa::Error| {
            PrismError::DeviceQuery(format!("{} on '{}': {}", what, self.device, e))
        };
        // Non-blocking open so a busy device fails fast instead of stalling startup
        let pcm = PCM::new(&self.device, Direction::Playback, true)
            .map_err(|e| query("open", e))?;
        let hwp = HwParams::any(&pcm).map_err(|e| query("HwParams", e))?;
        hwp.get_channels_max().map_err(|e| query("get_channels_max", e))
    }
}

/// `min(8, device max)`, or 2 when the device cannot be queried.
pub fn negotiate(caps: &dyn OutputCapabilities) -> ChannelConfig {
    let output_channels = match caps.max_output_channels() {
        Ok(max) => max.clamp(1, DESIRED_OUTPUT_CHANNELS) as usize,
        Err(e) => {
            log::warn!("{}; defaulting to {} output channels", e, FALLBACK_OUTPUT_CHANNELS);
            FALLBACK_OUTPUT_CHANNELS
        }
    };
    log::info!("Output configuration: {} channels", output_channels);
    ChannelConfig::with_outputs(output_channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCaps(Result<u32, ()>);

    impl OutputCapabilities for FixedCaps {
        fn max_output_channels(&self) -> Result<u32, PrismError> {
            self.0
                .map_err(|_| PrismError::DeviceQuery("no such device".into()))
        }
    }

    #[test]
    fn caps_at_eight_channels() {
        assert_eq!(negotiate(&FixedCaps(Ok(32))).output_channels, 8);
        assert_eq!(negotiate(&FixedCaps(Ok(8))).output_channels, 8);
    }

    #[test]
    fn uses_smaller_device_maximum() {
        let config = negotiate(&FixedCaps(Ok(6)));
        assert_eq!(config.output_channels, 6);
        assert_eq!(config.input_channels, 2);
        assert_eq!(negotiate(&FixedCaps(Ok(1))).output_channels, 1);
    }

    #[test]
    fn zero_channel_report_is_raised_to_one() {
        assert_eq!(negotiate(&FixedCaps(Ok(0))).output_channels, 1);
    }

    #[test]
    fn failed_query_defaults_to_stereo() {
        assert_eq!(negotiate(&FixedCaps(Err(()))).output_channels, 2);
    }
}

//! ALSA PCM wrappers for the duplex capture/playback pair.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

use super::driver::DuplexIo;
use super::AudioBlock;
use crate::error::PrismError;

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Period size in frames (one frame = channels × sample_width)
    pub period_size: usize,
}

/// Capture and playback PCMs driven in lockstep, one block at a time.
pub struct AlsaDuplex {
    capture: PCM,
    playback: PCM,
    input_channels: usize,
    output_channels: usize,
    frames: usize,
    read_buf: Vec<i16>,
    write_buf: Vec<i16>,
}

impl AlsaDuplex {
    /// Open both directions with exact parameters. A device that cannot
    /// honour the rate or channel count is refused rather than resampled here.
    pub fn open(
        capture_device: &str,
        playback_device: &str,
        sample_rate: u32,
        input_channels: usize,
        output_channels: usize,
        frames: usize,
    ) -> Result<Self> {
        let (capture, cap) = open_pcm(
            capture_device,
            Direction::Capture,
            sample_rate,
            input_channels as u32,
            frames,
            "Capture",
        )?;
        let (playback, play) = open_pcm(
            playback_device,
            Direction::Playback,
            sample_rate,
            output_channels as u32,
            frames,
            "Playback",
        )?;

        for (name, params, channels) in [("Capture", &cap, input_channels), ("Playback", &play, output_channels)] {
            if params.sample_rate != sample_rate || params.channels as usize != channels {
                anyhow::bail!(
                    "{} device negotiated {}Hz/{}ch, need {}Hz/{}ch",
                    name,
                    params.sample_rate,
                    params.channels,
                    sample_rate,
                    channels
                );
            }
            if params.period_size != frames {
                log::warn!(
                    "{} period is {} frames, blocks of {} will straddle periods",
                    name,
                    params.period_size,
                    frames
                );
            }
        }

        Ok(Self {
            capture,
            playback,
            input_channels,
            output_channels,
            frames,
            read_buf: vec![0i16; frames * input_channels],
            write_buf: vec![0i16; frames * output_channels],
        })
    }
}

impl DuplexIo for AlsaDuplex {
    fn read_block(&mut self, block: &mut AudioBlock) -> Result<(), PrismError> {
        let ch = self.input_channels;
        let total = self.frames * ch;
        let mut filled = 0;
        while filled < total {
            let io = self.capture.io_i16().map_err(|e| stream_error("capture io", e))?;
            match io.readi(&mut self.read_buf[filled..total]) {
                Ok(frames) => filled += frames * ch,
                Err(e) => recover(&self.capture, e, "capture")?,
            }
        }
        if block.frames() != self.frames || block.channels() != ch {
            *block = AudioBlock::silent(self.frames, ch);
        }
        block.read_i16(&self.read_buf);
        Ok(())
    }

    fn write_block(&mut self, block: &AudioBlock) -> Result<(), PrismError> {
        let ch = self.output_channels;
        if block.channels() != ch || block.frames() != self.frames {
            return Err(PrismError::Stream(format!(
                "output block is {}x{}, stream expects {}x{}",
                block.frames(),
                block.channels(),
                self.frames,
                ch
            )));
        }
        block.write_i16(&mut self.write_buf);

        let total = self.frames * ch;
        let mut written = 0;
        while written < total {
            let io = self.playback.io_i16().map_err(|e| stream_error("playback io", e))?;
            match io.writei(&self.write_buf[written..total]) {
                Ok(frames) => written += frames * ch,
                Err(e) => recover(&self.playback, e, "playback")?,
            }
        }
        Ok(())
    }
}

/// Recover from XRUN/suspend; any other error ends the stream.
fn recover(pcm: &PCM, err: alsa::Error, dir_name: &str) -> Result<(), PrismError> {
    log::warn!("ALSA {} error: {}, recovering...", dir_name, err);
    pcm.try_recover(err, true)
        .map_err(|e| stream_error(dir_name, e))
}

fn stream_error(what: &str, e: alsa::Error) -> PrismError {
    PrismError::Stream(format!("{}: {}", what, e))
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    channels: u32,
    period_size: usize,
    dir_name: &str,
) -> Result<(PCM, AlsaParams)> {
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    // Configure hardware parameters
    {
        let hwp =
            HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::S16LE)?;
        hwp.set_channels(channels)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        hwp.set_period_size_near(period_size as alsa::pcm::Frames, ValueOr::Nearest)?;
        hwp.set_buffer_size_near((period_size * 4) as alsa::pcm::Frames)?;
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, actual_period) = {
        let hwp = pcm.hw_params_current()?;
        let rate = hwp.get_rate()?;
        let ch = hwp.get_channels()?;
        let ps = hwp.get_period_size()? as usize;
        (rate, ch, ps)
    };

    let params = AlsaParams {
        sample_rate: actual_rate,
        channels: actual_channels,
        period_size: actual_period,
    };

    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, period_size={}",
        dir_name,
        device,
        actual_rate,
        actual_channels,
        actual_period,
    );

    Ok((pcm, params))
}

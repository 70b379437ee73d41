//! Per-block mode selection and routing.
//!
//! The mode is re-evaluated from scratch every block: panic wins over
//! everything, stem separation needs both a live backend and a full 8-channel
//! output, and passthrough covers the rest. The only carried state is the
//! hazard effect itself.

use std::fmt;

use crate::audio::{AudioBlock, ChannelConfig};
use crate::error::PrismError;
use crate::hazard::HazardEffect;
use crate::panic_monitor::PanicSource;
use crate::stems::{STEM_CHANNELS, StemBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Hazard,
    StemSeparation,
    Passthrough,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Hazard => "HAZARD",
            Mode::StemSeparation => "STEM_SEPARATION",
            Mode::Passthrough => "PASSTHROUGH",
        };
        f.write_str(name)
    }
}

/// Decision table for one block.
pub fn mode_for(hazard_active: bool, stems_available: bool, output_channels: usize) -> Mode {
    if hazard_active {
        Mode::Hazard
    } else if stems_available && output_channels >= STEM_CHANNELS {
        Mode::StemSeparation
    } else {
        Mode::Passthrough
    }
}

/// Owns every piece of mutable processing state; threaded through the
/// realtime loop by the stream driver.
pub struct ProcessingCore {
    panic: Box<dyn PanicSource>,
    hazard: HazardEffect,
    stems: StemBackend,
    channels: ChannelConfig,
    hazard_buf: AudioBlock,
    stem_buf: AudioBlock,
    // logging only
    last_mode: Option<Mode>,
    stem_failures: u32,
}

impl ProcessingCore {
    pub fn new(
        panic: Box<dyn PanicSource>,
        hazard: HazardEffect,
        stems: StemBackend,
        channels: ChannelConfig,
    ) -> Self {
        log::info!(
            "Processing core ready: {} in / {} out, stems {:?}",
            channels.input_channels,
            channels.output_channels,
            stems
        );
        Self {
            panic,
            hazard,
            stems,
            channels,
            hazard_buf: AudioBlock::silent(0, channels.input_channels),
            stem_buf: AudioBlock::silent(0, STEM_CHANNELS),
            last_mode: None,
            stem_failures: 0,
        }
    }

    pub fn channels(&self) -> ChannelConfig {
        self.channels
    }

    #[cfg(test)]
    pub fn hazard(&self) -> &HazardEffect {
        &self.hazard
    }

    pub fn stems_available(&self) -> bool {
        self.stems.is_available()
    }

    /// Process one block. `output` is reshaped to `input.frames()` x the
    /// negotiated channel count and always fully written. Returns the mode
    /// that produced the block.
    pub fn process_block(&mut self, input: &AudioBlock, output: &mut AudioBlock) -> Mode {
        debug_assert_eq!(input.channels(), self.channels.input_channels);
        let out_ch = self.channels.output_channels;
        if output.frames() != input.frames() || output.channels() != out_ch {
            *output = AudioBlock::silent(input.frames(), out_ch);
        }

        let panic = self.panic.is_panic();
        if panic && !self.hazard.is_active() {
            self.hazard.engage();
        } else if !panic && self.hazard.is_active() {
            self.hazard.disengage();
        }

        let selected = mode_for(self.hazard.is_active(), self.stems.is_available(), out_ch);
        if self.last_mode != Some(selected) {
            log::info!("Processing mode: {}", selected);
            self.last_mode = Some(selected);
        }

        match selected {
            Mode::Hazard => {
                self.route_hazard(input, output);
                Mode::Hazard
            }
            Mode::StemSeparation => match self.route_stems(input, output) {
                Ok(()) => {
                    if self.stem_failures > 0 {
                        log::info!(
                            "Stem separation recovered after {} failed blocks",
                            self.stem_failures
                        );
                        self.stem_failures = 0;
                    }
                    Mode::StemSeparation
                }
                Err(e) => {
                    if self.stem_failures == 0 {
                        log::warn!("{}; falling back to passthrough", e);
                    }
                    self.stem_failures = self.stem_failures.saturating_add(1);
                    route_passthrough(input, output);
                    Mode::Passthrough
                }
            },
            Mode::Passthrough => {
                route_passthrough(input, output);
                Mode::Passthrough
            }
        }
    }

    /// Destroyed stereo copied to every output pair. An odd trailing channel
    /// gets the left channel so mono devices still carry the effect.
    fn route_hazard(&mut self, input: &AudioBlock, output: &mut AudioBlock) {
        self.hazard.process_into(input, &mut self.hazard_buf);
        let out_ch = output.channels();
        for frame in 0..output.frames() {
            let left = self.hazard_buf.sample(frame, 0);
            let right = self.hazard_buf.sample(frame, 1);
            for ch in (0..out_ch).step_by(2) {
                output.set_sample(frame, ch, left);
                if ch + 1 < out_ch {
                    output.set_sample(frame, ch + 1, right);
                }
            }
        }
    }

    fn route_stems(&mut self, input: &AudioBlock, output: &mut AudioBlock) -> Result<(), PrismError> {
        let StemBackend::Real(separator) = &mut self.stems else {
            return Err(PrismError::BackendUnavailable("no separator".into()));
        };
        separator.separate(input, &mut self.stem_buf)?;
        if self.stem_buf.frames() != input.frames() || self.stem_buf.channels() != STEM_CHANNELS {
            return Err(PrismError::Inference(format!(
                "separator returned {}x{}, expected {}x{}",
                self.stem_buf.frames(),
                self.stem_buf.channels(),
                input.frames(),
                STEM_CHANNELS
            )));
        }
        self.stem_buf.clip();

        output.fill(0.0);
        for frame in 0..output.frames() {
            for ch in 0..STEM_CHANNELS.min(output.channels()) {
                output.set_sample(frame, ch, self.stem_buf.sample(frame, ch));
            }
        }
        Ok(())
    }
}

/// Input stereo on outputs 0/1, silence everywhere else.
fn route_passthrough(input: &AudioBlock, output: &mut AudioBlock) {
    output.fill(0.0);
    let copied = input.channels().min(output.channels()).min(2);
    for frame in 0..output.frames() {
        for ch in 0..copied {
            output.set_sample(frame, ch, input.sample(frame, ch).clamp(-1.0, 1.0));
        }
    }
}

//! "Digital shriek" hazard effect.
//!
//! Simulates a failing logic board: the input is bit-crushed, decimated with
//! sample-and-hold, overlaid with a high pitched whine and static, then hard
//! clipped. The whine oscillator phase carries across blocks so consecutive
//! blocks join without clicks.

use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::audio::AudioBlock;

const DEFAULT_BIT_DEPTH: u32 = 4;
const DEFAULT_HOLD_FACTOR: usize = 12;
const DEFAULT_WHINE_HZ: f64 = 8000.0;
const DEFAULT_WHINE_AMPLITUDE: f64 = 0.15;
const DEFAULT_NOISE_STD_DEV: f64 = 0.05;

/// Tuning of the hazard stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HazardSettings {
    /// Effective bit depth; the quantization step is `1 / 2^bit_depth`.
    pub bit_depth: u32,
    /// Number of frames each sampled value is held for.
    pub hold_factor: usize,
    pub whine_hz: f64,
    pub whine_amplitude: f64,
    pub noise_std_dev: f64,
}

impl Default for HazardSettings {
    fn default() -> Self {
        Self {
            bit_depth: DEFAULT_BIT_DEPTH,
            hold_factor: DEFAULT_HOLD_FACTOR,
            whine_hz: DEFAULT_WHINE_HZ,
            whine_amplitude: DEFAULT_WHINE_AMPLITUDE,
            noise_std_dev: DEFAULT_NOISE_STD_DEV,
        }
    }
}

impl HazardSettings {
    fn step(&self) -> f64 {
        1.0 / (1u64 << self.bit_depth) as f64
    }
}

pub struct HazardEffect {
    active: bool,
    intensity: f32,
    phase: f64,
    sample_rate: u32,
    settings: HazardSettings,
    rng: StdRng,
}

impl std::fmt::Debug for HazardEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HazardEffect")
            .field("active", &self.active)
            .field("intensity", &self.intensity)
            .field("phase", &self.phase)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl HazardEffect {
    /// Disengaged effect with default settings and an entropy-seeded noise source.
    pub fn new(sample_rate: u32) -> Self {
        Self::build(sample_rate, HazardSettings::default(), StdRng::from_entropy())
    }

    /// Deterministic construction for reproducible output.
    #[cfg(test)]
    pub fn with_settings(sample_rate: u32, settings: HazardSettings, seed: u64) -> Self {
        Self::build(sample_rate, settings, StdRng::seed_from_u64(seed))
    }

    fn build(sample_rate: u32, settings: HazardSettings, rng: StdRng) -> Self {
        Self {
            active: false,
            intensity: 0.0,
            phase: 0.0,
            sample_rate: sample_rate.max(1),
            settings,
            rng,
        }
    }

    pub fn engage(&mut self) {
        if !self.active {
            log::warn!("Digital shriek engaged");
        }
        self.active = true;
        self.intensity = 1.0;
    }

    pub fn disengage(&mut self) {
        if self.active {
            log::info!("Digital shriek disengaged");
        }
        self.active = false;
        self.intensity = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    #[cfg(test)]
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Whine oscillator phase in `[0, 2π)`.
    #[cfg(test)]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Process a block into a newly allocated output block.
    #[cfg(test)]
    pub fn process(&mut self, input: &AudioBlock) -> AudioBlock {
        let mut output = AudioBlock::silent(input.frames(), input.channels());
        self.process_into(input, &mut output);
        output
    }

    /// Process `input` into `output`, reshaping `output` if needed.
    ///
    /// While disengaged the input is copied through and the phase is left
    /// untouched. While engaged this must be called once per block, in order.
    pub fn process_into(&mut self, input: &AudioBlock, output: &mut AudioBlock) {
        if output.frames() != input.frames() || output.channels() != input.channels() {
            *output = AudioBlock::silent(input.frames(), input.channels());
        }
        if !self.active {
            output.as_mut_slice().copy_from_slice(input.as_slice());
            return;
        }
        if input.is_empty() {
            return;
        }
        let frames = input.frames();

        let step = self.settings.step();
        let hold = self.settings.hold_factor.max(1);
        let omega = TAU * self.settings.whine_hz / self.sample_rate as f64;
        // A zero, negative or non-finite deviation disables the static
        let noise = Normal::new(0.0, self.settings.noise_std_dev)
            .ok()
            .filter(|_| self.settings.noise_std_dev > 0.0);

        for i in 0..frames {
            let held = hold_index(i, frames, hold);
            let whine = self.settings.whine_amplitude * (omega * i as f64 + self.phase).sin();
            for ch in 0..input.channels() {
                let crushed = bit_crush(input.sample(held, ch) as f64, step);
                let hiss = noise.map_or(0.0, |n| n.sample(&mut self.rng));
                let mixed = (crushed + whine + hiss).clamp(-1.0, 1.0);
                output.set_sample(i, ch, mixed as f32);
            }
        }

        self.phase = wrap_phase(self.phase + frames as f64 * omega);
    }
}

/// Snap to the nearest multiple of `step` (ties to even, like numpy's round).
fn bit_crush(sample: f64, step: f64) -> f64 {
    (sample / step).round_ties_even() * step
}

/// Frame index whose value is held at frame `i`.
fn hold_index(i: usize, frames: usize, hold: usize) -> usize {
    ((i / hold) * hold).min(frames - 1)
}

fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(TAU);
    if wrapped >= TAU { 0.0 } else { wrapped }
}

//! Fixed-size interleaved audio block passed through the processing core.

/// Interleaved `f32` frames, one sample per channel per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f32>,
    frames: usize,
    channels: usize,
}

impl AudioBlock {
    /// Block of `frames` x `channels` zeros.
    pub fn silent(frames: usize, channels: usize) -> Self {
        Self {
            samples: vec![0.0; frames * channels],
            frames,
            channels,
        }
    }

    /// Wrap interleaved samples, or `None` if they do not divide evenly
    /// into frames.
    #[cfg(test)]
    pub fn from_interleaved(samples: Vec<f32>, channels: usize) -> Option<Self> {
        if channels == 0 || samples.len() % channels != 0 {
            return None;
        }
        Some(Self {
            frames: samples.len() / channels,
            samples,
            channels,
        })
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.samples[frame * self.channels + channel]
    }

    #[inline]
    pub fn set_sample(&mut self, frame: usize, channel: usize, value: f32) {
        self.samples[frame * self.channels + channel] = value;
    }

    pub fn fill(&mut self, value: f32) {
        self.samples.fill(value);
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Clamp every sample to [-1.0, 1.0]; non-finite values become silence.
    pub fn clip(&mut self) {
        for s in self.samples.iter_mut() {
            *s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
        }
    }

    /// Copy interleaved S16 PCM into this block. `pcm` must hold
    /// `frames * channels` samples.
    pub fn read_i16(&mut self, pcm: &[i16]) {
        for (dst, &src) in self.samples.iter_mut().zip(pcm) {
            *dst = src as f32 / 32768.0;
        }
    }

    /// Write this block as interleaved S16 PCM.
    pub fn write_i16(&self, pcm: &mut [i16]) {
        for (dst, &src) in pcm.iter_mut().zip(&self.samples) {
            *dst = (src.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_interleaved_rejects_partial_frames() {
        assert!(AudioBlock::from_interleaved(vec![0.0; 5], 2).is_none());
        assert!(AudioBlock::from_interleaved(vec![0.0; 4], 0).is_none());
        let block = AudioBlock::from_interleaved(vec![0.0; 6], 2).expect("block");
        assert_eq!(block.frames(), 3);
        assert_eq!(block.channels(), 2);
    }

    #[test]
    fn samples_are_addressed_by_frame_and_channel() {
        let mut block = AudioBlock::silent(4, 3);
        block.set_sample(2, 1, 0.5);
        assert_eq!(block.sample(2, 1), 0.5);
        assert_eq!(block.as_slice()[2 * 3 + 1], 0.5);
    }

    #[test]
    fn clip_bounds_and_sanitizes() {
        let mut block =
            AudioBlock::from_interleaved(vec![1.5, -2.0, 0.25, f32::NAN], 2).expect("block");
        block.clip();
        assert_eq!(block.as_slice(), &[1.0, -1.0, 0.25, 0.0]);
    }

    #[test]
    fn pcm_conversion_stays_in_range() {
        let pcm = [i16::MIN, 0, i16::MAX, 16384];
        let mut block = AudioBlock::silent(2, 2);
        block.read_i16(&pcm);
        assert_eq!(block.sample(0, 0), -1.0);
        assert_eq!(block.sample(1, 1), 0.5);
        assert!(block.as_slice().iter().all(|s| (-1.0..=1.0).contains(s)));

        let mut back = [0i16; 4];
        block.write_i16(&mut back);
        assert_eq!(back[1], 0);
        assert_eq!(back[2], i16::MAX - 1);
    }
}

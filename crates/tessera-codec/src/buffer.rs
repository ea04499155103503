//! Planar multi-channel sample buffers.

use crate::error::{CodecError, Result};

/// A rectangular block of `f32` audio: one sample vector per channel, all of
/// equal length, plus the sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build a buffer from planar channel data.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidConfiguration`] if there are no channels,
    /// the channels differ in length, or the sample rate is zero.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(CodecError::InvalidConfiguration(
                "audio buffer needs at least one channel".into(),
            ));
        }
        if sample_rate == 0 {
            return Err(CodecError::InvalidConfiguration(
                "sample rate must be positive".into(),
            ));
        }
        let len = channels[0].len();
        if let Some((i, ch)) = channels.iter().enumerate().find(|(_, c)| c.len() != len) {
            return Err(CodecError::InvalidConfiguration(format!(
                "channel {i} has {} samples, channel 0 has {len}",
                ch.len()
            )));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Build a mono buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// De-interleave `[L0, R0, L1, R1, …]` samples into a planar buffer.
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(CodecError::InvalidConfiguration(
                "audio buffer needs at least one channel".into(),
            ));
        }
        if samples.len() % channels != 0 {
            return Err(CodecError::InvalidConfiguration(format!(
                "{} interleaved samples do not divide into {channels} channels",
                samples.len()
            )));
        }
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, &s) in planar.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::new(planar, sample_rate)
    }

    /// Interleave the channels into `[L0, R0, L1, R1, …]` order.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len() * self.num_channels());
        for i in 0..self.len() {
            out.extend(self.channels.iter().map(|ch| ch[i]));
        }
        out
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Multiply every sample by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        if gain == 1.0 {
            return;
        }
        for ch in &mut self.channels {
            ch.iter_mut().for_each(|s| *s *= gain);
        }
    }
}

//! Code chunks: the encoded form of a single window.

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};

/// Codes produced by encoding one window.
///
/// Codes are stored flat in `[channel][codebook][frame]` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Real (unpadded) samples the window covered.
    pub true_length: usize,
    /// Number of audio channels.
    pub channels: usize,
    /// Codebooks per code frame.
    pub n_codebooks: usize,
    /// Code frames per codebook.
    pub frames: usize,
    /// Flat code tensor, `channels * n_codebooks * frames` entries.
    pub codes: Vec<u16>,
}

impl CodeChunk {
    /// Build a chunk, checking that `codes` matches the declared shape.
    pub fn new(
        true_length: usize,
        channels: usize,
        n_codebooks: usize,
        frames: usize,
        codes: Vec<u16>,
    ) -> Result<Self> {
        let expected = channels * n_codebooks * frames;
        if codes.len() != expected {
            return Err(FormatError::InvalidConfiguration(format!(
                "code tensor has {} entries, shape [{channels}, {n_codebooks}, {frames}] needs {expected}",
                codes.len()
            )));
        }
        Ok(Self {
            true_length,
            channels,
            n_codebooks,
            frames,
            codes,
        })
    }

    /// Codes of every codebook for one channel, codebook-major.
    pub fn channel(&self, channel: usize) -> &[u16] {
        let stride = self.n_codebooks * self.frames;
        &self.codes[channel * stride..(channel + 1) * stride]
    }

    /// Codes of a single codebook for one channel.
    pub fn codebook(&self, channel: usize, codebook: usize) -> &[u16] {
        let start = (channel * self.n_codebooks + codebook) * self.frames;
        &self.codes[start..start + self.frames]
    }

    /// Keep only the first `n_codebooks` codebooks of every channel.
    pub fn truncate_codebooks(&mut self, n_codebooks: usize) {
        if n_codebooks >= self.n_codebooks {
            return;
        }
        let mut kept = Vec::with_capacity(self.channels * n_codebooks * self.frames);
        for ch in 0..self.channels {
            kept.extend_from_slice(&self.channel(ch)[..n_codebooks * self.frames]);
        }
        self.codes = kept;
        self.n_codebooks = n_codebooks;
    }

    /// Largest code value in the chunk, if any.
    pub fn max_code(&self) -> Option<u16> {
        self.codes.iter().copied().max()
    }
}

//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use tessera_format::PaddingMode;

use crate::error::{CodecError, Result};

/// One second at 44.1 kHz.
pub const DEFAULT_FRAME_LENGTH: usize = 44100;

/// Default loudness target in dBFS.
pub const DEFAULT_TARGET_DB: f32 = -16.0;

/// Knobs for [`crate::Pipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Samples per window handed to the transform (L).
    pub frame_length: usize,
    /// Stride between window starts (H). `None` means `frame_length`, i.e.
    /// no overlap.
    pub hop: Option<usize>,
    /// How the tail of the last window is padded.
    pub padding: PaddingMode,
    /// Loudness target in dBFS, or `None` to encode the input as is.
    pub normalize_db: Option<f32>,
    /// Keep only the first k codebooks of every chunk. `None` keeps all.
    pub n_quantizers: Option<usize>,
    /// Maximum number of concurrent transform calls.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_length: DEFAULT_FRAME_LENGTH,
            hop: None,
            padding: PaddingMode::Zero,
            normalize_db: Some(DEFAULT_TARGET_DB),
            n_quantizers: None,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl PipelineConfig {
    /// Build a configuration from a window duration and an overlap duration,
    /// both in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidConfiguration`] if the window is shorter
    /// than one sample or the overlap is negative or not shorter than the
    /// window.
    pub fn from_durations(window_secs: f64, overlap_secs: f64, sample_rate: u32) -> Result<Self> {
        if !window_secs.is_finite() || !overlap_secs.is_finite() || overlap_secs < 0.0 {
            return Err(CodecError::InvalidConfiguration(format!(
                "invalid durations: window {window_secs}s, overlap {overlap_secs}s"
            )));
        }
        let frame_length = (window_secs * sample_rate as f64).round() as usize;
        let overlap = (overlap_secs * sample_rate as f64).round() as usize;
        if frame_length == 0 {
            return Err(CodecError::InvalidConfiguration(format!(
                "window of {window_secs}s is shorter than one sample at {sample_rate} Hz"
            )));
        }
        if overlap >= frame_length {
            return Err(CodecError::InvalidConfiguration(format!(
                "overlap {overlap_secs}s must be shorter than the window {window_secs}s"
            )));
        }

        let config = Self {
            frame_length,
            hop: Some(frame_length - overlap),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Effective hop.
    pub fn hop(&self) -> usize {
        self.hop.unwrap_or(self.frame_length)
    }

    /// Samples shared by consecutive windows.
    pub fn overlap(&self) -> usize {
        self.frame_length.saturating_sub(self.hop())
    }

    /// # Errors
    ///
    /// Returns [`CodecError::InvalidConfiguration`] describing the first bad
    /// field.
    pub fn validate(&self) -> Result<()> {
        if self.frame_length == 0 {
            return Err(CodecError::InvalidConfiguration(
                "frame length must be greater than zero".into(),
            ));
        }
        if self.frame_length > u32::MAX as usize {
            return Err(CodecError::InvalidConfiguration(format!(
                "frame length {} does not fit the container header",
                self.frame_length
            )));
        }
        let hop = self.hop();
        if hop == 0 || hop > self.frame_length {
            return Err(CodecError::InvalidConfiguration(format!(
                "hop must satisfy 0 < hop <= frame length (hop {hop}, frame length {})",
                self.frame_length
            )));
        }
        if self.n_quantizers == Some(0) {
            return Err(CodecError::InvalidConfiguration(
                "n_quantizers must keep at least one codebook".into(),
            ));
        }
        if self.workers == 0 {
            return Err(CodecError::InvalidConfiguration(
                "worker count must be at least 1".into(),
            ));
        }
        if let Some(db) = self.normalize_db {
            if !db.is_finite() || db > 0.0 {
                return Err(CodecError::InvalidConfiguration(format!(
                    "loudness target {db} dBFS must be finite and at most 0"
                )));
            }
        }
        Ok(())
    }
}

//! # ScalarRvq: reference residual quantizer
//!
//! A small, deterministic [`CodecTransform`] with the same code shape as a
//! neural RVQ codec. Each block of `R` samples is summarized by its mean and
//! the mean is quantized in stages: codebook 0 covers `[-1, 1]` with
//! `codebook_size` uniform levels, and every later codebook quantizes what the
//! previous stages left over, over a range of half the previous step.
//!
//! Decoding with fewer codebooks sums fewer stages, so truncating codebooks
//! degrades precision the way dropping RVQ levels does in DAC. The decoder
//! interpolates linearly between block centers, so with `R = 1` and a couple
//! of codebooks the transform is effectively the identity.

use crate::error::{CodecError, Result, TransformError};
use crate::transform::CodecTransform;

/// Residual scalar quantizer over per-block means.
#[derive(Debug, Clone)]
pub struct ScalarRvq {
    sample_rate: u32,
    ratio: usize,
    codebook_size: usize,
    /// Half-width of the quantization range of every stage.
    ranges: Vec<f64>,
}

impl ScalarRvq {
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidConfiguration`] if any parameter is zero or
    /// the codebook size is outside `2..=65536`.
    pub fn new(
        sample_rate: u32,
        downsampling_ratio: usize,
        n_codebooks: usize,
        codebook_size: usize,
    ) -> Result<Self> {
        if sample_rate == 0 || downsampling_ratio == 0 || n_codebooks == 0 {
            return Err(CodecError::InvalidConfiguration(format!(
                "sample rate ({sample_rate}), downsampling ratio ({downsampling_ratio}) \
                 and codebook count ({n_codebooks}) must be positive"
            )));
        }
        if !(2..=1 << 16).contains(&codebook_size) {
            return Err(CodecError::InvalidConfiguration(format!(
                "codebook size {codebook_size} outside 2..=65536"
            )));
        }

        Ok(Self {
            sample_rate,
            ratio: downsampling_ratio,
            codebook_size,
            ranges: stage_ranges(n_codebooks, codebook_size),
        })
    }

    /// Shape of the 44.1 kHz DAC model: hop 512, 9 codebooks of 1024 entries.
    pub fn dac_44khz() -> Self {
        Self {
            sample_rate: 44100,
            ratio: 512,
            codebook_size: 1024,
            ranges: stage_ranges(9, 1024),
        }
    }

    fn quantize(&self, value: f64, codes: &mut [u16]) {
        let top = (self.codebook_size - 1) as f64;
        let mut residual = value.clamp(-1.0, 1.0);
        for (code, &range) in codes.iter_mut().zip(&self.ranges) {
            let step = step(range, self.codebook_size);
            let index = ((residual + range) / step).round().clamp(0.0, top);
            residual -= index * step - range;
            *code = index as u16;
        }
    }

    fn dequantize(&self, codes: impl Iterator<Item = u16>) -> f64 {
        codes
            .zip(&self.ranges)
            .map(|(code, &range)| code as f64 * step(range, self.codebook_size) - range)
            .sum()
    }
}

/// Each stage spans half a step of the stage before it.
fn stage_ranges(n_codebooks: usize, codebook_size: usize) -> Vec<f64> {
    std::iter::successors(Some(1.0f64), |&r| Some(step(r, codebook_size) / 2.0))
        .take(n_codebooks)
        .collect()
}

fn step(range: f64, codebook_size: usize) -> f64 {
    2.0 * range / (codebook_size - 1) as f64
}

impl CodecTransform for ScalarRvq {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn downsampling_ratio(&self) -> usize {
        self.ratio
    }

    fn n_codebooks(&self) -> usize {
        self.ranges.len()
    }

    fn codebook_size(&self) -> usize {
        self.codebook_size
    }

    fn encode(&self, frame: &[f32]) -> std::result::Result<Vec<u16>, TransformError> {
        let frames = frame.len().div_ceil(self.ratio);
        let n_codebooks = self.ranges.len();
        let mut codes = vec![0u16; n_codebooks * frames];
        let mut stages = vec![0u16; n_codebooks];

        for (j, block) in frame.chunks(self.ratio).enumerate() {
            let mean = block.iter().map(|&s| s as f64).sum::<f64>() / block.len() as f64;
            if !mean.is_finite() {
                return Err(TransformError::InferenceError(format!(
                    "non-finite input in code frame {j}"
                )));
            }
            self.quantize(mean, &mut stages);
            for (k, &code) in stages.iter().enumerate() {
                codes[k * frames + j] = code;
            }
        }
        Ok(codes)
    }

    fn decode(
        &self,
        codes: &[u16],
        n_codebooks: usize,
    ) -> std::result::Result<Vec<f32>, TransformError> {
        if n_codebooks == 0 || n_codebooks > self.ranges.len() {
            return Err(TransformError::ShapeMismatch(format!(
                "cannot decode {n_codebooks} codebooks, model has {}",
                self.ranges.len()
            )));
        }
        if codes.len() % n_codebooks != 0 {
            return Err(TransformError::ShapeMismatch(format!(
                "{} codes do not divide into {n_codebooks} codebooks",
                codes.len()
            )));
        }
        if let Some(&bad) = codes.iter().find(|&&c| c as usize >= self.codebook_size) {
            return Err(TransformError::InferenceError(format!(
                "code {bad} outside codebook of size {}",
                self.codebook_size
            )));
        }

        let frames = codes.len() / n_codebooks;
        let means: Vec<f64> = (0..frames)
            .map(|j| self.dequantize((0..n_codebooks).map(|k| codes[k * frames + j])))
            .collect();

        let ratio = self.ratio as f64;
        let center = (ratio - 1.0) / 2.0;
        let out = (0..frames * self.ratio)
            .map(|i| {
                let pos = (i as f64 - center) / ratio;
                if pos <= 0.0 {
                    return means.first().copied().unwrap_or(0.0) as f32;
                }
                let left = pos.floor() as usize;
                if left + 1 >= frames {
                    return means.last().copied().unwrap_or(0.0) as f32;
                }
                let t = pos - left as f64;
                (means[left] * (1.0 - t) + means[left + 1] * t) as f32
            })
            .collect();
        Ok(out)
    }

    fn name(&self) -> &str {
        "scalar-rvq"
    }
}

//! The encode/decode transform the engine drives, one window at a time.
//!
//! A transform maps a mono frame of samples to a code tensor of shape
//! `[n_codebooks, ceil(len / R)]` and back, where `R` is the downsampling
//! ratio (samples per code frame). Neural codecs such as DAC implement this
//! with a learned encoder, a residual vector quantizer and a decoder; the
//! engine only relies on the shape relationship and never inspects the
//! numbers.

use crate::error::TransformError;

/// A neural (or reference) audio codec operating on fixed-size frames.
///
/// Implementations must be safe to call from several threads at once; the
/// pipeline dispatches windows concurrently.
pub trait CodecTransform: Send + Sync {
    /// Sample rate the transform was built for, in Hz.
    fn sample_rate(&self) -> u32;

    /// Samples represented by one code frame.
    fn downsampling_ratio(&self) -> usize;

    /// Number of codebooks produced per code frame.
    fn n_codebooks(&self) -> usize;

    /// Number of entries in each codebook; every code is below this value.
    fn codebook_size(&self) -> usize;

    /// Encode a mono frame into codes, codebook-major:
    /// `codes[k * frames + j]` is codebook `k` at code frame `j`, with
    /// `frames = ceil(frame.len() / downsampling_ratio())`.
    fn encode(&self, frame: &[f32]) -> Result<Vec<u16>, TransformError>;

    /// Decode codes laid out as [`encode`](CodecTransform::encode) produces
    /// them, using the first `n_codebooks` codebooks. Returns
    /// `frames * downsampling_ratio()` samples.
    fn decode(&self, codes: &[u16], n_codebooks: usize) -> Result<Vec<f32>, TransformError>;

    /// Human-readable transform name.
    fn name(&self) -> &str;
}

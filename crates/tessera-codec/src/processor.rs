//! Per-window encode and decode.
//!
//! A [`ChunkProcessor`] holds no state between calls; the pipeline shares one
//! instance across every worker thread.

use tessera_format::{code_frames, CodeChunk, PaddingMode, Window};

use crate::buffer::AudioBuffer;
use crate::error::{CodecError, Result, TransformError};
use crate::transform::CodecTransform;

/// Runs the transform over single windows.
pub struct ChunkProcessor<'a> {
    transform: &'a dyn CodecTransform,
    frame_length: usize,
    padding: PaddingMode,
    n_codebooks: usize,
}

impl<'a> ChunkProcessor<'a> {
    /// `n_codebooks` is the number of codebooks kept per chunk; values above
    /// the transform's count are clamped to it.
    pub fn new(
        transform: &'a dyn CodecTransform,
        frame_length: usize,
        padding: PaddingMode,
        n_codebooks: usize,
    ) -> Self {
        Self {
            transform,
            frame_length,
            padding,
            n_codebooks: n_codebooks.min(transform.n_codebooks()),
        }
    }

    /// Code frames per codebook in every chunk this processor produces.
    pub fn frames(&self) -> usize {
        code_frames(self.frame_length, self.transform.downsampling_ratio())
    }

    /// Encode every channel of `audio` under `window`.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidConfiguration`] if the window does not fit the
    /// buffer, [`CodecError::TransformFailure`] if the transform fails or
    /// returns codes of the wrong shape.
    pub fn encode_chunk(&self, window: &Window, audio: &AudioBuffer) -> Result<CodeChunk> {
        if window.length != self.frame_length || window.end() > audio.len() {
            return Err(CodecError::InvalidConfiguration(format!(
                "window {} [{}..{}) of length {} does not fit {} samples with frame length {}",
                window.index,
                window.start,
                window.end(),
                window.length,
                audio.len(),
                self.frame_length
            )));
        }

        let frames = self.frames();
        let produced = self.transform.n_codebooks() * frames;
        let kept = self.n_codebooks * frames;
        let mut codes = Vec::with_capacity(audio.num_channels() * kept);

        for (ch, samples) in audio.channels().iter().enumerate() {
            let frame = slice_window(samples, window, self.padding);
            let channel_codes = self.transform.encode(&frame)?;
            if channel_codes.len() != produced {
                return Err(TransformError::ShapeMismatch(format!(
                    "window {} channel {ch}: expected {} codebooks x {frames} frames, got {} codes",
                    window.index,
                    self.transform.n_codebooks(),
                    channel_codes.len()
                ))
                .into());
            }
            // Codebook-major, so the first k codebooks are a prefix.
            codes.extend_from_slice(&channel_codes[..kept]);
        }

        tracing::debug!(
            window = window.index,
            start = window.start,
            true_length = window.true_length,
            padding = window.padding(),
            "encoded chunk"
        );
        Ok(CodeChunk::new(
            window.true_length,
            audio.num_channels(),
            self.n_codebooks,
            frames,
            codes,
        )?)
    }

    /// Decode a chunk back to one sample vector per channel, trimmed to the
    /// chunk's true length.
    ///
    /// # Errors
    ///
    /// [`CodecError::TransformFailure`] if the transform fails or returns
    /// fewer samples than the frame length.
    pub fn decode_chunk(&self, chunk: &CodeChunk) -> Result<Vec<Vec<f32>>> {
        let mut channels = Vec::with_capacity(chunk.channels);
        for ch in 0..chunk.channels {
            let mut samples = self
                .transform
                .decode(chunk.channel(ch), chunk.n_codebooks)?;
            if samples.len() < self.frame_length {
                return Err(TransformError::ShapeMismatch(format!(
                    "decoder returned {} samples for channel {ch}, frame length is {}",
                    samples.len(),
                    self.frame_length
                ))
                .into());
            }
            samples.truncate(chunk.true_length);
            channels.push(samples);
        }
        tracing::debug!(true_length = chunk.true_length, "decoded chunk");
        Ok(channels)
    }
}

/// Copy the real samples of `window` from `channel` and pad the tail to the
/// window length.
pub fn slice_window(channel: &[f32], window: &Window, padding: PaddingMode) -> Vec<f32> {
    let real = &channel[window.start..window.end()];
    let mut frame = Vec::with_capacity(window.length);
    frame.extend_from_slice(real);
    match padding {
        PaddingMode::Zero => frame.resize(window.length, 0.0),
        PaddingMode::Reflect => {
            if real.is_empty() {
                frame.resize(window.length, 0.0);
            } else {
                frame.extend((real.len()..window.length).map(|i| real[reflect_index(i, real.len())]));
            }
        }
    }
    frame
}

/// Index into a signal of length `len` extended by mirroring about its end
/// points (the end samples are not repeated).
fn reflect_index(i: usize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = i % period;
    if m < len {
        m
    } else {
        period - m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rvq::ScalarRvq;

    struct Broken;

    impl CodecTransform for Broken {
        fn sample_rate(&self) -> u32 {
            8000
        }
        fn downsampling_ratio(&self) -> usize {
            2
        }
        fn n_codebooks(&self) -> usize {
            2
        }
        fn codebook_size(&self) -> usize {
            16
        }
        fn encode(&self, _frame: &[f32]) -> std::result::Result<Vec<u16>, TransformError> {
            // one code short
            Ok(vec![0; 3])
        }
        fn decode(
            &self,
            _codes: &[u16],
            _n_codebooks: usize,
        ) -> std::result::Result<Vec<f32>, TransformError> {
            Ok(vec![0.0; 2])
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    fn window(start: usize, length: usize, true_length: usize) -> Window {
        Window {
            index: 0,
            start,
            length,
            true_length,
        }
    }

    #[test]
    fn test_zero_padding() {
        let frame = slice_window(&[1.0, 2.0, 3.0], &window(1, 5, 2), PaddingMode::Zero);
        assert_eq!(frame, vec![2.0, 3.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reflect_padding() {
        let frame = slice_window(&[1.0, 2.0, 3.0], &window(0, 8, 3), PaddingMode::Reflect);
        assert_eq!(frame, vec![1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0]);

        let single = slice_window(&[0.5], &window(0, 3, 1), PaddingMode::Reflect);
        assert_eq!(single, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_encode_chunk_shape_and_truncation() {
        let rvq = ScalarRvq::new(8000, 4, 3, 256).unwrap();
        let audio = AudioBuffer::new(vec![vec![0.1; 10], vec![-0.1; 10]], 8000).unwrap();
        let processor = ChunkProcessor::new(&rvq, 8, PaddingMode::Zero, 2);

        let chunk = processor.encode_chunk(&window(8, 8, 2), &audio).unwrap();
        assert_eq!(chunk.true_length, 2);
        assert_eq!(chunk.channels, 2);
        assert_eq!(chunk.n_codebooks, 2);
        assert_eq!(chunk.frames, 2);
        assert_eq!(chunk.codes.len(), 2 * 2 * 2);
    }

    #[test]
    fn test_codebook_request_clamped() {
        let rvq = ScalarRvq::new(8000, 4, 3, 256).unwrap();
        let processor = ChunkProcessor::new(&rvq, 8, PaddingMode::Zero, 10);
        let audio = AudioBuffer::mono(vec![0.0; 8], 8000).unwrap();
        let chunk = processor.encode_chunk(&window(0, 8, 8), &audio).unwrap();
        assert_eq!(chunk.n_codebooks, 3);
    }

    #[test]
    fn test_decode_chunk_trims_to_true_length() {
        let rvq = ScalarRvq::new(8000, 4, 3, 256).unwrap();
        let audio = AudioBuffer::mono(vec![0.2; 11], 8000).unwrap();
        let processor = ChunkProcessor::new(&rvq, 8, PaddingMode::Zero, 3);
        let chunk = processor.encode_chunk(&window(8, 8, 3), &audio).unwrap();

        let decoded = processor.decode_chunk(&chunk).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].len(), 3);
    }

    #[test]
    fn test_window_outside_buffer_rejected() {
        let rvq = ScalarRvq::new(8000, 4, 3, 256).unwrap();
        let audio = AudioBuffer::mono(vec![0.0; 4], 8000).unwrap();
        let processor = ChunkProcessor::new(&rvq, 8, PaddingMode::Zero, 3);
        let result = processor.encode_chunk(&window(0, 8, 8), &audio);
        assert!(matches!(result, Err(CodecError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_wrong_code_shape_is_transform_failure() {
        let processor = ChunkProcessor::new(&Broken, 4, PaddingMode::Zero, 2);
        let audio = AudioBuffer::mono(vec![0.0; 4], 8000).unwrap();
        let result = processor.encode_chunk(&window(0, 4, 4), &audio);
        assert!(matches!(
            result,
            Err(CodecError::TransformFailure(TransformError::ShapeMismatch(_)))
        ));
    }

    #[test]
    fn test_short_decoder_output_is_transform_failure() {
        let processor = ChunkProcessor::new(&Broken, 4, PaddingMode::Zero, 2);
        let chunk = CodeChunk::new(4, 1, 2, 2, vec![0; 4]).unwrap();
        let result = processor.decode_chunk(&chunk);
        assert!(matches!(
            result,
            Err(CodecError::TransformFailure(TransformError::ShapeMismatch(_)))
        ));
    }
}

//! # Pipeline: compress and decompress whole buffers
//!
//! The pipeline plans windows over the input, runs the transform on every
//! window through a bounded worker pool and gathers the results into a
//! [`CompressedContainer`]. Decompression replays the plan stored in the
//! container header, decodes every chunk and crossfades the overlaps.
//!
//! ```text
//! AudioBuffer ──normalize──▶ plan(N, L, H) ──▶ encode_chunk ×W ──▶ merge_codes ──▶ container
//! container ──▶ plan(N, L, H) ──▶ decode_chunk ×W ──▶ merge_samples ──▶ restore gain ──▶ AudioBuffer
//! ```
//!
//! Any failing window aborts the whole operation; no partial container or
//! buffer is ever returned.

use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use tessera_format::{
    plan, CompressedContainer, ContainerFlags, ContainerHeader, Window, MAX_CODEBOOK_SIZE,
    TSRA_VERSION,
};

use crate::buffer::AudioBuffer;
use crate::config::PipelineConfig;
use crate::error::{CodecError, Result};
use crate::loudness::{normalize, Normalization};
use crate::processor::ChunkProcessor;
use crate::reconcile::{merge_codes, merge_samples};
use crate::transform::CodecTransform;

/// Compression engine bound to one transform and one configuration.
pub struct Pipeline {
    transform: Box<dyn CodecTransform>,
    config: PipelineConfig,
    /// `None` when `workers == 1`: windows run on the calling thread.
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("transform", &self.transform.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Pipeline {
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidConfiguration`] if the configuration is
    /// invalid or the transform reports a shape the container cannot store,
    /// and [`CodecError::WorkerPool`] if the thread pool cannot be started.
    pub fn new(transform: Box<dyn CodecTransform>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        check_transform(transform.as_ref())?;

        let pool = if config.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .thread_name(|i| format!("tessera-worker-{i}"))
                .build()
                .map_err(|e| CodecError::WorkerPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        tracing::debug!(
            transform = transform.name(),
            frame_length = config.frame_length,
            hop = config.hop(),
            workers = config.workers,
            "pipeline ready"
        );
        Ok(Self {
            transform,
            config,
            pool,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn transform(&self) -> &dyn CodecTransform {
        self.transform.as_ref()
    }

    /// Compress with the configured frame length and hop.
    pub fn compress(&self, audio: &AudioBuffer) -> Result<CompressedContainer> {
        self.compress_with(audio, self.config.frame_length, self.config.hop())
    }

    /// Compress the whole buffer as a single window (`L = H = N`).
    pub fn compress_whole(&self, audio: &AudioBuffer) -> Result<CompressedContainer> {
        self.compress_with(audio, audio.len(), audio.len())
    }

    /// Compress with explicit planning parameters.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidConfiguration`] for bad parameters, an empty
    /// buffer or a sample rate the transform was not built for;
    /// [`CodecError::TransformFailure`] if any window fails to encode.
    pub fn compress_with(
        &self,
        audio: &AudioBuffer,
        frame_length: usize,
        hop: usize,
    ) -> Result<CompressedContainer> {
        let started = Instant::now();
        let transform = self.transform.as_ref();
        if audio.sample_rate() != transform.sample_rate() {
            return Err(CodecError::InvalidConfiguration(format!(
                "input is {} Hz but transform {} expects {} Hz",
                audio.sample_rate(),
                transform.name(),
                transform.sample_rate()
            )));
        }
        let channels = narrow::<u16>(audio.num_channels(), "channel count")?;
        let frame_length_u32 = narrow::<u32>(frame_length, "frame length")?;
        let hop_u32 = narrow::<u32>(hop, "hop")?;
        let windows = plan(audio.len(), frame_length, hop)?;

        let n_codebooks = self.codebooks_to_keep();

        let normalized;
        let mut loudness = None;
        let input = match self.config.normalize_db {
            Some(target_db) => {
                let mut copy = audio.clone();
                loudness = Some(normalize(&mut copy, target_db));
                normalized = copy;
                &normalized
            }
            None => audio,
        };

        let processor =
            ChunkProcessor::new(transform, frame_length, self.config.padding, n_codebooks);
        let encoded = self.dispatch(&windows, |w| {
            processor.encode_chunk(w, input).map(|chunk| (*w, chunk))
        })?;
        let chunks = merge_codes(encoded)?;

        let mut flags = ContainerFlags::new();
        let (input_db, target_db) = match loudness {
            Some(Normalization {
                input_db,
                target_db,
                applied: true,
            }) => {
                flags.set(ContainerFlags::LOUDNESS_NORMALIZED);
                (input_db, target_db)
            }
            _ => (0.0, 0.0),
        };

        let header = ContainerHeader {
            version: TSRA_VERSION,
            flags,
            sample_rate: audio.sample_rate(),
            channels,
            n_codebooks: narrow::<u16>(n_codebooks, "codebook count")?,
            original_length: audio.len() as u64,
            frame_length: frame_length_u32,
            hop: hop_u32,
            downsampling_ratio: narrow::<u32>(transform.downsampling_ratio(), "downsampling ratio")?,
            codebook_size: narrow::<u32>(transform.codebook_size(), "codebook size")?,
            input_db,
            target_db,
            padding: self.config.padding,
        };
        let container = CompressedContainer::new(header, chunks)?;

        tracing::info!(
            transform = transform.name(),
            samples = audio.len(),
            channels = audio.num_channels(),
            windows = windows.len(),
            n_codebooks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compressed"
        );
        Ok(container)
    }

    /// Reconstruct audio from a container.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidConfiguration`] if the transform cannot decode
    /// this container, [`CodecError::Format`] if the container is corrupt and
    /// [`CodecError::TransformFailure`] if any chunk fails to decode.
    pub fn decompress(&self, container: &CompressedContainer) -> Result<AudioBuffer> {
        let started = Instant::now();
        let transform = self.transform.as_ref();
        let h = &container.header;
        container.validate()?;
        self.check_compatible(h)?;

        let windows = container.windows()?;
        let processor = ChunkProcessor::new(
            transform,
            h.frame_length as usize,
            h.padding,
            h.n_codebooks as usize,
        );
        let decoded = self.dispatch(&windows, |w| {
            processor
                .decode_chunk(&container.chunks[w.index])
                .map(|samples| (*w, samples))
        })?;

        let channels = merge_samples(h.original_length as usize, h.channels as usize, decoded)?;
        let mut audio = AudioBuffer::new(channels, h.sample_rate)?;
        audio.apply_gain(h.restore_gain());

        tracing::info!(
            transform = transform.name(),
            samples = audio.len(),
            channels = audio.num_channels(),
            windows = windows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "decompressed"
        );
        Ok(audio)
    }

    /// Compress and save to `path`. Nothing is written if compression fails.
    pub fn compress_to_file(
        &self,
        audio: &AudioBuffer,
        path: &Path,
    ) -> Result<CompressedContainer> {
        let container = self.compress(audio)?;
        container.save(path)?;
        Ok(container)
    }

    /// Load a container from `path` and decompress it.
    pub fn decompress_file(&self, path: &Path) -> Result<AudioBuffer> {
        let container = CompressedContainer::load(path)?;
        self.decompress(&container)
    }

    fn codebooks_to_keep(&self) -> usize {
        let available = self.transform.n_codebooks();
        match self.config.n_quantizers {
            Some(k) if k > available => {
                tracing::warn!(
                    requested = k,
                    available,
                    "n_quantizers exceeds the transform's codebooks, keeping all"
                );
                available
            }
            Some(k) => k,
            None => available,
        }
    }

    fn check_compatible(&self, h: &ContainerHeader) -> Result<()> {
        let t = self.transform.as_ref();
        let mismatch = if h.sample_rate != t.sample_rate() {
            Some(format!(
                "container is {} Hz, transform expects {} Hz",
                h.sample_rate,
                t.sample_rate()
            ))
        } else if h.downsampling_ratio as usize != t.downsampling_ratio() {
            Some(format!(
                "container downsampling ratio {} differs from transform's {}",
                h.downsampling_ratio,
                t.downsampling_ratio()
            ))
        } else if h.codebook_size as usize != t.codebook_size() {
            Some(format!(
                "container codebook size {} differs from transform's {}",
                h.codebook_size,
                t.codebook_size()
            ))
        } else if h.n_codebooks as usize > t.n_codebooks() {
            Some(format!(
                "container stores {} codebooks, transform has {}",
                h.n_codebooks,
                t.n_codebooks()
            ))
        } else {
            None
        };
        match mismatch {
            Some(msg) => Err(CodecError::InvalidConfiguration(format!(
                "{} cannot decode this container: {msg}",
                t.name()
            ))),
            None => Ok(()),
        }
    }

    /// Run `f` over every window, in parallel when a pool is configured.
    /// The first error wins and the remaining results are dropped.
    fn dispatch<T, F>(&self, windows: &[Window], f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&Window) -> Result<T> + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| windows.par_iter().map(&f).collect()),
            None => windows.iter().map(&f).collect(),
        }
    }
}

fn check_transform(t: &dyn CodecTransform) -> Result<()> {
    if t.sample_rate() == 0 || t.downsampling_ratio() == 0 || t.n_codebooks() == 0 {
        return Err(CodecError::InvalidConfiguration(format!(
            "transform {} reports a zero sample rate, downsampling ratio or codebook count",
            t.name()
        )));
    }
    if t.codebook_size() == 0 || t.codebook_size() > MAX_CODEBOOK_SIZE as usize {
        return Err(CodecError::InvalidConfiguration(format!(
            "transform {} codebook size {} does not fit 16-bit codes",
            t.name(),
            t.codebook_size()
        )));
    }
    Ok(())
}

fn narrow<T: TryFrom<usize>>(value: usize, what: &str) -> Result<T> {
    T::try_from(value).map_err(|_| {
        CodecError::InvalidConfiguration(format!("{what} {value} does not fit the container header"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rvq::ScalarRvq;

    fn pipeline(config: PipelineConfig) -> Pipeline {
        let rvq = ScalarRvq::new(8000, 4, 3, 256).unwrap();
        Pipeline::new(Box::new(rvq), config).unwrap()
    }

    fn config(frame_length: usize, hop: usize) -> PipelineConfig {
        PipelineConfig {
            frame_length,
            hop: Some(hop),
            workers: 1,
            ..Default::default()
        }
    }

    fn tone(len: usize) -> AudioBuffer {
        AudioBuffer::mono((0..len).map(|i| (i as f32 * 0.01).sin() * 0.5).collect(), 8000)
            .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let rvq = ScalarRvq::new(8000, 4, 3, 256).unwrap();
        let result = Pipeline::new(Box::new(rvq), config(8, 9));
        assert!(matches!(result, Err(CodecError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_header_records_plan() {
        let p = pipeline(config(64, 48));
        let c = p.compress(&tone(200)).unwrap();
        assert_eq!(c.header.original_length, 200);
        assert_eq!(c.header.frame_length, 64);
        assert_eq!(c.header.hop, 48);
        assert_eq!(c.header.downsampling_ratio, 4);
        assert_eq!(c.header.codebook_size, 256);
        assert_eq!(c.chunks.len(), c.windows().unwrap().len());
    }

    #[test]
    fn test_sample_rate_mismatch_rejected() {
        let p = pipeline(config(64, 64));
        let audio = AudioBuffer::mono(vec![0.0; 100], 44100).unwrap();
        assert!(matches!(
            p.compress(&audio),
            Err(CodecError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_empty_input_rejected() {
        let p = pipeline(config(64, 64));
        let audio = AudioBuffer::mono(Vec::new(), 8000).unwrap();
        assert!(matches!(
            p.compress(&audio),
            Err(CodecError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_n_quantizers_clamped() {
        let p = pipeline(PipelineConfig {
            n_quantizers: Some(7),
            ..config(64, 64)
        });
        let c = p.compress(&tone(100)).unwrap();
        assert_eq!(c.header.n_codebooks, 3);
    }

    #[test]
    fn test_incompatible_transform_rejected() {
        let c = pipeline(config(64, 64)).compress(&tone(100)).unwrap();
        let other = Pipeline::new(
            Box::new(ScalarRvq::new(8000, 8, 3, 256).unwrap()),
            config(64, 64),
        )
        .unwrap();
        assert!(matches!(
            other.decompress(&c),
            Err(CodecError::InvalidConfiguration(msg)) if msg.contains("downsampling ratio")
        ));
    }

    #[test]
    fn test_silent_input_not_flagged() {
        let p = pipeline(config(64, 64));
        let audio = AudioBuffer::mono(vec![0.0; 100], 8000).unwrap();
        let c = p.compress(&audio).unwrap();
        assert!(!c.header.flags.has(ContainerFlags::LOUDNESS_NORMALIZED));
        assert_eq!(c.header.restore_gain(), 1.0);
    }
}

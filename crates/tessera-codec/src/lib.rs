//! # tessera-codec
//!
//! Chunked compression engine for neural audio codecs.
//!
//! Neural codecs such as DAC work on bounded frames, so long recordings are
//! split into fixed-length windows, each window is encoded independently on a
//! worker pool, and the resulting code chunks are stored in a
//! [`tessera_format::CompressedContainer`]. Decompression replays the same
//! window plan, decodes every chunk and crossfades overlapping windows back
//! into one continuous signal.
//!
//! - [`CodecTransform`]: the encode/decode model the engine drives
//! - [`ScalarRvq`]: deterministic reference transform with DAC's code shape
//! - [`ChunkProcessor`]: per-window encode and decode
//! - [`reconcile`]: reorders codes and crossfades decoded samples
//! - [`Pipeline`]: the compress/decompress facade
//!
//! ```no_run
//! use tessera_codec::{AudioBuffer, Pipeline, PipelineConfig, ScalarRvq};
//!
//! # fn main() -> tessera_codec::Result<()> {
//! let pipeline = Pipeline::new(Box::new(ScalarRvq::dac_44khz()), PipelineConfig::default())?;
//! let audio = AudioBuffer::mono(vec![0.0; 44100 * 3], 44100)?;
//! let container = pipeline.compress(&audio)?;
//! let restored = pipeline.decompress(&container)?;
//! assert_eq!(restored.len(), audio.len());
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod loudness;
pub mod pipeline;
pub mod processor;
pub mod reconcile;
pub mod rvq;
pub mod transform;

pub use buffer::AudioBuffer;
pub use config::PipelineConfig;
pub use error::{CodecError, Result, TransformError};
pub use pipeline::Pipeline;
pub use processor::ChunkProcessor;
pub use reconcile::{crossfade_weights, merge_codes, merge_samples};
pub use rvq::ScalarRvq;
pub use transform::CodecTransform;

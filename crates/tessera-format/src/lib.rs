//! # tessera-format
//!
//! Window planning and the binary container format for Tessera compressed
//! audio. Handles splitting a timeline into fixed-length frames and reading
//! and writing `.tsra` files.
//!
//! ## Format Overview
//!
//! A `.tsra` file consists of:
//! - **Header** (96 bytes): magic, version, flags, sample rate, channel count,
//!   original length, frame length, hop, downsampling ratio, codebook shape,
//!   loudness metadata, padding mode and a BLAKE3 hash over the header fields
//!   and the chunk section
//! - **Chunk section**: a chunk count followed by one record per window, each
//!   holding the window's unpadded length and its code tensor
//!
//! ## Example
//! ```rust,no_run
//! use std::path::Path;
//! use tessera_format::{plan, CompressedContainer};
//!
//! // Planning
//! let windows = plan(44100 * 4, 44100, 44100).unwrap();
//! assert_eq!(windows.len(), 4);
//!
//! // Reading
//! let container = CompressedContainer::load(Path::new("speech.tsra")).unwrap();
//! println!("{:?}", container.header);
//! ```

pub mod chunk;
pub mod container;
pub mod error;
pub mod header;
pub mod plan;
pub mod reader;
pub mod writer;

pub use chunk::CodeChunk;
pub use container::CompressedContainer;
pub use error::{FormatError, Result};
pub use header::*;
pub use plan::{code_frames, plan, window_count, Window};
pub use reader::deserialize;
pub use writer::serialize;

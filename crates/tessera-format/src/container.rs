//! The compressed container: header metadata plus one code chunk per window.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunk::CodeChunk;
use crate::error::{FormatError, Result};
use crate::header::ContainerHeader;
use crate::plan::{plan, Window};

/// The persisted unit of compressed audio.
///
/// Chunks are stored in window order. The window boundaries themselves are not
/// stored: [`CompressedContainer::windows`] replays the planner with the
/// header's `(original_length, frame_length, hop)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedContainer {
    pub header: ContainerHeader,
    pub chunks: Vec<CodeChunk>,
}

impl CompressedContainer {
    /// Assemble a container, checking every structural invariant.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::InvalidConfiguration`] if the chunks do not match
    /// the plan implied by the header.
    pub fn new(header: ContainerHeader, chunks: Vec<CodeChunk>) -> Result<Self> {
        let container = Self { header, chunks };
        container
            .check()
            .map_err(FormatError::InvalidConfiguration)?;
        Ok(container)
    }

    /// Replay the window plan this container was compressed with.
    pub fn windows(&self) -> Result<Vec<Window>> {
        plan(
            self.header.original_length as usize,
            self.header.frame_length as usize,
            self.header.hop as usize,
        )
    }

    /// Serialize to bytes. See [`crate::writer`] for the layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        crate::writer::serialize(self)
    }

    /// Parse a container from bytes, validating it completely.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        crate::reader::deserialize(bytes)
    }

    /// Write the container to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        crate::writer::save(self, path)
    }

    /// Read and validate a container from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        crate::reader::load(path)
    }

    /// Re-check every structural invariant, e.g. after mutating the public fields.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::CorruptContainer`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(FormatError::CorruptContainer)
    }

    /// Total number of codes stored across all chunks.
    pub fn code_count(&self) -> usize {
        self.chunks.iter().map(|c| c.codes.len()).sum()
    }

    /// Check the header fields and that the chunk list matches the replayed plan.
    ///
    /// Returns a description of the first violated invariant.
    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        let h = &self.header;
        h.check()?;

        let windows = self.windows().map_err(|e| e.to_string())?;
        if windows.len() != self.chunks.len() {
            return Err(format!(
                "plan for {} samples (frame {}, hop {}) has {} windows but {} chunks are present",
                h.original_length,
                h.frame_length,
                h.hop,
                windows.len(),
                self.chunks.len()
            ));
        }

        let frames = h.code_frames();
        for (window, chunk) in windows.iter().zip(&self.chunks) {
            if chunk.true_length != window.true_length {
                return Err(format!(
                    "chunk {} covers {} samples, plan expects {}",
                    window.index, chunk.true_length, window.true_length
                ));
            }
            if chunk.channels != h.channels as usize
                || chunk.n_codebooks != h.n_codebooks as usize
                || chunk.frames != frames
            {
                return Err(format!(
                    "chunk {} has shape [{}, {}, {}], header expects [{}, {}, {}]",
                    window.index,
                    chunk.channels,
                    chunk.n_codebooks,
                    chunk.frames,
                    h.channels,
                    h.n_codebooks,
                    frames
                ));
            }
            if chunk.codes.len() != chunk.channels * chunk.n_codebooks * chunk.frames {
                return Err(format!("chunk {} code tensor has the wrong size", window.index));
            }
            if let Some(max) = chunk.max_code() {
                if max as u32 >= h.codebook_size {
                    return Err(format!(
                        "chunk {} holds code {} outside codebook of size {}",
                        window.index, max, h.codebook_size
                    ));
                }
            }
        }
        Ok(())
    }
}

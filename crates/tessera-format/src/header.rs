//! Container header: the first 96 bytes of every `.tsra` file.

use serde::{Deserialize, Serialize};

use crate::plan::code_frames;

/// Magic bytes identifying a Tessera container: `TSRA`.
pub const TSRA_MAGIC: [u8; 4] = *b"TSRA";

/// Current format version.
pub const TSRA_VERSION: u16 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 96;

/// Header bytes covered by the integrity hash.
pub const HASHED_HEADER_LEN: usize = 56;

/// Largest codebook whose indices fit the on-disk `u16` code width.
pub const MAX_CODEBOOK_SIZE: u32 = 1 << 16;

/// The fixed-size header at the beginning of every container.
///
/// Layout (96 bytes, little-endian):
/// - `[0..4]`   magic: `TSRA`
/// - `[4..6]`   version: u16
/// - `[6..8]`   flags: u16
/// - `[8..12]`  sample_rate: u32
/// - `[12..14]` channels: u16
/// - `[14..16]` n_codebooks: u16
/// - `[16..24]` original_length: u64 (samples per channel)
/// - `[24..28]` frame_length: u32
/// - `[28..32]` hop: u32
/// - `[32..36]` downsampling_ratio: u32 (samples per code frame)
/// - `[36..40]` codebook_size: u32
/// - `[40..44]` input_db: f32
/// - `[44..48]` target_db: f32
/// - `[48]`     padding mode: u8
/// - `[49..56]` reserved
/// - `[56..88]` BLAKE3 hash of bytes `[0..56]` followed by the chunk section
/// - `[88..96]` reserved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerHeader {
    /// Format version (currently 1)
    pub version: u16,
    /// Flags bitfield
    pub flags: ContainerFlags,
    /// Sample rate in Hz of the original audio
    pub sample_rate: u32,
    /// Number of channels of the original audio
    pub channels: u16,
    /// Number of codebooks stored per code frame
    pub n_codebooks: u16,
    /// Samples per channel in the original audio
    pub original_length: u64,
    /// Samples handed to the transform per window
    pub frame_length: u32,
    /// Stride between window starts
    pub hop: u32,
    /// Samples represented by one code frame
    pub downsampling_ratio: u32,
    /// Number of entries in each codebook
    pub codebook_size: u32,
    /// Level of the input before normalization, in dBFS
    pub input_db: f32,
    /// Level the input was normalized to, in dBFS
    pub target_db: f32,
    /// How short windows were padded
    pub padding: PaddingMode,
}

/// Header flags stored as a u16 bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFlags(pub u16);

impl ContainerFlags {
    /// Input was scaled from `input_db` to `target_db` before encoding
    pub const LOUDNESS_NORMALIZED: u16 = 1 << 0;

    /// Bits this version understands.
    pub const KNOWN: u16 = Self::LOUDNESS_NORMALIZED;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }

    pub fn has(&self, flag: u16) -> bool {
        self.0 & flag != 0
    }
}

impl Default for ContainerFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// How the tail of a window that runs past the end of the input is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaddingMode {
    /// Silence
    #[default]
    Zero = 0,
    /// Mirror the signal back from its last sample
    Reflect = 1,
}

impl PaddingMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Zero),
            1 => Some(Self::Reflect),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaddingMode::Zero => "zero",
            PaddingMode::Reflect => "reflect",
        }
    }
}

impl ContainerHeader {
    /// Code frames stored per channel and codebook in every chunk.
    pub fn code_frames(&self) -> usize {
        code_frames(self.frame_length as usize, self.downsampling_ratio as usize)
    }

    /// Number of `u16` codes in one chunk record.
    ///
    /// Returns `None` if the product overflows `usize`.
    pub fn codes_per_chunk(&self) -> Option<usize> {
        (self.channels as usize)
            .checked_mul(self.n_codebooks as usize)?
            .checked_mul(self.code_frames())
    }

    /// Duration of the original audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.original_length as f64 / self.sample_rate as f64
    }

    /// Linear gain that undoes the loudness normalization applied at encode time.
    pub fn restore_gain(&self) -> f32 {
        if self.flags.has(ContainerFlags::LOUDNESS_NORMALIZED) {
            10f32.powf((self.input_db - self.target_db) / 20.0)
        } else {
            1.0
        }
    }

    /// Check the structural invariants of the header fields.
    ///
    /// Returns a description of the first violated invariant.
    pub fn check(&self) -> std::result::Result<(), String> {
        let positive = [
            ("sample rate", self.sample_rate as u64),
            ("channel count", self.channels as u64),
            ("codebook count", self.n_codebooks as u64),
            ("original length", self.original_length),
            ("frame length", self.frame_length as u64),
            ("hop", self.hop as u64),
            ("downsampling ratio", self.downsampling_ratio as u64),
            ("codebook size", self.codebook_size as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(format!("{name} must be positive"));
        }
        if self.hop > self.frame_length {
            return Err(format!(
                "hop {} exceeds frame length {}",
                self.hop, self.frame_length
            ));
        }
        if self.codebook_size > MAX_CODEBOOK_SIZE {
            return Err(format!(
                "codebook size {} exceeds maximum {}",
                self.codebook_size, MAX_CODEBOOK_SIZE
            ));
        }
        if self.flags.0 & !ContainerFlags::KNOWN != 0 {
            return Err(format!("unknown flag bits 0x{:04X}", self.flags.0));
        }
        if !self.input_db.is_finite() || !self.target_db.is_finite() {
            return Err(format!(
                "loudness levels must be finite, got input {} dB and target {} dB",
                self.input_db, self.target_db
            ));
        }
        if self.flags.has(ContainerFlags::LOUDNESS_NORMALIZED) && self.target_db > 0.0 {
            return Err(format!(
                "normalized target {} dBFS is above full scale",
                self.target_db
            ));
        }
        Ok(())
    }
}

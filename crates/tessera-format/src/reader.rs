//! Container reader: parses and validates `.tsra` bytes.
//!
//! The reader checks magic bytes and the format version, validates every
//! header field, replays the window planner to learn how many chunk records
//! must follow, verifies the BLAKE3 hash over the header fields and the chunk
//! section, and only then decodes the records. Sizes declared by the input are compared against the
//! bytes actually present before anything is allocated.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tessera_format::CompressedContainer;
//!
//! let container = CompressedContainer::load(Path::new("speech.tsra")).unwrap();
//! println!("{} chunks", container.chunks.len());
//! ```

use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::chunk::CodeChunk;
use crate::container::CompressedContainer;
use crate::error::{FormatError, Result};
use crate::header::{
    ContainerFlags, ContainerHeader, PaddingMode, HASHED_HEADER_LEN, HEADER_SIZE, TSRA_MAGIC,
    TSRA_VERSION,
};
use crate::plan::window_count;
use crate::writer::integrity_hash;

/// Parse a container from a complete byte buffer.
///
/// # Errors
///
/// - [`FormatError::UnsupportedVersion`] if the version field is not one this
///   reader understands.
/// - [`FormatError::CorruptContainer`] on any structural mismatch: bad magic,
///   non-positive header fields, non-finite loudness levels, a chunk count
///   that disagrees with the plan, truncated or trailing data, a hash
///   mismatch, or out-of-range codes.
pub fn deserialize(bytes: &[u8]) -> Result<CompressedContainer> {
    if bytes.len() < HEADER_SIZE {
        return Err(corrupt(format!(
            "{} bytes is shorter than the {HEADER_SIZE}-byte header",
            bytes.len()
        )));
    }

    let mut cursor = Cursor::new(&bytes[..HEADER_SIZE]);
    let (header, stored_hash) = read_header(&mut cursor)?;
    tracing::debug!(
        version = header.version,
        sample_rate = header.sample_rate,
        channels = header.channels,
        original_length = header.original_length,
        frame_length = header.frame_length,
        hop = header.hop,
        "Parsed container header"
    );

    let chunks = read_chunk_section(
        &bytes[..HASHED_HEADER_LEN],
        &bytes[HEADER_SIZE..],
        &header,
        &stored_hash,
    )?;

    let container = CompressedContainer { header, chunks };
    container.check().map_err(FormatError::CorruptContainer)?;
    Ok(container)
}

/// Read a container from any reader, consuming it to the end.
pub fn read_from<R: Read>(reader: &mut R) -> Result<CompressedContainer> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    deserialize(&bytes)
}

/// Read and validate the container stored at `path`.
pub fn load(path: &Path) -> Result<CompressedContainer> {
    tracing::info!("Opening container: {}", path.display());

    let bytes = std::fs::read(path)?;
    let container = deserialize(&bytes)?;

    tracing::info!(
        chunks = container.chunks.len(),
        sample_rate = container.header.sample_rate,
        duration_secs = container.header.duration_secs(),
        "Parsed container"
    );
    Ok(container)
}

fn corrupt(msg: impl Into<String>) -> FormatError {
    FormatError::CorruptContainer(msg.into())
}

/// Reads past the end of an in-memory buffer mean the input was cut short.
fn truncated(err: std::io::Error) -> FormatError {
    corrupt(format!("unexpected end of data: {err}"))
}

/// Parse the 96-byte header and return it with the stored section hash.
fn read_header(r: &mut Cursor<&[u8]>) -> Result<(ContainerHeader, [u8; 32])> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(truncated)?;
    if magic != TSRA_MAGIC {
        return Err(corrupt(format!(
            "invalid magic bytes {magic:02X?}, expected TSRA"
        )));
    }

    let version = r.read_u16::<LittleEndian>().map_err(truncated)?;
    if version != TSRA_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let flags = ContainerFlags(r.read_u16::<LittleEndian>().map_err(truncated)?);
    let sample_rate = r.read_u32::<LittleEndian>().map_err(truncated)?;
    let channels = r.read_u16::<LittleEndian>().map_err(truncated)?;
    let n_codebooks = r.read_u16::<LittleEndian>().map_err(truncated)?;
    let original_length = r.read_u64::<LittleEndian>().map_err(truncated)?;
    let frame_length = r.read_u32::<LittleEndian>().map_err(truncated)?;
    let hop = r.read_u32::<LittleEndian>().map_err(truncated)?;
    let downsampling_ratio = r.read_u32::<LittleEndian>().map_err(truncated)?;
    let codebook_size = r.read_u32::<LittleEndian>().map_err(truncated)?;
    let input_db = r.read_f32::<LittleEndian>().map_err(truncated)?;
    let target_db = r.read_f32::<LittleEndian>().map_err(truncated)?;

    let padding_byte = r.read_u8().map_err(truncated)?;
    let padding = PaddingMode::from_u8(padding_byte)
        .ok_or_else(|| corrupt(format!("unknown padding mode 0x{padding_byte:02X}")))?;

    let mut reserved = [0u8; 7];
    r.read_exact(&mut reserved).map_err(truncated)?;

    let mut hash = [0u8; 32];
    r.read_exact(&mut hash).map_err(truncated)?;

    let mut reserved_tail = [0u8; 8];
    r.read_exact(&mut reserved_tail).map_err(truncated)?;

    if reserved.iter().chain(reserved_tail.iter()).any(|&b| b != 0) {
        tracing::warn!("Container header has non-zero reserved bytes; ignoring them");
    }

    let header = ContainerHeader {
        version,
        flags,
        sample_rate,
        channels,
        n_codebooks,
        original_length,
        frame_length,
        hop,
        downsampling_ratio,
        codebook_size,
        input_db,
        target_db,
        padding,
    };
    header.check().map_err(FormatError::CorruptContainer)?;

    Ok((header, hash))
}

/// Validate and decode the chunk section that follows the header.
fn read_chunk_section(
    hashed_header: &[u8],
    section: &[u8],
    header: &ContainerHeader,
    stored_hash: &[u8; 32],
) -> Result<Vec<CodeChunk>> {
    let original_length = usize::try_from(header.original_length)
        .map_err(|_| corrupt(format!("original length {} is not addressable", header.original_length)))?;
    let planned = window_count(
        original_length,
        header.frame_length as usize,
        header.hop as usize,
    )
    .map_err(|e| corrupt(e.to_string()))?;

    let mut r = Cursor::new(section);
    let count = r.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    if count != planned {
        return Err(corrupt(format!(
            "original length {} with frame {} and hop {} implies {} chunks, container holds {}",
            header.original_length, header.frame_length, header.hop, planned, count
        )));
    }

    let codes_per_chunk = header
        .codes_per_chunk()
        .ok_or_else(|| corrupt("chunk shape overflows"))?;
    let expected_len = codes_per_chunk
        .checked_mul(2)
        .and_then(|codes| codes.checked_add(4))
        .and_then(|record| record.checked_mul(count))
        .and_then(|records| records.checked_add(4))
        .ok_or_else(|| corrupt("declared chunk section size overflows"))?;

    if section.len() < expected_len {
        return Err(corrupt(format!(
            "chunk section truncated: {} bytes present, {} expected",
            section.len(),
            expected_len
        )));
    }
    if section.len() > expected_len {
        return Err(corrupt(format!(
            "{} trailing bytes after the last chunk",
            section.len() - expected_len
        )));
    }

    let computed = integrity_hash(hashed_header, section);
    if computed.as_bytes() != stored_hash {
        return Err(corrupt(format!(
            "checksum mismatch: expected {}, got {}",
            blake3::Hash::from(*stored_hash).to_hex(),
            computed.to_hex()
        )));
    }

    let channels = header.channels as usize;
    let n_codebooks = header.n_codebooks as usize;
    let frames = header.code_frames();

    let mut chunks = Vec::with_capacity(count);
    for index in 0..count {
        let true_length = r.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let mut codes = vec![0u16; codes_per_chunk];
        r.read_u16_into::<LittleEndian>(&mut codes)
            .map_err(truncated)?;

        tracing::trace!(index, true_length, "Parsed chunk record");
        chunks.push(CodeChunk {
            true_length,
            channels,
            n_codebooks,
            frames,
            codes,
        });
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::serialize;

    /// Re-seal `bytes` after a deliberate edit so only the edit is under test.
    fn reseal(bytes: &mut [u8]) {
        let hash = integrity_hash(&bytes[..HASHED_HEADER_LEN], &bytes[HEADER_SIZE..]);
        bytes[56..88].copy_from_slice(hash.as_bytes());
    }

    fn container(original_length: u64, frame_length: u32, hop: u32) -> CompressedContainer {
        let header = ContainerHeader {
            version: TSRA_VERSION,
            flags: ContainerFlags::new(),
            sample_rate: 16000,
            channels: 1,
            n_codebooks: 3,
            original_length,
            frame_length,
            hop,
            downsampling_ratio: 4,
            codebook_size: 256,
            input_db: -30.0,
            target_db: -16.0,
            padding: PaddingMode::Zero,
        };
        let frames = header.code_frames();
        let chunks = crate::plan::plan(original_length as usize, frame_length as usize, hop as usize)
            .unwrap()
            .iter()
            .map(|w| {
                let codes = (0..3 * frames).map(|i| ((i + w.index) % 256) as u16).collect();
                CodeChunk::new(w.true_length, 1, 3, frames, codes).unwrap()
            })
            .collect();
        CompressedContainer::new(header, chunks).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let original = container(50, 16, 12);
        let bytes = serialize(&original).unwrap();
        let parsed = deserialize(&bytes).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_read_from_reader() {
        let original = container(16, 16, 16);
        let bytes = serialize(&original).unwrap();
        let parsed = read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.tsra");
        let original = container(33, 8, 8);
        original.save(&path).unwrap();

        assert_eq!(load(&path).unwrap(), original);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = serialize(&container(16, 16, 16)).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::CorruptContainer(msg)) if msg.contains("magic")
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = serialize(&container(16, 16, 16)).unwrap();
        bytes[4] = 99;
        bytes[5] = 0;
        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_original_length_inconsistent_with_chunk_count() {
        // 40 samples at frame/hop 8 is 5 chunks; claim 80 samples (10 chunks).
        let mut bytes = serialize(&container(40, 8, 8)).unwrap();
        bytes[16..24].copy_from_slice(&80u64.to_le_bytes());
        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::CorruptContainer(msg)) if msg.contains("implies 10 chunks")
        ));
    }

    #[test]
    fn test_zero_header_field_rejected() {
        let mut bytes = serialize(&container(16, 16, 16)).unwrap();
        // sample_rate at [8..12]
        bytes[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::CorruptContainer(msg)) if msg.contains("sample rate")
        ));
    }

    #[test]
    fn test_unknown_padding_mode_rejected() {
        let mut bytes = serialize(&container(16, 16, 16)).unwrap();
        bytes[48] = 7;
        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::CorruptContainer(msg)) if msg.contains("padding")
        ));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = serialize(&container(50, 16, 12)).unwrap();
        for len in [0, 10, HEADER_SIZE, HEADER_SIZE + 3, bytes.len() - 1] {
            assert!(
                matches!(
                    deserialize(&bytes[..len]),
                    Err(FormatError::CorruptContainer(_))
                ),
                "length {len} should be rejected"
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = serialize(&container(16, 16, 16)).unwrap();
        bytes.extend_from_slice(&[0, 0]);
        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::CorruptContainer(msg)) if msg.contains("trailing")
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = serialize(&container(16, 16, 16)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::CorruptContainer(msg)) if msg.contains("checksum")
        ));
    }

    #[test]
    fn test_flipped_header_byte_rejected() {
        let original = container(16, 16, 16);
        // input_db at [40..44], sample rate at [8..12], a reserved byte at 50.
        for at in [42, 9, 50] {
            let mut bytes = serialize(&original).unwrap();
            bytes[at] ^= 0x01;
            assert!(
                matches!(
                    deserialize(&bytes),
                    Err(FormatError::CorruptContainer(msg)) if msg.contains("checksum")
                ),
                "flip at byte {at} should be rejected"
            );
        }
    }

    #[test]
    fn test_nan_input_db_rejected() {
        let mut bytes = serialize(&container(16, 16, 16)).unwrap();
        bytes[40..44].copy_from_slice(&f32::NAN.to_le_bytes());
        reseal(&mut bytes);
        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::CorruptContainer(msg)) if msg.contains("finite")
        ));
    }

    #[test]
    fn test_out_of_range_code_rejected() {
        let mut bytes = serialize(&container(16, 16, 16)).unwrap();
        // First code follows the count prefix and the true length; codebook size is 256.
        let at = HEADER_SIZE + 8;
        bytes[at..at + 2].copy_from_slice(&300u16.to_le_bytes());
        reseal(&mut bytes);

        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::CorruptContainer(msg)) if msg.contains("outside codebook")
        ));
    }

    #[test]
    fn test_wrong_true_length_rejected() {
        let mut bytes = serialize(&container(16, 16, 16)).unwrap();
        // true_length of the single chunk sits right after the count prefix.
        let at = HEADER_SIZE + 4;
        bytes[at..at + 4].copy_from_slice(&15u32.to_le_bytes());
        reseal(&mut bytes);

        assert!(matches!(
            deserialize(&bytes),
            Err(FormatError::CorruptContainer(msg)) if msg.contains("plan expects")
        ));
    }
}

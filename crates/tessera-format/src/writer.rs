//! Container writer: serializes a [`CompressedContainer`] into the `.tsra` layout.
//!
//! # Binary Layout
//!
//! - **Header** (96 bytes): magic, version, flags, audio and planning
//!   parameters, and a BLAKE3 hash over the first 56 header bytes and the
//!   chunk section
//! - **Chunk section**: a `u32` chunk count followed by one record per window,
//!   each a `u32` true length and `channels * n_codebooks * ceil(L / R)` codes
//!   as `u16`
//!
//! Window boundaries are not stored. The reader replays the planner with the
//! header's `(original_length, frame_length, hop)`.

use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::container::CompressedContainer;
use crate::error::{FormatError, Result};
use crate::header::{
    ContainerHeader, HASHED_HEADER_LEN, HEADER_SIZE, TSRA_MAGIC, TSRA_VERSION,
};

/// Serialize a container to a byte vector.
///
/// # Errors
///
/// Returns [`FormatError::InvalidConfiguration`] if the container violates an
/// invariant (the reader would reject the bytes), or if a value does not fit
/// its on-disk field.
pub fn serialize(container: &CompressedContainer) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 4 + container.code_count() * 2);
    write_to(&mut buf, container)?;
    Ok(buf)
}

/// Serialize a container into any writer.
pub fn write_to<W: Write>(writer: &mut W, container: &CompressedContainer) -> Result<()> {
    if container.header.version != TSRA_VERSION {
        return Err(FormatError::InvalidConfiguration(format!(
            "cannot write version {} containers (writer emits version {})",
            container.header.version, TSRA_VERSION
        )));
    }
    container
        .check()
        .map_err(FormatError::InvalidConfiguration)?;

    let section = chunk_section(container)?;
    let mut prefix = Vec::with_capacity(HASHED_HEADER_LEN);
    write_header_fields(&mut prefix, &container.header)?;
    let hash = integrity_hash(&prefix, &section);

    writer.write_all(&prefix)?;
    // [56..88]: Integrity hash
    writer.write_all(hash.as_bytes())?;
    // [88..96]: Reserved
    writer.write_all(&[0u8; HEADER_SIZE - HASHED_HEADER_LEN - 32])?;
    writer.write_all(&section)?;

    tracing::debug!(
        chunks = container.chunks.len(),
        section_size = section.len(),
        hash = %hash.to_hex(),
        "Serialized container"
    );
    Ok(())
}

/// Write the container to `path`.
///
/// The file is created (or truncated) in place. Callers that need readers to
/// never observe a partial file should write to a sibling path and rename.
pub fn save(container: &CompressedContainer, path: &Path) -> Result<()> {
    tracing::info!(path = %path.display(), "Writing container");

    let bytes = serialize(container)?;
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;

    tracing::info!(
        path = %path.display(),
        chunks = container.chunks.len(),
        file_size = bytes.len(),
        "Container written"
    );
    Ok(())
}

/// BLAKE3 over the hashed header prefix followed by the chunk section.
pub(crate) fn integrity_hash(prefix: &[u8], section: &[u8]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prefix);
    hasher.update(section);
    hasher.finalize()
}

/// Encode the chunk section: count prefix followed by every chunk record.
fn chunk_section(container: &CompressedContainer) -> Result<Vec<u8>> {
    let count = u32::try_from(container.chunks.len()).map_err(|_| {
        FormatError::InvalidConfiguration(format!(
            "{} chunks exceed the u32 chunk count field",
            container.chunks.len()
        ))
    })?;

    let mut section = Vec::with_capacity(4 + container.chunks.len() * 4 + container.code_count() * 2);
    section.write_u32::<LittleEndian>(count)?;

    for chunk in &container.chunks {
        // true_length <= frame_length, which is a u32 field
        section.write_u32::<LittleEndian>(chunk.true_length as u32)?;
        for &code in &chunk.codes {
            section.write_u16::<LittleEndian>(code)?;
        }
    }
    Ok(section)
}

/// Write header bytes `[0..56]`, everything ahead of the hash.
fn write_header_fields<W: Write>(writer: &mut W, header: &ContainerHeader) -> Result<()> {
    // [0..4]: Magic bytes
    writer.write_all(&TSRA_MAGIC)?;
    // [4..6]: Version
    writer.write_u16::<LittleEndian>(header.version)?;
    // [6..8]: Flags
    writer.write_u16::<LittleEndian>(header.flags.0)?;
    // [8..12]: Sample rate
    writer.write_u32::<LittleEndian>(header.sample_rate)?;
    // [12..14]: Channels
    writer.write_u16::<LittleEndian>(header.channels)?;
    // [14..16]: Codebooks
    writer.write_u16::<LittleEndian>(header.n_codebooks)?;
    // [16..24]: Original length
    writer.write_u64::<LittleEndian>(header.original_length)?;
    // [24..28]: Frame length
    writer.write_u32::<LittleEndian>(header.frame_length)?;
    // [28..32]: Hop
    writer.write_u32::<LittleEndian>(header.hop)?;
    // [32..36]: Downsampling ratio
    writer.write_u32::<LittleEndian>(header.downsampling_ratio)?;
    // [36..40]: Codebook size
    writer.write_u32::<LittleEndian>(header.codebook_size)?;
    // [40..48]: Loudness
    writer.write_f32::<LittleEndian>(header.input_db)?;
    writer.write_f32::<LittleEndian>(header.target_db)?;
    // [48]: Padding mode
    writer.write_u8(header.padding as u8)?;
    // [49..56]: Reserved
    writer.write_all(&[0u8; 7])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::CodeChunk;
    use crate::header::{ContainerFlags, PaddingMode};

    use byteorder::ReadBytesExt;
    use std::io::{Cursor, Read};

    fn container() -> CompressedContainer {
        let header = ContainerHeader {
            version: TSRA_VERSION,
            flags: ContainerFlags(ContainerFlags::LOUDNESS_NORMALIZED),
            sample_rate: 44100,
            channels: 2,
            n_codebooks: 2,
            original_length: 10,
            frame_length: 8,
            hop: 8,
            downsampling_ratio: 4,
            codebook_size: 1024,
            input_db: -23.5,
            target_db: -16.0,
            padding: PaddingMode::Reflect,
        };
        let chunks = vec![
            CodeChunk::new(8, 2, 2, 2, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap(),
            CodeChunk::new(2, 2, 2, 2, vec![1023, 0, 0, 0, 0, 0, 0, 9]).unwrap(),
        ];
        CompressedContainer::new(header, chunks).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let bytes = serialize(&container()).unwrap();
        let mut r = Cursor::new(&bytes);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).unwrap();
        assert_eq!(magic, TSRA_MAGIC);
        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), TSRA_VERSION);
        assert_eq!(
            r.read_u16::<LittleEndian>().unwrap(),
            ContainerFlags::LOUDNESS_NORMALIZED
        );
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 44100);
        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), 2);
        assert_eq!(r.read_u16::<LittleEndian>().unwrap(), 2);
        assert_eq!(r.read_u64::<LittleEndian>().unwrap(), 10);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 8);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 8);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 4);
        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 1024);
        assert_eq!(r.read_f32::<LittleEndian>().unwrap(), -23.5);
        assert_eq!(r.read_f32::<LittleEndian>().unwrap(), -16.0);
        assert_eq!(r.read_u8().unwrap(), PaddingMode::Reflect as u8);

        let mut reserved = [0u8; 7];
        r.read_exact(&mut reserved).unwrap();
        assert_eq!(reserved, [0u8; 7]);
        assert_eq!(r.position(), 56);
    }

    #[test]
    fn test_chunk_section_layout_and_hash() {
        let bytes = serialize(&container()).unwrap();
        let section = &bytes[HEADER_SIZE..];

        // count + 2 * (true_length + 8 codes)
        assert_eq!(section.len(), 4 + 2 * (4 + 8 * 2));
        assert_eq!(u32::from_le_bytes(section[0..4].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(section[4..8].try_into().unwrap()), 8);
        assert_eq!(u16::from_le_bytes(section[8..10].try_into().unwrap()), 1);

        let stored: [u8; 32] = bytes[56..88].try_into().unwrap();
        let mut hasher = blake3::Hasher::new();
        hasher.update(&bytes[..HASHED_HEADER_LEN]);
        hasher.update(section);
        assert_eq!(stored, *hasher.finalize().as_bytes());
        assert_eq!(bytes[88..HEADER_SIZE], [0u8; 8]);
    }

    #[test]
    fn test_file_size_matches_expected() {
        let c = container();
        let bytes = serialize(&c).unwrap();
        let per_chunk = 4 + c.header.codes_per_chunk().unwrap() * 2;
        assert_eq!(bytes.len(), HEADER_SIZE + 4 + c.chunks.len() * per_chunk);
    }

    #[test]
    fn test_save_writes_serialized_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsra");
        let c = container();

        save(&c, &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), serialize(&c).unwrap());
    }

    #[test]
    fn test_inconsistent_container_rejected() {
        let mut c = container();
        c.chunks.pop();
        assert!(matches!(
            serialize(&c),
            Err(FormatError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_foreign_version_rejected() {
        let mut c = container();
        c.header.version = 2;
        assert!(matches!(
            serialize(&c),
            Err(FormatError::InvalidConfiguration(_))
        ));
    }
}

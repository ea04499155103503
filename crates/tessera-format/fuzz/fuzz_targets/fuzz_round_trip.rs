//! Fuzz target for serialize → deserialize round-trip.
//!
//! Derives a small valid container from the fuzz input, writes it and reads
//! it back, and checks the result is identical.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_format::{
    code_frames, plan, CodeChunk, CompressedContainer, ContainerFlags, ContainerHeader,
    PaddingMode, TSRA_VERSION,
};

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let original_length = u16::from_le_bytes([data[0], data[1]]) as usize % 4096 + 1;
    let frame_length = data[2] as usize % 512 + 1;
    let hop = data[3] as usize % frame_length + 1;
    let ratio = data[4] as usize % 64 + 1;
    let channels = data[5] as usize % 2 + 1;
    let n_codebooks = data[6] as usize % 4 + 1;
    let codebook_size = (data[7] as u32 % 16 + 1) * 64;

    let windows = match plan(original_length, frame_length, hop) {
        Ok(w) => w,
        Err(_) => return,
    };
    let frames = code_frames(frame_length, ratio);
    let per_chunk = channels * n_codebooks * frames;
    let chunks: Vec<CodeChunk> = windows
        .iter()
        .map(|w| {
            let codes = (0..per_chunk)
                .map(|j| {
                    let b = data[(8 + w.index + j) % data.len()] as u32;
                    (b * 7 % codebook_size) as u16
                })
                .collect();
            CodeChunk::new(w.true_length, channels, n_codebooks, frames, codes)
                .expect("shape derived from plan")
        })
        .collect();

    let header = ContainerHeader {
        version: TSRA_VERSION,
        flags: ContainerFlags::new(),
        sample_rate: 16000,
        channels: channels as u16,
        n_codebooks: n_codebooks as u16,
        original_length: original_length as u64,
        frame_length: frame_length as u32,
        hop: hop as u32,
        downsampling_ratio: ratio as u32,
        codebook_size,
        input_db: 0.0,
        target_db: 0.0,
        padding: if data[0] & 1 == 0 {
            PaddingMode::Zero
        } else {
            PaddingMode::Reflect
        },
    };
    let container = CompressedContainer::new(header, chunks).expect("container built from plan");

    let bytes = container.to_bytes().expect("valid container serializes");
    let parsed = CompressedContainer::from_bytes(&bytes).expect("round trip parses");
    assert_eq!(parsed, container);
});

//! Reassembles per-window results into timeline order.
//!
//! Workers finish in any order. Code chunks are simply sorted back into
//! window order; decoded samples are laid onto the output timeline, with
//! overlapping spans of consecutive windows blended by a linear crossfade.
//!
//! Every window's contribution is weighted by a fade-in over the span it
//! shares with its predecessor and a fade-out over the span it shares with its
//! successor. The accumulated weights are divided out at the end, so
//! positions covered by three or more windows (hop below half the frame
//! length) still sum to unity.

use tessera_format::{CodeChunk, Window};

use crate::error::{CodecError, Result};

/// Weight pairs `(earlier, later)` across an overlap of `overlap` samples.
/// Each pair sums to 1; the earlier window fades out while the later one
/// fades in.
pub fn crossfade_weights(overlap: usize) -> Vec<(f32, f32)> {
    (0..overlap)
        .map(|j| {
            let t = ramp(j, overlap);
            (1.0 - t, t)
        })
        .collect()
}

/// Rising ramp sampled at half-sample offsets, so neither end reaches 0 or 1.
fn ramp(j: usize, len: usize) -> f32 {
    (j as f32 + 0.5) / len as f32
}

/// Put windowed results back in plan order and check none is missing or
/// duplicated.
fn order<T>(mut results: Vec<(Window, T)>) -> Result<Vec<(Window, T)>> {
    results.sort_by_key(|(w, _)| w.index);
    if let Some((pos, (w, _))) = results
        .iter()
        .enumerate()
        .find(|(pos, (w, _))| w.index != *pos)
    {
        return Err(CodecError::InvalidConfiguration(format!(
            "expected window {pos}, found window {}",
            w.index
        )));
    }
    Ok(results)
}

/// Order code chunks by window index.
///
/// # Errors
///
/// Returns [`CodecError::InvalidConfiguration`] if the window indices are not
/// exactly `0..n`.
pub fn merge_codes(results: Vec<(Window, CodeChunk)>) -> Result<Vec<CodeChunk>> {
    Ok(order(results)?.into_iter().map(|(_, c)| c).collect())
}

/// Lay decoded windows onto a `channels x total` timeline, crossfading
/// overlaps.
///
/// Each entry holds one vector per channel of exactly `window.true_length`
/// samples.
///
/// # Errors
///
/// Returns [`CodecError::InvalidConfiguration`] if indices are not `0..n`, a
/// window's data has the wrong shape or extends past `total`, or some sample
/// is covered by no window.
pub fn merge_samples(
    total: usize,
    channels: usize,
    results: Vec<(Window, Vec<Vec<f32>>)>,
) -> Result<Vec<Vec<f32>>> {
    let results = order(results)?;
    let mut out = vec![vec![0.0f32; total]; channels];
    let mut weight_sum = vec![0.0f32; total];

    for (i, (window, data)) in results.iter().enumerate() {
        if window.end() > total {
            return Err(CodecError::InvalidConfiguration(format!(
                "window {} ends at {}, past the {total}-sample timeline",
                window.index,
                window.end()
            )));
        }
        if data.len() != channels || data.iter().any(|ch| ch.len() != window.true_length) {
            return Err(CodecError::InvalidConfiguration(format!(
                "window {} data does not have {channels} channels of {} samples",
                window.index, window.true_length
            )));
        }

        let fade_in = match i.checked_sub(1) {
            Some(prev) => crossfade_weights(results[prev].0.overlap_with(window)),
            None => Vec::new(),
        };
        let fade_out = results
            .get(i + 1)
            .map_or_else(Vec::new, |(next, _)| crossfade_weights(window.overlap_with(next)));
        let fade_out_start = window.true_length - fade_out.len().min(window.true_length);

        for j in 0..window.true_length {
            let mut w = 1.0;
            if let Some(&(_, rising)) = fade_in.get(j) {
                w *= rising;
            }
            if j >= fade_out_start {
                w *= fade_out[j - fade_out_start].0;
            }
            let pos = window.start + j;
            weight_sum[pos] += w;
            for (dst, src) in out.iter_mut().zip(data) {
                dst[pos] += w * src[j];
            }
        }
    }

    if let Some(pos) = weight_sum.iter().position(|&w| w <= 0.0) {
        return Err(CodecError::InvalidConfiguration(format!(
            "sample {pos} is not covered by any window"
        )));
    }
    for ch in &mut out {
        for (s, &w) in ch.iter_mut().zip(&weight_sum) {
            *s /= w;
        }
    }
    Ok(out)
}

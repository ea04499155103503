//! Window planning: splits a timeline of `N` samples into fixed-length frames.
//!
//! Every window handed to the transform is exactly `frame_length` samples long.
//! Windows start at `0, hop, 2 * hop, …` while the start lies inside the
//! timeline; the tail of a window that runs past the end is padded and its
//! `true_length` records how much of it is real audio.
//!
//! ```text
//! N = 10, L = 4, H = 4        N = 10, L = 4, H = 2
//! [0..4)                      [0..4)
//!     [4..8)                    [2..6)
//!         [8..10)+pad 2             [4..8)
//!                                     [6..10)
//!                                       [8..10)+pad 2
//! ```
//!
//! Planning is a pure function of `(N, L, H)`. Containers store only those
//! three numbers and replay the plan on decompression, so the sequence must
//! never depend on anything else.

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};

/// A contiguous slice of the input timeline processed as one transform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Position of this window in the plan (0-based).
    pub index: usize,
    /// Offset of the first sample in the original timeline.
    pub start: usize,
    /// Padded length handed to the transform (always the frame length).
    pub length: usize,
    /// Number of real samples covered, `<= length`.
    pub true_length: usize,
}

impl Window {
    /// Number of padding samples appended after the real audio.
    pub fn padding(&self) -> usize {
        self.length - self.true_length
    }

    /// Exclusive end of the real audio in the original timeline.
    pub fn end(&self) -> usize {
        self.start + self.true_length
    }

    /// Number of samples this window shares with `next`, which must start later.
    pub fn overlap_with(&self, next: &Window) -> usize {
        self.end().min(next.end()).saturating_sub(next.start)
    }
}

fn validate(total_samples: usize, frame_length: usize, hop: usize) -> Result<()> {
    if frame_length == 0 {
        return Err(FormatError::InvalidConfiguration(
            "frame length must be greater than zero".into(),
        ));
    }
    if hop == 0 || hop > frame_length {
        return Err(FormatError::InvalidConfiguration(format!(
            "hop must satisfy 0 < hop <= frame length (hop {hop}, frame length {frame_length})"
        )));
    }
    if total_samples == 0 {
        return Err(FormatError::InvalidConfiguration(
            "cannot plan windows for an empty buffer".into(),
        ));
    }
    Ok(())
}

/// Number of windows [`plan`] yields for `(total_samples, frame_length, hop)`.
///
/// Computed in closed form so callers can validate stored chunk counts without
/// materializing the plan.
pub fn window_count(total_samples: usize, frame_length: usize, hop: usize) -> Result<usize> {
    validate(total_samples, frame_length, hop)?;
    if total_samples <= frame_length {
        Ok(1)
    } else {
        Ok(total_samples.div_ceil(hop))
    }
}

/// Compute the ordered windows covering `[0, total_samples)`.
///
/// # Errors
///
/// Returns [`FormatError::InvalidConfiguration`] unless
/// `frame_length > 0`, `0 < hop <= frame_length` and `total_samples > 0`.
pub fn plan(total_samples: usize, frame_length: usize, hop: usize) -> Result<Vec<Window>> {
    let count = window_count(total_samples, frame_length, hop)?;

    let windows: Vec<Window> = (0..count)
        .map(|index| {
            let start = index * hop;
            Window {
                index,
                start,
                length: frame_length,
                true_length: frame_length.min(total_samples - start),
            }
        })
        .collect();

    tracing::trace!(
        total_samples,
        frame_length,
        hop,
        windows = windows.len(),
        "Planned windows"
    );

    Ok(windows)
}

/// Number of code frames the transform emits for `frame_length` samples at
/// downsampling ratio `ratio` (samples per code frame).
pub fn code_frames(frame_length: usize, ratio: usize) -> usize {
    frame_length.div_ceil(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_seconds_without_overlap() {
        let windows = plan(44100 * 4, 44100, 44100).unwrap();
        assert_eq!(windows.len(), 4);
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.index, i);
            assert_eq!(w.start, i * 44100);
            assert_eq!(w.length, 44100);
            assert_eq!(w.true_length, 44100);
            assert_eq!(w.padding(), 0);
        }
    }

    #[test]
    fn test_short_buffer_single_padded_window() {
        let windows = plan(100, 44100, 44100).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, 0);
        assert_eq!(windows[0].true_length, 100);
        assert_eq!(windows[0].length, 44100);
        assert_eq!(windows[0].padding(), 44000);
    }

    #[test]
    fn test_exact_frame_length_single_window() {
        let windows = plan(512, 512, 256).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].padding(), 0);
    }

    #[test]
    fn test_final_window_is_padded() {
        let windows = plan(10, 4, 4).unwrap();
        let spans: Vec<(usize, usize)> = windows.iter().map(|w| (w.start, w.true_length)).collect();
        assert_eq!(spans, vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(windows[2].padding(), 2);
    }

    #[test]
    fn test_overlapping_plan() {
        let windows = plan(10, 4, 2).unwrap();
        let starts: Vec<usize> = windows.iter().map(|w| w.start).collect();
        assert_eq!(starts, vec![0, 2, 4, 6, 8]);
        assert_eq!(windows[0].overlap_with(&windows[1]), 2);
        assert_eq!(windows[3].overlap_with(&windows[4]), 2);
        assert_eq!(windows[4].true_length, 2);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let a = plan(1_234_567, 44100, 33075).unwrap();
        let b = plan(1_234_567, 44100, 33075).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_plan_covers_timeline_exactly() {
        for &(n, l, h) in &[(1, 1, 1), (99, 10, 3), (100, 10, 10), (101, 10, 7), (5000, 512, 384)] {
            let windows = plan(n, l, h).unwrap();
            let mut covered = vec![false; n];
            let mut last_start = None;
            for w in &windows {
                assert!(w.end() <= n, "window {w:?} runs past {n}");
                assert!(w.true_length > 0);
                if let Some(prev) = last_start {
                    assert!(w.start > prev, "starts must strictly increase");
                }
                last_start = Some(w.start);
                covered[w.start..w.end()].iter_mut().for_each(|c| *c = true);
            }
            assert!(covered.iter().all(|&c| c), "gap in plan for {n}/{l}/{h}");
        }
    }

    #[test]
    fn test_window_count_matches_plan() {
        for &(n, l, h) in &[(1, 8, 8), (8, 8, 8), (9, 8, 8), (17, 8, 3), (1000, 64, 1)] {
            assert_eq!(window_count(n, l, h).unwrap(), plan(n, l, h).unwrap().len());
        }
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(matches!(plan(10, 0, 1), Err(FormatError::InvalidConfiguration(_))));
        assert!(matches!(plan(10, 4, 0), Err(FormatError::InvalidConfiguration(_))));
        assert!(matches!(plan(10, 4, 5), Err(FormatError::InvalidConfiguration(_))));
        assert!(matches!(plan(0, 4, 4), Err(FormatError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_code_frames_rounds_up() {
        assert_eq!(code_frames(44100, 512), 87);
        assert_eq!(code_frames(1024, 512), 2);
        assert_eq!(code_frames(1, 512), 1);
    }
}

//! Loudness normalization applied before encoding.
//!
//! The level is the RMS over every sample of every channel, in dBFS (a full
//! scale sine reads about −3 dB). The measured level is stored in the
//! container so decompression can restore the original gain.
//!
//! The gain is capped so no sample leaves `[-1, 1]`. When the cap engages the
//! recorded target is the level actually reached, which keeps the stored pair
//! an exact description of the applied gain.

use crate::buffer::AudioBuffer;

/// Levels at or below this are treated as silence and never scaled.
pub const SILENCE_FLOOR_DB: f32 = -120.0;

/// Outcome of [`normalize`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Level of the input before scaling, dBFS.
    pub input_db: f32,
    /// Level after scaling, dBFS. Below the requested level when the peak
    /// limit engaged.
    pub target_db: f32,
    /// Whether a gain was actually applied.
    pub applied: bool,
}

/// RMS level of the whole buffer in dBFS. Empty or silent buffers yield
/// `-inf`.
pub fn level_db(audio: &AudioBuffer) -> f32 {
    let count = audio.len() * audio.num_channels();
    if count == 0 {
        return f32::NEG_INFINITY;
    }
    let sum_sq: f64 = audio
        .channels()
        .iter()
        .flat_map(|ch| ch.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    let rms = (sum_sq / count as f64).sqrt();
    (20.0 * rms.log10()) as f32
}

/// Largest absolute sample over every channel.
pub fn peak(audio: &AudioBuffer) -> f32 {
    audio
        .channels()
        .iter()
        .flat_map(|ch| ch.iter())
        .fold(0.0f32, |acc, &s| acc.max(s.abs()))
}

/// Linear gain that moves a signal from `from_db` to `to_db`.
pub fn db_to_gain(from_db: f32, to_db: f32) -> f32 {
    10f32.powf((to_db - from_db) / 20.0)
}

/// Scale `audio` in place so its level becomes `target_db`, without pushing
/// the peak past full scale.
///
/// Silent or non-finite input is left untouched and reported with
/// `applied: false`.
pub fn normalize(audio: &mut AudioBuffer, target_db: f32) -> Normalization {
    let input_db = level_db(audio);
    if !input_db.is_finite() || input_db <= SILENCE_FLOOR_DB || !target_db.is_finite() {
        tracing::debug!(input_db, "input below silence floor, skipping normalization");
        return Normalization {
            input_db,
            target_db,
            applied: false,
        };
    }

    let mut gain = db_to_gain(input_db, target_db);
    let mut reached_db = target_db;
    let scaled_peak = peak(audio) * gain;
    if scaled_peak > 1.0 {
        gain /= scaled_peak;
        reached_db = target_db - 20.0 * scaled_peak.log10();
        tracing::debug!(
            requested_db = target_db,
            reached_db,
            "peak limit lowered normalization gain"
        );
    }
    audio.apply_gain(gain);
    tracing::debug!(input_db, target_db = reached_db, gain, "normalized input loudness");
    Normalization {
        input_db,
        target_db: reached_db,
        applied: true,
    }
}

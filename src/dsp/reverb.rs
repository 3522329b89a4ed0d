//! Reverb tail generation
//!
//! Produces the synthetic tail that gets layered onto the end of a track:
//! - `Sine`: a full-scale 440 Hz tone
//! - `Silent`: zero amplitude (the placeholder "convolution" mode)
//!
//! [`render_tail`] builds the faded tail the pipeline mixes in, cut to the
//! length of the track it lands on. [`generate`] and [`fade_out`] are the
//! un-faded tail and the same fade applied to any buffer.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::{db_to_linear, frames_for_duration, sample_range};
use crate::engine::{PcmBuffer, PcmFormat};
use crate::error::{Result, SlowverbError};

// ============================================================================
// Constants
// ============================================================================

/// Frequency of the sine tail (Hz)
pub const TONE_FREQUENCY_HZ: f64 = 440.0;

/// Gain reached at the very end of a fade-out (dB)
pub const FADE_FLOOR_DB: f64 = -120.0;

// ============================================================================
// Reverb Type
// ============================================================================

/// Kind of synthetic tail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReverbType {
    /// Continuous 440 Hz tone
    #[default]
    Sine,
    /// Zero-amplitude tail
    #[serde(alias = "convolution")]
    Silent,
}

impl fmt::Display for ReverbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReverbType::Sine => write!(f, "sine"),
            ReverbType::Silent => write!(f, "silent"),
        }
    }
}

impl FromStr for ReverbType {
    type Err = SlowverbError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sine" => Ok(ReverbType::Sine),
            "silent" | "convolution" => Ok(ReverbType::Silent),
            _ => Err(SlowverbError::UnsupportedReverbType {
                name: name.to_string(),
            }),
        }
    }
}

// ============================================================================
// Generation
// ============================================================================

fn check_duration(duration_ms: u32) -> Result<()> {
    if duration_ms == 0 {
        return Err(SlowverbError::invalid_parameter(
            "reverb_duration_ms",
            "must be greater than 0",
        ));
    }
    Ok(())
}

#[inline]
fn tone_sample(index: usize, step: f64, peak: i32) -> i32 {
    ((step * index as f64).sin() * f64::from(peak)).round() as i32
}

/// Generate a mono tail lasting `duration_ms` at the given rate and width
///
/// The tail has `floor(duration_ms * frame_rate / 1000)` frames so it lines
/// up exactly with the reverb window computed by the pipeline.
pub fn generate(
    duration_ms: u32,
    kind: ReverbType,
    frame_rate: u32,
    sample_width: u16,
) -> Result<PcmBuffer> {
    render_tail(duration_ms, kind, frame_rate, sample_width, 0.0, usize::MAX)
}

/// Render the first `max_frames` frames of a faded tail
///
/// The fade is laid out over the full `duration_ms` tail (its last
/// `decay` share), so a cut tail is exactly the head of the full one.
/// Frames past `max_frames` are never allocated.
pub fn render_tail(
    duration_ms: u32,
    kind: ReverbType,
    frame_rate: u32,
    sample_width: u16,
    decay: f64,
    max_frames: usize,
) -> Result<PcmBuffer> {
    check_duration(duration_ms)?;

    let format = PcmFormat {
        frame_rate,
        channels: 1,
        sample_width,
    };
    let total_frames = frames_for_duration(duration_ms, frame_rate);
    let frames = total_frames.min(max_frames);
    let fade_frames = fade_frame_count(total_frames, decay);

    match kind {
        ReverbType::Silent => PcmBuffer::silent(frames, format),
        ReverbType::Sine => {
            let (_, peak) = sample_range(sample_width);
            let step = 2.0 * PI * TONE_FREQUENCY_HZ / f64::from(frame_rate);
            let values: Vec<i32> = (0..frames)
                .map(|i| {
                    let gain = fade_gain(i, total_frames, fade_frames);
                    (f64::from(tone_sample(i, step, peak)) * gain).round() as i32
                })
                .collect();
            PcmBuffer::from_samples(&values, frame_rate, 1, sample_width)
        }
    }
}

/// Frames in the fade window of a `total_frames` tail
///
/// `total_frames * decay`, rounded, never longer than the tail itself.
pub fn fade_frame_count(total_frames: usize, decay: f64) -> usize {
    let fade = (total_frames as f64 * decay.clamp(0.0, 1.0)).round() as usize;
    fade.min(total_frames)
}

/// Gain of frame `index` in a `total_frames` tail whose last `fade_frames`
/// fade out
///
/// Amplitude steps linearly from 1.0 down to the gain of [`FADE_FLOOR_DB`],
/// so halfway through the window the level is about -6 dB.
pub fn fade_gain(index: usize, total_frames: usize, fade_frames: usize) -> f64 {
    let fade_start = total_frames.saturating_sub(fade_frames);
    if fade_frames == 0 || index < fade_start {
        return 1.0;
    }
    let progress = (index - fade_start) as f64 / fade_frames as f64;
    1.0 + (db_to_linear(FADE_FLOOR_DB) - 1.0) * progress
}

/// Fade the last `fade_frames` frames of a buffer out to silence
///
/// Uses the same curve as [`render_tail`]. A zero-length window returns the
/// buffer unchanged; a window longer than the buffer covers all of it.
pub fn fade_out(buffer: &PcmBuffer, fade_frames: usize) -> Result<PcmBuffer> {
    let total_frames = buffer.frame_count();
    let fade_frames = fade_frames.min(total_frames);
    if fade_frames == 0 {
        return Ok(buffer.clone());
    }

    let channels = buffer.channels() as usize;
    let fade_start = total_frames - fade_frames;
    let mut values = buffer.to_samples();

    for (frame, samples) in values.chunks_exact_mut(channels).enumerate().skip(fade_start) {
        let gain = fade_gain(frame, total_frames, fade_frames);
        for sample in samples {
            *sample = (f64::from(*sample) * gain).round() as i32;
        }
    }

    PcmBuffer::from_samples(
        &values,
        buffer.frame_rate(),
        buffer.channels(),
        buffer.sample_width(),
    )
}

//! Time-stretch by frame-rate relabeling
//!
//! The "slowed" effect: the buffer is retagged as if it had been recorded at
//! `rate * factor`, then converted back to the original rate so it plays on
//! any output at its nominal rate. Speed and pitch change together; this is
//! not a pitch-preserving stretch.
//!
//! The conversion back is zero-order hold: every output frame is a verbatim
//! copy of the source frame under it. No sample value is ever interpolated.

use tracing::{debug, instrument};

use crate::engine::PcmBuffer;
use crate::error::{Result, SlowverbError};

/// Largest accepted slowdown factor
pub const MAX_SLOWDOWN_FACTOR: f64 = 2.0;

/// Check a slowdown factor is inside (0, 2.0]
pub fn validate_factor(factor: f64) -> Result<()> {
    // Written so NaN fails too
    if !(factor > 0.0 && factor <= MAX_SLOWDOWN_FACTOR) {
        return Err(SlowverbError::invalid_parameter(
            "slowdown_factor",
            format!(
                "{} is outside (0, {}]",
                factor, MAX_SLOWDOWN_FACTOR
            ),
        ));
    }
    Ok(())
}

/// Slow down (factor < 1) or speed up (factor > 1) a buffer
///
/// The result keeps the input's frame rate, channel count and sample width,
/// and lasts `1 / factor` times as long.
///
/// # Errors
/// `InvalidParameter("slowdown_factor", ..)` if `factor` is outside (0, 2.0]
/// or so small that the relabeled rate rounds down to zero.
#[instrument(skip(buffer), fields(frame_rate = buffer.frame_rate(), frames = buffer.frame_count()))]
pub fn stretch(buffer: &PcmBuffer, factor: f64) -> Result<PcmBuffer> {
    validate_factor(factor)?;

    let original_rate = buffer.frame_rate();
    // Truncated like an integer frame rate field would be
    let relabeled_rate = (f64::from(original_rate) * factor) as u32;
    if relabeled_rate == 0 {
        return Err(SlowverbError::invalid_parameter(
            "slowdown_factor",
            format!("{} relabels {} Hz to 0 Hz", factor, original_rate),
        ));
    }

    let relabeled = buffer.with_frame_rate(relabeled_rate)?;
    let restored = convert_frame_rate(&relabeled, original_rate)?;

    debug!(
        relabeled_rate,
        output_frames = restored.frame_count(),
        "stretch complete"
    );
    Ok(restored)
}

/// Convert a buffer to `target_rate` by repeating or skipping whole frames
///
/// The output has `floor(frames * target_rate / source_rate)` frames and
/// preserves the input's duration.
pub fn convert_frame_rate(buffer: &PcmBuffer, target_rate: u32) -> Result<PcmBuffer> {
    let source_rate = buffer.frame_rate();
    if source_rate == target_rate {
        return Ok(buffer.clone());
    }

    let frame_size = buffer.frame_size();
    let source_frames = buffer.frame_count() as u64;
    let output_frames = source_frames * u64::from(target_rate) / u64::from(source_rate);

    let source = buffer.samples();
    let mut output = Vec::with_capacity(output_frames as usize * frame_size);
    for frame in 0..output_frames {
        // frame < source_frames * target / source, so this stays in bounds
        let source_frame = (frame * u64::from(source_rate) / u64::from(target_rate)) as usize;
        let start = source_frame * frame_size;
        output.extend_from_slice(&source[start..start + frame_size]);
    }

    PcmBuffer::new(output, target_rate, buffer.channels(), buffer.sample_width())
}

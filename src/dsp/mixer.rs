//! Channel mixer
//!
//! Overlays a mono reverb tail onto a buffer. Stereo input is split into
//! mono channels, each channel gets its own copy of the tail, and the two
//! are interleaved back with no cross-channel summing.

use crate::engine::buffer::{decode_sample, encode_sample, sample_range};
use crate::engine::PcmBuffer;
use crate::error::{Result, SlowverbError};

/// Additively mix `tail` into `base` starting at byte offset `at_position`
///
/// Sums are saturated to the sample width's range instead of wrapping. The
/// result is exactly as long as `base`: bytes before `at_position` and after
/// the tail's extent are copied through unchanged, and any part of the tail
/// that would run past the end of `base` is dropped.
///
/// # Errors
/// `InvalidParameter` if the two buffers differ in frame rate, channel count
/// or sample width, or if `at_position` is not on a frame boundary.
pub fn overlay(base: &PcmBuffer, tail: &PcmBuffer, at_position: usize) -> Result<PcmBuffer> {
    if base.format() != tail.format() {
        return Err(SlowverbError::invalid_parameter(
            "tail",
            format!(
                "tail format {:?} does not match base format {:?}",
                tail.format(),
                base.format()
            ),
        ));
    }
    if at_position % base.frame_size() != 0 {
        return Err(SlowverbError::invalid_parameter(
            "at_position",
            format!(
                "byte offset {} is not aligned to {}-byte frames",
                at_position,
                base.frame_size()
            ),
        ));
    }

    let width = base.sample_width() as usize;
    let (min, max) = sample_range(base.sample_width());
    let start = at_position.min(base.byte_len());
    let end = (start + tail.byte_len()).min(base.byte_len());

    let base_bytes = base.samples();
    let mut mixed = Vec::with_capacity(base.byte_len());
    mixed.extend_from_slice(&base_bytes[..start]);

    let region = base_bytes[start..end].chunks_exact(width);
    for (a, b) in region.zip(tail.samples().chunks_exact(width)) {
        let sum = i64::from(decode_sample(a)) + i64::from(decode_sample(b));
        let clamped = sum.clamp(i64::from(min), i64::from(max)) as i32;
        encode_sample(clamped, base.sample_width(), &mut mixed);
    }

    mixed.extend_from_slice(&base_bytes[end..]);

    PcmBuffer::new(mixed, base.frame_rate(), base.channels(), base.sample_width())
}

/// Byte offset that ends a `tail_frames`-long tail flush with the end of
/// `channel`, or 0 when the channel is shorter than the tail
pub fn tail_position(channel: &PcmBuffer, tail_frames: usize) -> usize {
    channel.frame_count().saturating_sub(tail_frames) * channel.frame_size()
}

/// Overlay a mono `tail` onto the last `tail_frames` frames of each channel
///
/// Mono input is overlaid directly. Stereo input is split, overlaid per
/// channel, then re-interleaved so each channel keeps only its own tail.
pub fn apply_tail(buffer: &PcmBuffer, tail: &PcmBuffer, tail_frames: usize) -> Result<PcmBuffer> {
    if tail.channels() != 1 {
        return Err(SlowverbError::invalid_parameter(
            "tail",
            "reverb tails must be mono",
        ));
    }

    if buffer.channels() == 1 {
        return overlay(buffer, tail, tail_position(buffer, tail_frames));
    }

    let processed = buffer
        .split_to_mono()
        .iter()
        .map(|channel| overlay(channel, tail, tail_position(channel, tail_frames)))
        .collect::<Result<Vec<_>>>()?;

    PcmBuffer::from_mono_channels(&processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mono(values: &[i32]) -> PcmBuffer {
        PcmBuffer::from_samples(values, 8000, 1, 2).unwrap()
    }

    // ------------------------------------------------------------------------
    // Overlay
    // ------------------------------------------------------------------------

    #[test]
    fn test_overlay_sums_inside_region_only() {
        let base = mono(&[1, 1, 1, 1, 1]);
        let tail = mono(&[10, 20]);
        let mixed = overlay(&base, &tail, 2 * 2).unwrap();
        assert_eq!(mixed.to_samples(), vec![1, 1, 11, 21, 1]);
    }

    #[test]
    fn test_overlay_saturates() {
        let base = mono(&[32000, -32000]);
        let tail = mono(&[32000, -32000]);
        let mixed = overlay(&base, &tail, 0).unwrap();
        assert_eq!(mixed.to_samples(), vec![32767, -32768]);
    }

    #[test]
    fn test_overlay_truncates_at_base_end() {
        let base = mono(&[0, 0, 0]);
        let tail = mono(&[5, 5, 5, 5, 5]);
        let mixed = overlay(&base, &tail, 0).unwrap();
        assert_eq!(mixed.to_samples(), vec![5, 5, 5]);
        assert_eq!(mixed.frame_count(), base.frame_count());
    }

    #[test]
    fn test_overlay_past_end_is_noop() {
        let base = mono(&[3, 3]);
        let tail = mono(&[9]);
        assert_eq!(overlay(&base, &tail, 100).unwrap(), base);
    }

    #[test]
    fn test_overlay_rejects_misaligned_offset() {
        let base = mono(&[0, 0]);
        let tail = mono(&[1]);
        assert!(overlay(&base, &tail, 1).is_err());
    }

    #[test]
    fn test_overlay_rejects_format_mismatch() {
        let base = mono(&[0, 0]);
        let tail = PcmBuffer::from_samples(&[1], 16000, 1, 2).unwrap();
        assert!(overlay(&base, &tail, 0).is_err());
    }

    #[test]
    fn test_overlay_silence_is_noop() {
        let base = mono(&[7, -7, 300, -300]);
        let tail = mono(&[0, 0, 0]);
        assert_eq!(overlay(&base, &tail, 2).unwrap(), base);
    }

    // ------------------------------------------------------------------------
    // Tail Placement
    // ------------------------------------------------------------------------

    #[test]
    fn test_tail_position_aligns_to_end() {
        let channel = mono(&[0; 10]);
        assert_eq!(tail_position(&channel, 4), 6 * 2);
        assert_eq!(tail_position(&channel, 10), 0);
        assert_eq!(tail_position(&channel, 25), 0);
    }

    #[test]
    fn test_apply_tail_mono() {
        let buffer = mono(&[1, 1, 1, 1]);
        let tail = mono(&[100, 200]);
        let mixed = apply_tail(&buffer, &tail, 2).unwrap();
        assert_eq!(mixed.to_samples(), vec![1, 1, 101, 201]);
    }

    #[test]
    fn test_apply_tail_stereo_keeps_channels_separate() {
        // Left is silent, right carries a distinct pattern
        let stereo = PcmBuffer::from_samples(&[0, 5, 0, 6, 0, 7, 0, 8], 8000, 2, 2).unwrap();
        let tail = mono(&[100, 200]);
        let mixed = apply_tail(&stereo, &tail, 2).unwrap().to_samples();

        let left: Vec<i32> = mixed.iter().step_by(2).copied().collect();
        let right: Vec<i32> = mixed.iter().skip(1).step_by(2).copied().collect();
        assert_eq!(left, vec![0, 0, 100, 200]);
        assert_eq!(right, vec![5, 6, 107, 208]);
    }

    #[test]
    fn test_apply_tail_rejects_stereo_tail() {
        let buffer = mono(&[0; 4]);
        let tail = PcmBuffer::from_samples(&[1, 1], 8000, 2, 2).unwrap();
        assert!(apply_tail(&buffer, &tail, 1).is_err());
    }
}

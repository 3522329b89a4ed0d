//! PCM Buffer
//!
//! Immutable container for decoded audio: interleaved signed little-endian
//! PCM frames plus the frame rate, channel count and sample width that
//! describe them. Transform stages never mutate a buffer in place; they
//! build a new one.

use crate::error::{Result, SlowverbError};

// ============================================================================
// Constants
// ============================================================================

/// Widest supported sample, in bytes (32-bit PCM)
pub const MAX_SAMPLE_WIDTH: u16 = 4;

/// Largest supported channel count (stereo)
pub const MAX_CHANNELS: u16 = 2;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Representable `(min, max)` range of a signed sample `width` bytes wide
#[inline]
pub fn sample_range(width: u16) -> (i32, i32) {
    let bits = u32::from(width.clamp(1, MAX_SAMPLE_WIDTH)) * 8;
    let max = ((1_i64 << (bits - 1)) - 1) as i32;
    (-max - 1, max)
}

/// Decode one signed little-endian sample of `bytes.len()` bytes
#[inline]
pub fn decode_sample(bytes: &[u8]) -> i32 {
    let width = bytes.len();
    let mut raw = [0u8; 4];
    raw[4 - width..].copy_from_slice(bytes);
    // Arithmetic shift sign-extends the top byte
    i32::from_le_bytes(raw) >> (8 * (4 - width))
}

/// Append `value` as a signed little-endian sample `width` bytes wide
///
/// `value` must already be inside [`sample_range`] for `width`.
#[inline]
pub fn encode_sample(value: i32, width: u16, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes()[..width as usize]);
}

/// Number of frames covering `duration_ms` at `frame_rate` (rounded down)
#[inline]
pub fn frames_for_duration(duration_ms: u32, frame_rate: u32) -> usize {
    (u64::from(duration_ms) * u64::from(frame_rate) / 1000) as usize
}

// ============================================================================
// PCM Format
// ============================================================================

/// Shape of a PCM stream: everything needed to open an output for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    /// Frames per second (Hz)
    pub frame_rate: u32,
    /// Interleaved channels (1 or 2)
    pub channels: u16,
    /// Bytes per sample
    pub sample_width: u16,
}

impl PcmFormat {
    /// Bytes per frame (all channels)
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.sample_width as usize
    }
}

// ============================================================================
// PCM Buffer
// ============================================================================

/// Decoded, interleaved PCM audio
///
/// Invariant: `samples.len()` is a whole number of frames
/// (`channels * sample_width` bytes each).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    samples: Vec<u8>,
    frame_rate: u32,
    channels: u16,
    sample_width: u16,
}

impl PcmBuffer {
    /// Create a buffer from raw interleaved bytes, validating the layout
    ///
    /// # Errors
    /// `InvalidParameter` if the frame rate is zero, the channel count is not
    /// 1 or 2, the sample width is outside 1..=4, or the byte length is not a
    /// whole number of frames.
    pub fn new(samples: Vec<u8>, frame_rate: u32, channels: u16, sample_width: u16) -> Result<Self> {
        if frame_rate == 0 {
            return Err(SlowverbError::invalid_parameter(
                "frame_rate",
                "must be a positive number of frames per second",
            ));
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(SlowverbError::invalid_parameter(
                "channels",
                format!("{} channels (only mono and stereo are supported)", channels),
            ));
        }
        if sample_width == 0 || sample_width > MAX_SAMPLE_WIDTH {
            return Err(SlowverbError::invalid_parameter(
                "sample_width",
                format!("{} bytes (supported: 1 to {})", sample_width, MAX_SAMPLE_WIDTH),
            ));
        }

        let frame_size = channels as usize * sample_width as usize;
        if samples.len() % frame_size != 0 {
            return Err(SlowverbError::invalid_parameter(
                "samples",
                format!(
                    "{} bytes is not a whole number of {}-byte frames",
                    samples.len(),
                    frame_size
                ),
            ));
        }

        Ok(Self {
            samples,
            frame_rate,
            channels,
            sample_width,
        })
    }

    /// Create a buffer from interleaved sample values
    ///
    /// Values outside the representable range of `sample_width` are clamped.
    pub fn from_samples(
        values: &[i32],
        frame_rate: u32,
        channels: u16,
        sample_width: u16,
    ) -> Result<Self> {
        let (min, max) = sample_range(sample_width);
        let mut bytes = Vec::with_capacity(values.len() * sample_width as usize);
        for &value in values {
            encode_sample(value.clamp(min, max), sample_width, &mut bytes);
        }
        Self::new(bytes, frame_rate, channels, sample_width)
    }

    /// Create a zero-amplitude buffer of `frame_count` frames
    pub fn silent(frame_count: usize, format: PcmFormat) -> Result<Self> {
        Self::new(
            vec![0u8; frame_count * format.frame_size()],
            format.frame_rate,
            format.channels,
            format.sample_width,
        )
    }

    /// Raw interleaved bytes
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Consume the buffer, returning its raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.samples
    }

    /// Frames per second (Hz)
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Number of interleaved channels
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Bytes per sample
    pub fn sample_width(&self) -> u16 {
        self.sample_width
    }

    /// Shape of this buffer
    pub fn format(&self) -> PcmFormat {
        PcmFormat {
            frame_rate: self.frame_rate,
            channels: self.channels,
            sample_width: self.sample_width,
        }
    }

    /// Bytes per frame (all channels)
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.sample_width as usize
    }

    /// Total length in bytes
    pub fn byte_len(&self) -> usize {
        self.samples.len()
    }

    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.frame_size()
    }

    /// Check if the buffer holds no frames
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.frame_rate as f64
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    /// Decode every sample (interleaved) to `i32`
    pub fn to_samples(&self) -> Vec<i32> {
        self.samples
            .chunks_exact(self.sample_width as usize)
            .map(decode_sample)
            .collect()
    }

    /// Same bytes, different frame rate tag
    ///
    /// This is a relabel only: no sample is touched, so playback speed and
    /// pitch change together.
    pub fn with_frame_rate(&self, frame_rate: u32) -> Result<Self> {
        Self::new(
            self.samples.clone(),
            frame_rate,
            self.channels,
            self.sample_width,
        )
    }

    /// Split into one mono buffer per channel
    pub fn split_to_mono(&self) -> Vec<PcmBuffer> {
        let width = self.sample_width as usize;
        let channels = self.channels as usize;

        if channels == 1 {
            return vec![self.clone()];
        }

        let mut outputs = vec![Vec::with_capacity(self.frame_count() * width); channels];
        for frame in self.samples.chunks_exact(self.frame_size()) {
            for (ch, sample) in frame.chunks_exact(width).enumerate() {
                outputs[ch].extend_from_slice(sample);
            }
        }

        outputs
            .into_iter()
            .map(|samples| PcmBuffer {
                samples,
                frame_rate: self.frame_rate,
                channels: 1,
                sample_width: self.sample_width,
            })
            .collect()
    }

    /// Interleave mono buffers into one multi-channel buffer
    ///
    /// Each input becomes exactly one output channel, in order; no input is
    /// ever summed into another's channel.
    ///
    /// # Errors
    /// `InvalidParameter` if an input is not mono, or the inputs disagree on
    /// frame rate, sample width or length.
    pub fn from_mono_channels(channels: &[PcmBuffer]) -> Result<Self> {
        let first = channels
            .first()
            .ok_or_else(|| SlowverbError::invalid_parameter("channels", "no channels to combine"))?;

        for channel in channels {
            if channel.channels != 1 {
                return Err(SlowverbError::invalid_parameter(
                    "channels",
                    "only mono buffers can be interleaved",
                ));
            }
            if channel.frame_rate != first.frame_rate
                || channel.sample_width != first.sample_width
                || channel.samples.len() != first.samples.len()
            {
                return Err(SlowverbError::invalid_parameter(
                    "channels",
                    "mono buffers differ in frame rate, sample width or length",
                ));
            }
        }

        let width = first.sample_width as usize;
        let mut interleaved = Vec::with_capacity(first.samples.len() * channels.len());
        for frame in 0..first.frame_count() {
            let start = frame * width;
            for channel in channels {
                interleaved.extend_from_slice(&channel.samples[start..start + width]);
            }
        }

        Self::new(
            interleaved,
            first.frame_rate,
            channels.len() as u16,
            first.sample_width,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

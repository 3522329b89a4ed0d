//! Audio file I/O for Slowverb
//!
//! The decode/encode collaborator: turns files into [`PcmBuffer`]s and back.
//! WAV goes through `hound` both ways and keeps its integer sample width.
//! Any other container (MP3, FLAC, OGG, ...) is decoded with `symphonia`
//! into 16-bit PCM. Output is always WAV.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use tracing::{debug, instrument};

use crate::engine::buffer::{encode_sample, MAX_CHANNELS};
use crate::engine::PcmBuffer;
use crate::error::{Result, SlowverbError};

/// Largest input file accepted for processing (100 MiB)
pub const MAX_INPUT_BYTES: u64 = 100 * 1024 * 1024;

/// Sample width used for float and compressed sources (16-bit)
const DEFAULT_SAMPLE_WIDTH: u16 = 2;

/// Decoder/encoder collaborator
///
/// The core only cares about rate, channels and sample width; container
/// details stay behind this trait.
pub trait AudioCodec: Send + Sync {
    /// Decode a file into PCM
    fn decode(&self, path: &Path) -> Result<PcmBuffer>;

    /// Encode PCM into a file
    fn encode(&self, buffer: &PcmBuffer, path: &Path) -> Result<()>;
}

/// Default codec: WAV in/out via `hound`, other formats in via `symphonia`
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCodec;

impl AudioCodec for FileCodec {
    fn decode(&self, path: &Path) -> Result<PcmBuffer> {
        if is_wav(path) {
            decode_wav(path)
        } else {
            decode_compressed(path)
        }
    }

    fn encode(&self, buffer: &PcmBuffer, path: &Path) -> Result<()> {
        if !is_wav(path) {
            return Err(SlowverbError::EncodeFailure {
                reason: format!(
                    "cannot write '{}': only .wav output is supported",
                    path.display()
                ),
                source: None,
            });
        }
        encode_wav(buffer, path)
    }
}

/// Check an input file exists and is small enough to process
///
/// # Errors
/// * `InputNotFound` - the path does not exist or is not a file
/// * `InputTooLarge` - the file is bigger than `limit_bytes`
pub fn check_input(path: &Path, limit_bytes: u64) -> Result<u64> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => {
            return Err(SlowverbError::InputNotFound {
                path: path.display().to_string(),
            })
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(SlowverbError::InputNotFound {
                path: path.display().to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let size_bytes = metadata.len();
    if size_bytes > limit_bytes {
        return Err(SlowverbError::InputTooLarge {
            path: path.display().to_string(),
            size_bytes,
            limit_bytes,
        });
    }

    Ok(size_bytes)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav") || ext.eq_ignore_ascii_case("wave"))
        .unwrap_or(false)
}

fn check_channels(channels: usize, path: &Path) -> Result<u16> {
    if channels == 0 || channels > MAX_CHANNELS as usize {
        return Err(SlowverbError::DecodeFailure {
            reason: format!(
                "{} has {} channels (only mono and stereo are supported)",
                path.display(),
                channels
            ),
            source: None,
        });
    }
    Ok(channels as u16)
}

// ============================================================================
// WAV (hound)
// ============================================================================

/// Decode a WAV file, keeping integer sample widths as-is
#[instrument(fields(path = %path.display()))]
pub fn decode_wav(path: &Path) -> Result<PcmBuffer> {
    let mut reader = WavReader::open(path)
        .map_err(|e| SlowverbError::decode(format!("failed to open WAV file {}", path.display()), e))?;

    let spec = reader.spec();
    let channels = check_channels(spec.channels as usize, path)?;

    let (values, sample_width) = match spec.sample_format {
        SampleFormat::Int => {
            let width = spec.bits_per_sample.div_ceil(8);
            let values = reader
                .samples::<i32>()
                .collect::<std::result::Result<Vec<i32>, _>>()
                .map_err(|e| SlowverbError::decode("failed to read integer samples", e))?;
            (values, width)
        }
        SampleFormat::Float => {
            let values = reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * 32767.0).round() as i32))
                .collect::<std::result::Result<Vec<i32>, _>>()
                .map_err(|e| SlowverbError::decode("failed to read float samples", e))?;
            (values, DEFAULT_SAMPLE_WIDTH)
        }
    };

    let buffer = pcm_from_values(&values, spec.sample_rate, channels, sample_width)?;
    debug!(
        frame_rate = buffer.frame_rate(),
        channels = buffer.channels(),
        sample_width = buffer.sample_width(),
        frames = buffer.frame_count(),
        "WAV decode complete"
    );
    Ok(buffer)
}

/// Encode a buffer as an integer PCM WAV file
#[instrument(skip(buffer), fields(path = %path.display()))]
pub fn encode_wav(buffer: &PcmBuffer, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.frame_rate(),
        bits_per_sample: buffer.sample_width() * 8,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(|e| {
        SlowverbError::encode(format!("failed to create {}", path.display()), e)
    })?;

    for value in buffer.to_samples() {
        writer
            .write_sample(value)
            .map_err(|e| SlowverbError::encode("failed to write sample", e))?;
    }

    writer
        .finalize()
        .map_err(|e| SlowverbError::encode("failed to finalize WAV file", e))?;

    debug!(frames = buffer.frame_count(), "WAV encode complete");
    Ok(())
}

// ============================================================================
// Compressed formats (symphonia)
// ============================================================================

/// Decode any container/codec symphonia knows into 16-bit PCM
#[instrument(fields(path = %path.display()))]
pub fn decode_compressed(path: &Path) -> Result<PcmBuffer> {
    let file = File::open(path)?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SlowverbError::decode(format!("unrecognized audio format: {}", path.display()), e))?;
    let mut format = probed.format;

    let track = format.default_track().ok_or_else(|| SlowverbError::DecodeFailure {
        reason: format!("no default audio track found in {}", path.display()),
        source: None,
    })?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SlowverbError::decode("unsupported codec", e))?;

    let mut frame_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|value| value.count())
        .unwrap_or(0);
    let mut values: Vec<i32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(error) => return Err(SlowverbError::decode("failed to read packet", error)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt frames are skipped, as players do
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(error) => return Err(SlowverbError::decode("failed to decode packet", error)),
        };

        let spec = *decoded.spec();
        frame_rate = spec.rate;
        channels = spec.channels.count();

        let mut sample_buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        sample_buffer.copy_interleaved_ref(decoded);
        values.extend(sample_buffer.samples().iter().map(|&s| i32::from(s)));
    }

    if values.is_empty() {
        return Err(SlowverbError::DecodeFailure {
            reason: format!("decoded zero samples from {}", path.display()),
            source: None,
        });
    }

    let channels = check_channels(channels, path)?;
    let buffer = pcm_from_values(&values, frame_rate, channels, DEFAULT_SAMPLE_WIDTH)?;
    debug!(
        frame_rate,
        channels,
        frames = buffer.frame_count(),
        "compressed decode complete"
    );
    Ok(buffer)
}

/// Pack decoded values into a buffer, mapping layout problems to decode errors
fn pcm_from_values(values: &[i32], frame_rate: u32, channels: u16, width: u16) -> Result<PcmBuffer> {
    let mut bytes = Vec::with_capacity(values.len() * width as usize);
    for &value in values {
        encode_sample(value, width, &mut bytes);
    }
    PcmBuffer::new(bytes, frame_rate, channels, width).map_err(|e| SlowverbError::DecodeFailure {
        reason: e.to_string(),
        source: None,
    })
}

// ============================================================================
// Tests
// ============================================================================

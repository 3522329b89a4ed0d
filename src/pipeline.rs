//! Processing pipeline
//!
//! Validates parameters, then runs stretch → tail generation → fade →
//! per-channel mixing. [`Studio`] wraps the pipeline with the file and
//! playback collaborators and exposes the operations a UI calls:
//! export to file, or preview with pause/stop.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::dsp::reverb::{self, ReverbType};
use crate::dsp::stretch::validate_factor;
use crate::dsp::{apply_tail, stretch};
use crate::engine::buffer::frames_for_duration;
use crate::engine::io::{check_input, AudioCodec, MAX_INPUT_BYTES};
use crate::engine::{PcmBuffer, PlaybackEngine, PlaybackStatus};
use crate::error::{Result, SlowverbError};

// ============================================================================
// Processing Parameters
// ============================================================================

/// Parameters of one processing request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingParameters {
    /// Playback speed multiplier, in (0, 2.0]; below 1 slows down
    pub slowdown_factor: f64,
    /// Length of the reverb tail in milliseconds, > 0
    pub reverb_duration_ms: u32,
    /// Share of the tail that fades out, in [0, 1]
    pub reverb_decay: f64,
    /// Kind of tail
    pub reverb_type: ReverbType,
}

impl Default for ProcessingParameters {
    fn default() -> Self {
        Self {
            slowdown_factor: 0.5,
            reverb_duration_ms: 1000,
            reverb_decay: 0.5,
            reverb_type: ReverbType::Sine,
        }
    }
}

impl ProcessingParameters {
    /// Build and validate parameters, parsing the reverb type by name
    pub fn new(
        slowdown_factor: f64,
        reverb_duration_ms: u32,
        reverb_decay: f64,
        reverb_type: &str,
    ) -> Result<Self> {
        let params = Self {
            slowdown_factor,
            reverb_duration_ms,
            reverb_decay,
            reverb_type: reverb_type.parse()?,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check every field, first violation wins
    pub fn validate(&self) -> Result<()> {
        validate_factor(self.slowdown_factor)?;
        if self.reverb_duration_ms == 0 {
            return Err(SlowverbError::invalid_parameter(
                "reverb_duration_ms",
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.reverb_decay) {
            return Err(SlowverbError::invalid_parameter(
                "reverb_decay",
                format!("{} is outside [0, 1]", self.reverb_decay),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Processing
// ============================================================================

/// Slow down a buffer and layer a faded reverb tail onto its end
///
/// The output keeps the input's frame rate, channel count and sample width.
/// Stereo channels each get their own tail; nothing crosses between them.
///
/// # Errors
/// `InvalidParameter` for an empty input or out-of-range parameters, checked
/// before any processing starts.
#[instrument(skip(input, params), fields(
    frame_rate = input.frame_rate(),
    channels = input.channels(),
    frames = input.frame_count(),
))]
pub fn process(input: &PcmBuffer, params: &ProcessingParameters) -> Result<PcmBuffer> {
    if input.is_empty() {
        return Err(SlowverbError::invalid_parameter(
            "input",
            "audio buffer contains no frames",
        ));
    }
    params.validate()?;

    let stretched = stretch(input, params.slowdown_factor)?;
    let reverb_frames = frames_for_duration(params.reverb_duration_ms, stretched.frame_rate());

    // Only the part of the tail that lands on the track is rendered
    let tail = reverb::render_tail(
        params.reverb_duration_ms,
        params.reverb_type,
        stretched.frame_rate(),
        stretched.sample_width(),
        params.reverb_decay,
        stretched.frame_count(),
    )?;

    let mixed = apply_tail(&stretched, &tail, reverb_frames)?;

    info!(
        slowdown_factor = params.slowdown_factor,
        reverb_type = %params.reverb_type,
        reverb_frames,
        output_secs = mixed.duration_secs(),
        "processing complete"
    );
    Ok(mixed)
}

/// Resolve where an export should be written
///
/// An existing directory gets `default_file_name` appended; anything else is
/// taken as a file path whose parent directory must exist.
pub fn resolve_output_path(output: &Path, default_file_name: &str) -> Result<PathBuf> {
    if output.is_dir() {
        return Ok(output.join(default_file_name));
    }

    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(SlowverbError::invalid_parameter(
                "output",
                format!("directory {} does not exist", parent.display()),
            ))
        }
        _ => Ok(output.to_path_buf()),
    }
}

/// Check, decode and process an input file
///
/// Order: input exists → input size → parameters → decode → process.
/// Nothing is decoded unless every check passes.
pub fn load_file(
    codec: &dyn AudioCodec,
    input: &Path,
    params: &ProcessingParameters,
    max_input_bytes: u64,
) -> Result<PcmBuffer> {
    let size_bytes = check_input(input, max_input_bytes)?;
    params.validate()?;

    info!(path = %input.display(), size_bytes, "decoding input");
    let decoded = codec.decode(input)?;
    process(&decoded, params)
}

/// Process `input` and export the result to `output`
pub fn process_file(
    codec: &dyn AudioCodec,
    input: &Path,
    output: &Path,
    params: &ProcessingParameters,
    max_input_bytes: u64,
) -> Result<PcmBuffer> {
    let processed = load_file(codec, input, params, max_input_bytes)?;
    codec.encode(&processed, output)?;
    info!(path = %output.display(), "export complete");
    Ok(processed)
}

// ============================================================================
// Studio
// ============================================================================

/// File export and live preview on top of [`process`]
pub struct Studio {
    codec: Box<dyn AudioCodec>,
    engine: PlaybackEngine,
    max_input_bytes: u64,
}

impl Studio {
    /// Combine a codec and a playback engine
    pub fn new(codec: Box<dyn AudioCodec>, engine: PlaybackEngine) -> Self {
        Self {
            codec,
            engine,
            max_input_bytes: MAX_INPUT_BYTES,
        }
    }

    /// Override the input size limit
    pub fn with_input_limit(mut self, max_input_bytes: u64) -> Self {
        self.max_input_bytes = max_input_bytes;
        self
    }

    /// Playback engine used for previews
    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    /// Check, decode and process an input file
    pub fn load(&self, input: &Path, params: &ProcessingParameters) -> Result<PcmBuffer> {
        load_file(self.codec.as_ref(), input, params, self.max_input_bytes)
    }

    /// Process `input` and export the result to `output`
    pub fn process(
        &self,
        input: &Path,
        output: &Path,
        params: &ProcessingParameters,
    ) -> Result<PcmBuffer> {
        process_file(self.codec.as_ref(), input, output, params, self.max_input_bytes)
    }

    /// Process `input` and start streaming it to the output device
    ///
    /// # Errors
    /// `AlreadyPlaying` (before any decoding) if a preview is running.
    pub fn preview_start(&self, input: &Path, params: &ProcessingParameters) -> Result<()> {
        if self.engine.status() != PlaybackStatus::Stopped {
            return Err(SlowverbError::AlreadyPlaying);
        }
        let processed = self.load(input, params)?;
        self.engine.start(processed)
    }

    /// Pause or resume the running preview, returning the new status
    pub fn preview_pause_toggle(&self) -> PlaybackStatus {
        self.engine.toggle_pause()
    }

    /// Stop the running preview
    pub fn preview_stop(&self) -> Result<()> {
        self.engine.stop()
    }
}

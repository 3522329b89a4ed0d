//! Audio Engine Module
//!
//! Core audio plumbing:
//! - PCM buffer type
//! - File decode/encode
//! - Output devices
//! - Streaming playback engine

pub mod buffer;
pub mod io;
pub mod output;
pub mod playback;

pub use buffer::{PcmBuffer, PcmFormat};
pub use io::{check_input, AudioCodec, FileCodec, MAX_INPUT_BYTES};
pub use output::{CaptureDevice, OutputDevice, OutputStream};
pub use playback::{PlaybackEngine, PlaybackOptions, PlaybackSession, PlaybackStatus};

#[cfg(feature = "device")]
pub use output::CpalDevice;

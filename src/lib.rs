//! Slowverb - "slowed + reverb" audio processing
//!
//! Takes a track, slows it down by relabeling its frame rate, then layers a
//! synthetic reverb tail (a faded 440 Hz tone, or silence) onto the end of
//! each channel. The result can be exported as WAV or previewed through an
//! output device with pause/resume/stop control.
//!
//! # Architecture
//!
//! - `engine`: PCM buffers, file decode/encode, output devices, playback
//! - `dsp`: time-stretch, tail generation and fade, channel mixing
//! - `pipeline`: parameter validation and the end-to-end processing flow
//! - `config`, `logging`, `cli`: the command-line front end

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use error::{Result, SlowverbError};
pub use pipeline::{process, ProcessingParameters, Studio};

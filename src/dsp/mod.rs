//! DSP stages of the slowed + reverb transform
//!
//! Applied in order by the pipeline: stretch → tail generation → mixing.

pub mod mixer;
pub mod reverb;
pub mod stretch;

pub use mixer::{apply_tail, overlay, tail_position};
pub use reverb::{
    fade_frame_count, fade_gain, fade_out, generate, render_tail, ReverbType, TONE_FREQUENCY_HZ,
};
pub use stretch::{convert_frame_rate, stretch, MAX_SLOWDOWN_FACTOR};

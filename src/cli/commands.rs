//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::io::{self, BufRead};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::ParamArgs;
use crate::config::AppConfig;
use crate::engine::{
    check_input, AudioCodec, FileCodec, OutputDevice, PlaybackEngine, PlaybackStatus,
};
use crate::pipeline::{process_file, resolve_output_path, Studio};

/// How often the preview loop checks whether playback ended on its own
const STATUS_POLL: Duration = Duration::from_millis(200);

/// Process a file and export it as WAV.
pub fn process(config: &AppConfig, input: &Path, output: &Path, args: &ParamArgs) -> Result<()> {
    info!("Processing: {}", input.display());

    check_input(input, config.limits.max_input_bytes)?;
    let params = args.resolve(&config.defaults)?;
    let output_path = resolve_output_path(output, &config.export.file_name)?;

    let processed = process_file(
        &FileCodec,
        input,
        &output_path,
        &params,
        config.limits.max_input_bytes,
    )
    .with_context(|| format!("failed to process {}", input.display()))?;

    println!("=== Slowverb ===");
    println!("Input: {}", input.display());
    println!("Output: {}", output_path.display());
    println!("Slowdown: {}x", params.slowdown_factor);
    println!(
        "Reverb: {} ({} ms, decay {:.0}%)",
        params.reverb_type,
        params.reverb_duration_ms,
        params.reverb_decay * 100.0
    );
    println!("Duration: {:.2}s", processed.duration_secs());

    Ok(())
}

/// Process a file and play it, reading pause/stop commands from stdin.
pub fn preview(
    config: &AppConfig,
    device: Arc<dyn OutputDevice>,
    input: &Path,
    args: &ParamArgs,
) -> Result<()> {
    info!("Previewing: {}", input.display());

    check_input(input, config.limits.max_input_bytes)?;
    let params = args.resolve(&config.defaults)?;
    let engine = PlaybackEngine::with_options(device, config.playback.options());
    let studio =
        Studio::new(Box::new(FileCodec), engine).with_input_limit(config.limits.max_input_bytes);

    studio
        .preview_start(input, &params)
        .with_context(|| format!("failed to preview {}", input.display()))?;

    println!("Playing {} on {}", input.display(), studio.engine().device_name());
    println!("Commands: p = pause/resume, s = stop, q = quit");

    let commands = spawn_stdin_reader();
    loop {
        match commands.recv_timeout(STATUS_POLL) {
            Ok(line) => match line.trim() {
                "p" => println!("{}", studio.preview_pause_toggle()),
                "s" | "q" => {
                    studio.preview_stop().context("playback failed")?;
                    println!("Stopped");
                    return Ok(());
                }
                "" => {}
                other => println!("Unknown command: {}", other),
            },
            Err(RecvTimeoutError::Timeout) => {}
            // stdin closed, play to the end
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if studio.engine().status() == PlaybackStatus::Stopped {
            break;
        }
    }

    studio.engine().wait().context("playback failed")?;
    println!("Playback finished");

    Ok(())
}

/// Print the decoded format of an audio file.
pub fn info(config: &AppConfig, input: &Path) -> Result<()> {
    let size_bytes = check_input(input, config.limits.max_input_bytes)?;
    let buffer = FileCodec
        .decode(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    println!("File: {}", input.display());
    println!("Size: {:.1} KB", size_bytes as f64 / 1024.0);
    println!("Frame rate: {} Hz", buffer.frame_rate());
    println!("Channels: {}", buffer.channels());
    println!("Sample width: {} bits", buffer.sample_width() * 8);
    println!("Frames: {}", buffer.frame_count());
    println!("Duration: {:.2}s", buffer.duration_secs());

    Ok(())
}

/// Write the default configuration.
pub fn init_config(path: &Path) -> Result<()> {
    AppConfig::default()
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Configuration written: {}", path.display());
    Ok(())
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("slowverb-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "stdin commands unavailable");
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::encode_wav;
    use crate::engine::{CaptureDevice, PcmBuffer};
    use tempfile::tempdir;

    fn write_input(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("input.wav");
        let values: Vec<i32> = (0..8000).map(|i| (i % 100) as i32).collect();
        let buffer = PcmBuffer::from_samples(&values, 8000, 1, 2).unwrap();
        encode_wav(&buffer, &path).unwrap();
        path
    }

    #[test]
    fn test_process_into_directory() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let out_dir = dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();

        process(&AppConfig::default(), &input, &out_dir, &ParamArgs::default()).unwrap();

        let written = FileCodec.decode(&out_dir.join("processed_audio.wav")).unwrap();
        assert_eq!(written.frame_rate(), 8000);
        assert_eq!(written.frame_count(), 16000);
    }

    #[test]
    fn test_process_missing_input() {
        let dir = tempdir().unwrap();
        let err = process(
            &AppConfig::default(),
            &dir.path().join("nope.wav"),
            &dir.path().join("out.wav"),
            &ParamArgs::default(),
        )
        .unwrap_err();
        let err = err.downcast_ref::<crate::SlowverbError>().unwrap();
        assert_eq!(err.error_code(), "INPUT_NOT_FOUND");
    }

    #[test]
    fn test_missing_input_reported_before_reverb_type() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.wav");
        let args = ParamArgs {
            reverb_type: Some("plate".to_string()),
            ..ParamArgs::default()
        };

        let err = process(&AppConfig::default(), &missing, dir.path(), &args).unwrap_err();
        let err = err.downcast_ref::<crate::SlowverbError>().unwrap();
        assert_eq!(err.error_code(), "INPUT_NOT_FOUND");

        let device: Arc<dyn OutputDevice> = Arc::new(CaptureDevice::new());
        let err = preview(&AppConfig::default(), device, &missing, &args).unwrap_err();
        let err = err.downcast_ref::<crate::SlowverbError>().unwrap();
        assert_eq!(err.error_code(), "INPUT_NOT_FOUND");
    }

    #[test]
    fn test_bad_reverb_type_with_existing_input() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let args = ParamArgs {
            reverb_type: Some("plate".to_string()),
            ..ParamArgs::default()
        };

        let err = process(&AppConfig::default(), &input, dir.path(), &args).unwrap_err();
        let err = err.downcast_ref::<crate::SlowverbError>().unwrap();
        assert_eq!(err.error_code(), "UNSUPPORTED_REVERB_TYPE");
    }

    #[test]
    fn test_info() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        assert!(info(&AppConfig::default(), &input).is_ok());
    }

    #[test]
    fn test_init_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slowverb.json");
        init_config(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), AppConfig::default());
    }
}

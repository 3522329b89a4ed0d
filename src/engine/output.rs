//! Audio output devices
//!
//! The playback engine writes PCM chunks to an [`OutputStream`] opened from
//! an [`OutputDevice`]. Writes block until the device has room (hardware
//! backpressure). A stream is released when it is dropped, so every exit
//! path of the streaming loop gives the device back.
//!
//! Backends:
//! - [`CaptureDevice`]: records everything written, optionally paced like
//!   real hardware. Used for headless previews and tests.
//! - `CpalDevice` (feature `device`): the system's default output via cpal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::engine::PcmFormat;
use crate::error::{Result, SlowverbError};

#[cfg(feature = "device")]
pub use self::cpal_backend::CpalDevice;

/// Something that can open output streams
pub trait OutputDevice: Send + Sync {
    /// Human readable device name
    fn name(&self) -> String;

    /// Open a stream for PCM of the given shape
    ///
    /// # Errors
    /// `DeviceUnavailable` if the device cannot play this format right now.
    fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputStream>>;
}

/// An open stream on an output device; released on drop
pub trait OutputStream {
    /// Write one chunk of interleaved PCM, blocking until it is accepted
    fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Block until everything written so far has been played
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Capture Device
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pace {
    /// Accept writes immediately
    Instant,
    /// Sleep for the chunk's playback duration
    Realtime,
    /// Sleep a fixed time per chunk
    Fixed(Duration),
}

#[derive(Debug, Default)]
struct CaptureLog {
    bytes: Vec<u8>,
    chunk_sizes: Vec<usize>,
    formats: Vec<PcmFormat>,
}

#[derive(Debug)]
struct CaptureShared {
    pace: Pace,
    available: bool,
    fail_after: Option<usize>,
    open_delay: Duration,
    log: Mutex<CaptureLog>,
    open_streams: AtomicUsize,
}

/// In-memory output device that records every byte written to it
///
/// Clones share the same recording, so a test can keep one handle and give
/// another to the engine.
#[derive(Debug, Clone)]
pub struct CaptureDevice {
    shared: Arc<CaptureShared>,
}

impl Default for CaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice {
    fn build(pace: Pace, available: bool, fail_after: Option<usize>, open_delay: Duration) -> Self {
        Self {
            shared: Arc::new(CaptureShared {
                pace,
                available,
                fail_after,
                open_delay,
                log: Mutex::new(CaptureLog::default()),
                open_streams: AtomicUsize::new(0),
            }),
        }
    }

    /// Device that accepts every write immediately
    pub fn new() -> Self {
        Self::build(Pace::Instant, true, None, Duration::ZERO)
    }

    /// Device that takes as long as real hardware to accept each chunk
    pub fn realtime() -> Self {
        Self::build(Pace::Realtime, true, None, Duration::ZERO)
    }

    /// Device that sleeps `delay` on every write
    pub fn with_write_delay(delay: Duration) -> Self {
        Self::build(Pace::Fixed(delay), true, None, Duration::ZERO)
    }

    /// Device that refuses to open any stream
    pub fn unavailable() -> Self {
        Self::build(Pace::Instant, false, None, Duration::ZERO)
    }

    /// Device that takes `delay` to open each stream
    pub fn with_open_delay(delay: Duration) -> Self {
        Self::build(Pace::Instant, true, None, delay)
    }

    /// Device whose streams fail once `bytes` have been written
    pub fn failing_after(bytes: usize) -> Self {
        Self::build(Pace::Instant, true, Some(bytes), Duration::ZERO)
    }

    /// Copy of everything written so far, across all streams
    pub fn written(&self) -> Vec<u8> {
        self.shared.log.lock().bytes.clone()
    }

    /// Number of bytes written so far
    pub fn bytes_written(&self) -> usize {
        self.shared.log.lock().bytes.len()
    }

    /// Size of every chunk written, in order
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.shared.log.lock().chunk_sizes.clone()
    }

    /// Format of every stream opened, in order
    pub fn opened_formats(&self) -> Vec<PcmFormat> {
        self.shared.log.lock().formats.clone()
    }

    /// Streams currently held open
    pub fn open_streams(&self) -> usize {
        self.shared.open_streams.load(Ordering::SeqCst)
    }
}

impl OutputDevice for CaptureDevice {
    fn name(&self) -> String {
        "capture".to_string()
    }

    fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputStream>> {
        if !self.shared.open_delay.is_zero() {
            thread::sleep(self.shared.open_delay);
        }
        if !self.shared.available {
            return Err(SlowverbError::DeviceUnavailable {
                reason: "capture device is disabled".to_string(),
            });
        }

        self.shared.log.lock().formats.push(format);
        self.shared.open_streams.fetch_add(1, Ordering::SeqCst);
        debug!(?format, "capture stream opened");

        Ok(Box::new(CaptureStream {
            shared: Arc::clone(&self.shared),
            format,
        }))
    }
}

struct CaptureStream {
    shared: Arc<CaptureShared>,
    format: PcmFormat,
}

impl OutputStream for CaptureStream {
    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        {
            let mut log = self.shared.log.lock();
            if let Some(limit) = self.shared.fail_after {
                if log.bytes.len() + chunk.len() > limit {
                    return Err(SlowverbError::DeviceUnavailable {
                        reason: "capture device failed mid-stream".to_string(),
                    });
                }
            }
            log.bytes.extend_from_slice(chunk);
            log.chunk_sizes.push(chunk.len());
        }

        match self.shared.pace {
            Pace::Instant => {}
            Pace::Fixed(delay) => thread::sleep(delay),
            Pace::Realtime => {
                let frames = chunk.len() / self.format.frame_size().max(1);
                let secs = frames as f64 / f64::from(self.format.frame_rate.max(1));
                thread::sleep(Duration::from_secs_f64(secs));
            }
        }
        Ok(())
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.shared.open_streams.fetch_sub(1, Ordering::SeqCst);
        debug!("capture stream released");
    }
}

// ============================================================================
// cpal Device
// ============================================================================

#[cfg(feature = "device")]
mod cpal_backend {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use parking_lot::{Condvar, Mutex};
    use tracing::{debug, warn};

    use super::{OutputDevice, OutputStream};
    use crate::engine::buffer::{decode_sample, sample_range};
    use crate::engine::PcmFormat;
    use crate::error::{Result, SlowverbError};

    /// Seconds of audio buffered between `write` and the device callback
    const QUEUE_SECONDS: f64 = 0.25;

    /// Longest `finish` waits for the queue to drain
    const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

    /// Bounded wait between backpressure checks
    const SPACE_POLL: Duration = Duration::from_millis(100);

    /// The system's default audio output
    pub struct CpalDevice {
        device: cpal::Device,
        name: String,
    }

    impl CpalDevice {
        /// Acquire the default output device of the default host
        pub fn default_output() -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| SlowverbError::DeviceUnavailable {
                    reason: "no output device available".to_string(),
                })?;
            let name = device.name().unwrap_or_else(|_| "unknown".to_string());
            debug!(device = %name, "output device acquired");
            Ok(Self { device, name })
        }
    }

    struct Queue {
        samples: VecDeque<f32>,
        error: Option<String>,
    }

    struct Shared {
        queue: Mutex<Queue>,
        space: Condvar,
    }

    impl OutputDevice for CpalDevice {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn open(&self, format: PcmFormat) -> Result<Box<dyn OutputStream>> {
            let config = cpal::StreamConfig {
                channels: format.channels,
                sample_rate: cpal::SampleRate(format.frame_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let shared = Arc::new(Shared {
                queue: Mutex::new(Queue {
                    samples: VecDeque::new(),
                    error: None,
                }),
                space: Condvar::new(),
            });
            let data_shared = Arc::clone(&shared);
            let error_shared = Arc::clone(&shared);

            let stream = self
                .device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut queue = data_shared.queue.lock();
                        for sample in data.iter_mut() {
                            // Underrun plays silence
                            *sample = queue.samples.pop_front().unwrap_or(0.0);
                        }
                        drop(queue);
                        data_shared.space.notify_all();
                    },
                    move |err| {
                        warn!(error = %err, "output stream error");
                        error_shared.queue.lock().error = Some(err.to_string());
                        error_shared.space.notify_all();
                    },
                    None,
                )
                .map_err(|e| SlowverbError::DeviceUnavailable {
                    reason: e.to_string(),
                })?;
            stream.play().map_err(|e| SlowverbError::DeviceUnavailable {
                reason: e.to_string(),
            })?;

            let capacity = ((f64::from(format.frame_rate) * QUEUE_SECONDS) as usize
                * format.channels as usize)
                .max(1);
            let (_, max) = sample_range(format.sample_width);
            debug!(?format, capacity, "cpal stream opened");

            Ok(Box::new(CpalStream {
                _stream: stream,
                shared,
                sample_width: format.sample_width as usize,
                scale: 1.0 / (f64::from(max) + 1.0) as f32,
                capacity,
            }))
        }
    }

    struct CpalStream {
        _stream: cpal::Stream,
        shared: Arc<Shared>,
        sample_width: usize,
        scale: f32,
        capacity: usize,
    }

    impl CpalStream {
        fn check_error(queue: &Queue) -> Result<()> {
            match &queue.error {
                Some(reason) => Err(SlowverbError::DeviceUnavailable {
                    reason: reason.clone(),
                }),
                None => Ok(()),
            }
        }
    }

    impl OutputStream for CpalStream {
        fn write(&mut self, chunk: &[u8]) -> Result<()> {
            let samples: Vec<f32> = chunk
                .chunks_exact(self.sample_width)
                .map(|bytes| decode_sample(bytes) as f32 * self.scale)
                .collect();

            let mut queue = self.shared.queue.lock();
            loop {
                Self::check_error(&queue)?;
                if queue.samples.is_empty() || queue.samples.len() + samples.len() <= self.capacity {
                    break;
                }
                self.shared.space.wait_for(&mut queue, SPACE_POLL);
            }
            queue.samples.extend(samples);
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            let deadline = Instant::now() + DRAIN_TIMEOUT;
            let mut queue = self.shared.queue.lock();
            while !queue.samples.is_empty() && Instant::now() < deadline {
                Self::check_error(&queue)?;
                self.shared.space.wait_for(&mut queue, SPACE_POLL);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    fn format() -> PcmFormat {
        PcmFormat {
            frame_rate: 8000,
            channels: 1,
            sample_width: 2,
        }
    }

    #[test]
    fn test_capture_records_writes() {
        let device = CaptureDevice::new();
        let mut stream = device.open(format()).unwrap();
        stream.write(&[1, 2]).unwrap();
        stream.write(&[3, 4, 5, 6]).unwrap();

        assert_eq!(device.written(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(device.chunk_sizes(), vec![2, 4]);
        assert_eq!(device.opened_formats(), vec![format()]);
    }

    #[test]
    fn test_stream_released_on_drop() {
        let device = CaptureDevice::new();
        let stream = device.open(format()).unwrap();
        assert_eq!(device.open_streams(), 1);
        drop(stream);
        assert_eq!(device.open_streams(), 0);
    }

    #[test]
    fn test_unavailable_device() {
        let err = CaptureDevice::unavailable().open(format()).err().unwrap();
        assert_eq!(err.error_code(), "DEVICE_UNAVAILABLE");
    }

    #[test]
    fn test_failing_device() {
        let device = CaptureDevice::failing_after(4);
        let mut stream = device.open(format()).unwrap();
        stream.write(&[0; 4]).unwrap();
        assert!(stream.write(&[0; 2]).is_err());
        assert_eq!(device.bytes_written(), 4);
    }

    #[test]
    fn test_realtime_pacing() {
        let device = CaptureDevice::realtime();
        let mut stream = device.open(format()).unwrap();
        let started = Instant::now();
        // 400 frames at 8 kHz = 50ms
        stream.write(&[0; 800]).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(45));
    }
}

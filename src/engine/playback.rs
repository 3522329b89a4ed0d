//! Playback Engine for Slowverb
//!
//! Streams a finished buffer to an output device in fixed-size chunks on a
//! dedicated thread, while the controlling thread pauses, resumes or stops
//! it.
//!
//! State machine: `Stopped -> Playing -> {Paused <-> Playing} -> Stopped`
//!
//! Status and position live in a [`PlaybackSession`] behind one mutex, shared
//! by `Arc` between the engine and the streaming thread. A condition variable
//! wakes a paused stream as soon as it is resumed or stopped.

use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::engine::output::OutputDevice;
use crate::engine::PcmBuffer;
use crate::error::{Result, SlowverbError};

/// Bytes written to the device per streaming step
pub const CHUNK_BYTES: usize = 1024;

/// Longest a paused stream sleeps before re-checking its status
pub const PAUSE_POLL: Duration = Duration::from_millis(100);

// ============================================================================
// Status & Options
// ============================================================================

/// Playback states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    /// No stream is running (default state)
    #[default]
    Stopped,
    /// Chunks are being written to the device
    Playing,
    /// Stream is held open but nothing is written
    Paused,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackStatus::Stopped => write!(f, "Stopped"),
            PlaybackStatus::Playing => write!(f, "Playing"),
            PlaybackStatus::Paused => write!(f, "Paused"),
        }
    }
}

/// Streaming loop tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Target chunk size in bytes, rounded down to whole frames
    pub chunk_bytes: usize,
    /// Bounded wait while paused
    pub pause_poll: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            chunk_bytes: CHUNK_BYTES,
            pause_poll: PAUSE_POLL,
        }
    }
}

impl PlaybackOptions {
    /// Chunk length for a given frame size: whole frames, at least one
    pub fn chunk_len(&self, frame_size: usize) -> usize {
        let frame_size = frame_size.max(1);
        (self.chunk_bytes - self.chunk_bytes % frame_size).max(frame_size)
    }
}

// ============================================================================
// Playback Session
// ============================================================================

#[derive(Debug)]
struct SessionState {
    status: PlaybackStatus,
    /// Byte offset of the next chunk
    position: usize,
}

/// State of one playback, shared by the controller and the streaming thread
#[derive(Debug)]
pub struct PlaybackSession {
    state: Mutex<SessionState>,
    changed: Condvar,
    total_bytes: usize,
}

impl PlaybackSession {
    fn new(total_bytes: usize) -> Self {
        Self {
            state: Mutex::new(SessionState {
                status: PlaybackStatus::Playing,
                position: 0,
            }),
            changed: Condvar::new(),
            total_bytes,
        }
    }

    /// Current status
    pub fn status(&self) -> PlaybackStatus {
        self.state.lock().status
    }

    /// Bytes played so far
    pub fn position(&self) -> usize {
        self.state.lock().position
    }

    /// Length of the buffer being played, in bytes
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Fraction played, 0.0..=1.0
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.position() as f64 / self.total_bytes as f64
    }

    fn pause(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != PlaybackStatus::Playing {
            return false;
        }
        state.status = PlaybackStatus::Paused;
        debug!(position = state.position, "[PLAYBACK] Paused");
        self.changed.notify_all();
        true
    }

    fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != PlaybackStatus::Paused {
            return false;
        }
        state.status = PlaybackStatus::Playing;
        debug!(position = state.position, "[PLAYBACK] Resumed");
        self.changed.notify_all();
        true
    }

    fn toggle_pause(&self) -> PlaybackStatus {
        let mut state = self.state.lock();
        state.status = match state.status {
            PlaybackStatus::Playing => PlaybackStatus::Paused,
            PlaybackStatus::Paused => PlaybackStatus::Playing,
            PlaybackStatus::Stopped => PlaybackStatus::Stopped,
        };
        debug!(status = %state.status, position = state.position, "[PLAYBACK] Toggled");
        self.changed.notify_all();
        state.status
    }

    /// Force Stopped and rewind
    fn stop(&self) {
        let mut state = self.state.lock();
        state.status = PlaybackStatus::Stopped;
        state.position = 0;
        self.changed.notify_all();
    }

    /// Offset of the next chunk to write, blocking while paused
    ///
    /// `None` once stopped or at the end of the buffer.
    fn next_offset(&self, poll: Duration) -> Option<usize> {
        let mut state = self.state.lock();
        loop {
            match state.status {
                PlaybackStatus::Stopped => return None,
                PlaybackStatus::Paused => {
                    self.changed.wait_for(&mut state, poll);
                }
                PlaybackStatus::Playing => {
                    return (state.position < self.total_bytes).then_some(state.position);
                }
            }
        }
    }

    /// Record a written chunk; ignored if stopped in the meantime
    fn advance(&self, bytes: usize) {
        let mut state = self.state.lock();
        if state.status != PlaybackStatus::Stopped {
            state.position += bytes;
        }
    }

    /// Block until the session reaches Stopped
    fn wait_stopped(&self) {
        let mut state = self.state.lock();
        while state.status != PlaybackStatus::Stopped {
            self.changed.wait(&mut state);
        }
    }
}

// ============================================================================
// Playback Engine
// ============================================================================

struct ActiveSession {
    session: Arc<PlaybackSession>,
    handle: JoinHandle<Result<()>>,
}

impl ActiveSession {
    fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| SlowverbError::DeviceUnavailable {
                reason: "playback thread panicked".to_string(),
            })?
    }
}

/// Owns the output device and at most one running playback
pub struct PlaybackEngine {
    device: Arc<dyn OutputDevice>,
    options: PlaybackOptions,
    active: Mutex<Option<ActiveSession>>,
}

impl PlaybackEngine {
    /// Create an engine that plays through `device`
    pub fn new(device: Arc<dyn OutputDevice>) -> Self {
        Self::with_options(device, PlaybackOptions::default())
    }

    /// Create an engine with custom chunk size and pause poll
    pub fn with_options(device: Arc<dyn OutputDevice>, options: PlaybackOptions) -> Self {
        Self {
            device,
            options,
            active: Mutex::new(None),
        }
    }

    /// Name of the output device this engine owns
    pub fn device_name(&self) -> String {
        self.device.name()
    }

    /// Start streaming `buffer` from the beginning
    ///
    /// Returns once the output stream is open and the first chunk is about
    /// to be written. The session is visible as Playing while the device
    /// opens; the engine lock is not held during the open, so status,
    /// pause and stop stay responsive and a concurrent start is refused.
    ///
    /// # Errors
    /// * `AlreadyPlaying` - a session is Playing or Paused
    /// * `InvalidParameter` - the buffer is empty
    /// * `DeviceUnavailable` - the output stream could not be opened
    pub fn start(&self, buffer: PcmBuffer) -> Result<()> {
        let (session, ready_rx) = {
            let mut active = self.active.lock();

            if let Some(current) = active.as_ref() {
                if current.session.status() != PlaybackStatus::Stopped {
                    return Err(SlowverbError::AlreadyPlaying);
                }
            }
            if let Some(finished) = active.take() {
                if let Err(e) = finished.join() {
                    warn!(error = %e, "previous playback ended with an error");
                }
            }

            if buffer.is_empty() {
                return Err(SlowverbError::invalid_parameter(
                    "buffer",
                    "nothing to play in an empty buffer",
                ));
            }

            let session = Arc::new(PlaybackSession::new(buffer.byte_len()));
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);
            let device = Arc::clone(&self.device);
            let thread_session = Arc::clone(&session);
            let options = self.options;

            let handle = thread::Builder::new()
                .name("slowverb-playback".to_string())
                .spawn(move || {
                    stream_buffer(device.as_ref(), &buffer, &thread_session, options, ready_tx)
                })?;

            *active = Some(ActiveSession {
                session: Arc::clone(&session),
                handle,
            });
            (session, ready_rx)
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    device = %self.device.name(),
                    total_bytes = session.total_bytes(),
                    "[PLAYBACK] Started"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                if let Some(failed) = self.take_if_current(&session) {
                    let _ = failed.join();
                }
                Err(e)
            }
            Err(_) => {
                let joined = match self.take_if_current(&session) {
                    Some(failed) => failed.join(),
                    None => Ok(()),
                };
                Err(joined.err().unwrap_or(SlowverbError::DeviceUnavailable {
                    reason: "playback thread exited before opening the stream".to_string(),
                }))
            }
        }
    }

    /// Remove `session` from the engine unless stop, wait or another start
    /// already took it
    fn take_if_current(&self, session: &Arc<PlaybackSession>) -> Option<ActiveSession> {
        let mut active = self.active.lock();
        match active.as_ref() {
            Some(current) if Arc::ptr_eq(&current.session, session) => active.take(),
            _ => None,
        }
    }

    /// Pause a playing session; no-op otherwise
    pub fn pause(&self) -> bool {
        self.with_session(|session| session.pause()).unwrap_or(false)
    }

    /// Resume a paused session; no-op otherwise
    pub fn resume(&self) -> bool {
        self.with_session(|session| session.resume()).unwrap_or(false)
    }

    /// Flip between Playing and Paused, returning the new status
    pub fn toggle_pause(&self) -> PlaybackStatus {
        self.with_session(|session| session.toggle_pause())
            .unwrap_or(PlaybackStatus::Stopped)
    }

    /// Stop playback, release the stream and rewind to 0
    ///
    /// Returns the outcome of the stopped session, so a device failure that
    /// ended it early is still reported.
    pub fn stop(&self) -> Result<()> {
        let Some(active) = self.active.lock().take() else {
            return Ok(());
        };
        active.session.stop();
        let result = active.join();
        info!("[PLAYBACK] Stopped");
        result
    }

    /// Block until the current session ends, returning its outcome
    pub fn wait(&self) -> Result<()> {
        loop {
            let mut active = self.active.lock();
            let session = match active.as_ref() {
                Some(current) => Arc::clone(&current.session),
                None => return Ok(()),
            };
            if session.status() == PlaybackStatus::Stopped {
                return match active.take() {
                    Some(finished) => finished.join(),
                    None => Ok(()),
                };
            }
            drop(active);
            session.wait_stopped();
        }
    }

    /// Current status
    pub fn status(&self) -> PlaybackStatus {
        self.with_session(|session| session.status())
            .unwrap_or(PlaybackStatus::Stopped)
    }

    /// Bytes played so far in the current session
    pub fn position(&self) -> usize {
        self.with_session(|session| session.position()).unwrap_or(0)
    }

    /// Fraction of the current buffer played, 0.0..=1.0
    pub fn progress(&self) -> f64 {
        self.with_session(|session| session.progress()).unwrap_or(0.0)
    }

    /// Read-only handle on the current session, for progress display
    pub fn session(&self) -> Option<Arc<PlaybackSession>> {
        self.active
            .lock()
            .as_ref()
            .map(|active| Arc::clone(&active.session))
    }

    fn with_session<T>(&self, f: impl FnOnce(&PlaybackSession) -> T) -> Option<T> {
        self.active.lock().as_ref().map(|active| f(&active.session))
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "playback ended with an error during shutdown");
        }
    }
}

/// Streaming loop, run on the playback thread
///
/// The stream is a local, so it is dropped (and the device released) on
/// every way out of this function.
fn stream_buffer(
    device: &dyn OutputDevice,
    buffer: &PcmBuffer,
    session: &PlaybackSession,
    options: PlaybackOptions,
    ready: mpsc::SyncSender<Result<()>>,
) -> Result<()> {
    let mut stream = match device.open(buffer.format()) {
        Ok(stream) => stream,
        Err(e) => {
            session.stop();
            let _ = ready.send(Err(e));
            return Ok(());
        }
    };
    let _ = ready.send(Ok(()));

    let data = buffer.samples();
    let chunk_len = options.chunk_len(buffer.frame_size());

    let result = loop {
        let Some(offset) = session.next_offset(options.pause_poll) else {
            break Ok(());
        };
        let end = (offset + chunk_len).min(data.len());
        if let Err(e) = stream.write(&data[offset..end]) {
            break Err(e);
        }
        session.advance(end - offset);
    };

    let result = match result {
        Ok(()) if session.status() != PlaybackStatus::Stopped => {
            debug!("[PLAYBACK] End of buffer");
            stream.finish()
        }
        other => other,
    };
    drop(stream);

    if let Err(e) = &result {
        warn!(error = %e, "[PLAYBACK] Aborted");
    }
    session.stop();
    result
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::output::CaptureDevice;
    use pretty_assertions::assert_eq;

    fn tone(frames: usize) -> PcmBuffer {
        let values: Vec<i32> = (0..frames * 2).map(|i| (i % 1000) as i32).collect();
        PcmBuffer::from_samples(&values, 8000, 2, 2).unwrap()
    }

    fn engine_with(device: &CaptureDevice) -> PlaybackEngine {
        PlaybackEngine::with_options(
            Arc::new(device.clone()),
            PlaybackOptions {
                chunk_bytes: CHUNK_BYTES,
                pause_poll: Duration::from_millis(10),
            },
        )
    }

    // ------------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------------

    #[test]
    fn test_chunk_len_whole_frames() {
        let options = PlaybackOptions::default();
        assert_eq!(options.chunk_len(4), 1024);
        assert_eq!(options.chunk_len(2), 1024);
        assert_eq!(options.chunk_len(6), 1020);
        let tiny = PlaybackOptions {
            chunk_bytes: 3,
            ..PlaybackOptions::default()
        };
        assert_eq!(tiny.chunk_len(4), 4);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PlaybackStatus::Stopped.to_string(), "Stopped");
        assert_eq!(PlaybackStatus::Playing.to_string(), "Playing");
        assert_eq!(PlaybackStatus::Paused.to_string(), "Paused");
    }

    // ------------------------------------------------------------------------
    // Session State Machine
    // ------------------------------------------------------------------------

    #[test]
    fn test_session_transitions() {
        let session = PlaybackSession::new(100);
        assert_eq!(session.status(), PlaybackStatus::Playing);

        assert!(session.pause());
        assert!(!session.pause());
        assert_eq!(session.status(), PlaybackStatus::Paused);

        assert!(session.resume());
        assert!(!session.resume());
        assert_eq!(session.status(), PlaybackStatus::Playing);

        assert_eq!(session.toggle_pause(), PlaybackStatus::Paused);
        assert_eq!(session.toggle_pause(), PlaybackStatus::Playing);

        session.advance(40);
        assert_eq!(session.position(), 40);
        assert!((session.progress() - 0.4).abs() < 1e-12);

        session.stop();
        assert_eq!(session.status(), PlaybackStatus::Stopped);
        assert_eq!(session.position(), 0);
        assert!(!session.resume());
        assert_eq!(session.toggle_pause(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_advance_ignored_after_stop() {
        let session = PlaybackSession::new(100);
        session.stop();
        session.advance(50);
        assert_eq!(session.position(), 0);
    }

    #[test]
    fn test_next_offset_ends_at_buffer_end() {
        let session = PlaybackSession::new(8);
        assert_eq!(session.next_offset(PAUSE_POLL), Some(0));
        session.advance(8);
        assert_eq!(session.next_offset(PAUSE_POLL), None);
    }

    // ------------------------------------------------------------------------
    // Engine
    // ------------------------------------------------------------------------

    #[test]
    fn test_plays_whole_buffer_in_chunks() {
        let device = CaptureDevice::new();
        let engine = engine_with(&device);
        let buffer = tone(1000);

        engine.start(buffer.clone()).unwrap();
        engine.wait().unwrap();

        assert_eq!(device.written(), buffer.samples());
        let sizes = device.chunk_sizes();
        assert!(sizes[..sizes.len() - 1].iter().all(|&s| s == 1024));
        assert_eq!(*sizes.last().unwrap(), 4000 % 1024);
        assert_eq!(device.opened_formats(), vec![buffer.format()]);
        assert_eq!(device.open_streams(), 0);
        assert_eq!(engine.status(), PlaybackStatus::Stopped);
        assert_eq!(engine.position(), 0);
    }

    #[test]
    fn test_controls_are_noops_when_stopped() {
        let engine = engine_with(&CaptureDevice::new());
        assert!(!engine.pause());
        assert!(!engine.resume());
        assert_eq!(engine.toggle_pause(), PlaybackStatus::Stopped);
        assert!(engine.stop().is_ok());
        assert!(engine.wait().is_ok());
    }

    #[test]
    fn test_start_while_playing_fails() {
        let device = CaptureDevice::with_write_delay(Duration::from_millis(5));
        let engine = engine_with(&device);

        engine.start(tone(20000)).unwrap();
        let err = engine.start(tone(10)).unwrap_err();
        assert_eq!(err.error_code(), "ALREADY_PLAYING");

        engine.pause();
        let err = engine.start(tone(10)).unwrap_err();
        assert_eq!(err.error_code(), "ALREADY_PLAYING");

        engine.stop().unwrap();
        assert_eq!(device.open_streams(), 0);
    }

    #[test]
    fn test_restart_after_finish() {
        let device = CaptureDevice::new();
        let engine = engine_with(&device);

        engine.start(tone(100)).unwrap();
        engine.wait().unwrap();
        engine.start(tone(100)).unwrap();
        engine.wait().unwrap();

        assert_eq!(device.bytes_written(), 800);
        assert_eq!(device.opened_formats().len(), 2);
    }

    #[test]
    fn test_stop_releases_device_and_rewinds() {
        let device = CaptureDevice::with_write_delay(Duration::from_millis(5));
        let engine = engine_with(&device);

        engine.start(tone(40000)).unwrap();
        thread::sleep(Duration::from_millis(30));
        engine.stop().unwrap();

        assert_eq!(engine.status(), PlaybackStatus::Stopped);
        assert_eq!(engine.position(), 0);
        assert_eq!(device.open_streams(), 0);
        assert!(device.bytes_written() < 160000);
    }

    #[test]
    fn test_stop_while_paused() {
        let device = CaptureDevice::with_write_delay(Duration::from_millis(5));
        let engine = PlaybackEngine::new(Arc::new(device.clone()));

        engine.start(tone(8000)).unwrap();
        engine.pause();
        engine.stop().unwrap();
        assert_eq!(device.open_streams(), 0);
    }

    #[test]
    fn test_slow_device_open_does_not_block_controls() {
        let device = CaptureDevice::with_open_delay(Duration::from_millis(300));
        let engine = engine_with(&device);

        thread::scope(|scope| {
            let starter = scope.spawn(|| engine.start(tone(100)));
            thread::sleep(Duration::from_millis(50));

            let asked = std::time::Instant::now();
            assert_eq!(engine.status(), PlaybackStatus::Playing);
            assert!(engine.session().is_some());
            let err = engine.start(tone(10)).unwrap_err();
            assert_eq!(err.error_code(), "ALREADY_PLAYING");
            assert!(asked.elapsed() < Duration::from_millis(150));

            starter.join().unwrap().unwrap();
        });

        engine.wait().unwrap();
        assert_eq!(device.opened_formats().len(), 1);
        assert_eq!(device.bytes_written(), 400);
    }

    #[test]
    fn test_stop_during_slow_open() {
        let device = CaptureDevice::with_open_delay(Duration::from_millis(200));
        let engine = engine_with(&device);

        thread::scope(|scope| {
            let starter = scope.spawn(|| engine.start(tone(20000)));
            thread::sleep(Duration::from_millis(50));
            engine.stop().unwrap();
            assert!(starter.join().unwrap().is_ok());
        });

        assert_eq!(engine.status(), PlaybackStatus::Stopped);
        assert_eq!(device.open_streams(), 0);
        assert_eq!(device.bytes_written(), 0);
    }

    #[test]
    fn test_unavailable_device_fails_start() {
        let engine = engine_with(&CaptureDevice::unavailable());
        let err = engine.start(tone(10)).unwrap_err();
        assert_eq!(err.error_code(), "DEVICE_UNAVAILABLE");
        assert_eq!(engine.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_device_error_aborts_and_releases() {
        let device = CaptureDevice::failing_after(2048);
        let engine = engine_with(&device);

        engine.start(tone(1000)).unwrap();
        let err = engine.wait().unwrap_err();

        assert_eq!(err.error_code(), "DEVICE_UNAVAILABLE");
        assert_eq!(device.bytes_written(), 2048);
        assert_eq!(device.open_streams(), 0);
        assert_eq!(engine.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let engine = engine_with(&CaptureDevice::new());
        let empty = PcmBuffer::new(Vec::new(), 8000, 2, 2).unwrap();
        assert!(engine.start(empty).is_err());
    }

    #[test]
    fn test_position_increases_while_playing() {
        let device = CaptureDevice::with_write_delay(Duration::from_millis(2));
        let engine = engine_with(&device);

        engine.start(tone(4000)).unwrap();
        let mut last = 0;
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(5));
            let position = engine.position();
            if engine.status() == PlaybackStatus::Stopped {
                break;
            }
            assert!(position >= last);
            last = position;
        }
        engine.stop().unwrap();
    }
}

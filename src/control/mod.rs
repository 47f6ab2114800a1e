// Shared control state - the single place the command reader, the hot-key
// handler and the playback loop meet. Everything goes through one mutex and
// no method holds it across I/O or sleeps.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A pending control request, in the order the playback loop honours them
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    Exit,
    DeviceChange,
    Next,
    Prev,
    Seek(f64),
}

/// One-shot requests waiting for the playback loop
#[derive(Debug, Default)]
struct Pending {
    exit: bool,
    device_change: bool,
    next: bool,
    prev: bool,
    seek: Option<f64>,
}

impl Pending {
    /// Removes and returns the highest-priority request. Lower-priority
    /// requests stay pending for the next call.
    fn take(&mut self, include_seek: bool) -> Option<Request> {
        if std::mem::take(&mut self.exit) {
            return Some(Request::Exit);
        }
        if std::mem::take(&mut self.device_change) {
            return Some(Request::DeviceChange);
        }
        if std::mem::take(&mut self.next) {
            return Some(Request::Next);
        }
        if std::mem::take(&mut self.prev) {
            return Some(Request::Prev);
        }
        if include_seek {
            return self.seek.take().map(Request::Seek);
        }
        None
    }
}

#[derive(Debug)]
struct ControlState {
    playing: bool,
    pause_requested: bool,
    should_play: bool,
    pending: Pending,
    volume: f32,
    current_time: u64,
    duration: u64,
    track_name: String,
    device: Option<usize>,
}

/// Point-in-time copy of the visible player state (the `status` event payload)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub playing: bool,
    pub name: String,
    pub current: u64,
    pub duration: u64,
    pub volume: f32,
}

/// Cheap-to-clone handle to the shared control state
#[derive(Debug, Clone)]
pub struct SharedControl {
    inner: Arc<Mutex<ControlState>>,
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

impl SharedControl {
    pub fn new(volume: f32, device: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ControlState {
                playing: false,
                pause_requested: false,
                should_play: false,
                pending: Pending::default(),
                volume: clamp_volume(volume),
                current_time: 0,
                duration: 0,
                track_name: String::new(),
                device,
            })),
        }
    }

    // The state is plain data, so a panic elsewhere can't leave it half-updated
    // in a way we care about; keep going with whatever is there.
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- requests (command reader / hot-keys) ----

    /// Play/pause toggle. The first toggle latches "first play requested"
    /// instead of flipping the pause flag. Returns whether playback is now
    /// wanted; the loop catches up on its next chunk boundary.
    pub fn toggle(&self) -> bool {
        let mut state = self.lock();
        if !state.should_play {
            state.should_play = true;
            state.pause_requested = false;
        } else {
            state.pause_requested = !state.pause_requested;
        }
        !state.pause_requested
    }

    /// Latch the first-play flag without touching pause (used by `--autoplay`)
    pub fn request_play(&self) {
        self.lock().should_play = true;
    }

    pub fn request_next(&self) {
        self.lock().pending.next = true;
    }

    pub fn request_prev(&self) {
        self.lock().pending.prev = true;
    }

    pub fn request_exit(&self) {
        self.lock().pending.exit = true;
    }

    /// Queue a seek. A newer seek replaces an older one still pending.
    pub fn request_seek(&self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        self.lock().pending.seek = Some(seconds.max(0.0));
    }

    /// Store a new volume, clamped to `[0, 1]`, and return the stored value
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.lock().volume = volume;
        volume
    }

    /// Select an output device. Raises a device-change request only when the
    /// selection actually changed.
    pub fn set_device(&self, device: usize) -> bool {
        let mut state = self.lock();
        if state.device == Some(device) {
            return false;
        }
        state.device = Some(device);
        state.pending.device_change = true;
        true
    }

    // ---- reads ----

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    pub fn device(&self) -> Option<usize> {
        self.lock().device
    }

    pub fn should_play(&self) -> bool {
        self.lock().should_play
    }

    pub fn pause_requested(&self) -> bool {
        self.lock().pause_requested
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn snapshot(&self) -> Status {
        let state = self.lock();
        Status {
            playing: state.playing,
            name: state.track_name.clone(),
            current: state.current_time,
            duration: state.duration,
            volume: state.volume,
        }
    }

    // ---- playback loop side ----

    /// Take the highest-priority pending request, seek included
    pub fn take_request(&self) -> Option<Request> {
        self.lock().pending.take(true)
    }

    /// Take a request that interrupts a paused or idle player. Seeks stay
    /// queued until playback resumes.
    pub fn take_interrupt(&self) -> Option<Request> {
        self.lock().pending.take(false)
    }

    /// Returns true when the flag actually flipped
    pub fn set_playing(&self, playing: bool) -> bool {
        let mut state = self.lock();
        let changed = state.playing != playing;
        state.playing = playing;
        changed
    }

    /// Publish the track that is now current and reset the position. A seek
    /// still pending was meant for the previous track and is dropped.
    pub fn begin_track(&self, name: &str, duration: u64) {
        let mut state = self.lock();
        state.pending.seek = None;
        state.track_name.clear();
        state.track_name.push_str(name);
        state.duration = duration;
        state.current_time = 0;
    }

    /// Returns true when the stored duration changed
    pub fn set_duration(&self, duration: u64) -> bool {
        let mut state = self.lock();
        let changed = state.duration != duration;
        state.duration = duration;
        changed
    }

    pub fn set_current_time(&self, seconds: u64) {
        self.lock().current_time = seconds;
    }
}

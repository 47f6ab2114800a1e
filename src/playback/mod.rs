// The playback loop - owns one output stream per track, pushes fixed-size
// chunks and checks the control state on every chunk boundary

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::loader::{SampleBuffer, TrackLoader};
use crate::audio::output::{OutputDevices, OutputStream, StreamSpec};
use crate::control::{Request, SharedControl};
use crate::error::PlaybackError;
use crate::events::Emitter;

/// Frames per chunk: ~93 ms at 44.1 kHz, so requests are seen well under 100 ms
pub const CHUNK_FRAMES: usize = 4096;

/// Poll interval while paused
pub const PAUSE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    Next,
    Prev,
}

/// How a single track invocation ended
#[derive(Debug)]
pub enum Outcome {
    Finished,
    Skipped(Skip),
    /// Output device changed; resume the same track at `resume_at` seconds
    Interrupted { resume_at: f64 },
    Terminated,
    Errored(PlaybackError),
}

/// What to play and from where
#[derive(Debug, Clone, Copy)]
pub struct PlayRequest<'a> {
    pub track: &'a str,
    pub start_at: f64,
    /// Publish the track as new (track_change). Off when resuming after a
    /// device switch.
    pub announce: bool,
    /// Track expected to play next, decoded in the background once this one
    /// has loaded
    pub upcoming: Option<&'a str>,
}

impl<'a> PlayRequest<'a> {
    pub fn new(track: &'a str) -> Self {
        Self {
            track,
            start_at: 0.0,
            announce: true,
            upcoming: None,
        }
    }

    pub fn resume(track: &'a str, start_at: f64) -> Self {
        Self {
            track,
            start_at,
            announce: false,
            upcoming: None,
        }
    }

    pub fn with_upcoming(mut self, upcoming: Option<&'a str>) -> Self {
        self.upcoming = upcoming;
        self
    }
}

// Ephemeral per-track state, owned only by the loop
struct Session {
    buffer: SampleBuffer,
    cursor: usize,
    duration: u64,
    last_reported: u64,
}

impl Session {
    fn total_frames(&self) -> usize {
        self.buffer.total_frames()
    }

    fn rate(&self) -> usize {
        self.buffer.sample_rate() as usize
    }

    fn position_secs(&self) -> f64 {
        self.cursor as f64 / self.rate() as f64
    }
}

pub struct PlaybackLoop {
    control: SharedControl,
    emitter: Emitter,
    output: Arc<dyn OutputDevices>,
    loader: TrackLoader,
    chunk_frames: usize,
    pause_poll: Duration,
}

impl PlaybackLoop {
    pub fn new(
        control: SharedControl,
        emitter: Emitter,
        output: Arc<dyn OutputDevices>,
        loader: TrackLoader,
    ) -> Self {
        Self {
            control,
            emitter,
            output,
            loader,
            chunk_frames: CHUNK_FRAMES,
            pause_poll: PAUSE_POLL,
        }
    }

    pub fn with_chunk_frames(mut self, chunk_frames: usize) -> Self {
        self.chunk_frames = chunk_frames.max(1);
        self
    }

    pub fn with_pause_poll(mut self, pause_poll: Duration) -> Self {
        self.pause_poll = pause_poll;
        self
    }

    pub fn loader(&self) -> &TrackLoader {
        &self.loader
    }

    /// Play one track until it finishes or a request ends it. Never fails
    /// past this boundary - load and device errors come back as `Errored`.
    pub fn play(&mut self, request: PlayRequest<'_>) -> Outcome {
        let buffer = match self.loader.load(request.track) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Failed to load '{}': {}", request.track, e);
                return Outcome::Errored(e.into());
            }
        };

        if let Some(upcoming) = request.upcoming {
            self.loader.preload(upcoming);
        }

        let duration = buffer.duration_secs();
        if request.announce {
            self.control.begin_track(request.track, duration);
            self.emitter.track_change(request.track, duration);
        } else if self.control.set_duration(duration) {
            // The track was announced with a guessed length (metadata probe
            // failed or disagreed with the decoded samples)
            self.emitter.status(&self.control);
        }

        let spec = StreamSpec {
            sample_rate: buffer.sample_rate(),
            channels: buffer.channels(),
        };
        let mut stream = match self.output.open(spec, self.control.device()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to open output for '{}': {}", request.track, e);
                return Outcome::Errored(e.into());
            }
        };

        let rate = buffer.sample_rate() as f64;
        let start = ((request.start_at.max(0.0) * rate) as usize).min(buffer.total_frames());
        let mut session = Session {
            cursor: start,
            last_reported: (start as f64 / rate) as u64,
            duration,
            buffer,
        };
        self.control.set_current_time(session.last_reported);

        info!(
            "Playing '{}' from {:.1}s ({}s total)",
            request.track,
            session.position_secs(),
            duration
        );
        // Opening straight into a pause (e.g. a device switch while paused)
        // shouldn't flash a play state
        if !self.control.pause_requested() && self.control.set_playing(true) {
            self.emitter.play_state(true);
        }

        let mut outcome = self.stream(&mut session, stream.as_mut());
        if matches!(outcome, Outcome::Finished) {
            outcome = self.drain(&session, stream.as_mut());
        }
        stream.close();

        if matches!(outcome, Outcome::Finished) {
            self.control.set_playing(false);
        }
        debug!("'{}' ended: {:?}", request.track, outcome);
        outcome
    }

    fn stream(&self, session: &mut Session, stream: &mut dyn OutputStream) -> Outcome {
        let channels = session.buffer.channels() as usize;
        let mut chunk = Vec::with_capacity(self.chunk_frames * channels);

        while session.cursor < session.total_frames() {
            if let Some(request) = self.control.take_request() {
                match request {
                    Request::Seek(seconds) => self.seek(session, seconds),
                    other => {
                        if let Some(outcome) = self.stop_outcome(other, session) {
                            return outcome;
                        }
                    }
                }
            }

            if self.control.pause_requested() {
                if let Some(outcome) = self.wait_while_paused(session, stream) {
                    return outcome;
                }
                continue;
            }

            let end = (session.cursor + self.chunk_frames).min(session.total_frames());
            let volume = self.control.volume();
            chunk.clear();
            chunk.extend(
                session
                    .buffer
                    .frame_range(session.cursor, end)
                    .iter()
                    .map(|sample| sample * volume),
            );
            if let Err(e) = stream.write(&chunk) {
                warn!("Output write failed: {}", e);
                return Outcome::Errored(e.into());
            }

            session.cursor = end;
            let elapsed = (session.cursor / session.rate()) as u64;
            if elapsed != session.last_reported {
                session.last_reported = elapsed;
                self.control.set_current_time(elapsed);
                self.emitter.progress(elapsed, session.duration);
            }
        }

        Outcome::Finished
    }

    /// Let the device play out what is still queued after the last chunk.
    /// Exit, skips and device changes cut the tail short.
    fn drain(&self, session: &Session, stream: &mut dyn OutputStream) -> Outcome {
        let mut interrupt = None;
        stream.drain(&mut || {
            interrupt = self.control.take_interrupt();
            interrupt.is_none()
        });
        interrupt
            .and_then(|request| self.stop_outcome(request, session))
            .unwrap_or(Outcome::Finished)
    }

    /// Terminal outcome for a request, `None` for seeks
    fn stop_outcome(&self, request: Request, session: &Session) -> Option<Outcome> {
        match request {
            Request::Exit => Some(Outcome::Terminated),
            Request::DeviceChange => Some(Outcome::Interrupted {
                resume_at: session.position_secs(),
            }),
            Request::Next => Some(Outcome::Skipped(Skip::Next)),
            Request::Prev => Some(Outcome::Skipped(Skip::Prev)),
            Request::Seek(_) => None,
        }
    }

    fn seek(&self, session: &mut Session, seconds: f64) {
        let target = (seconds.max(0.0) * session.rate() as f64) as usize;
        let last_start = session.total_frames().saturating_sub(self.chunk_frames);
        session.cursor = target.min(last_start);

        let current = (session.cursor / session.rate()) as u64;
        session.last_reported = current;
        self.control.set_current_time(current);
        self.emitter.progress(current, session.duration);
        debug!("Seeked to {:.2}s", session.position_secs());
    }

    /// Hold the stream until the pause is lifted. Returns an outcome if a
    /// request ended the track while paused.
    fn wait_while_paused(
        &self,
        session: &Session,
        stream: &mut dyn OutputStream,
    ) -> Option<Outcome> {
        if self.control.set_playing(false) {
            self.emitter.play_state(false);
        }
        stream.pause();
        debug!("Paused at {:.2}s", session.position_secs());

        loop {
            if let Some(request) = self.control.take_interrupt() {
                if let Some(outcome) = self.stop_outcome(request, session) {
                    return Some(outcome);
                }
            }
            if !self.control.pause_requested() {
                break;
            }
            thread::sleep(self.pause_poll);
        }

        stream.resume();
        if self.control.set_playing(true) {
            self.emitter.play_state(true);
        }
        debug!("Resumed at {:.2}s", session.position_secs());
        None
    }
}

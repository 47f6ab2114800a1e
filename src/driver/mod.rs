// Driving routine - decides what the playback loop plays next based on how
// the last track ended. Runs on its own thread for the life of the process.

use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::audio::playlist::{Sequencer, TrackSource};
use crate::control::{Request, SharedControl};
use crate::events::Emitter;
use crate::playback::{Outcome, PlayRequest, PlaybackLoop, Skip, PAUSE_POLL};

/// Poll interval while the playlist is empty or every track failed
pub const IDLE_POLL: Duration = Duration::from_millis(500);

pub struct Driver<S> {
    control: SharedControl,
    emitter: Emitter,
    sequencer: Sequencer<S>,
    player: PlaybackLoop,
    idle_poll: Duration,
    cue_poll: Duration,
}

impl<S: TrackSource> Driver<S> {
    pub fn new(
        control: SharedControl,
        emitter: Emitter,
        sequencer: Sequencer<S>,
        player: PlaybackLoop,
    ) -> Self {
        Self {
            control,
            emitter,
            sequencer,
            player,
            idle_poll: IDLE_POLL,
            cue_poll: PAUSE_POLL,
        }
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    pub fn with_cue_poll(mut self, cue_poll: Duration) -> Self {
        self.cue_poll = cue_poll;
        self
    }

    /// Run until an exit request is observed
    pub fn run(&mut self) {
        let Some(mut track) = self.cue_first_track() else {
            info!("Exit requested before playback started");
            return;
        };

        // The cued track was already announced while waiting for play
        let mut start_at = 0.0;
        let mut announce = false;
        let mut failures = 0usize;

        loop {
            // Decode the following track while this one plays
            let upcoming = self.sequencer.peek_next().map(str::to_string);
            let outcome = self.player.play(PlayRequest {
                track: &track,
                start_at,
                announce,
                upcoming: upcoming.as_deref(),
            });
            start_at = 0.0;
            announce = true;

            let step = match outcome {
                Outcome::Finished | Outcome::Skipped(Skip::Next) => {
                    failures = 0;
                    Skip::Next
                }
                Outcome::Skipped(Skip::Prev) => {
                    failures = 0;
                    Skip::Prev
                }
                Outcome::Errored(e) => {
                    self.emitter.error(format!("{}: {}", track, e));
                    failures += 1;
                    // Every track in the order failed in a row: back off and
                    // re-list instead of spinning through broken files
                    if failures >= self.sequencer.len().max(1) {
                        warn!("No track could be played, waiting before retrying");
                        failures = 0;
                        self.sequencer.invalidate();
                        if !self.idle() {
                            break;
                        }
                    }
                    Skip::Next
                }
                Outcome::Interrupted { resume_at } => {
                    info!("Output device changed, resuming '{}' at {:.1}s", track, resume_at);
                    start_at = resume_at;
                    announce = false;
                    continue;
                }
                Outcome::Terminated => break,
            };

            match self.advance(step) {
                Some(next) => track = next,
                None => break,
            }
        }

        self.control.set_playing(false);
        info!("Playback driver stopped");
    }

    /// Pick the first track, publish it and start decoding it in the
    /// background, then hold until the first play request. Next/prev while
    /// waiting re-cue. `None` means exit.
    fn cue_first_track(&mut self) -> Option<String> {
        let mut track = self.advance(Skip::Next)?;
        self.cue(&track);

        while !self.control.should_play() {
            match self.control.take_interrupt() {
                Some(Request::Exit) => return None,
                Some(Request::Next) => {
                    track = self.advance(Skip::Next)?;
                    self.cue(&track);
                }
                Some(Request::Prev) => {
                    track = self.advance(Skip::Prev)?;
                    self.cue(&track);
                }
                // Device is picked when the stream opens
                Some(Request::DeviceChange) | Some(Request::Seek(_)) | None => {}
            }
            thread::sleep(self.cue_poll);
        }
        Some(track)
    }

    fn cue(&self, track: &str) {
        let loader = self.player.loader();
        let duration = match loader.probe(track) {
            Ok(info) => info.duration,
            Err(e) => {
                warn!("Failed to read metadata of '{}': {}", track, e);
                0
            }
        };
        self.control.begin_track(track, duration);
        self.emitter.track_change(track, duration);
        loader.preload(track);
        info!("Cued '{}' ({}s)", track, duration);
    }

    /// Next/previous track, idling while the playlist is empty. `None` means exit.
    fn advance(&mut self, step: Skip) -> Option<String> {
        loop {
            let track = match step {
                Skip::Next => self.sequencer.next(),
                Skip::Prev => self.sequencer.previous(),
            };
            if track.is_some() {
                return track;
            }

            warn!("No playable tracks found");
            self.emitter.error("no playable tracks found");
            if !self.idle() {
                return None;
            }
        }
    }

    /// Sleep one idle interval. Returns false if exit was requested.
    fn idle(&self) -> bool {
        // Skips mean nothing without a track; only exit matters here
        while let Some(request) = self.control.take_interrupt() {
            if request == Request::Exit {
                return false;
            }
        }
        thread::sleep(self.idle_poll);
        true
    }
}

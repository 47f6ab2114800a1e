// Outward notifications. Every observable transition maps to exactly one
// event, written as one JSON object per line for the host process.

use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::audio::output::DeviceInfo;
use crate::control::{SharedControl, Status};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    Ready {
        devices: Vec<DeviceInfo>,
        device: Option<usize>,
    },
    Status(Status),
    TrackChange {
        name: String,
        duration: u64,
    },
    PlayState {
        playing: bool,
    },
    Progress {
        current: u64,
        duration: u64,
    },
    Devices {
        devices: Vec<DeviceInfo>,
        current: Option<usize>,
    },
    Volume {
        volume: f32,
    },
    Error {
        message: String,
    },
}

/// Receives events. Delivery is fire-and-forget.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &Event);
}

/// Writes each event as a single JSON line and flushes immediately
pub struct JsonLines<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLines<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> EventSink for JsonLines<W> {
    fn send(&self, event: &Event) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize event {:?}: {}", event, e);
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            // Host went away - nothing useful to do but note it
            warn!("Failed to deliver event: {}", e);
        }
    }
}

/// Handle used by the loop, the driver and the command reader to publish events
#[derive(Clone)]
pub struct Emitter {
    sink: Arc<dyn EventSink>,
}

impl Emitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Emitter writing JSON lines to the process stdout
    pub fn stdout() -> Self {
        Self::new(Arc::new(JsonLines::new(std::io::stdout())))
    }

    pub fn emit(&self, event: Event) {
        debug!(?event, "emit");
        self.sink.send(&event);
    }

    pub fn status(&self, control: &SharedControl) {
        self.emit(Event::Status(control.snapshot()));
    }

    pub fn track_change(&self, name: &str, duration: u64) {
        self.emit(Event::TrackChange {
            name: name.to_string(),
            duration,
        });
    }

    pub fn play_state(&self, playing: bool) {
        self.emit(Event::PlayState { playing });
    }

    pub fn progress(&self, current: u64, duration: u64) {
        self.emit(Event::Progress { current, duration });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Event::Error {
            message: message.into(),
        });
    }
}

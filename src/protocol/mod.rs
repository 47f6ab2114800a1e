// Inbound side of the pipe protocol: one JSON object per line, tagged by
// `command`. Each command becomes a control-state mutation or a status query.

use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn};

use crate::audio::output::OutputDevices;
use crate::control::SharedControl;
use crate::error::CommandError;
use crate::events::{Emitter, Event};

fn default_volume() -> f32 {
    0.8
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Toggle,
    Next,
    Prev,
    Seek {
        #[serde(default)]
        position: f64,
    },
    SetVolume {
        #[serde(default = "default_volume")]
        volume: f32,
    },
    GetStatus,
    GetDevices,
    SetDevice {
        device_id: usize,
    },
    Exit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        Ok(serde_json::from_str(line)?)
    }
}

/// Applies commands to the shared state and answers queries
#[derive(Clone)]
pub struct CommandHandler {
    control: SharedControl,
    emitter: Emitter,
    output: Arc<dyn OutputDevices>,
}

impl CommandHandler {
    pub fn new(control: SharedControl, emitter: Emitter, output: Arc<dyn OutputDevices>) -> Self {
        Self {
            control,
            emitter,
            output,
        }
    }

    /// Parse and apply one inbound line. Returns false once exit was requested.
    pub fn handle_line(&self, line: &str) -> bool {
        match Command::parse(line) {
            Ok(command) => self.apply(command),
            Err(CommandError::Empty) => true,
            Err(e) => {
                warn!("Dropping command {:?}: {}", line, e);
                self.emitter.error(e.to_string());
                true
            }
        }
    }

    pub fn apply(&self, command: Command) -> bool {
        debug!(?command, "command");
        match command {
            Command::Toggle => {
                // Report what was asked for; the loop's play_state follows
                // once it reaches a chunk boundary
                let mut status = self.control.snapshot();
                status.playing = self.control.toggle();
                self.emitter.emit(Event::Status(status));
            }
            Command::Next => self.control.request_next(),
            Command::Prev => self.control.request_prev(),
            Command::Seek { position } => self.control.request_seek(position),
            Command::SetVolume { volume } => {
                let volume = self.control.set_volume(volume);
                self.emitter.emit(Event::Volume { volume });
            }
            Command::GetStatus => self.emitter.status(&self.control),
            Command::GetDevices => self.emit_devices(),
            Command::SetDevice { device_id } => {
                let known = self.output.list().iter().any(|d| d.id == device_id);
                if !known {
                    warn!("Ignoring unknown output device {}", device_id);
                    self.emitter.error(format!("unknown output device {}", device_id));
                    return true;
                }
                if self.control.set_device(device_id) {
                    info!("Switching output to device {}", device_id);
                }
                self.emit_devices();
            }
            Command::Exit => {
                self.control.request_exit();
                return false;
            }
        }
        true
    }

    fn emit_devices(&self) {
        self.emitter.emit(Event::Devices {
            devices: self.output.list(),
            current: self.control.device(),
        });
    }
}

/// Feed every line from `reader` to `handler` until an exit command or end
/// of input. Lines that aren't valid UTF-8 are decoded lossily and rejected
/// as malformed like any other bad command.
pub async fn read_commands<R>(mut reader: R, handler: &CommandHandler)
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                info!("Command input closed, shutting down");
                handler.control.request_exit();
                return;
            }
            Ok(_) => {
                if !handler.handle_line(&String::from_utf8_lossy(&line)) {
                    return;
                }
            }
            Err(e) => {
                error!("Failed to read command input: {}", e);
                handler.control.request_exit();
                return;
            }
        }
    }
}

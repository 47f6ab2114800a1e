// Error types for the playback core
// Nothing in here is fatal on its own - the playback loop turns load and
// device failures into an `Errored` outcome and the driver moves on

use std::path::PathBuf;
use thiserror::Error;

/// A track could not be opened or decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("track not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read track: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported audio format or corrupted file: {0}")]
    Unsupported(String),

    #[error("track '{0}' contains no audio frames")]
    Empty(String),
}

/// The output device could not be opened or refused samples
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no output device available")]
    NoDevice,

    #[error("unknown output device id {0}")]
    UnknownDevice(usize),

    #[error("failed to open output stream: {0}")]
    Open(String),

    #[error("failed to write to output stream: {0}")]
    Write(String),
}

/// Payload of an `Errored` playback outcome
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// An inbound command line that could not be understood
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command line")]
    Empty,

    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),
}

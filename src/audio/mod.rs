pub mod loader;
pub mod output;
pub mod playlist;
pub mod scanner;

pub use loader::{SampleBuffer, TrackDecoder, TrackInfo, TrackLoader};
pub use output::{DeviceInfo, OutputDevices, OutputStream, StreamSpec};
pub use playlist::{Sequencer, TrackSource};
pub use scanner::MusicScanner;

#[cfg(feature = "audio")]
pub use loader::FileDecoder;
#[cfg(feature = "audio")]
pub use output::RodioOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Ogg,
    Mp4,
    Wav,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "flac" => AudioFormat::Flac,
            "ogg" | "oga" => AudioFormat::Ogg,
            "mp4" | "m4a" | "aac" => AudioFormat::Mp4,
            "wav" => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, AudioFormat::Unknown)
    }
}

// pomotune library - headless music engine driven over stdin/stdout
// The binary only wires these together; everything testable lives here

pub mod audio;    // decoding, output devices, track discovery and ordering
pub mod config;   // settings file
pub mod control;  // state shared between the command reader and playback
pub mod driver;   // picks what plays next
pub mod error;
pub mod events;   // outbound JSON events
pub mod playback; // chunked playback loop
pub mod protocol; // inbound JSON commands

#[cfg(test)]
mod testing;

// Export the stuff the binary actually uses
pub use audio::{MusicScanner, Sequencer, TrackLoader};
pub use config::Config;
pub use control::SharedControl;
pub use driver::Driver;
pub use events::{Emitter, Event};
pub use playback::PlaybackLoop;
pub use protocol::CommandHandler;

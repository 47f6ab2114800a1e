use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::DecodeError;

/// Fully decoded track: interleaved f32 frames
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl SampleBuffer {
    /// Trailing samples that don't make up a whole frame are dropped
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn total_frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Whole seconds, truncated
    pub fn duration_secs(&self) -> u64 {
        self.total_frames() as u64 / self.sample_rate as u64
    }

    pub fn frame(&self, index: usize) -> &[f32] {
        let ch = self.channels as usize;
        &self.samples[index * ch..(index + 1) * ch]
    }

    /// Interleaved samples for frames `start..end`
    pub fn frame_range(&self, start: usize, end: usize) -> &[f32] {
        let ch = self.channels as usize;
        &self.samples[start * ch..end * ch]
    }

    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            sample_rate: self.sample_rate,
            channels: self.channels,
            total_frames: self.total_frames() as u64,
            duration: self.duration_secs(),
        }
    }
}

/// Metadata known before (or without) decoding the samples
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub total_frames: u64,
    pub duration: u64,
}

/// Turns a track name into samples
pub trait TrackDecoder: Send + Sync {
    fn decode(&self, name: &str) -> Result<SampleBuffer, DecodeError>;

    /// Metadata only. The default decodes everything, so override it when
    /// there is a cheaper way.
    fn probe(&self, name: &str) -> Result<TrackInfo, DecodeError> {
        self.decode(name).map(|buffer| buffer.info())
    }
}

struct Preloaded {
    name: String,
    handle: JoinHandle<Result<SampleBuffer, DecodeError>>,
}

/// One-entry, single-use cache for a track being decoded in the background
#[derive(Default)]
pub struct PreloadCache {
    slot: Mutex<Option<Preloaded>>,
}

impl PreloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start decoding `name` on a background thread, replacing any earlier entry
    pub fn spawn(&self, decoder: Arc<dyn TrackDecoder>, name: &str) {
        let owned = name.to_string();
        let spawned = thread::Builder::new()
            .name("preload".to_string())
            .spawn(move || decoder.decode(&owned));

        match spawned {
            Ok(handle) => {
                debug!("Preloading '{}'", name);
                let previous = self
                    .slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .replace(Preloaded {
                        name: name.to_string(),
                        handle,
                    });
                if let Some(previous) = previous {
                    debug!("Dropped stale preload of '{}'", previous.name);
                }
            }
            Err(e) => warn!("Failed to start preload of '{}': {}", name, e),
        }
    }

    /// Remove the entry. Returns the decode result (waiting for it if still
    /// running) only when it was for `name`; any other entry is discarded.
    pub fn take(&self, name: &str) -> Option<Result<SampleBuffer, DecodeError>> {
        let entry = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        if entry.name != name {
            debug!("Discarding preload of '{}' (wanted '{}')", entry.name, name);
            return None;
        }

        match entry.handle.join() {
            Ok(result) => Some(result),
            Err(_) => {
                warn!("Preload thread for '{}' panicked", name);
                None
            }
        }
    }

    pub fn pending_name(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|entry| entry.name.clone())
    }
}

/// Resolves tracks into sample buffers, preferring a matching preload
pub struct TrackLoader {
    decoder: Arc<dyn TrackDecoder>,
    preload: PreloadCache,
}

impl TrackLoader {
    pub fn new(decoder: Arc<dyn TrackDecoder>) -> Self {
        Self {
            decoder,
            preload: PreloadCache::new(),
        }
    }

    pub fn probe(&self, name: &str) -> Result<TrackInfo, DecodeError> {
        self.decoder.probe(name)
    }

    /// Start decoding `name` in the background unless that is already underway
    pub fn preload(&self, name: &str) {
        if self.preload.pending_name().as_deref() == Some(name) {
            return;
        }
        self.preload.spawn(self.decoder.clone(), name);
    }

    pub fn load(&self, name: &str) -> Result<SampleBuffer, DecodeError> {
        if let Some(result) = self.preload.take(name) {
            info!("Using preloaded samples for '{}'", name);
            return result;
        }
        self.decoder.decode(name)
    }

    pub fn preloaded_name(&self) -> Option<String> {
        self.preload.pending_name()
    }
}

#[cfg(feature = "audio")]
pub use self::file_decoder::FileDecoder;

#[cfg(feature = "audio")]
mod file_decoder {
    use super::{SampleBuffer, TrackDecoder, TrackInfo};
    use crate::error::DecodeError;
    use rodio::Source;
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};
    use tracing::debug;

    /// Decodes files under a music directory with rodio (symphonia underneath)
    #[derive(Debug, Clone)]
    pub struct FileDecoder {
        root: PathBuf,
    }

    impl FileDecoder {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        fn resolve(&self, name: &str) -> Result<PathBuf, DecodeError> {
            let path = self.root.join(name);
            if !path.is_file() {
                return Err(DecodeError::NotFound(path));
            }
            Ok(path)
        }

        fn open(path: &Path) -> Result<rodio::Decoder<BufReader<File>>, DecodeError> {
            let file = File::open(path)?;
            rodio::Decoder::new(BufReader::new(file))
                .map_err(|e| DecodeError::Unsupported(format!("{}: {}", path.display(), e)))
        }
    }

    impl TrackDecoder for FileDecoder {
        fn decode(&self, name: &str) -> Result<SampleBuffer, DecodeError> {
            let path = self.resolve(name)?;
            let source = Self::open(&path)?;
            let channels = source.channels();
            let sample_rate = source.sample_rate();

            let samples: Vec<f32> = source.convert_samples::<f32>().collect();
            let buffer = SampleBuffer::new(samples, sample_rate, channels);
            if buffer.total_frames() == 0 {
                return Err(DecodeError::Empty(name.to_string()));
            }

            debug!(
                "Decoded '{}': {} frames at {} Hz, {} channel(s)",
                name,
                buffer.total_frames(),
                sample_rate,
                channels
            );
            Ok(buffer)
        }

        #[cfg(feature = "probe")]
        fn probe(&self, name: &str) -> Result<TrackInfo, DecodeError> {
            let path = self.resolve(name)?;
            match probe_container(&path) {
                Some(info) => Ok(info),
                // Container didn't say - pay for the full decode
                None => self.decode(name).map(|buffer| buffer.info()),
            }
        }

        #[cfg(not(feature = "probe"))]
        fn probe(&self, name: &str) -> Result<TrackInfo, DecodeError> {
            let path = self.resolve(name)?;
            let source = Self::open(&path)?;
            match source.total_duration() {
                Some(total) => {
                    let sample_rate = source.sample_rate().max(1);
                    let total_frames = (total.as_secs_f64() * sample_rate as f64) as u64;
                    Ok(TrackInfo {
                        sample_rate,
                        channels: source.channels(),
                        total_frames,
                        duration: total_frames / sample_rate as u64,
                    })
                }
                None => self.decode(name).map(|buffer| buffer.info()),
            }
        }
    }

    /// Read frame count and rate from the container header without decoding
    #[cfg(feature = "probe")]
    fn probe_container(path: &Path) -> Option<TrackInfo> {
        use symphonia::core::formats::FormatOptions;
        use symphonia::core::io::MediaSourceStream;
        use symphonia::core::meta::MetadataOptions;
        use symphonia::core::probe::Hint;

        let file = File::open(path).ok()?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .ok()?;

        let track = probed.format.default_track()?;
        let params = &track.codec_params;
        let sample_rate = params.sample_rate?.max(1);
        let total_frames = params.n_frames?;
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);

        Some(TrackInfo {
            sample_rate,
            channels,
            total_frames,
            duration: total_frames / sample_rate as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDecoder;

    #[test]
    fn test_buffer_geometry() {
        let buffer = SampleBuffer::new(vec![0.1, 0.2, 0.3, 0.4, 0.5], 2, 2);
        assert_eq!(buffer.total_frames(), 2);
        assert_eq!(buffer.frame(1), &[0.3, 0.4]);
        assert_eq!(buffer.frame_range(0, 2), &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(buffer.duration_secs(), 1);
    }

    #[test]
    fn test_duration_truncates() {
        // 2.9 seconds of mono audio at 10 Hz
        let buffer = SampleBuffer::new(vec![0.0; 29], 10, 1);
        assert_eq!(buffer.duration_secs(), 2);
    }

    #[test]
    fn test_preload_is_single_use() {
        let decoder = Arc::new(MemoryDecoder::new().with_ramp("a.wav", 100, 1, 50));
        let loader = TrackLoader::new(decoder.clone());

        loader.preload("a.wav");
        assert_eq!(loader.preloaded_name().as_deref(), Some("a.wav"));

        let buffer = loader.load("a.wav").unwrap();
        assert_eq!(buffer.total_frames(), 50);
        assert_eq!(loader.preloaded_name(), None);
        assert_eq!(decoder.decode_count("a.wav"), 1);

        // Second load goes back to the decoder
        loader.load("a.wav").unwrap();
        assert_eq!(decoder.decode_count("a.wav"), 2);
    }

    #[test]
    fn test_repeated_preload_decodes_once() {
        let decoder = Arc::new(MemoryDecoder::new().with_ramp("a.wav", 100, 1, 50));
        let loader = TrackLoader::new(decoder.clone());

        loader.preload("a.wav");
        loader.preload("a.wav");
        loader.load("a.wav").unwrap();
        assert_eq!(decoder.decode_count("a.wav"), 1);
    }

    #[test]
    fn test_mismatched_preload_is_discarded() {
        let decoder = Arc::new(
            MemoryDecoder::new()
                .with_ramp("a.wav", 100, 1, 10)
                .with_ramp("b.wav", 100, 1, 20),
        );
        let loader = TrackLoader::new(decoder.clone());

        loader.preload("a.wav");
        let buffer = loader.load("b.wav").unwrap();
        assert_eq!(buffer.total_frames(), 20);
        assert_eq!(loader.preloaded_name(), None);
    }

    #[test]
    fn test_missing_track_is_an_error() {
        let loader = TrackLoader::new(Arc::new(MemoryDecoder::new()));
        assert!(matches!(
            loader.load("ghost.wav"),
            Err(DecodeError::NotFound(_))
        ));
        assert!(loader.probe("ghost.wav").is_err());
    }

    #[test]
    fn test_preload_failure_is_reported_on_load() {
        let loader = TrackLoader::new(Arc::new(MemoryDecoder::new()));
        loader.preload("ghost.wav");
        assert!(loader.load("ghost.wav").is_err());
    }
}

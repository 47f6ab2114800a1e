// In-memory stand-ins for the decoder, the output device and the event sink

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio::loader::{SampleBuffer, TrackDecoder, TrackInfo};
use crate::audio::output::{DeviceInfo, OutputDevices, OutputStream, StreamSpec};
use crate::audio::playlist::TrackSource;
use crate::error::{DecodeError, DeviceError};
use crate::events::{Event, EventSink};

#[derive(Default)]
pub struct MemoryDecoder {
    tracks: HashMap<String, SampleBuffer>,
    decodes: Mutex<HashMap<String, usize>>,
    no_metadata: bool,
}

impl MemoryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample `i` of the track has the value `i`, so every frame is traceable
    pub fn with_ramp(self, name: &str, sample_rate: u32, channels: u16, frames: usize) -> Self {
        let samples = (0..frames * channels as usize).map(|i| i as f32).collect();
        self.with_buffer(name, SampleBuffer::new(samples, sample_rate, channels))
    }

    pub fn with_constant(
        self,
        name: &str,
        sample_rate: u32,
        channels: u16,
        frames: usize,
        value: f32,
    ) -> Self {
        let samples = vec![value; frames * channels as usize];
        self.with_buffer(name, SampleBuffer::new(samples, sample_rate, channels))
    }

    pub fn with_buffer(mut self, name: &str, buffer: SampleBuffer) -> Self {
        self.tracks.insert(name.to_string(), buffer);
        self
    }

    /// Probing fails as if the container carried no length, decoding still works
    pub fn without_probe(mut self) -> Self {
        self.no_metadata = true;
        self
    }

    pub fn decode_count(&self, name: &str) -> usize {
        self.decodes.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl TrackDecoder for MemoryDecoder {
    fn decode(&self, name: &str) -> Result<SampleBuffer, DecodeError> {
        *self.decodes.lock().unwrap().entry(name.to_string()).or_default() += 1;
        self.tracks
            .get(name)
            .cloned()
            .ok_or_else(|| DecodeError::NotFound(PathBuf::from(name)))
    }

    // Metadata straight from the stored buffer; doesn't count as a decode
    fn probe(&self, name: &str) -> Result<TrackInfo, DecodeError> {
        if self.no_metadata {
            return Err(DecodeError::Unsupported(format!("{}: no metadata", name)));
        }
        self.tracks
            .get(name)
            .map(SampleBuffer::info)
            .ok_or_else(|| DecodeError::NotFound(PathBuf::from(name)))
    }
}

/// Fixed list of names standing in for a scanned directory
#[derive(Clone, Default)]
pub struct StaticSource {
    names: Arc<Mutex<Vec<String>>>,
}

impl StaticSource {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: Arc::new(Mutex::new(names.iter().map(|n| n.to_string()).collect())),
        }
    }

    pub fn set(&self, names: &[&str]) {
        *self.names.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }
}

impl TrackSource for StaticSource {
    fn list_tracks(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

/// Everything the fake output saw
#[derive(Debug, Default)]
pub struct StreamLog {
    pub opened: Vec<(StreamSpec, Option<usize>)>,
    pub writes: Vec<Vec<f32>>,
    pub pauses: usize,
    pub resumes: usize,
    pub drains: usize,
    pub closes: usize,
    pub open_now: usize,
    pub max_open: usize,
}

type WriteHook = Box<dyn FnMut(usize) + Send>;

/// Output that records writes and can run a hook after each one, so tests can
/// raise control requests at an exact chunk boundary
#[derive(Clone)]
pub struct FakeOutput {
    devices: Vec<DeviceInfo>,
    log: Arc<Mutex<StreamLog>>,
    hook: Arc<Mutex<Option<WriteHook>>>,
    fail_open: bool,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self {
            devices: vec![
                DeviceInfo {
                    id: 0,
                    name: "Speakers".to_string(),
                    default: true,
                },
                DeviceInfo {
                    id: 1,
                    name: "Headphones".to_string(),
                    default: false,
                },
            ],
            log: Arc::new(Mutex::new(StreamLog::default())),
            hook: Arc::new(Mutex::new(None)),
            fail_open: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    /// Hook receives the zero-based index of the write that just completed
    pub fn on_write(self, hook: impl FnMut(usize) + Send + 'static) -> Self {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn log(&self) -> MutexGuard<'_, StreamLog> {
        self.log.lock().unwrap()
    }

    pub fn written(&self) -> Vec<f32> {
        self.log().writes.concat()
    }
}

impl OutputDevices for FakeOutput {
    fn list(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    fn open(
        &self,
        spec: StreamSpec,
        device: Option<usize>,
    ) -> Result<Box<dyn OutputStream>, DeviceError> {
        if self.fail_open {
            return Err(DeviceError::NoDevice);
        }
        let mut log = self.log();
        log.opened.push((spec, device));
        log.open_now += 1;
        log.max_open = log.max_open.max(log.open_now);
        Ok(Box::new(FakeStream {
            log: self.log.clone(),
            hook: self.hook.clone(),
            paused: false,
        }))
    }
}

struct FakeStream {
    log: Arc<Mutex<StreamLog>>,
    hook: Arc<Mutex<Option<WriteHook>>>,
    paused: bool,
}

impl OutputStream for FakeStream {
    fn write(&mut self, samples: &[f32]) -> Result<(), DeviceError> {
        assert!(!self.paused, "write on a paused stream");
        let index = {
            let mut log = self.log.lock().unwrap();
            log.writes.push(samples.to_vec());
            log.writes.len() - 1
        };
        if let Some(hook) = self.hook.lock().unwrap().as_mut() {
            hook(index);
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
        self.log.lock().unwrap().pauses += 1;
    }

    fn resume(&mut self) {
        self.paused = false;
        self.log.lock().unwrap().resumes += 1;
    }

    // Nothing is ever queued, so one poll is all the caller gets
    fn drain(&mut self, keep_waiting: &mut dyn FnMut() -> bool) {
        self.log.lock().unwrap().drains += 1;
        keep_waiting();
    }

    fn close(self: Box<Self>) {
        let mut log = self.log.lock().unwrap();
        log.closes += 1;
        log.open_now -= 1;
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Progress { current, .. } => Some(current),
                _ => None,
            })
            .collect()
    }

    pub fn play_states(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::PlayState { playing } => Some(playing),
                _ => None,
            })
            .collect()
    }

    pub fn track_changes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::TrackChange { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

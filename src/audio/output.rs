use serde::Serialize;

use crate::error::DeviceError;

/// An output device as reported to the host process. `id` is the device's
/// position in the host enumeration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub id: usize,
    pub name: String,
    pub default: bool,
}

/// Shape of the samples a stream will be fed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// An open, writable output stream. Owned by the playback loop for one track.
pub trait OutputStream {
    /// Queue interleaved samples, blocking until the device has room for them
    fn write(&mut self, samples: &[f32]) -> Result<(), DeviceError>;

    /// Stop consuming without closing the stream
    fn pause(&mut self);

    fn resume(&mut self);

    /// Block until everything written so far has been played. `keep_waiting`
    /// is polled while samples are still queued; returning false abandons the
    /// tail.
    fn drain(&mut self, keep_waiting: &mut dyn FnMut() -> bool);

    /// Stop and release the device, dropping anything still queued
    fn close(self: Box<Self>);
}

/// Enumerates output devices and opens streams on them
pub trait OutputDevices: Send + Sync {
    fn list(&self) -> Vec<DeviceInfo>;

    /// Open a stream on `device`, or the system default when `None`
    fn open(
        &self,
        spec: StreamSpec,
        device: Option<usize>,
    ) -> Result<Box<dyn OutputStream>, DeviceError>;
}

#[cfg(feature = "audio")]
pub use self::rodio_backend::RodioOutput;

#[cfg(feature = "audio")]
mod rodio_backend {
    use super::{DeviceInfo, OutputDevices, OutputStream, StreamSpec};
    use crate::error::DeviceError;
    use rodio::buffer::SamplesBuffer;
    use rodio::cpal::traits::{DeviceTrait, HostTrait};
    use rodio::cpal::Device;
    use rodio::{OutputStreamHandle, Sink};
    use std::time::{Duration, Instant};
    use tracing::{debug, info, warn};

    // Chunks allowed to sit in the sink before `write` blocks
    const QUEUE_DEPTH: usize = 2;
    const DRAIN_POLL: Duration = Duration::from_millis(2);
    // A sink that stops draining this long means the device is gone
    const STALL_TIMEOUT: Duration = Duration::from_secs(3);

    /// Output devices of the default cpal host, played through rodio sinks
    #[derive(Debug, Default, Clone, Copy)]
    pub struct RodioOutput;

    impl RodioOutput {
        pub fn new() -> Self {
            Self
        }

        fn find_device(&self, id: usize) -> Result<Device, DeviceError> {
            let host = rodio::cpal::default_host();
            host.output_devices()
                .map_err(|e| DeviceError::Open(e.to_string()))?
                .nth(id)
                .ok_or(DeviceError::UnknownDevice(id))
        }

        fn default_device(&self) -> Result<Device, DeviceError> {
            rodio::cpal::default_host()
                .default_output_device()
                .ok_or(DeviceError::NoDevice)
        }
    }

    impl OutputDevices for RodioOutput {
        fn list(&self) -> Vec<DeviceInfo> {
            let host = rodio::cpal::default_host();
            let default_name = host
                .default_output_device()
                .and_then(|device| device.name().ok());

            let devices = match host.output_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    warn!("Failed to enumerate output devices: {}", e);
                    return Vec::new();
                }
            };

            devices
                .enumerate()
                .map(|(id, device)| {
                    let name = device.name().unwrap_or_else(|_| format!("Device {}", id));
                    let default = default_name.as_deref() == Some(name.as_str());
                    DeviceInfo { id, name, default }
                })
                .collect()
        }

        fn open(
            &self,
            spec: StreamSpec,
            device: Option<usize>,
        ) -> Result<Box<dyn OutputStream>, DeviceError> {
            let device = match device {
                Some(id) => match self.find_device(id) {
                    Ok(device) => device,
                    Err(e) => {
                        warn!("{}, falling back to the default device", e);
                        self.default_device()?
                    }
                },
                None => self.default_device()?,
            };

            let name = device.name().unwrap_or_else(|_| "unknown".to_string());
            let (stream, handle) = rodio::OutputStream::try_from_device(&device)
                .map_err(|e| DeviceError::Open(format!("{}: {}", name, e)))?;
            let sink = Sink::try_new(&handle).map_err(|e| DeviceError::Open(e.to_string()))?;

            info!(
                "Opened output '{}' at {} Hz, {} channel(s)",
                name, spec.sample_rate, spec.channels
            );

            Ok(Box::new(RodioStream {
                _stream: stream,
                _handle: handle,
                sink,
                spec,
            }))
        }
    }

    struct RodioStream {
        // Dropping the stream releases the device, so it lives as long as the sink
        _stream: rodio::OutputStream,
        _handle: OutputStreamHandle,
        sink: Sink,
        spec: StreamSpec,
    }

    impl OutputStream for RodioStream {
        fn write(&mut self, samples: &[f32]) -> Result<(), DeviceError> {
            self.sink.append(SamplesBuffer::new(
                self.spec.channels,
                self.spec.sample_rate,
                samples.to_vec(),
            ));

            // Backpressure: wait for the device to drain down to the queue depth
            let mut queued = self.sink.len();
            let mut last_progress = Instant::now();
            while queued > QUEUE_DEPTH {
                std::thread::sleep(DRAIN_POLL);
                let now_queued = self.sink.len();
                if now_queued < queued {
                    last_progress = Instant::now();
                } else if last_progress.elapsed() > STALL_TIMEOUT {
                    return Err(DeviceError::Write("output device stopped draining".to_string()));
                }
                queued = now_queued;
            }
            Ok(())
        }

        fn pause(&mut self) {
            self.sink.pause();
        }

        fn resume(&mut self) {
            self.sink.play();
        }

        fn drain(&mut self, keep_waiting: &mut dyn FnMut() -> bool) {
            let mut queued = self.sink.len();
            let mut last_progress = Instant::now();
            while !self.sink.empty() {
                if !keep_waiting() {
                    debug!("Abandoned {} queued buffer(s)", self.sink.len());
                    return;
                }
                std::thread::sleep(DRAIN_POLL);
                let now_queued = self.sink.len();
                if now_queued < queued {
                    last_progress = Instant::now();
                } else if last_progress.elapsed() > STALL_TIMEOUT {
                    warn!("Output device stopped draining, dropping the tail");
                    return;
                }
                queued = now_queued;
            }
        }

        fn close(self: Box<Self>) {
            self.sink.stop();
            debug!("Closed output stream");
        }
    }
}

//! System microphone capture via CPAL.
//!
//! Handles device enumeration and format conversion. The callback thread
//! downmixes to mono i16 and slices the stream into fixed frames at the
//! hardware rate; consumers pull frames from a bounded channel and resample
//! to the model rate.

use super::dispatch::FrameDispatcher;
use super::meter::{rms_db, LiveMeter};
use super::resample::convert_frame_to_target;
use super::segmenter::FrameSource;
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

impl Recorder {
    /// List microphone names so the CLI can expose a selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Create a recorder, optionally forcing a specific device so users can
    /// pick the right microphone when the appliance exposes several inputs.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        Ok(Self { device })
    }

    /// Get the name of the active recording device.
    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Open a live input stream delivering fixed `frame_ms` frames at the
    /// device's native rate over a bounded channel.
    pub fn open_frame_stream(&self, frame_ms: u64, channel_capacity: usize) -> Result<FrameStream> {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.clone().into();
        let device_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));
        let frame_ms = frame_ms.clamp(5, 120);
        let device_frame_samples = ((device_rate as u64 * frame_ms) / 1000).max(1) as usize;

        log_debug(&format!(
            "input_stream|device={}|format={format:?}|rate={device_rate}|channels={channels}",
            self.device_name()
        ));

        let (sender, receiver) = bounded::<Vec<i16>>(channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            device_frame_samples,
            sender,
            dropped.clone(),
        )));

        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
        let stream = match format {
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample as f32 / 32_768.0);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| {
                                (sample as f32 - 32_768.0) / 32_768.0
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play()?;

        Ok(FrameStream {
            stream: Some(stream),
            receiver,
            device_rate,
            dropped,
        })
    }
}

/// An open input stream plus the frame channel fed by its callback.
/// Dropping the handle pauses and closes the stream.
pub struct FrameStream {
    stream: Option<cpal::Stream>,
    receiver: Receiver<Vec<i16>>,
    device_rate: u32,
    dropped: Arc<AtomicUsize>,
}

impl FrameStream {
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<i16>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log_debug(&format!("failed to pause audio stream: {err}"));
            }
        }
    }
}

/// `FrameSource` over a live stream: frames are resampled to the target rate
/// and padded to a fixed length. A read timeout or channel disconnect is
/// reported as exhaustion, so the segmenter returns what it has instead of
/// blocking forever.
pub struct LiveFrameSource {
    stream: FrameStream,
    target_rate: u32,
    frame_samples: usize,
    read_timeout: Duration,
    meter: Option<LiveMeter>,
}

impl LiveFrameSource {
    pub fn new(
        stream: FrameStream,
        target_rate: u32,
        frame_samples: usize,
        read_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            target_rate,
            frame_samples,
            read_timeout,
            meter: None,
        }
    }

    pub fn with_meter(mut self, meter: LiveMeter) -> Self {
        self.meter = Some(meter);
        self
    }
}

impl FrameSource for LiveFrameSource {
    fn next_frame(&mut self) -> Result<Option<Vec<i16>>> {
        match self.stream.recv_timeout(self.read_timeout) {
            Ok(frame) => {
                let converted = convert_frame_to_target(
                    frame,
                    self.stream.device_rate(),
                    self.target_rate,
                    self.frame_samples,
                );
                if let Some(ref meter) = self.meter {
                    meter.set_db(rms_db(&converted));
                }
                Ok(Some(converted))
            }
            Err(RecvTimeoutError::Timeout) => {
                log_debug("live frame source timed out; treating stream as exhausted");
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

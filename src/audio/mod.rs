//! Audio device I/O via cpal.
//!
//! # Realtime constraints
//!
//! Both callbacks run on OS audio threads at elevated priority. After the
//! first invocations (which size the reusable scratch buffers) they do not
//! allocate, block on locks, or perform I/O:
//!
//! * the capture callback downmixes to mono, resamples to 48 kHz and
//!   pushes into the capture ring — a full ring drops the excess and
//!   counts it as a capture overrun;
//! * the render callback pulls device-rate samples from the render ring
//!   and duplicates mono across the device channels — an empty ring
//!   substitutes silence and counts a render underrun.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). [`AudioCapture`] and [`AudioRender`] must be created and
//! dropped on the same OS thread; the engine does both on its audio I/O
//! thread.

pub mod device;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, AtomicU64},
    Arc,
};

#[cfg(feature = "audio-cpal")]
use std::sync::atomic::Ordering;

use crate::buffering::RingProducer;
use crate::engine::pipeline::PipelineSignal;

#[cfg(feature = "audio-cpal")]
use crate::buffering::RingConsumer;
use crate::error::Result;
use crate::INTERNAL_SAMPLE_RATE;

#[cfg(feature = "audio-cpal")]
use crate::error::EngineError;
#[cfg(feature = "audio-cpal")]
use resample::RateConverter;
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active capture stream.
///
/// **Not `Send`** — create and drop on the same OS thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Device sample rate (before the input resampler).
    pub sample_rate: u32,
    pub channels: u16,
}

/// Handle to an active render stream.
///
/// **Not `Send`** — create and drop on the same OS thread.
pub struct AudioRender {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Device sample rate; the render ring carries samples at this rate.
    pub sample_rate: u32,
    pub channels: u16,
}

#[cfg(feature = "audio-cpal")]
fn resolve_input_device(
    host: &cpal::Host,
    preferred: Option<&str>,
) -> Result<cpal::Device> {
    if let Some(name) = preferred.filter(|n| !n.is_empty()) {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(d) =
                    devices.find(|d| d.name().map(|n| n == name).unwrap_or(false))
                {
                    return Ok(d);
                }
                warn!(device = name, "preferred input device not found, falling back");
            }
            Err(e) => warn!("input device enumeration failed: {e}"),
        }
    }
    host.default_input_device()
        .ok_or_else(|| EngineError::DeviceInit("no default input device".into()))
}

/// Fill `frames` mono samples from the ring, zero-padding and counting a
/// render underrun on shortfall. The scratch vec only grows on the first
/// callbacks (warmup); afterwards `resize` is a no-op.
#[cfg(feature = "audio-cpal")]
fn fill_from_ring(
    consumer: &mut RingConsumer,
    mono: &mut Vec<f32>,
    frames: usize,
    running: &AtomicBool,
    underruns: &AtomicU64,
) {
    mono.resize(frames, 0.0);
    if !running.load(Ordering::Relaxed) {
        mono[..frames].fill(0.0);
        return;
    }
    let got = consumer.read(&mut mono[..frames]);
    if got < frames {
        mono[got..frames].fill(0.0);
        underruns.fetch_add((frames - got) as u64, Ordering::Relaxed);
    }
}

#[cfg(feature = "audio-cpal")]
fn resolve_output_device(host: &cpal::Host, name: &str) -> Result<cpal::Device> {
    let mut devices = host
        .output_devices()
        .map_err(|e| EngineError::DeviceInit(e.to_string()))?;
    devices
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| EngineError::DeviceInit(format!("output device {name:?} not found")))
}

/// Shared state for the capture callback, regardless of sample format.
#[cfg(feature = "audio-cpal")]
struct CaptureContext {
    producer: RingProducer,
    running: Arc<AtomicBool>,
    signal: Arc<PipelineSignal>,
    overruns: Arc<AtomicU64>,
    channels: usize,
    /// `None` when the device already runs at the internal rate.
    resampler: Option<RateConverter>,
    /// Reusable mono scratch, sized on the first callback.
    mono: Vec<f32>,
    /// Reusable resampler output scratch.
    resampled: Vec<f32>,
}

#[cfg(feature = "audio-cpal")]
impl CaptureContext {
    /// Downmix → resample → ring. `convert` maps one device sample to f32.
    fn ingest<T: Copy>(&mut self, data: &[T], convert: impl Fn(T) -> f32) {
        if !self.running.load(Ordering::Relaxed) {
            return;
        }

        let frames = data.len() / self.channels;
        self.mono.resize(frames, 0.0);
        if self.channels == 1 {
            for (dst, &src) in self.mono.iter_mut().zip(data) {
                *dst = convert(src);
            }
        } else {
            // Equal-weight downmix; for stereo this is 0.5·(L+R).
            let scale = 1.0 / self.channels as f32;
            for (f, dst) in self.mono.iter_mut().enumerate() {
                let base = f * self.channels;
                let mut sum = 0.0f32;
                for c in 0..self.channels {
                    sum += convert(data[base + c]);
                }
                *dst = sum * scale;
            }
        }

        let pushed = match self.resampler.as_mut() {
            Some(rs) => {
                rs.process_into(&self.mono, &mut self.resampled);
                self.producer.write(&self.resampled)
            }
            None => self.producer.write(&self.mono),
        };

        let offered = self
            .resampler
            .as_ref()
            .map(|_| self.resampled.len())
            .unwrap_or(frames);
        if pushed < offered {
            self.overruns
                .fetch_add((offered - pushed) as u64, Ordering::Relaxed);
        }

        self.signal.notify();
    }
}

impl AudioCapture {
    /// Open a capture device (preferred name, else system default) and
    /// start pushing 48 kHz mono frames into `producer`.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        preferred: Option<&str>,
        producer: RingProducer,
        running: Arc<AtomicBool>,
        signal: Arc<PipelineSignal>,
        overruns: Arc<AtomicU64>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = resolve_input_device(&host, preferred)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening capture device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| EngineError::DeviceInit(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let resampler = if sample_rate != INTERNAL_SAMPLE_RATE {
            info!(
                from = sample_rate,
                to = INTERNAL_SAMPLE_RATE,
                "input resampling enabled"
            );
            Some(RateConverter::new(sample_rate, INTERNAL_SAMPLE_RATE))
        } else {
            None
        };

        let mut ctx = CaptureContext {
            producer,
            running,
            signal,
            overruns,
            channels: channels as usize,
            resampler,
            mono: Vec::new(),
            resampled: Vec::new(),
        };

        let err_fn = |err| error!("capture stream error: {err}");
        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| ctx.ingest(data, |s| s),
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| ctx.ingest(data, |s| s as f32 / 32768.0),
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| {
                    ctx.ingest(data, |s| (s as f32 - 32768.0) / 32768.0)
                },
                err_fn,
                None,
            ),
            fmt => {
                return Err(EngineError::AudioStream(format!(
                    "unsupported capture sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| EngineError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| EngineError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
        })
    }

    #[cfg(not(feature = "audio-cpal"))]
    pub fn open(
        _preferred: Option<&str>,
        _producer: RingProducer,
        _running: Arc<AtomicBool>,
        _signal: Arc<PipelineSignal>,
        _overruns: Arc<AtomicU64>,
    ) -> Result<Self> {
        Err(crate::error::EngineError::DeviceInit(
            "compiled without the audio-cpal feature".into(),
        ))
    }
}

/// The render ring buffers this many seconds of device-rate audio, so a
/// brief render-side stall cannot starve the stream.
const RENDER_RING_SECONDS: u32 = 2;

impl AudioRender {
    /// Open the named render device. Creates the internal render ring
    /// (≥ 2 s at the device rate) and returns its producer: the pipeline
    /// writes device-rate mono samples into it, never blocking.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        device_name: &str,
        running: Arc<AtomicBool>,
        underruns: Arc<AtomicU64>,
    ) -> Result<(Self, RingProducer)> {
        let host = cpal::default_host();
        let device = resolve_output_device(&host, device_name)?;

        info!(device = device_name, "opening render device");

        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::DeviceInit(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "render config selected");

        let (producer, mut consumer) =
            crate::buffering::create_ring((sample_rate * RENDER_RING_SECONDS) as usize);

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels as usize;
        let mut mono: Vec<f32> = Vec::new();

        let err_fn = |err| error!("render stream error: {err}");
        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    let frames = data.len() / ch;
                    fill_from_ring(&mut consumer, &mut mono, frames, &running, &underruns);
                    for f in 0..frames {
                        let v = mono[f];
                        for c in 0..ch {
                            data[f * ch + c] = v;
                        }
                    }
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _| {
                    let frames = data.len() / ch;
                    fill_from_ring(&mut consumer, &mut mono, frames, &running, &underruns);
                    for f in 0..frames {
                        let v = (mono[f].clamp(-1.0, 1.0) * 32767.0) as i16;
                        for c in 0..ch {
                            data[f * ch + c] = v;
                        }
                    }
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_output_stream(
                &config,
                move |data: &mut [u16], _| {
                    let frames = data.len() / ch;
                    fill_from_ring(&mut consumer, &mut mono, frames, &running, &underruns);
                    for f in 0..frames {
                        let v = ((mono[f].clamp(-1.0, 1.0) * 0.5 + 0.5) * 65535.0) as u16;
                        for c in 0..ch {
                            data[f * ch + c] = v;
                        }
                    }
                },
                err_fn,
                None,
            ),
            fmt => {
                return Err(EngineError::AudioStream(format!(
                    "unsupported render sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| EngineError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| EngineError::AudioStream(e.to_string()))?;

        Ok((
            Self {
                _stream: stream,
                sample_rate,
                channels,
            },
            producer,
        ))
    }

    #[cfg(not(feature = "audio-cpal"))]
    pub fn open(
        _device_name: &str,
        _running: Arc<AtomicBool>,
        _underruns: Arc<AtomicU64>,
    ) -> Result<(Self, RingProducer)> {
        Err(crate::error::EngineError::DeviceInit(
            "compiled without the audio-cpal feature".into(),
        ))
    }
}

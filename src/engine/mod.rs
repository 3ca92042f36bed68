//! `Engine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Engine::new(config)
//!     └─► start()   → devices open, threads spawned, status = Running
//!         └─► stop() → running = false, threads joined, status = Stopped
//! ```
//!
//! `start()`/`stop()` are guarded: calling them in the wrong state returns
//! an error rather than panicking.
//!
//! ## Threading
//!
//! Four threads own the moving parts:
//!
//! * **audio I/O thread** — owns the cpal capture and render streams
//!   (`cpal::Stream` is `!Send`, so streams are created and dropped here),
//!   and services device-change commands by rebuilding one side in place;
//! * **processing thread** — the block loop in [`pipeline::run`];
//! * **control thread** — drains the [`ControlRequest`] channel and applies
//!   mutations through the block-boundary parameter queue;
//! * plus the cpal callback threads owned by the OS.
//!
//! `Engine` is `Send + Sync`; every field uses interior mutability, so it
//! can be shared behind an `Arc` between the IPC transport and the CLI.

pub mod pipeline;
pub mod presets;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::audio::{device, AudioCapture, AudioRender};
use crate::buffering::{create_ring, RingConsumer, RingProducer};
use crate::config::Config;
use crate::denoise::{create_denoiser, FrameSuppressor};
use crate::dsp::{Compressor, DspParams, Equalizer, Expander, Limiter, Meter};
use crate::error::{EngineError, Result};
use crate::ipc::events::{EngineStatus, EngineStatusEvent, MeterSnapshot, StatusSnapshot};
use crate::ipc::{control_channel, ControlMessage, ControlReply, ControlRequest};
use crate::INTERNAL_SAMPLE_RATE;

use pipeline::{
    output_resampler, LevelReadout, ParamQueue, ParamUpdate, PipelineContext,
    PipelineDiagnostics, PipelineSignal,
};

/// Broadcast capacity for meter and status events.
const BROADCAST_CAP: usize = 256;

/// Capture ring: one second at the internal rate (≫ 4 blocks).
const CAPTURE_RING_CAPACITY: usize = INTERNAL_SAMPLE_RATE as usize;

/// Commands for the audio I/O thread.
enum DeviceCommand {
    SetInput(String),
    SetOutput(String),
    Shutdown,
}

/// Ready handshake payload from the audio I/O thread.
struct IoReady {
    capture_rx: RingConsumer,
    render_tx: RingProducer,
    render_rate: u32,
}

struct Workers {
    processing: JoinHandle<()>,
    io: JoinHandle<()>,
    control: JoinHandle<()>,
    device_tx: mpsc::Sender<DeviceCommand>,
}

struct EngineInner {
    config: Mutex<Config>,
    /// Canonical last-applied parameter record (what `GET_STATUS` and
    /// preset round-trip reads report).
    params: Mutex<DspParams>,
    running: Arc<AtomicBool>,
    bypass: Arc<AtomicBool>,
    status: Mutex<EngineStatus>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    meter_tx: broadcast::Sender<MeterSnapshot>,
    levels: Arc<Mutex<LevelReadout>>,
    diagnostics: Arc<PipelineDiagnostics>,
    param_queue: Arc<ParamQueue>,
    signal: Arc<PipelineSignal>,
    /// Backend actually in use after any load fallback.
    ai_backend: Mutex<String>,
    workers: Mutex<Option<Workers>>,
    control_tx: Mutex<Option<mpsc::Sender<ControlRequest>>>,
}

/// The engine handle. Clone-free; wrap in `Arc` to share.
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine from a (normalized) configuration. Does not touch
    /// any audio device — call [`Engine::start`].
    pub fn new(mut config: Config) -> Self {
        config.normalize();
        let params = config.to_dsp_params();
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (meter_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            inner: Arc::new(EngineInner {
                ai_backend: Mutex::new(params.ai_model.clone()),
                config: Mutex::new(config),
                params: Mutex::new(params),
                running: Arc::new(AtomicBool::new(false)),
                bypass: Arc::new(AtomicBool::new(false)),
                status: Mutex::new(EngineStatus::Idle),
                status_tx,
                meter_tx,
                levels: Arc::new(Mutex::new(LevelReadout::default())),
                diagnostics: Arc::new(PipelineDiagnostics::default()),
                param_queue: Arc::new(ParamQueue::default()),
                signal: Arc::new(PipelineSignal::new()),
                workers: Mutex::new(None),
                control_tx: Mutex::new(None),
            }),
        }
    }

    /// Open the devices and start the data-plane threads.
    ///
    /// Blocks until the audio devices are confirmed open (or failed).
    ///
    /// # Errors
    /// - [`EngineError::AlreadyRunning`] when started twice.
    /// - [`EngineError::NoVirtualDeviceFound`] when no output is configured
    ///   and no loopback device matches the auto-selection hints.
    /// - [`EngineError::DeviceInit`] / [`EngineError::AudioStream`] on
    ///   device failures.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }

        inner.diagnostics.reset();

        let (ready_tx, ready_rx) = mpsc::channel::<Result<IoReady>>();
        let (device_tx, device_rx) = mpsc::channel::<DeviceCommand>();

        // ── Audio I/O thread: owns the !Send cpal streams ────────────────
        let io = {
            let running = Arc::clone(&inner.running);
            let signal = Arc::clone(&inner.signal);
            let diagnostics = Arc::clone(&inner.diagnostics);
            let param_queue = Arc::clone(&inner.param_queue);
            let (input_pref, output_pref) = {
                let config = inner.config.lock();
                (
                    config.devices.input_device.clone(),
                    config.devices.output_device.clone(),
                )
            };

            std::thread::Builder::new()
                .name("audio-io".into())
                .spawn(move || {
                    io_thread(
                        running,
                        signal,
                        diagnostics,
                        param_queue,
                        input_pref,
                        output_pref,
                        ready_tx,
                        device_rx,
                    )
                })
                .expect("spawn audio-io thread")
        };

        // Block until the device side is confirmed.
        let ready = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                inner.running.store(false, Ordering::SeqCst);
                let _ = io.join();
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                return Err(e);
            }
            Err(_) => {
                inner.running.store(false, Ordering::SeqCst);
                let _ = io.join();
                self.set_status(EngineStatus::Error, Some("audio thread died".into()));
                return Err(EngineError::Other(anyhow::anyhow!(
                    "audio I/O thread died before device open"
                )));
            }
        };

        // ── Build the processing context from the current parameters ─────
        let ctx = {
            let params = inner.params.lock().clone();
            let model_path = inner.config.lock().model_path().map(|p| p.to_path_buf());

            let backend = create_denoiser(&params.ai_model, model_path.as_deref());
            *inner.ai_backend.lock() = backend.name().to_string();
            let mut suppressor = FrameSuppressor::new(backend);
            suppressor.set_target_attenuation_db(params.suppressor_attenuation);

            let mut expander = Expander::new(INTERNAL_SAMPLE_RATE as f32);
            expander.apply_params(&params.expander);
            let mut equalizer = Equalizer::new(INTERNAL_SAMPLE_RATE as f32);
            equalizer.apply_params(&params.equalizer);
            let mut compressor = Compressor::new(INTERNAL_SAMPLE_RATE as f32);
            compressor.apply_params(&params.compressor);
            let mut limiter = Limiter::new(INTERNAL_SAMPLE_RATE as f32);
            limiter.apply_params(&params.limiter);

            inner.bypass.store(params.bypass, Ordering::SeqCst);

            PipelineContext {
                running: Arc::clone(&inner.running),
                signal: Arc::clone(&inner.signal),
                capture_rx: ready.capture_rx,
                render_tx: ready.render_tx,
                out_resampler: output_resampler(ready.render_rate),
                suppressor,
                expander,
                equalizer,
                compressor,
                limiter,
                input_meter: Meter::new(INTERNAL_SAMPLE_RATE as f32),
                output_meter: Meter::new(INTERNAL_SAMPLE_RATE as f32),
                bypass: Arc::clone(&inner.bypass),
                params: Arc::clone(&inner.param_queue),
                meter_tx: inner.meter_tx.clone(),
                levels: Arc::clone(&inner.levels),
                diagnostics: Arc::clone(&inner.diagnostics),
            }
        };

        let processing = std::thread::Builder::new()
            .name("audio-processing".into())
            .spawn(move || pipeline::run(ctx))
            .expect("spawn processing thread");

        // ── Control thread ───────────────────────────────────────────────
        let (control_tx, control_rx) = control_channel();
        *inner.control_tx.lock() = Some(control_tx);
        let control = {
            let inner = Arc::clone(&self.inner);
            std::thread::Builder::new()
                .name("control".into())
                .spawn(move || control_thread(inner, control_rx))
                .expect("spawn control thread")
        };

        *inner.workers.lock() = Some(Workers {
            processing,
            io,
            control,
            device_tx,
        });

        self.set_status(EngineStatus::Running, None);
        info!("engine started");
        Ok(())
    }

    /// Stop the data plane and join all threads.
    ///
    /// # Errors
    /// - [`EngineError::NotRunning`] when not currently running.
    pub fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.running.swap(false, Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }

        inner.signal.notify();
        *inner.control_tx.lock() = None;

        if let Some(workers) = inner.workers.lock().take() {
            let _ = workers.device_tx.send(DeviceCommand::Shutdown);
            if workers.processing.join().is_err() {
                error!("processing thread panicked");
            }
            if workers.io.join().is_err() {
                error!("audio I/O thread panicked");
            }
            if workers.control.join().is_err() {
                error!("control thread panicked");
            }
        }

        *inner.levels.lock() = LevelReadout::default();
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.inner.status.lock()
    }

    /// Current parameter record (snapshot).
    pub fn params(&self) -> DspParams {
        self.inner.params.lock().clone()
    }

    /// Subscribe to per-block meter snapshots.
    pub fn subscribe_meters(&self) -> broadcast::Receiver<MeterSnapshot> {
        self.inner.meter_tx.subscribe()
    }

    /// Subscribe to status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.inner.status_tx.subscribe()
    }

    /// Sender for the control port, available while the engine runs. The
    /// IPC transport clones this.
    pub fn control_sender(&self) -> Option<mpsc::Sender<ControlRequest>> {
        self.inner.control_tx.lock().clone()
    }

    /// Handle one control operation synchronously. The control thread calls
    /// this for channel requests; in-process callers may use it directly.
    pub fn handle_control(&self, message: ControlMessage) -> Result<ControlReply> {
        self.inner.handle_control(message)
    }

    pub fn diagnostics(&self) -> pipeline::DiagnosticsSnapshot {
        self.inner.diagnostics.snapshot()
    }

    fn set_status(&self, status: EngineStatus, detail: Option<String>) {
        self.inner.set_status(status, detail);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

impl EngineInner {
    fn set_status(&self, status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let _ = self.status_tx.send(EngineStatusEvent { status, detail });
    }

    fn handle_control(&self, message: ControlMessage) -> Result<ControlReply> {
        match message {
            ControlMessage::SetBypass(bypass) => {
                let prev = self.bypass.swap(bypass, Ordering::SeqCst);
                self.params.lock().bypass = bypass;
                if prev != bypass {
                    // Bypass transitions reset processor state so the chain
                    // re-engages deterministically.
                    self.param_queue.push(ParamUpdate::ResetProcessors);
                }
                Ok(ControlReply::Ack)
            }

            ControlMessage::ApplyPreset(name) => {
                let preset = presets::find(&name)
                    .ok_or_else(|| EngineError::Protocol(format!("unknown preset {name:?}")))?;
                {
                    let mut params = self.params.lock();
                    preset.apply_to(&mut params);
                    self.param_queue.push(ParamUpdate::Expander(params.expander));
                    self.param_queue
                        .push(ParamUpdate::Compressor(params.compressor));
                    self.param_queue.push(ParamUpdate::Limiter(params.limiter));
                    self.param_queue.push(ParamUpdate::Eq(params.equalizer));
                }
                self.config.lock().active_preset = name;
                Ok(ControlReply::Ack)
            }

            ControlMessage::SetInputDevice(id) => {
                self.config.lock().devices.input_device = id.clone();
                self.send_device_command(DeviceCommand::SetInput(id));
                Ok(ControlReply::Ack)
            }

            ControlMessage::SetOutputDevice(id) => {
                self.config.lock().devices.output_device = id.clone();
                self.send_device_command(DeviceCommand::SetOutput(id));
                Ok(ControlReply::Ack)
            }

            ControlMessage::SetExpander(p) => {
                self.params.lock().expander = p;
                self.config.lock().expander = p;
                self.param_queue.push(ParamUpdate::Expander(p));
                Ok(ControlReply::Ack)
            }

            ControlMessage::SetCompressor(p) => {
                self.params.lock().compressor = p;
                self.config.lock().compressor = p;
                self.param_queue.push(ParamUpdate::Compressor(p));
                Ok(ControlReply::Ack)
            }

            ControlMessage::SetLimiter(p) => {
                self.params.lock().limiter = p;
                self.config.lock().limiter = p;
                self.param_queue.push(ParamUpdate::Limiter(p));
                Ok(ControlReply::Ack)
            }

            ControlMessage::SetEq(p) => {
                self.params.lock().equalizer = p;
                self.config.lock().equalizer = p;
                self.param_queue.push(ParamUpdate::Eq(p));
                Ok(ControlReply::Ack)
            }

            ControlMessage::SetAiModel(name) => {
                if !matches!(name.as_str(), "rnnoise" | "deepfilter" | "openvino") {
                    return Err(EngineError::Protocol(format!("unknown AI model {name:?}")));
                }
                self.params.lock().ai_model = name.clone();
                let model_path_owned;
                {
                    let mut config = self.config.lock();
                    config.ai_model = name.clone();
                    model_path_owned = config.model_path().map(|p| p.to_path_buf());
                }
                if self.running.load(Ordering::SeqCst) {
                    let backend = create_denoiser(&name, model_path_owned.as_deref());
                    *self.ai_backend.lock() = backend.name().to_string();
                    self.param_queue.push(ParamUpdate::SuppressorBackend(backend));
                } else {
                    *self.ai_backend.lock() = name;
                }
                Ok(ControlReply::Ack)
            }

            ControlMessage::ApplyConfig(new_config) => {
                let mut new_config = *new_config;
                new_config.normalize();

                let params_snapshot = {
                    let mut config = self.config.lock();
                    *config = new_config;
                    let mut params = self.params.lock();
                    let bypass = params.bypass;
                    *params = config.to_dsp_params();
                    params.bypass = bypass;
                    params.clone()
                };

                self.param_queue
                    .push(ParamUpdate::Expander(params_snapshot.expander));
                self.param_queue
                    .push(ParamUpdate::Compressor(params_snapshot.compressor));
                self.param_queue
                    .push(ParamUpdate::Limiter(params_snapshot.limiter));
                self.param_queue
                    .push(ParamUpdate::Eq(params_snapshot.equalizer));
                self.param_queue.push(ParamUpdate::SuppressorAttenuation(
                    params_snapshot.suppressor_attenuation,
                ));
                Ok(ControlReply::Ack)
            }

            ControlMessage::Ping => Ok(ControlReply::Pong),

            ControlMessage::QueryStatus => {
                let levels = *self.levels.lock();
                let diag = self.diagnostics.snapshot();
                let snapshot = StatusSnapshot {
                    status: *self.status.lock(),
                    bypass: self.bypass.load(Ordering::SeqCst),
                    active_preset: self.params.lock().active_preset.clone(),
                    ai_backend: self.ai_backend.lock().clone(),
                    input_rms_dbfs: levels.input_rms_dbfs,
                    output_peak_dbfs: levels.meters.peak_dbfs,
                    output_rms_dbfs: levels.meters.rms_dbfs,
                    gain_reduction_db: levels.meters.gain_reduction_db,
                    blocks_processed: diag.blocks_processed,
                    capture_overruns: diag.capture_overruns,
                    render_underruns: diag.render_underruns,
                };
                Ok(ControlReply::Status(Box::new(snapshot)))
            }
        }
    }

    fn send_device_command(&self, command: DeviceCommand) {
        if let Some(workers) = self.workers.lock().as_ref() {
            if workers.device_tx.send(command).is_err() {
                warn!("audio I/O thread is gone; device command dropped");
            }
        }
    }
}

/// Audio I/O thread body: open both devices, confirm readiness, then
/// service device-change commands until shutdown. Streams live and die on
/// this thread.
#[allow(clippy::too_many_arguments)]
fn io_thread(
    running: Arc<AtomicBool>,
    signal: Arc<PipelineSignal>,
    diagnostics: Arc<PipelineDiagnostics>,
    param_queue: Arc<ParamQueue>,
    input_pref: String,
    output_pref: String,
    ready_tx: mpsc::Sender<Result<IoReady>>,
    device_rx: mpsc::Receiver<DeviceCommand>,
) {
    let open_capture = |preferred: &str| -> Result<(AudioCapture, RingConsumer)> {
        let (producer, consumer) = create_ring(CAPTURE_RING_CAPACITY);
        let preferred = (!preferred.is_empty()).then_some(preferred);
        let capture = AudioCapture::open(
            preferred,
            producer,
            Arc::clone(&running),
            Arc::clone(&signal),
            Arc::clone(&diagnostics.capture_overruns),
        )?;
        Ok((capture, consumer))
    };

    let resolve_output = |configured: &str| -> Result<String> {
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }
        info!("no output device configured, auto-selecting a virtual device");
        let outputs = device::list_output_devices();
        device::find_virtual_output(&outputs)
            .map(|d| d.name.clone())
            .ok_or(EngineError::NoVirtualDeviceFound)
    };

    let open_render = |name: &str| -> Result<(AudioRender, RingProducer, u32)> {
        let (render, producer) = AudioRender::open(
            name,
            Arc::clone(&running),
            Arc::clone(&diagnostics.render_underruns),
        )?;
        let rate = render.sample_rate;
        Ok((render, producer, rate))
    };

    // ── Initial open ─────────────────────────────────────────────────────
    let (mut _capture, capture_rx) = match open_capture(&input_pref) {
        Ok(v) => v,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let output_name = match resolve_output(&output_pref) {
        Ok(v) => v,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let (mut _render, render_tx, render_rate) = match open_render(&output_name) {
        Ok(v) => v,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if ready_tx
        .send(Ok(IoReady {
            capture_rx,
            render_tx,
            render_rate,
        }))
        .is_err()
    {
        return;
    }

    // ── Device-change service loop ───────────────────────────────────────
    loop {
        match device_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(DeviceCommand::SetInput(name)) => match open_capture(&name) {
                Ok((capture, consumer)) => {
                    // New stream first, then retire the old one; the
                    // pipeline switches rings at the next block boundary.
                    _capture = capture;
                    param_queue.push(ParamUpdate::CaptureTarget { consumer });
                    info!(device = name.as_str(), "input device switched");
                }
                Err(e) => error!(device = name.as_str(), "input device change failed: {e}"),
            },
            Ok(DeviceCommand::SetOutput(name)) => match open_render(&name) {
                Ok((render, producer, sample_rate)) => {
                    _render = render;
                    param_queue.push(ParamUpdate::RenderTarget {
                        producer,
                        sample_rate,
                    });
                    info!(device = name.as_str(), "output device switched");
                }
                Err(e) => error!(device = name.as_str(), "output device change failed: {e}"),
            },
            Ok(DeviceCommand::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
            }
        }
    }
    // Streams drop here, releasing the devices on this thread.
}

/// Control thread body: drain requests, dispatch, reply.
fn control_thread(inner: Arc<EngineInner>, control_rx: mpsc::Receiver<ControlRequest>) {
    loop {
        match control_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(request) => match inner.handle_control(request.message) {
                Ok(reply) => {
                    if let Some(reply_tx) = request.reply_tx {
                        let _ = reply_tx.send(reply);
                    }
                }
                Err(e) => {
                    // Malformed or unserviceable request: drop it, keep the
                    // port open.
                    warn!("control request rejected: {e}");
                }
            },
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

//! The processing thread: CaptureRing in, RenderRing out.
//!
//! ## Per cycle
//!
//! ```text
//! 1. Wait on the condition (≤ 10 ms timeout) for ≥ 480 queued samples
//!    or shutdown.
//! 2. Apply queued parameter updates (block boundary — never mid-block).
//! 3. Drain every complete 480-sample block:
//!      input meter → [bypass? → output meter] → AI suppressor →
//!      expander → EQ → compressor → limiter → output meter →
//!      publish MeterSnapshot
//!    then hand the block to the render ring (through the output
//!    resampler when the device rate differs).
//! ```
//!
//! After warmup the loop never allocates: the block buffer is on the
//! stack, the resampler scratch is pre-sized, and meter publication uses a
//! fixed-capacity broadcast ring plus a `try_lock`ed snapshot slot
//! (last-writer-wins when the control thread is reading).

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thread_priority::{set_current_thread_priority, ThreadPriority};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::audio::resample::RateConverter;
use crate::buffering::{RingConsumer, RingProducer};
use crate::denoise::{Denoiser, FrameSuppressor};
use crate::dsp::{
    BlockProcessor, CompressorParams, Compressor, EqParams, Equalizer, Expander, ExpanderParams,
    Limiter, LimiterParams, Meter,
};
use crate::ipc::events::MeterSnapshot;
use crate::{BLOCK_SIZE, INTERNAL_SAMPLE_RATE};

/// Maximum time the processing thread sleeps before re-checking state.
const WAIT_TIMEOUT: Duration = Duration::from_millis(10);

/// Condition shared between the capture callback and the processing
/// thread: "the capture ring may now hold a complete block".
pub struct PipelineSignal {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl PipelineSignal {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Wake the processing thread. Wait-free when nobody is waiting.
    pub fn notify(&self) {
        self.condvar.notify_one();
    }

    /// Park until notified or the timeout elapses.
    pub fn wait(&self) {
        let mut guard = self.mutex.lock();
        self.condvar.wait_for(&mut guard, WAIT_TIMEOUT);
    }
}

impl Default for PipelineSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime counters. The capture/render counters are shared with the audio
/// callbacks; everything is read lock-free for `GET_STATUS`.
pub struct PipelineDiagnostics {
    pub blocks_processed: AtomicU64,
    pub capture_overruns: Arc<AtomicU64>,
    pub render_underruns: Arc<AtomicU64>,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            blocks_processed: AtomicU64::new(0),
            capture_overruns: Arc::new(AtomicU64::new(0)),
            render_underruns: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.blocks_processed.store(0, Ordering::Relaxed);
        self.capture_overruns.store(0, Ordering::Relaxed);
        self.render_underruns.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            capture_overruns: self.capture_overruns.load(Ordering::Relaxed),
            render_underruns: self.render_underruns.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub blocks_processed: u64,
    pub capture_overruns: u64,
    pub render_underruns: u64,
}

/// Latest levels for `GET_STATUS`, updated per block under `try_lock`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevelReadout {
    pub input_rms_dbfs: f32,
    pub meters: MeterSnapshot,
}

/// One deferred mutation, applied by the processing thread between blocks.
pub enum ParamUpdate {
    Expander(ExpanderParams),
    Compressor(CompressorParams),
    Limiter(LimiterParams),
    Eq(EqParams),
    SuppressorAttenuation(f32),
    /// Swap the AI backend in place (no pipeline restart).
    SuppressorBackend(Box<dyn Denoiser>),
    /// New render destination after an output-device change.
    RenderTarget {
        producer: RingProducer,
        sample_rate: u32,
    },
    /// New capture source after an input-device change.
    CaptureTarget { consumer: RingConsumer },
    /// Reset all processor state (bypass transitions, device changes).
    ResetProcessors,
}

/// Block-boundary mailbox between the control thread and the pipeline.
#[derive(Default)]
pub struct ParamQueue {
    dirty: AtomicBool,
    queue: Mutex<Vec<ParamUpdate>>,
}

impl ParamQueue {
    pub fn push(&self, update: ParamUpdate) {
        self.queue.lock().push(update);
        self.dirty.store(true, Ordering::Release);
    }

    fn take(&self) -> Vec<ParamUpdate> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Vec::new();
        }
        std::mem::take(&mut *self.queue.lock())
    }
}

/// Everything the processing thread owns, passed as one struct so the
/// spawn closure stays tidy.
pub struct PipelineContext {
    pub running: Arc<AtomicBool>,
    pub signal: Arc<PipelineSignal>,

    pub capture_rx: RingConsumer,
    pub render_tx: RingProducer,
    /// `None` when the render device runs at the internal rate.
    pub out_resampler: Option<RateConverter>,

    pub suppressor: FrameSuppressor,
    pub expander: Expander,
    pub equalizer: Equalizer,
    pub compressor: Compressor,
    pub limiter: Limiter,
    pub input_meter: Meter,
    pub output_meter: Meter,

    pub bypass: Arc<AtomicBool>,
    pub params: Arc<ParamQueue>,
    pub meter_tx: broadcast::Sender<MeterSnapshot>,
    pub levels: Arc<Mutex<LevelReadout>>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Build an output resampler for a render device rate.
pub fn output_resampler(render_rate: u32) -> Option<RateConverter> {
    if render_rate == INTERNAL_SAMPLE_RATE {
        None
    } else {
        Some(RateConverter::new(INTERNAL_SAMPLE_RATE, render_rate))
    }
}

fn apply_updates(ctx: &mut PipelineContext) {
    for update in ctx.params.take() {
        match update {
            ParamUpdate::Expander(p) => ctx.expander.apply_params(&p),
            ParamUpdate::Compressor(p) => ctx.compressor.apply_params(&p),
            ParamUpdate::Limiter(p) => ctx.limiter.apply_params(&p),
            ParamUpdate::Eq(p) => ctx.equalizer.apply_params(&p),
            ParamUpdate::SuppressorAttenuation(db) => {
                ctx.suppressor.set_target_attenuation_db(db)
            }
            ParamUpdate::SuppressorBackend(backend) => ctx.suppressor.set_backend(backend),
            ParamUpdate::RenderTarget {
                producer,
                sample_rate,
            } => {
                ctx.render_tx = producer;
                ctx.out_resampler = output_resampler(sample_rate);
                reset_chain(ctx);
            }
            ParamUpdate::CaptureTarget { consumer } => {
                ctx.capture_rx = consumer;
                reset_chain(ctx);
            }
            ParamUpdate::ResetProcessors => reset_chain(ctx),
        }
    }
}

fn reset_chain(ctx: &mut PipelineContext) {
    ctx.suppressor.reset();
    ctx.expander.reset();
    ctx.equalizer.reset();
    ctx.compressor.reset();
    ctx.limiter.reset();
    ctx.input_meter.reset();
    ctx.output_meter.reset();
    if let Some(rs) = ctx.out_resampler.as_mut() {
        rs.reset();
    }
}

/// Run one block through the chain and publish meters.
pub fn process_block(ctx: &mut PipelineContext, block: &mut [f32]) {
    ctx.input_meter.process(block);

    if ctx.bypass.load(Ordering::Relaxed) {
        ctx.output_meter.process(block);
    } else {
        ctx.suppressor.process(block);
        ctx.expander.process(block);
        // EQ before the compressor, so tonal shaping is compressed
        // uniformly. This ordering is a contract.
        ctx.equalizer.process(block);
        ctx.compressor.process(block);
        ctx.limiter.process(block);
        ctx.output_meter.process(block);
    }

    let snapshot = MeterSnapshot {
        peak_dbfs: ctx.output_meter.peak_dbfs(),
        rms_dbfs: ctx.output_meter.rms_dbfs(),
        gain_reduction_db: ctx.compressor.gain_reduction_db(),
    };
    // Slow or absent subscribers must not stall the block; the broadcast
    // ring drops the oldest reading (last-writer-wins is acceptable).
    let _ = ctx.meter_tx.send(snapshot);

    if let Some(mut levels) = ctx.levels.try_lock() {
        levels.input_rms_dbfs = ctx.input_meter.rms_dbfs();
        levels.meters = snapshot;
    }

    ctx.diagnostics
        .blocks_processed
        .fetch_add(1, Ordering::Relaxed);
}

/// Run the processing loop until `ctx.running` becomes false.
pub fn run(mut ctx: PipelineContext) {
    info!("processing thread started");

    if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
        warn!("failed to raise processing thread priority: {e:?}");
    }

    let mut block = [0.0f32; BLOCK_SIZE];
    // Output scratch sized for the worst supported upsampling ratio.
    let mut out_scratch: Vec<f32> = Vec::with_capacity(BLOCK_SIZE * 5);

    while ctx.running.load(Ordering::Relaxed) {
        if ctx.capture_rx.available_read() < BLOCK_SIZE {
            ctx.signal.wait();
            continue;
        }

        apply_updates(&mut ctx);

        while ctx.running.load(Ordering::Relaxed)
            && ctx.capture_rx.available_read() >= BLOCK_SIZE
        {
            ctx.capture_rx.read(&mut block);
            process_block(&mut ctx, &mut block);

            match ctx.out_resampler.as_mut() {
                Some(rs) => {
                    rs.process_into(&block, &mut out_scratch);
                    ctx.render_tx.write_overwrite(&out_scratch);
                }
                None => {
                    ctx.render_tx.write_overwrite(&block);
                }
            }

            // Parameter changes become visible at the next block boundary.
            apply_updates(&mut ctx);
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        blocks_processed = snap.blocks_processed,
        capture_overruns = snap.capture_overruns,
        render_underruns = snap.render_underruns,
        "processing thread stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    use crate::buffering::create_ring;
    use crate::denoise::PassthroughDenoiser;

    struct TestPipeline {
        capture_tx: RingProducer,
        render_rx: RingConsumer,
        running: Arc<AtomicBool>,
        signal: Arc<PipelineSignal>,
        params: Arc<ParamQueue>,
        bypass: Arc<AtomicBool>,
        meter_rx: broadcast::Receiver<MeterSnapshot>,
        diagnostics: Arc<PipelineDiagnostics>,
        handle: thread::JoinHandle<()>,
    }

    /// Spawn a pipeline with the passthrough denoiser and every DSP stage
    /// disabled unless the test enables it.
    fn spawn_pipeline(bypass: bool, render_rate: u32) -> TestPipeline {
        let (capture_tx, capture_rx) = create_ring(48_000);
        let (render_tx, render_rx) = create_ring(96_000);
        let running = Arc::new(AtomicBool::new(true));
        let signal = Arc::new(PipelineSignal::new());
        let params = Arc::new(ParamQueue::default());
        let bypass_flag = Arc::new(AtomicBool::new(bypass));
        let (meter_tx, meter_rx) = broadcast::channel(64);
        let diagnostics = Arc::new(PipelineDiagnostics::default());

        let mut expander = Expander::default();
        expander.set_enabled(false);
        let mut equalizer = Equalizer::default();
        equalizer.set_enabled(false);
        let mut compressor = Compressor::default();
        compressor.set_enabled(false);
        let mut limiter = Limiter::default();
        limiter.set_enabled(false);

        let mut suppressor = FrameSuppressor::new(Box::new(PassthroughDenoiser::new()));
        suppressor.set_target_attenuation_db(0.0);

        let ctx = PipelineContext {
            running: Arc::clone(&running),
            signal: Arc::clone(&signal),
            capture_rx,
            render_tx,
            out_resampler: output_resampler(render_rate),
            suppressor,
            expander,
            equalizer,
            compressor,
            limiter,
            input_meter: Meter::default(),
            output_meter: Meter::default(),
            bypass: Arc::clone(&bypass_flag),
            params: Arc::clone(&params),
            meter_tx,
            levels: Arc::new(Mutex::new(LevelReadout::default())),
            diagnostics: Arc::clone(&diagnostics),
        };

        let handle = thread::spawn(move || run(ctx));

        TestPipeline {
            capture_tx,
            render_rx,
            running,
            signal,
            params,
            bypass: bypass_flag,
            meter_rx,
            diagnostics,
            handle,
        }
    }

    impl TestPipeline {
        fn stop(self) {
            self.running.store(false, Ordering::SeqCst);
            self.signal.notify();
            self.handle.join().expect("pipeline thread panicked");
        }

        fn wait_for_render(&mut self, n: usize, timeout: Duration) {
            let start = Instant::now();
            while self.render_rx.available_read() < n {
                assert!(
                    start.elapsed() < timeout,
                    "timed out waiting for {n} render samples (have {})",
                    self.render_rx.available_read()
                );
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    #[test]
    fn consumes_complete_blocks_and_leaves_the_remainder() {
        let mut p = spawn_pipeline(false, INTERNAL_SAMPLE_RATE);

        // 1000 samples: two complete blocks, 40 left buffered.
        let input = vec![0.25f32; 1000];
        p.capture_tx.write(&input);
        p.signal.notify();

        p.wait_for_render(960, Duration::from_secs(2));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(p.render_rx.available_read(), 960);
        assert_eq!(p.diagnostics.snapshot().blocks_processed, 2);

        // The 40-sample tail is consumed once a later write completes it.
        p.capture_tx.write(&vec![0.25f32; 440]);
        p.signal.notify();
        p.wait_for_render(1440, Duration::from_secs(2));
        assert_eq!(p.diagnostics.snapshot().blocks_processed, 3);

        p.stop();
    }

    #[test]
    fn suppressor_latency_shifts_the_stream_by_one_block() {
        let mut p = spawn_pipeline(false, INTERNAL_SAMPLE_RATE);

        let first: Vec<f32> = (0..BLOCK_SIZE).map(|i| (i as f32 * 0.01).sin()).collect();
        p.capture_tx.write(&first);
        p.signal.notify();
        p.wait_for_render(BLOCK_SIZE, Duration::from_secs(2));

        let mut out = vec![0.0f32; BLOCK_SIZE];
        p.render_rx.read(&mut out);
        assert!(out.iter().all(|&v| v == 0.0), "first block is the primed latency");

        p.capture_tx.write(&vec![0.0f32; BLOCK_SIZE]);
        p.signal.notify();
        p.wait_for_render(BLOCK_SIZE, Duration::from_secs(2));
        p.render_rx.read(&mut out);
        for (a, b) in out.iter().zip(first.iter()) {
            assert!((a - b).abs() < 1e-6, "second block must be the first input");
        }

        p.stop();
    }

    #[test]
    fn bypass_is_bit_exact_identity() {
        let mut p = spawn_pipeline(true, INTERNAL_SAMPLE_RATE);

        // Unit impulse inside an otherwise silent stretch.
        let mut input = vec![0.0f32; 4800];
        input[1000] = 1.0;
        p.capture_tx.write(&input);
        p.signal.notify();

        p.wait_for_render(4800, Duration::from_secs(2));
        let mut out = vec![0.0f32; 4800];
        p.render_rx.read(&mut out);
        assert_eq!(out, input, "bypass must not alter a single sample");

        p.stop();
    }

    #[test]
    fn meter_snapshots_arrive_at_block_cadence() {
        let mut p = spawn_pipeline(true, INTERNAL_SAMPLE_RATE);

        let mut input = vec![0.0f32; BLOCK_SIZE];
        input[0] = 1.0;
        p.capture_tx.write(&input);
        p.signal.notify();
        p.wait_for_render(BLOCK_SIZE, Duration::from_secs(2));

        let start = Instant::now();
        let snapshot = loop {
            match p.meter_rx.try_recv() {
                Ok(s) => break s,
                Err(broadcast::error::TryRecvError::Empty) => {
                    assert!(start.elapsed() < Duration::from_secs(1));
                    thread::sleep(Duration::from_millis(2));
                }
                Err(e) => panic!("meter channel: {e}"),
            }
        };
        // Full-scale impulse: output peak ≈ 0 dBFS in bypass.
        assert!(snapshot.peak_dbfs.abs() < 0.1);
        assert_eq!(snapshot.gain_reduction_db, 0.0);

        p.stop();
    }

    #[test]
    fn parameter_updates_take_effect_at_block_boundaries() {
        let mut p = spawn_pipeline(false, INTERNAL_SAMPLE_RATE);

        // Overdriven constant input passes unchanged while the limiter is
        // disabled…
        p.capture_tx.write(&vec![1.0f32; BLOCK_SIZE * 2]);
        p.signal.notify();
        p.wait_for_render(BLOCK_SIZE * 2, Duration::from_secs(2));
        let mut out = vec![0.0f32; BLOCK_SIZE * 2];
        p.render_rx.read(&mut out);
        assert!(out[BLOCK_SIZE..].iter().all(|&v| (v - 1.0).abs() < 1e-6));

        // …then the limiter update lands and the next blocks are capped.
        p.params.push(ParamUpdate::Limiter(LimiterParams {
            enabled: true,
            ceiling: -6.0,
            release: 50.0,
            lookahead: 0.0,
        }));
        p.capture_tx.write(&vec![1.0f32; BLOCK_SIZE * 2]);
        p.signal.notify();
        p.wait_for_render(BLOCK_SIZE * 2, Duration::from_secs(2));
        p.render_rx.read(&mut out);

        let ceiling = 10.0f32.powf(-6.0 / 20.0);
        assert!(
            out[BLOCK_SIZE..].iter().all(|&v| v.abs() <= ceiling + 1e-4),
            "limiter must cap the signal after the update"
        );

        p.stop();
    }

    #[test]
    fn bypass_toggle_mid_stream_switches_processing() {
        let mut p = spawn_pipeline(false, INTERNAL_SAMPLE_RATE);

        p.capture_tx.write(&vec![0.5f32; BLOCK_SIZE]);
        p.signal.notify();
        p.wait_for_render(BLOCK_SIZE, Duration::from_secs(2));
        let mut out = vec![0.0f32; BLOCK_SIZE];
        p.render_rx.read(&mut out);
        assert!(out.iter().all(|&v| v == 0.0), "suppressor latency applies");

        // Bypass skips the suppressor entirely: output tracks input again.
        p.bypass.store(true, Ordering::SeqCst);
        p.params.push(ParamUpdate::ResetProcessors);
        p.capture_tx.write(&vec![0.5f32; BLOCK_SIZE]);
        p.signal.notify();
        p.wait_for_render(BLOCK_SIZE, Duration::from_secs(2));
        p.render_rx.read(&mut out);
        assert!(out.iter().all(|&v| (v - 0.5).abs() < 1e-6));

        p.stop();
    }

    #[test]
    fn output_resampler_bridges_device_rate() {
        // 48 kHz internal → 44.1 kHz render device.
        let mut p = spawn_pipeline(true, 44_100);

        p.capture_tx.write(&vec![0.0f32; 48_000]);
        p.signal.notify();

        // 48 000 internal samples → 44 100 ± 1 device samples queued.
        let start = Instant::now();
        loop {
            let n = p.render_rx.available_read();
            if (n as i64 - 44_100).abs() <= 1 {
                break;
            }
            assert!(
                start.elapsed() < Duration::from_secs(3),
                "render ring holds {n}, expected ≈44100"
            );
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(p.render_rx.overrun_count(), 0);

        p.stop();
    }

    #[test]
    fn shutdown_exits_promptly() {
        let p = spawn_pipeline(false, INTERNAL_SAMPLE_RATE);
        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        p.stop();
        assert!(
            start.elapsed() < Duration::from_millis(500),
            "shutdown took {:?}",
            start.elapsed()
        );
    }
}

//! Framing wrapper around a fixed-frame denoiser backend.
//!
//! The backends consume exactly 480 samples per call; the pipeline (and any
//! other caller) may hand arbitrary-length buffers. `FrameSuppressor`
//! bridges the two with an input accumulator and an output backlog:
//!
//! * every completed 480-sample fill goes through the backend exactly once;
//! * output lags input by exactly one frame (10 ms) — the backlog is primed
//!   with a frame of silence, and the accounting keeps it non-empty from
//!   then on;
//! * `target_attenuation_db` blends denoised and dry audio:
//!   `out = wet·(1−a) + dry·a` with `a = 10^(dB/20)`, so 0 dB is a full
//!   passthrough and −60 dB is essentially fully denoised.
//!
//! All scratch buffers are sized at construction; `process` never
//! allocates.

use tracing::debug;

use super::{Denoiser, FRAME_SIZE};

/// Output backlog capacity. Bounds a single `process` call to
/// `OUT_CAPACITY − FRAME_SIZE` samples; the pipeline hands exactly one
/// frame per call.
const OUT_CAPACITY: usize = FRAME_SIZE * 4;

pub struct FrameSuppressor {
    backend: Box<dyn Denoiser>,

    in_frame: [f32; FRAME_SIZE],
    in_fill: usize,

    wet: [f32; FRAME_SIZE],

    /// FIFO backlog of blended output samples.
    pending: [f32; OUT_CAPACITY],
    pend_read: usize,
    pend_len: usize,

    attenuation_db: f32,
    /// Linear dry share derived from `attenuation_db`.
    dry_mix: f32,

    last_vad: f32,
    frames_processed: u64,
}

impl FrameSuppressor {
    pub fn new(backend: Box<dyn Denoiser>) -> Self {
        let mut s = Self {
            backend,
            in_frame: [0.0; FRAME_SIZE],
            in_fill: 0,
            wet: [0.0; FRAME_SIZE],
            pending: [0.0; OUT_CAPACITY],
            pend_read: 0,
            pend_len: 0,
            attenuation_db: 0.0,
            dry_mix: 1.0,
            last_vad: 0.0,
            frames_processed: 0,
        };
        s.set_target_attenuation_db(-30.0);
        s.prime_latency();
        s
    }

    /// One frame of silence so output always lags input by 10 ms.
    fn prime_latency(&mut self) {
        self.pend_read = 0;
        self.pend_len = FRAME_SIZE;
        self.pending[..FRAME_SIZE].fill(0.0);
    }

    /// Dry/wet blend target. 0 dB keeps the dry signal, −60 dB is fully
    /// denoised. Values saturate to [−60, 0].
    pub fn set_target_attenuation_db(&mut self, db: f32) {
        self.attenuation_db = db.clamp(-60.0, 0.0);
        self.dry_mix = 10.0f32.powf(self.attenuation_db / 20.0);
    }

    pub fn target_attenuation_db(&self) -> f32 {
        self.attenuation_db
    }

    /// Voice-activity probability of the most recent denoised frame.
    pub fn vad(&self) -> f32 {
        self.last_vad
    }

    /// Inherent latency of the wrapper in samples.
    pub fn latency_samples(&self) -> usize {
        FRAME_SIZE
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Swap the backend without restarting the pipeline. Framing state is
    /// reset; the one-frame latency is re-primed.
    pub fn set_backend(&mut self, backend: Box<dyn Denoiser>) {
        debug!(backend = backend.name(), "suppressor backend swapped");
        self.backend = backend;
        self.in_fill = 0;
        self.last_vad = 0.0;
        self.prime_latency();
    }

    /// Recreate backend state and zero both accumulators.
    pub fn reset(&mut self) {
        self.backend.reset();
        self.in_frame.fill(0.0);
        self.in_fill = 0;
        self.last_vad = 0.0;
        self.prime_latency();
    }

    fn push_pending(&mut self, i: usize, value: f32) {
        let w = (self.pend_read + self.pend_len + i) % OUT_CAPACITY;
        self.pending[w] = value;
    }

    /// Denoise `buf` in place. Arbitrary lengths up to
    /// `OUT_CAPACITY − FRAME_SIZE` samples are supported; output is the
    /// oldest backlog audio, delayed one frame relative to the input.
    pub fn process(&mut self, buf: &mut [f32]) {
        debug_assert!(buf.len() <= OUT_CAPACITY - FRAME_SIZE);

        // Accumulate input; run the backend on every completed fill.
        let mut pos = 0;
        while pos < buf.len() {
            let take = (buf.len() - pos).min(FRAME_SIZE - self.in_fill);
            self.in_frame[self.in_fill..self.in_fill + take]
                .copy_from_slice(&buf[pos..pos + take]);
            self.in_fill += take;
            pos += take;

            if self.in_fill == FRAME_SIZE {
                self.last_vad = self.backend.process_frame(&mut self.wet, &self.in_frame);
                self.frames_processed += 1;

                for i in 0..FRAME_SIZE {
                    let blended =
                        self.wet[i] * (1.0 - self.dry_mix) + self.in_frame[i] * self.dry_mix;
                    self.push_pending(i, blended);
                }
                self.pend_len += FRAME_SIZE;
                self.in_fill = 0;
            }
        }

        // The backlog always holds at least buf.len() samples: it was
        // primed with one frame and each completed fill adds a full frame.
        debug_assert!(self.pend_len >= buf.len());
        for v in buf.iter_mut() {
            *v = self.pending[self.pend_read];
            self.pend_read = (self.pend_read + 1) % OUT_CAPACITY;
            self.pend_len -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denoise::PassthroughDenoiser;

    /// Scripted backend that zeroes every frame (full suppression).
    struct MuteDenoiser;

    impl Denoiser for MuteDenoiser {
        fn process_frame(&mut self, output: &mut [f32], _input: &[f32]) -> f32 {
            output.fill(0.0);
            0.0
        }
        fn reset(&mut self) {}
        fn name(&self) -> &'static str {
            "mute"
        }
    }

    fn passthrough_suppressor() -> FrameSuppressor {
        FrameSuppressor::new(Box::new(PassthroughDenoiser::new()))
    }

    #[test]
    fn output_lags_input_by_exactly_one_frame() {
        let mut s = passthrough_suppressor();

        let mut first = vec![1.0f32; FRAME_SIZE];
        s.process(&mut first);
        assert!(first.iter().all(|&v| v == 0.0), "first frame must be the primed silence");

        let mut second = vec![2.0f32; FRAME_SIZE];
        s.process(&mut second);
        assert!(second.iter().all(|&v| v == 1.0), "second call returns the first frame's audio");
    }

    #[test]
    fn one_backend_call_per_complete_frame() {
        let mut s = passthrough_suppressor();
        let mut buf = vec![0.1f32; 1000];
        s.process(&mut buf);
        // 1000 samples: two complete frames consumed, 40 left buffered.
        assert_eq!(s.frames_processed(), 2);

        // The 40-sample residue completes a frame on the next call.
        let mut more = vec![0.1f32; 440];
        s.process(&mut more);
        assert_eq!(s.frames_processed(), 3);
    }

    #[test]
    fn arbitrary_call_lengths_preserve_the_stream() {
        // Chopping the input unevenly must not drop or reorder samples.
        let signal: Vec<f32> = (1..=1440).map(|i| i as f32).collect();

        let mut s = passthrough_suppressor();
        let mut out = Vec::new();
        for chunk in [160usize, 320, 480, 200, 280] {
            let start = out.len();
            let mut buf = signal[start..start + chunk].to_vec();
            s.process(&mut buf);
            out.extend(buf);
        }

        // One frame of silence, then the stream intact.
        assert!(out[..FRAME_SIZE].iter().all(|&v| v == 0.0));
        assert_eq!(&out[FRAME_SIZE..], &signal[..1440 - FRAME_SIZE]);
    }

    #[test]
    fn attenuation_zero_db_is_dry_passthrough() {
        let mut s = FrameSuppressor::new(Box::new(MuteDenoiser));
        s.set_target_attenuation_db(0.0);

        let mut a = vec![0.5f32; FRAME_SIZE];
        s.process(&mut a);
        let mut b = vec![0.5f32; FRAME_SIZE];
        s.process(&mut b);
        // Even with a backend that mutes everything, 0 dB keeps the dry path.
        assert!(b.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn attenuation_minus_sixty_db_is_essentially_wet() {
        let mut s = FrameSuppressor::new(Box::new(MuteDenoiser));
        s.set_target_attenuation_db(-60.0);

        let mut a = vec![0.5f32; FRAME_SIZE];
        s.process(&mut a);
        let mut b = vec![0.5f32; FRAME_SIZE];
        s.process(&mut b);
        // dry share is 10^(−60/20) = 0.001
        assert!(b.iter().all(|&v| (v - 0.0005).abs() < 1e-6));
    }

    #[test]
    fn attenuation_is_clamped_to_valid_range() {
        let mut s = passthrough_suppressor();
        s.set_target_attenuation_db(17.0);
        assert_eq!(s.target_attenuation_db(), 0.0);
        s.set_target_attenuation_db(-120.0);
        assert_eq!(s.target_attenuation_db(), -60.0);
    }

    #[test]
    fn vad_tracks_backend_output() {
        let mut s = passthrough_suppressor();
        let mut silent = vec![0.0f32; FRAME_SIZE];
        s.process(&mut silent);
        assert_eq!(s.vad(), 0.0);

        let mut loud = vec![0.4f32; FRAME_SIZE];
        s.process(&mut loud);
        assert_eq!(s.vad(), 1.0);
    }

    #[test]
    fn reset_restores_initial_latency_and_determinism() {
        let mut s = passthrough_suppressor();
        let signal: Vec<f32> = (0..960).map(|i| (i as f32 * 0.01).sin()).collect();

        let mut a = signal.clone();
        s.process(&mut a);
        s.reset();
        let mut b = signal.clone();
        s.process(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn backend_swap_keeps_stream_length_accounting() {
        let mut s = passthrough_suppressor();
        let mut buf = vec![0.2f32; 700];
        s.process(&mut buf);

        s.set_backend(Box::new(MuteDenoiser));
        let mut buf = vec![0.2f32; 700];
        s.process(&mut buf);
        // Swap re-primes: output is again one frame of silence first.
        assert!(buf[..FRAME_SIZE].iter().all(|&v| v == 0.0));
    }
}

//! `PassthroughDenoiser` — copies frames unchanged.
//!
//! Stands in for a real model in tests and lets the full pipeline run
//! end-to-end with bit-exact audio, so block accounting and latency can be
//! asserted without model noise in the way.

use super::{Denoiser, FRAME_SIZE};

pub struct PassthroughDenoiser {
    /// RMS level above which the stub reports voice activity.
    vad_threshold: f32,
}

impl PassthroughDenoiser {
    pub fn new() -> Self {
        Self {
            vad_threshold: 1e-4,
        }
    }
}

impl Default for PassthroughDenoiser {
    fn default() -> Self {
        Self::new()
    }
}

impl Denoiser for PassthroughDenoiser {
    fn process_frame(&mut self, output: &mut [f32], input: &[f32]) -> f32 {
        debug_assert_eq!(input.len(), FRAME_SIZE);
        output.copy_from_slice(input);

        let sum_sq: f32 = input.iter().map(|s| s * s).sum();
        let rms = (sum_sq / input.len() as f32).sqrt();
        if rms > self.vad_threshold {
            1.0
        } else {
            0.0
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

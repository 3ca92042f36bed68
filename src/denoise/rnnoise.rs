//! RNNoise backend via the pure-Rust `nnnoiseless` port.
//!
//! RNNoise operates on 480-sample frames at 48 kHz and expects samples in
//! the 16-bit PCM range; this wrapper scales the pipeline's ±1.0 floats in
//! and back out around each call.

use nnnoiseless::DenoiseState;

use super::{Denoiser, FRAME_SIZE};

const PCM_SCALE: f32 = 32767.0;

pub struct RnnoiseDenoiser {
    state: Box<DenoiseState<'static>>,
    scaled_in: [f32; FRAME_SIZE],
    scaled_out: [f32; FRAME_SIZE],
}

impl RnnoiseDenoiser {
    pub fn new() -> Self {
        Self {
            state: DenoiseState::new(),
            scaled_in: [0.0; FRAME_SIZE],
            scaled_out: [0.0; FRAME_SIZE],
        }
    }
}

impl Default for RnnoiseDenoiser {
    fn default() -> Self {
        Self::new()
    }
}

impl Denoiser for RnnoiseDenoiser {
    fn process_frame(&mut self, output: &mut [f32], input: &[f32]) -> f32 {
        debug_assert_eq!(input.len(), FRAME_SIZE);
        debug_assert_eq!(output.len(), FRAME_SIZE);

        for (dst, &src) in self.scaled_in.iter_mut().zip(input) {
            *dst = src * PCM_SCALE;
        }

        let vad = self
            .state
            .process_frame(&mut self.scaled_out, &self.scaled_in);

        for (dst, &src) in output.iter_mut().zip(self.scaled_out.iter()) {
            *dst = src / PCM_SCALE;
        }
        vad
    }

    fn reset(&mut self) {
        self.state = DenoiseState::new();
    }

    fn name(&self) -> &'static str {
        "rnnoise"
    }
}

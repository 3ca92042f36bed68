//! Brickwall limiter with optional look-ahead.
//!
//! Without look-ahead the gain snaps down instantly when a sample would
//! exceed the ceiling and releases exponentially toward unity — output
//! never exceeds the ceiling, at the cost of audible grab on transients.
//! With look-ahead the input is delayed by the look-ahead interval and the
//! gain decision comes from the peak inside the delay window, with the
//! attack smoothed over that interval: transparent limiting in exchange for
//! the added latency.
//!
//! The delay line is allocated once at the 10 ms maximum; changing the
//! look-ahead while running only moves the active window length.

use crate::dsp::{db_to_lin, time_coeff, BlockProcessor};
use crate::INTERNAL_SAMPLE_RATE;

/// Hard cap on the look-ahead interval, ms.
const MAX_LOOKAHEAD_MS: f32 = 10.0;

pub struct Limiter {
    enabled: bool,
    sample_rate: f32,

    /// Linear ceiling.
    ceiling: f32,
    release_coeff: f32,
    lookahead_samples: usize,
    attack_coeff: f32,

    /// Fixed-capacity delay line (max look-ahead + 1).
    delay: Vec<f32>,
    delay_pos: usize,
    smoothed_gain: f32,
    gain_reduction_db: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32) -> Self {
        let max_delay = (MAX_LOOKAHEAD_MS * sample_rate / 1000.0) as usize + 1;
        let mut l = Self {
            enabled: true,
            sample_rate,
            ceiling: 1.0,
            release_coeff: 0.0,
            lookahead_samples: 0,
            attack_coeff: 0.0,
            delay: vec![0.0; max_delay],
            delay_pos: 0,
            smoothed_gain: 1.0,
            gain_reduction_db: 0.0,
        };
        l.set_ceiling(-1.0);
        l.set_release(50.0);
        l.set_lookahead(5.0);
        l
    }

    pub fn set_ceiling(&mut self, db: f32) {
        self.ceiling = db_to_lin(db.clamp(-6.0, 0.0));
    }

    pub fn set_release(&mut self, ms: f32) {
        self.release_coeff = time_coeff(ms.clamp(10.0, 500.0), self.sample_rate);
    }

    pub fn set_lookahead(&mut self, ms: f32) {
        let samples = (ms.clamp(0.0, MAX_LOOKAHEAD_MS) * self.sample_rate / 1000.0) as usize;
        if samples != self.lookahead_samples {
            self.lookahead_samples = samples;
            self.attack_coeff = if samples > 0 {
                (-1.0 / samples as f32).exp()
            } else {
                0.0
            };
            // The active window changed shape; flush stale samples.
            self.delay.fill(0.0);
            self.delay_pos = 0;
        }
    }

    pub fn apply_params(&mut self, p: &crate::dsp::LimiterParams) {
        self.enabled = p.enabled;
        self.set_ceiling(p.ceiling);
        self.set_release(p.release);
        self.set_lookahead(p.lookahead);
    }

    /// Current gain reduction in dB (≥ 0).
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }

    /// Latency added by the active look-ahead window, in samples.
    pub fn latency_samples(&self) -> usize {
        self.lookahead_samples
    }

    fn window_len(&self) -> usize {
        self.lookahead_samples + 1
    }
}

impl BlockProcessor for Limiter {
    fn process(&mut self, buf: &mut [f32]) {
        if !self.enabled {
            return;
        }

        if self.lookahead_samples == 0 {
            // Instant attack: the first over-ceiling sample is already caught.
            for sample in buf.iter_mut() {
                let input = *sample;
                let level = input.abs();

                let target_gain = if level > self.ceiling {
                    self.ceiling / level
                } else {
                    1.0
                };

                if target_gain < self.smoothed_gain {
                    self.smoothed_gain = target_gain;
                } else {
                    self.smoothed_gain = self.release_coeff * self.smoothed_gain
                        + (1.0 - self.release_coeff) * target_gain;
                }

                self.gain_reduction_db =
                    -20.0 * self.smoothed_gain.max(1e-4).log10();
                *sample = input * self.smoothed_gain;
            }
        } else {
            let window = self.window_len();
            for sample in buf.iter_mut() {
                let input = *sample;

                let delayed = self.delay[self.delay_pos];
                self.delay[self.delay_pos] = input;

                // Peak across the whole look-ahead window; the window is at
                // most 481 samples so the scan stays cheap.
                let mut peak = 0.0f32;
                for &v in &self.delay[..window] {
                    peak = peak.max(v.abs());
                }

                let target_gain = if peak > self.ceiling {
                    self.ceiling / peak
                } else {
                    1.0
                };

                if target_gain < self.smoothed_gain {
                    self.smoothed_gain = self.attack_coeff * self.smoothed_gain
                        + (1.0 - self.attack_coeff) * target_gain;
                } else {
                    self.smoothed_gain = self.release_coeff * self.smoothed_gain
                        + (1.0 - self.release_coeff) * target_gain;
                }

                self.gain_reduction_db =
                    -20.0 * self.smoothed_gain.max(1e-4).log10();
                *sample = delayed * self.smoothed_gain;

                self.delay_pos = (self.delay_pos + 1) % window;
            }
        }
    }

    fn reset(&mut self) {
        self.delay.fill(0.0);
        self.delay_pos = 0;
        self.smoothed_gain = 1.0;
        self.gain_reduction_db = 0.0;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new(INTERNAL_SAMPLE_RATE as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::LimiterParams;

    fn sine(amp: f32, freq: f32, n: usize, offset: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let t = (offset + i) as f32 / 48_000.0;
                amp * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn instant_attack_never_exceeds_ceiling() {
        let mut l = Limiter::new(48_000.0);
        l.apply_params(&LimiterParams {
            enabled: true,
            ceiling: -3.0,
            release: 50.0,
            lookahead: 0.0,
        });
        let ceiling = db_to_lin(-3.0);

        // 1 kHz at 0.95 (≈ −0.45 dBFS), one second
        let mut max_out = 0.0f32;
        for block in 0..100 {
            let mut buf = sine(0.95, 1000.0, 480, block * 480);
            l.process(&mut buf);
            for &v in &buf {
                max_out = max_out.max(v.abs());
            }
        }
        assert!(
            max_out <= ceiling + 1e-6,
            "peak {max_out} exceeds ceiling {ceiling}"
        );
        assert!(l.gain_reduction_db() > 0.0);
    }

    #[test]
    fn ceiling_is_respected_within_the_first_blocks() {
        let mut l = Limiter::new(48_000.0);
        l.apply_params(&LimiterParams {
            enabled: true,
            ceiling: -3.0,
            release: 50.0,
            lookahead: 0.0,
        });
        let ceiling = db_to_lin(-3.0);

        // First 2400 samples already stay under the ceiling.
        let mut buf = sine(0.95, 1000.0, 2400, 0);
        l.process(&mut buf);
        assert!(buf.iter().all(|&v| v.abs() <= ceiling + 1e-6));
    }

    #[test]
    fn lookahead_path_limits_steady_state_and_delays_output() {
        let mut l = Limiter::new(48_000.0);
        l.apply_params(&LimiterParams {
            enabled: true,
            ceiling: -1.0,
            release: 50.0,
            lookahead: 5.0,
        });
        assert_eq!(l.latency_samples(), 240);
        let ceiling = db_to_lin(-1.0);

        let mut max_late = 0.0f32;
        for block in 0..100 {
            let mut buf = sine(0.95, 1000.0, 480, block * 480);
            l.process(&mut buf);
            if block >= 10 {
                for &v in &buf {
                    max_late = max_late.max(v.abs());
                }
            }
        }
        // After the attack settles, the smoothed gain pins the output to
        // the ceiling (small ε for the exponential smoother).
        assert!(
            max_late <= ceiling * 1.01,
            "late peak {max_late} vs ceiling {ceiling}"
        );
    }

    #[test]
    fn quiet_signal_passes_untouched() {
        let mut l = Limiter::new(48_000.0);
        l.apply_params(&LimiterParams {
            enabled: true,
            ceiling: -1.0,
            release: 50.0,
            lookahead: 0.0,
        });
        let mut buf = sine(0.1, 440.0, 4800, 0);
        let orig = buf.clone();
        l.process(&mut buf);
        assert_eq!(buf, orig);
        assert_eq!(l.gain_reduction_db(), 0.0);
    }

    #[test]
    fn disabled_is_identity() {
        let mut l = Limiter::new(48_000.0);
        l.set_enabled(false);
        let mut buf = vec![1.5f32; 480];
        l.process(&mut buf);
        assert!(buf.iter().all(|&v| v == 1.5));
    }

    #[test]
    fn reset_gives_deterministic_output() {
        let mut l = Limiter::new(48_000.0);
        let input = sine(0.95, 1000.0, 960, 0);

        let mut a = input.clone();
        l.process(&mut a);
        l.reset();
        let mut b = input.clone();
        l.process(&mut b);
        assert_eq!(a, b);
    }
}

//! Feed-forward compressor with soft knee and makeup gain.
//!
//! A peak envelope with attack/release one-poles drives a static gain
//! curve: unity below `threshold − knee/2`, the full `1/ratio` slope above
//! `threshold + knee/2`, and a quadratic interpolation inside the knee.
//! The applied gain is smoothed with a 0.99-retention one-pole so parameter
//! and level changes never produce zipper noise.

use crate::dsp::{db_to_lin, lin_to_db, time_coeff, BlockProcessor};
use crate::INTERNAL_SAMPLE_RATE;

/// Retention of the per-sample gain smoother.
const GAIN_SMOOTH: f32 = 0.99;

pub struct Compressor {
    enabled: bool,
    sample_rate: f32,

    threshold_db: f32,
    ratio: f32,
    knee_db: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Linear makeup gain.
    makeup_gain: f32,

    envelope: f32,
    smoothed_gain: f32,
    gain_reduction_db: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        let mut c = Self {
            enabled: true,
            sample_rate,
            threshold_db: 0.0,
            ratio: 1.0,
            knee_db: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup_gain: 1.0,
            envelope: 0.0,
            smoothed_gain: 1.0,
            gain_reduction_db: 0.0,
        };
        c.set_threshold(-18.0);
        c.set_ratio(4.0);
        c.set_knee(6.0);
        c.set_attack(10.0);
        c.set_release(100.0);
        c.set_makeup_gain(6.0);
        c
    }

    pub fn set_threshold(&mut self, db: f32) {
        self.threshold_db = db.clamp(-40.0, 0.0);
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = ratio.clamp(1.0, 20.0);
    }

    pub fn set_knee(&mut self, db: f32) {
        self.knee_db = db.clamp(0.0, 12.0);
    }

    pub fn set_attack(&mut self, ms: f32) {
        self.attack_coeff = time_coeff(ms.clamp(0.1, 100.0), self.sample_rate);
    }

    pub fn set_release(&mut self, ms: f32) {
        self.release_coeff = time_coeff(ms.clamp(10.0, 1000.0), self.sample_rate);
    }

    pub fn set_makeup_gain(&mut self, db: f32) {
        self.makeup_gain = db_to_lin(db.clamp(0.0, 24.0));
    }

    pub fn apply_params(&mut self, p: &crate::dsp::CompressorParams) {
        self.enabled = p.enabled;
        self.set_threshold(p.threshold);
        self.set_ratio(p.ratio);
        self.set_knee(p.knee);
        self.set_attack(p.attack);
        self.set_release(p.release);
        self.set_makeup_gain(p.makeup_gain);
    }

    /// Gain reduction applied by the static curve, in dB (≥ 0). Makeup gain
    /// is a static offset and is not part of this figure.
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }

    /// Static curve: gain change in dB (≤ 0) for an input level in dB.
    fn compute_gain_db(&self, input_db: f32) -> f32 {
        let knee_start = self.threshold_db - self.knee_db / 2.0;
        let knee_end = self.threshold_db + self.knee_db / 2.0;

        let output_db = if input_db < knee_start {
            input_db
        } else if input_db > knee_end {
            self.threshold_db + (input_db - self.threshold_db) / self.ratio
        } else {
            let x = input_db - knee_start;
            let slope = (1.0 / self.ratio - 1.0) / (2.0 * self.knee_db);
            input_db + slope * x * x
        };

        output_db - input_db
    }
}

impl BlockProcessor for Compressor {
    fn process(&mut self, buf: &mut [f32]) {
        if !self.enabled {
            return;
        }

        for sample in buf.iter_mut() {
            let input = *sample;
            let level = input.abs();

            if level < 1e-10 {
                // Silence: hold the envelope, keep the smoothed gain moving.
                *sample = input * self.smoothed_gain * self.makeup_gain;
                continue;
            }

            let coeff = if level > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

            let envelope_db = lin_to_db(self.envelope);
            let gain_db = self.compute_gain_db(envelope_db);
            self.gain_reduction_db = -gain_db;

            let gain = db_to_lin(gain_db);
            self.smoothed_gain = GAIN_SMOOTH * self.smoothed_gain + (1.0 - GAIN_SMOOTH) * gain;

            *sample = input * self.smoothed_gain * self.makeup_gain;
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
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

impl Default for Compressor {
    fn default() -> Self {
        Self::new(INTERNAL_SAMPLE_RATE as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::CompressorParams;

    fn params(threshold: f32, ratio: f32, knee: f32, makeup: f32) -> CompressorParams {
        CompressorParams {
            enabled: true,
            threshold,
            ratio,
            knee,
            attack: 10.0,
            release: 100.0,
            makeup_gain: makeup,
        }
    }

    #[test]
    fn below_threshold_is_transparent() {
        let mut c = Compressor::new(48_000.0);
        c.apply_params(&params(-18.0, 4.0, 0.0, 0.0));

        // −30 dB constant input, well under the threshold
        let amp = db_to_lin(-30.0);
        for _ in 0..200 {
            let mut buf = vec![amp; 480];
            c.process(&mut buf);
        }
        assert!(c.gain_reduction_db().abs() < 0.01);
    }

    #[test]
    fn constant_level_reaches_static_curve_reduction() {
        let mut c = Compressor::new(48_000.0);
        c.apply_params(&params(-18.0, 4.0, 0.0, 0.0));

        // Constant 0.5 (−6.02 dB): 11.98 dB over at 4:1 → 8.98 dB reduction
        let mut out = 0.0;
        for _ in 0..300 {
            let mut buf = vec![0.5f32; 480];
            c.process(&mut buf);
            out = buf[479];
        }
        let gr = c.gain_reduction_db();
        assert!((gr - 8.98).abs() < 0.3, "gain reduction {gr}");
        let expected = 0.5 * db_to_lin(-8.98);
        assert!((out - expected).abs() < 0.01, "output {out}");
    }

    #[test]
    fn sine_gain_reduction_is_positive_and_bounded() {
        // 100 Hz sine at 0.5 with T=−18 dB, R=4: the peak envelope rides
        // between the mean and the crest, so the steady reduction lands in
        // the 6–10 dB band (and is always ≥ 0 per the metering contract).
        let mut c = Compressor::new(48_000.0);
        c.apply_params(&params(-18.0, 4.0, 0.0, 0.0));

        for block in 0..100 {
            let mut buf: Vec<f32> = (0..480)
                .map(|i| {
                    let n = (block * 480 + i) as f32;
                    0.5 * (2.0 * std::f32::consts::PI * 100.0 * n / 48_000.0).sin()
                })
                .collect();
            c.process(&mut buf);
            assert!(c.gain_reduction_db() >= 0.0);
        }
        let gr = c.gain_reduction_db();
        assert!(gr > 6.0 && gr < 10.0, "steady gain reduction {gr}");
    }

    #[test]
    fn makeup_gain_is_reported_separately_from_reduction() {
        let mut c = Compressor::new(48_000.0);
        c.apply_params(&params(-18.0, 4.0, 0.0, 6.0));

        for _ in 0..300 {
            let mut buf = vec![0.5f32; 480];
            c.process(&mut buf);
        }
        // Reduction is the same as without makeup; output is 6 dB hotter.
        assert!((c.gain_reduction_db() - 8.98).abs() < 0.3);
    }

    #[test]
    fn soft_knee_is_gentler_than_hard_knee_at_threshold() {
        let hard = {
            let mut c = Compressor::new(48_000.0);
            c.apply_params(&params(-18.0, 4.0, 0.0, 0.0));
            c.compute_gain_db(-18.0)
        };
        let soft = {
            let mut c = Compressor::new(48_000.0);
            c.apply_params(&params(-18.0, 4.0, 12.0, 0.0));
            c.compute_gain_db(-18.0)
        };
        // Hard knee: zero reduction exactly at threshold. Soft knee has
        // already started: (W/2)² × slope = W(1/R−1)/8 = −1.125 dB at W=12.
        assert_eq!(hard, 0.0);
        assert!((soft + 1.125).abs() < 0.01, "soft-knee gain {soft}");
    }

    #[test]
    fn knee_curve_is_continuous_at_both_edges() {
        let mut c = Compressor::new(48_000.0);
        c.apply_params(&params(-18.0, 4.0, 6.0, 0.0));
        let eps = 0.001;
        let low = c.compute_gain_db(-21.0 - eps) - c.compute_gain_db(-21.0 + eps);
        let high = c.compute_gain_db(-15.0 - eps) - c.compute_gain_db(-15.0 + eps);
        assert!(low.abs() < 0.01);
        assert!(high.abs() < 0.01);
    }

    #[test]
    fn disabled_is_identity() {
        let mut c = Compressor::new(48_000.0);
        c.set_enabled(false);
        let mut buf = vec![0.9f32; 480];
        c.process(&mut buf);
        assert!(buf.iter().all(|&v| v == 0.9));
    }

    #[test]
    fn reset_gives_deterministic_output() {
        let mut c = Compressor::new(48_000.0);
        let input: Vec<f32> = (0..960).map(|i| (i as f32 * 0.01).sin() * 0.8).collect();

        let mut a = input.clone();
        c.process(&mut a);
        c.reset();
        let mut b = input.clone();
        c.process(&mut b);
        assert_eq!(a, b);
    }
}

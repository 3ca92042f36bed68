//! Downward expander / noise gate with hysteresis.
//!
//! Tracks a per-sample peak envelope with attack/release one-poles. Below
//! the threshold the signal is pushed further down by `(ratio − 1)` dB per
//! dB of shortfall; above it the gain is unity. The gate opens at the full
//! threshold and, once open, only re-engages expansion below
//! `threshold − hysteresis`, which stops chatter when the envelope hovers
//! at the boundary.

use crate::dsp::{db_to_lin, lin_to_db, time_coeff, BlockProcessor};
use crate::INTERNAL_SAMPLE_RATE;

pub struct Expander {
    enabled: bool,
    sample_rate: f32,

    /// Linear open threshold.
    threshold: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Linear divisor applied to the threshold while the gate is open.
    hysteresis: f32,

    envelope: f32,
    gate_open: bool,
    gain_reduction_db: f32,
}

impl Expander {
    pub fn new(sample_rate: f32) -> Self {
        let mut e = Self {
            enabled: true,
            sample_rate,
            threshold: 0.0,
            ratio: 1.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            hysteresis: 1.0,
            envelope: 0.0,
            gate_open: false,
            gain_reduction_db: 0.0,
        };
        e.set_threshold(-40.0);
        e.set_ratio(2.0);
        e.set_attack(5.0);
        e.set_release(100.0);
        e.set_hysteresis(3.0);
        e
    }

    pub fn set_threshold(&mut self, db: f32) {
        self.threshold = db_to_lin(db.clamp(-60.0, 0.0));
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = ratio.clamp(1.0, 10.0);
    }

    pub fn set_attack(&mut self, ms: f32) {
        self.attack_coeff = time_coeff(ms.clamp(0.1, 100.0), self.sample_rate);
    }

    pub fn set_release(&mut self, ms: f32) {
        self.release_coeff = time_coeff(ms.clamp(10.0, 1000.0), self.sample_rate);
    }

    pub fn set_hysteresis(&mut self, db: f32) {
        self.hysteresis = db_to_lin(db.clamp(0.0, 10.0));
    }

    pub fn apply_params(&mut self, p: &crate::dsp::ExpanderParams) {
        self.enabled = p.enabled;
        self.set_threshold(p.threshold);
        self.set_ratio(p.ratio);
        self.set_attack(p.attack);
        self.set_release(p.release);
        self.set_hysteresis(p.hysteresis);
    }

    /// Current expansion depth in dB (≥ 0).
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }

    fn compute_gain(&mut self, effective_threshold: f32) -> f32 {
        if self.envelope < 1e-10 {
            // Deep silence: pin at the −60 dB floor instead of log(0).
            self.gain_reduction_db = 60.0;
            return 0.001;
        }

        let env_db = lin_to_db(self.envelope);
        let threshold_db = lin_to_db(effective_threshold);

        if env_db < threshold_db {
            let below_db = threshold_db - env_db;
            let expansion_db = below_db * (self.ratio - 1.0);
            self.gain_reduction_db = expansion_db;
            db_to_lin(-expansion_db)
        } else {
            self.gain_reduction_db = 0.0;
            1.0
        }
    }
}

impl BlockProcessor for Expander {
    fn process(&mut self, buf: &mut [f32]) {
        if !self.enabled {
            return;
        }

        for sample in buf.iter_mut() {
            let input = *sample;
            let level = input.abs();

            let coeff = if level > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

            // While open, the effective threshold drops by the hysteresis so
            // a hovering envelope does not re-trigger expansion instantly.
            let effective_threshold = if self.gate_open {
                self.threshold / self.hysteresis
            } else {
                self.threshold
            };

            if self.envelope > self.threshold {
                self.gate_open = true;
            } else if self.envelope < effective_threshold {
                self.gate_open = false;
            }

            let gain = self.compute_gain(effective_threshold);
            *sample = input * gain;
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.gate_open = false;
        self.gain_reduction_db = 0.0;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for Expander {
    fn default() -> Self {
        Self::new(INTERNAL_SAMPLE_RATE as f32)
    }
}

//! Voice equalizer: high-pass → low shelf → presence peak → high shelf,
//! with an optional de-esser tap at the end of the chain.
//!
//! The de-esser runs a narrow band-pass (Q ≈ 4) over the post-EQ signal to
//! form a sibilance envelope; when the envelope exceeds the threshold, the
//! over-threshold fraction of the band component is subtracted from the
//! through-signal, attenuating only the sibilant band.
//!
//! Out-of-range setter values saturate silently to the valid interval.

use crate::dsp::{db_to_lin, Biquad, BlockProcessor};
use crate::INTERNAL_SAMPLE_RATE;

/// Fixed detector Q for the sibilance band-pass.
const DE_ESSER_Q: f32 = 4.0;
/// Sibilance envelope ballistics (one-pole retentions).
const DE_ESSER_ATTACK: f32 = 0.1;
const DE_ESSER_RELEASE: f32 = 0.995;

pub struct Equalizer {
    enabled: bool,
    sample_rate: f32,

    high_pass: Biquad,
    low_shelf: Biquad,
    presence: Biquad,
    high_shelf: Biquad,

    de_esser_enabled: bool,
    de_esser_detect: Biquad,
    de_esser_threshold: f32,
    de_esser_envelope: f32,
}

impl Equalizer {
    pub fn new(sample_rate: f32) -> Self {
        let mut eq = Self {
            enabled: true,
            sample_rate,
            high_pass: Biquad::new(),
            low_shelf: Biquad::new(),
            presence: Biquad::new(),
            high_shelf: Biquad::new(),
            de_esser_enabled: false,
            de_esser_detect: Biquad::new(),
            de_esser_threshold: 1.0,
            de_esser_envelope: 0.0,
        };
        eq.set_high_pass(80.0, 0.7);
        eq.set_low_shelf(200.0, 0.0);
        eq.set_presence(3000.0, 0.0, 1.0);
        eq.set_high_shelf(8000.0, 0.0);
        eq.set_de_esser(6000.0, -20.0);
        eq
    }

    pub fn set_high_pass(&mut self, freq: f32, q: f32) {
        let freq = freq.clamp(20.0, 500.0);
        let q = q.clamp(0.5, 2.0);
        self.high_pass.set_high_pass(self.sample_rate, freq, q);
    }

    pub fn set_low_shelf(&mut self, freq: f32, gain_db: f32) {
        let freq = freq.clamp(80.0, 300.0);
        let gain_db = gain_db.clamp(-12.0, 12.0);
        self.low_shelf.set_low_shelf(self.sample_rate, freq, gain_db);
    }

    pub fn set_presence(&mut self, freq: f32, gain_db: f32, q: f32) {
        let freq = freq.clamp(2000.0, 6000.0);
        let gain_db = gain_db.clamp(-12.0, 12.0);
        let q = q.clamp(0.5, 4.0);
        self.presence.set_peak(self.sample_rate, freq, q, gain_db);
    }

    pub fn set_high_shelf(&mut self, freq: f32, gain_db: f32) {
        let freq = freq.clamp(6000.0, 16_000.0);
        let gain_db = gain_db.clamp(-12.0, 12.0);
        self.high_shelf.set_high_shelf(self.sample_rate, freq, gain_db);
    }

    pub fn set_de_esser(&mut self, freq: f32, threshold_db: f32) {
        let freq = freq.clamp(4000.0, 10_000.0);
        let threshold_db = threshold_db.clamp(-40.0, 0.0);
        self.de_esser_detect
            .set_band_pass(self.sample_rate, freq, DE_ESSER_Q);
        self.de_esser_threshold = db_to_lin(threshold_db);
    }

    pub fn set_de_esser_enabled(&mut self, enabled: bool) {
        self.de_esser_enabled = enabled;
    }

    pub fn apply_params(&mut self, p: &crate::dsp::EqParams) {
        self.enabled = p.enabled;
        self.set_high_pass(p.high_pass.freq, p.high_pass.q);
        self.set_low_shelf(p.low_shelf.freq, p.low_shelf.gain);
        self.set_presence(p.presence.freq, p.presence.gain, p.presence.q);
        self.set_high_shelf(p.high_shelf.freq, p.high_shelf.gain);
        self.set_de_esser(p.de_esser.freq, p.de_esser.threshold);
        self.de_esser_enabled = p.de_esser_enabled;
    }
}

impl BlockProcessor for Equalizer {
    fn process(&mut self, buf: &mut [f32]) {
        if !self.enabled {
            return;
        }

        for v in buf.iter_mut() {
            let mut sample = *v;

            sample = self.high_pass.process_sample(sample);
            sample = self.low_shelf.process_sample(sample);
            sample = self.presence.process_sample(sample);
            sample = self.high_shelf.process_sample(sample);

            if self.de_esser_enabled {
                let sibilance = self.de_esser_detect.process_sample(sample);
                let level = sibilance.abs();

                let coeff = if level > self.de_esser_envelope {
                    DE_ESSER_ATTACK
                } else {
                    DE_ESSER_RELEASE
                };
                self.de_esser_envelope =
                    coeff * self.de_esser_envelope + (1.0 - coeff) * level;

                if self.de_esser_envelope > self.de_esser_threshold {
                    let reduction = self.de_esser_threshold / self.de_esser_envelope;
                    sample -= sibilance * (1.0 - reduction);
                }
            }

            *v = sample;
        }
    }

    fn reset(&mut self) {
        self.high_pass.reset();
        self.low_shelf.reset();
        self.presence.reset();
        self.high_shelf.reset();
        self.de_esser_detect.reset();
        self.de_esser_envelope = 0.0;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new(INTERNAL_SAMPLE_RATE as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(amp: f32, freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / 48_000.0).sin())
            .collect()
    }

    fn settled_peak(buf: &[f32]) -> f32 {
        buf[buf.len() / 2..]
            .iter()
            .fold(0.0f32, |m, &v| m.max(v.abs()))
    }

    #[test]
    fn dc_is_blocked_by_high_pass() {
        let mut eq = Equalizer::new(48_000.0);
        let mut buf = vec![0.5f32; 48_000];
        eq.process(&mut buf);
        // Default 80 Hz HPF: DC fully gone once the filter settles.
        assert!(settled_peak(&buf) < 1e-2);
    }

    #[test]
    fn twenty_hz_is_strongly_attenuated_by_default_hpf() {
        let mut eq = Equalizer::new(48_000.0);
        let mut buf = sine(1.0, 20.0, 96_000);
        eq.process(&mut buf);
        let peak = settled_peak(&buf);
        // Second-order hpf(80 Hz, Q=0.7): ≈ −24 dB two octaves down.
        assert!(peak < 0.08, "20 Hz leak {peak}");
    }

    #[test]
    fn presence_boost_lifts_the_presence_band() {
        let mut eq = Equalizer::new(48_000.0);
        eq.set_presence(3000.0, 6.0, 1.0);
        let mut buf = sine(0.1, 3000.0, 48_000);
        eq.process(&mut buf);
        let peak = settled_peak(&buf);
        let expected = 0.1 * db_to_lin(6.0);
        assert!((peak - expected).abs() < 0.01, "peak {peak}");
    }

    #[test]
    fn setter_values_are_saturated_to_valid_ranges() {
        let mut eq = Equalizer::new(48_000.0);
        // Absurd values must not produce an unstable filter.
        eq.set_high_pass(-500.0, 99.0);
        eq.set_presence(100_000.0, 400.0, 0.0);
        eq.set_high_shelf(1.0, -400.0);

        let mut buf = sine(0.2, 1000.0, 9600);
        eq.process(&mut buf);
        assert!(buf.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn de_esser_attenuates_sibilance_band() {
        let mut eq = Equalizer::new(48_000.0);
        eq.set_de_esser(6000.0, -30.0);
        eq.set_de_esser_enabled(true);

        let mut processed = sine(0.5, 6000.0, 96_000);
        eq.process(&mut processed);

        let mut reference = Equalizer::new(48_000.0);
        let mut dry = sine(0.5, 6000.0, 96_000);
        reference.process(&mut dry);

        let wet_peak = settled_peak(&processed);
        let dry_peak = settled_peak(&dry);
        assert!(
            wet_peak < dry_peak * 0.7,
            "de-esser did not bite: wet {wet_peak} dry {dry_peak}"
        );
    }

    #[test]
    fn de_esser_leaves_low_band_alone() {
        let mut eq = Equalizer::new(48_000.0);
        eq.set_de_esser(6000.0, -30.0);
        eq.set_de_esser_enabled(true);

        let mut with_deesser = sine(0.5, 500.0, 48_000);
        eq.process(&mut with_deesser);

        let mut reference = Equalizer::new(48_000.0);
        let mut without = sine(0.5, 500.0, 48_000);
        reference.process(&mut without);

        let a = settled_peak(&with_deesser);
        let b = settled_peak(&without);
        assert!((a - b).abs() < 0.01, "low band changed: {a} vs {b}");
    }

    #[test]
    fn disabled_is_identity() {
        let mut eq = Equalizer::new(48_000.0);
        eq.set_enabled(false);
        let mut buf = sine(0.3, 100.0, 480);
        let orig = buf.clone();
        eq.process(&mut buf);
        assert_eq!(buf, orig);
    }

    #[test]
    fn reset_gives_deterministic_output() {
        let mut eq = Equalizer::new(48_000.0);
        eq.set_low_shelf(200.0, 3.0);
        eq.set_de_esser_enabled(true);
        let input = sine(0.4, 5000.0, 960);

        let mut a = input.clone();
        eq.process(&mut a);
        eq.reset();
        let mut b = input.clone();
        eq.process(&mut b);
        assert_eq!(a, b);
    }
}

//! Second-order IIR filter (biquad), transposed Direct Form II.
//!
//! Coefficients follow the Audio-EQ-Cookbook (RBJ) formulas. Shelf and peak
//! factories collapse to a flat passthrough when the gain is effectively
//! zero, so an idle band costs two multiply-adds and changes nothing.

use std::f32::consts::PI;

#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    /// A flat (identity) filter.
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        // Tiny offset keeps the recursive state out of denormal range.
        self.z1 = self.b1 * x + self.z2 - self.a1 * y + 1e-25;
        self.z2 = self.b2 * x - self.a2 * y + 1e-25;
        y
    }

    pub fn process_block(&mut self, buf: &mut [f32]) {
        for v in buf.iter_mut() {
            *v = self.process_sample(*v);
        }
    }

    /// Clear the delay state. Coefficients are untouched.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    fn set_flat(&mut self) {
        self.b0 = 1.0;
        self.b1 = 0.0;
        self.b2 = 0.0;
        self.a1 = 0.0;
        self.a2 = 0.0;
    }

    fn apply(&mut self, b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) {
        let inv = 1.0 / a0;
        self.b0 = b0 * inv;
        self.b1 = b1 * inv;
        self.b2 = b2 * inv;
        self.a1 = a1 * inv;
        self.a2 = a2 * inv;
    }

    // -----------------------------------------------------------------------
    // RBJ cookbook factories
    // -----------------------------------------------------------------------

    pub fn set_low_pass(&mut self, sample_rate: f32, freq: f32, q: f32) {
        let w0 = 2.0 * PI * freq / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let c = w0.cos();
        self.apply(
            (1.0 - c) * 0.5,
            1.0 - c,
            (1.0 - c) * 0.5,
            1.0 + alpha,
            -2.0 * c,
            1.0 - alpha,
        );
    }

    pub fn set_high_pass(&mut self, sample_rate: f32, freq: f32, q: f32) {
        let w0 = 2.0 * PI * freq / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let c = w0.cos();
        self.apply(
            (1.0 + c) * 0.5,
            -(1.0 + c),
            (1.0 + c) * 0.5,
            1.0 + alpha,
            -2.0 * c,
            1.0 - alpha,
        );
    }

    /// Constant 0 dB peak-gain band-pass.
    pub fn set_band_pass(&mut self, sample_rate: f32, freq: f32, q: f32) {
        let w0 = 2.0 * PI * freq / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let c = w0.cos();
        self.apply(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * c, 1.0 - alpha);
    }

    pub fn set_notch(&mut self, sample_rate: f32, freq: f32, q: f32) {
        let w0 = 2.0 * PI * freq / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let c = w0.cos();
        self.apply(1.0, -2.0 * c, 1.0, 1.0 + alpha, -2.0 * c, 1.0 - alpha);
    }

    pub fn set_peak(&mut self, sample_rate: f32, freq: f32, q: f32, gain_db: f32) {
        if gain_db.abs() < 0.01 {
            self.set_flat();
            return;
        }
        let a = 10.0f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let c = w0.cos();
        self.apply(
            1.0 + alpha * a,
            -2.0 * c,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * c,
            1.0 - alpha / a,
        );
    }

    pub fn set_low_shelf(&mut self, sample_rate: f32, freq: f32, gain_db: f32) {
        if gain_db.abs() < 0.01 {
            self.set_flat();
            return;
        }
        let a = 10.0f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let c = w0.cos();
        // Shelf slope S = 1, for which the cookbook alpha reduces to sin/√2.
        let alpha = w0.sin() * 0.5 * std::f32::consts::SQRT_2;
        let sqrt_a = a.sqrt();
        self.apply(
            a * ((a + 1.0) - (a - 1.0) * c + 2.0 * sqrt_a * alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * c),
            a * ((a + 1.0) - (a - 1.0) * c - 2.0 * sqrt_a * alpha),
            (a + 1.0) + (a - 1.0) * c + 2.0 * sqrt_a * alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * c),
            (a + 1.0) + (a - 1.0) * c - 2.0 * sqrt_a * alpha,
        );
    }

    pub fn set_high_shelf(&mut self, sample_rate: f32, freq: f32, gain_db: f32) {
        if gain_db.abs() < 0.01 {
            self.set_flat();
            return;
        }
        let a = 10.0f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let c = w0.cos();
        let alpha = w0.sin() * 0.5 * std::f32::consts::SQRT_2;
        let sqrt_a = a.sqrt();
        self.apply(
            a * ((a + 1.0) + (a - 1.0) * c + 2.0 * sqrt_a * alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * c),
            a * ((a + 1.0) + (a - 1.0) * c - 2.0 * sqrt_a * alpha),
            (a + 1.0) - (a - 1.0) * c + 2.0 * sqrt_a * alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * c),
            (a + 1.0) - (a - 1.0) * c - 2.0 * sqrt_a * alpha,
        );
    }
}

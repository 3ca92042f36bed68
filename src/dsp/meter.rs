//! Level metering: decaying peak, windowed RMS, indicative loudness.
//!
//! Loudness is a plain mean-square over a 3 s rolling window reported as
//! `−0.691 + 10·log10(ms)` — the BS.1770 constant without the K-weighting
//! front-end, so the figure is indicative rather than broadcast-certified.

use crate::INTERNAL_SAMPLE_RATE;

/// RMS integration window: 300 ms at the internal rate.
const RMS_WINDOW_SAMPLES: usize = (INTERNAL_SAMPLE_RATE as usize) * 300 / 1000;
/// Loudness window: 3 s at the internal rate.
const LOUDNESS_WINDOW_SAMPLES: usize = (INTERNAL_SAMPLE_RATE as usize) * 3;

const PEAK_FLOOR_DB: f32 = -96.0;
const LOUDNESS_FLOOR: f32 = -70.0;

pub struct Meter {
    sample_rate: f32,

    peak: f32,
    peak_db: f32,
    peak_decay_coeff: f32,

    rms: f32,
    rms_db: f32,
    rms_sum: f32,
    rms_count: usize,

    loudness: f32,
    loudness_buf: Vec<f32>,
    loudness_pos: usize,
    /// Running sum of `loudness_buf`, f64 to avoid drift over long sessions.
    loudness_sum: f64,
}

impl Meter {
    pub fn new(sample_rate: f32) -> Self {
        let mut m = Self {
            sample_rate,
            peak: 0.0,
            peak_db: PEAK_FLOOR_DB,
            peak_decay_coeff: 0.0,
            rms: 0.0,
            rms_db: PEAK_FLOOR_DB,
            rms_sum: 0.0,
            rms_count: 0,
            loudness: LOUDNESS_FLOOR,
            loudness_buf: vec![0.0; LOUDNESS_WINDOW_SAMPLES],
            loudness_pos: 0,
            loudness_sum: 0.0,
        };
        m.set_peak_decay(1500.0);
        m
    }

    /// Peak-meter decay time constant, ms (clamped 100…5000).
    pub fn set_peak_decay(&mut self, ms: f32) {
        let decay_ms = ms.clamp(100.0, 5000.0);
        self.peak_decay_coeff = (-1.0 / (decay_ms * self.sample_rate / 1000.0)).exp();
    }

    pub fn process(&mut self, buf: &[f32]) {
        let mut block_peak = 0.0f32;
        let mut block_sum = 0.0f32;

        for &sample in buf {
            block_peak = block_peak.max(sample.abs());
            let squared = sample * sample;
            block_sum += squared;

            let evicted = self.loudness_buf[self.loudness_pos];
            self.loudness_buf[self.loudness_pos] = squared;
            self.loudness_sum += squared as f64 - evicted as f64;
            self.loudness_pos = (self.loudness_pos + 1) % self.loudness_buf.len();
        }

        // Peak: hold on rise, decay by coeff^frames between blocks. At the
        // fixed 480-sample block the power stays far from underflow.
        if block_peak > self.peak {
            self.peak = block_peak;
        } else {
            self.peak *= self.peak_decay_coeff.powi(buf.len() as i32);
        }
        self.peak_db = if self.peak > 1e-10 {
            20.0 * self.peak.log10()
        } else {
            PEAK_FLOOR_DB
        };

        // RMS over a 300 ms window; on completion the current block's sum
        // seeds the next window so the reading never re-converges from zero.
        self.rms_sum += block_sum;
        self.rms_count += buf.len();
        if self.rms_count >= RMS_WINDOW_SAMPLES {
            self.rms = (self.rms_sum / self.rms_count as f32).sqrt();
            self.rms_db = if self.rms > 1e-10 {
                20.0 * self.rms.log10()
            } else {
                PEAK_FLOOR_DB
            };
            self.rms_sum = block_sum;
            self.rms_count = buf.len();
        }

        let mean_square = (self.loudness_sum / self.loudness_buf.len() as f64) as f32;
        self.loudness = if mean_square > 1e-10 {
            -0.691 + 10.0 * mean_square.log10()
        } else {
            LOUDNESS_FLOOR
        };
    }

    pub fn reset(&mut self) {
        self.peak = 0.0;
        self.peak_db = PEAK_FLOOR_DB;
        self.rms = 0.0;
        self.rms_db = PEAK_FLOOR_DB;
        self.rms_sum = 0.0;
        self.rms_count = 0;
        self.loudness = LOUDNESS_FLOOR;
        self.loudness_buf.fill(0.0);
        self.loudness_pos = 0;
        self.loudness_sum = 0.0;
    }

    /// Peak level, dBFS (floored at −96).
    pub fn peak_dbfs(&self) -> f32 {
        self.peak_db
    }

    pub fn peak_linear(&self) -> f32 {
        self.peak
    }

    /// Windowed RMS level, dBFS (floored at −96).
    pub fn rms_dbfs(&self) -> f32 {
        self.rms_db
    }

    pub fn rms_linear(&self) -> f32 {
        self.rms
    }

    /// Indicative loudness over the 3 s window (floored at −70).
    pub fn loudness(&self) -> f32 {
        self.loudness
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new(INTERNAL_SAMPLE_RATE as f32)
    }
}

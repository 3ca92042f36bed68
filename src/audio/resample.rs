//! Mono sample-rate conversion between device rates and the internal 48 kHz.
//!
//! ## Design
//!
//! Capture devices commonly run at 44.1 or 48 kHz and render devices at
//! whatever the virtual cable negotiated. `RateConverter` bridges either
//! side with linear interpolation and a fractional read position that
//! carries across calls, so block boundaries introduce no phase jumps.
//! Speech tolerates linear interpolation well; the contract is sample-count
//! exactness, not mastering-grade stopband rejection.
//!
//! When the rates match, `process` is an identity passthrough and no state
//! advances at all.
//!
//! ## Usage
//!
//! ```ignore
//! let mut rc = RateConverter::new(44_100, 48_000);
//! rc.process_into(&raw, &mut out); // out reuses its allocation
//! ```

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    src_hz: u32,
    dst_hz: u32,
    /// Input samples consumed per output sample.
    step: f64,
    /// Read position of the next output sample, relative to the current
    /// input block. `-1.0` addresses the last sample of the previous call.
    phase: f64,
    /// Last input sample of the previous call, for cross-block interpolation.
    prev: f32,
}

impl RateConverter {
    /// Create a converter from `src_hz` to `dst_hz`. Equal rates yield a
    /// passthrough converter.
    pub fn new(src_hz: u32, dst_hz: u32) -> Self {
        Self {
            src_hz,
            dst_hz,
            step: src_hz as f64 / dst_hz as f64,
            phase: 0.0,
            prev: 0.0,
        }
    }

    /// Returns `true` when source and destination rates are equal.
    pub fn is_passthrough(&self) -> bool {
        self.src_hz == self.dst_hz
    }

    /// Resample `input`, appending into `out` (cleared first). `out` keeps
    /// its allocation between calls, so after warmup this is alloc-free —
    /// safe for the capture callback.
    ///
    /// Cumulative output length stays within one sample of
    /// `round(n_in × dst / src)` regardless of how the input is chunked.
    pub fn process_into(&mut self, input: &[f32], out: &mut Vec<f32>) {
        out.clear();
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }
        if input.is_empty() {
            return;
        }

        let n = input.len();
        let last = (n - 1) as f64;
        let mut t = self.phase;

        while t <= last {
            let idx = t.floor();
            let frac = (t - idx) as f32;
            let i = idx as isize;
            let s0 = if i < 0 { self.prev } else { input[i as usize] };
            let s1 = if (i + 1) < n as isize {
                input[(i + 1) as usize]
            } else {
                s0
            };
            out.push(s0 + (s1 - s0) * frac);
            t += self.step;
        }

        self.phase = t - n as f64;
        self.prev = input[n - 1];
    }

    /// Convenience wrapper returning a fresh `Vec`.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.output_len_hint(input.len()));
        self.process_into(input, &mut out);
        out
    }

    /// Upper bound on the output length for `n` input samples.
    pub fn output_len_hint(&self, n: usize) -> usize {
        if self.is_passthrough() {
            n
        } else {
            (n as f64 / self.step).ceil() as usize + 2
        }
    }

    /// Clear phase and history. The next call behaves like the first.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.prev = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(48_000, 48_000);
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        let out = rc.process(&samples);
        assert_eq!(out, samples);
    }

    #[test]
    fn upsample_count_within_one_of_ratio() {
        let mut rc = RateConverter::new(44_100, 48_000);
        let input = vec![0.0f32; 44_100];
        let out = rc.process(&input);
        let expected = 48_000i64;
        assert!(
            (out.len() as i64 - expected).abs() <= 1,
            "got {} expected ≈{}",
            out.len(),
            expected
        );
    }

    #[test]
    fn downsample_count_within_one_of_ratio() {
        let mut rc = RateConverter::new(48_000, 44_100);
        let input = vec![0.0f32; 48_000];
        let out = rc.process(&input);
        assert!(
            (out.len() as i64 - 44_100).abs() <= 1,
            "got {}",
            out.len()
        );
    }

    #[test]
    fn chunked_equals_single_call() {
        let signal: Vec<f32> = (0..4410)
            .map(|i| (i as f32 * 0.013).sin() * 0.4)
            .collect();

        let mut whole = RateConverter::new(44_100, 48_000);
        let expected = whole.process(&signal);

        let mut chunked = RateConverter::new(44_100, 48_000);
        let mut got = Vec::new();
        for chunk in signal.chunks(441) {
            got.extend(chunked.process(chunk));
        }

        assert_eq!(got.len(), expected.len());
        for (a, b) in got.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn phase_carries_across_calls() {
        // Total output over many small pushes must match the global ratio,
        // which only holds if the fractional position survives call
        // boundaries.
        let mut rc = RateConverter::new(44_100, 48_000);
        let mut total = 0usize;
        for _ in 0..100 {
            total += rc.process(&[0.0f32; 441]).len();
        }
        assert!((total as i64 - 48_000).abs() <= 1, "got {total}");
    }

    #[test]
    fn reset_restores_deterministic_output() {
        let signal: Vec<f32> = (0..960).map(|i| (i as f32 * 0.02).cos()).collect();
        let mut rc = RateConverter::new(48_000, 44_100);
        let first = rc.process(&signal);
        rc.reset();
        let second = rc.process(&signal);
        assert_eq!(first, second);
    }

    #[test]
    fn dc_input_stays_dc() {
        let mut rc = RateConverter::new(44_100, 48_000);
        let out = rc.process(&vec![0.5f32; 4410]);
        assert!(out.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }
}

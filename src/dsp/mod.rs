//! Numeric DSP chain: parametric EQ, downward expander, soft-knee
//! compressor, brickwall limiter and level metering.
//!
//! Every stage processes mono f32 blocks in place at the internal 48 kHz
//! rate, keeps its own envelope/filter state, and exposes setters that are
//! safe while the pipeline runs: they recompute coefficients but never
//! allocate. All stages share the small capability set in
//! [`BlockProcessor`].

pub mod biquad;
pub mod compressor;
pub mod equalizer;
pub mod expander;
pub mod limiter;
pub mod meter;

pub use biquad::Biquad;
pub use compressor::Compressor;
pub use equalizer::Equalizer;
pub use expander::Expander;
pub use limiter::Limiter;
pub use meter::Meter;

use serde::{Deserialize, Serialize};

/// Capability set shared by the chain stages.
pub trait BlockProcessor {
    /// Process one block in place. A disabled stage is a no-op.
    fn process(&mut self, buf: &mut [f32]);

    /// Clear envelopes, filter memory and delay lines. Two identical input
    /// streams after identical resets produce identical output.
    fn reset(&mut self);

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Tunable parameter records
//
// Field names/units follow the persisted configuration schema; dB and ms
// units are noted per field. Out-of-range values are saturated by the
// processor setters (and by `Config::normalize`).
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExpanderParams {
    pub enabled: bool,
    /// dB, −60…0
    pub threshold: f32,
    /// 1…10
    pub ratio: f32,
    /// ms, 0.1…100
    pub attack: f32,
    /// ms, 10…1000
    pub release: f32,
    /// dB, 0…10
    pub hysteresis: f32,
}

impl Default for ExpanderParams {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: -40.0,
            ratio: 2.0,
            attack: 5.0,
            release: 100.0,
            hysteresis: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressorParams {
    pub enabled: bool,
    /// dB, −40…0
    pub threshold: f32,
    /// 1…20
    pub ratio: f32,
    /// dB knee width, 0…12
    pub knee: f32,
    /// ms, 0.1…100
    pub attack: f32,
    /// ms, 10…1000
    pub release: f32,
    /// dB, 0…24
    pub makeup_gain: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: -18.0,
            ratio: 4.0,
            knee: 6.0,
            attack: 10.0,
            release: 100.0,
            makeup_gain: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimiterParams {
    pub enabled: bool,
    /// dBFS, −6…0
    pub ceiling: f32,
    /// ms, 10…500
    pub release: f32,
    /// ms, 0…10
    pub lookahead: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            enabled: true,
            ceiling: -1.0,
            release: 50.0,
            lookahead: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HighPassParams {
    /// Hz, 20…500
    pub freq: f32,
    /// 0.5…2
    pub q: f32,
}

impl Default for HighPassParams {
    fn default() -> Self {
        Self { freq: 80.0, q: 0.7 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShelfParams {
    pub freq: f32,
    /// dB, ±12
    pub gain: f32,
}

impl Default for ShelfParams {
    fn default() -> Self {
        Self {
            freq: 200.0,
            gain: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenceParams {
    /// Hz, 2000…6000
    pub freq: f32,
    /// dB, ±12
    pub gain: f32,
    /// 0.5…4
    pub q: f32,
}

impl Default for PresenceParams {
    fn default() -> Self {
        Self {
            freq: 3000.0,
            gain: 0.0,
            q: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeEsserParams {
    /// Hz, 4000…10000
    pub freq: f32,
    /// dB, −40…0
    pub threshold: f32,
}

impl Default for DeEsserParams {
    fn default() -> Self {
        Self {
            freq: 6000.0,
            threshold: -20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EqParams {
    pub enabled: bool,
    pub high_pass: HighPassParams,
    pub low_shelf: ShelfParams,
    pub presence: PresenceParams,
    pub high_shelf: ShelfParams,
    pub de_esser: DeEsserParams,
    pub de_esser_enabled: bool,
}

impl Default for EqParams {
    fn default() -> Self {
        Self {
            enabled: true,
            high_pass: HighPassParams::default(),
            low_shelf: ShelfParams::default(),
            presence: PresenceParams::default(),
            high_shelf: ShelfParams {
                freq: 8000.0,
                gain: 0.0,
            },
            de_esser: DeEsserParams::default(),
            de_esser_enabled: false,
        }
    }
}

/// Flat record of every user-tunable value, written only between processing
/// blocks and read by the processors during a block.
#[derive(Debug, Clone, PartialEq)]
pub struct DspParams {
    pub bypass: bool,
    /// Selected AI backend: `"rnnoise"`, `"deepfilter"` or `"openvino"`.
    pub ai_model: String,
    /// Suppressor dry/wet attenuation, dB, −60…0.
    pub suppressor_attenuation: f32,
    pub expander: ExpanderParams,
    pub compressor: CompressorParams,
    pub limiter: LimiterParams,
    pub equalizer: EqParams,
    pub active_preset: String,
}

impl Default for DspParams {
    fn default() -> Self {
        Self {
            bypass: false,
            ai_model: "rnnoise".into(),
            suppressor_attenuation: -30.0,
            expander: ExpanderParams::default(),
            compressor: CompressorParams::default(),
            limiter: LimiterParams::default(),
            equalizer: EqParams::default(),
            active_preset: "podcast".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Floor for dB conversions, ≈ −200 dBFS.
pub(crate) const DB_EPS: f32 = 1e-10;

#[inline]
pub(crate) fn db_to_lin(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[inline]
pub(crate) fn lin_to_db(x: f32) -> f32 {
    20.0 * x.max(DB_EPS).log10()
}

/// One-pole smoothing coefficient for a time constant in milliseconds.
#[inline]
pub(crate) fn time_coeff(ms: f32, sample_rate: f32) -> f32 {
    let denom = ms * 0.001 * sample_rate;
    if denom > 1e-6 {
        (-1.0 / denom).exp()
    } else {
        0.0
    }
}

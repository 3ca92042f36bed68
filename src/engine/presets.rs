//! Factory presets: named immutable snapshots of the DSP parameter set.

use crate::dsp::{
    CompressorParams, DspParams, ExpanderParams, HighPassParams, LimiterParams, PresenceParams,
    ShelfParams,
};

/// One named tuning of the whole chain. EQ band values are applied over the
/// current parameters; the EQ enable flag and de-esser settings are user
/// state and survive preset switches.
pub struct Preset {
    pub name: &'static str,
    pub expander: ExpanderParams,
    pub compressor: CompressorParams,
    pub limiter: LimiterParams,
    pub eq_high_pass: HighPassParams,
    pub eq_low_shelf: ShelfParams,
    pub eq_presence: PresenceParams,
    pub eq_high_shelf: ShelfParams,
}

/// Warm, present voice with controlled dynamics.
pub const PODCAST: Preset = Preset {
    name: "podcast",
    expander: ExpanderParams {
        enabled: true,
        threshold: -45.0,
        ratio: 2.5,
        attack: 5.0,
        release: 100.0,
        hysteresis: 3.0,
    },
    compressor: CompressorParams {
        enabled: true,
        threshold: -16.0,
        ratio: 3.5,
        knee: 6.0,
        attack: 10.0,
        release: 100.0,
        makeup_gain: 6.0,
    },
    limiter: LimiterParams {
        enabled: true,
        ceiling: -1.0,
        release: 50.0,
        lookahead: 5.0,
    },
    eq_high_pass: HighPassParams { freq: 80.0, q: 0.7 },
    eq_low_shelf: ShelfParams {
        freq: 200.0,
        gain: 1.0,
    },
    eq_presence: PresenceParams {
        freq: 3000.0,
        gain: 3.0,
        q: 1.0,
    },
    eq_high_shelf: ShelfParams {
        freq: 8000.0,
        gain: 2.0,
    },
};

/// Natural, less aggressive processing for calls.
pub const MEETING: Preset = Preset {
    name: "meeting",
    expander: ExpanderParams {
        enabled: true,
        threshold: -50.0,
        ratio: 2.0,
        attack: 10.0,
        release: 150.0,
        hysteresis: 4.0,
    },
    compressor: CompressorParams {
        enabled: true,
        threshold: -20.0,
        ratio: 2.5,
        knee: 8.0,
        attack: 15.0,
        release: 150.0,
        makeup_gain: 4.0,
    },
    limiter: LimiterParams {
        enabled: true,
        ceiling: -3.0,
        release: 100.0,
        lookahead: 3.0,
    },
    eq_high_pass: HighPassParams {
        freq: 100.0,
        q: 0.7,
    },
    eq_low_shelf: ShelfParams {
        freq: 200.0,
        gain: 0.0,
    },
    eq_presence: PresenceParams {
        freq: 3000.0,
        gain: 1.5,
        q: 1.0,
    },
    eq_high_shelf: ShelfParams {
        freq: 10_000.0,
        gain: 1.0,
    },
};

/// Punchy, broadcast-style delivery.
pub const STREAMING: Preset = Preset {
    name: "streaming",
    expander: ExpanderParams {
        enabled: true,
        threshold: -40.0,
        ratio: 3.0,
        attack: 3.0,
        release: 80.0,
        hysteresis: 2.0,
    },
    compressor: CompressorParams {
        enabled: true,
        threshold: -14.0,
        ratio: 4.5,
        knee: 4.0,
        attack: 5.0,
        release: 80.0,
        makeup_gain: 8.0,
    },
    limiter: LimiterParams {
        enabled: true,
        ceiling: -0.5,
        release: 30.0,
        lookahead: 5.0,
    },
    eq_high_pass: HighPassParams { freq: 80.0, q: 0.8 },
    eq_low_shelf: ShelfParams {
        freq: 150.0,
        gain: 2.0,
    },
    eq_presence: PresenceParams {
        freq: 4000.0,
        gain: 4.0,
        q: 1.2,
    },
    eq_high_shelf: ShelfParams {
        freq: 12_000.0,
        gain: 3.0,
    },
};

pub const PRESETS: [&Preset; 3] = [&PODCAST, &MEETING, &STREAMING];

/// Look up a preset by name.
pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().copied().find(|p| p.name == name)
}

impl Preset {
    /// Rewrite `params` from this preset's table.
    pub fn apply_to(&self, params: &mut DspParams) {
        params.expander = self.expander;
        params.compressor = self.compressor;
        params.limiter = self.limiter;
        params.equalizer.high_pass = self.eq_high_pass;
        params.equalizer.low_shelf = self.eq_low_shelf;
        params.equalizer.presence = self.eq_presence;
        params.equalizer.high_shelf = self.eq_high_shelf;
        params.active_preset = self.name.to_string();
    }
}

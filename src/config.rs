//! Persistent engine configuration (JSON file).
//!
//! Loading is lenient: a missing or corrupt file yields the defaults, and
//! every field is clamped to its valid range by [`Config::normalize`], so a
//! hand-edited file can never push a processor outside its contract.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dsp::{CompressorParams, DspParams, EqParams, ExpanderParams, LimiterParams};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevicesConfig {
    /// Capture device name; empty selects the system default input.
    pub input_device: String,
    /// Render device name; empty triggers virtual-device auto-selection.
    pub output_device: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RnnoiseSettings {
    /// Dry/wet attenuation, dB, −60…0.
    pub attenuation: f32,
}

impl Default for RnnoiseSettings {
    fn default() -> Self {
        Self { attenuation: -30.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeepFilterSettings {
    pub model_path: String,
    /// Suppression strength, 0…1.
    pub strength: f32,
}

impl Default for DeepFilterSettings {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            strength: 0.8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiSettings {
    pub rnnoise: RnnoiseSettings,
    pub deepfilter: DeepFilterSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub version: u32,
    pub devices: DevicesConfig,
    /// `"rnnoise"`, `"deepfilter"` or `"openvino"`.
    pub ai_model: String,
    pub ai_settings: AiSettings,
    pub expander: ExpanderParams,
    pub compressor: CompressorParams,
    pub limiter: LimiterParams,
    pub equalizer: EqParams,
    pub active_preset: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            devices: DevicesConfig::default(),
            ai_model: "rnnoise".into(),
            ai_settings: AiSettings::default(),
            expander: ExpanderParams::default(),
            compressor: CompressorParams::default(),
            limiter: LimiterParams::default(),
            equalizer: EqParams::default(),
            active_preset: "podcast".into(),
        }
    }
}

impl Config {
    /// Saturate every field to its documented range.
    pub fn normalize(&mut self) {
        match self.ai_model.as_str() {
            "rnnoise" | "deepfilter" | "openvino" => {}
            other => {
                warn!(model = other, "unknown aiModel in config, using rnnoise");
                self.ai_model = "rnnoise".into();
            }
        }
        self.ai_settings.rnnoise.attenuation =
            self.ai_settings.rnnoise.attenuation.clamp(-60.0, 0.0);
        self.ai_settings.deepfilter.strength =
            self.ai_settings.deepfilter.strength.clamp(0.0, 1.0);

        let e = &mut self.expander;
        e.threshold = e.threshold.clamp(-60.0, 0.0);
        e.ratio = e.ratio.clamp(1.0, 10.0);
        e.attack = e.attack.clamp(0.1, 100.0);
        e.release = e.release.clamp(10.0, 1000.0);
        e.hysteresis = e.hysteresis.clamp(0.0, 10.0);

        let c = &mut self.compressor;
        c.threshold = c.threshold.clamp(-40.0, 0.0);
        c.ratio = c.ratio.clamp(1.0, 20.0);
        c.knee = c.knee.clamp(0.0, 12.0);
        c.attack = c.attack.clamp(0.1, 100.0);
        c.release = c.release.clamp(10.0, 1000.0);
        c.makeup_gain = c.makeup_gain.clamp(0.0, 24.0);

        let l = &mut self.limiter;
        l.ceiling = l.ceiling.clamp(-6.0, 0.0);
        l.release = l.release.clamp(10.0, 500.0);
        l.lookahead = l.lookahead.clamp(0.0, 10.0);

        let eq = &mut self.equalizer;
        eq.high_pass.freq = eq.high_pass.freq.clamp(20.0, 500.0);
        eq.high_pass.q = eq.high_pass.q.clamp(0.5, 2.0);
        eq.low_shelf.freq = eq.low_shelf.freq.clamp(80.0, 300.0);
        eq.low_shelf.gain = eq.low_shelf.gain.clamp(-12.0, 12.0);
        eq.presence.freq = eq.presence.freq.clamp(2000.0, 6000.0);
        eq.presence.gain = eq.presence.gain.clamp(-12.0, 12.0);
        eq.presence.q = eq.presence.q.clamp(0.5, 4.0);
        eq.high_shelf.freq = eq.high_shelf.freq.clamp(6000.0, 16_000.0);
        eq.high_shelf.gain = eq.high_shelf.gain.clamp(-12.0, 12.0);
        eq.de_esser.freq = eq.de_esser.freq.clamp(4000.0, 10_000.0);
        eq.de_esser.threshold = eq.de_esser.threshold.clamp(-40.0, 0.0);

        self.active_preset = self.active_preset.trim().to_string();
    }

    /// Build the runtime parameter record this configuration describes.
    pub fn to_dsp_params(&self) -> DspParams {
        DspParams {
            bypass: false,
            ai_model: self.ai_model.clone(),
            suppressor_attenuation: self.ai_settings.rnnoise.attenuation,
            expander: self.expander,
            compressor: self.compressor,
            limiter: self.limiter,
            equalizer: self.equalizer,
            active_preset: self.active_preset.clone(),
        }
    }

    /// Path of the DeepFilter/OpenVINO model file, if configured.
    pub fn model_path(&self) -> Option<&Path> {
        let p = self.ai_settings.deepfilter.model_path.trim();
        if p.is_empty() {
            None
        } else {
            Some(Path::new(p))
        }
    }
}

/// Platform default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Claravox")
            .join("config.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("claravox")
            .join("config.json")
    }
}

/// Load and normalize; missing or corrupt files yield the defaults.
pub fn load_config(path: &Path) -> Config {
    let mut config = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<Config>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
            Config::default()
        }),
        Err(_) => Config::default(),
    };
    config.normalize();
    config
}

/// Persist as pretty JSON, creating parent directories.
pub fn save_config(path: &Path, config: &Config) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

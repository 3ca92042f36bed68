//! Event and status types crossing the IPC boundary.

use serde::{Deserialize, Serialize};

/// Per-block meter reading pushed on the meter channel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterSnapshot {
    /// Output peak, dBFS.
    pub peak_dbfs: f32,
    /// Output RMS over the 300 ms window, dBFS.
    pub rms_dbfs: f32,
    /// Compressor gain reduction, dB (≥ 0).
    pub gain_reduction_db: f32,
}

/// Current state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but not started.
    Idle,
    /// Audio threads active, blocks flowing.
    Running,
    /// Stopped; may be restarted.
    Stopped,
    /// Unrecoverable error — restart required.
    Error,
}

/// Emitted whenever the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error cause).
    pub detail: Option<String>,
}

/// Full status document returned for `GET_STATUS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: EngineStatus,
    pub bypass: bool,
    pub active_preset: String,
    /// Backend actually in use (after any fallback).
    pub ai_backend: String,
    pub input_rms_dbfs: f32,
    pub output_peak_dbfs: f32,
    pub output_rms_dbfs: f32,
    pub gain_reduction_db: f32,
    pub blocks_processed: u64,
    pub capture_overruns: u64,
    pub render_underruns: u64,
}

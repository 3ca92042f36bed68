//! # claravox
//!
//! Real-time voice-enhancement engine: physical microphone in, AI noise
//! suppression plus a broadcast-style dynamics/EQ chain, virtual output
//! device out. Applications that capture the virtual device see an
//! enhanced microphone.
//!
//! ## Architecture
//!
//! ```text
//! Microphone ──callback──► [mono downmix + input resampler] ──► CaptureRing
//!                                                                    │
//!                            ProcessingThread drains 480-sample blocks
//!                                                                    │
//!  [InputMeter] → [AI suppressor] → [Expander] → [EQ] → [Compressor] → [Limiter] → [OutputMeter]
//!                                                                    │
//!                                [output resampler] ──► RenderRing ──► render callback
//! ```
//!
//! The capture and render callbacks are zero-alloc after warmup. All heap
//! work happens at startup or on the control thread; the processing thread
//! never allocates once running.
//!
//! Control messages (bypass, presets, devices, parameter updates) enter
//! through [`ipc::ControlMessage`] and become visible to the DSP chain at
//! the next block boundary. A [`ipc::events::MeterSnapshot`] is broadcast
//! per processed block.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod config;
pub mod denoise;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod ipc;

/// The pipeline's internal sample rate. Everything between the input and
/// output resamplers runs at this rate, mono.
pub const INTERNAL_SAMPLE_RATE: u32 = 48_000;

/// Samples per processing block: 10 ms at 48 kHz. Pinned by the AI
/// suppressor's fixed framing; the rest of the chain aligns to it so no
/// stage ever sees a partial block.
pub const BLOCK_SIZE: usize = 480;

// Convenience re-exports for downstream crates
pub use config::Config;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use ipc::events::{EngineStatus, MeterSnapshot, StatusSnapshot};

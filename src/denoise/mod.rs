//! AI noise suppression.
//!
//! The [`Denoiser`] trait decouples the pipeline from any specific backend:
//! the always-available RNNoise CPU model, an accelerator-backed ONNX model
//! (feature `onnx`), or a passthrough stub for tests. All backends share one
//! contract: exactly [`FRAME_SIZE`] mono samples at 48 kHz in, the same
//! count denoised out, plus a voice-activity probability.
//!
//! [`FrameSuppressor`] wraps a backend with the framing glue the pipeline
//! needs: input accumulation, an output backlog, and a fixed one-frame
//! latency.

pub mod rnnoise;
pub mod stub;
mod suppressor;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use rnnoise::RnnoiseDenoiser;
pub use stub::PassthroughDenoiser;
pub use suppressor::FrameSuppressor;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxDenoiser, OnnxDenoiserConfig};

use tracing::warn;

/// Samples per denoiser frame: 10 ms at 48 kHz. Fixed by the NN models.
pub const FRAME_SIZE: usize = 480;

/// Contract for noise-suppression backends.
///
/// `&mut self` expresses that denoisers are stateful (GRU/conv memory);
/// the suppressor owns its backend exclusively, so no locking is involved.
pub trait Denoiser: Send + 'static {
    /// Denoise exactly one frame. `input` and `output` are both
    /// [`FRAME_SIZE`] long; samples use the nominal ±1.0 range.
    ///
    /// Returns the voice-activity probability in [0, 1] for this frame.
    fn process_frame(&mut self, output: &mut [f32], input: &[f32]) -> f32;

    /// Recreate all internal model state.
    fn reset(&mut self);

    /// Short backend identifier for status reporting.
    fn name(&self) -> &'static str;
}

/// Resolve a configured model name to a backend.
///
/// `"rnnoise"` always succeeds. `"deepfilter"` and `"openvino"` select the
/// ONNX backend (CPU-preferred and accelerator-preferred respectively);
/// when the feature is missing or the model fails to load, this logs and
/// falls back to RNNoise so the pipeline keeps running.
pub fn create_denoiser(
    model: &str,
    model_path: Option<&std::path::Path>,
) -> Box<dyn Denoiser> {
    match model {
        "rnnoise" => Box::new(RnnoiseDenoiser::new()),

        #[cfg(feature = "onnx")]
        name @ ("deepfilter" | "openvino") => {
            let Some(path) = model_path else {
                warn!(model = name, "no model path configured, using rnnoise");
                return Box::new(RnnoiseDenoiser::new());
            };
            let cfg = OnnxDenoiserConfig {
                model_path: path.to_path_buf(),
                prefer_accelerator: name == "openvino",
            };
            match OnnxDenoiser::new(cfg) {
                Ok(d) => Box::new(d),
                Err(e) => {
                    warn!(model = name, error = %e, "ONNX backend load failed, falling back to rnnoise");
                    Box::new(RnnoiseDenoiser::new())
                }
            }
        }

        #[cfg(not(feature = "onnx"))]
        name @ ("deepfilter" | "openvino") => {
            let _ = model_path;
            warn!(
                model = name,
                "built without the onnx feature, using rnnoise"
            );
            Box::new(RnnoiseDenoiser::new())
        }

        other => {
            warn!(model = other, "unknown AI model, using rnnoise");
            Box::new(RnnoiseDenoiser::new())
        }
    }
}

//! Accelerator-backed denoiser via the `ort` ONNX Runtime bindings.
//!
//! Targets streaming denoiser exports with the same contract as the CPU
//! backend: one 480-sample 48 kHz mono frame per inference.
//!
//! ## Expected graph signature
//!
//! | Tensor        | Shape      | Notes                                 |
//! |---------------|------------|---------------------------------------|
//! | `audio` (in)  | `[1, 480]` | f32, ±1.0 range                       |
//! | `denoised`    | `[1, 480]` | f32, ±1.0 range                       |
//! | `vad` (opt.)  | `[1]`      | speech probability; 1.0 when missing  |
//!
//! Recurrent state is expected to live inside the graph (stateful export).
//! `reset()` rebuilds the session to clear it.
//!
//! Execution-provider selection: `prefer_accelerator` tries DirectML with a
//! silent fallback to CPU (Windows); elsewhere the CPU provider is used and
//! the preference only logs.

use std::path::PathBuf;

use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::TensorRef;
use tracing::{info, warn};

use crate::error::{EngineError, Result};

use super::{Denoiser, FRAME_SIZE};

#[derive(Debug, Clone)]
pub struct OnnxDenoiserConfig {
    pub model_path: PathBuf,
    /// Prefer a GPU/NPU execution provider over plain CPU.
    pub prefer_accelerator: bool,
}

pub struct OnnxDenoiser {
    config: OnnxDenoiserConfig,
    session: Session,
    frame: [f32; FRAME_SIZE],
}

fn build_session(config: &OnnxDenoiserConfig) -> Result<Session> {
    if !config.model_path.exists() {
        return Err(EngineError::ModelLoad(format!(
            "model file not found: {}",
            config.model_path.display()
        )));
    }

    let builder = SessionBuilder::new()
        .map_err(|e| EngineError::ModelLoad(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::All)
        .map_err(|e| EngineError::ModelLoad(e.to_string()))?;

    #[cfg(target_os = "windows")]
    let builder = if config.prefer_accelerator {
        info!("ONNX denoiser EP preference: directml → cpu");
        builder
            .with_execution_providers([
                ort::ep::DirectML::default()
                    .with_device_id(0)
                    .build()
                    .fail_silently(),
                ort::ep::CPU::default().build(),
            ])
            .map_err(|e| EngineError::ModelLoad(e.to_string()))?
    } else {
        builder
            .with_execution_providers([ort::ep::CPU::default().build()])
            .map_err(|e| EngineError::ModelLoad(e.to_string()))?
    };

    #[cfg(not(target_os = "windows"))]
    let builder = {
        if config.prefer_accelerator {
            warn!("accelerator preference ignored on this platform, using CPU EP");
        }
        builder
            .with_execution_providers([ort::ep::CPU::default().build()])
            .map_err(|e| EngineError::ModelLoad(e.to_string()))?
    };

    builder
        .commit_from_file(&config.model_path)
        .map_err(|e| EngineError::ModelLoad(e.to_string()))
}

impl OnnxDenoiser {
    pub fn new(config: OnnxDenoiserConfig) -> Result<Self> {
        let session = build_session(&config)?;
        info!(model = %config.model_path.display(), "ONNX denoiser loaded");
        Ok(Self {
            config,
            session,
            frame: [0.0; FRAME_SIZE],
        })
    }
}

impl Denoiser for OnnxDenoiser {
    fn process_frame(&mut self, output: &mut [f32], input: &[f32]) -> f32 {
        debug_assert_eq!(input.len(), FRAME_SIZE);
        self.frame.copy_from_slice(input);

        let tensor =
            match TensorRef::from_array_view(([1_i64, FRAME_SIZE as i64], &self.frame[..])) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "ONNX input tensor construction failed, passing dry frame");
                    output.copy_from_slice(input);
                    return 1.0;
                }
            };

        let outputs = match self.session.run(ort::inputs!["audio" => tensor]) {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "ONNX inference failed, passing dry frame");
                output.copy_from_slice(input);
                return 1.0;
            }
        };

        match outputs["denoised"].try_extract_tensor::<f32>() {
            Ok((_, data)) if data.len() >= FRAME_SIZE => {
                output.copy_from_slice(&data[..FRAME_SIZE]);
            }
            _ => {
                warn!("ONNX output malformed, passing dry frame");
                output.copy_from_slice(input);
                return 1.0;
            }
        }

        outputs
            .get("vad")
            .and_then(|v| v.try_extract_tensor::<f32>().ok())
            .and_then(|(_, data)| data.first().copied())
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(1.0)
    }

    fn reset(&mut self) {
        // Recurrent state lives in the session; rebuild it.
        match build_session(&self.config) {
            Ok(session) => self.session = session,
            Err(e) => warn!(error = %e, "ONNX session rebuild failed, keeping stale state"),
        }
    }

    fn name(&self) -> &'static str {
        if self.config.prefer_accelerator {
            "openvino"
        } else {
            "deepfilter"
        }
    }
}

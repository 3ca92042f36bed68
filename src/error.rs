use thiserror::Error;

/// All errors produced by claravox.
///
/// Initialization-phase errors propagate to the caller and prevent start.
/// Steady-state drop-outs (capture overruns, render underruns) are counted
/// in diagnostics and never surface as errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio device initialization failed: {0}")]
    DeviceInit(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no virtual output device found — install a loopback device (e.g. VB-Cable) or configure devices.outputDevice")]
    NoVirtualDeviceFound,

    #[error("AI model load error: {0}")]
    ModelLoad(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("malformed control message: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

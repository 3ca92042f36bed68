//! Control and meter ports.
//!
//! The pipeline side of IPC is transport-agnostic: [`ControlMessage`]s
//! arrive on an mpsc channel serviced by the engine's control thread, and
//! [`events::MeterSnapshot`]s leave on a broadcast channel at block
//! cadence. A concrete transport (the UI talks over a named OS message
//! channel) marshals both using the text protocol in [`protocol`].

pub mod events;
pub mod protocol;

use std::sync::mpsc;

use crate::config::Config;
use crate::dsp::{CompressorParams, EqParams, ExpanderParams, LimiterParams};
use events::StatusSnapshot;

/// Tagged operations accepted by the control port.
#[derive(Debug)]
pub enum ControlMessage {
    SetBypass(bool),
    ApplyPreset(String),
    SetInputDevice(String),
    SetOutputDevice(String),
    SetExpander(ExpanderParams),
    SetCompressor(CompressorParams),
    SetLimiter(LimiterParams),
    SetEq(EqParams),
    SetAiModel(String),
    /// Apply a full configuration document at runtime.
    ApplyConfig(Box<Config>),
    Ping,
    QueryStatus,
}

/// Replies produced by the control thread.
#[derive(Debug)]
pub enum ControlReply {
    Pong,
    Status(Box<StatusSnapshot>),
    Ack,
}

/// One inbound request with an optional reply channel.
pub struct ControlRequest {
    pub message: ControlMessage,
    pub reply_tx: Option<mpsc::Sender<ControlReply>>,
}

impl ControlRequest {
    pub fn fire_and_forget(message: ControlMessage) -> Self {
        Self {
            message,
            reply_tx: None,
        }
    }
}

/// Create the control port channel pair. The sender side goes to the IPC
/// transport; the receiver is serviced by the engine's control thread.
pub fn control_channel() -> (mpsc::Sender<ControlRequest>, mpsc::Receiver<ControlRequest>) {
    mpsc::channel()
}

//! Text wire protocol for the control/meter transport.
//!
//! Messages are framed by the transport and carry `COMMAND[:DATA]`:
//!
//! | Inbound            | Reply                |
//! |--------------------|----------------------|
//! | `PING`             | `PONG`               |
//! | `GET_STATUS`       | `STATUS:<json>`      |
//! | `CONFIG:<json>`    | `OK`                 |
//! | `PRESET:<name>`    | `OK`                 |
//! | `BYPASS:<0|1>`     | `OK`                 |
//!
//! Meter push (outbound, unsolicited): `METERS:<peak>,<rms>,<gr>`.
//!
//! A malformed message yields [`EngineError::Protocol`]; the caller
//! discards it and keeps the port open.

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::ipc::events::MeterSnapshot;
use crate::ipc::{ControlMessage, ControlReply};

/// Parse one framed message into a control operation.
pub fn parse_message(raw: &str) -> Result<ControlMessage> {
    let raw = raw.trim_end_matches(['\r', '\n']);
    let (command, data) = match raw.split_once(':') {
        Some((c, d)) => (c, Some(d)),
        None => (raw, None),
    };

    match (command, data) {
        ("PING", None) => Ok(ControlMessage::Ping),
        ("GET_STATUS", None) => Ok(ControlMessage::QueryStatus),

        ("BYPASS", Some(v)) => match v {
            "0" => Ok(ControlMessage::SetBypass(false)),
            "1" => Ok(ControlMessage::SetBypass(true)),
            other => Err(EngineError::Protocol(format!(
                "BYPASS expects 0 or 1, got {other:?}"
            ))),
        },

        ("PRESET", Some(name)) if !name.is_empty() => {
            Ok(ControlMessage::ApplyPreset(name.to_string()))
        }
        ("PRESET", _) => Err(EngineError::Protocol("PRESET requires a name".into())),

        ("CONFIG", Some(json)) => {
            let config: Config = serde_json::from_str(json)
                .map_err(|e| EngineError::Protocol(format!("CONFIG payload: {e}")))?;
            Ok(ControlMessage::ApplyConfig(Box::new(config)))
        }
        ("CONFIG", None) => Err(EngineError::Protocol("CONFIG requires a payload".into())),

        _ => Err(EngineError::Protocol(format!("unknown command {command:?}"))),
    }
}

/// Format a reply for the transport.
pub fn format_reply(reply: &ControlReply) -> String {
    match reply {
        ControlReply::Pong => "PONG".to_string(),
        ControlReply::Ack => "OK".to_string(),
        ControlReply::Status(snapshot) => {
            // StatusSnapshot has no non-serializable fields; this cannot fail.
            let json = serde_json::to_string(snapshot.as_ref()).unwrap_or_default();
            format!("STATUS:{json}")
        }
    }
}

/// Format a meter push frame.
pub fn format_meters(snapshot: &MeterSnapshot) -> String {
    format!(
        "METERS:{:.2},{:.2},{:.2}",
        snapshot.peak_dbfs, snapshot.rms_dbfs, snapshot.gain_reduction_db
    )
}

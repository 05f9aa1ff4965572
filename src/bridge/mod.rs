//! Bridge protocol types.
//!
//! Control messages are JSON text frames tagged by `"type"`:
//! `{"type": "start_session", "session_id": "session-1234"}`.
//! Audio travels on binary frames as raw little-endian mono PCM.

pub mod link;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Device -> bridge
// ---------------------------------------------------------------------------

/// Control messages the device sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Outbound {
    DeviceInfo {
        device_id: String,
        sample_rate: u32,
        channels: u16,
    },
    StartSession { session_id: String },
    EndSession { session_id: String },
}

// ---------------------------------------------------------------------------
// Bridge -> device
// ---------------------------------------------------------------------------

/// Control messages the bridge sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Inbound {
    /// Acknowledges `device_info`.
    Ready {},
    SessionStarted { session_id: String },
    SessionEnded {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        frames_sent: Option<u64>,
    },
    VadSpeechStart {},
    VadSpeechEnd {},
    Transcript {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    AgentSpeakingStart {},
    AgentSpeakingEnd {},
}

impl Inbound {
    /// Parse one text frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Everything the link reports to the control loop, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    Control(Inbound),
    Audio(Vec<u8>),
}

/// Outbound half of the link as seen by the core.
///
/// Both sends are fire-and-forget. The return value says whether the
/// message was handed to a live connection; `false` means it was dropped.
pub trait BridgeSender {
    fn send_control(&mut self, message: &Outbound) -> bool;
    fn send_audio(&mut self, bytes: &[u8]) -> bool;
}

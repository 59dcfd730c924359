//! Haptic relay messages and a channel-backed relay.
//!
//! Wire format (one JSON object per message):
//!
//! ```json
//! { "type": "leftSound", "data": { "angle": 6.7, ... }, "timestamp": 1718000000000 }
//! ```
//!
//! Delivery is best-effort: a full or disconnected channel drops the message.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Closed set of haptic patterns understood by the companion device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HapticEventKind {
    Speaking,
    Environmental,
    TopicChanged,
    LeftSound,
    RightSound,
}

impl HapticEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HapticEventKind::Speaking => "speaking",
            HapticEventKind::Environmental => "environmental",
            HapticEventKind::TopicChanged => "topicChanged",
            HapticEventKind::LeftSound => "leftSound",
            HapticEventKind::RightSound => "rightSound",
        }
    }
}

/// One message for the relay transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    #[serde(rename = "type")]
    pub kind: HapticEventKind,
    /// Free-form payload.
    pub data: serde_json::Value,
    /// Wall-clock send time, Unix ms.
    pub timestamp: i64,
}

impl RelayMessage {
    pub fn new(kind: HapticEventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Outbound link to whatever fans haptic events to the companion device.
pub trait HapticRelay: Send + 'static {
    /// Hand off a message. Returns `false` if it was dropped.
    fn send(&mut self, message: RelayMessage) -> bool;
}

/// Relay that forwards into a bounded `crossbeam-channel`.
///
/// The receiving half is drained by the transport (socket writer, stdout
/// printer, test harness, ...).
pub struct ChannelRelay {
    tx: Sender<RelayMessage>,
}

impl ChannelRelay {
    pub fn bounded(capacity: usize) -> (Self, Receiver<RelayMessage>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl HapticRelay for ChannelRelay {
    fn send(&mut self, message: RelayMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(m)) => {
                warn!(kind = m.kind.as_str(), "relay queue full, dropping haptic event");
                false
            }
            Err(TrySendError::Disconnected(m)) => {
                debug!(kind = m.kind.as_str(), "relay transport gone, dropping haptic event");
                false
            }
        }
    }
}

/// Relay that discards everything.
#[derive(Debug, Default)]
pub struct NullRelay;

impl HapticRelay for NullRelay {
    fn send(&mut self, _message: RelayMessage) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_uses_type_field_and_camel_case_kind() {
        let msg = RelayMessage::new(HapticEventKind::TopicChanged, json!({ "topic": "work" }));
        let json = serde_json::to_value(&msg).expect("serialize relay message");
        assert_eq!(json["type"], "topicChanged");
        assert_eq!(json["data"]["topic"], "work");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let raw = r#"{"type":"backSound","data":{},"timestamp":1}"#;
        assert!(serde_json::from_str::<RelayMessage>(raw).is_err());
    }

    #[test]
    fn channel_relay_drops_when_full() {
        let (mut relay, rx) = ChannelRelay::bounded(1);
        assert!(relay.send(RelayMessage::new(HapticEventKind::Speaking, json!({}))));
        assert!(!relay.send(RelayMessage::new(HapticEventKind::Speaking, json!({}))));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn channel_relay_survives_disconnected_receiver() {
        let (mut relay, rx) = ChannelRelay::bounded(4);
        drop(rx);
        assert!(!relay.send(RelayMessage::new(HapticEventKind::Environmental, json!({}))));
    }

    #[test]
    fn kind_names_match_serde_names() {
        for kind in [
            HapticEventKind::Speaking,
            HapticEventKind::Environmental,
            HapticEventKind::TopicChanged,
            HapticEventKind::LeftSound,
            HapticEventKind::RightSound,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}

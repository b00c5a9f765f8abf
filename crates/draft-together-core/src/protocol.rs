// Websocket message types exchanged between draft participants and the server.
//
// Every message is a JSON object tagged by `type`, carrying its data under
// `payload`.

use serde::{Deserialize, Serialize};

use crate::champion::Champion;
use crate::draft::{Draft, DraftUpdate, Selection};

/// Messages sent by a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Place a champion in a slot.
    DraftUpdate { payload: DraftUpdate },
    /// Empty a slot.
    ClearSlot { payload: Selection },
    /// Ask for the full champion catalog.
    RequestChampions,
    Heartbeat,
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Full snapshot of the draft, sent on join and after every change.
    DraftState { payload: Draft },
    Champions { payload: Vec<Champion> },
    Error { payload: ErrorPayload },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            payload: ErrorPayload {
                message: message.into(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::champion::ChampionId;
    use crate::draft::{PositionKey, Team};
    use serde_json::json;

    #[test]
    fn parses_draft_update() {
        let raw = r#"{"type":"DRAFT_UPDATE","payload":{"champion_id":103,"position":"RedBan2"}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::DraftUpdate {
                payload: DraftUpdate::new(ChampionId(103), PositionKey::ban(Team::Red, 1).unwrap()),
            }
        );
    }

    #[test]
    fn parses_clear_slot() {
        let raw = r#"{"type":"CLEAR_SLOT","payload":{"team":"Blue","is_ban":false,"index":0}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ClearSlot {
                payload: Selection::new(Team::Blue, false, 0).unwrap(),
            }
        );
    }

    #[test]
    fn parses_unit_messages() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"REQUEST_CHAMPIONS"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RequestChampions);
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"HEARTBEAT"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Heartbeat);
    }

    #[test]
    fn rejects_unknown_type_and_bad_position() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"SURRENDER"}"#).is_err());
        let bad = r#"{"type":"DRAFT_UPDATE","payload":{"champion_id":1,"position":"Blue9"}}"#;
        assert!(serde_json::from_str::<ClientMessage>(bad).is_err());
    }

    #[test]
    fn draft_state_serialization() {
        let msg = ServerMessage::DraftState {
            payload: Draft::default(),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "DRAFT_STATE");
        assert_eq!(value["payload"]["blue_bans"], json!([null, null, null, null, null]));
    }

    #[test]
    fn error_serialization() {
        let value = serde_json::to_value(ServerMessage::error("nope")).unwrap();
        assert_eq!(value, json!({"type": "ERROR", "payload": {"message": "nope"}}));
    }
}

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::MessageView;

/// Events pushed to connected clients. The `type` tag is the wire
/// discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    #[serde(rename = "message.new")]
    MessageNew { message: MessageView },
    #[serde(rename = "presence.changed")]
    PresenceChanged { user_id: Uuid, is_online: bool },
    #[serde(rename = "typing.started")]
    TypingStarted { room_id: String, user_id: Uuid },
    #[serde(rename = "typing.stopped")]
    TypingStopped { room_id: String, user_id: Uuid },
}

impl OutboundEvent {
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_ws_message(&self) -> serde_json::Result<Message> {
        Ok(Message::Text(self.to_payload()?))
    }
}

/// Events accepted from clients over the socket. Anything that does not
/// parse is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "room.join")]
    RoomJoin { room_id: String },
    #[serde(rename = "typing.start")]
    TypingStart { room_id: String },
    #[serde(rename = "typing.stop")]
    TypingStop { room_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_event_wire_format() {
        let user_id = Uuid::new_v4();
        let event = OutboundEvent::PresenceChanged {
            user_id,
            is_online: true,
        };
        let value: serde_json::Value =
            serde_json::from_str(&event.to_payload().unwrap()).unwrap();
        assert_eq!(value["type"], "presence.changed");
        assert_eq!(value["user_id"], user_id.to_string());
        assert_eq!(value["is_online"], true);
    }

    #[test]
    fn test_typing_events_carry_room_and_user() {
        let user_id = Uuid::new_v4();
        let event = OutboundEvent::TypingStarted {
            room_id: "a_b".into(),
            user_id,
        };
        let value: serde_json::Value =
            serde_json::from_str(&event.to_payload().unwrap()).unwrap();
        assert_eq!(value["type"], "typing.started");
        assert_eq!(value["room_id"], "a_b");
    }

    #[test]
    fn test_inbound_event_parsing() {
        let evt: InboundEvent =
            serde_json::from_str(r#"{"type":"room.join","room_id":"x_y"}"#).unwrap();
        assert!(matches!(evt, InboundEvent::RoomJoin { room_id } if room_id == "x_y"));

        let evt: InboundEvent =
            serde_json::from_str(r#"{"type":"typing.start","room_id":"x_y"}"#).unwrap();
        assert!(matches!(evt, InboundEvent::TypingStart { .. }));

        assert!(serde_json::from_str::<InboundEvent>(r#"{"type":"bogus"}"#).is_err());
    }
}

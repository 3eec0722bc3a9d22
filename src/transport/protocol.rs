// Newline-delimited JSON frames exchanged with connected clients

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DeliveryStatus, Identity, MessageId, ServerEvent};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Connection closed before handshake")]
    NoHandshake,

    #[error("Handshake carried an empty identity")]
    EmptyIdentity,

    #[error("Frame longer than {0} bytes")]
    TooLong(usize),

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Default cap on one client line. Frames carry base64 images.
pub const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// First frame on a connection. The identity has already been verified by the
/// authentication layer in front of this server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    Typing {
        to: Identity,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    MessageStatus {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        status: DeliveryStatus,
        receiver: Identity,
    },
    SendMessage {
        to: Identity,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
    FetchHistory {
        peer: Identity,
    },
    ListPeers,
    ClearChat {
        peer: Identity,
    },
    DeleteMessage {
        peer: Identity,
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },
}

pub fn parse_handshake(line: &str) -> Result<Identity, ProtocolError> {
    let handshake: Handshake = serde_json::from_str(line.trim())?;
    if handshake.identity.as_str().trim().is_empty() {
        return Err(ProtocolError::EmptyIdentity);
    }
    Ok(handshake.identity)
}

pub fn parse_frame(line: &str) -> Result<ClientFrame, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Serialize an event as one line, newline included.
pub fn encode_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handshake() {
        let identity = parse_handshake(r#"{"identity":"alice"}"#).unwrap();
        assert_eq!(identity, Identity::from("alice"));

        assert!(matches!(
            parse_handshake(r#"{"identity":"  "}"#),
            Err(ProtocolError::EmptyIdentity)
        ));
        assert!(matches!(parse_handshake("hello"), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_parse_client_frames() {
        let typing = parse_frame(r#"{"type":"typing","to":"bob","isTyping":true}"#).unwrap();
        assert_eq!(
            typing,
            ClientFrame::Typing { to: Identity::from("bob"), is_typing: true }
        );

        let send = parse_frame(r#"{"type":"sendMessage","to":"bob","text":"hi"}"#).unwrap();
        assert_eq!(
            send,
            ClientFrame::SendMessage {
                to: Identity::from("bob"),
                text: Some("hi".to_string()),
                image: None,
            }
        );

        assert_eq!(parse_frame(r#"{"type":"listPeers"}"#).unwrap(), ClientFrame::ListPeers);

        let status =
            parse_frame(r#"{"type":"messageStatus","messageId":"m1","status":"read","receiver":"alice"}"#)
                .unwrap();
        assert_eq!(
            status,
            ClientFrame::MessageStatus {
                message_id: MessageId::from("m1"),
                status: DeliveryStatus::Read,
                receiver: Identity::from("alice"),
            }
        );
    }

    #[test]
    fn test_unknown_frame_type_is_malformed() {
        assert!(matches!(
            parse_frame(r#"{"type":"selfDestruct"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_event_wire_shape() {
        let line = encode_event(&ServerEvent::UserOnlineStatus {
            identity: Identity::from("alice"),
            is_online: true,
        })
        .unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["event"], "userOnlineStatus");
        assert_eq!(value["data"]["identity"], "alice");
        assert_eq!(value["data"]["isOnline"], true);

        let line = encode_event(&ServerEvent::UserLastSeen {
            identity: Identity::from("bob"),
            timestamp: None,
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["event"], "userLastSeen");
        assert!(value["data"]["timestamp"].is_null());
    }
}

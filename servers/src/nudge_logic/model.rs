use lib_common::core::PushFrame;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Frames a client may send over `/ws`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Binds this connection to a user. May be sent again to switch users.
    Register {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Ping,
}

pub fn registered(user_id: &str) -> PushFrame {
    PushFrame {
        event: "registered".to_string(),
        payload: json!({ "userId": user_id }),
    }
}

pub fn pong() -> PushFrame {
    PushFrame {
        event: "pong".to_string(),
        payload: json!({}),
    }
}

pub fn error(message: &str) -> PushFrame {
    PushFrame {
        event: "error".to_string(),
        payload: json!({ "message": message }),
    }
}

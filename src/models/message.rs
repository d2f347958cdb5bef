use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UserId;

/// Persisted chat message. The database row is the authoritative record;
/// the broker and the websocket path only carry serialized copies of it.
#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub product_id: Option<i64>,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn to_response(&self) -> MessageResponse {
        MessageResponse {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content.clone(),
            is_read: self.is_read,
            created_at: self.created_at,
            product_id: self.product_id,
        }
    }
}

/// Wire-level message body. The same JSON is used for websocket frames
/// and broker payloads, so a broker delivery deserializes straight back
/// into the frame that gets pushed to the recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: UserId,
    pub content: String,
    #[serde(default)]
    pub product_id: Option<i64>,
}

/// Empty `message_ids` means "mark the whole conversation read".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub message_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageListResponse {
    pub total: i64,
    pub messages: Vec<MessageResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message {
            id: 42,
            sender_id: UserId(1),
            receiver_id: UserId(2),
            product_id: None,
            content: "hi".into(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn response_wire_shape() {
        let json = serde_json::to_value(sample().to_response()).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["sender_id"], 1);
        assert_eq!(json["receiver_id"], 2);
        assert_eq!(json["content"], "hi");
        assert_eq!(json["is_read"], false);
        assert!(json.get("created_at").is_some());
        // product_id is omitted entirely when absent
        assert!(json.get("product_id").is_none());
    }

    #[test]
    fn response_round_trips_through_broker_payload() {
        let mut msg = sample();
        msg.product_id = Some(7);
        let payload = serde_json::to_vec(&msg.to_response()).unwrap();
        let decoded: MessageResponse = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded.id, 42);
        assert_eq!(decoded.receiver_id, UserId(2));
        assert_eq!(decoded.product_id, Some(7));
    }

    #[test]
    fn mark_read_request_defaults_to_all() {
        let req: MarkReadRequest = serde_json::from_str("{}").unwrap();
        assert!(req.message_ids.is_empty());
    }
}

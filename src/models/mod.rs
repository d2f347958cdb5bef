use serde::{Deserialize, Serialize};

pub mod message;

pub use message::{MarkReadRequest, Message, MessageListResponse, MessageResponse, SendMessageRequest};

/// Validated user identity.
///
/// Constructed only at the authentication boundary (the identity
/// extractor); everything past that point handles this type, never a
/// raw integer or claim map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::broker::MessagePublisher;
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageListResponse, MessageResponse, SendMessageRequest, UserId};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, product_id, content, is_read, created_at";

/// Orchestrates the send path and owns the message queries.
///
/// Sending never blocks on recipient connectivity: the row is persisted
/// first, then handed to the publisher best-effort. Live push happens
/// asynchronously through the delivery consumer.
#[derive(Clone)]
pub struct MessageService {
    db: Pool<Postgres>,
    publisher: Arc<MessagePublisher>,
}

impl MessageService {
    pub fn new(db: Pool<Postgres>, publisher: Arc<MessagePublisher>) -> Self {
        Self { db, publisher }
    }

    pub async fn send_message(
        &self,
        sender_id: UserId,
        req: SendMessageRequest,
    ) -> AppResult<MessageResponse> {
        validate_send(sender_id, &req)?;

        // Persistence must succeed before the send counts as accepted;
        // nothing is published on failure.
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (sender_id, receiver_id, product_id, content) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, sender_id, receiver_id, product_id, content, is_read, created_at",
        )
        .bind(sender_id)
        .bind(req.receiver_id)
        .bind(req.product_id)
        .bind(&req.content)
        .fetch_one(&self.db)
        .await?;

        let response = message.to_response();

        // The row is already durable; the broker only accelerates live
        // delivery, so a publish failure must not fail the send.
        match serde_json::to_vec(&response) {
            Ok(payload) => {
                if let Err(e) = self.publisher.publish(&payload, "application/json").await {
                    tracing::warn!(message_id = response.id, error = %e, "publish failed, relying on database copy");
                }
            }
            Err(e) => {
                tracing::error!(message_id = response.id, error = %e, "failed to serialize outbound message");
            }
        }

        Ok(response)
    }

    /// Two-way paged history with a contact, newest first. Opening a
    /// conversation marks the peer's messages read; a failure there is
    /// logged rather than hiding the messages themselves.
    pub async fn get_messages_by_contact(
        &self,
        user_id: UserId,
        contact_id: UserId,
        limit: i64,
        offset: i64,
    ) -> AppResult<MessageListResponse> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1)",
        )
        .bind(user_id)
        .bind(contact_id)
        .fetch_one(&self.db)
        .await?;

        let messages = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4",
        ))
        .bind(user_id)
        .bind(contact_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        if let Err(e) = self.mark_all_as_read(user_id, contact_id).await {
            tracing::warn!(user_id = %user_id, contact_id = %contact_id, error = %e, "failed to mark messages read");
        }

        Ok(MessageListResponse {
            total,
            messages: messages.iter().map(Message::to_response).collect(),
        })
    }

    /// Empty `message_ids` marks the whole conversation read. Only rows
    /// addressed to `user_id` are ever touched.
    pub async fn mark_messages_as_read(
        &self,
        user_id: UserId,
        contact_id: UserId,
        message_ids: Vec<i64>,
    ) -> AppResult<()> {
        if message_ids.is_empty() {
            return self.mark_all_as_read(user_id, contact_id).await;
        }

        sqlx::query("UPDATE messages SET is_read = TRUE WHERE receiver_id = $1 AND id = ANY($2)")
            .bind(user_id)
            .bind(&message_ids)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn mark_all_as_read(&self, user_id: UserId, contact_id: UserId) -> AppResult<()> {
        sqlx::query(
            "UPDATE messages SET is_read = TRUE \
             WHERE receiver_id = $1 AND sender_id = $2 AND is_read = FALSE",
        )
        .bind(user_id)
        .bind(contact_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn get_unread_count(&self, user_id: UserId) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    pub async fn get_last_message(
        &self,
        user_id: UserId,
        contact_id: UserId,
    ) -> AppResult<MessageResponse> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1) \
             ORDER BY created_at DESC LIMIT 1",
        ))
        .bind(user_id)
        .bind(contact_id)
        .fetch_optional(&self.db)
        .await?;

        message.map(|m| m.to_response()).ok_or(AppError::NotFound)
    }
}

fn validate_send(sender_id: UserId, req: &SendMessageRequest) -> AppResult<()> {
    if sender_id == req.receiver_id {
        return Err(AppError::BadRequest(
            "cannot send a message to yourself".into(),
        ));
    }
    if req.content.trim().is_empty() {
        return Err(AppError::BadRequest("message content cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(receiver: i64, content: &str) -> SendMessageRequest {
        SendMessageRequest {
            receiver_id: UserId(receiver),
            content: content.into(),
            product_id: None,
        }
    }

    #[test]
    fn self_send_is_rejected() {
        let err = validate_send(UserId(1), &request(1, "hi")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn empty_content_is_rejected() {
        let err = validate_send(UserId(1), &request(2, "   ")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn well_formed_request_passes() {
        assert!(validate_send(UserId(1), &request(2, "hi")).is_ok());
    }
}

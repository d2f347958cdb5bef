use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicRejectOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};

use super::{declare_topology, MESSAGE_QUEUE, RECONNECT_DELAY};
use crate::models::MessageResponse;
use crate::websocket::ConnectionRegistry;

/// What to do with one in-flight delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove from the queue: either delivered to a live connection, or
    /// the recipient is offline and the database keeps the record.
    Ack,
    /// The recipient vanished between the presence check and the send;
    /// requeue so a later pass retries.
    NackRequeue,
    /// Undecodable payload; drop it for good.
    RejectDiscard,
}

/// Drains the broker queue forever. Any connection or channel failure
/// tears down the current iteration and reconnects after a fixed
/// backoff; the loop never exits the process.
pub async fn run(amqp_url: String, registry: ConnectionRegistry) {
    loop {
        match consume(&amqp_url, &registry).await {
            Ok(()) => tracing::warn!("delivery stream ended, reconnecting"),
            Err(e) => tracing::error!(error = %e, "delivery consumer failed, reconnecting"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// One consumer lifetime: fresh connection, fresh channel, fresh
/// topology declaration, then drain deliveries single-threaded so
/// per-user ordering falls out of the draining order.
async fn consume(amqp_url: &str, registry: &ConnectionRegistry) -> lapin::Result<()> {
    let conn = Connection::connect(amqp_url, ConnectionProperties::default()).await?;
    let channel = conn.create_channel().await?;
    declare_topology(&channel).await?;

    let mut deliveries = channel
        .basic_consume(
            MESSAGE_QUEUE,
            "",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    tracing::info!(queue = MESSAGE_QUEUE, "delivery consumer waiting for messages");

    while let Some(delivery) = deliveries.next().await {
        settle(delivery?, registry).await;
    }

    Ok(())
}

/// Decides the fate of one delivery. Pure over the registry, so the
/// ack policy is testable without a broker.
pub async fn decide(registry: &ConnectionRegistry, body: &[u8]) -> Disposition {
    let message: MessageResponse = match serde_json::from_slice(body) {
        Ok(m) => m,
        Err(e) => {
            // Should never happen if only this service publishes to the
            // exchange; dropped as a data-integrity warning.
            tracing::warn!(error = %e, "undecodable broker payload, dropping");
            return Disposition::RejectDiscard;
        }
    };

    let receiver = message.receiver_id;
    if !registry.is_online(receiver).await {
        // Offline recipients read history from the database; requeueing
        // would let the queue grow without bound.
        tracing::debug!(user_id = %receiver, "recipient offline, dropping from queue");
        return Disposition::Ack;
    }

    let frame = String::from_utf8_lossy(body).into_owned();
    if registry.send(receiver, frame).await {
        tracing::debug!(user_id = %receiver, message_id = message.id, "delivered over websocket");
        Disposition::Ack
    } else {
        tracing::warn!(user_id = %receiver, "recipient disconnected mid-delivery, requeueing");
        Disposition::NackRequeue
    }
}

async fn settle(delivery: Delivery, registry: &ConnectionRegistry) {
    let result = match decide(registry, &delivery.data).await {
        Disposition::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
        Disposition::NackRequeue => {
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
        }
        Disposition::RejectDiscard => {
            delivery
                .acker
                .reject(BasicRejectOptions { requeue: false })
                .await
        }
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to settle broker delivery");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn payload(receiver: UserId) -> Vec<u8> {
        let message = MessageResponse {
            id: 1,
            sender_id: UserId(10),
            receiver_id: receiver,
            content: "hi".into(),
            is_read: false,
            created_at: Utc::now(),
            product_id: None,
        };
        serde_json::to_vec(&message).unwrap()
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_without_requeue() {
        let registry = ConnectionRegistry::new();
        assert_eq!(
            decide(&registry, b"not json").await,
            Disposition::RejectDiscard
        );
    }

    #[tokio::test]
    async fn offline_recipient_acks_and_drops() {
        let registry = ConnectionRegistry::new();
        assert_eq!(decide(&registry, &payload(UserId(2))).await, Disposition::Ack);
    }

    #[tokio::test]
    async fn online_recipient_gets_the_raw_body() {
        let registry = ConnectionRegistry::new();
        let user = UserId(2);
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(user, Uuid::new_v4(), tx).await;

        let body = payload(user);
        assert_eq!(decide(&registry, &body).await, Disposition::Ack);

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.as_bytes(), &body[..]);
    }

    #[tokio::test]
    async fn presence_race_requeues() {
        let registry = ConnectionRegistry::new();
        let user = UserId(3);
        // A full outbound queue stands in for the recipient vanishing
        // between the presence check and the send.
        let (tx, _rx) = mpsc::channel(1);
        registry.register(user, Uuid::new_v4(), tx).await;
        assert!(registry.send(user, "occupies the slot".into()).await);

        assert_eq!(
            decide(&registry, &payload(user)).await,
            Disposition::NackRequeue
        );
    }
}

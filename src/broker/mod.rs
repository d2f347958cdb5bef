use std::time::Duration;

use lapin::options::{
    BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};

pub mod consumer;
pub mod publisher;

pub use publisher::MessagePublisher;

/// Fixed broker topology: one durable direct exchange, one durable
/// queue, one routing key. No per-user queues.
pub const MESSAGE_EXCHANGE: &str = "message_exchange";
pub const MESSAGE_QUEUE: &str = "messages.queue";
pub const MESSAGE_ROUTING_KEY: &str = "message.route";

const PREFETCH_COUNT: u16 = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Declares the exchange. Durable and idempotent: safe to redeclare on
/// every (re)connect.
async fn declare_exchange(channel: &Channel) -> lapin::Result<()> {
    channel
        .exchange_declare(
            MESSAGE_EXCHANGE,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
}

/// Declares the full consume-side topology: exchange, queue, binding
/// and prefetch window.
async fn declare_topology(channel: &Channel) -> lapin::Result<()> {
    declare_exchange(channel).await?;

    channel
        .queue_declare(
            MESSAGE_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            MESSAGE_QUEUE,
            MESSAGE_EXCHANGE,
            MESSAGE_ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel
        .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
        .await?;

    Ok(())
}

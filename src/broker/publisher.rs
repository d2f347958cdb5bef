use std::sync::Arc;

use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::{watch, Notify, RwLock};

use super::{declare_exchange, MAX_RECONNECT_ATTEMPTS, MESSAGE_EXCHANGE, MESSAGE_ROUTING_KEY, RECONNECT_DELAY};
use crate::error::AppError;

const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Reconnecting broker publisher.
///
/// A background watcher task owns the connection: it dials at startup,
/// re-dials on closure notifications (bounded attempts per outage), and
/// swaps the channel handle under the same lock `publish` reads it
/// through. While no channel is up, `publish` fails cleanly — callers
/// treat that as non-fatal because the message row is already durable.
pub struct MessagePublisher {
    channel: Arc<RwLock<Option<Channel>>>,
    shutdown: watch::Sender<bool>,
}

impl MessagePublisher {
    /// Starts the publisher and its watcher task. An unreachable broker
    /// is not fatal here: the watcher keeps retrying on its own schedule
    /// while the rest of the process serves traffic.
    pub fn start(amqp_url: String) -> Arc<Self> {
        let channel: Arc<RwLock<Option<Channel>>> = Arc::new(RwLock::new(None));
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(watch_connection(amqp_url, channel.clone(), shutdown_rx));

        Arc::new(Self { channel, shutdown })
    }

    /// Publishes one payload to the fixed exchange/routing key with
    /// persistent delivery mode. Fails fast when no channel is
    /// established.
    pub async fn publish(&self, payload: &[u8], content_type: &str) -> Result<(), AppError> {
        let guard = self.channel.read().await;
        let channel = guard.as_ref().ok_or(AppError::BrokerUnavailable)?;

        channel
            .basic_publish(
                MESSAGE_EXCHANGE,
                MESSAGE_ROUTING_KEY,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type(content_type.into())
                    .with_delivery_mode(DELIVERY_MODE_PERSISTENT),
            )
            .await?;

        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.channel.read().await.is_some()
    }

    /// Best-effort shutdown: stops the watcher and closes the channel.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        if let Some(channel) = self.channel.write().await.take() {
            let _ = channel.close(200, "shutting down").await;
        }
        tracing::info!("message publisher closed");
    }
}

/// Dials the broker, opens a channel, declares the exchange and arms the
/// closure notification.
async fn connect(amqp_url: &str, closed: &Arc<Notify>) -> lapin::Result<(Connection, Channel)> {
    let conn = Connection::connect(amqp_url, ConnectionProperties::default()).await?;

    let notify = Arc::clone(closed);
    conn.on_error(move |e| {
        tracing::warn!(error = %e, "publisher connection lost");
        notify.notify_one();
    });

    let channel = conn.create_channel().await?;
    declare_exchange(&channel).await?;

    Ok((conn, channel))
}

async fn watch_connection(
    amqp_url: String,
    handle: Arc<RwLock<Option<Channel>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let closed = Arc::new(Notify::new());

    // The initial dial follows the same bounded-retry schedule as an
    // outage, so a broker that is down at boot does not fail the process.
    let mut conn = establish(&amqp_url, &handle, &closed, &mut shutdown).await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = closed.notified() => {
                *handle.write().await = None;
                drop(conn.take());
                conn = establish(&amqp_url, &handle, &closed, &mut shutdown).await;
            }
        }
    }

    // Dropping the connection closes it; nothing further to unwind.
}

/// Tries to bring a connection up, bounded per outage. Returns `None`
/// when every attempt failed (the watcher then idles until the next
/// closure signal or shutdown) or when shutdown was requested.
async fn establish(
    amqp_url: &str,
    handle: &Arc<RwLock<Option<Channel>>>,
    closed: &Arc<Notify>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Connection> {
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        if *shutdown.borrow() {
            return None;
        }

        match connect(amqp_url, closed).await {
            Ok((conn, channel)) => {
                *handle.write().await = Some(channel);
                tracing::info!("publisher connected, exchange declared");
                return Some(conn);
            }
            Err(e) => {
                tracing::warn!(attempt, max_attempts = MAX_RECONNECT_ATTEMPTS, error = %e, "publisher dial failed");
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }

    tracing::error!("publisher exhausted reconnect attempts for this outage");
    None
}

use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::broker::MessagePublisher;
use crate::config::Config;
use crate::services::MessageService;
use crate::websocket::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: ConnectionRegistry,
    pub publisher: Arc<MessagePublisher>,
    pub messages: MessageService,
    pub config: Arc<Config>,
}

use std::sync::Arc;

use campus_messaging::services::MessageService;
use campus_messaging::state::AppState;
use campus_messaging::websocket::ConnectionRegistry;
use campus_messaging::{broker, config, db, error, logging, routes};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let pool = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
    db::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| error::AppError::StartServer(format!("migrations: {e}")))?;

    let registry = ConnectionRegistry::new();

    // The publisher and the consumer each own their broker connection
    // and reconnect on their own schedules; a dead broker never takes
    // the REST surface down with it.
    let publisher = broker::MessagePublisher::start(cfg.amqp_url.clone());
    tokio::spawn(broker::consumer::run(cfg.amqp_url.clone(), registry.clone()));

    let messages = MessageService::new(pool.clone(), publisher.clone());
    let state = AppState {
        db: pool,
        registry,
        publisher: publisher.clone(),
        messages,
        config: cfg.clone(),
    };

    let app = routes::router(state);

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting campus-messaging");
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    publisher.close().await;
    Ok(())
}

use actix_web::{middleware, web, App, HttpServer};
use realtime_service::{
    handlers::{
        presence::register_routes as register_presence,
        websocket::register_routes as register_websocket,
    },
    logging, metrics,
    services::{PgUserDirectory, UserDirectory},
    state::AppState,
    Config, PresenceService,
};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    tracing::info!("Starting realtime service");

    let config = Config::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let db_pool = match PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Successfully connected to database");
            pool
        }
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "database connection failed",
            ));
        }
    };

    let directory: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(db_pool));

    let presence = Arc::new(PresenceService::new());
    presence.start_sweeper(
        Duration::from_secs(config.presence.sweep_interval_secs),
        chrono::Duration::seconds(config.presence.stale_after_secs as i64),
    );
    tracing::info!(
        sweep_interval_secs = config.presence.sweep_interval_secs,
        stale_after_secs = config.presence.stale_after_secs,
        "Presence service initialized"
    );

    let addr = format!("0.0.0.0:{}", config.app.port);
    let state = AppState {
        config: Arc::new(config),
        directory,
        presence: presence.clone(),
    };

    tracing::info!("Starting HTTP server on {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route("/", web::get().to(|| async { "SkillBarter Realtime Service v1.0" }))
            .configure(register_presence)
            .configure(register_websocket)
    })
    .bind(&addr)?
    .run()
    .await?;

    presence.shutdown();
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lexlink::config::AppConfig;
use lexlink::db;
use lexlink::db::queries;
use lexlink::handlers;
use lexlink::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let state = Arc::new(AppState::new(conn, config.clone()));

    handlers::auth::ensure_admin(&state)?;

    // Hourly sweep of expired sessions and stale rate limit windows.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(3600));
            loop {
                tick.tick().await;
                let db = state.db.lock().unwrap();
                if let Err(e) = queries::delete_expired_sessions(&db)
                    .and_then(|_| queries::cleanup_rate_windows(&db))
                {
                    tracing::warn!("cleanup sweep failed: {e}");
                }
            }
        });
    }

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/lawyers", get(handlers::lawyers::list))
        .route(
            "/api/lawyers/profile",
            put(handlers::lawyers::update_profile),
        )
        .route("/api/lawyers/:lawyer_id", get(handlers::lawyers::detail))
        .route(
            "/api/lawyers/:lawyer_id/verify",
            put(handlers::lawyers::verify),
        )
        .route(
            "/api/lawyers/:lawyer_id/reviews",
            post(handlers::reviews::create),
        )
        .route(
            "/api/lawyers/:lawyer_id/reviews/:review_id",
            delete(handlers::reviews::delete),
        )
        .route(
            "/api/appointment",
            post(handlers::appointments::book).get(handlers::appointments::list),
        )
        .route(
            "/api/appointment/status",
            put(handlers::appointments::update_status),
        )
        .route("/api/appointment/slots", get(handlers::appointments::slots))
        .route(
            "/api/appointment/:appointment_id",
            delete(handlers::appointments::cancel),
        )
        .route("/chat/rooms", get(handlers::chat::rooms))
        .route(
            "/chat/room/:id",
            get(handlers::chat::open_room).delete(handlers::chat::delete_room),
        )
        .route(
            "/chat/lawyer/:lawyer_id",
            get(handlers::chat::open_room_with_lawyer),
        )
        .route(
            "/chat/messages/:id",
            get(handlers::chat::messages).delete(handlers::chat::delete_message),
        )
        .route("/chat/ws", get(handlers::ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use plaza_api::auth::{self, AppState, AppStateInner};
use plaza_api::middleware::require_auth;
use plaza_api::{health, notices, passwords, teams};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    init_logging();

    // Config
    let jwt_secret =
        std::env::var("PLAZA_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PLAZA_DB_PATH").unwrap_or_else(|_| "plaza.db".into());
    let host = std::env::var("PLAZA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PLAZA_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let redis_url = std::env::var("PLAZA_REDIS_URL").ok();
    let environment = std::env::var("PLAZA_ENV").unwrap_or_else(|_| "development".into());
    let build_version = std::env::var("PLAZA_BUILD_VERSION").unwrap_or_else(|_| "dev".into());

    // Init database
    let db = plaza_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        redis_url,
        environment,
        build_version,
    });

    // Routes
    let public_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health::health))
        .route("/users/sign_in", get(auth::sign_in_page).post(auth::sign_in))
        .route("/users/sign_out", delete(auth::sign_out))
        .route("/users/password/new", get(passwords::new_page))
        .route("/users/password/edit", get(passwords::edit_page))
        .route("/users/password", post(passwords::create).put(passwords::update))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/participation/teams", get(teams::index))
        .route("/participation/teams/join", put(teams::join))
        .route("/participation/teams/leave", put(teams::leave))
        .route("/participation/user", patch(teams::update_user))
        .route("/notices", get(notices::index))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Plaza server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Plaza"
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "plaza=debug,tower_http=debug".into());

    let json_logs = std::env::var("PLAZA_LOG_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

//! Backend of a developer social network: accounts, profiles with work and
//! education history, and a post feed with likes and comments.
//!
//! # Layout
//! - [`store`] is the document persistence contract, with [`memory`] and
//!   [`database`] (Redis) behind it
//! - [`accounts`], [`profiles`] and [`posts`] hold the plain reads and writes
//! - [`engine`] holds every fetch-mutate-save operation on posts and profiles
//! - [`routes`] maps the HTTP surface onto those services
//!
//! # Running
//!
//! ```sh
//! TOKEN_SECRET=dev RUST_LOG=connector=debug cargo run
//! ```
//!
//! Secrets are read from `/run/secrets/<NAME>` first and fall back to the
//! environment.
use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Router,
    http::{
        HeaderName, Method,
        header::CONTENT_TYPE,
    },
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod accounts;
pub mod auth;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod github;
pub mod memory;
pub mod middleware;
pub mod models;
pub mod posts;
pub mod profiles;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

use config::Config;
use middleware::{AUTH_HEADER, require_auth};
use routes::{
    auth::{login_handler, me_handler, register_handler},
    posts::{
        add_comment_handler, create_post_handler, delete_post_handler, get_post_handler, like_handler,
        list_posts_handler, remove_comment_handler, unlike_handler,
    },
    profile::{
        add_education_handler, add_experience_handler, delete_account_handler, github_handler,
        list_profiles_handler, my_profile_handler, remove_education_handler, remove_experience_handler,
        upsert_profile_handler, user_profile_handler,
    },
};
use state::AppState;

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    Ok(())
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(AUTH_HEADER)])
        .max_age(Duration::from_secs(60 * 60));

    let public = Router::new()
        .route("/api/users", post(register_handler))
        .route("/api/auth", post(login_handler))
        .route("/api/profile", get(list_profiles_handler))
        .route("/api/profile/user/{user_id}", get(user_profile_handler))
        .route("/api/profile/github/{username}", get(github_handler));

    let protected = Router::new()
        .route("/api/auth", get(me_handler))
        .route("/api/profile/me", get(my_profile_handler))
        .route("/api/profile", post(upsert_profile_handler).delete(delete_account_handler))
        .route("/api/profile/experience", put(add_experience_handler))
        .route("/api/profile/experience/{exp_id}", delete(remove_experience_handler))
        .route("/api/profile/education", put(add_education_handler))
        .route("/api/profile/education/{edu_id}", delete(remove_education_handler))
        .route("/api/posts", post(create_post_handler).get(list_posts_handler))
        .route("/api/posts/{id}", get(get_post_handler).delete(delete_post_handler))
        .route("/api/posts/like/{id}", put(like_handler))
        .route("/api/posts/unlike/{id}", put(unlike_handler))
        .route("/api/posts/comment/{id}", post(add_comment_handler))
        .route("/api/posts/comment/{id}/{comment_id}", delete(remove_comment_handler))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

pub mod auth;
pub mod error;
pub mod extract;
pub mod posts;
pub mod votes;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tally_db::Database;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/{id}/vote", post(votes::vote))
        .fallback(error::fallback)
        .with_state(state)
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state.db)).await?
}

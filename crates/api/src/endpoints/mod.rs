//! API endpoints.

mod posts;
mod profiles;
mod users;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(posts::router())
        .merge(users::router())
        .merge(profiles::router())
}

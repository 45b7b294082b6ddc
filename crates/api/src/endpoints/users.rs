//! User endpoints.

use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};
use chirp_common::AppResult;
use chirp_core::AuthoredPost;

use crate::{middleware::AppState, response::ApiResponse};

/// Create user router.
pub fn router() -> Router<AppState> {
    Router::new().route("/users/{user_id}/posts", get(user_posts))
}

/// Latest posts by one author.
async fn user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<ApiResponse<Vec<AuthoredPost>>> {
    let posts = state.post_service.get_posts_by_user_id(&user_id).await?;
    Ok(ApiResponse::ok(posts))
}

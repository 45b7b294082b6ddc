//! Post endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use chirp_common::AppResult;
use chirp_core::{AuthoredPost, CreatePostInput};
use chirp_db::entities::post;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Create post router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post))
}

/// Latest posts from everyone.
async fn list_posts(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<AuthoredPost>>> {
    let posts = state.post_service.get_all().await?;
    Ok(ApiResponse::ok(posts))
}

/// Get a single post.
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<AuthoredPost>> {
    let post = state.post_service.get_by_id(&id).await?;
    Ok(ApiResponse::ok(post))
}

/// Create a new post as the authenticated caller.
async fn create_post(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreatePostInput>,
) -> AppResult<ApiResponse<post::Model>> {
    let post = state.post_service.create(&caller.user_id, input).await?;
    Ok(ApiResponse::created(post))
}

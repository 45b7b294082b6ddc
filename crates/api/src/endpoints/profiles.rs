//! Profile endpoints.

use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};
use chirp_common::AppResult;
use chirp_core::IdentitySummary;

use crate::{middleware::AppState, response::ApiResponse};

/// Create profile router.
pub fn router() -> Router<AppState> {
    Router::new().route("/profiles/{username}", get(get_profile))
}

/// Public profile by username.
async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<ApiResponse<IdentitySummary>> {
    let user = state.profile_service.get_user_by_username(&username).await?;
    Ok(ApiResponse::ok(user))
}

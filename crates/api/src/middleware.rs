//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware::Next,
    response::Response,
};
use chirp_common::{AppError, AppResult, config::AuthConfig};
use chirp_core::{PostService, ProfileService};

use crate::extractors::Caller;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub post_service: PostService,
    pub profile_service: ProfileService,
    /// Header carrying the authenticated user id.
    pub user_id_header: HeaderName,
}

impl AppState {
    /// Create application state.
    pub fn new(
        post_service: PostService,
        profile_service: ProfileService,
        auth: &AuthConfig,
    ) -> AppResult<Self> {
        let user_id_header = HeaderName::try_from(auth.user_id_header.as_str()).map_err(|e| {
            AppError::Config(format!(
                "Invalid auth.user_id_header {}: {e}",
                auth.user_id_header
            ))
        })?;

        Ok(Self {
            post_service,
            profile_service,
            user_id_header,
        })
    }
}

/// Authentication middleware.
///
/// Requests are authenticated upstream; this only copies the trusted user id
/// header into request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let user_id = req
        .headers()
        .get(&state.user_id_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string);

    if let Some(user_id) = user_id {
        req.extensions_mut().insert(Caller { user_id });
    }

    next.run(req).await
}

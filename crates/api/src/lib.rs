//! HTTP API layer for chirp.
//!
//! This crate exposes the post and profile services over JSON:
//!
//! - **Endpoints**: feed, single post, per-user posts, post creation, profiles
//! - **Extractors**: authenticated caller
//! - **Middleware**: caller identity from a trusted upstream header
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};

//! Database repositories.

pub mod post;

pub use post::{PostFilter, PostRepository};

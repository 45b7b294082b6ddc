//! Database entities.

pub mod post;

pub use post::Entity as Post;

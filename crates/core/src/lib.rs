//! Core business logic for chirp.
//!
//! Posts are stored locally and joined with author identities owned by an
//! external identity provider. Writes are throttled per author with a
//! sliding-window limiter.

pub mod services;

pub use services::*;

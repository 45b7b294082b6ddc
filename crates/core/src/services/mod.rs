//! Business logic services.

#![allow(missing_docs)]

pub mod identity;
pub mod post;
pub mod profile;
pub mod rate_limit;

pub use identity::{HttpIdentityProvider, IdentityGateway, IdentityProvider, IdentitySummary};
pub use post::{AuthoredPost, CreatePostInput, FEED_LIMIT, PostAuthor, PostService};
pub use profile::ProfileService;
pub use rate_limit::{
    InMemorySlidingWindow, PostRateLimiter, RateLimitConfig, RateLimitDecision,
    RedisSlidingWindow, SlidingWindowStore,
};

//! Post service.

use std::collections::{HashMap, HashSet};

use crate::services::identity::{IdentityGateway, IdentitySummary};
use crate::services::rate_limit::PostRateLimiter;
use chirp_common::{AppError, AppResult};
use chirp_db::{
    entities::post,
    repositories::{PostFilter, PostRepository},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Maximum number of posts returned by a feed query.
pub const FEED_LIMIT: u64 = 100;

#[allow(clippy::unwrap_used)]
static EMOJI_ONLY: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"^[\p{Extended_Pictographic}\p{Emoji_Component}]+$").unwrap()
});

/// Input for creating a new post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    #[validate(
        length(min = 1, max = 280, message = "content must be between 1 and 280 characters"),
        custom(function = "validate_emoji_content")
    )]
    pub content: String,
}

/// Every character must be an emoji or an emoji component.
fn validate_emoji_content(content: &str) -> Result<(), ValidationError> {
    // Empty content is reported by the length rule.
    if content.is_empty() || EMOJI_ONLY.is_match(content) {
        return Ok(());
    }
    Err(ValidationError::new("emoji").with_message("only emoji characters are allowed".into()))
}

/// Public author fields attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub id: String,
    pub username: String,
    pub profile_picture: String,
}

impl PostAuthor {
    /// Only identities with a non-empty username can author a visible post.
    fn from_summary(summary: &IdentitySummary) -> Option<Self> {
        let username = summary.username.as_deref().filter(|u| !u.is_empty())?;
        Some(Self {
            id: summary.id.clone(),
            username: username.to_string(),
            profile_picture: summary.profile_picture.clone(),
        })
    }
}

/// Post with author information.
#[derive(Debug, Clone, Serialize)]
pub struct AuthoredPost {
    pub post: post::Model,
    pub author: PostAuthor,
}

/// Post service for business logic.
#[derive(Clone)]
pub struct PostService {
    post_repo: PostRepository,
    identity: IdentityGateway,
    rate_limiter: PostRateLimiter,
}

impl PostService {
    /// Create a new post service.
    #[must_use]
    pub fn new(
        post_repo: PostRepository,
        identity: IdentityGateway,
        rate_limiter: PostRateLimiter,
    ) -> Self {
        Self {
            post_repo,
            identity,
            rate_limiter,
        }
    }

    /// Attach author summaries to posts with a single identity lookup.
    ///
    /// Output order matches input order. If any author cannot be resolved to
    /// an identity with a username, the whole batch fails.
    pub async fn enrich(&self, posts: Vec<post::Model>) -> AppResult<Vec<AuthoredPost>> {
        if posts.is_empty() {
            return Ok(vec![]);
        }

        let mut seen = HashSet::new();
        let author_ids: Vec<String> = posts
            .iter()
            .filter(|p| seen.insert(p.author_id.as_str()))
            .map(|p| p.author_id.clone())
            .collect();

        let summaries = self.identity.get_summaries(&author_ids).await?;
        tracing::debug!(
            posts = posts.len(),
            authors = author_ids.len(),
            resolved = summaries.len(),
            "Enriching posts"
        );

        let authors: HashMap<&str, &IdentitySummary> =
            summaries.iter().map(|s| (s.id.as_str(), s)).collect();

        posts
            .into_iter()
            .map(|post| {
                let Some(author) = authors
                    .get(post.author_id.as_str())
                    .and_then(|s| PostAuthor::from_summary(s))
                else {
                    tracing::error!(
                        post_id = %post.id,
                        author_id = %post.author_id,
                        "Post author missing from identity provider"
                    );
                    return Err(AppError::DependencyInconsistency(format!(
                        "author {} of post {} has no resolvable username",
                        post.author_id, post.id
                    )));
                };
                Ok(AuthoredPost { post, author })
            })
            .collect()
    }

    /// Enrich a single post.
    pub async fn enrich_one(&self, post: post::Model) -> AppResult<AuthoredPost> {
        let post_id = post.id.clone();
        self.enrich(vec![post])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal(format!("Enrichment dropped post {post_id}")))
    }

    /// Latest posts from everyone.
    pub async fn get_all(&self) -> AppResult<Vec<AuthoredPost>> {
        let posts = self
            .post_repo
            .find_many(&PostFilter::all(), FEED_LIMIT)
            .await?;
        self.enrich(posts).await
    }

    /// A single post by ID.
    pub async fn get_by_id(&self, id: &str) -> AppResult<AuthoredPost> {
        let post = self.post_repo.get_by_id(id).await?;
        self.enrich_one(post).await
    }

    /// Latest posts by one author.
    pub async fn get_posts_by_user_id(&self, user_id: &str) -> AppResult<Vec<AuthoredPost>> {
        let posts = self
            .post_repo
            .find_many(&PostFilter::by_author(user_id), FEED_LIMIT)
            .await?;
        self.enrich(posts).await
    }

    /// Create a post.
    ///
    /// Content is validated before the rate limiter is consulted, so invalid
    /// input never spends quota. Quota spent on an admitted attempt is not
    /// returned if the insert fails.
    pub async fn create(&self, author_id: &str, input: CreatePostInput) -> AppResult<post::Model> {
        input.validate()?;

        let decision = self.rate_limiter.check_and_consume(author_id).await?;
        if !decision.allowed {
            return Err(AppError::RateLimited {
                retry_after: decision.retry_after_secs(),
            });
        }

        let post = self.post_repo.create(author_id, &input.content).await?;
        tracing::info!(post_id = %post.id, author_id = %author_id, "Created post");
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::services::identity::mocks::FakeIdentityProvider;
    use chrono::{TimeZone, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn create_test_post(id: &str, author_id: &str, secs: i64) -> post::Model {
        post::Model {
            id: id.to_string(),
            author_id: author_id.to_string(),
            content: "🎉".to_string(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap().into(),
        }
    }

    fn create_service(db: MockDatabase, identity: Arc<FakeIdentityProvider>) -> PostService {
        let post_repo = PostRepository::new(Arc::new(db.into_connection()));
        PostService::new(post_repo, identity, PostRateLimiter::in_memory())
    }

    fn alice_and_bob() -> Arc<FakeIdentityProvider> {
        Arc::new(
            FakeIdentityProvider::new()
                .with_user("A1", Some("alice"))
                .with_user("B1", Some("bob")),
        )
    }

    fn input(content: &str) -> CreatePostInput {
        CreatePostInput {
            content: content.to_string(),
        }
    }

    // Content rule
    #[test]
    fn test_emoji_content_accepted() {
        for content in ["👍", "👍🏽", "👨‍👩‍👧", "🇯🇵", "❤️", "1️⃣", "🎉🎉🎉"] {
            assert!(input(content).validate().is_ok(), "{content} should pass");
        }
    }

    #[test]
    fn test_non_emoji_content_rejected() {
        for content in ["hello", "👍a", "👍 👍", "!"] {
            let err = AppError::from(input(content).validate().unwrap_err());
            match err {
                AppError::Validation(reason) => {
                    assert_eq!(reason, "only emoji characters are allowed");
                }
                other => panic!("Expected Validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_content_length_bounds() {
        assert!(input("").validate().is_err());
        assert!(input(&"😀".repeat(280)).validate().is_ok());
        assert!(input(&"😀".repeat(281)).validate().is_err());
    }

    // Enrichment
    #[tokio::test]
    async fn test_enrich_uses_one_batch_and_preserves_order() {
        let identity = alice_and_bob();
        let service = create_service(MockDatabase::new(DatabaseBackend::Postgres), identity.clone());

        let posts = vec![
            create_test_post("p3", "A1", 30),
            create_test_post("p2", "B1", 20),
            create_test_post("p1", "A1", 10),
        ];

        let enriched = service.enrich(posts).await.unwrap();

        let ids: Vec<_> = enriched.iter().map(|p| p.post.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p2", "p1"]);
        assert_eq!(enriched[0].author.username, "alice");
        assert_eq!(enriched[1].author.username, "bob");
        assert_eq!(
            identity.batches(),
            vec![vec!["A1".to_string(), "B1".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_enrich_empty_makes_no_lookup() {
        let identity = alice_and_bob();
        let service = create_service(MockDatabase::new(DatabaseBackend::Postgres), identity.clone());

        let enriched = service.enrich(vec![]).await.unwrap();

        assert!(enriched.is_empty());
        assert!(identity.batches().is_empty());
    }

    #[tokio::test]
    async fn test_enrich_missing_identity_fails_batch() {
        let identity = Arc::new(FakeIdentityProvider::new().with_user("A1", Some("alice")));
        let service = create_service(MockDatabase::new(DatabaseBackend::Postgres), identity);

        let posts = vec![create_test_post("p1", "A1", 10), create_test_post("p2", "Z9", 20)];

        match service.enrich(posts).await {
            Err(AppError::DependencyInconsistency(msg)) => {
                assert!(msg.contains("Z9"));
                assert!(msg.contains("p2"));
            }
            other => panic!("Expected DependencyInconsistency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_enrich_empty_username_fails_batch() {
        let identity = Arc::new(
            FakeIdentityProvider::new()
                .with_user("A1", Some(""))
                .with_user("B1", None),
        );
        let service = create_service(MockDatabase::new(DatabaseBackend::Postgres), identity);

        for author in ["A1", "B1"] {
            let result = service.enrich_one(create_test_post("p1", author, 10)).await;
            assert!(matches!(result, Err(AppError::DependencyInconsistency(_))));
        }
    }

    // Reads
    #[tokio::test]
    async fn test_get_all_newest_first_with_authors() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[
            create_test_post("P2", "B1", 20),
            create_test_post("P1", "A1", 10),
        ]]);
        let service = create_service(db, alice_and_bob());

        let feed = service.get_all().await.unwrap();

        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].post.id, "P2");
        assert_eq!(feed[0].author.username, "bob");
        assert_eq!(feed[1].post.id, "P1");
        assert_eq!(feed[1].author.username, "alice");
    }

    #[tokio::test]
    async fn test_get_by_id_missing_returns_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<post::Model>::new()]);
        let identity = alice_and_bob();
        let service = create_service(db, identity.clone());

        match service.get_by_id("nope").await {
            Err(AppError::PostNotFound(id)) => assert_eq!(id, "nope"),
            other => panic!("Expected PostNotFound, got {other:?}"),
        }
        assert!(identity.batches().is_empty());
    }

    #[tokio::test]
    async fn test_get_by_id_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_post("P1", "A1", 10)]]);
        let service = create_service(db, alice_and_bob());

        let post = service.get_by_id("P1").await.unwrap();

        assert_eq!(post.post.id, "P1");
        assert_eq!(post.author.id, "A1");
        assert_eq!(post.author.profile_picture, "https://img.example/A1.png");
    }

    #[tokio::test]
    async fn test_get_posts_by_user_id() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[
            create_test_post("P3", "A1", 30),
            create_test_post("P1", "A1", 10),
        ]]);
        let identity = alice_and_bob();
        let service = create_service(db, identity.clone());

        let posts = service.get_posts_by_user_id("A1").await.unwrap();

        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.author.username == "alice"));
        assert_eq!(identity.batches(), vec![vec!["A1".to_string()]]);
    }

    // Write path
    #[tokio::test]
    async fn test_create_rate_limited_after_three() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([
            [create_test_post("n1", "A1", 1)],
            [create_test_post("n2", "A1", 2)],
            [create_test_post("n3", "A1", 3)],
        ]);
        let service = create_service(db, alice_and_bob());

        let mut ids = HashSet::new();
        for _ in 0..3 {
            let post = service.create("A1", input("🎉")).await.unwrap();
            assert_eq!(post.author_id, "A1");
            ids.insert(post.id);
        }
        assert_eq!(ids.len(), 3);

        match service.create("A1", input("🎉")).await {
            Err(AppError::RateLimited { retry_after }) => {
                assert!((1..=60).contains(&retry_after));
            }
            other => panic!("Expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_invalid_input_does_not_consume_quota() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_post("n1", "A1", 1)]]);
        let service = create_service(db, alice_and_bob());

        for _ in 0..5 {
            let result = service.create("A1", input("hello")).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }

        service.create("A1", input("👍")).await.unwrap();

        // The valid call above was attempt #1 of 3
        let decision = service.rate_limiter.check_and_consume("A1").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_create_limits_are_per_author() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([
            [create_test_post("n1", "A1", 1)],
            [create_test_post("n2", "A1", 2)],
            [create_test_post("n3", "A1", 3)],
            [create_test_post("n4", "B1", 4)],
        ]);
        let service = create_service(db, alice_and_bob());

        for _ in 0..3 {
            service.create("A1", input("🎉")).await.unwrap();
        }

        let post = service.create("B1", input("🔥")).await.unwrap();
        assert_eq!(post.author_id, "B1");
    }

    #[test]
    fn test_authored_post_serializes_camel_case() {
        let authored = AuthoredPost {
            post: create_test_post("P1", "A1", 10),
            author: PostAuthor {
                id: "A1".to_string(),
                username: "alice".to_string(),
                profile_picture: "https://img.example/A1.png".to_string(),
            },
        };

        let json = serde_json::to_value(&authored).unwrap();
        assert_eq!(json["post"]["authorId"], "A1");
        assert!(json["post"]["createdAt"].is_string());
        assert_eq!(json["author"]["profilePicture"], "https://img.example/A1.png");
    }
}

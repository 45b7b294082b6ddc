//! Post repository.

use std::sync::Arc;

use crate::entities::{Post, post};
use chirp_common::{AppError, AppResult, IdGenerator};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

/// Filter for listing posts.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Only posts by this author.
    pub author_id: Option<String>,
}

impl PostFilter {
    /// Filter matching every post.
    #[must_use]
    pub const fn all() -> Self {
        Self { author_id: None }
    }

    /// Filter matching one author's posts.
    #[must_use]
    pub fn by_author(author_id: impl Into<String>) -> Self {
        Self {
            author_id: Some(author_id.into()),
        }
    }
}

/// Post repository for database operations.
///
/// The store owns post identity: IDs and creation timestamps are assigned here.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Find a post by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a post by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<post::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(id.to_string()))
    }

    /// List posts matching `filter`, newest first, at most `limit` rows.
    pub async fn find_many(&self, filter: &PostFilter, limit: u64) -> AppResult<Vec<post::Model>> {
        let mut condition = Condition::all();
        if let Some(author_id) = &filter.author_id {
            condition = condition.add(post::Column::AuthorId.eq(author_id.as_str()));
        }

        Post::find()
            .filter(condition)
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a new post.
    pub async fn create(&self, author_id: &str, content: &str) -> AppResult<post::Model> {
        let model = post::ActiveModel {
            id: Set(self.id_gen.generate()),
            author_id: Set(author_id.to_string()),
            content: Set(content.to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        let post = model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(post_id = %post.id, author_id = %post.author_id, "Inserted post");
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::{TimeZone, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_post(id: &str, author_id: &str, content: &str, secs: i64) -> post::Model {
        post::Model {
            id: id.to_string(),
            author_id: author_id.to_string(),
            content: content.to_string(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let post = create_test_post("post1", "user1", "👍", 10);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post.clone()]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.find_by_id("post1").await.unwrap();

        assert_eq!(result, Some(post));
    }

    #[tokio::test]
    async fn test_get_by_id_not_found_returns_error() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.get_by_id("nonexistent").await;

        match result {
            Err(AppError::PostNotFound(id)) => assert_eq!(id, "nonexistent"),
            _ => panic!("Expected PostNotFound error"),
        }
    }

    #[tokio::test]
    async fn test_find_many_by_author_builds_filtered_query() {
        let post1 = create_test_post("post2", "user1", "🎉", 20);
        let post2 = create_test_post("post1", "user1", "👍", 10);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[post1, post2]])
                .into_connection(),
        );

        let repo = PostRepository::new(Arc::clone(&db));
        let result = repo
            .find_many(&PostFilter::by_author("user1"), 100)
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "post2");

        drop(repo);
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        let sql = &log[0].statements()[0].sql;
        assert!(sql.contains(r#"WHERE "post"."author_id" = $1"#));
        assert!(sql.contains(r#"ORDER BY "post"."created_at" DESC, "post"."id" DESC"#));
        assert!(sql.contains("LIMIT $2"));
    }

    #[tokio::test]
    async fn test_find_many_all() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.find_many(&PostFilter::all(), 100).await.unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_create_returns_inserted_row() {
        let inserted = create_test_post("01hx0000000000000000000000", "user1", "💩💩", 30);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[inserted.clone()]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.create("user1", "💩💩").await.unwrap();

        assert_eq!(result, inserted);
    }
}

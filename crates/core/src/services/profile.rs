//! Profile service.

use crate::services::identity::{IdentityGateway, IdentitySummary};
use chirp_common::{AppError, AppResult};

/// Profile lookups against the identity provider.
#[derive(Clone)]
pub struct ProfileService {
    identity: IdentityGateway,
}

impl ProfileService {
    /// Create a new profile service.
    #[must_use]
    pub fn new(identity: IdentityGateway) -> Self {
        Self { identity }
    }

    /// Get a user's public summary by username. A leading `@` is ignored.
    pub async fn get_user_by_username(&self, username: &str) -> AppResult<IdentitySummary> {
        let username = username.strip_prefix('@').unwrap_or(username);
        if username.is_empty() {
            return Err(AppError::BadRequest("Username is required".to_string()));
        }

        self.identity
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::services::identity::mocks::FakeIdentityProvider;
    use std::sync::Arc;

    fn create_service() -> ProfileService {
        ProfileService::new(Arc::new(
            FakeIdentityProvider::new().with_user("A1", Some("alice")),
        ))
    }

    #[tokio::test]
    async fn test_get_user_by_username() {
        let service = create_service();

        let user = service.get_user_by_username("alice").await.unwrap();
        assert_eq!(user.id, "A1");

        let user = service.get_user_by_username("@alice").await.unwrap();
        assert_eq!(user.id, "A1");
    }

    #[tokio::test]
    async fn test_get_user_by_username_not_found() {
        let service = create_service();

        match service.get_user_by_username("mallory").await {
            Err(AppError::UserNotFound(name)) => assert_eq!(name, "mallory"),
            other => panic!("Expected UserNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_user_by_username_empty() {
        let service = create_service();

        let result = service.get_user_by_username("@").await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}

//! Identity gateway.
//!
//! Author identities are owned by an external identity provider. The core only
//! ever reads public-safe summaries through [`IdentityProvider`], fresh for
//! every request batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chirp_common::{AppError, AppResult, config::IdentityConfig};
use serde::{Deserialize, Serialize};
use url::Url;

/// Public-safe identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    pub id: String,
    pub username: Option<String>,
    pub profile_picture: String,
}

/// Read-only access to the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve summaries for a set of user IDs in one call.
    ///
    /// Unknown IDs are omitted from the result rather than reported as errors.
    async fn get_summaries(&self, ids: &[String]) -> AppResult<Vec<IdentitySummary>>;

    /// Look up a single user by exact username.
    async fn find_by_username(&self, username: &str) -> AppResult<Option<IdentitySummary>>;
}

/// Largest `limit` the provider accepts on one user listing.
const MAX_USERS_PER_REQUEST: usize = 500;

/// Shared identity provider handle.
pub type IdentityGateway = Arc<dyn IdentityProvider>;

/// User record as returned by the provider's backend API.
#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    username: Option<String>,
    #[serde(default)]
    image_url: String,
}

impl From<ProviderUser> for IdentitySummary {
    fn from(user: ProviderUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            profile_picture: user.image_url,
        }
    }
}

/// Identity provider backed by a Clerk-compatible backend REST API.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
    users_url: Url,
    secret_key: String,
}

impl HttpIdentityProvider {
    /// Create a new provider client.
    pub fn new(config: &IdentityConfig) -> AppResult<Self> {
        let users_url = users_endpoint(&config.api_url)?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("chirp/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build identity client: {e}")))?;

        Ok(Self {
            http_client,
            users_url,
            secret_key: config.secret_key.clone(),
        })
    }

    async fn list_users(&self, query: &[(&str, &str)]) -> AppResult<Vec<ProviderUser>> {
        let response = self
            .http_client
            .get(self.users_url.clone())
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Identity request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Identity API error: {status} - {body}"
            )));
        }

        response
            .json::<Vec<ProviderUser>>()
            .await
            .map_err(|e| AppError::ExternalService(format!("Invalid identity response: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn get_summaries(&self, ids: &[String]) -> AppResult<Vec<IdentitySummary>> {
        let mut summaries = Vec::with_capacity(ids.len());

        // The provider caps `limit` per page, so large batches are split
        for chunk in ids.chunks(MAX_USERS_PER_REQUEST) {
            let limit = chunk.len().to_string();
            let query = user_id_query(chunk, &limit);
            let users = self.list_users(&query).await?;
            summaries.extend(users.into_iter().map(IdentitySummary::from));
        }

        tracing::debug!(
            requested = ids.len(),
            resolved = summaries.len(),
            "Fetched identity summaries"
        );
        Ok(summaries)
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<IdentitySummary>> {
        let users = self.list_users(&[("username", username)]).await?;

        // Matching rules (case folding included) belong to the provider
        Ok(users.into_iter().next().map(Into::into))
    }
}

/// Resolve `{api_url}/v1/users`.
fn users_endpoint(api_url: &str) -> AppResult<Url> {
    let mut base = Url::parse(api_url)
        .map_err(|e| AppError::Config(format!("Invalid identity api_url {api_url}: {e}")))?;
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join("v1/users")
        .map_err(|e| AppError::Config(format!("Invalid identity api_url {api_url}: {e}")))
}

/// Query pairs for one batch lookup: `user_id` repeated per ID plus a limit
/// large enough to return every match in a single page.
fn user_id_query<'a>(ids: &'a [String], limit: &'a str) -> Vec<(&'static str, &'a str)> {
    ids.iter()
        .map(|id| ("user_id", id.as_str()))
        .chain(std::iter::once(("limit", limit)))
        .collect()
}

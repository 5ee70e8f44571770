//! # GitHub
//!
//! Latest public repositories for a profile's GitHub username. The response
//! array is passed through as GitHub sent it.
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::{config::Config, error::AppError};

#[async_trait]
pub trait RepoLookup: Send + Sync {
    /// Fails with `ExternalNotFound` on any non-200 answer.
    async fn repos(&self, username: &str) -> Result<Value, AppError>;
}

pub struct GithubRepos {
    client: Client,
    api_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl GithubRepos {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
            client_id: config.github_client_id.clone(),
            client_secret: config.github_secret.clone(),
        }
    }
}

/// GitHub logins are alphanumerics and single hyphens.
fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= 39
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[async_trait]
impl RepoLookup for GithubRepos {
    async fn repos(&self, username: &str) -> Result<Value, AppError> {
        if !valid_username(username) {
            return Err(AppError::ExternalNotFound);
        }

        let mut request = self
            .client
            .get(format!("{}/users/{username}/repos", self.api_url))
            .query(&[("per_page", "5"), ("sort", "created:asc")])
            .header(USER_AGENT, "connector");

        if let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) {
            request = request.query(&[("client_id", id), ("client_secret", secret)]);
        }

        let response = request.send().await?;

        if response.status() != StatusCode::OK {
            debug!("GitHub answered {} for {username}", response.status());
            return Err(AppError::ExternalNotFound);
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_username() {
        assert!(valid_username("octocat"));
        assert!(valid_username("rust-lang"));
        assert!(!valid_username(""));
        assert!(!valid_username("../orgs"));
        assert!(!valid_username("a b"));
        assert!(!valid_username(&"a".repeat(40)));
    }
}

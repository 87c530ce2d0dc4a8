//! Registry HTTP API client.

use crate::config::AdminConfig;
use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Media type the registry uses to compute manifest content digests.
pub const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Header carrying the canonical manifest digest.
pub const CONTENT_DIGEST_HEADER: &str = "Docker-Content-Digest";

/// A content-addressed blob referenced by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub digest: String,
    pub size: u64,
}

/// The subset of the registry API needed to inspect and prune repositories.
///
/// Every call is a single request; nothing is retried or cached.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn list_repositories(&self) -> Result<Vec<String>>;
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>>;
    /// `reference` may be a tag or a digest.
    async fn manifest_layers(&self, repository: &str, reference: &str) -> Result<Vec<Layer>>;
    async fn content_digest(&self, repository: &str, tag: &str) -> Result<String>;
    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<()>;
}

/// [`RegistryApi`] over HTTP.
pub struct HttpRegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRegistryClient {
    pub fn new(config: &AdminConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Uses a preconfigured HTTP client, e.g. one carrying credentials.
    pub fn with_client(config: &AdminConfig, http: reqwest::Client) -> Self {
        Self {
            base_url: config.registry_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn manifest_url(&self, repository: &str, reference: &str) -> String {
        format!("{}/v2/{}/manifests/{}", self.base_url, repository, reference)
    }

    async fn get_json(&self, url: &str, accept: Option<&str>) -> Result<Value> {
        debug!("GET {}", url);
        let mut request = self.http.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let body = request.send().await?.text().await?;
        serde_json::from_str(&body).map_err(|_| RegistryError::Protocol(body))
    }
}

/// Pulls `field` out of a JSON response, failing if it is absent.
fn required_field<T: DeserializeOwned>(body: &Value, field: &str) -> Result<T> {
    let value = body
        .get(field)
        .ok_or_else(|| RegistryError::Protocol(body.to_string()))?;
    serde_json::from_value(value.clone()).map_err(|_| RegistryError::Protocol(body.to_string()))
}

#[async_trait]
impl RegistryApi for HttpRegistryClient {
    async fn list_repositories(&self) -> Result<Vec<String>> {
        let body = self
            .get_json(&format!("{}/v2/_catalog", self.base_url), None)
            .await?;
        let repositories: Option<Vec<String>> = required_field(&body, "repositories")?;
        Ok(repositories.unwrap_or_default())
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let body = self
            .get_json(
                &format!("{}/v2/{}/tags/list", self.base_url, repository),
                None,
            )
            .await?;
        let tags: Option<Vec<String>> = required_field(&body, "tags")?;
        Ok(tags.unwrap_or_default())
    }

    async fn manifest_layers(&self, repository: &str, reference: &str) -> Result<Vec<Layer>> {
        let body = self
            .get_json(&self.manifest_url(repository, reference), Some(MANIFEST_V2))
            .await?;
        required_field(&body, "layers")
    }

    async fn content_digest(&self, repository: &str, tag: &str) -> Result<String> {
        let url = self.manifest_url(repository, tag);
        debug!("HEAD {}", url);

        let response = self.http.head(&url).header(ACCEPT, MANIFEST_V2).send().await?;

        response
            .headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .ok_or_else(|| {
                RegistryError::Protocol(format!(
                    "no {} header for {}:{} (status {})",
                    CONTENT_DIGEST_HEADER,
                    repository,
                    tag,
                    response.status()
                ))
            })
    }

    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<()> {
        let url = self.manifest_url(repository, digest);
        debug!("DELETE {}", url);

        let response = self
            .http
            .delete(&url)
            .header(ACCEPT, MANIFEST_V2)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Protocol(format!(
                "deleting {}@{} returned {}: {}",
                repository, digest, status, body
            )));
        }

        info!("Deleted manifest {}@{}", repository, digest);
        Ok(())
    }
}

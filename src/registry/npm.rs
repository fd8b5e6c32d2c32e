//! npm registry API implementation

use std::path::Path;
use std::time::Duration;

use reqwest::{Response, StatusCode, header};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::config::{FETCH_TIMEOUT_MS, USER_AGENT};
use crate::error::RegistryError;
use crate::registry::Registry;

/// Registry implementation for the npm registry API
pub struct NpmRegistry {
    client: reqwest::Client,
    base_url: Url,
}

impl NpmRegistry {
    /// Creates a new NpmRegistry with a custom base URL
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                RegistryError::InvalidResponse(format!("Invalid registry URL: {}", base_url))
            })?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Builds `<base>/<segment>/...`, percent-encoding each segment.
    /// Scoped packages become a single segment: `@scope/name` -> `@scope%2Fname`.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    async fn get(&self, url: &str, what: &str) -> Result<Response, RegistryError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(what.to_string()));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            warn!("Upstream rate limited request to {}", url);
            return Err(RegistryError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            warn!("npm registry returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        Ok(response)
    }

    async fn get_json(&self, url: Url, what: &str) -> Result<Value, RegistryError> {
        let response = self.get(url.as_str(), what).await?;

        response.json().await.map_err(|e| {
            warn!("Failed to parse npm registry response: {}", e);
            RegistryError::InvalidResponse(e.to_string())
        })
    }
}

#[async_trait::async_trait]
impl Registry for NpmRegistry {
    async fn fetch_package(&self, package_name: &str) -> Result<Value, RegistryError> {
        let url = self.endpoint(&[package_name]);
        self.get_json(url, package_name).await
    }

    async fn fetch_version(&self, package_name: &str, spec: &str) -> Result<Value, RegistryError> {
        let url = self.endpoint(&[package_name, spec]);
        self.get_json(url, &format!("{}@{}", package_name, spec))
            .await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, RegistryError> {
        let mut response = self.get(url, url).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded_bytes += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        debug!("Downloaded {} bytes from {}", downloaded_bytes, url);
        Ok(downloaded_bytes)
    }
}

//! Upstream registry access

use std::path::Path;

#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use crate::error::RegistryError;

pub mod npm;

pub use npm::NpmRegistry;

/// Trait for reading package metadata and artifacts from an upstream registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Fetches the package document (`GET <registry>/<package>`)
    async fn fetch_package(&self, package_name: &str) -> Result<Value, RegistryError>;

    /// Fetches one version document (`GET <registry>/<package>/<version-or-tag>`)
    async fn fetch_version(&self, package_name: &str, spec: &str) -> Result<Value, RegistryError>;

    /// Streams the artifact at `url` into the file at `dest`, creating or
    /// truncating it.
    ///
    /// # Returns
    /// * `Ok(u64)` - Number of bytes written
    /// * `Err(RegistryError)` - If the request or the write fails
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, RegistryError>;
}

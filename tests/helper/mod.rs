//! Upstream registry fixtures served by mockito

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{Value, json};
use sha1::{Digest, Sha1};
use tempfile::TempDir;

use npm_mirror::artifact::ArtifactStore;
use npm_mirror::importer::{ImportOptions, Importer};
use npm_mirror::registry::NpmRegistry;
use npm_mirror::store::Store;

pub const LOCAL_REGISTRY: &str = "http://mirror.test";

/// A mockito server standing in for the upstream npm registry
pub struct Upstream {
    pub server: ServerGuard,
}

impl Upstream {
    pub async fn start() -> Self {
        Self {
            server: Server::new_async().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.url()
    }

    pub fn tarball_url(&self, name: &str, version: &str) -> String {
        format!("{}/{}/-/{}-{}.tgz", self.url(), name, name, version)
    }

    /// `GET /<name>` returning a package document
    pub async fn package(&mut self, name: &str, versions: &[&str]) -> Mock {
        let versions: serde_json::Map<String, Value> = versions
            .iter()
            .map(|v| (v.to_string(), json!({ "version": v })))
            .collect();
        let latest = versions.keys().last().cloned();
        let body = json!({
            "name": name,
            "description": format!("The {} package", name),
            "dist-tags": { "latest": latest },
            "versions": versions,
        });

        self.server
            .mock("GET", format!("/{}", name).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    /// `GET /<name>/<any spec>` resolving to `version`, plus the tarball route.
    /// Returns (version mock, tarball mock).
    pub async fn version(
        &mut self,
        name: &str,
        version: &str,
        dependencies: Value,
        body: &[u8],
    ) -> (Mock, Mock) {
        self.version_with_shasum(name, version, dependencies, body, &sha1_hex(body))
            .await
    }

    pub async fn version_with_shasum(
        &mut self,
        name: &str,
        version: &str,
        dependencies: Value,
        body: &[u8],
        shasum: &str,
    ) -> (Mock, Mock) {
        let document = json!({
            "name": name,
            "version": version,
            "dependencies": dependencies,
            "devDependencies": {},
            "dist": {
                "tarball": self.tarball_url(name, version),
                "shasum": shasum,
            },
        });

        let version_mock = self
            .server
            .mock("GET", Matcher::Regex(format!("^/{}/[^/-][^/]*$", name)))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(document.to_string())
            .create_async()
            .await;

        let tarball_mock = self
            .server
            .mock(
                "GET",
                format!("/{}/-/{}-{}.tgz", name, name, version).as_str(),
            )
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        (version_mock, tarball_mock)
    }

    /// `GET /<name>` answering 404
    pub async fn missing(&mut self, name: &str) -> Mock {
        self.server
            .mock("GET", format!("/{}", name).as_str())
            .with_status(404)
            .with_body(r#"{"error":"Not found"}"#)
            .create_async()
            .await
    }
}

pub fn sha1_hex(body: &[u8]) -> String {
    hex::encode(Sha1::digest(body))
}

/// Importer against `upstream` with storage in a fresh temp dir
pub fn create_importer(upstream: &Upstream) -> (TempDir, Importer<Store>) {
    let temp_dir = TempDir::new().unwrap();
    let importer = importer_in(temp_dir.path(), upstream);
    (temp_dir, importer)
}

/// Importer against `upstream` reusing the storage under `root`
pub fn importer_in(root: &Path, upstream: &Upstream) -> Importer<Store> {
    let store = Store::new(&root.join("mirror.db")).unwrap();
    let registry = NpmRegistry::new(&upstream.url()).unwrap();
    let artifacts = ArtifactStore::new(root.join("packages"), LOCAL_REGISTRY);
    Importer::new(
        Arc::new(store),
        Arc::new(registry),
        artifacts,
        ImportOptions::default(),
    )
}

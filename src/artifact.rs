//! Artifact download, SHA-1 verification and placement
//!
//! Artifacts live at `<root>/<package>/<file>`, where `<file>` is the last
//! path segment of the upstream URL. Each download goes to a private temp
//! file in the same directory and is renamed into place only after its hash
//! matches, so a partial or corrupt file is never visible under its final name.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ImportError;
use crate::registry::Registry;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// A verified artifact in local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub file_name: String,
    pub path: PathBuf,
    pub local_url: String,
    pub size: u64,
}

pub struct ArtifactStore {
    root: PathBuf,
    local_registry: String,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, local_registry: &str) -> Self {
        Self {
            root: root.into(),
            local_registry: local_registry.trim_end_matches('/').to_string(),
        }
    }

    pub fn package_dir(&self, package_name: &str) -> PathBuf {
        self.root.join(package_name)
    }

    /// URL the local registry serves the artifact from
    pub fn local_url(&self, package_name: &str, file_name: &str) -> String {
        format!(
            "{}/{}/files/{}",
            self.local_registry, package_name, file_name
        )
    }

    /// Download `url` for `package_name` and keep it only if its SHA-1
    /// equals `expected_sha1` (hex, case-insensitive).
    pub async fn fetch_verified(
        &self,
        registry: &dyn Registry,
        package_name: &str,
        url: &str,
        expected_sha1: &str,
    ) -> Result<StoredArtifact, ImportError> {
        check_package_name(package_name)?;
        let file_name = file_name_from_url(url).ok_or_else(|| {
            ImportError::InvalidMetadata(format!("Artifact URL has no file name: {}", url))
        })?;

        let dir = self.package_dir(package_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ImportError::Artifact {
                path: dir.clone(),
                source,
            })?;

        let temp_path = dir.join(format!(
            ".{}.{}-{}.part",
            file_name,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        info!("Downloading {} for {}", url, package_name);
        let size = match registry.download(url, &temp_path).await {
            Ok(size) => size,
            Err(e) => {
                discard(&temp_path).await;
                return Err(e.into());
            }
        };

        let actual = match sha1_file(&temp_path).await {
            Ok(actual) => actual,
            Err(source) => {
                discard(&temp_path).await;
                return Err(ImportError::Artifact {
                    path: temp_path,
                    source,
                });
            }
        };

        let expected = expected_sha1.trim();
        if !actual.eq_ignore_ascii_case(expected) {
            warn!(
                "{} had an invalid sha1: expected {}, got {}",
                file_name, expected, actual
            );
            discard(&temp_path).await;
            return Err(ImportError::IntegrityMismatch {
                file: file_name,
                expected: expected.to_string(),
                actual,
            });
        }

        let path = dir.join(&file_name);
        if let Err(source) = tokio::fs::rename(&temp_path, &path).await {
            discard(&temp_path).await;
            return Err(ImportError::Artifact { path, source });
        }

        debug!("Verified {} ({} bytes, sha1 {})", file_name, size, actual);

        Ok(StoredArtifact {
            local_url: self.local_url(package_name, &file_name),
            file_name,
            path,
            size,
        })
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {:?}: {}", path, e);
    }
}

/// Only `name` and `@scope/name` map to a directory under the root
fn check_package_name(package_name: &str) -> Result<(), ImportError> {
    let plain = |segment: &str| {
        !segment.is_empty()
            && !segment.contains('\\')
            && Path::new(segment)
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
    };

    let valid = match package_name.split('/').collect::<Vec<_>>().as_slice() {
        [name] => plain(name) && !name.starts_with('@'),
        [scope, name] => scope.len() > 1 && scope.starts_with('@') && plain(scope) && plain(name),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ImportError::InvalidMetadata(format!(
            "Unsafe package name: {:?}",
            package_name
        )))
    }
}

/// Final path segment of an artifact URL
pub fn file_name_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.path_segments()?
        .next_back()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Hex-encoded SHA-1 of a file's contents
pub async fn sha1_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::registry::MockRegistry;
    use rstest::rstest;
    use tempfile::TempDir;

    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    fn serving(body: &'static [u8]) -> MockRegistry {
        let mut registry = MockRegistry::new();
        registry.expect_download().times(1).returning(move |_, dest| {
            std::fs::write(dest, body).unwrap();
            Ok(body.len() as u64)
        });
        registry
    }

    fn visible_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[rstest]
    #[case("http://registry.npmjs.org/registry/-/registry-0.2.2.tgz", Some("registry-0.2.2.tgz"))]
    #[case("https://example.com/a/b.tgz?token=1", Some("b.tgz"))]
    #[case("https://example.com/", None)]
    #[case("not a url", None)]
    fn file_name_from_url_uses_last_segment(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(file_name_from_url(url).as_deref(), expected);
    }

    #[test]
    fn local_url_points_at_files_route() {
        let store = ArtifactStore::new("/tmp/packages", "http://localhost:8080/");

        assert_eq!(
            store.local_url("registry", "registry-0.2.2.tgz"),
            "http://localhost:8080/registry/files/registry-0.2.2.tgz"
        );
    }

    #[tokio::test]
    async fn sha1_file_hashes_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello");
        std::fs::write(&path, b"hello world").unwrap();

        assert_eq!(sha1_file(&path).await.unwrap(), HELLO_SHA1);
    }

    #[tokio::test]
    async fn fetch_verified_places_matching_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path(), "http://localhost:8080");
        let registry = serving(b"hello world");

        let stored = store
            .fetch_verified(
                &registry,
                "hello",
                "http://upstream/hello/-/hello-1.0.0.tgz",
                &HELLO_SHA1.to_uppercase(),
            )
            .await
            .unwrap();

        assert_eq!(
            stored,
            StoredArtifact {
                file_name: "hello-1.0.0.tgz".to_string(),
                path: temp_dir.path().join("hello").join("hello-1.0.0.tgz"),
                local_url: "http://localhost:8080/hello/files/hello-1.0.0.tgz".to_string(),
                size: 11,
            }
        );
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"hello world");
        assert_eq!(
            visible_files(&temp_dir.path().join("hello")),
            vec!["hello-1.0.0.tgz"]
        );
    }

    #[tokio::test]
    async fn fetch_verified_discards_mismatching_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path(), "http://localhost:8080");
        let registry = serving(b"corrupted");

        let result = store
            .fetch_verified(
                &registry,
                "hello",
                "http://upstream/hello/-/hello-1.0.0.tgz",
                HELLO_SHA1,
            )
            .await;

        match result {
            Err(ImportError::IntegrityMismatch { file, expected, .. }) => {
                assert_eq!(file, "hello-1.0.0.tgz");
                assert_eq!(expected, HELLO_SHA1);
            }
            other => panic!("expected integrity mismatch, got {:?}", other),
        }
        assert!(visible_files(&temp_dir.path().join("hello")).is_empty());
    }

    #[tokio::test]
    async fn fetch_verified_cleans_up_after_failed_download() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path(), "http://localhost:8080");
        let mut registry = MockRegistry::new();
        registry.expect_download().times(1).returning(|url, dest| {
            std::fs::write(dest, b"partial").unwrap();
            Err(RegistryError::NotFound(url.to_string()))
        });

        let result = store
            .fetch_verified(&registry, "hello", "http://upstream/hello-1.0.0.tgz", HELLO_SHA1)
            .await;

        assert!(matches!(result, Err(ImportError::UpstreamNotFound(_))));
        assert!(visible_files(&temp_dir.path().join("hello")).is_empty());
    }

    #[rstest]
    #[case("../escaped")]
    #[case("/etc/escaped")]
    #[case("a/../../escaped")]
    #[case("..")]
    #[case("@scope/../escaped")]
    #[case("@/escaped")]
    #[case("")]
    #[tokio::test]
    async fn fetch_verified_rejects_names_outside_root(#[case] package_name: &str) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("packages");
        let store = ArtifactStore::new(&root, "http://localhost:8080");
        let mut registry = MockRegistry::new();
        registry.expect_download().times(0);

        let result = store
            .fetch_verified(
                &registry,
                package_name,
                "http://upstream/x/-/x-1.0.0.tgz",
                HELLO_SHA1,
            )
            .await;

        assert!(matches!(result, Err(ImportError::InvalidMetadata(_))));
        assert_eq!(visible_files(temp_dir.path()), Vec::<String>::new());
    }

    #[tokio::test]
    async fn fetch_verified_accepts_scoped_package() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path(), "http://localhost:8080");
        let registry = serving(b"hello world");

        let stored = store
            .fetch_verified(
                &registry,
                "@types/hello",
                "http://upstream/@types/hello/-/hello-1.0.0.tgz",
                HELLO_SHA1,
            )
            .await
            .unwrap();

        assert_eq!(
            stored.path,
            temp_dir.path().join("@types").join("hello").join("hello-1.0.0.tgz")
        );
    }

    #[tokio::test]
    async fn fetch_verified_rejects_url_without_file_name() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path(), "http://localhost:8080");
        let registry = MockRegistry::new();

        let result = store
            .fetch_verified(&registry, "hello", "http://upstream/", HELLO_SHA1)
            .await;

        assert!(matches!(result, Err(ImportError::InvalidMetadata(_))));
    }
}

//! Recursive dependency import
//!
//! Each node of the dependency tree is a (package, spec) pair. A node is
//! resolved against the local store first; only when no recorded version
//! satisfies the spec is the concrete version fetched from upstream, its
//! artifact downloaded and verified, and the version recorded. The node's
//! `dependencies` (and optionally `devDependencies`) are then imported the
//! same way, a bounded number of siblings at a time.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactStore;
use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_MAX_DEPTH, MirrorConfig};
use crate::error::ImportError;
use crate::registry::Registry;
use crate::store::{PackageRecord, PackageStore, VersionRecord};
use crate::version::{LATEST_TAG, RangeExpression, VersionValue, is_url};

pub mod report;

pub use report::{ImportReport, InvalidSeed, NodeFailure, SeedOutcome, SeedSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Sibling dependencies imported at the same time
    pub concurrency: usize,
    pub max_depth: usize,
    pub include_dev_dependencies: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_depth: DEFAULT_MAX_DEPTH,
            include_dev_dependencies: true,
        }
    }
}

impl From<&MirrorConfig> for ImportOptions {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            max_depth: config.max_depth,
            include_dev_dependencies: config.include_dev_dependencies,
        }
    }
}

/// Per-seed bookkeeping shared by every node of one import
#[derive(Default)]
struct ImportRun {
    visited: Mutex<HashSet<(String, String)>>,
    failures: Mutex<Vec<NodeFailure>>,
    imported: Mutex<Vec<String>>,
}

impl ImportRun {
    /// Returns false if (package, version) was already visited
    fn visit(&self, package_name: &str, version: &str) -> bool {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((package_name.to_string(), version.to_string()))
    }

    fn record_failure(&self, package: String, spec: String, error: ImportError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(NodeFailure {
                package,
                spec,
                error,
            });
    }

    fn record_import(&self, package_name: &str, version: &str) {
        self.imported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{}@{}", package_name, version));
    }

    fn finish(self) -> (Vec<NodeFailure>, Vec<String>) {
        (
            self.failures
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
            self.imported
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

/// One async lock per package name. Held from the satisfaction check
/// through recording, so two branches never import the same package at once.
#[derive(Default)]
struct PackageLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PackageLocks {
    fn get(&self, package_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(package_name.to_string())
            .or_default()
            .clone()
    }

    /// Drop the map entry once no other task holds or waits on `lock`.
    /// Must be called after the guard is released.
    fn release(&self, package_name: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(package_name);
        }
    }
}

pub struct Importer<S: PackageStore> {
    store: Arc<S>,
    registry: Arc<dyn Registry>,
    artifacts: ArtifactStore,
    options: ImportOptions,
    locks: PackageLocks,
}

impl<S: PackageStore> Importer<S> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<dyn Registry>,
        artifacts: ArtifactStore,
        options: ImportOptions,
    ) -> Self {
        Self {
            store,
            registry,
            artifacts,
            options,
            locks: PackageLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Import each seed in order. A failing seed never stops the batch.
    pub async fn import_batch(&self, seeds: &[SeedSpec]) -> Vec<ImportReport> {
        let mut reports = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let report = self.import(seed).await;
            info!("{}", report);
            reports.push(report);
        }
        reports
    }

    /// Import one seed and everything it depends on
    pub async fn import(&self, seed: &SeedSpec) -> ImportReport {
        let spec = normalize_spec(&seed.spec);
        info!("Importing {}@{}", seed.name, spec);

        if let Err(e) = validate_spec(&spec) {
            warn!("Cannot import {}: {}", seed, e);
            return ImportReport {
                seed: seed.clone(),
                outcome: SeedOutcome::NotStarted(e),
                imported: Vec::new(),
            };
        }

        let run = ImportRun::default();
        if let Err(e) = self
            .import_node(&run, seed.name.clone(), spec.clone(), 0)
            .await
        {
            warn!("Failed to import {}@{}: {}", seed.name, spec, e);
            run.record_failure(seed.name.clone(), spec, e);
        }

        let (failures, imported) = run.finish();
        let outcome = if failures.is_empty() {
            SeedOutcome::Completed
        } else {
            SeedOutcome::Partial(failures)
        };

        ImportReport {
            seed: seed.clone(),
            outcome,
            imported,
        }
    }

    /// Settle one node, then its dependencies. Dependency failures are
    /// recorded on the run; only this node's own failure is returned.
    fn import_node<'a>(
        &'a self,
        run: &'a ImportRun,
        package_name: String,
        spec: String,
        depth: usize,
    ) -> BoxFuture<'a, Result<(), ImportError>> {
        async move {
            let dependencies = self.settle(run, &package_name, &spec, depth).await?;

            if !dependencies.is_empty() {
                debug!(
                    "{}: importing {} dependencies",
                    package_name,
                    dependencies.len()
                );

                stream::iter(dependencies)
                    .map(move |(dependency, dependency_spec)| async move {
                        let dependency_spec = normalize_spec(&dependency_spec);
                        if let Err(e) = self
                            .import_node(run, dependency.clone(), dependency_spec.clone(), depth + 1)
                            .await
                        {
                            warn!("Failed to import {}@{}: {}", dependency, dependency_spec, e);
                            run.record_failure(dependency, dependency_spec, e);
                        }
                    })
                    .buffered(self.options.concurrency.max(1))
                    .collect::<Vec<()>>()
                    .await;
            }

            Ok(())
        }
        .boxed()
    }

    /// Resolve, fetch, verify and record a single node under its package
    /// lock. Returns the dependencies still to import, in document order;
    /// empty when nothing new was recorded.
    async fn settle(
        &self,
        run: &ImportRun,
        package_name: &str,
        spec: &str,
        depth: usize,
    ) -> Result<Vec<(String, String)>, ImportError> {
        if is_url(spec) {
            debug!("{}@{} is pinned to a URL", package_name, spec);
            return Ok(Vec::new());
        }
        validate_spec(spec)?;

        let lock = self.locks.get(package_name);
        let result = {
            let _guard = lock.lock().await;
            self.settle_locked(run, package_name, spec, depth).await
        };
        self.locks.release(package_name, lock);
        result
    }

    async fn settle_locked(
        &self,
        run: &ImportRun,
        package_name: &str,
        spec: &str,
        depth: usize,
    ) -> Result<Vec<(String, String)>, ImportError> {
        let package = self.load_or_fetch_package(package_name).await?;
        if package.is_local(spec)? {
            debug!("{}@{} is satisfied locally", package_name, spec);
            return Ok(Vec::new());
        }

        if depth > self.options.max_depth {
            return Err(ImportError::DepthExceeded(self.options.max_depth));
        }

        let mut document = self.registry.fetch_version(package_name, spec).await?;
        let version = document
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ImportError::InvalidMetadata(format!(
                    "{}@{} has no version field",
                    package_name, spec
                ))
            })?
            .to_string();
        let value = VersionValue::parse_concrete(&version).map_err(|e| {
            ImportError::InvalidMetadata(format!("{}@{}: {}", package_name, version, e))
        })?;

        if package.has_version(&value) {
            debug!("{}@{} is already recorded", package_name, version);
            return Ok(Vec::new());
        }

        if !run.visit(package_name, &version) {
            debug!("{}@{} was already visited", package_name, version);
            return Ok(Vec::new());
        }

        let (tarball, shasum) = dist_fields(&document).ok_or_else(|| {
            ImportError::InvalidMetadata(format!(
                "{}@{} has no dist.tarball or dist.shasum",
                package_name, version
            ))
        })?;

        let artifact = self
            .artifacts
            .fetch_verified(self.registry.as_ref(), package_name, &tarball, &shasum)
            .await?;

        if let Some(dist) = document.get_mut("dist").and_then(Value::as_object_mut) {
            dist.insert("tarball".to_string(), Value::String(artifact.local_url));
        }

        let dependencies = self.dependencies_of(package_name, &document);
        let record = VersionRecord::new(version.clone(), document);
        if !self
            .store
            .save_version(package_name, package.metadata(), &record)?
        {
            debug!("{}@{} was recorded concurrently", package_name, version);
            return Ok(Vec::new());
        }

        run.record_import(package_name, &version);
        info!("Imported {}@{}", package_name, version);

        Ok(dependencies)
    }

    async fn load_or_fetch_package(&self, package_name: &str) -> Result<PackageRecord, ImportError> {
        if let Some(package) = self.store.load_package(package_name)? {
            return Ok(package);
        }

        debug!("{} is not stored locally, fetching package document", package_name);
        let document = self.registry.fetch_package(package_name).await?;
        PackageRecord::from_upstream(package_name, document).ok_or_else(|| {
            ImportError::InvalidMetadata(format!(
                "package document for {} is not an object",
                package_name
            ))
        })
    }

    fn dependencies_of(&self, package_name: &str, document: &Value) -> Vec<(String, String)> {
        let mut fields = vec!["dependencies"];
        if self.options.include_dev_dependencies {
            fields.push("devDependencies");
        }

        let mut dependencies = Vec::new();
        for field in fields {
            let Some(map) = document.get(field).and_then(Value::as_object) else {
                continue;
            };
            for (name, spec) in map {
                match spec.as_str() {
                    Some(spec) => dependencies.push((name.clone(), spec.to_string())),
                    None => warn!(
                        "{}: ignoring {} entry {} with non-string spec {}",
                        package_name, field, name, spec
                    ),
                }
            }
        }
        dependencies
    }
}

/// An empty spec means any version
fn normalize_spec(spec: &str) -> String {
    let spec = spec.trim();
    if spec.is_empty() {
        "*".to_string()
    } else {
        spec.to_string()
    }
}

/// URLs and the `latest` tag are accepted as-is; anything else must parse
fn validate_spec(spec: &str) -> Result<(), ImportError> {
    if spec == LATEST_TAG || is_url(spec) {
        return Ok(());
    }
    RangeExpression::parse(spec)?;
    Ok(())
}

fn dist_fields(document: &Value) -> Option<(String, String)> {
    let dist = document.get("dist")?;
    let tarball = dist.get("tarball")?.as_str()?;
    let shasum = dist.get("shasum")?.as_str()?;
    Some((tarball.to_string(), shasum.to_string()))
}

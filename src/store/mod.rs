//! Persistent storage of mirrored packages and versions
//!
//! - [`record`]: `PackageRecord` / `VersionRecord` and the local document shape
//! - [`sqlite`]: SQLite-backed [`PackageStore`]

use serde_json::Value;

use crate::error::StoreError;

pub mod record;
pub mod sqlite;

pub use record::{PackageRecord, VersionRecord};
pub use sqlite::Store;

/// Storage of package records and their versions
pub trait PackageStore: Send + Sync + 'static {
    /// Load a package with all of its versions, or None if never imported
    fn load_package(&self, package_name: &str) -> Result<Option<PackageRecord>, StoreError>;

    /// Version strings cached for a package, in import order
    fn cached_versions(&self, package_name: &str) -> Result<Vec<String>, StoreError>;

    /// Persist package metadata and append one version.
    ///
    /// Returns false, without modifying anything, when the version was
    /// already recorded.
    fn save_version(
        &self,
        package_name: &str,
        package_metadata: &Value,
        version: &VersionRecord,
    ) -> Result<bool, StoreError>;

    /// Stored document for one version
    fn get_version(&self, package_name: &str, version: &str) -> Result<Option<Value>, StoreError>;

    /// Names of all stored packages, sorted
    fn list_packages(&self) -> Result<Vec<String>, StoreError>;
}

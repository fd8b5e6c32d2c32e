//! In-memory package and version records

use serde_json::{Map, Value};

use crate::version::{LATEST_TAG, RangeError, RangeExpression, VersionValue, is_locally_satisfied};

/// One imported version: its version string and full upstream document
/// (with `dist.tarball` already rewritten to the local-serving URL).
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    version: String,
    metadata: Value,
}

impl VersionRecord {
    pub fn new(version: impl Into<String>, metadata: Value) -> Self {
        Self {
            version: version.into(),
            metadata,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Parsed version, or None for strings outside the version grammar
    pub fn value(&self) -> Option<VersionValue> {
        VersionValue::parse_concrete(&self.version).ok()
    }
}

/// A mirrored package: package-level metadata plus the versions held locally.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRecord {
    name: String,
    metadata: Value,
    versions: Vec<VersionRecord>,
}

impl PackageRecord {
    pub fn new(name: impl Into<String>, metadata: Value, versions: Vec<VersionRecord>) -> Self {
        Self {
            name: name.into(),
            metadata,
            versions,
        }
    }

    /// Build an unpersisted record from an upstream package document.
    ///
    /// `versions` and `dist-tags.latest` are dropped; both are recomputed from
    /// the versions held locally. Returns None if the document is not an object.
    pub fn from_upstream(name: impl Into<String>, document: Value) -> Option<Self> {
        let Value::Object(mut metadata) = document else {
            return None;
        };

        metadata.remove("versions");
        if let Some(Value::Object(dist_tags)) = metadata.get_mut("dist-tags") {
            dist_tags.remove(LATEST_TAG);
        }

        Some(Self::new(name, Value::Object(metadata), Vec::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    pub fn versions(&self) -> &[VersionRecord] {
        &self.versions
    }

    pub fn version_strings(&self) -> Vec<String> {
        self.versions.iter().map(|v| v.version.clone()).collect()
    }

    /// Local satisfaction check against this package's cached versions
    pub fn is_local(&self, spec: &str) -> Result<bool, RangeError> {
        is_locally_satisfied(spec, &self.version_strings())
    }

    /// Whether `version` is already recorded (same release, any spelling).
    pub fn has_version(&self, version: &VersionValue) -> bool {
        self.versions
            .iter()
            .filter_map(VersionRecord::value)
            .any(|recorded| recorded.same_version(version))
    }

    /// Highest cached version satisfying `spec`
    pub fn get_version(&self, spec: &str) -> Result<Option<&VersionRecord>, RangeError> {
        let range = RangeExpression::parse(spec)?;
        Ok(self
            .parsed_versions()
            .filter(|(_, value)| range.matches(value))
            .max_by(|(_, a), (_, b)| a.cmp_precedence(b))
            .map(|(record, _)| record))
    }

    /// Highest cached version by version precedence
    pub fn latest(&self) -> Option<&VersionRecord> {
        self.parsed_versions()
            .max_by(|(_, a), (_, b)| a.cmp_precedence(b))
            .map(|(record, _)| record)
    }

    fn parsed_versions(&self) -> impl Iterator<Item = (&VersionRecord, VersionValue)> {
        self.versions
            .iter()
            .filter_map(|record| record.value().map(|value| (record, value)))
    }

    /// Package document as served by the local registry: stored metadata,
    /// a computed `latest` (also mirrored into `dist-tags`) and a `versions`
    /// map keyed by version string.
    pub fn to_document(&self) -> Value {
        let mut document = match &self.metadata {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        let latest = self
            .latest()
            .map(|record| Value::String(record.version.clone()))
            .unwrap_or(Value::Null);

        if !latest.is_null() {
            let dist_tags = document
                .entry("dist-tags")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(tags) = dist_tags {
                tags.insert(LATEST_TAG.to_string(), latest.clone());
            }
        }
        document.insert(LATEST_TAG.to_string(), latest);

        let versions = self
            .versions
            .iter()
            .map(|record| (record.version.clone(), record.metadata.clone()))
            .collect::<Map<_, _>>();
        document.insert("versions".to_string(), Value::Object(versions));

        Value::Object(document)
    }
}

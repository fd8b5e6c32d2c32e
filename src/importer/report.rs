//! Seed specifiers and per-seed import reports

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::error::ImportError;
use crate::version::LATEST_TAG;

/// A top-level package to import: `name`, `name@spec` or `@scope/name@spec`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSpec {
    pub name: String,
    pub spec: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid package specifier: {0:?}")]
pub struct InvalidSeed(pub String);

impl SeedSpec {
    pub fn new(name: impl Into<String>, spec: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: spec.into(),
        }
    }
}

impl FromStr for SeedSpec {
    type Err = InvalidSeed;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // The leading '@' of a scoped name is not a separator; later ones
        // may belong to the spec (`git+ssh://git@host/...`)
        let (name, spec) = match s.get(1..).and_then(|rest| rest.find('@')) {
            Some(at) => (&s[..at + 1], &s[at + 2..]),
            None => (s, LATEST_TAG),
        };

        if name.is_empty() || name == "@" || spec.is_empty() {
            return Err(InvalidSeed(s.to_string()));
        }
        Ok(Self::new(name, spec))
    }
}

impl fmt::Display for SeedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.spec)
    }
}

/// A node of the dependency tree that was not imported
#[derive(Debug)]
pub struct NodeFailure {
    pub package: String,
    pub spec: String,
    pub error: ImportError,
}

#[derive(Debug)]
pub enum SeedOutcome {
    /// Every node was imported or already satisfied
    Completed,
    /// Some nodes failed; the rest of the tree was still imported
    Partial(Vec<NodeFailure>),
    /// The seed's own spec could not be parsed
    NotStarted(ImportError),
}

#[derive(Debug)]
pub struct ImportReport {
    pub seed: SeedSpec,
    pub outcome: SeedOutcome,
    /// `name@version` of every version recorded during this seed's run
    pub imported: Vec<String>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, SeedOutcome::Completed)
    }

    pub fn failures(&self) -> &[NodeFailure] {
        match &self.outcome {
            SeedOutcome::Partial(failures) => failures,
            _ => &[],
        }
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            SeedOutcome::Completed => write!(
                f,
                "{}: completed ({} imported)",
                self.seed,
                self.imported.len()
            ),
            SeedOutcome::Partial(failures) => {
                write!(
                    f,
                    "{}: partial ({} imported, {} failed)",
                    self.seed,
                    self.imported.len(),
                    failures.len()
                )?;
                for failure in failures {
                    write!(
                        f,
                        "\n  {}@{}: {}",
                        failure.package, failure.spec, failure.error
                    )?;
                }
                Ok(())
            }
            SeedOutcome::NotStarted(error) => write!(f, "{}: not started: {}", self.seed, error),
        }
    }
}

//! Single version tokens and their ordering
//!
//! A token is an optional operator, one to three dot-separated components and
//! an optional pre-release tag:
//! - `1.2.3`, `1.2`, `1` - exact (missing components are zero)
//! - `1.x`, `1.2.*` - positional wildcard
//! - `*`, `x` - any version
//! - `~1.2.3`, `^1.2.3` - approximate and compatible ranges
//! - `<1.2.3`, `<=1.2.3`, `>1.2.3`, `>=1.2.3` - comparisons
//! - `1.2.3-alpha2`, `1.2.3-beta`, `1.2.3-rc1`, `1.2.3+build7` - pre-release tags

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::version::error::RangeError;

/// Version token pattern, anchored at the current scan position.
/// Whitespace is tolerated between an operator and its version (`>= 1.2`).
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<op>~|\^|<=|<|>=|>)?\s*(?P<c0>\d+|[xX*])(?:\.(?P<c1>\d+|[xX*]))?(?:\.(?P<c2>\d+|[xX*]))?(?:-(?P<pre>alpha|beta|rc)(?P<pnum>\d*)|\+build(?P<bnum>\d+))?",
    )
    .expect("version token pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    None,
    Tilde,
    Caret,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::None => "",
            Operator::Tilde => "~",
            Operator::Caret => "^",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "" => Some(Operator::None),
            "~" => Some(Operator::Tilde),
            "^" => Some(Operator::Caret),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            _ => None,
        }
    }
}

/// One dot-separated position of a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Number(u64),
    /// `x`, `X` or `*`
    Wildcard,
}

impl Component {
    fn parse(text: &str, token: &str) -> Result<Self, RangeError> {
        match text {
            "x" | "X" | "*" => Ok(Component::Wildcard),
            digits => digits
                .parse::<u64>()
                .map(Component::Number)
                .map_err(|_| RangeError::ComponentOverflow(token.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrereleaseKind {
    Alpha,
    Beta,
    Rc,
    Build,
}

impl PrereleaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrereleaseKind::Alpha => "alpha",
            PrereleaseKind::Beta => "beta",
            PrereleaseKind::Rc => "rc",
            PrereleaseKind::Build => "build",
        }
    }
}

/// Rank of a pre-release kind. A plain release ranks above every tag.
fn meta_rank(kind: Option<PrereleaseKind>) -> u8 {
    match kind {
        Some(PrereleaseKind::Alpha) => 0,
        Some(PrereleaseKind::Beta) => 1,
        Some(PrereleaseKind::Rc) => 2,
        Some(PrereleaseKind::Build) => 3,
        None => 4,
    }
}

/// A parsed version token. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionValue {
    operator: Operator,
    components: Vec<Component>,
    prerelease_kind: Option<PrereleaseKind>,
    prerelease_number: u64,
}

impl VersionValue {
    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn prerelease_kind(&self) -> Option<PrereleaseKind> {
        self.prerelease_kind
    }

    pub fn prerelease_number(&self) -> u64 {
        self.prerelease_number
    }

    /// Parse a concrete version such as a cached or upstream `version` field.
    ///
    /// Concrete versions carry no operator and no wildcard component.
    pub fn parse_concrete(input: &str) -> Result<Self, RangeError> {
        let value: VersionValue = input.parse()?;
        let numeric = value
            .components
            .iter()
            .all(|c| matches!(c, Component::Number(_)));
        if value.operator != Operator::None || !numeric {
            return Err(RangeError::NotConcrete(input.to_string()));
        }
        Ok(value)
    }

    /// Scan one token starting at byte offset `start` of `input`.
    ///
    /// Returns the value and the offset just past it.
    pub(crate) fn scan(input: &str, start: usize) -> Result<(Self, usize), RangeError> {
        let rest = &input[start..];
        let Some(caps) = TOKEN_RE.captures(rest) else {
            let found = rest.chars().next().unwrap_or(' ');
            return Err(RangeError::UnexpectedChar {
                input: input.to_string(),
                position: start,
                found,
            });
        };

        let end = start + caps.get(0).map_or(0, |m| m.end());
        let token = &input[start..end];

        // A fourth component is never silently dropped
        let tail = &input[end..];
        if let Some(after_dot) = tail.strip_prefix('.')
            && after_dot
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit() || matches!(c, 'x' | 'X' | '*'))
        {
            return Err(RangeError::TooManyComponents(
                input[start..].split_whitespace().next().unwrap_or(token).to_string(),
            ));
        }

        let operator = caps
            .name("op")
            .and_then(|m| Operator::from_token(m.as_str()))
            .unwrap_or(Operator::None);

        let components = ["c0", "c1", "c2"]
            .iter()
            .filter_map(|name| caps.name(name))
            .map(|m| Component::parse(m.as_str(), token))
            .collect::<Result<Vec<_>, _>>()?;

        let (prerelease_kind, number) = match (caps.name("pre"), caps.name("bnum")) {
            (Some(pre), _) => {
                let kind = match pre.as_str() {
                    "alpha" => PrereleaseKind::Alpha,
                    "beta" => PrereleaseKind::Beta,
                    _ => PrereleaseKind::Rc,
                };
                (Some(kind), caps.name("pnum").map_or("", |m| m.as_str()))
            }
            (None, Some(build)) => (Some(PrereleaseKind::Build), build.as_str()),
            (None, None) => (None, ""),
        };

        let prerelease_number = if number.is_empty() {
            0
        } else {
            number
                .parse::<u64>()
                .map_err(|_| RangeError::ComponentOverflow(token.to_string()))?
        };

        Ok((
            Self {
                operator,
                components,
                prerelease_kind,
                prerelease_number,
            },
            end,
        ))
    }

    /// Same value with the operator replaced; used to desugar dashed ranges.
    pub(crate) fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    /// Leading numeric components, stopping at the first wildcard.
    fn significant(&self) -> Vec<u64> {
        self.components
            .iter()
            .map_while(|c| match c {
                Component::Number(n) => Some(*n),
                Component::Wildcard => None,
            })
            .collect()
    }

    fn padded(&self) -> [u64; 3] {
        pad(&self.significant())
    }

    fn has_wildcard(&self) -> bool {
        self.components.contains(&Component::Wildcard)
    }

    /// Compare pre-release tags.
    ///
    /// Two `build` tags are always equal. Tags of the same kind order by
    /// number; different kinds order alpha < beta < rc < build < release.
    pub fn compare_meta(&self, other: &Self) -> Ordering {
        match (self.prerelease_kind, other.prerelease_kind) {
            (Some(PrereleaseKind::Build), Some(PrereleaseKind::Build)) => Ordering::Equal,
            (a, b) if a == b => self.prerelease_number.cmp(&other.prerelease_number),
            (a, b) => meta_rank(a).cmp(&meta_rank(b)),
        }
    }

    /// Total precedence: padded components first, then pre-release tags.
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        self.padded()
            .cmp(&other.padded())
            .then_with(|| self.compare_meta(other))
    }

    /// Whether two concrete versions denote the same release.
    ///
    /// Unlike [`cmp_precedence`](Self::cmp_precedence) this tells build
    /// numbers apart, so `1.0.0+build1` and `1.0.0+build2` are distinct.
    pub fn same_version(&self, other: &Self) -> bool {
        self.padded() == other.padded()
            && self.prerelease_kind == other.prerelease_kind
            && self.prerelease_number == other.prerelease_number
    }

    /// Whether the concrete `candidate` satisfies this token.
    pub fn satisfied_by(&self, candidate: &VersionValue) -> bool {
        match self.operator {
            Operator::None => self.matches_exact(candidate),
            Operator::Lt => candidate.cmp_precedence(self) == Ordering::Less,
            Operator::Lte => candidate.cmp_precedence(self) != Ordering::Greater,
            Operator::Gt => candidate.cmp_precedence(self) == Ordering::Greater,
            Operator::Gte => candidate.cmp_precedence(self) != Ordering::Less,
            Operator::Tilde => self.matches_tilde(candidate),
            Operator::Caret => self.matches_caret(candidate),
        }
    }

    fn matches_exact(&self, candidate: &VersionValue) -> bool {
        if self.components.first() == Some(&Component::Wildcard) {
            return true;
        }
        if self.compare_meta(candidate) != Ordering::Equal {
            return false;
        }
        if !self.has_wildcard() {
            return self.padded() == candidate.padded();
        }

        let actual = candidate.padded();
        self.components
            .iter()
            .zip(actual)
            .all(|(expected, actual)| match expected {
                Component::Number(n) => *n == actual,
                Component::Wildcard => true,
            })
    }

    /// `~1.2.3` := `>=1.2.3 <1.3.0`, `~1` := `>=1.0.0 <2.0.0`
    fn matches_tilde(&self, candidate: &VersionValue) -> bool {
        let lower = self.significant();
        let upper = match lower.as_slice() {
            [] => return true,
            [major] => vec![major.saturating_add(1)],
            [major, minor, ..] => vec![*major, minor.saturating_add(1)],
        };
        within(&lower, &upper, candidate)
    }

    /// `^1.2.3` := `<2.0.0`, `^0.2.3` := `<0.3.0`, `^0.0.3` := `<0.0.4`
    fn matches_caret(&self, candidate: &VersionValue) -> bool {
        let lower = self.significant();
        if lower.is_empty() {
            return true;
        }

        let mut upper = Vec::with_capacity(lower.len());
        for &component in &lower {
            if component != 0 {
                upper.push(component.saturating_add(1));
                break;
            }
            upper.push(component);
        }
        // All zeros: bump the last given component
        if upper.iter().all(|&c| c == 0)
            && let Some(last) = upper.last_mut()
        {
            *last += 1;
        }

        within(&lower, &upper, candidate)
    }
}

fn pad(components: &[u64]) -> [u64; 3] {
    let mut padded = [0; 3];
    for (slot, value) in padded.iter_mut().zip(components) {
        *slot = *value;
    }
    padded
}

fn within(lower: &[u64], upper: &[u64], candidate: &VersionValue) -> bool {
    let actual = candidate.padded();
    pad(lower) <= actual && actual < pad(upper)
}

impl FromStr for VersionValue {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(RangeError::Empty);
        }

        let (value, end) = Self::scan(input, 0)?;
        if let Some(found) = input[end..].chars().next() {
            return Err(RangeError::UnexpectedChar {
                input: input.to_string(),
                position: end,
                found,
            });
        }
        Ok(value)
    }
}

impl fmt::Display for VersionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator.as_str())?;

        if self.components == [Component::Wildcard] {
            f.write_str("*")?;
        } else {
            for (i, component) in self.components.iter().enumerate() {
                if i > 0 {
                    f.write_str(".")?;
                }
                match component {
                    Component::Number(n) => write!(f, "{}", n)?,
                    Component::Wildcard => f.write_str("x")?,
                }
            }
        }

        match self.prerelease_kind {
            Some(PrereleaseKind::Build) => write!(f, "+build{}", self.prerelease_number),
            Some(kind) if self.prerelease_number > 0 => {
                write!(f, "-{}{}", kind.as_str(), self.prerelease_number)
            }
            Some(kind) => write!(f, "-{}", kind.as_str()),
            None => Ok(()),
        }
    }
}

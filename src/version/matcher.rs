//! Local satisfaction check
//!
//! Answers "does the local store already hold a version for this spec?"
//! without contacting the upstream registry.

use url::Url;

use crate::version::error::RangeError;
use crate::version::range::RangeExpression;
use crate::version::value::VersionValue;

/// Dist-tag that always resolves upstream
pub const LATEST_TAG: &str = "latest";

/// A spec is opaque when it is a full URL (scheme plus host), e.g. a tarball
/// or git dependency pinned outside the registry.
pub fn is_url(spec: &str) -> bool {
    Url::parse(spec.trim())
        .map(|url| url.host_str().is_some_and(|host| !host.is_empty()))
        .unwrap_or(false)
}

/// Returns true if any cached version satisfies `spec`.
///
/// - URL specs are pinned externally and always count as satisfied.
/// - `latest` is never satisfied locally.
/// - Cached versions that are not concrete versions are ignored.
pub fn is_locally_satisfied(spec: &str, cached_versions: &[String]) -> Result<bool, RangeError> {
    if is_url(spec) {
        return Ok(true);
    }
    if spec.trim() == LATEST_TAG {
        return Ok(false);
    }

    let range = RangeExpression::parse(spec)?;
    Ok(cached_versions
        .iter()
        .filter_map(|v| VersionValue::parse_concrete(v).ok())
        .any(|version| range.matches(&version)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn versions(list: &[&str]) -> Vec<String> {
        list.iter().map(|v| v.to_string()).collect()
    }

    #[rstest]
    #[case("^1.2.0", &["1.2.0", "1.3.1"], true)]
    #[case("~1.3.0", &["1.2.0", "1.3.1"], true)]
    #[case("^2.0.0", &["1.2.0", "1.3.1"], false)]
    #[case("1.2.0", &["1.2.0"], true)]
    #[case("*", &[], false)]
    #[case("*", &["0.0.1"], true)]
    #[case(">=1.0.0 <1.3.0", &["1.3.1", "1.2.9"], true)]
    #[case("^1.0.0", &["not-a-version", "1.0.5"], true)]
    fn is_locally_satisfied_matches_cached_versions(
        #[case] spec: &str,
        #[case] cached: &[&str],
        #[case] expected: bool,
    ) {
        assert_eq!(
            is_locally_satisfied(spec, &versions(cached)).unwrap(),
            expected
        );
    }

    #[rstest]
    #[case(&[])]
    #[case(&["1.0.0", "2.0.0", "99.0.0"])]
    fn latest_is_never_satisfied_locally(#[case] cached: &[&str]) {
        assert!(!is_locally_satisfied("latest", &versions(cached)).unwrap());
    }

    #[rstest]
    #[case("https://example.com/pkg/-/pkg-1.0.0.tgz")]
    #[case("git://github.com/user/repo.git")]
    #[case("git+ssh://git@github.com/user/repo.git#v1.0.0")]
    fn url_specs_are_satisfied_without_consulting_cache(#[case] spec: &str) {
        assert!(is_locally_satisfied(spec, &[]).unwrap());
    }

    #[rstest]
    #[case("1.2.3", false)]
    #[case("file:../local", false)]
    #[case("github:user/repo", false)]
    #[case("http://localhost:8080/pkg", true)]
    fn is_url_requires_scheme_and_host(#[case] spec: &str, #[case] expected: bool) {
        assert_eq!(is_url(spec), expected);
    }

    #[test]
    fn malformed_spec_is_an_error() {
        assert!(is_locally_satisfied("^1.2.3.4", &versions(&["1.2.3"])).is_err());
    }
}

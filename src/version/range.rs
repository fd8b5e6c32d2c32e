//! Range expressions
//!
//! ```text
//! range-expr  := conjunction ('||' conjunction)*
//! conjunction := (version-token | version-token '-' version-token)+
//! ```
//!
//! Juxtaposed tokens must all hold; `||` separates alternatives of which any
//! may hold. A dashed range `A - B` desugars to `>=A <=B` inside its group.

use std::fmt;
use std::str::FromStr;

use crate::version::error::RangeError;
use crate::version::value::{Operator, VersionValue};

/// Disjunction of conjunction groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeExpression {
    alternatives: Vec<Vec<VersionValue>>,
}

#[derive(Debug, PartialEq)]
enum Item {
    Value(VersionValue),
    Dash,
}

impl RangeExpression {
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RangeError::Empty);
        }

        let alternatives = input
            .split("||")
            .map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    return Err(RangeError::EmptyAlternative(input.to_string()));
                }
                parse_conjunction(part)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { alternatives })
    }

    pub fn alternatives(&self) -> &[Vec<VersionValue>] {
        &self.alternatives
    }

    /// True when every token of at least one group is satisfied by `candidate`.
    pub fn matches(&self, candidate: &VersionValue) -> bool {
        self.alternatives
            .iter()
            .any(|group| group.iter().all(|bound| bound.satisfied_by(candidate)))
    }
}

fn parse_conjunction(part: &str) -> Result<Vec<VersionValue>, RangeError> {
    let mut items = Vec::new();
    let mut pos = 0;

    while pos < part.len() {
        let rest = &part[pos..];
        let trimmed = rest.trim_start();
        pos += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            break;
        }

        if trimmed.starts_with('-') {
            items.push(Item::Dash);
            pos += 1;
            continue;
        }

        let (value, end) = VersionValue::scan(part, pos)?;
        items.push(Item::Value(value));
        pos = end;
    }

    let mut group = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();
    while let Some(item) = items.next() {
        let Item::Value(lower) = item else {
            return Err(RangeError::DanglingDash(part.to_string()));
        };

        if items.peek() != Some(&Item::Dash) {
            group.push(lower);
            continue;
        }

        items.next();
        let Some(Item::Value(upper)) = items.next() else {
            return Err(RangeError::DanglingDash(part.to_string()));
        };
        if lower.operator() != Operator::None || upper.operator() != Operator::None {
            return Err(RangeError::OperatorInDashedRange(part.to_string()));
        }
        group.push(lower.with_operator(Operator::Gte));
        group.push(upper.with_operator(Operator::Lte));
    }

    Ok(group)
}

impl FromStr for RangeExpression {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RangeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" || ")?;
            }
            for (j, value) in group.iter().enumerate() {
                if j > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}", value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn candidate(s: &str) -> VersionValue {
        VersionValue::parse_concrete(s).unwrap()
    }

    fn tokens(range: &RangeExpression) -> Vec<Vec<String>> {
        range
            .alternatives()
            .iter()
            .map(|group| group.iter().map(ToString::to_string).collect())
            .collect()
    }

    #[test]
    fn parse_splits_disjunction_into_conjunction_groups() {
        let range = RangeExpression::parse("~3.4.3-alpha4||3.2.4||3.2 <3.3.3").unwrap();

        assert_eq!(
            tokens(&range),
            vec![
                vec!["~3.4.3-alpha4".to_string()],
                vec!["3.2.4".to_string()],
                vec!["3.2".to_string(), "<3.3.3".to_string()],
            ]
        );
    }

    #[rstest]
    #[case("2.1.0 - 2.4.7")]
    #[case("2.1.0-2.4.7")]
    fn parse_desugars_dashed_range(#[case] input: &str) {
        let range = RangeExpression::parse(input).unwrap();

        assert_eq!(
            tokens(&range),
            vec![vec![">=2.1.0".to_string(), "<=2.4.7".to_string()]]
        );
    }

    #[test]
    fn parse_keeps_prerelease_on_dashed_lower_bound() {
        let range = RangeExpression::parse("1.0.0-beta2 - 1.0.0").unwrap();

        assert_eq!(
            tokens(&range),
            vec![vec![">=1.0.0-beta2".to_string(), "<=1.0.0".to_string()]]
        );
    }

    #[test]
    fn parse_accepts_juxtaposed_tokens_without_spaces() {
        let range = RangeExpression::parse(">=1.0.0<2.0.0").unwrap();

        assert_eq!(
            tokens(&range),
            vec![vec![">=1.0.0".to_string(), "<2.0.0".to_string()]]
        );
    }

    #[rstest]
    #[case("", RangeError::Empty)]
    #[case("   ", RangeError::Empty)]
    #[case("1.0.0 ||", RangeError::EmptyAlternative("1.0.0 ||".to_string()))]
    #[case("1.0.0 -", RangeError::DanglingDash("1.0.0 -".to_string()))]
    #[case("- 1.0.0", RangeError::DanglingDash("- 1.0.0".to_string()))]
    #[case(">=1.0.0 - 2.0.0", RangeError::OperatorInDashedRange(">=1.0.0 - 2.0.0".to_string()))]
    #[case("1.2.3.4", RangeError::TooManyComponents("1.2.3.4".to_string()))]
    fn parse_reports_malformed_ranges(#[case] input: &str, #[case] expected: RangeError) {
        assert_eq!(RangeExpression::parse(input), Err(expected));
    }

    #[rstest]
    #[case("latest")]
    #[case("=1.0.0")]
    #[case("1.0.0 && 2.0.0")]
    #[case("git://github.com/a/b")]
    fn parse_rejects_unknown_syntax(#[case] input: &str) {
        assert!(matches!(
            RangeExpression::parse(input),
            Err(RangeError::UnexpectedChar { .. })
        ));
    }

    #[rstest]
    #[case("2.1.0 - 2.4.7", "2.3.0", true)]
    #[case("2.1.0 - 2.4.7", "2.4.7", true)]
    #[case("2.1.0 - 2.4.7", "2.1.0", true)]
    #[case("2.1.0 - 2.4.7", "2.4.8", false)]
    #[case("2.1.0 - 2.4.7", "2.0.9", false)]
    #[case(">=1.0.0 <2.0.0", "1.5.0", true)]
    #[case(">=1.0.0 <2.0.0", "2.0.0", false)]
    #[case(">1.0.0 <=2.0.0", "1.0.0", false)]
    #[case("~1.2.0-alpha2||^2.0.0", "1.2.5", true)]
    #[case("~1.2.0-alpha2||^2.0.0", "2.7.1", true)]
    #[case("~1.2.0-alpha2||^2.0.0", "1.3.0", false)]
    #[case("~1.2.0-alpha2||^2.0.0", "3.0.0", false)]
    #[case("1.0.0 || 2.0.0 || 3.0.0", "2.0.0", true)]
    #[case("1.0.0 || 2.0.0 || 3.0.0", "4.0.0", false)]
    #[case("1.x", "1.0.0", true)]
    #[case("1.x", "1.99.0", true)]
    #[case("1.x", "2.0.0", false)]
    #[case("*", "42.0.1", true)]
    fn matches_evaluates_groups(
        #[case] range: &str,
        #[case] version: &str,
        #[case] expected: bool,
    ) {
        let range = RangeExpression::parse(range).unwrap();
        assert_eq!(range.matches(&candidate(version)), expected);
    }

    #[test]
    fn display_reparses_to_the_same_expression() {
        let range = RangeExpression::parse("^1.2 >=1.2.5||1.x - 3 || *").unwrap();
        let reparsed = RangeExpression::parse(&range.to_string()).unwrap();

        assert_eq!(reparsed, range);
    }
}

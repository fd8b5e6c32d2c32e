use thiserror::Error;

/// Failure to parse a version token or range expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("Empty version range")]
    Empty,

    #[error("Unexpected {found:?} at position {position} in {input:?}")]
    UnexpectedChar {
        input: String,
        position: usize,
        found: char,
    },

    #[error("Version {0:?} has more than 3 components")]
    TooManyComponents(String),

    #[error("Version component out of range in {0:?}")]
    ComponentOverflow(String),

    #[error("Dashed range is missing a bound in {0:?}")]
    DanglingDash(String),

    #[error("Dashed range bounds cannot carry an operator: {0:?}")]
    OperatorInDashedRange(String),

    #[error("Empty alternative in {0:?}")]
    EmptyAlternative(String),

    #[error("{0:?} is not a concrete version")]
    NotConcrete(String),
}

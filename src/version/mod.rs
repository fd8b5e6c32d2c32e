//! Version-range language and matcher
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ VersionValue │────▶│    Range     │────▶│   Matcher    │
//! │ (token, ord) │     │ (parse, eval)│     │ (local check)│
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`value`]: single version token, pre-release ordering, operator rules
//! - [`range`]: range expressions (`||` alternatives, juxtaposition, dashed ranges)
//! - [`matcher`]: local satisfaction check against cached versions
//! - [`error`]: range parse errors

pub mod error;
pub mod matcher;
pub mod range;
pub mod value;

pub use error::RangeError;
pub use matcher::{LATEST_TAG, is_locally_satisfied, is_url};
pub use range::RangeExpression;
pub use value::{Component, Operator, PrereleaseKind, VersionValue};

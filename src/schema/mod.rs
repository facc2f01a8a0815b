//! resctrl schemata handling
//!
//! Everything in here is pure text processing; no filesystem access.
//!
//! - `parser` - split a line into tag and domain entries, normalize values
//! - `compare` - decide whether two schemata describe the same policy
//! - `compose` - overlay configured fragments onto the current schemata
//!
//! # Example Usage
//!
//! ```
//! use rdtvisor::schema::{check_schemata_match, compose, Fragment};
//!
//! let merged = compose(
//!     "MB:0=20;1=70\n",
//!     &[Fragment::cache("L3:0=f0;1=f"), Fragment::bandwidth("MB:0=70;1=20")],
//! ).unwrap();
//! assert_eq!(merged, "L3:0=f0;1=f\nMB:0=70;1=20\n");
//!
//! // What the kernel hands back is padded and reordered, but equivalent
//! assert!(check_schemata_match(&merged, "MB:0=70;1=20\nL3:0=0f0;1=00f\n").is_ok());
//! ```

pub mod compare;
pub mod compose;
pub mod parser;

use std::fmt;

pub use compare::{
    check_schemata_match, compare_schemata, Mismatch, MismatchDetail, SchemaComparison, Side,
};
pub use compose::{compose, Fragment};
pub use parser::{
    normalize_value, ParseError, ParseErrorKind, ResourceClass, ResourceTag, SchemaLine,
};

/// Error type for schema operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A configured or existing line is not `<TAG>:<domain>=<value>[;...]`
    Malformed(ParseError),
    /// A line failed to parse while comparing two schemata
    Unparseable {
        side: Side,
        line_number: usize,
        error: ParseError,
    },
    /// The two schemata parse but describe different policies
    Mismatch(Mismatch),
    /// A fragment lists the same resource twice
    DuplicateTag(ResourceTag),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Malformed(e) => write!(f, "{}", e),
            SchemaError::Unparseable {
                side,
                line_number,
                error,
            } => write!(f, "{} schema, line {}: {}", side, line_number, error),
            SchemaError::Mismatch(m) => write!(f, "schemata mismatch: {}", m),
            SchemaError::DuplicateTag(tag) => write!(f, "resource {} configured twice", tag),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaError::Malformed(e) => Some(e),
            SchemaError::Unparseable { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ParseError> for SchemaError {
    fn from(e: ParseError) -> Self {
        SchemaError::Malformed(e)
    }
}

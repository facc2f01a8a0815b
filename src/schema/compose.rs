//! Overlaying configured fragments onto the current schemata
//!
//! The cache and bandwidth policies are configured independently, but the
//! kernel takes a single `schemata` file. Composing keeps every line of the
//! current file whose resource is not being reconfigured and swaps in the
//! configured line for each resource that is.
//!
//! ```text
//! current:   MB:0=20;1=70
//! cache:     MB:0=80;1=10      ← not a cache line, ignored
//!            L3:0=f0;1=f       ← taken
//! bandwidth: MB:0=70;1=20      ← taken
//!
//! composed:  L3:0=f0;1=f
//!            MB:0=70;1=20
//! ```

use std::collections::BTreeMap;

use tracing::debug;

use super::parser::{split_tag, ParseError, ParseErrorKind, ResourceClass, ResourceTag, SchemaLine};
use super::SchemaError;

/// One configured policy fragment
///
/// `text` may span several lines; only lines whose tag belongs to `class`
/// are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub class: ResourceClass,
    pub text: &'a str,
}

impl<'a> Fragment<'a> {
    pub fn cache(text: &'a str) -> Self {
        Self {
            class: ResourceClass::Cache,
            text,
        }
    }

    pub fn bandwidth(text: &'a str) -> Self {
        Self {
            class: ResourceClass::Bandwidth,
            text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Parsed lines this fragment owns, keyed by tag
    fn owned_lines(&self) -> Result<BTreeMap<ResourceTag, SchemaLine>, SchemaError> {
        let mut owned = BTreeMap::new();
        for raw in self.text.lines().filter(|l| !l.trim().is_empty()) {
            let tag = line_tag(raw)?;
            if tag.class() != Some(self.class) {
                debug!(line = raw.trim(), class = ?self.class, "ignoring foreign line in fragment");
                continue;
            }

            let line = SchemaLine::parse(raw)?;
            if owned.contains_key(&line.tag) {
                return Err(SchemaError::DuplicateTag(line.tag));
            }
            owned.insert(line.tag.clone(), line);
        }
        Ok(owned)
    }
}

fn line_tag(raw: &str) -> Result<ResourceTag, SchemaError> {
    let malformed = |kind| {
        SchemaError::Malformed(ParseError {
            line: raw.trim().to_string(),
            kind,
        })
    };
    let (tag, _) = split_tag(raw).ok_or_else(|| malformed(ParseErrorKind::MissingColon))?;
    ResourceTag::parse(tag).map_err(malformed)
}

/// Merge `fragments` into `existing`
///
/// Lines of a tag supplied by a fragment replace the existing line of
/// that tag; every other existing line passes through verbatim, including
/// tags this crate does not recognize. A fragment line that names only
/// some domains still replaces the whole line. The kernel keeps the old
/// values of the domains left out, so verifying the write reports them.
/// Output lines follow the kernel's tag order and end with a newline.
/// Composing the same input twice gives byte-identical output.
pub fn compose(existing: &str, fragments: &[Fragment<'_>]) -> Result<String, SchemaError> {
    let mut lines: BTreeMap<ResourceTag, String> = BTreeMap::new();

    for raw in existing.lines().filter(|l| !l.trim().is_empty()) {
        let tag = line_tag(raw)?;
        // Only the first line of a tag counts; the kernel never prints two.
        lines.entry(tag).or_insert_with(|| raw.trim().to_string());
    }

    for fragment in fragments.iter().filter(|f| !f.is_empty()) {
        for (tag, line) in fragment.owned_lines()? {
            lines.insert(tag, line.to_string());
        }
    }

    let mut out = String::new();
    for line in lines.values() {
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

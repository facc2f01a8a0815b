//! Schema line parsing and value normalization
//!
//! A schemata line has the shape the resctrl filesystem reads and writes:
//!
//! ```text
//! L3:0=fff;1=0f0
//! ^^ ^^^^^ ^^^^^
//! │    │     └── domain 1 → capacity bitmask 0x0f0
//! │    └──────── domain 0 → capacity bitmask 0xfff
//! └───────────── resource tag (cache allocation)
//!
//! MB:0=70;1=20
//! ^^ ^^^^ ^^^^
//! │    └─────┴── domain → bandwidth percent (or MBps with mba_MBps)
//! └───────────── resource tag (memory bandwidth allocation)
//! ```
//!
//! Whitespace around `:`, `;` and `=` is tolerated, a trailing `;` is
//! tolerated, and values are compared by their normalized form so that
//! `00f0`, `f0` and `F0` are the same mask.

use std::collections::BTreeMap;
use std::fmt;

/// Resource type named by the prefix of a schema line
///
/// The derived ordering is the order the kernel prints lines in: cache
/// resources first, bandwidth after, anything unrecognized last.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceTag {
    /// L3 cache allocation (`L3`)
    L3,
    /// L3 code partition when CDP is enabled (`L3CODE`)
    L3Code,
    /// L3 data partition when CDP is enabled (`L3DATA`)
    L3Data,
    /// L2 cache allocation (`L2`)
    L2,
    /// L2 code partition when CDP is enabled (`L2CODE`)
    L2Code,
    /// L2 data partition when CDP is enabled (`L2DATA`)
    L2Data,
    /// Memory bandwidth allocation (`MB`)
    Mb,
    /// A tag this crate does not know about, kept for forward compatibility
    Other(String),
}

/// Which configured fragment owns a resource tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceClass {
    /// Cache allocation (`L3`, `L2` and their CDP variants)
    Cache,
    /// Memory bandwidth allocation (`MB`)
    Bandwidth,
}

impl ResourceTag {
    /// Parse a tag, trimming surrounding whitespace
    ///
    /// Known tags map to their own variant; any other alphanumeric word
    /// becomes [`ResourceTag::Other`]. Empty or non-alphanumeric tags are
    /// rejected.
    pub fn parse(raw: &str) -> Result<Self, ParseErrorKind> {
        let tag = raw.trim();
        if tag.is_empty() {
            return Err(ParseErrorKind::EmptyTag);
        }
        if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ParseErrorKind::InvalidTag(tag.to_string()));
        }

        Ok(match tag {
            "L3" => ResourceTag::L3,
            "L3CODE" => ResourceTag::L3Code,
            "L3DATA" => ResourceTag::L3Data,
            "L2" => ResourceTag::L2,
            "L2CODE" => ResourceTag::L2Code,
            "L2DATA" => ResourceTag::L2Data,
            "MB" => ResourceTag::Mb,
            other => ResourceTag::Other(other.to_string()),
        })
    }

    /// The tag text as written in the schemata file
    pub fn as_str(&self) -> &str {
        match self {
            ResourceTag::L3 => "L3",
            ResourceTag::L3Code => "L3CODE",
            ResourceTag::L3Data => "L3DATA",
            ResourceTag::L2 => "L2",
            ResourceTag::L2Code => "L2CODE",
            ResourceTag::L2Data => "L2DATA",
            ResourceTag::Mb => "MB",
            ResourceTag::Other(name) => name,
        }
    }

    /// The fragment class that owns this tag, `None` for unknown tags
    pub fn class(&self) -> Option<ResourceClass> {
        match self {
            ResourceTag::L3
            | ResourceTag::L3Code
            | ResourceTag::L3Data
            | ResourceTag::L2
            | ResourceTag::L2Code
            | ResourceTag::L2Data => Some(ResourceClass::Cache),
            ResourceTag::Mb => Some(ResourceClass::Bandwidth),
            ResourceTag::Other(_) => None,
        }
    }
}

impl fmt::Display for ResourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed schema line: a tag plus its per-domain values
///
/// Values are stored as trimmed literal tokens; [`SchemaLine::normalized`]
/// gives the form used for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLine {
    pub tag: ResourceTag,
    pub domains: BTreeMap<u32, String>,
}

impl SchemaLine {
    /// Parse a single non-blank schema line
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let fail = |kind| ParseError {
            line: raw.trim().to_string(),
            kind,
        };

        let (tag, rest) = split_tag(raw).ok_or_else(|| fail(ParseErrorKind::MissingColon))?;
        let tag = ResourceTag::parse(tag).map_err(fail)?;

        let mut domains = BTreeMap::new();
        for segment in rest.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (id, value) = segment
                .split_once('=')
                .ok_or_else(|| fail(ParseErrorKind::MissingEquals(segment.to_string())))?;
            let id = id.trim();
            let value = value.trim();

            // `u32::from_str` alone would take a leading `+`
            let domain: u32 = Some(id)
                .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| fail(ParseErrorKind::InvalidDomain(id.to_string())))?;
            if value.is_empty() {
                return Err(fail(ParseErrorKind::EmptyValue(domain)));
            }
            if domains.insert(domain, value.to_string()).is_some() {
                return Err(fail(ParseErrorKind::DuplicateDomain(domain)));
            }
        }

        if domains.is_empty() {
            return Err(fail(ParseErrorKind::NoDomains));
        }

        Ok(Self { tag, domains })
    }

    /// Domain map with every value normalized
    pub fn normalized(&self) -> BTreeMap<u32, String> {
        self.domains
            .iter()
            .map(|(domain, value)| (*domain, normalize_value(value)))
            .collect()
    }

    /// Canonical text: domains in ascending order, normalized values, no spaces
    pub fn canonical(&self) -> String {
        let entries: Vec<String> = self
            .normalized()
            .into_iter()
            .map(|(domain, value)| format!("{}={}", domain, value))
            .collect();
        format!("{}:{}", self.tag, entries.join(";"))
    }
}

impl fmt::Display for SchemaLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.tag)?;
        for (i, (domain, value)) in self.domains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", domain, value)?;
        }
        Ok(())
    }
}

/// Split a raw line at its first colon into (tag, remainder)
pub fn split_tag(raw: &str) -> Option<(&str, &str)> {
    raw.trim().split_once(':')
}

/// Parse every non-blank line of a multi-line schema text
///
/// Returns the 1-based line number alongside each parsed line so callers
/// can point at the offending input.
pub fn parse_schemata(text: &str) -> Vec<(usize, Result<SchemaLine, ParseError>)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, SchemaLine::parse(line)))
        .collect()
}

/// Normalize a value token for comparison
///
/// Tokens made only of hex digits (which covers decimal bandwidth values)
/// are lower-cased with leading zeros stripped; an all-zero token becomes
/// `"0"`. Anything else is returned unchanged and compares literally.
pub fn normalize_value(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return value.to_string();
    }

    let stripped = value.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_ascii_lowercase()
    }
}

/// What was wrong with a schema line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// No `:` separating the tag from the domain list
    MissingColon,
    /// Nothing before the `:`
    EmptyTag,
    /// Tag contains characters other than ASCII alphanumerics and `_`
    InvalidTag(String),
    /// A domain segment without `=`
    MissingEquals(String),
    /// Domain id is not a non-negative base-10 integer
    InvalidDomain(String),
    /// Same domain id listed twice in one line
    DuplicateDomain(u32),
    /// `<domain>=` with nothing after it
    EmptyValue(u32),
    /// Tag with no domain entries at all
    NoDomains,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::MissingColon => write!(f, "missing ':' after resource tag"),
            ParseErrorKind::EmptyTag => write!(f, "empty resource tag"),
            ParseErrorKind::InvalidTag(tag) => write!(f, "invalid resource tag {:?}", tag),
            ParseErrorKind::MissingEquals(seg) => {
                write!(f, "domain segment {:?} is not <domain>=<value>", seg)
            }
            ParseErrorKind::InvalidDomain(id) => write!(f, "invalid domain id {:?}", id),
            ParseErrorKind::DuplicateDomain(id) => write!(f, "domain {} listed twice", id),
            ParseErrorKind::EmptyValue(id) => write!(f, "domain {} has an empty value", id),
            ParseErrorKind::NoDomains => write!(f, "no domain entries"),
        }
    }
}

/// A schema line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The offending line, trimmed
    pub line: String,
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed schema line {:?}: {}", self.line, self.kind)
    }
}

impl std::error::Error for ParseError {}

//! Semantic comparison of two schemata texts
//!
//! The kernel rewrites what it is given: it reorders lines, pads masks to
//! the width of the cache (`f` → `00f`), prints hex in lower case and
//! drops spaces. A plain string compare would flag every write as a
//! failure, so both sides are parsed and compared as
//! tag → domain → normalized value maps.

use std::collections::BTreeMap;
use std::fmt;

use super::parser::{parse_schemata, ParseError, ResourceTag, SchemaLine};
use super::SchemaError;

/// Which of the two compared texts a diagnostic refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The schema that was requested / written
    Applied,
    /// The schema read back from the control group
    Existing,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Applied => write!(f, "applied"),
            Side::Existing => write!(f, "existing"),
        }
    }
}

/// The first difference found between two schemata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchDetail {
    /// A resource tag appears on only one side
    MissingTag { tag: ResourceTag, missing_from: Side },
    /// A domain id appears on only one side for a shared tag
    MissingDomain {
        tag: ResourceTag,
        domain: u32,
        missing_from: Side,
    },
    /// Both sides have the domain but the normalized values differ
    ValueDiffers {
        tag: ResourceTag,
        domain: u32,
        applied: String,
        existing: String,
    },
}

impl fmt::Display for MismatchDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchDetail::MissingTag { tag, missing_from } => {
                write!(f, "resource {} missing from {} schema", tag, missing_from)
            }
            MismatchDetail::MissingDomain {
                tag,
                domain,
                missing_from,
            } => write!(
                f,
                "{} domain {} missing from {} schema",
                tag, domain, missing_from
            ),
            MismatchDetail::ValueDiffers {
                tag,
                domain,
                applied,
                existing,
            } => write!(
                f,
                "{} domain {}: applied {} but found {}",
                tag, domain, applied, existing
            ),
        }
    }
}

/// Two schemata that parse fine but do not describe the same policy
///
/// Carries both sides in canonical form so the message is readable
/// without going back to the raw files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub applied: String,
    pub existing: String,
    pub detail: MismatchDetail,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (applied {:?}, existing {:?})",
            self.detail, self.applied, self.existing
        )
    }
}

/// Outcome of comparing two schemata texts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaComparison {
    Matched,
    Mismatched(Mismatch),
    Unparseable {
        side: Side,
        line_number: usize,
        error: ParseError,
    },
}

impl SchemaComparison {
    pub fn is_match(&self) -> bool {
        matches!(self, SchemaComparison::Matched)
    }

    /// Collapse into a `Result`, for callers that just propagate
    pub fn into_result(self) -> Result<(), SchemaError> {
        match self {
            SchemaComparison::Matched => Ok(()),
            SchemaComparison::Mismatched(m) => Err(SchemaError::Mismatch(m)),
            SchemaComparison::Unparseable {
                side,
                line_number,
                error,
            } => Err(SchemaError::Unparseable {
                side,
                line_number,
                error,
            }),
        }
    }
}

type NormalizedSchemata = BTreeMap<ResourceTag, BTreeMap<u32, String>>;

fn normalize(text: &str, side: Side) -> Result<NormalizedSchemata, SchemaComparison> {
    let mut out = NormalizedSchemata::new();
    for (line_number, parsed) in parse_schemata(text) {
        let line = parsed.map_err(|error| SchemaComparison::Unparseable {
            side,
            line_number,
            error,
        })?;
        // A repeated tag merges into the earlier line; later domains win.
        out.entry(line.tag.clone())
            .or_default()
            .extend(line.normalized());
    }
    Ok(out)
}

fn render(schemata: &NormalizedSchemata) -> String {
    schemata
        .iter()
        .map(|(tag, domains)| {
            SchemaLine {
                tag: tag.clone(),
                domains: domains.clone(),
            }
            .canonical()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_difference(
    applied: &NormalizedSchemata,
    existing: &NormalizedSchemata,
) -> Option<MismatchDetail> {
    for (tag, applied_domains) in applied {
        let Some(existing_domains) = existing.get(tag) else {
            return Some(MismatchDetail::MissingTag {
                tag: tag.clone(),
                missing_from: Side::Existing,
            });
        };

        for (domain, applied_value) in applied_domains {
            match existing_domains.get(domain) {
                None => {
                    return Some(MismatchDetail::MissingDomain {
                        tag: tag.clone(),
                        domain: *domain,
                        missing_from: Side::Existing,
                    })
                }
                Some(existing_value) if existing_value != applied_value => {
                    return Some(MismatchDetail::ValueDiffers {
                        tag: tag.clone(),
                        domain: *domain,
                        applied: applied_value.clone(),
                        existing: existing_value.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        if let Some(domain) = existing_domains
            .keys()
            .find(|domain| !applied_domains.contains_key(domain))
        {
            return Some(MismatchDetail::MissingDomain {
                tag: tag.clone(),
                domain: *domain,
                missing_from: Side::Applied,
            });
        }
    }

    existing
        .keys()
        .find(|tag| !applied.contains_key(tag))
        .map(|tag| MismatchDetail::MissingTag {
            tag: tag.clone(),
            missing_from: Side::Applied,
        })
}

/// Compare two schemata texts semantically
///
/// Line order, entry order, whitespace, hex case and leading zeros are
/// all ignored. Any unparseable line on either side (applied is checked
/// first) yields [`SchemaComparison::Unparseable`].
pub fn compare_schemata(applied: &str, existing: &str) -> SchemaComparison {
    let applied_map = match normalize(applied, Side::Applied) {
        Ok(map) => map,
        Err(unparseable) => return unparseable,
    };
    let existing_map = match normalize(existing, Side::Existing) {
        Ok(map) => map,
        Err(unparseable) => return unparseable,
    };

    match first_difference(&applied_map, &existing_map) {
        None => SchemaComparison::Matched,
        Some(detail) => SchemaComparison::Mismatched(Mismatch {
            applied: render(&applied_map),
            existing: render(&existing_map),
            detail,
        }),
    }
}

/// `Result` form of [`compare_schemata`]
pub fn check_schemata_match(applied: &str, existing: &str) -> Result<(), SchemaError> {
    compare_schemata(applied, existing).into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_ignores_order_spacing_and_padding() {
        assert!(check_schemata_match("L3: 0= f0; 1 =   000f", "L3:  1=f; 0 = 00f0 ;").is_ok());
    }

    #[test]
    fn test_match_ignores_line_order_and_case() {
        let applied = "L3:0=F0;1=f\nMB:0=70;1=20";
        let existing = "MB:1=020;0=70\n\nL3:1=00F;0=0f0\n";
        assert!(compare_schemata(applied, existing).is_match());
    }

    #[test]
    fn test_value_difference_is_mismatch() {
        match compare_schemata("L3:0=f;1=f", "L3:0=f0;1=f") {
            SchemaComparison::Mismatched(m) => {
                assert_eq!(
                    m.detail,
                    MismatchDetail::ValueDiffers {
                        tag: ResourceTag::L3,
                        domain: 0,
                        applied: "f".to_string(),
                        existing: "f0".to_string(),
                    }
                );
                assert_eq!(m.applied, "L3:0=f;1=f");
                assert_eq!(m.existing, "L3:0=f0;1=f");
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_tag_is_mismatch() {
        match compare_schemata("L3:0=f\nMB:0=50", "L3:0=f") {
            SchemaComparison::Mismatched(m) => assert_eq!(
                m.detail,
                MismatchDetail::MissingTag {
                    tag: ResourceTag::Mb,
                    missing_from: Side::Existing,
                }
            ),
            other => panic!("expected mismatch, got {:?}", other),
        }

        match compare_schemata("L3:0=f", "L3:0=f\nMB:0=50") {
            SchemaComparison::Mismatched(m) => assert_eq!(
                m.detail,
                MismatchDetail::MissingTag {
                    tag: ResourceTag::Mb,
                    missing_from: Side::Applied,
                }
            ),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_domain_set_difference_is_mismatch() {
        let result = compare_schemata("L3:0=f", "L3:0=f;1=f");
        assert!(matches!(
            result,
            SchemaComparison::Mismatched(Mismatch {
                detail: MismatchDetail::MissingDomain {
                    domain: 1,
                    missing_from: Side::Applied,
                    ..
                },
                ..
            })
        ));
    }

    #[test]
    fn test_unparseable_line_fails_either_side() {
        let bad = "L3:  1f; 0 = 00f0 ;";

        match compare_schemata("L3:0=f0;1=f", bad) {
            SchemaComparison::Unparseable {
                side, line_number, ..
            } => {
                assert_eq!(side, Side::Existing);
                assert_eq!(line_number, 1);
            }
            other => panic!("expected parse failure, got {:?}", other),
        }

        let err = check_schemata_match(bad, bad).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Unparseable {
                side: Side::Applied,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_tags_compare_literally() {
        assert!(check_schemata_match("SMBA:0=2048", "SMBA:0=2048").is_ok());
        assert!(check_schemata_match("SMBA:0=2048", "SMBA:0=1024").is_err());
    }
}

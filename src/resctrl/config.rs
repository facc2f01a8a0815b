//! Intel RDT configuration for one container
//!
//! Field names follow the `linux.intelRdt` object of the OCI runtime spec:
//!
//! ```json
//! { "closID": "guaranteed", "l3CacheSchema": "L3:0=ff;1=ff", "memBwSchema": "MB:0=70;1=70" }
//! ```

use serde::{Deserialize, Serialize};

use super::error::RdtError;
use super::resolver::{Feature, RdtResolver};
use crate::schema::Fragment;

/// Requested allocation class and policy
///
/// Empty strings mean "not set": no ClosID gives the container a private
/// group, an empty schema leaves that resource type alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntelRdtConfig {
    #[serde(rename = "closID")]
    pub clos_id: String,
    pub l3_cache_schema: String,
    pub mem_bw_schema: String,
}

impl IntelRdtConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn has_schema(&self) -> bool {
        !self.l3_cache_schema.trim().is_empty() || !self.mem_bw_schema.trim().is_empty()
    }

    /// Whether this config asks for any group at all
    pub fn is_configured(&self) -> bool {
        !self.clos_id.is_empty() || self.has_schema()
    }

    pub fn fragments(&self) -> [Fragment<'_>; 2] {
        [
            Fragment::cache(&self.l3_cache_schema),
            Fragment::bandwidth(&self.mem_bw_schema),
        ]
    }

    /// Reject ClosIDs that are not a plain directory name
    pub fn validate(&self) -> Result<(), RdtError> {
        if self.clos_id.is_empty() {
            return Ok(());
        }
        validate_group_name(&self.clos_id).map_err(|reason| RdtError::InvalidClosId {
            clos_id: self.clos_id.clone(),
            reason,
        })
    }

    /// Check that every configured resource is available on this host
    pub fn check_supported(&self, resolver: &dyn RdtResolver) -> Result<(), RdtError> {
        if !self.l3_cache_schema.trim().is_empty()
            && !resolver.is_supported(Feature::CacheAllocation)
        {
            return Err(RdtError::Unsupported(
                "L3 cache schema configured but cache allocation is not enabled".to_string(),
            ));
        }
        if !self.mem_bw_schema.trim().is_empty()
            && !resolver.is_supported(Feature::BandwidthAllocation)
        {
            return Err(RdtError::Unsupported(
                "memory bandwidth schema configured but bandwidth allocation is not enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// A group name must be usable as a single directory under the resctrl root
pub fn validate_group_name(name: &str) -> Result<(), &'static str> {
    match name {
        "" => Err("must not be empty"),
        "." | ".." => Err("must not be a relative path component"),
        "info" | "mon_groups" | "mon_data" => Err("collides with a resctrl control directory"),
        n if n.contains('/') => Err("must not contain '/'"),
        n if n.contains('\0') => Err("must not contain NUL"),
        n if n.trim() != n => Err("must not have surrounding whitespace"),
        _ => Ok(()),
    }
}

//! rdtvisor - Intel RDT cache and memory bandwidth allocation for containers
//!
//! This library manages resctrl allocation classes on behalf of a container
//! runtime: it composes cache and bandwidth policies into a group's
//! `schemata`, checks the kernel accepted them, and moves container
//! processes into the group, sharing groups between containers that ask for
//! the same ClosID.
//!
//! # Modules
//!
//! - `schema` - schemata parsing, comparison and composition (pure text)
//! - `resctrl` - group lifecycle, filesystem access, mount discovery, stats
//! - `metrics` - Prometheus metrics for group lifecycle and schema writes
//! - `tracing` - logging setup for binaries embedding the manager
//!
//! # Quick Start
//!
//! ```ignore
//! use rdtvisor::{IntelRdtConfig, RdtContext};
//!
//! let ctx = RdtContext::host()?;
//! let manager = ctx.manager(IntelRdtConfig::from_json(spec_json)?, &container_id);
//! manager.apply(pid)?;
//! ```

pub mod metrics;
pub mod resctrl;
pub mod schema;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use resctrl::{ApplyOutcome, IntelRdtConfig, RdtContext, RdtError, RdtManager};
pub use schema::{check_schemata_match, compose, Fragment, SchemaError};

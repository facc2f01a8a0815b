//! Intel RDT resource control via the resctrl filesystem
//!
//! This module places container processes into cache and memory
//! bandwidth allocation classes ("ClosIDs").
//!
//! # How resctrl Works
//!
//! Every directory under the resctrl root is one allocation class. Its
//! `schemata` file holds the policy, its `tasks` file the pids the kernel
//! enforces it for. The kernel may clamp or reformat what is written to
//! `schemata`, so every write is read back and compared.
//!
//! ```text
//! /sys/fs/resctrl/
//! ├── schemata      L3:0=fff;1=fff      ← default group (never removed)
//! │                 MB:0=100;1=100
//! └── gold/         ← shared ClosID "gold"
//!     ├── schemata  L3:0=0f0;1=0f0
//!     └── tasks     1235 1240
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! use rdtvisor::resctrl::{IntelRdtConfig, RdtContext};
//!
//! let ctx = RdtContext::host()?;
//! let config = IntelRdtConfig::from_json(r#"{"closID":"gold","l3CacheSchema":"L3:0=0f0"}"#)?;
//!
//! let manager = ctx.manager(config, "container-1");
//! manager.apply(container_pid)?;
//!
//! // When the container is gone
//! manager.destroy()?;
//! ```

pub mod config;
pub mod error;
pub mod fs;
pub mod manager;
pub mod registry;
pub mod resolver;
pub mod stats;

pub use config::IntelRdtConfig;
pub use error::RdtError;
pub use fs::{ControlFs, HostFs};
pub use manager::{ApplyOutcome, RdtContext, RdtManager};
pub use registry::{ClosRegistry, GroupEntry};
pub use resolver::{Feature, Features, RdtResolver, StaticResolver};
pub use stats::{DomainMonitoring, L3CacheInfo, MemBwInfo, RdtStats};

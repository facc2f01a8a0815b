//! Allocation class lifecycle for containers
//!
//! Each container gets an [`RdtManager`]. Managers that name the same
//! ClosID share one group directory; the shared [`ClosRegistry`] counts
//! them so the directory is created once and removed after the last one
//! leaves.
//!
//! ```text
//!              apply (schema set, no dir)            apply (same ClosID)
//! Unclaimed ─────────────────────────────► Created ─────────────────────► Created (refs+1)
//!     ▲                                       │
//!     │        destroy (refs → 0, owned)      │
//!     └───────────────────────────────────────┘
//! ```
//!
//! Only the sole holder of a group it created may rewrite the group's
//! schemata. Anyone else joining or re-setting a shared group only has
//! its requested policy checked against what is already in force.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::{validate_group_name, IntelRdtConfig};
use super::error::RdtError;
use super::fs::{read_or_empty, ControlFs, HostFs};
use super::registry::{ClosRegistry, GroupEntry};
use super::resolver::{RdtResolver, StaticResolver};
use super::stats::{read_stats, RdtStats};
use crate::metrics::{
    RDT_ACTIVE_GROUPS, RDT_GROUPS_CREATED, RDT_GROUPS_REMOVED, RDT_SCHEMA_MISMATCHES,
    RDT_SCHEMA_WRITES,
};
use crate::schema::{check_schemata_match, compose, SchemaError};

const SCHEMATA: &str = "schemata";
const TASKS: &str = "tasks";

/// Shared collaborators for every manager in a process
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct RdtContext {
    fs: Arc<dyn ControlFs>,
    resolver: Arc<dyn RdtResolver>,
    registry: Arc<ClosRegistry>,
}

impl RdtContext {
    pub fn new(fs: Arc<dyn ControlFs>, resolver: Arc<dyn RdtResolver>) -> Self {
        Self {
            fs,
            resolver,
            registry: Arc::new(ClosRegistry::new()),
        }
    }

    /// Context for the host: real filesystem, resctrl found via mountinfo
    pub fn host() -> io::Result<Self> {
        Ok(Self::new(Arc::new(HostFs), Arc::new(StaticResolver::discover()?)))
    }

    pub fn registry(&self) -> &ClosRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &dyn RdtResolver {
        self.resolver.as_ref()
    }

    /// Whether a resctrl root is available at all
    pub fn is_enabled(&self) -> bool {
        self.resolver.root_path().is_some()
    }

    /// Manager for one container
    ///
    /// With an empty ClosID the container gets a private group named `id`
    /// (normally the container id), or a generated name if `id` is empty.
    pub fn manager(&self, config: IntelRdtConfig, id: &str) -> RdtManager {
        let name = if !config.clos_id.is_empty() {
            config.clos_id.clone()
        } else if !id.is_empty() {
            id.to_string()
        } else {
            format!("rdt-{}", Uuid::now_v7().simple())
        };

        let path = self
            .resolver
            .root_path()
            .map(|root| root.join(&name))
            .unwrap_or_default();

        RdtManager {
            ctx: self.clone(),
            name,
            path,
            state: Mutex::new(ManagerState {
                config,
                bound: false,
            }),
        }
    }

    /// Manager bound to an existing group directory
    ///
    /// Used to pick a container's group back up after a runtime restart.
    /// A private group (empty ClosID) is treated as ours: `set` may
    /// rewrite it and `destroy` removes it.
    pub fn attach(
        &self,
        config: IntelRdtConfig,
        path: impl Into<PathBuf>,
    ) -> Result<RdtManager, RdtError> {
        config.validate()?;
        let path = path.into();
        if !self.fs.exists(&path) {
            return Err(RdtError::fs(
                "attach group",
                path,
                io::Error::from(io::ErrorKind::NotFound),
            ));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_default();

        let mut groups = self.registry.lock();
        match groups.get_mut(&name) {
            Some(entry) => entry.refs += 1,
            None => {
                groups.insert(
                    name.clone(),
                    GroupEntry {
                        path: path.clone(),
                        refs: 1,
                        owned: config.clos_id.is_empty(),
                    },
                );
                RDT_ACTIVE_GROUPS.inc();
            }
        }
        drop(groups);

        debug!(group = %name, path = %path.display(), "attached to existing group");
        Ok(RdtManager {
            ctx: self.clone(),
            name,
            path,
            state: Mutex::new(ManagerState { config, bound: true }),
        })
    }
}

/// What [`RdtManager::apply`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing configured; the process stays in the default group
    Unmanaged,
    /// Created the group and wrote its schemata
    Created,
    /// Joined a group that already existed
    Joined,
    /// Added another process to the group this manager already holds
    Added,
}

struct ManagerState {
    config: IntelRdtConfig,
    /// Holds a reference in the registry
    bound: bool,
}

/// Intel RDT manager for a single container
pub struct RdtManager {
    ctx: RdtContext,
    name: String,
    path: PathBuf,
    state: Mutex<ManagerState>,
}

impl RdtManager {
    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Group directory; empty when resctrl is not mounted
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Group directory name (the ClosID for shared groups)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> IntelRdtConfig {
        self.lock_state().config.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.lock_state().bound
    }

    /// Put `pid` into this container's allocation class
    ///
    /// The first call binds the manager to its group, creating the group
    /// if needed. Later calls only add the pid. An empty config is a no-op
    /// and leaves the process in the default group.
    pub fn apply(&self, pid: libc::pid_t) -> Result<ApplyOutcome, RdtError> {
        let mut state = self.lock_state();

        if !state.config.is_configured() {
            debug!(pid, "no Intel RDT config, leaving process in the default group");
            return Ok(ApplyOutcome::Unmanaged);
        }
        state.config.validate()?;
        if pid <= 0 {
            return Err(RdtError::InvalidPid { pid, source: None });
        }

        if state.bound {
            self.add_task(pid)?;
            return Ok(ApplyOutcome::Added);
        }

        if !self.ctx.is_enabled() {
            return Err(RdtError::Unsupported("resctrl filesystem is not mounted".to_string()));
        }
        validate_group_name(&self.name).map_err(|reason| RdtError::InvalidClosId {
            clos_id: self.name.clone(),
            reason,
        })?;

        let mut groups = self.ctx.registry.lock();

        if let Some(entry) = groups.get_mut(&self.name) {
            self.verify_group(&state.config)?;
            self.add_task(pid)?;
            entry.refs += 1;
            state.bound = true;
            info!(group = %self.name, pid, refs = entry.refs, "joined shared group");
            return Ok(ApplyOutcome::Joined);
        }

        if !state.config.clos_id.is_empty() && self.ctx.fs.exists(&self.path) {
            // Pre-existing group: use it, never write or remove it
            self.verify_group(&state.config)?;
            self.add_task(pid)?;
            groups.insert(
                self.name.clone(),
                GroupEntry {
                    path: self.path.clone(),
                    refs: 1,
                    owned: false,
                },
            );
            RDT_ACTIVE_GROUPS.inc();
            state.bound = true;
            info!(group = %self.name, pid, "joined pre-existing group");
            return Ok(ApplyOutcome::Joined);
        }

        if !state.config.has_schema() {
            return Err(RdtError::ClosNotFound(state.config.clos_id.clone()));
        }
        state.config.check_supported(self.ctx.resolver())?;

        self.create_group(&state.config, pid)?;
        groups.insert(
            self.name.clone(),
            GroupEntry {
                path: self.path.clone(),
                refs: 1,
                owned: true,
            },
        );
        RDT_ACTIVE_GROUPS.inc();
        state.bound = true;
        info!(group = %self.name, path = %self.path.display(), pid, "created group");
        Ok(ApplyOutcome::Created)
    }

    /// Update the policy of the group this manager holds
    ///
    /// A group held only by this manager is rewritten and read back. A
    /// shared or pre-existing group is left as is; the request only has to
    /// be equivalent to what is already in force.
    pub fn set(&self, config: &IntelRdtConfig) -> Result<(), RdtError> {
        config.validate()?;
        let mut state = self.lock_state();
        if !state.bound {
            return Err(RdtError::NotApplied);
        }
        if config.clos_id != state.config.clos_id {
            return Err(RdtError::InvalidClosId {
                clos_id: config.clos_id.clone(),
                reason: "ClosID cannot change once the group is applied",
            });
        }
        config.check_supported(self.ctx.resolver())?;

        let groups = self.ctx.registry.lock();
        let shared = groups.get(&self.name).map(GroupEntry::is_shared).unwrap_or(false);
        if shared {
            self.verify_group(config)?;
        } else {
            self.write_schemata(config)?;
        }
        drop(groups);

        state.config = config.clone();
        Ok(())
    }

    /// Give up this manager's hold on its group
    ///
    /// The last holder of a group this process created removes the
    /// directory. If the rmdir fails the hold is kept and the call can be
    /// retried. Once released, calling it again is a no-op.
    pub fn destroy(&self) -> Result<(), RdtError> {
        let mut state = self.lock_state();
        if !state.bound {
            return Ok(());
        }

        let mut groups = self.ctx.registry.lock();
        let Some(entry) = groups.get_mut(&self.name) else {
            state.bound = false;
            return Ok(());
        };
        if entry.refs > 1 {
            entry.refs -= 1;
            state.bound = false;
            debug!(group = %self.name, refs = entry.refs, "released shared group");
            return Ok(());
        }

        // Last holder: the entry stays until the directory is gone
        if entry.owned {
            match self.ctx.fs.remove_dir(&entry.path) {
                Ok(()) => {
                    RDT_GROUPS_REMOVED.inc();
                    info!(group = %self.name, path = %entry.path.display(), "removed group");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(group = %self.name, "group directory already gone");
                }
                Err(e) => {
                    warn!(group = %self.name, error = %e, "failed to remove group");
                    return Err(RdtError::fs("remove group", entry.path.clone(), e));
                }
            }
        } else {
            debug!(group = %self.name, "last holder left, group not ours so it stays");
        }

        groups.remove(&self.name);
        RDT_ACTIVE_GROUPS.dec();
        state.bound = false;
        Ok(())
    }

    /// Usage and capability snapshot for this container's group
    pub fn stats(&self) -> Result<RdtStats, RdtError> {
        if !self.is_bound() {
            return Err(RdtError::NotApplied);
        }
        read_stats(self.ctx.fs.as_ref(), self.ctx.resolver(), &self.path)
    }

    fn create_group(&self, config: &IntelRdtConfig, pid: libc::pid_t) -> Result<(), RdtError> {
        self.ctx
            .fs
            .create_dir(&self.path)
            .map_err(|e| RdtError::fs("create group", &self.path, e))?;
        RDT_GROUPS_CREATED.inc();

        let result = self.write_schemata(config).and_then(|()| self.add_task(pid));
        if let Err(e) = result {
            match self.ctx.fs.remove_dir(&self.path) {
                Ok(()) => {
                    RDT_GROUPS_REMOVED.inc();
                }
                Err(rm) => warn!(
                    path = %self.path.display(),
                    error = %rm,
                    "failed to remove group after failed setup"
                ),
            }
            return Err(e);
        }
        Ok(())
    }

    /// Compose, write, read back and verify the group's schemata
    fn write_schemata(&self, config: &IntelRdtConfig) -> Result<(), RdtError> {
        if !config.has_schema() {
            return Ok(());
        }

        let file = self.path.join(SCHEMATA);
        let existing = read_or_empty(self.ctx.fs.as_ref(), &file)
            .map_err(|e| RdtError::fs("read schemata", &file, e))?;
        let composed = compose(&existing, &config.fragments())?;

        self.ctx
            .fs
            .write_file(&file, &composed)
            .map_err(|e| RdtError::fs("write schemata", &file, e))?;
        RDT_SCHEMA_WRITES.inc();
        debug!(group = %self.name, schemata = composed.trim_end(), "wrote schemata");

        let applied = self
            .ctx
            .fs
            .read_file(&file)
            .map_err(|e| RdtError::fs("read schemata", &file, e))?;
        check_schemata_match(&composed, &applied).map_err(|e| self.mismatch("write", e))
    }

    /// Check that `config` is already in force without writing anything
    fn verify_group(&self, config: &IntelRdtConfig) -> Result<(), RdtError> {
        if !config.has_schema() {
            return Ok(());
        }

        let file = self.path.join(SCHEMATA);
        let existing = self
            .ctx
            .fs
            .read_file(&file)
            .map_err(|e| RdtError::fs("read schemata", &file, e))?;
        let requested = compose(&existing, &config.fragments())?;
        check_schemata_match(&requested, &existing).map_err(|e| self.mismatch("join", e))
    }

    fn mismatch(&self, stage: &str, e: SchemaError) -> RdtError {
        if let SchemaError::Mismatch(m) = &e {
            RDT_SCHEMA_MISMATCHES.with_label_values(&[stage]).inc();
            warn!(
                group = %self.name,
                stage,
                detail = %m.detail,
                "schemata not in force as requested"
            );
        }
        e.into()
    }

    fn add_task(&self, pid: libc::pid_t) -> Result<(), RdtError> {
        let tasks = self.path.join(TASKS);
        self.ctx
            .fs
            .append_file(&tasks, &format!("{}\n", pid))
            .map_err(|e| RdtError::from_task_write(pid, &tasks, e))
    }
}

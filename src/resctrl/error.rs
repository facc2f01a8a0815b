use std::fmt;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;

use crate::schema::SchemaError;

/// Error type for resctrl group operations
#[derive(Debug)]
pub enum RdtError {
    /// Configured schema is malformed, or the kernel did not accept it as written
    Schema(SchemaError),
    /// The kernel refused to attach the pid (already exited, kernel thread, ...)
    InvalidPid {
        pid: libc::pid_t,
        source: Option<io::Error>,
    },
    /// resctrl is not mounted, or a configured resource is not available
    Unsupported(String),
    /// A ClosID was given with no schema and no such group exists
    ClosNotFound(String),
    /// ClosID is not usable as a group directory name
    InvalidClosId { clos_id: String, reason: &'static str },
    /// `set` was called before the manager was bound to a group
    NotApplied,
    /// A filesystem primitive failed
    Fs {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

impl RdtError {
    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        RdtError::Fs {
            op,
            path: path.into(),
            source,
        }
    }

    /// Map a failed write to `tasks`
    ///
    /// ESRCH and EINVAL are what the kernel returns for a pid it cannot
    /// move; anything else is an ordinary filesystem error.
    pub(crate) fn from_task_write(
        pid: libc::pid_t,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        match source.raw_os_error().map(Errno::from_i32) {
            Some(Errno::ESRCH) | Some(Errno::EINVAL) => RdtError::InvalidPid {
                pid,
                source: Some(source),
            },
            _ => RdtError::fs("write tasks", path, source),
        }
    }

    /// True for errors the caller can reasonably recover from
    pub fn is_invalid_pid(&self) -> bool {
        matches!(self, RdtError::InvalidPid { .. })
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, RdtError::Schema(SchemaError::Mismatch(_)))
    }
}

impl fmt::Display for RdtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdtError::Schema(e) => write!(f, "intelrdt: {}", e),
            RdtError::InvalidPid { pid, .. } => write!(f, "intelrdt: cannot attach pid {}", pid),
            RdtError::Unsupported(what) => write!(f, "intelrdt: {}", what),
            RdtError::ClosNotFound(id) => write!(
                f,
                "intelrdt: ClosID {:?} has no schema configured and no existing group",
                id
            ),
            RdtError::InvalidClosId { clos_id, reason } => {
                write!(f, "intelrdt: invalid ClosID {:?}: {}", clos_id, reason)
            }
            RdtError::NotApplied => write!(f, "intelrdt: no group has been applied yet"),
            RdtError::Fs { op, path, source } => {
                write!(f, "intelrdt: {} {}: {}", op, path.display(), source)
            }
        }
    }
}

impl std::error::Error for RdtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RdtError::Schema(e) => Some(e),
            RdtError::InvalidPid { source: Some(e), .. } => Some(e),
            RdtError::Fs { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SchemaError> for RdtError {
    fn from(e: SchemaError) -> Self {
        RdtError::Schema(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_write_errno_mapping() {
        let esrch = io::Error::from_raw_os_error(libc::ESRCH);
        assert!(RdtError::from_task_write(42, "/tasks", esrch).is_invalid_pid());

        let einval = io::Error::from_raw_os_error(libc::EINVAL);
        assert!(RdtError::from_task_write(42, "/tasks", einval).is_invalid_pid());

        let eacces = io::Error::from_raw_os_error(libc::EACCES);
        assert!(matches!(
            RdtError::from_task_write(42, "/tasks", eacces),
            RdtError::Fs { op: "write tasks", .. }
        ));
    }

    #[test]
    fn test_display_includes_path() {
        let err = RdtError::fs(
            "create group",
            "/sys/fs/resctrl/clos",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("/sys/fs/resctrl/clos"));
    }
}

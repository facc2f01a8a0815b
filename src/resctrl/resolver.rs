//! Locating the resctrl filesystem and what it supports
//!
//! ```text
//! /sys/fs/resctrl/                ← resctrl root (default group)
//! ├── info/
//! │   ├── L3/                     ← present when cache allocation works
//! │   ├── MB/                     ← present when bandwidth allocation works
//! │   └── L3_MON/                 ← present when monitoring works
//! ├── schemata
//! ├── tasks
//! └── my-clos/                    ← one directory per allocation class
//!     ├── schemata
//!     └── tasks
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Magic number reported by statfs(2) for a resctrl mount
const RDTGROUP_SUPER_MAGIC: i64 = 0x7655821;

const MOUNTINFO: &str = "/proc/self/mountinfo";

/// Optional resctrl capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Cache allocation (CAT), `info/L3` or `info/L3_CODE`
    CacheAllocation,
    /// Memory bandwidth allocation (MBA), `info/MB`
    BandwidthAllocation,
    /// Cache/bandwidth monitoring (CMT/MBM), `info/L3_MON`
    Monitoring,
}

/// Set of supported [`Feature`]s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub cache_allocation: bool,
    pub bandwidth_allocation: bool,
    pub monitoring: bool,
}

impl Features {
    pub fn all() -> Self {
        Self {
            cache_allocation: true,
            bandwidth_allocation: true,
            monitoring: true,
        }
    }

    pub fn contains(&self, feature: Feature) -> bool {
        match feature {
            Feature::CacheAllocation => self.cache_allocation,
            Feature::BandwidthAllocation => self.bandwidth_allocation,
            Feature::Monitoring => self.monitoring,
        }
    }

    /// Probe the `info/` directory under a resctrl root
    pub fn probe(root: &Path) -> Self {
        let info = root.join("info");
        Self {
            cache_allocation: info.join("L3").is_dir() || info.join("L3_CODE").is_dir(),
            bandwidth_allocation: info.join("MB").is_dir(),
            monitoring: info.join("L3_MON").is_dir(),
        }
    }
}

/// Where the resctrl root is and which features it offers
pub trait RdtResolver: Send + Sync {
    /// The resctrl mount point, `None` when not mounted
    fn root_path(&self) -> Option<&Path>;
    fn is_supported(&self, feature: Feature) -> bool;
}

/// Resolver with a fixed root and feature set
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    root: Option<PathBuf>,
    features: Features,
}

impl StaticResolver {
    pub fn new(root: impl Into<PathBuf>, features: Features) -> Self {
        Self {
            root: Some(root.into()),
            features,
        }
    }

    /// resctrl not available on this host
    pub fn unsupported() -> Self {
        Self::default()
    }

    /// Find the resctrl mount via `/proc/self/mountinfo`
    ///
    /// A host without a resctrl mount is not an error; it yields
    /// [`StaticResolver::unsupported`].
    pub fn discover() -> io::Result<Self> {
        let mountinfo = fs::read_to_string(MOUNTINFO)?;
        let Some(root) = find_resctrl_mount(&mountinfo) else {
            debug!("resctrl is not mounted");
            return Ok(Self::unsupported());
        };

        if !is_resctrl_mount(&root) {
            debug!(root = %root.display(), "mount point does not report the resctrl magic");
            return Ok(Self::unsupported());
        }

        let features = Features::probe(&root);
        info!(
            root = %root.display(),
            cat = features.cache_allocation,
            mba = features.bandwidth_allocation,
            monitoring = features.monitoring,
            "resctrl filesystem found"
        );
        Ok(Self::new(root, features))
    }
}

impl RdtResolver for StaticResolver {
    fn root_path(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn is_supported(&self, feature: Feature) -> bool {
        self.root.is_some() && self.features.contains(feature)
    }
}

fn is_resctrl_mount(root: &Path) -> bool {
    match nix::sys::statfs::statfs(root) {
        Ok(st) => st.filesystem_type().0 as i64 == RDTGROUP_SUPER_MAGIC,
        Err(_) => false,
    }
}

/// Pick the mount point of the first `resctrl` entry in mountinfo text
///
/// Each line reads
///
/// ```text
/// <id> <parent> <maj:min> <root> <mount point> <opts> [optional...]
///     - <fstype> <source> <super opts>
/// ```
pub fn find_resctrl_mount(mountinfo: &str) -> Option<PathBuf> {
    mountinfo.lines().find_map(|line| {
        let (pre, post) = line.split_once(" - ")?;
        let fstype = post.split_whitespace().next()?;
        if fstype != "resctrl" {
            return None;
        }
        let mount_point = pre.split_whitespace().nth(4)?;
        Some(PathBuf::from(unescape_mount_path(mount_point)))
    })
}

// mountinfo escapes space, tab, newline and backslash as \ooo
fn unescape_mount_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(Ok(code)) = raw.get(i + 1..i + 4).map(|oct| u8::from_str_radix(oct, 8)) {
                out.push(code);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTINFO_SAMPLE: &str = "\
22 28 0:21 / /proc rw,nosuid,nodev,noexec,relatime shared:13 - proc proc rw
25 28 0:23 / /sys/fs/cgroup rw,nosuid,nodev,noexec,relatime shared:4 - cgroup2 cgroup2 rw
40 24 0:35 / /sys/fs/resctrl rw,relatime shared:21 - resctrl resctrl rw,mba_MBps
";

    #[test]
    fn test_find_resctrl_mount() {
        assert_eq!(
            find_resctrl_mount(MOUNTINFO_SAMPLE),
            Some(PathBuf::from("/sys/fs/resctrl"))
        );
        assert_eq!(find_resctrl_mount("22 28 0:21 / /proc rw - proc proc rw\n"), None);
    }

    #[test]
    fn test_find_resctrl_mount_escaped_path() {
        let line = "40 24 0:35 / /mnt/rdt\\040root rw - resctrl resctrl rw\n";
        assert_eq!(find_resctrl_mount(line), Some(PathBuf::from("/mnt/rdt root")));
    }

    #[test]
    fn test_probe_features() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("info/L3_CODE")).unwrap();
        fs::create_dir_all(dir.path().join("info/L3_MON")).unwrap();

        let features = Features::probe(dir.path());
        assert!(features.cache_allocation);
        assert!(!features.bandwidth_allocation);
        assert!(features.monitoring);
    }

    #[test]
    fn test_unsupported_resolver() {
        let resolver = StaticResolver::unsupported();
        assert!(resolver.root_path().is_none());
        assert!(!resolver.is_supported(Feature::CacheAllocation));

        let resolver = StaticResolver::new("/sys/fs/resctrl", Features::all());
        assert!(resolver.is_supported(Feature::BandwidthAllocation));
    }
}

//! In-memory resctrl filesystem for lifecycle tests
//!
//! Behaves like the kernel where it matters to the manager: mkdir is
//! exclusive and fills in a default `schemata`, rmdir drops the group's
//! files, and writes to `tasks` can be made to fail with ESRCH. Kernel
//! merging of partial `schemata` writes and rmdir failures are opt-in.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rdtvisor::resctrl::{ControlFs, Features, RdtContext, StaticResolver};
use rdtvisor::schema::{ResourceTag, SchemaLine};

pub const ROOT: &str = "/sys/fs/resctrl";
pub const DEFAULT_SCHEMATA: &str = "    L3:0=fff;1=fff\n    MB:0=100;1=100\n";

type Rewrite = Box<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Default)]
struct State {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, String>,
    schemata_writes: usize,
    mkdirs: usize,
    rejected_pids: HashSet<i32>,
    rewrite: Option<Rewrite>,
    merge_writes: bool,
    rmdir_errors: Vec<i32>,
}

#[derive(Default)]
pub struct MemFs {
    state: Mutex<State>,
}

impl MemFs {
    pub fn new() -> Arc<Self> {
        let fs = Self::default();
        {
            let mut state = fs.state.lock().unwrap();
            state.dirs.insert(PathBuf::from(ROOT));
            state
                .files
                .insert(Path::new(ROOT).join("schemata"), DEFAULT_SCHEMATA.to_string());
        }
        Arc::new(fs)
    }

    /// Make the kernel refuse to move `pid`
    pub fn reject_pid(&self, pid: i32) {
        self.state.lock().unwrap().rejected_pids.insert(pid);
    }

    /// Transform everything written to a `schemata` file, like firmware clamping
    pub fn rewrite_schemata(&self, f: impl Fn(&str) -> String + Send + Sync + 'static) {
        self.state.lock().unwrap().rewrite = Some(Box::new(f));
    }

    /// Keep domains and lines a `schemata` write leaves out, as the kernel does
    pub fn merge_partial_writes(&self) {
        self.state.lock().unwrap().merge_writes = true;
    }

    /// Make the next rmdir fail with `errno`
    pub fn fail_next_rmdir(&self, errno: i32) {
        self.state.lock().unwrap().rmdir_errors.push(errno);
    }

    /// Create a group as if some other tool had done it
    pub fn precreate_group(&self, name: &str, schemata: &str) {
        let dir = Path::new(ROOT).join(name);
        let mut state = self.state.lock().unwrap();
        state.files.insert(dir.join("schemata"), schemata.to_string());
        state.dirs.insert(dir);
    }

    pub fn schemata_writes(&self) -> usize {
        self.state.lock().unwrap().schemata_writes
    }

    pub fn mkdirs(&self) -> usize {
        self.state.lock().unwrap().mkdirs
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn tasks(&self, group: &str) -> Vec<String> {
        self.contents(&Path::new(ROOT).join(group).join("tasks"))
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(&Path::new(ROOT).join(group))
    }
}

fn not_found() -> io::Error {
    io::Error::from(io::ErrorKind::NotFound)
}

// Overlay each written line's domains onto the previous line of its tag
fn merge_schemata(previous: &str, written: &str) -> String {
    let mut lines: BTreeMap<ResourceTag, SchemaLine> = BTreeMap::new();
    for raw in previous.lines().chain(written.lines()) {
        let Ok(line) = SchemaLine::parse(raw) else {
            continue;
        };
        match lines.get_mut(&line.tag) {
            Some(held) => held.domains.extend(line.domains),
            None => {
                lines.insert(line.tag.clone(), line);
            }
        }
    }
    lines.values().map(|line| format!("{}\n", line)).collect()
}

impl ControlFs for MemFs {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.state.lock().unwrap().files.get(path).cloned().ok_or_else(not_found)
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !path.parent().map(|p| state.dirs.contains(p)).unwrap_or(false) {
            return Err(not_found());
        }
        let contents = if path.file_name().and_then(|n| n.to_str()) == Some("schemata") {
            state.schemata_writes += 1;
            let contents = match state.files.get(path) {
                Some(previous) if state.merge_writes => merge_schemata(previous, contents),
                _ => contents.to_string(),
            };
            match &state.rewrite {
                Some(rewrite) => rewrite(&contents),
                None => contents,
            }
        } else {
            contents.to_string()
        };
        state.files.insert(path.to_path_buf(), contents);
        Ok(())
    }

    fn append_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !path.parent().map(|p| state.dirs.contains(p)).unwrap_or(false) {
            return Err(not_found());
        }
        if let Ok(pid) = contents.trim().parse::<i32>() {
            if state.rejected_pids.contains(&pid) {
                return Err(io::Error::from_raw_os_error(libc::ESRCH));
            }
        }
        state
            .files
            .entry(path.to_path_buf())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.dirs.contains(path) {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        if !path.parent().map(|p| state.dirs.contains(p)).unwrap_or(false) {
            return Err(not_found());
        }
        state.mkdirs += 1;
        state.dirs.insert(path.to_path_buf());
        state
            .files
            .insert(path.join("schemata"), DEFAULT_SCHEMATA.to_string());
        state.files.insert(path.join("tasks"), String::new());
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(errno) = state.rmdir_errors.pop() {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if !state.dirs.remove(path) {
            return Err(not_found());
        }
        state.files.retain(|file, _| !file.starts_with(path));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        state.dirs.contains(path) || state.files.contains_key(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if !state.dirs.contains(path) {
            return Err(not_found());
        }
        let children = state
            .dirs
            .iter()
            .chain(state.files.keys())
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect::<BTreeSet<_>>();
        Ok(children.into_iter().collect())
    }
}

/// Context over a fresh [`MemFs`] with every feature enabled
pub fn mem_context() -> (Arc<MemFs>, RdtContext) {
    let fs = MemFs::new();
    let resolver = StaticResolver::new(ROOT, Features::all());
    let ctx = RdtContext::new(fs.clone(), Arc::new(resolver));
    (fs, ctx)
}

//! Filesystem primitives the manager is built on
//!
//! The manager never touches `std::fs` directly; it goes through
//! [`ControlFs`] so tests can run against a temp dir or an in-memory fake,
//! and so a runtime can route writes through its own helpers.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Minimal file operations over the control filesystem
///
/// `create_dir` is not expected to be idempotent; callers check
/// [`ControlFs::exists`] first. `append_file` is used for `tasks`, where
/// the kernel adds each written pid to the group.
pub trait ControlFs: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<String>;
    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()>;
    fn append_file(&self, path: &Path, contents: &str) -> io::Result<()>;
    fn create_dir(&self, path: &Path) -> io::Result<()>;
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Names of the entries directly under `path`
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;
}

/// [`ControlFs`] backed by the host filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFs;

impl ControlFs for HostFs {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn append_file(&self, path: &Path, contents: &str) -> io::Result<()> {
        // One write(2) per call: the kernel parses each write as a pid list
        let mut file = fs::OpenOptions::new().append(true).create(true).open(path)?;
        file.write_all(contents.as_bytes())
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        // mkdir, not mkdir -p: the parent is the resctrl root
        fs::create_dir(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        // rmdir (not rm -rf) - the kernel requires this
        fs::remove_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Read a file, treating "not found" as empty
pub fn read_or_empty(fs: &dyn ControlFs, path: &Path) -> io::Result<String> {
    match fs.read_file(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

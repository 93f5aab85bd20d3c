//! Index of executables found on `PATH` and the super-user paths.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// One immutable generation of the index: command name -> directory.
#[derive(Debug, Default, Clone)]
pub struct Table {
    pub system: HashMap<String, PathBuf>,
    pub super_user: HashMap<String, PathBuf>,
}

impl Table {
    /// Scan `path_var` (a `PATH`-style list) and `super_user` directories.
    ///
    /// Directories are scanned last to first, so when two directories hold
    /// the same name the one listed first wins, as in a normal `PATH` lookup.
    pub fn build(path_var: &OsStr, super_user: &[PathBuf]) -> Table {
        let dirs: Vec<PathBuf> = std::env::split_paths(path_var).collect();
        Table {
            system: scan(dirs.iter().rev()),
            super_user: scan(super_user.iter().rev()),
        }
    }

    /// Full path of `name`, preferring the regular search path.
    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        self.system
            .get(name)
            .or_else(|| self.super_user.get(name))
            .map(|dir| dir.join(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.system
            .keys()
            .chain(self.super_user.keys())
            .map(|s| s.as_str())
    }
}

fn scan<'a>(dirs: impl Iterator<Item = &'a PathBuf>) -> HashMap<String, PathBuf> {
    let mut found = HashMap::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_executable(&entry.path()) {
                found.insert(name, dir.clone());
            }
        }
    }
    found
}

/// A regular file (after following links) with an execute bit set.
pub fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Shared, rebuildable index.
///
/// Readers take a snapshot (`Arc<Table>`) and never see a half-built table;
/// [`ExecutableIndex::rebuild`] builds the new table first and swaps it in.
#[derive(Debug, Default)]
pub struct ExecutableIndex {
    table: RwLock<Arc<Table>>,
}

impl ExecutableIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Table> {
        match self.table.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn rebuild(&self, path_var: &OsStr, super_user: &[PathBuf]) {
        let table = Arc::new(Table::build(path_var, super_user));
        log::info!(
            "rehash: {} commands, {} super-user commands",
            table.system.len(),
            table.super_user.len()
        );
        match self.table.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        self.snapshot().lookup(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn make_exe(dir: &Path, name: &str) {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn first_path_entry_wins() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        make_exe(a.path(), "tool");
        make_exe(b.path(), "tool");
        make_exe(b.path(), "other");
        let path_var = std::env::join_paths([a.path(), b.path()]).unwrap();
        let table = Table::build(&path_var, &[]);
        assert_eq!(table.lookup("tool"), Some(a.path().join("tool")));
        assert_eq!(table.lookup("other"), Some(b.path().join("other")));
    }

    #[test]
    fn skips_non_executables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        let table = Table::build(dir.path().as_os_str(), &[]);
        assert!(table.lookup("data.txt").is_none());
        assert!(table.lookup("subdir").is_none());
    }

    #[test]
    fn super_user_paths_indexed_separately() {
        let dir = tempfile::tempdir().unwrap();
        make_exe(dir.path(), "adminctl");
        let table = Table::build(&OsString::new(), &[dir.path().to_path_buf()]);
        assert!(table.system.is_empty());
        assert_eq!(table.lookup("adminctl"), Some(dir.path().join("adminctl")));
    }

    #[test]
    fn snapshot_survives_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        make_exe(dir.path(), "first");
        let index = ExecutableIndex::new();
        index.rebuild(dir.path().as_os_str(), &[]);
        let old = index.snapshot();
        make_exe(dir.path(), "second");
        index.rebuild(dir.path().as_os_str(), &[]);
        assert!(old.lookup("second").is_none());
        assert!(index.lookup("second").is_some());
    }
}

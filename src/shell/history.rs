//! Command history, persisted as JSON lines.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Seconds since the Unix epoch.
    pub time: u64,
    pub line: String,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<Entry>,
    max_size: usize,
    path: Option<PathBuf>,
}

impl History {
    pub fn new(path: Option<PathBuf>, max_size: usize) -> Self {
        History {
            entries: Vec::new(),
            max_size,
            path,
        }
    }

    /// Read the history file, skipping lines that do not parse.
    pub fn load(&mut self) {
        let Some(path) = &self.path else {
            return;
        };
        let Ok(content) = std::fs::read_to_string(path) else {
            return;
        };
        self.entries = content
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        self.trim();
    }

    /// Rewrite the history file. Does nothing without a path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = std::fs::File::create(path)?;
        for entry in &self.entries {
            let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    /// Record a line; blank lines and repeats of the last entry are skipped.
    pub fn push(&mut self, line: &str) {
        let line = line.trim_end();
        if line.trim().is_empty() || self.entries.last().is_some_and(|e| e.line == line) {
            return;
        }
        self.entries.push(Entry {
            time: now(),
            line: line.to_string(),
        });
        self.trim();
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.trim();
    }

    fn trim(&mut self) {
        if self.entries.len() > self.max_size {
            let excess = self.entries.len() - self.max_size;
            self.entries.drain(..excess);
        }
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// UTC `YYYY-MM-DD HH:MM:SS` for a history timestamp.
pub fn format_time(secs: u64) -> String {
    let days = secs / 86400;
    let rem = secs % 86400;
    let h = rem / 3600;
    let m = (rem % 3600) / 60;
    let s = rem % 60;
    let (year, month, day) = epoch_days_to_date(days);
    format!("{year:04}-{month:02}-{day:02} {h:02}:{m:02}:{s:02}")
}

/// Convert days since Unix epoch to (year, month, day).
fn epoch_days_to_date(days: u64) -> (u64, u64, u64) {
    // Civil calendar from days algorithm (Howard Hinnant)
    let z = days + 719468;
    let era = z / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_and_repeated() {
        let mut h = History::new(None, 10);
        h.push("ls");
        h.push("ls");
        h.push("   ");
        h.push("pwd");
        let lines: Vec<&str> = h.entries().iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["ls", "pwd"]);
    }

    #[test]
    fn bounded() {
        let mut h = History::new(None, 2);
        for line in ["a", "b", "c"] {
            h.push(line);
        }
        let lines: Vec<&str> = h.entries().iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["b", "c"]);
        h.set_max_size(1);
        assert_eq!(h.entries().len(), 1);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/history");
        let mut h = History::new(Some(path.clone()), 10);
        h.push("echo one");
        h.push("echo two");
        h.save().unwrap();

        let mut loaded = History::new(Some(path), 10);
        loaded.load();
        assert_eq!(loaded.entries(), h.entries());
    }

    #[test]
    fn known_dates() {
        assert_eq!(format_time(0), "1970-01-01 00:00:00");
        assert_eq!(format_time(951_782_400), "2000-02-29 00:00:00");
    }
}

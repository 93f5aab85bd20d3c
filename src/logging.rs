use std::path::PathBuf;

use simplelog::{LevelFilter, WriteLogger};

/// Default level when `JOBSH_LOG` is unset or unparseable.
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Warn;

/// Install a file logger appending to ~/.local/share/jobsh/jobsh.log.
/// Best-effort: failures are silently ignored (logging must never stop the shell).
pub fn init() {
    let level = level_from(std::env::var("JOBSH_LOG").ok().as_deref());
    if level == LevelFilter::Off {
        return;
    }
    let Some(path) = log_path() else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    else {
        return;
    };
    let _ = WriteLogger::init(level, simplelog::Config::default(), file);
}

fn log_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".local/share/jobsh/jobsh.log"))
}

fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_LEVEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(level_from(None), LevelFilter::Warn);
        assert_eq!(level_from(Some("debug")), LevelFilter::Debug);
        assert_eq!(level_from(Some("INFO")), LevelFilter::Info);
        assert_eq!(level_from(Some("off")), LevelFilter::Off);
        assert_eq!(level_from(Some("loud")), LevelFilter::Warn);
    }
}

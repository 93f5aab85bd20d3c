//! Process environment updates.
//!
//! The environment is process-global. Only the shell's main thread calls
//! these; builtins running on worker threads are refused before they get here.

use std::ffi::OsStr;

pub fn set(name: impl AsRef<OsStr>, value: impl AsRef<OsStr>) {
    // SAFETY: called from the shell's main thread only.
    unsafe { std::env::set_var(name, value) }
}

pub fn unset(name: impl AsRef<OsStr>) {
    // SAFETY: called from the shell's main thread only.
    unsafe { std::env::remove_var(name) }
}

/// A usable environment variable name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['=', '\0'])
}

/// Export the session variables of an interactive shell: bump
/// `JOBSH_LEVEL`, and fill in `SHELL` and `PWD` when missing.
pub fn export_session() {
    let level = std::env::var("JOBSH_LEVEL")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    set("JOBSH_LEVEL", (level + 1).to_string());
    if std::env::var_os("SHELL").is_none()
        && let Ok(exe) = std::env::current_exe()
    {
        set("SHELL", exe);
    }
    if std::env::var_os("PWD").is_none()
        && let Ok(cwd) = std::env::current_dir()
    {
        set("PWD", cwd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(is_valid_name("PATH"));
        assert!(is_valid_name("my_var2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("A=B"));
    }
}

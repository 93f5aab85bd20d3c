use std::path::{Path, PathBuf};

use super::{Builtin, Invocation};
use crate::error::{Result, ShellError};
use crate::shell::environ;

/// `cd [DIR | - | =N]`
pub struct Cd;

impl Builtin for Cd {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let args = inv.expect_args(0, 1)?;
        let arg = args.first().map(String::as_str);
        let shell = inv.shell()?;
        let state = shell.state_mut();

        let target: PathBuf = match arg {
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| ShellError::usage("cd: HOME not set"))?,
            Some("-") => state
                .previous_dir
                .clone()
                .ok_or_else(|| ShellError::usage("cd: no previous directory"))?,
            Some(entry) if entry.starts_with('=') => entry[1..]
                .parse::<usize>()
                .ok()
                .and_then(|n| state.dir_at(n))
                .map(Path::to_path_buf)
                .ok_or_else(|| ShellError::usage(format!("cd: {entry}: no such directory stack entry")))?,
            Some(dir) => PathBuf::from(dir),
        };

        let old = std::env::current_dir().ok();
        std::env::set_current_dir(&target)
            .map_err(|e| ShellError::usage(format!("cd: {}: {e}", target.display())))?;
        let cwd = std::env::current_dir()?;
        environ::set("PWD", &cwd);
        if let Some(old) = &old {
            environ::set("OLDPWD", old);
        }
        state.previous_dir = old;
        state.push_dir(cwd.clone());

        if arg == Some("-") {
            writeln!(inv.out(), "{}", cwd.display())?;
        }
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "cd [DIR | - | =N]"
    }

    fn summary(&self) -> &'static str {
        "Change directory: HOME without arguments, the previous directory for -, \
         entry N of the directory stack for =N."
    }
}

/// `dirs [--no-index] [--escape]`
pub struct Dirs;

impl Builtin for Dirs {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let mut index = true;
        let mut escape = false;
        for arg in inv.args() {
            match arg.as_str() {
                "--no-index" => index = false,
                "--escape" => escape = true,
                other => return Err(ShellError::usage(format!("dirs: unknown option {other}"))),
            }
        }

        let home = std::env::var_os("HOME").map(PathBuf::from);
        let entries: Vec<String> = inv
            .state()
            .dir_stack
            .iter()
            .rev()
            .map(|dir| compact_home(dir, home.as_deref()))
            .collect();

        for (i, entry) in entries.into_iter().enumerate() {
            let text = if escape {
                shlex::try_quote(&entry).map_or_else(|_| entry.clone(), |q| q.into_owned())
            } else {
                entry
            };
            if index {
                writeln!(inv.out(), "{i:>3}  {text}")?;
            } else {
                writeln!(inv.out(), "{text}")?;
            }
        }
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "dirs [--no-index] [--escape]"
    }

    fn summary(&self) -> &'static str {
        "List visited directories, newest first."
    }
}

/// `path` with a leading `home` written as `~`.
fn compact_home(path: &Path, home: Option<&Path>) -> String {
    if let Some(home) = home
        && let Ok(rest) = path.strip_prefix(home)
    {
        if rest.as_os_str().is_empty() {
            return "~".to_string();
        }
        return format!("~/{}", rest.display());
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn compacts_home() {
        let home = Path::new("/home/user");
        assert_eq!(compact_home(Path::new("/home/user"), Some(home)), "~");
        assert_eq!(compact_home(Path::new("/home/user/src"), Some(home)), "~/src");
        assert_eq!(compact_home(Path::new("/home/username"), Some(home)), "/home/username");
        assert_eq!(compact_home(Path::new("/tmp"), None), "/tmp");
    }

    #[test]
    fn lists_newest_first() {
        let mut s = state();
        s.dir_stack = vec!["/opt/one".into(), "/opt/two words".into()];
        let (_, out) = run(&mut s, "dirs");
        assert_eq!(out, "  0  /opt/two words\n  1  /opt/one\n");
        let (_, out) = run(&mut s, "dirs --no-index --escape");
        assert_eq!(out, "'/opt/two words'\n/opt/one\n");
    }

    #[test]
    fn cd_needs_the_shell() {
        let mut s = state();
        let (result, _) = run(&mut s, "cd /");
        assert!(result.is_err());
    }
}

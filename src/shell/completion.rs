//! Tab-completion candidates.

use std::path::Path;
use std::sync::Arc;

use crate::parse::{is_operator, split_words};

use super::executables::Table;

/// What completion may read, taken from the shell without holding it.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub executables: Arc<Table>,
    pub aliases: Vec<String>,
    pub builtins: Vec<String>,
    pub ignore: Vec<glob::Pattern>,
}

/// Candidates for `prefix`, where `context` is the line before it.
pub fn complete(snapshot: &Snapshot, context: &str, prefix: &str) -> Vec<String> {
    if prefix.starts_with('$') {
        return variables(prefix);
    }
    if in_command_position(context) && !prefix.contains('/') {
        return commands(snapshot, prefix);
    }
    filenames(prefix, &snapshot.ignore)
}

/// The next word starts a command: nothing before it, or an operator.
fn in_command_position(context: &str) -> bool {
    match split_words(context) {
        Ok(words) => words.last().is_none_or(|w| is_operator(w)),
        Err(_) => false,
    }
}

fn commands(snapshot: &Snapshot, prefix: &str) -> Vec<String> {
    let mut out: Vec<String> = snapshot
        .aliases
        .iter()
        .chain(snapshot.builtins.iter())
        .map(String::as_str)
        .chain(snapshot.executables.names())
        .filter(|name| name.starts_with(prefix))
        .map(String::from)
        .collect();
    out.sort();
    out.dedup();
    out
}

fn variables(prefix: &str) -> Vec<String> {
    let (lead, partial, close) = match prefix.strip_prefix("${") {
        Some(rest) => ("${", rest, "}"),
        None => ("$", &prefix[1..], ""),
    };
    let mut out: Vec<String> = std::env::vars_os()
        .filter_map(|(k, _)| k.into_string().ok())
        .filter(|k| k.starts_with(partial))
        .map(|k| format!("{lead}{k}{close}"))
        .collect();
    out.sort();
    out
}

/// File names completing `prefix`; directories get a trailing `/`.
pub fn filenames(prefix: &str, ignore: &[glob::Pattern]) -> Vec<String> {
    let (dir_text, partial) = match prefix.rfind('/') {
        Some(i) => prefix.split_at(i + 1),
        None => ("", prefix),
    };
    let dir = if dir_text.is_empty() {
        ".".to_string()
    } else {
        shellexpand::tilde(dir_text).into_owned()
    };
    let Ok(entries) = std::fs::read_dir(Path::new(&dir)) else {
        return Vec::new();
    };

    let show_hidden = partial.starts_with('.');
    let mut out: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !name.starts_with(partial)
                || (name.starts_with('.') && !show_hidden)
                || ignore.iter().any(|p| p.matches(&name))
            {
                return None;
            }
            let is_dir = entry.path().is_dir();
            Some(format!("{dir_text}{name}{}", if is_dir { "/" } else { "" }))
        })
        .collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn snapshot() -> Snapshot {
        let mut system = HashMap::new();
        system.insert("grep".to_string(), PathBuf::from("/bin"));
        system.insert("git".to_string(), PathBuf::from("/usr/bin"));
        Snapshot {
            executables: Arc::new(Table {
                system,
                super_user: HashMap::new(),
            }),
            aliases: vec!["gs".into()],
            builtins: vec!["cd".into()],
            ignore: Vec::new(),
        }
    }

    #[test]
    fn command_position() {
        assert!(in_command_position(""));
        assert!(in_command_position("ls | "));
        assert!(in_command_position("true && "));
        assert!(!in_command_position("ls "));
    }

    #[test]
    fn completes_commands() {
        let s = snapshot();
        assert_eq!(complete(&s, "", "g"), vec!["git", "grep", "gs"]);
        assert_eq!(complete(&s, "echo hi; ", "c"), vec!["cd"]);
    }

    #[test]
    fn completes_variables() {
        // SAFETY: test-only variable, not read by other tests.
        unsafe { std::env::set_var("JOBSH_COMPLETION_TEST", "1") };
        let s = snapshot();
        assert!(
            complete(&s, "echo ", "${JOBSH_COMPLETION_T")
                .contains(&"${JOBSH_COMPLETION_TEST}".to_string())
        );
        assert!(complete(&s, "echo ", "$JOBSH_COMPLETION_T").contains(&"$JOBSH_COMPLETION_TEST".to_string()));
    }

    #[test]
    fn completes_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::write(dir.path().join("notes.o"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let base = format!("{}/", dir.path().display());
        let ignore = vec![glob::Pattern::new("*.o").unwrap()];

        let all = filenames(&base, &ignore);
        assert_eq!(all, vec![format!("{base}nested/"), format!("{base}notes.txt")]);

        let hidden = filenames(&format!("{base}."), &ignore);
        assert_eq!(hidden, vec![format!("{base}.hidden")]);
    }
}

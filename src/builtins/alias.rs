use std::io::Write;

use super::{Builtin, Invocation};
use crate::error::{Result, ShellError};

/// `alias`, `alias name`, `alias name=words`, `alias name = words`,
/// `alias name words...`
pub struct Alias;

impl Builtin for Alias {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let args = inv.args();
        match args {
            [] => {
                let lines = listing(inv);
                for line in lines {
                    writeln!(inv.out(), "{line}")?;
                }
                Ok(0)
            }
            [name] if !name.contains('=') => {
                let body = inv
                    .state()
                    .aliases
                    .get(name)
                    .map(|words| quote(words))
                    .ok_or_else(|| ShellError::usage(format!("alias: {name}: not found")))?;
                writeln!(inv.out(), "{name} {body}")?;
                Ok(0)
            }
            _ => {
                let (name, words) = parse_definition(args)?;
                inv.state().aliases.insert(name, words);
                Ok(0)
            }
        }
    }

    fn usage(&self) -> &'static str {
        "alias [NAME [= COMMAND...]]"
    }

    fn summary(&self) -> &'static str {
        "List aliases, show one, or define NAME to expand to COMMAND."
    }
}

pub struct Unalias;

impl Builtin for Unalias {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let names = inv.expect_args(1, usize::MAX)?;
        let mut missing = Vec::new();
        for name in names {
            if inv.state().aliases.remove(name).is_none() {
                missing.push(name.as_str());
            }
        }
        for name in &missing {
            writeln!(inv.streams.stderr, "unalias: {name}: not found")?;
        }
        Ok(if missing.is_empty() { 0 } else { 1 })
    }

    fn usage(&self) -> &'static str {
        "unalias NAME..."
    }

    fn summary(&self) -> &'static str {
        "Remove aliases."
    }
}

fn listing(inv: &mut Invocation<'_>) -> Vec<String> {
    let aliases = &inv.state().aliases;
    let mut names: Vec<&String> = aliases.keys().collect();
    names.sort();
    let width = names.iter().map(|n| n.len()).max().unwrap_or(0);
    names
        .into_iter()
        .map(|name| format!("{name:<width$}  {}", quote(&aliases[name])))
        .collect()
}

fn quote(words: &[String]) -> String {
    shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
}

fn parse_definition(args: &[String]) -> Result<(String, Vec<String>)> {
    let (name, body): (&str, Vec<String>) = match args {
        [first, rest @ ..] if first.contains('=') => {
            let (name, value) = first.split_once('=').unwrap_or((first.as_str(), ""));
            let mut body: Vec<String> = Vec::new();
            if !value.is_empty() {
                body.push(value.to_string());
            }
            body.extend(rest.iter().cloned());
            (name, body)
        }
        [name, eq, rest @ ..] if eq == "=" => (name.as_str(), rest.to_vec()),
        [name, rest @ ..] => (name.as_str(), rest.to_vec()),
        [] => return Err(ShellError::usage("alias: missing alias name")),
    };
    if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '/') {
        return Err(ShellError::usage(format!("alias: {name:?}: invalid alias name")));
    }
    // A single quoted argument holds the whole command: alias ll 'ls -l'
    let words = match body.as_slice() {
        [single] => shlex::split(single).unwrap_or_else(|| body.clone()),
        _ => body,
    };
    if words.is_empty() {
        return Err(ShellError::usage(format!("alias: {name}: empty definition")));
    }
    Ok((name.to_string(), words))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    fn words(s: &[&str]) -> Vec<String> {
        s.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn definition_forms() {
        for args in [
            words(&["g=git", "status"]),
            words(&["g", "=", "git", "status"]),
            words(&["g", "git", "status"]),
            words(&["g", "git status"]),
        ] {
            let (name, body) = parse_definition(&args).unwrap();
            assert_eq!(name, "g");
            assert_eq!(body, words(&["git", "status"]), "{args:?}");
        }
    }

    #[test]
    fn rejects_bad_definitions() {
        assert!(parse_definition(&words(&["g="])).is_err());
        assert!(parse_definition(&words(&["a/b", "ls"])).is_err());
    }

    #[test]
    fn define_show_and_remove() {
        let mut s = state();
        let (result, _) = run(&mut s, "alias gs = git status");
        assert_eq!(result.unwrap(), 0);
        let (_, out) = run(&mut s, "alias gs");
        assert_eq!(out, "gs git status\n");

        let (result, _) = run(&mut s, "unalias gs");
        assert_eq!(result.unwrap(), 0);
        let (result, _) = run(&mut s, "alias gs");
        assert_eq!(result.unwrap_err().to_string(), "alias: gs: not found");
        let (result, _) = run(&mut s, "unalias gs");
        assert_eq!(result.unwrap(), 1);
    }

    #[test]
    fn listing_is_sorted_and_padded() {
        let mut s = state();
        s.aliases.clear();
        run(&mut s, "alias zz = echo hi").0.unwrap();
        run(&mut s, "alias a = ls").0.unwrap();
        let (_, out) = run(&mut s, "alias");
        assert_eq!(out, "a   ls\nzz  echo hi\n");
    }
}

//! Alias expansion of the command-position word.

use std::collections::{HashMap, HashSet};

/// Rewrite the leading word of `words` through `aliases` until no alias applies.
///
/// Each alias name is substituted at most once, so `alias ls = ls -a` yields
/// `ls -a` instead of looping. A leading backslash (`\ls`) suppresses
/// expansion. When the command word is one of `prefixes` (`sudo`, `env`, ...)
/// the word after it, skipping options, is expanded as well.
pub fn resolve_aliases(
    words: &[String],
    aliases: &HashMap<String, Vec<String>>,
    prefixes: &[String],
) -> Vec<String> {
    let mut out = words.to_vec();
    let mut seen: HashSet<String> = HashSet::new();
    let mut pos = 0;

    while let Some(head) = out.get(pos) {
        if head.starts_with('\\') {
            break;
        }
        if let Some(body) = aliases.get(head) {
            if seen.insert(head.clone()) {
                out.splice(pos..=pos, body.iter().cloned());
                continue;
            }
        }
        if prefixes.contains(head) {
            pos += 1;
            while out.get(pos).is_some_and(|w| w.starts_with('-')) {
                pos += 1;
            }
            continue;
        }
        break;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn words(s: &[&str]) -> Vec<String> {
        s.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn self_reference_expands_once() {
        let aliases = table(&[("ls", &["ls", "-a"])]);
        assert_eq!(
            resolve_aliases(&words(&["ls"]), &aliases, &[]),
            vec!["ls", "-a"]
        );
    }

    #[test]
    fn chained_aliases() {
        let aliases = table(&[("ll", &["ls", "-l"]), ("ls", &["ls", "--color"])]);
        assert_eq!(
            resolve_aliases(&words(&["ll", "/tmp"]), &aliases, &[]),
            vec!["ls", "--color", "-l", "/tmp"]
        );
    }

    #[test]
    fn mutual_cycle_terminates() {
        let aliases = table(&[("a", &["b", "x"]), ("b", &["a", "y"])]);
        assert_eq!(
            resolve_aliases(&words(&["a"]), &aliases, &[]),
            vec!["a", "y", "x"]
        );
    }

    #[test]
    fn arguments_untouched() {
        let aliases = table(&[("ls", &["ls", "-a"])]);
        assert_eq!(
            resolve_aliases(&words(&["echo", "ls"]), &aliases, &[]),
            vec!["echo", "ls"]
        );
    }

    #[test]
    fn backslash_bypasses() {
        let aliases = table(&[("ls", &["ls", "-a"])]);
        assert_eq!(
            resolve_aliases(&words(&["\\ls"]), &aliases, &[]),
            vec!["\\ls"]
        );
    }

    #[test]
    fn prefix_command_expands_next_word() {
        let aliases = table(&[("ll", &["ls", "-l"])]);
        let prefixes = words(&["sudo"]);
        assert_eq!(
            resolve_aliases(&words(&["sudo", "-E", "ll"]), &aliases, &prefixes),
            vec!["sudo", "-E", "ls", "-l"]
        );
    }

    #[test]
    fn empty_alias_body() {
        let aliases = table(&[("nothing", &[])]);
        assert!(resolve_aliases(&words(&["nothing"]), &aliases, &[]).is_empty());
    }
}

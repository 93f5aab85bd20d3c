//! Splitting a line into chains, short-circuit groups and pipeline stages.

use super::tokenize::split_words;
use super::types::{
    Chain, Connector, ErrorTarget, Group, Operator, OutputTarget, RedirectKind, Redirections,
    Stage,
};
use crate::error::{Result, ShellError};

/// Split a line into chains at `;` and `&`.
///
/// A chain ended by `&` runs in the background. Trailing empty chains
/// (`a;` or a blank line) are dropped; an empty chain before a separator is
/// an [`ShellError::InvalidNullCommand`].
pub fn split_chains(line: &str) -> Result<Vec<Chain>> {
    let mut chains = Vec::new();
    let mut words = Vec::new();

    for word in split_words(line)? {
        match Operator::from_word(&word) {
            Some(op @ (Operator::Semi | Operator::Background)) => {
                if words.is_empty() {
                    return Err(ShellError::InvalidNullCommand);
                }
                chains.push(Chain {
                    words: std::mem::take(&mut words),
                    background: op == Operator::Background,
                });
            }
            _ => words.push(word),
        }
    }
    if !words.is_empty() {
        chains.push(Chain {
            words,
            background: false,
        });
    }
    Ok(chains)
}

/// Split a chain's words into groups at `&&` and `||`.
pub fn split_groups(words: &[String]) -> Result<Vec<Group>> {
    let mut groups = Vec::new();
    let mut connector = Connector::Always;
    let mut cur = Vec::new();

    for word in words {
        let next = match Operator::from_word(word) {
            Some(Operator::And) => Connector::And,
            Some(Operator::Or) => Connector::Or,
            _ => {
                cur.push(word.clone());
                continue;
            }
        };
        if cur.is_empty() {
            return Err(ShellError::InvalidNullCommand);
        }
        groups.push(Group {
            connector,
            words: std::mem::take(&mut cur),
        });
        connector = next;
    }
    if cur.is_empty() {
        return Err(ShellError::InvalidNullCommand);
    }
    groups.push(Group {
        connector,
        words: cur,
    });
    Ok(groups)
}

/// Split a group's words into pipeline stages at `|` and `|&`, pulling the
/// redirections out of each stage's words.
///
/// Each stage gets at most one stdin source, one stdout target and one
/// stderr target; the pipes between stages count toward those limits.
pub fn split_pipeline(words: &[String]) -> Result<Vec<Stage>> {
    let mut stages = Vec::new();
    let mut cur = Stage {
        words: Vec::new(),
        redirections: Redirections::default(),
    };
    let mut piped_in = false;

    let mut i = 0;
    while i < words.len() {
        let word = &words[i];
        i += 1;

        if let Some(op @ (Operator::Pipe | Operator::PipeErr)) = Operator::from_word(word) {
            if cur.words.is_empty() {
                return Err(ShellError::InvalidNullCommand);
            }
            let r = &mut cur.redirections;
            if r.output.is_some() {
                return Err(ShellError::AmbiguousRedirect("output"));
            }
            r.output = Some(OutputTarget::Pipe);
            if op == Operator::PipeErr {
                if r.error.is_some() {
                    return Err(ShellError::AmbiguousRedirect("error"));
                }
                r.error = Some(ErrorTarget::Stdout);
            }
            stages.push(std::mem::replace(
                &mut cur,
                Stage {
                    words: Vec::new(),
                    redirections: Redirections::default(),
                },
            ));
            piped_in = true;
            continue;
        }

        let Some(kind) = RedirectKind::from_word(word) else {
            cur.words.push(word.clone());
            continue;
        };

        let target = if kind.takes_target() {
            match words.get(i) {
                Some(t) if !super::is_operator(t) => {
                    i += 1;
                    t.clone()
                }
                _ => return Err(ShellError::MissingRedirectTarget),
            }
        } else {
            String::new()
        };
        add_redirection(&mut cur.redirections, kind, target, piped_in)?;
    }

    if cur.words.is_empty() {
        return Err(ShellError::InvalidNullCommand);
    }
    stages.push(cur);
    Ok(stages)
}

fn add_redirection(
    r: &mut Redirections,
    kind: RedirectKind,
    path: String,
    piped_in: bool,
) -> Result<()> {
    match kind {
        RedirectKind::In => {
            if r.input.is_some() || piped_in {
                return Err(ShellError::AmbiguousRedirect("input"));
            }
            r.input = Some(path);
        }
        RedirectKind::Out | RedirectKind::AppendOut => {
            if r.output.is_some() {
                return Err(ShellError::AmbiguousRedirect("output"));
            }
            r.output = Some(OutputTarget::File {
                path,
                append: kind == RedirectKind::AppendOut,
            });
        }
        RedirectKind::Err | RedirectKind::AppendErr => {
            if r.error.is_some() {
                return Err(ShellError::AmbiguousRedirect("error"));
            }
            r.error = Some(ErrorTarget::File {
                path,
                append: kind == RedirectKind::AppendErr,
            });
        }
        RedirectKind::OutErr | RedirectKind::AppendOutErr => {
            if r.output.is_some() {
                return Err(ShellError::AmbiguousRedirect("output"));
            }
            if r.error.is_some() {
                return Err(ShellError::AmbiguousRedirect("error"));
            }
            r.output = Some(OutputTarget::File {
                path,
                append: kind == RedirectKind::AppendOutErr,
            });
            r.error = Some(ErrorTarget::Stdout);
        }
        RedirectKind::ErrToOut => {
            if r.error.is_some() {
                return Err(ShellError::AmbiguousRedirect("error"));
            }
            r.error = Some(ErrorTarget::Stdout);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        split_words(line).unwrap()
    }

    fn stages(line: &str) -> Result<Vec<Stage>> {
        split_pipeline(&words(line))
    }

    #[test]
    fn chains_split_on_semicolon_and_ampersand() {
        let chains = split_chains("a; b & c").unwrap();
        assert_eq!(chains.len(), 3);
        assert_eq!(chains[0].words, vec!["a"]);
        assert!(!chains[0].background);
        assert_eq!(chains[1].words, vec!["b"]);
        assert!(chains[1].background);
        assert!(!chains[2].background);
    }

    #[test]
    fn trailing_separator_dropped() {
        let chains = split_chains("a;").unwrap();
        assert_eq!(chains.len(), 1);
        let chains = split_chains("sleep 1 &").unwrap();
        assert_eq!(chains.len(), 1);
        assert!(chains[0].background);
        assert!(split_chains("   ").unwrap().is_empty());
    }

    #[test]
    fn leading_separator_is_null_command() {
        assert!(matches!(
            split_chains("; a"),
            Err(ShellError::InvalidNullCommand)
        ));
    }

    #[test]
    fn groups() {
        let groups = split_groups(&words("a && b || c")).unwrap();
        let connectors: Vec<Connector> = groups.iter().map(|g| g.connector).collect();
        assert_eq!(
            connectors,
            vec![Connector::Always, Connector::And, Connector::Or]
        );
        assert_eq!(groups[2].words, vec!["c"]);
    }

    #[test]
    fn empty_group_is_null_command() {
        for line in ["&& a", "a &&", "a && || b"] {
            assert!(
                matches!(
                    split_groups(&words(line)),
                    Err(ShellError::InvalidNullCommand)
                ),
                "{line}"
            );
        }
    }

    #[test]
    fn connector_decisions() {
        assert!(Connector::Always.should_run(false));
        assert!(Connector::And.should_run(true));
        assert!(!Connector::And.should_run(false));
        assert!(Connector::Or.should_run(false));
        assert!(!Connector::Or.should_run(true));
    }

    #[test]
    fn pipeline_stages() {
        let s = stages("ls -l | grep x |& wc").unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s[0].words, vec!["ls", "-l"]);
        assert_eq!(s[0].redirections.output, Some(OutputTarget::Pipe));
        assert_eq!(s[0].redirections.error, None);
        assert_eq!(s[1].redirections.error, Some(ErrorTarget::Stdout));
        assert_eq!(s[2].redirections, Redirections::default());
    }

    #[test]
    fn redirections_extracted() {
        let s = stages("sort < in > out 2>> err").unwrap();
        assert_eq!(s[0].words, vec!["sort"]);
        let r = &s[0].redirections;
        assert_eq!(r.input.as_deref(), Some("in"));
        assert_eq!(
            r.output,
            Some(OutputTarget::File {
                path: "out".into(),
                append: false
            })
        );
        assert_eq!(
            r.error,
            Some(ErrorTarget::File {
                path: "err".into(),
                append: true
            })
        );
    }

    #[test]
    fn empty_stage_is_null_command() {
        for line in ["a | | b", "| a", "a |", "a |& |"] {
            assert!(
                matches!(stages(line), Err(ShellError::InvalidNullCommand)),
                "{line}"
            );
        }
    }

    #[test]
    fn double_output_is_ambiguous() {
        assert!(matches!(
            stages("a > f > g"),
            Err(ShellError::AmbiguousRedirect("output"))
        ));
        assert!(matches!(
            stages("a > f | b"),
            Err(ShellError::AmbiguousRedirect("output"))
        ));
        assert!(matches!(
            stages("a &> f > g"),
            Err(ShellError::AmbiguousRedirect("output"))
        ));
    }

    #[test]
    fn merge_shares_destination() {
        let s = stages("a > f 2>&1").unwrap();
        assert_eq!(s[0].redirections.error, Some(ErrorTarget::Stdout));
        assert_eq!(
            s[0].redirections.output,
            Some(OutputTarget::File {
                path: "f".into(),
                append: false
            })
        );
    }

    #[test]
    fn double_error_is_ambiguous() {
        for line in ["a 2> e 2>&1", "a 2>&1 |& b", "a 2> e |& b", "a &> f 2> e"] {
            assert!(
                matches!(stages(line), Err(ShellError::AmbiguousRedirect(_))),
                "{line}"
            );
        }
    }

    #[test]
    fn input_only_on_first_stage() {
        assert!(matches!(
            stages("a | b < f"),
            Err(ShellError::AmbiguousRedirect("input"))
        ));
        assert!(matches!(
            stages("a < f < g"),
            Err(ShellError::AmbiguousRedirect("input"))
        ));
    }

    #[test]
    fn missing_target() {
        assert!(matches!(
            stages("a >"),
            Err(ShellError::MissingRedirectTarget)
        ));
        assert!(matches!(
            stages("a > | b"),
            Err(ShellError::MissingRedirectTarget)
        ));
    }

    #[test]
    fn quoted_operator_is_a_word() {
        let s = stages("echo '|' \">\"").unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].words, vec!["echo", "'|'", "\">\""]);
    }
}

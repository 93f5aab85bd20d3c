//! Per-word expansion: braces, tilde, variables, positional arguments,
//! command substitution, globbing and quote removal.

pub mod alias;

pub use alias::resolve_aliases;

use crate::error::{Result, ShellError};
use crate::job::EvaluationMode;
use crate::parse::tokenize::closing_paren;
use crate::parse::{Quoting, expand_braces, tokenize};

/// What the interpolator needs from the shell.
pub trait Expand {
    /// Value of a named variable; `None` when unset.
    fn variable(&self, name: &str) -> Option<String>;
    /// Positional arguments; index 0 is the script name.
    fn positional(&self) -> &[String];
    /// Run `line` as a command substitution and return its captured text,
    /// trailing newlines already trimmed.
    fn substitute(&mut self, line: &str) -> Result<String>;
}

/// Expand one raw word into zero or more argv words.
///
/// Single-quoted text is taken verbatim. Double-quoted text gets variable,
/// positional and command substitution but is neither split nor globbed,
/// except that `${@}` fans out into one word per argument. Unquoted text
/// is substituted, split on whitespace and globbed; a glob with no match
/// stays literal. In [`EvaluationMode::Trial`] nothing is executed: brace
/// expansion, globbing and command substitution are skipped.
pub fn interpolate(word: &str, mode: EvaluationMode, ctx: &mut dyn Expand) -> Result<Vec<String>> {
    let variants = if mode == EvaluationMode::Trial {
        vec![word.to_string()]
    } else {
        expand_braces(word)
    };

    let mut out = Vec::new();
    for variant in variants {
        let mut fields = Fields::default();
        for (n, token) in tokenize(&variant)?.into_iter().enumerate() {
            match token.quoting {
                Quoting::Single => {
                    fields.cur.quoted = true;
                    fields.push_literal(&token.text);
                }
                Quoting::Double => expand_double(&token.text, mode, ctx, &mut fields)?,
                Quoting::Substitution => {
                    if mode == EvaluationMode::Trial {
                        fields.push_literal(&format!("$({})", token.text));
                    } else {
                        let value = ctx.substitute(&token.text)?;
                        fields.push_split(&value);
                    }
                }
                Quoting::Unquoted => {
                    let text = if n == 0 {
                        expand_tilde(&token.text, ctx)
                    } else {
                        token.text
                    };
                    expand_unquoted(&text, ctx, &mut fields);
                }
            }
        }
        fields.finish(mode != EvaluationMode::Trial, &mut out);
    }
    Ok(out)
}

/// Expand every word of `words` and concatenate the results.
pub fn interpolate_all(
    words: &[String],
    mode: EvaluationMode,
    ctx: &mut dyn Expand,
) -> Result<Vec<String>> {
    let mut argv = Vec::new();
    for word in words {
        argv.extend(interpolate(word, mode, ctx)?);
    }
    Ok(argv)
}

/// Expand a redirection target, which must come out as exactly one word.
pub fn interpolate_target(word: &str, mode: EvaluationMode, ctx: &mut dyn Expand) -> Result<String> {
    let mut words = interpolate(word, mode, ctx)?;
    match words.len() {
        1 => Ok(words.remove(0)),
        _ => Err(ShellError::Syntax(format!("{word}: ambiguous redirect"))),
    }
}

// ── Field assembly ──

/// One argv word under construction.
#[derive(Debug, Default)]
struct Field {
    /// The word as it will be passed on if no glob applies.
    literal: String,
    /// The same text as a glob pattern, with quoted parts escaped.
    pattern: String,
    globbable: bool,
    /// Quoted text survives even when empty.
    quoted: bool,
}

#[derive(Debug, Default)]
struct Fields {
    done: Vec<Field>,
    cur: Field,
}

impl Fields {
    fn push_literal(&mut self, s: &str) {
        self.cur.literal.push_str(s);
        self.cur.pattern.push_str(&glob::Pattern::escape(s));
    }

    fn push_glob(&mut self, c: char) {
        self.cur.literal.push(c);
        self.cur.pattern.push(c);
        if matches!(c, '*' | '?' | '[') {
            self.cur.globbable = true;
        }
    }

    /// Append unquoted expansion output, splitting it on whitespace.
    fn push_split(&mut self, value: &str) {
        for c in value.chars() {
            if c.is_whitespace() {
                self.break_field();
            } else {
                self.push_glob(c);
            }
        }
    }

    fn break_field(&mut self) {
        if !self.cur.literal.is_empty() || self.cur.quoted {
            self.done.push(std::mem::take(&mut self.cur));
        }
    }

    fn finish(mut self, glob: bool, out: &mut Vec<String>) {
        self.break_field();
        for field in self.done {
            if glob && field.globbable {
                let matches = glob_matches(&field.pattern);
                if !matches.is_empty() {
                    out.extend(matches);
                    continue;
                }
            }
            out.push(field.literal);
        }
    }
}

fn glob_matches(pattern: &str) -> Vec<String> {
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let Ok(paths) = glob::glob_with(pattern, options) else {
        return Vec::new();
    };
    let mut found: Vec<String> = paths
        .filter_map(|p| p.ok())
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    found.sort();
    found
}

// ── Substitution ──

/// A `$` reference.
#[derive(Debug, PartialEq, Eq)]
enum Param {
    Var(String),
    Positional(usize),
    /// `${@}`: one word per argument.
    All,
    /// `${*}`: all arguments as one string.
    Joined,
    /// `${#}`: argument count.
    Count,
}

/// Parse the reference starting at the `$` at `i`.
/// Returns it and the index just past it.
fn parse_param(chars: &[char], i: usize) -> Option<(Param, usize)> {
    let next = *chars.get(i + 1)?;
    let simple = |p| Some((p, i + 2));
    match next {
        '{' => {
            let end = (i + 2..chars.len()).find(|&j| chars[j] == '}')?;
            let name: String = chars[i + 2..end].iter().collect();
            let param = match name.as_str() {
                "@" => Param::All,
                "*" => Param::Joined,
                "#" => Param::Count,
                n if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => {
                    Param::Positional(n.parse().ok()?)
                }
                n if is_name(n) => Param::Var(name),
                _ => return None,
            };
            Some((param, end + 1))
        }
        '@' => simple(Param::All),
        '*' => simple(Param::Joined),
        '#' => simple(Param::Count),
        d if d.is_ascii_digit() => simple(Param::Positional(d.to_digit(10)? as usize)),
        c if c.is_ascii_alphabetic() || c == '_' => {
            let end = (i + 1..chars.len())
                .find(|&j| !(chars[j].is_ascii_alphanumeric() || chars[j] == '_'))
                .unwrap_or(chars.len());
            Some((Param::Var(chars[i + 1..end].iter().collect()), end))
        }
        _ => None,
    }
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn args(ctx: &dyn Expand) -> &[String] {
    ctx.positional().get(1..).unwrap_or(&[])
}

fn lookup(param: &Param, ctx: &dyn Expand) -> String {
    match param {
        Param::Var(name) => ctx.variable(name).unwrap_or_default(),
        Param::Positional(n) => ctx.positional().get(*n).cloned().unwrap_or_default(),
        Param::All | Param::Joined => args(ctx).join(" "),
        Param::Count => args(ctx).len().to_string(),
    }
}

fn expand_tilde(text: &str, ctx: &dyn Expand) -> String {
    if text == "~" || text.starts_with("~/") {
        shellexpand::tilde_with_context(text, || ctx.variable("HOME")).into_owned()
    } else {
        text.to_string()
    }
}

fn expand_unquoted(text: &str, ctx: &dyn Expand, fields: &mut Fields) {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                match chars.get(i + 1) {
                    Some(&n) => fields.push_literal(&n.to_string()),
                    None => fields.push_literal("\\"),
                }
                i += 2;
            }
            '$' => match parse_param(&chars, i) {
                Some((param, end)) => {
                    fields.push_split(&lookup(&param, ctx));
                    i = end;
                }
                None => {
                    fields.push_glob(c);
                    i += 1;
                }
            },
            _ => {
                fields.push_glob(c);
                i += 1;
            }
        }
    }
}

fn expand_double(
    text: &str,
    mode: EvaluationMode,
    ctx: &mut dyn Expand,
    fields: &mut Fields,
) -> Result<()> {
    // "${@}" with no arguments yields no word at all.
    let bare_all = matches!(text, "${@}" | "$@");
    if bare_all && args(ctx).is_empty() {
        return Ok(());
    }
    fields.cur.quoted = true;

    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => match chars.get(i + 1) {
                Some(&n) if matches!(n, '$' | '`' | '"' | '\\') => {
                    fields.push_literal(&n.to_string());
                    i += 2;
                }
                _ => {
                    fields.push_literal("\\");
                    i += 1;
                }
            },
            '$' if chars.get(i + 1) == Some(&'(') => {
                let end = closing_paren(&chars, i + 2).ok_or(ShellError::UnmatchedSubstitution)?;
                let inner: String = chars[i + 2..end].iter().collect();
                if mode == EvaluationMode::Trial {
                    fields.push_literal(&format!("$({inner})"));
                } else {
                    let value = ctx.substitute(&inner)?;
                    fields.push_literal(&value);
                }
                i = end + 1;
            }
            '$' => match parse_param(&chars, i) {
                Some((Param::All, end)) => {
                    for (n, arg) in args(ctx).iter().enumerate() {
                        if n > 0 {
                            fields.break_field();
                            fields.cur.quoted = true;
                        }
                        fields.push_literal(arg);
                    }
                    i = end;
                }
                Some((param, end)) => {
                    fields.push_literal(&lookup(&param, ctx));
                    i = end;
                }
                None => {
                    fields.push_literal("$");
                    i += 1;
                }
            },
            _ => {
                fields.push_literal(&c.to_string());
                i += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Env {
        vars: HashMap<String, String>,
        positional: Vec<String>,
        ran: Vec<String>,
    }

    impl Env {
        fn with_var(mut self, k: &str, v: &str) -> Self {
            self.vars.insert(k.into(), v.into());
            self
        }

        fn with_args(mut self, args: &[&str]) -> Self {
            self.positional = std::iter::once("script")
                .chain(args.iter().copied())
                .map(String::from)
                .collect();
            self
        }
    }

    impl Expand for Env {
        fn variable(&self, name: &str) -> Option<String> {
            self.vars.get(name).cloned()
        }
        fn positional(&self) -> &[String] {
            &self.positional
        }
        fn substitute(&mut self, line: &str) -> Result<String> {
            self.ran.push(line.to_string());
            Ok(format!("out of {line}"))
        }
    }

    fn direct(word: &str, env: &mut Env) -> Vec<String> {
        interpolate(word, EvaluationMode::Direct, env).unwrap()
    }

    #[test]
    fn plain_word() {
        assert_eq!(direct("ls", &mut Env::default()), vec!["ls"]);
    }

    #[test]
    fn single_quotes_are_verbatim() {
        let mut env = Env::default().with_var("X", "no");
        assert_eq!(direct("'a b'", &mut env), vec!["a b"]);
        assert_eq!(direct("'$X \\n *'", &mut env), vec!["$X \\n *"]);
    }

    #[test]
    fn single_quote_reinterpolation_is_stable() {
        let mut env = Env::default();
        let once = direct("'a b'", &mut env);
        let quoted = format!("'{}'", once[0]);
        assert_eq!(direct(&quoted, &mut env), once);
    }

    #[test]
    fn unset_variable_is_empty() {
        let mut env = Env::default();
        assert!(direct("$NOPE", &mut env).is_empty());
        assert_eq!(direct("\"$NOPE\"", &mut env), vec![""]);
        assert_eq!(direct("a${NOPE}b", &mut env), vec!["ab"]);
    }

    #[test]
    fn unquoted_value_is_split() {
        let mut env = Env::default().with_var("X", "a  b c");
        assert_eq!(direct("$X", &mut env), vec!["a", "b", "c"]);
        assert_eq!(direct("\"$X\"", &mut env), vec!["a  b c"]);
        assert_eq!(direct("pre${X}post", &mut env), vec!["prea", "b", "cpost"]);
    }

    #[test]
    fn escapes() {
        let mut env = Env::default().with_var("X", "v");
        assert_eq!(direct("\\$X", &mut env), vec!["$X"]);
        assert_eq!(direct("a\\ b", &mut env), vec!["a b"]);
        assert_eq!(direct("\"\\$X \\\" \\n\"", &mut env), vec!["$X \" \\n"]);
    }

    #[test]
    fn positional() {
        let mut env = Env::default().with_args(&["one", "two words"]);
        assert_eq!(direct("${1}", &mut env), vec!["one"]);
        assert_eq!(direct("${#}", &mut env), vec!["2"]);
        assert_eq!(direct("\"${*}\"", &mut env), vec!["one two words"]);
        assert_eq!(direct("${0}", &mut env), vec!["script"]);
        assert!(direct("${9}", &mut env).is_empty());
    }

    #[test]
    fn quoted_all_fans_out() {
        let mut env = Env::default().with_args(&["one", "two words"]);
        assert_eq!(direct("\"${@}\"", &mut env), vec!["one", "two words"]);
        assert_eq!(
            direct("\"<${@}>\"", &mut env),
            vec!["<one", "two words>"]
        );
        assert_eq!(direct("${@}", &mut env), vec!["one", "two", "words"]);
    }

    #[test]
    fn quoted_all_without_args_vanishes() {
        let mut env = Env::default().with_args(&[]);
        assert!(direct("\"${@}\"", &mut env).is_empty());
        assert_eq!(direct("\"${*}\"", &mut env), vec![""]);
    }

    #[test]
    fn braces_then_quotes() {
        let mut env = Env::default();
        assert_eq!(direct("a{b,c}", &mut env), vec!["ab", "ac"]);
        assert_eq!(direct("'a{b,c}'", &mut env), vec!["a{b,c}"]);
    }

    #[test]
    fn command_substitution_direct() {
        let mut env = Env::default();
        assert_eq!(direct("$(date)", &mut env), vec!["out", "of", "date"]);
        assert_eq!(direct("\"$(date)\"", &mut env), vec!["out of date"]);
        assert_eq!(env.ran, vec!["date", "date"]);
    }

    #[test]
    fn command_substitution_trial_does_not_run() {
        let mut env = Env::default();
        let words = interpolate("$(rm -rf x)", EvaluationMode::Trial, &mut env).unwrap();
        assert_eq!(words, vec!["$(rm -rf x)"]);
        let words = interpolate("\"$(rm x)\"", EvaluationMode::Trial, &mut env).unwrap();
        assert_eq!(words, vec!["$(rm x)"]);
        assert!(env.ran.is_empty());
    }

    #[test]
    fn malformed_substitution() {
        let mut env = Env::default();
        assert!(matches!(
            interpolate("$(ls", EvaluationMode::Direct, &mut env),
            Err(ShellError::UnmatchedSubstitution)
        ));
    }

    #[test]
    fn tilde() {
        let mut env = Env::default().with_var("HOME", "/home/u");
        assert_eq!(direct("~", &mut env), vec!["/home/u"]);
        assert_eq!(direct("~/x", &mut env), vec!["/home/u/x"]);
        assert_eq!(direct("a~", &mut env), vec!["a~"]);
        assert_eq!(direct("'~'", &mut env), vec!["~"]);
    }

    #[test]
    fn glob_without_match_is_literal() {
        let mut env = Env::default();
        assert_eq!(
            direct("/nonexistent-dir-for-tests/*.zz", &mut env),
            vec!["/nonexistent-dir-for-tests/*.zz"]
        );
    }

    #[test]
    fn glob_matches_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.log"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let mut env = Env::default();
        let base = dir.path().to_string_lossy().into_owned();
        let words = direct(&format!("{base}/*.txt"), &mut env);
        assert_eq!(words, vec![format!("{base}/a.txt"), format!("{base}/b.txt")]);
        // quoted metacharacters never glob
        let words = direct(&format!("'{base}/*.txt'"), &mut env);
        assert_eq!(words, vec![format!("{base}/*.txt")]);
    }

    #[test]
    fn empty_quotes_make_empty_word() {
        let mut env = Env::default();
        assert_eq!(direct("''", &mut env), vec![""]);
        assert_eq!(direct("\"\"", &mut env), vec![""]);
    }

    #[test]
    fn dollar_without_name_is_literal() {
        let mut env = Env::default();
        assert_eq!(direct("$", &mut env), vec!["$"]);
        assert_eq!(direct("a$-b", &mut env), vec!["a$-b"]);
    }

    #[test]
    fn redirect_target_must_be_one_word() {
        let mut env = Env::default().with_var("X", "a b");
        assert_eq!(
            interpolate_target("out.txt", EvaluationMode::Direct, &mut env).unwrap(),
            "out.txt"
        );
        assert!(interpolate_target("$X", EvaluationMode::Direct, &mut env).is_err());
    }
}

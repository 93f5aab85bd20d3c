//! Error type shared by the parser, expander and job runner.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T, E = ShellError> = std::result::Result<T, E>;

/// Everything that can go wrong while turning a line into running jobs.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("Unmatched '{0}'.")]
    UnmatchedQuote(char),

    #[error("Unmatched '$('.")]
    UnmatchedSubstitution,

    /// Which stream the conflicting redirect targets: `input`, `output` or `error`.
    #[error("Ambiguous {0} redirect.")]
    AmbiguousRedirect(&'static str),

    #[error("Invalid null command.")]
    InvalidNullCommand,

    #[error("Missing name for redirect.")]
    MissingRedirectTarget,

    #[error("{0}")]
    Syntax(String),

    #[error("{}", not_found_message(.name, .suggestion.as_deref()))]
    CommandNotFound {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Only one script stage is allowed in a pipeline.")]
    MultipleScriptStages,

    #[error("{command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Recursive `source` of '{}' script detected.", .0.display())]
    RecursiveSource(PathBuf),

    /// Bad arguments to a builtin; the message already names the builtin.
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`ShellError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before anything spawned.
    Syntax,
    /// A stage named something that is not a command.
    Resolution,
    /// A process or redirect target could not be set up.
    Spawn,
    /// A script tried to source itself.
    RecursionGuard,
    /// Failures raised while a builtin or script stage was running.
    Runtime,
}

impl ShellError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShellError::UnmatchedQuote(_)
            | ShellError::UnmatchedSubstitution
            | ShellError::AmbiguousRedirect(_)
            | ShellError::InvalidNullCommand
            | ShellError::MissingRedirectTarget
            | ShellError::Syntax(_)
            | ShellError::MultipleScriptStages => ErrorKind::Syntax,
            ShellError::CommandNotFound { .. } => ErrorKind::Resolution,
            ShellError::Spawn { .. } | ShellError::Redirect { .. } => ErrorKind::Spawn,
            ShellError::RecursiveSource(_) => ErrorKind::RecursionGuard,
            ShellError::Usage(_) | ShellError::Engine(_) | ShellError::Io(_) => ErrorKind::Runtime,
        }
    }

    /// Shorthand for builtin argument errors.
    pub fn usage(message: impl Into<String>) -> Self {
        ShellError::Usage(message.into())
    }
}

fn not_found_message(name: &str, suggestion: Option<&str>) -> String {
    match suggestion {
        Some(s) => format!("{name}: command not found, did you mean: `{s}`?"),
        None => format!("{name}: command not found!"),
    }
}

/// Pick the candidate closest to `name` by edit distance, if any is close enough
/// to be a plausible typo.
pub fn suggest<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let limit = (name.chars().count() / 2).max(2);
    candidates
        .into_iter()
        .map(|c| (edit_distance(name, c), c))
        .filter(|(d, _)| *d <= limit)
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        .map(|(_, c)| c.to_string())
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

//! Types produced by the splitter and consumed by the job runner.

/// Shell operator recognized between words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `;`: end the chain, run the next one unconditionally
    Semi,
    /// `&`: end the chain and run it in the background
    Background,
    /// `&&`: run the next group only if the previous succeeded
    And,
    /// `||`: run the next group only if the previous failed
    Or,
    /// `|`: pipe stdout into the next stage
    Pipe,
    /// `|&`: pipe stdout and stderr into the next stage
    PipeErr,
}

impl Operator {
    /// The operator's shell syntax.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Semi => ";",
            Operator::Background => "&",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Pipe => "|",
            Operator::PipeErr => "|&",
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            ";" => Operator::Semi,
            "&" => Operator::Background,
            "&&" => Operator::And,
            "||" => Operator::Or,
            "|" => Operator::Pipe,
            "|&" => Operator::PipeErr,
            _ => return None,
        })
    }
}

/// Direction of a redirection token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<`
    In,
    /// `>`
    Out,
    /// `>>`
    AppendOut,
    /// `2>`
    Err,
    /// `2>>`
    AppendErr,
    /// `&>`
    OutErr,
    /// `&>>`
    AppendOutErr,
    /// `2>&1`
    ErrToOut,
}

impl RedirectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectKind::In => "<",
            RedirectKind::Out => ">",
            RedirectKind::AppendOut => ">>",
            RedirectKind::Err => "2>",
            RedirectKind::AppendErr => "2>>",
            RedirectKind::OutErr => "&>",
            RedirectKind::AppendOutErr => "&>>",
            RedirectKind::ErrToOut => "2>&1",
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "<" => RedirectKind::In,
            ">" => RedirectKind::Out,
            ">>" => RedirectKind::AppendOut,
            "2>" => RedirectKind::Err,
            "2>>" => RedirectKind::AppendErr,
            "&>" => RedirectKind::OutErr,
            "&>>" => RedirectKind::AppendOutErr,
            "2>&1" => RedirectKind::ErrToOut,
            _ => return None,
        })
    }

    /// Whether the token is followed by a target word.
    pub fn takes_target(&self) -> bool {
        !matches!(self, RedirectKind::ErrToOut)
    }
}

/// Where a stage's output stream goes when it is not the shell's own stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A file, truncated or appended to. The path is still an unexpanded word.
    File { path: String, append: bool },
    /// The pipe feeding the next stage.
    Pipe,
}

/// Where a stage's error stream goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorTarget {
    File { path: String, append: bool },
    /// Wherever stdout ends up (`2>&1`, `&>`, `|&`).
    Stdout,
}

/// The redirections attached to one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirections {
    /// Input file; `None` means the previous pipe or the shell's stdin.
    pub input: Option<String>,
    pub output: Option<OutputTarget>,
    pub error: Option<ErrorTarget>,
}

/// One pipeline stage: its words (still unexpanded) and redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub words: Vec<String>,
    pub redirections: Redirections,
}

/// Everything between two `;`/`&` boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub words: Vec<String>,
    pub background: bool,
}

/// How a short-circuit group is joined to the group before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// First group of a chain: always runs.
    Always,
    And,
    Or,
}

impl Connector {
    /// Whether a group with this connector runs given the previous status.
    pub fn should_run(&self, previous_success: bool) -> bool {
        match self {
            Connector::Always => true,
            Connector::And => previous_success,
            Connector::Or => !previous_success,
        }
    }
}

/// A chain sub-sequence separated by `&&`/`||`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub connector: Connector,
    pub words: Vec<String>,
}

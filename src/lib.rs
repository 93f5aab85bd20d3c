//! jobsh: the job-execution engine of an interactive shell.
//!
//! A line is split into chains (`;`, `&`), chains into and-or groups (`&&`,
//! `||`) and groups into pipeline stages (`|`, `|&`) with their
//! redirections. Each stage is alias-resolved and interpolated into an argv,
//! resolved to a builtin, an executable or a script-engine call, and the
//! stages run together as a [`job::Job`]: one process group, wired with
//! pipes, waited on as a unit, suspendable and resumable.
//!
//! # Architecture
//!
//! - **[`parse`]**: tokenizer, brace expansion, chain/group/pipeline splitting, grammar types.
//! - **[`expand`]**: word interpolation (variables, substitution, tilde, globs) and alias resolution.
//! - **[`job`]**: stage status state machine, command wiring, capture reader, the job itself.
//! - **[`shell`]**: the [`shell::Shell`] interface, [`shell::SystemShell`], the forwarding shell,
//!   terminal ownership, executable index, history, completion.
//! - **[`builtins`]**: the builtin trait, registry and every builtin command.
//! - **[`engine`]**: the script-engine interface.
//! - **[`config`]**: embedded defaults + user overlay merge.
//! - **[`logging`]**: file logger under `~/.local/share/jobsh/`.

/// Builtin trait, registry and builtin commands.
pub mod builtins;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Script-engine interface.
pub mod engine;
/// Error type and "did you mean" suggestions.
pub mod error;
/// Word interpolation and alias resolution.
pub mod expand;
/// Jobs, commands and their statuses.
pub mod job;
/// File-based diagnostic logging.
pub mod logging;
/// Line grammar: tokenizer, brace expander, splitters.
pub mod parse;
/// Shell implementations and their supporting state.
pub mod shell;

pub use error::{Result, ShellError};

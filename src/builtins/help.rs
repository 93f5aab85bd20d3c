use std::sync::Arc;

use super::{Builtin, CALL, Invocation};
use crate::error::{Result, ShellError};

/// Help pages that are not builtins.
const TOPICS: &[(&str, &str)] = &[
    (
        CALL,
        "call NAME [ARGS...]\n\
         Call the script-engine function NAME with ARGS. Its return value is\n\
         appended to the stage's output.",
    ),
    (
        "expansion",
        "Words are expanded in this order: braces ({a,b} and {1..5}), variables\n\
         (${NAME}, $NAME, ${1}, $#, $@, $*), command substitution $(...), a\n\
         leading ~, then globs (*, ?, [...]) on unquoted text. Single quotes keep\n\
         text literal; double quotes allow variables and substitution but keep\n\
         the result one word.",
    ),
    (
        "redirection",
        "< FILE      read stdin from FILE\n\
         > FILE      write stdout to FILE (>> appends)\n\
         2> FILE     write stderr to FILE (2>> appends)\n\
         &> FILE     write both to FILE (&>> appends)\n\
         2>&1        send stderr wherever stdout goes\n\
         A | B       pipe stdout of A into B (|& also pipes stderr)\n\
         Each stream takes at most one target; a second one is an error.",
    ),
    (
        "jobs",
        "A line ending in & runs in the background. Ctrl-Z suspends the\n\
         foreground job. `jobs` lists jobs, `fg N` and `bg N` continue job N.\n\
         A && B runs B only if A succeeded, A || B only if it failed.",
    ),
];

/// `help`, `help NAME`, `help topics`
pub struct Help;

impl Builtin for Help {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let args = inv.expect_args(0, 1)?;
        let registry = Arc::clone(&inv.state().builtins);
        let out = inv.out();
        match args.first().map(String::as_str) {
            None => {
                writeln!(out, "Builtin commands:")?;
                for (_, builtin) in registry.iter() {
                    writeln!(out, "  {}", builtin.usage())?;
                }
                writeln!(out, "  call NAME [ARGS...]")?;
                writeln!(out, "Type `help NAME` for details or `help topics` for more.")?;
            }
            Some("topics") => {
                for name in registry.names().chain(TOPICS.iter().map(|(name, _)| *name)) {
                    writeln!(out, "{name}")?;
                }
            }
            Some(name) => {
                if let Some(builtin) = registry.get(name) {
                    writeln!(out, "{}\n{}", builtin.usage(), builtin.summary())?;
                } else if let Some((_, text)) = TOPICS.iter().find(|(topic, _)| *topic == name) {
                    writeln!(out, "{text}")?;
                } else {
                    return Err(ShellError::usage(format!("help: no help topic for '{name}'")));
                }
            }
        }
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "help [NAME | topics]"
    }

    fn summary(&self) -> &'static str {
        "Show the builtin index, help for one builtin or topic, or the topic list."
    }
}

use std::path::Path;

use super::{Builtin, Invocation};
use crate::error::{Result, ShellError};

/// `source PATH [ARGS...]`
pub struct Source;

impl Builtin for Source {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let Some((path, args)) = inv.args().split_first() else {
            return Err(ShellError::usage("source: missing script path"));
        };
        let mode = inv.mode;
        let result = inv.shell()?.source(Path::new(path), args, mode)?;
        inv.out().write_all(result.output.as_bytes())?;
        Ok(result.status.code())
    }

    fn usage(&self) -> &'static str {
        "source PATH [ARGS...]"
    }

    fn summary(&self) -> &'static str {
        "Run the lines of a script in this shell. ARGS become ${1}, ${2}, ... \
         A script may not source itself, directly or indirectly."
    }
}

/// `eval WORDS...`
pub struct Eval;

impl Builtin for Eval {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let line = inv.args().join(" ");
        let mode = inv.mode;
        let result = inv.shell()?.run_line(&line, mode)?;
        inv.out().write_all(result.output.as_bytes())?;
        Ok(result.status.code())
    }

    fn usage(&self) -> &'static str {
        "eval WORDS..."
    }

    fn summary(&self) -> &'static str {
        "Join the arguments with spaces and run the result as a line."
    }
}

/// `exec COMMAND [ARGS...]`
pub struct Exec;

impl Builtin for Exec {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let argv = inv.expect_args(1, usize::MAX)?;
        inv.shell()?.exec(argv)?;
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "exec COMMAND [ARGS...]"
    }

    fn summary(&self) -> &'static str {
        "Replace the shell with COMMAND, giving the terminal back first."
    }
}

/// `exit [CODE]`
pub struct Exit;

impl Builtin for Exit {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let args = inv.expect_args(0, 1)?;
        let shell = inv.shell()?;
        let code = match args.first() {
            Some(text) => text
                .parse::<i32>()
                .map_err(|_| ShellError::usage(format!("exit: {text}: numeric argument required")))?,
            None => shell.last_status().code(),
        };
        shell.request_exit(code);
        Ok(code)
    }

    fn usage(&self) -> &'static str {
        "exit [CODE]"
    }

    fn summary(&self) -> &'static str {
        "Leave the shell with CODE, or the status of the last line."
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;

    #[test]
    fn detached_refusals() {
        let mut s = state();
        for line in ["source x.sh", "eval true", "exec true", "exit 1"] {
            let (result, _) = run(&mut s, line);
            assert!(result.is_err(), "{line}");
        }
    }

    #[test]
    fn source_needs_a_path() {
        let mut s = state();
        let (result, _) = run(&mut s, "source");
        assert_eq!(result.unwrap_err().to_string(), "source: missing script path");
    }
}

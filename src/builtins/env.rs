use super::{Builtin, Invocation};
use crate::error::{Result, ShellError};
use crate::shell::environ;

/// `setenv` lists the environment; `setenv NAME [VALUE]` sets a variable.
pub struct Setenv;

impl Builtin for Setenv {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let args = inv.expect_args(0, 2)?;
        let Some(name) = args.first() else {
            let mut vars: Vec<(String, String)> = std::env::vars_os()
                .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
                .collect();
            vars.sort();
            for (k, v) in vars {
                writeln!(inv.out(), "{k}={v}")?;
            }
            return Ok(0);
        };
        if !environ::is_valid_name(name) {
            return Err(ShellError::usage(format!("setenv: {name}: invalid variable name")));
        }
        let value = args.get(1).map_or("", |v| v.as_str());
        let shell = inv.shell()?;
        environ::set(name, value);
        if name == "PATH" {
            shell.state().rehash();
        }
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "setenv [NAME [VALUE]]"
    }

    fn summary(&self) -> &'static str {
        "Set an environment variable, or list them all."
    }
}

/// `unsetenv NAME...`
pub struct Unsetenv;

impl Builtin for Unsetenv {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let names = inv.expect_args(1, usize::MAX)?;
        let shell = inv.shell()?;
        for name in names {
            environ::unset(name);
        }
        if names.iter().any(|n| n == "PATH") {
            shell.state().rehash();
        }
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "unsetenv NAME..."
    }

    fn summary(&self) -> &'static str {
        "Remove environment variables."
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;

    #[test]
    fn listing_works_detached() {
        let mut s = state();
        let (result, out) = run(&mut s, "setenv");
        assert_eq!(result.unwrap(), 0);
        assert!(out.lines().any(|l| l.starts_with("PATH=")));
    }

    #[test]
    fn changes_need_the_shell() {
        let mut s = state();
        let (result, _) = run(&mut s, "setenv JOBSH_DETACHED_TEST 1");
        assert!(result.is_err());
        assert!(std::env::var_os("JOBSH_DETACHED_TEST").is_none());
        let (result, _) = run(&mut s, "unsetenv PATH");
        assert!(result.is_err());
    }

    #[test]
    fn invalid_name() {
        let mut s = state();
        let (result, _) = run(&mut s, "setenv A=B x");
        assert_eq!(result.unwrap_err().to_string(), "setenv: A=B: invalid variable name");
    }
}

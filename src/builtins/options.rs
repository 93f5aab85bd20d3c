use super::{Builtin, Invocation};
use crate::error::{Result, ShellError};
use crate::shell::history::format_time;
use crate::shell::state::expand_path;
use crate::shell::{KeyAction, ShellState};

/// `setopt` lists options; `setopt NAME VALUE...` changes one.
pub struct Setopt;

impl Builtin for Setopt {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let Some((name, values)) = inv.args().split_first() else {
            let lines = describe_options(inv.state());
            for line in lines {
                writeln!(inv.out(), "{line}")?;
            }
            return Ok(0);
        };
        set_option(inv.state(), name, values)?;
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "setopt [NAME VALUE...]"
    }

    fn summary(&self) -> &'static str {
        "Show or change options: ignore_filenames PATTERN..., super_user_paths DIR..., \
         prefix_commands NAME..., trace on|off, history_max_size N, history_path PATH."
    }
}

fn describe_options(state: &ShellState) -> Vec<String> {
    let options = &state.options;
    let patterns: Vec<&str> = options.ignore_filenames.iter().map(|p| p.as_str()).collect();
    let paths: Vec<String> = options
        .super_user_paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    vec![
        format!("ignore_filenames  {}", patterns.join(" ")),
        format!("super_user_paths  {}", paths.join(" ")),
        format!("prefix_commands   {}", options.prefix_commands.join(" ")),
        format!("trace             {}", if options.trace { "on" } else { "off" }),
        format!("history_max_size  {}", state.history.max_size()),
        format!(
            "history_path      {}",
            state.history.path().map(|p| p.display().to_string()).unwrap_or_default()
        ),
    ]
}

fn set_option(state: &mut ShellState, name: &str, values: &[String]) -> Result<()> {
    match name {
        "ignore_filenames" => {
            let patterns = values
                .iter()
                .map(|v| {
                    glob::Pattern::new(v)
                        .map_err(|e| ShellError::usage(format!("setopt: {v}: {e}")))
                })
                .collect::<Result<Vec<_>>>()?;
            state.options.ignore_filenames = patterns;
        }
        "super_user_paths" => {
            state.options.super_user_paths = values.iter().map(expand_path).collect();
            state.rehash();
        }
        "prefix_commands" => state.options.prefix_commands = values.to_vec(),
        "trace" => {
            state.options.trace = match values {
                [v] if matches!(v.as_str(), "on" | "true" | "1") => true,
                [v] if matches!(v.as_str(), "off" | "false" | "0") => false,
                _ => return Err(ShellError::usage("setopt: trace takes on or off")),
            }
        }
        "history_max_size" => {
            let size = match values {
                [v] => v.parse::<usize>().ok(),
                _ => None,
            }
            .ok_or_else(|| ShellError::usage("setopt: history_max_size takes a number"))?;
            state.history.set_max_size(size);
        }
        "history_path" => match values {
            [v] => state.history.set_path(expand_path(v)),
            _ => return Err(ShellError::usage("setopt: history_path takes one path")),
        },
        other => return Err(ShellError::usage(format!("setopt: unknown option {other}"))),
    }
    Ok(())
}

/// `bindkey`, `bindkey KEY`, `bindkey [--internal|--system] KEY ACTION...`
pub struct Bindkey;

impl Builtin for Bindkey {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let args = inv.args();
        match args {
            [] => {
                let bindings = &inv.state().key_bindings;
                let width = bindings.keys().map(|k| k.len()).max().unwrap_or(0);
                let lines: Vec<String> = bindings
                    .iter()
                    .map(|(key, action)| format!("{key:<width$}  {}", action.describe()))
                    .collect();
                for line in lines {
                    writeln!(inv.out(), "{line}")?;
                }
            }
            [key] if !key.starts_with("--") => {
                let action = inv
                    .state()
                    .key_bindings
                    .get(key)
                    .map(KeyAction::describe)
                    .ok_or_else(|| ShellError::usage(format!("bindkey: {key}: not bound")))?;
                writeln!(inv.out(), "{key}  {action}")?;
            }
            [flag, key, action @ ..] if flag == "--internal" || flag == "--system" => {
                if action.is_empty() {
                    return Err(ShellError::usage(format!("bindkey: {key}: missing action")));
                }
                let action = action.join(" ");
                let binding = if flag == "--internal" {
                    KeyAction::Internal(action)
                } else {
                    KeyAction::System(action)
                };
                inv.state().key_bindings.insert(key.clone(), binding);
            }
            [key, action @ ..] if !key.starts_with("--") => {
                inv.state()
                    .key_bindings
                    .insert(key.clone(), KeyAction::System(action.join(" ")));
            }
            _ => return Err(ShellError::usage(format!("bindkey: usage: {}", self.usage()))),
        }
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "bindkey [[--internal|--system] KEY [ACTION...]]"
    }

    fn summary(&self) -> &'static str {
        "List key bindings, show one, or bind KEY to a line-editor action \
         (--internal) or a command line (--system, the default)."
    }
}

pub struct Rehash;

impl Builtin for Rehash {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        inv.expect_args(0, 0)?;
        inv.state().rehash();
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "rehash"
    }

    fn summary(&self) -> &'static str {
        "Rebuild the index of commands found on PATH and the super-user paths."
    }
}

/// `history [--indexed] [--timestamps] [--no-color]`
pub struct History;

impl Builtin for History {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let (mut indexed, mut timestamps, mut color) = (false, false, inv.streams.terminal);
        for arg in inv.args() {
            match arg.as_str() {
                "--indexed" => indexed = true,
                "--timestamps" => timestamps = true,
                "--no-color" => color = false,
                other => return Err(ShellError::usage(format!("history: unknown option {other}"))),
            }
        }
        let lines: Vec<String> = inv
            .state()
            .history
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let mut line = String::new();
                if indexed {
                    line.push_str(&paint(&format!("{:>5}  ", i + 1), "33", color));
                }
                if timestamps {
                    line.push_str(&paint(&format!("{}  ", format_time(entry.time)), "2", color));
                }
                line.push_str(&entry.line);
                line
            })
            .collect();
        for line in lines {
            writeln!(inv.out(), "{line}")?;
        }
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "history [--indexed] [--timestamps] [--no-color]"
    }

    fn summary(&self) -> &'static str {
        "List the command history, oldest first."
    }
}

fn paint(text: &str, sgr: &str, color: bool) -> String {
    if color {
        format!("\x1b[{sgr}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

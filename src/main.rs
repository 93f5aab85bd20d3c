//! jobsh: an interactive shell with job control.
//!
//! Reads lines from stdin (prompting on a terminal), runs one line given
//! with `-c`, or runs a script file with positional arguments.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use jobsh::config::Config;
use jobsh::engine::NullEngine;
use jobsh::job::EvaluationMode;
use jobsh::shell::{ForwardingShell, Shell, SystemShell};

const USAGE: &str = "usage: jobsh [--forward] [-c LINE | SCRIPT [ARGS...]]\n       jobsh --dump-config";

// ─── Arguments ───────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Input {
    Stdin,
    Line(String),
    Script(PathBuf, Vec<String>),
}

#[derive(Debug, PartialEq)]
struct Options {
    forward: bool,
    dump_config: bool,
    input: Input,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        forward: false,
        dump_config: false,
        input: Input::Stdin,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--forward" => options.forward = true,
            "--dump-config" => options.dump_config = true,
            "-c" => {
                let line = args.next().ok_or("-c needs a line")?;
                options.input = Input::Line(line);
            }
            "-h" | "--help" => return Err(String::new()),
            flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            _ => {
                options.input = Input::Script(PathBuf::from(arg), args.collect());
                break;
            }
        }
    }
    Ok(options)
}

// ─── Line reading ────────────────────────────────────

/// Feed lines to `each` until EOF or until it returns false. A read error
/// ends the loop and is returned.
fn read_lines(prompt: bool, mut each: impl FnMut(&str) -> bool) -> std::io::Result<()> {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        if prompt {
            print!("jobsh$ ");
            let _ = std::io::stdout().flush();
        }
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if !each(line.trim_end_matches(['\n', '\r'])) {
                    break;
                }
            }
            Err(e) => {
                eprintln!("jobsh: {e}");
                return Err(e);
            }
        }
    }
    if prompt {
        println!();
    }
    Ok(())
}

/// Exit code for a failed read of the input stream.
const READ_FAILURE: i32 = 1;

// ─── Shells ──────────────────────────────────────────

fn run_system(config: &Config, input: Input) -> i32 {
    let interactive = input == Input::Stdin && std::io::stdin().is_terminal();
    let mut shell = SystemShell::new(config, Box::new(NullEngine), interactive);

    match input {
        Input::Line(line) => {
            let status = shell.run(&line);
            shell.exit_code().unwrap_or(status.code())
        }
        Input::Script(path, args) => {
            let mut positional = vec![path.display().to_string()];
            positional.extend(args);
            shell.set_positional(positional);
            match shell.source(&path, &[], EvaluationMode::Direct) {
                Ok(result) => shell.exit_code().unwrap_or(result.status.code()),
                Err(e) => {
                    eprintln!("jobsh: {e}");
                    127
                }
            }
        }
        Input::Stdin => {
            if interactive
                && let Some(rc) = Config::rc_path()
                && rc.exists()
                && let Err(e) = shell.source(&rc, &[], EvaluationMode::Direct)
            {
                eprintln!("jobsh: {e}");
            }
            let read = read_lines(interactive, |line| {
                if interactive {
                    shell.record_history(line);
                }
                shell.run(line);
                shell.exit_code().is_none()
            });
            shell.cleanup_jobs();
            match (shell.exit_code(), read) {
                (Some(code), _) => code,
                (None, Err(_)) => READ_FAILURE,
                (None, Ok(())) => shell.last_status().code(),
            }
        }
    }
}

fn run_forwarding(config: &Config, input: Input) -> i32 {
    let ignore = config
        .filenames
        .ignore
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();
    let mut shell = ForwardingShell::new(ignore);
    match input {
        Input::Line(line) => shell.run(&line).code(),
        Input::Script(path, _) => {
            eprintln!("jobsh: --forward does not run scripts: {}", path.display());
            2
        }
        Input::Stdin => {
            let prompt = std::io::stdin().is_terminal();
            let mut code = 0;
            match read_lines(prompt, |line| {
                code = shell.run(line).code();
                true
            }) {
                Ok(()) => code,
                Err(_) => READ_FAILURE,
            }
        }
    }
}

fn main() {
    jobsh::logging::init();

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("jobsh: {message}");
            }
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    let config = Config::load();
    if options.dump_config {
        match toml::to_string(&config) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("jobsh: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let code = if options.forward {
        run_forwarding(&config, options.input)
    } else {
        run_system(&config, options.input)
    };
    std::process::exit(code);
}

// ─── Tests ───────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_arguments_reads_stdin() {
        assert_eq!(parse(&[]).unwrap().input, Input::Stdin);
    }

    #[test]
    fn one_line() {
        let options = parse(&["--forward", "-c", "echo hi"]).unwrap();
        assert!(options.forward);
        assert_eq!(options.input, Input::Line("echo hi".into()));
        assert!(parse(&["-c"]).is_err());
    }

    #[test]
    fn script_takes_the_rest() {
        let options = parse(&["run.sh", "-c", "x"]).unwrap();
        assert_eq!(
            options.input,
            Input::Script("run.sh".into(), vec!["-c".into(), "x".into()])
        );
    }

    #[test]
    fn unknown_flag() {
        assert_eq!(parse(&["--nope"]).unwrap_err(), "unknown option --nope");
    }
}

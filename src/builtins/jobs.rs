use super::{Builtin, Invocation};
use crate::error::Result;
use crate::job::Job;

pub struct Jobs;

impl Builtin for Jobs {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        inv.expect_args(0, 0)?;
        let lines: Vec<String> = inv
            .shell()?
            .jobs()
            .iter()
            .enumerate()
            .map(|(i, job)| format!("[{}] {:<10} {}", i + 1, state_label(job), job.description()))
            .collect();
        for line in lines {
            writeln!(inv.out(), "{line}")?;
        }
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "jobs"
    }

    fn summary(&self) -> &'static str {
        "List background and suspended jobs."
    }
}

fn state_label(job: &Job) -> &'static str {
    if job.is_paused() {
        "Suspended"
    } else if job.is_finished() {
        "Done"
    } else {
        "Running"
    }
}

/// `bg [N]`
pub struct Bg;

impl Builtin for Bg {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let args = inv.expect_args(0, 1)?;
        let shell = inv.shell()?;
        let n = shell.job_number(args.first().map(String::as_str), Job::is_paused)?;
        shell.background(n)?;
        Ok(0)
    }

    fn usage(&self) -> &'static str {
        "bg [N]"
    }

    fn summary(&self) -> &'static str {
        "Continue suspended job N (default: the newest) in the background."
    }
}

/// `fg [N]`
pub struct Fg;

impl Builtin for Fg {
    fn run(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let args = inv.expect_args(0, 1)?;
        let shell = inv.shell()?;
        let n = shell.job_number(args.first().map(String::as_str), |_| true)?;
        let status = shell.foreground(n)?;
        Ok(status.code())
    }

    fn usage(&self) -> &'static str {
        "fg [N]"
    }

    fn summary(&self) -> &'static str {
        "Bring job N (default: the newest) to the foreground, continuing it if suspended."
    }
}

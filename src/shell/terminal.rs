//! Terminal ownership for an interactive session.

use std::io::IsTerminal;
use std::os::unix::io::RawFd;

use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::{self, Pid};

use crate::job::{JobControl, give_terminal};

const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// The session's hold on its controlling terminal.
///
/// Acquired once at startup; dropping it hands the terminal back to
/// whoever owned it before and restores default signal handling.
#[derive(Debug)]
pub struct Terminal {
    /// `None` when not interactive or no standard stream is a terminal.
    fd: Option<RawFd>,
    pgid: Pid,
    previous_owner: Option<Pid>,
    /// Started in the background; the terminal is never claimed.
    background: bool,
    claimed: bool,
}

impl Terminal {
    /// No terminal: jobs run in the shell's own process group.
    pub fn detached() -> Self {
        Terminal {
            fd: None,
            pgid: unistd::getpgrp(),
            previous_owner: None,
            background: false,
            claimed: false,
        }
    }

    /// Take over the controlling terminal.
    ///
    /// Waits until the shell's process group is in the foreground (stopping
    /// itself with `SIGTTIN` while it is not), then moves to its own process
    /// group, ignores the job-control signals and makes that group the
    /// terminal's foreground group. A shell whose terminal owner cannot be
    /// signalled was started in the background and never claims it.
    pub fn acquire() -> Self {
        let Some(fd) = controlling_fd() else {
            log::info!("no terminal on standard streams; job control off");
            return Terminal::detached();
        };

        let (previous_owner, background) = wait_for_foreground(fd);
        let mut terminal = Terminal {
            fd: Some(fd),
            pgid: unistd::getpgrp(),
            previous_owner,
            background,
            claimed: false,
        };
        if background {
            log::info!("started in background; terminal left alone");
            return terminal;
        }

        let pid = unistd::getpid();
        if terminal.pgid != pid {
            match unistd::setpgid(pid, pid) {
                Ok(()) => terminal.pgid = pid,
                Err(e) => log::debug!("setpgid: {e}"),
            }
        }
        set_dispositions(SigHandler::SigIgn);
        terminal.claim();
        terminal
    }

    fn claim(&mut self) {
        if let Some(fd) = self.fd {
            give_terminal(fd, self.pgid);
            self.claimed = true;
        }
    }

    /// Process-group and terminal settings for a new job.
    pub fn job_control(&self) -> JobControl {
        JobControl {
            process_group: self.fd.is_some(),
            tty: if self.claimed { self.fd } else { None },
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.fd.is_some()
    }

    /// Take the terminal back after a foreground job.
    pub fn reclaim(&self) {
        if self.claimed
            && let Some(fd) = self.fd
        {
            give_terminal(fd, self.pgid);
        }
    }

    /// Give the terminal back and restore default signal handling, as
    /// before `exec` or at exit.
    pub fn release(&mut self) {
        if self.fd.is_none() {
            return;
        }
        if self.claimed
            && let (Some(fd), Some(owner)) = (self.fd, self.previous_owner)
        {
            give_terminal(fd, owner);
        }
        self.claimed = false;
        set_dispositions(SigHandler::SigDfl);
    }

    /// Undo [`Terminal::release`] after a failed `exec`.
    pub fn reacquire(&mut self) {
        if self.fd.is_none() {
            return;
        }
        set_dispositions(SigHandler::SigIgn);
        if !self.background {
            self.claim();
        }
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        self.release();
    }
}

/// Loop until the terminal's foreground group is ours. Returns the first
/// owner seen and whether the shell runs in the background.
fn wait_for_foreground(fd: RawFd) -> (Option<Pid>, bool) {
    let mut first_owner = None;
    loop {
        // SAFETY: tcgetpgrp only reads its argument.
        let owner = unsafe { libc::tcgetpgrp(fd) };
        if owner < 0 {
            log::debug!("tcgetpgrp: {}", std::io::Error::last_os_error());
            return (first_owner, true);
        }
        let owner = Pid::from_raw(owner);
        first_owner.get_or_insert(owner);
        if signal::kill(Pid::from_raw(-owner.as_raw()), None).is_err() {
            return (first_owner, true);
        }
        let pgid = unistd::getpgrp();
        if owner == pgid {
            return (first_owner, false);
        }
        let _ = signal::kill(Pid::from_raw(-pgid.as_raw()), Signal::SIGTTIN);
    }
}

fn controlling_fd() -> Option<RawFd> {
    if std::io::stdin().is_terminal() {
        Some(libc::STDIN_FILENO)
    } else if std::io::stdout().is_terminal() {
        Some(libc::STDOUT_FILENO)
    } else if std::io::stderr().is_terminal() {
        Some(libc::STDERR_FILENO)
    } else {
        None
    }
}

fn set_dispositions(handler: SigHandler) {
    for sig in JOB_CONTROL_SIGNALS {
        // SAFETY: only SIG_IGN and SIG_DFL are installed, no handler code runs.
        if let Err(e) = unsafe { signal::signal(sig, handler) } {
            log::warn!("signal({sig}): {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_terminal_disables_job_control() {
        let t = Terminal::detached();
        let control = t.job_control();
        assert!(!control.process_group);
        assert!(control.tty.is_none());
        assert!(!t.is_interactive());
    }

    #[test]
    fn non_terminal_counts_as_background() {
        use std::os::unix::io::AsRawFd;
        let null = std::fs::File::open("/dev/null").unwrap();
        assert_eq!(wait_for_foreground(null.as_raw_fd()), (None, true));
    }
}

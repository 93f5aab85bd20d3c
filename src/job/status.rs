//! Command status and its state machine.

/// Where a command is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    Unspawned,
    Running,
    /// Stopped by a job-control signal. Only external processes get here.
    Paused,
    Finished,
    /// Killed by a signal.
    Aborted,
}

impl StatusType {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusType::Unspawned => "Unspawned",
            StatusType::Running => "Running",
            StatusType::Paused => "Suspended",
            StatusType::Finished => "Finished",
            StatusType::Aborted => "Aborted",
        }
    }

    /// Whether `next` may follow `self`.
    ///
    /// `Unspawned -> Finished` covers stages that fail before they start.
    pub fn can_become(self, next: StatusType) -> bool {
        use StatusType::*;
        matches!(
            (self, next),
            (Unspawned, Running | Finished | Aborted)
                | (Running, Paused | Finished | Aborted)
                | (Paused, Running)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StatusType::Finished | StatusType::Aborted)
    }
}

/// A status type plus its value: the exit code for `Finished`, the signal
/// number for `Aborted` and `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub kind: StatusType,
    pub value: i32,
}

impl Default for ExitStatus {
    fn default() -> Self {
        ExitStatus {
            kind: StatusType::Unspawned,
            value: 0,
        }
    }
}

impl ExitStatus {
    pub fn finished(code: i32) -> Self {
        ExitStatus {
            kind: StatusType::Finished,
            value: code,
        }
    }

    pub fn aborted(signal: i32) -> Self {
        ExitStatus {
            kind: StatusType::Aborted,
            value: signal,
        }
    }

    pub fn paused(signal: i32) -> Self {
        ExitStatus {
            kind: StatusType::Paused,
            value: signal,
        }
    }

    pub fn running() -> Self {
        ExitStatus {
            kind: StatusType::Running,
            value: 0,
        }
    }

    pub fn success() -> Self {
        Self::finished(0)
    }

    pub fn is_success(&self) -> bool {
        self.kind == StatusType::Finished && self.value == 0
    }

    /// Conventional numeric status: the exit code, or 128 + signal.
    pub fn code(&self) -> i32 {
        match self.kind {
            StatusType::Finished => self.value,
            StatusType::Aborted | StatusType::Paused => 128 + self.value,
            StatusType::Unspawned | StatusType::Running => 0,
        }
    }

    /// Informational line for the user, if this status deserves one.
    pub fn message(&self) -> Option<String> {
        match self.kind {
            StatusType::Paused => Some("Suspended".to_string()),
            StatusType::Aborted => Some(format!("Abort {}", self.value)),
            StatusType::Finished if self.value != 0 => Some(format!("Exit {}", self.value)),
            _ => None,
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: StatusType,
    pub to: StatusType,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid status change {} -> {}",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// A status that only changes along legal edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCell(ExitStatus);

impl StatusCell {
    pub fn get(&self) -> ExitStatus {
        self.0
    }

    pub fn set(&mut self, next: ExitStatus) -> Result<(), InvalidTransition> {
        if !self.0.kind.can_become(next.kind) {
            return Err(InvalidTransition {
                from: self.0.kind,
                to: next.kind,
            });
        }
        self.0 = next;
        Ok(())
    }
}

use std::fmt;

use nix::unistd::Pid;

use crate::errors::{Error, ErrorKind, Result};

/// Shell-assigned job number. `JobId(0)` means "the most recent job".
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JobId(pub u32);

impl JobId {
    pub const CURRENT: JobId = JobId(0);

    pub fn is_current(self) -> bool {
        self == JobId::CURRENT
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Running,
    Stopped,
    /// Terminal. A job never stays in the table in this state.
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobState::Running => write!(f, "Running"),
            JobState::Stopped => write!(f, "Stopped"),
            JobState::Done => write!(f, "Done"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    id: JobId,
    /// Representative process: the last stage of the pipeline.
    pid: Pid,
    /// Stage processes that have not been reaped yet.
    pids: Vec<Pid>,
    state: JobState,
    command_text: String,
    background: bool,
}

impl Job {
    /// Fails if `pids` is empty.
    pub fn new(id: JobId, pids: &[Pid], command_text: &str, background: bool) -> Result<Self> {
        let pid = *pids.last().ok_or_else(|| Error::from(ErrorKind::EmptyJob))?;
        Ok(Self {
            id,
            pid,
            pids: pids.to_vec(),
            state: JobState::Running,
            command_text: command_text.to_string(),
            background,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn pids(&self) -> &[Pid] {
        &self.pids
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    pub fn set_background(&mut self, background: bool) {
        self.background = background;
    }

    pub fn has_process(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }

    /// Forgets a stage that has exited. Returns `true` once no stage is left.
    pub fn mark_reaped(&mut self, pid: Pid) -> bool {
        self.pids.retain(|p| *p != pid);
        self.pids.is_empty()
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        self.state = state;
    }
}

/// User-facing messages about job state changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Notice<'a> {
    Launched { id: JobId, pid: Pid },
    Done { id: JobId, command_text: &'a str },
    Stopped { id: JobId, command_text: &'a str },
    Resumed { id: JobId, command_text: &'a str },
}

impl<'a> Notice<'a> {
    pub fn done(job: &'a Job) -> Self {
        Notice::Done {
            id: job.id,
            command_text: &job.command_text,
        }
    }

    pub fn stopped(job: &'a Job) -> Self {
        Notice::Stopped {
            id: job.id,
            command_text: &job.command_text,
        }
    }

    pub fn resumed(job: &'a Job) -> Self {
        Notice::Resumed {
            id: job.id,
            command_text: &job.command_text,
        }
    }
}

impl<'a> fmt::Display for Notice<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Notice::Launched { id, pid } => write!(f, "[{}] {}", id, pid),
            Notice::Done { id, command_text } => write!(f, "\n[{}]+  Done\t\t{}", id, command_text),
            Notice::Stopped { id, command_text } => {
                write!(f, "\n[{}]+  Stopped\t\t{}", id, command_text)
            }
            Notice::Resumed { id, command_text } => write!(f, "[{}]+ {} &", id, command_text),
        }
    }
}

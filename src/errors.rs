//! Error module. See the [failure](https://crates.io/crates/failure) crate for details.

use std::fmt;
use std::result;

use failure::{Backtrace, Context, Fail};

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    ctx: Context<ErrorKind>,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.ctx.get_context()
    }

    pub(crate) fn syntax<T: AsRef<str>>(message: T) -> Error {
        Error::from(ErrorKind::Syntax(message.as_ref().to_string()))
    }

    pub(crate) fn builtin_command<T: AsRef<str>>(message: T, code: i32) -> Error {
        Error::from(ErrorKind::BuiltinCommand {
            message: message.as_ref().to_string(),
            code,
        })
    }

    pub(crate) fn command_not_found<T: AsRef<str>>(command: T) -> Error {
        Error::from(ErrorKind::CommandNotFound(command.as_ref().to_string()))
    }

    pub(crate) fn exec<T: AsRef<str>, R: fmt::Display>(command: T, reason: R) -> Error {
        Error::from(ErrorKind::Exec {
            command: command.as_ref().to_string(),
            reason: reason.to_string(),
        })
    }

    pub(crate) fn fork<R: fmt::Display>(reason: R) -> Error {
        Error::from(ErrorKind::Fork(reason.to_string()))
    }

    pub(crate) fn pipe<R: fmt::Display>(reason: R) -> Error {
        Error::from(ErrorKind::Pipe(reason.to_string()))
    }

    pub(crate) fn redirection<T: AsRef<str>, R: fmt::Display>(
        direction: Direction,
        path: T,
        reason: R,
    ) -> Error {
        Error::from(ErrorKind::Redirection {
            direction,
            path: path.as_ref().to_string(),
            reason: reason.to_string(),
        })
    }

    pub(crate) fn job_not_found<T: AsRef<str>>(job: T) -> Error {
        Error::from(ErrorKind::JobNotFound(job.as_ref().to_string()))
    }

    pub(crate) fn job_already_running(job_id: u32) -> Error {
        Error::from(ErrorKind::JobAlreadyRunning(job_id))
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.ctx.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.ctx.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.ctx, f)
    }
}

/// Which standard stream a redirection targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Syntax(String),
    BuiltinCommand { message: String, code: i32 },
    CommandNotFound(String),
    Exec { command: String, reason: String },
    Fork(String),
    Pipe(String),
    Redirection {
        direction: Direction,
        path: String,
        reason: String,
    },
    JobNotFound(String),
    JobTableFull,
    EmptyJob,
    JobAlreadyRunning(u32),
    ProcessAlreadyTracked(i32),
    NoJobControl,
    Docopt,
    Io,
    Nix,
    Readline,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ErrorKind::Syntax(ref message) => write!(f, "syntax error: {}", message),
            ErrorKind::BuiltinCommand { ref message, .. } => write!(f, "{}", message),
            ErrorKind::CommandNotFound(ref command) => write!(f, "{}: command not found", command),
            ErrorKind::Exec {
                ref command,
                ref reason,
            } => write!(f, "exec: failed to execute '{}': {}", command, reason),
            ErrorKind::Fork(ref reason) => write!(f, "fork: failed to create process: {}", reason),
            ErrorKind::Pipe(ref reason) => write!(f, "pipe: failed to create pipe: {}", reason),
            ErrorKind::Redirection {
                direction,
                ref path,
                ref reason,
            } => write!(f, "{} redirection: {}: {}", direction, path, reason),
            ErrorKind::JobNotFound(ref job) => write!(f, "{}: no such job", job),
            ErrorKind::JobTableFull => write!(f, "job table full"),
            ErrorKind::EmptyJob => write!(f, "a job needs at least one process"),
            ErrorKind::JobAlreadyRunning(job_id) => write!(f, "job {} already running", job_id),
            ErrorKind::ProcessAlreadyTracked(pid) => {
                write!(f, "process {} already belongs to a job", pid)
            }
            ErrorKind::NoJobControl => write!(f, "no job control"),
            ErrorKind::Docopt => write!(f, "Docopt error occurred"),
            ErrorKind::Io => write!(f, "I/O error occurred"),
            ErrorKind::Nix => write!(f, "Nix error occurred"),
            ErrorKind::Readline => write!(f, "Readline error occurred"),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::from(Context::new(kind))
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(ctx: Context<ErrorKind>) -> Error {
        Error { ctx }
    }
}

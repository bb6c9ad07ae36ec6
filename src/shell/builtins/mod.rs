//! myshell builtins
//!
//! Commands that run inside the shell process because they change the shell's
//! own state. Where possible the commands conform to their standard Bash
//! counterparts.

use std::iter;

use docopt::Docopt;
use serde::de::DeserializeOwned;

use self::prelude::*;

use self::cd::Cd;
use self::exit::Exit;
use self::jobs::{Bg, Fg, Jobs};

pub mod prelude {
    pub use std::io::Write;
    pub use std::process::ExitStatus;

    pub use failure::ResultExt;

    pub use super::{parse_args, BuiltinCommand, BuiltinStatus};
    pub use crate::errors::{Error, ErrorKind, Result};
    pub use crate::shell::Shell;
    pub use crate::util::ShellExitStatusExt;
}

mod cd;
mod exit;
mod jobs;

const BG_NAME: &str = "bg";
const CD_NAME: &str = "cd";
const EXIT_NAME: &str = "exit";
const FG_NAME: &str = "fg";
const JOBS_NAME: &str = "jobs";

/// Status of usage errors, e.g. an unknown option.
const USAGE_EXIT_STATUS: i32 = 2;

/// How a builtin finished.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BuiltinStatus {
    Success,
    Failure(ExitStatus),
    /// The shell should exit with the given status.
    TerminateShell(ExitStatus),
}

/// Represents a myshell builtin command such as cd or jobs.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The help string to display to the user.
    const HELP: &'static str;
    /// Runs the command with the given arguments in the `shell` environment.
    fn run(shell: &mut dyn Shell, args: &[String], stdout: &mut dyn Write)
        -> Result<BuiltinStatus>;
}

pub fn is_builtin<T: AsRef<str>>(program: T) -> bool {
    [BG_NAME, CD_NAME, EXIT_NAME, FG_NAME, JOBS_NAME].contains(&program.as_ref())
}

/// precondition: command is a builtin.
///
/// Errors are reported to stderr here and turned into a failure status.
pub fn run(
    shell: &mut dyn Shell,
    program: &str,
    args: &[String],
    stdout: &mut dyn Write,
) -> BuiltinStatus {
    debug_assert!(is_builtin(program));

    let result = match program {
        BG_NAME => Bg::run(shell, args, stdout),
        CD_NAME => Cd::run(shell, args, stdout),
        EXIT_NAME => Exit::run(shell, args, stdout),
        FG_NAME => Fg::run(shell, args, stdout),
        JOBS_NAME => Jobs::run(shell, args, stdout),
        _ => unreachable!(),
    };

    match result {
        Ok(status) => status,
        Err(e) => {
            warn!("{}: {}", program, e);
            eprintln!("{}: {}: {}", crate::shell::SHELL_NAME, program, e);
            BuiltinStatus::Failure(failure_status(&e))
        }
    }
}

fn failure_status(e: &Error) -> ExitStatus {
    let status = match *e.kind() {
        ErrorKind::BuiltinCommand { code, .. } => code,
        _ => 1,
    };
    ExitStatus::from_status(status)
}

/// Parses builtin arguments against a docopt usage string.
pub fn parse_args<D, S, I>(usage: &str, program: &str, args: I) -> Result<D>
where
    D: DeserializeOwned,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let argv = iter::once(program.to_string())
        .chain(args.into_iter().map(|s| s.as_ref().to_string()));
    Docopt::new(usage)
        .and_then(|d| d.argv(argv).deserialize())
        .map_err(|e| Error::builtin_command(e.to_string().trim(), USAGE_EXIT_STATUS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_builtin() {
        for name in &["bg", "cd", "exit", "fg", "jobs"] {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("ls"));
        assert!(!is_builtin("kill"));
    }

    #[test]
    fn test_failure_status_uses_builtin_code() {
        assert_eq!(
            failure_status(&Error::builtin_command("bad", 2)).code(),
            Some(2)
        );
        assert_eq!(
            failure_status(&Error::from(ErrorKind::NoJobControl)).code(),
            Some(1)
        );
    }
}

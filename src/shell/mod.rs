//! The shell proper: reads command lines, runs builtins and pipelines, and
//! manages jobs.

use std::io::Write;
use std::path::Path;
use std::process::ExitStatus;

use crate::core::job::JobId;
use crate::core::job_table::JobStore;
use crate::errors::{Error, Result};

use self::execute_command::WaitOutcome;

pub use self::unix::{create_shell, JobControlShell};

mod builtins;
mod editor;
pub mod execute_command;
pub mod job_control;
pub mod signals;
mod unix;

pub const SHELL_NAME: &str = "myshell";
pub const PROMPT: &str = "myshell> ";

/// Status of a line that failed to parse.
pub const SYNTAX_ERROR_EXIT_STATUS: i32 = 2;
/// Status of a stage whose program could not be found.
pub const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = 127;

/// What the caller should do after a command line has been executed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Flow {
    Continue,
    Exit(ExitStatus),
}

pub trait Shell {
    /// Parses and runs one command line.
    ///
    /// Errors that only concern the line itself (syntax errors, unknown
    /// programs, bad redirections) are reported and recorded in the last
    /// exit status; `Err` is reserved for failures of the shell itself.
    fn execute_command_string(&mut self, input: &str) -> Result<Flow>;
    fn execute_commands_from_file(&mut self, path: &Path) -> Result<Flow>;
    /// Runs the read-eval loop until end of input or `exit`, returning the
    /// status the shell should exit with.
    fn execute_from_stdin(&mut self) -> ExitStatus;
    fn exit(&mut self, n: Option<ExitStatus>) -> !;
    fn is_interactive(&self) -> bool;
    fn is_job_control_enabled(&self) -> bool;
    fn last_exit_status(&self) -> ExitStatus;

    fn jobs(&self) -> &dyn JobStore;
    fn put_job_in_foreground(&mut self, job_id: JobId, stdout: &mut dyn Write)
        -> Result<WaitOutcome>;
    fn put_job_in_background(&mut self, job_id: JobId, stdout: &mut dyn Write) -> Result<()>;
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Determines if new command entries will be added to the line editor's
    /// in-memory history.
    enable_command_history: bool,

    /// Determines if job control (fg and bg) and the interactive signal
    /// dispositions are enabled.
    enable_job_control: bool,

    /// Determines if some messages (e.g. "exit") should be displayed.
    display_messages: bool,
}

impl ShellConfig {
    /// Creates an interactive shell, e.g. command history, job control
    ///
    /// # Complete List
    /// - Command History is enabled
    /// - Job Control is enabled
    /// - Some additional messages are displayed
    pub fn interactive() -> Self {
        Self {
            enable_command_history: true,
            enable_job_control: true,
            display_messages: true,
        }
    }

    /// Creates a noninteractive shell, e.g. no command history, no job control
    ///
    /// # Complete List
    /// - Command History is disabled.
    /// - Job Control is disabled: `fg` and `bg` fail, but background jobs are
    ///   still launched and listed by `jobs`.
    /// - Fewer messages are displayed
    pub fn noninteractive() -> Self {
        Default::default()
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable_command_history: false,
            enable_job_control: false,
            display_messages: false,
        }
    }
}

/// Prints `error` to stderr the way the shell reports all user-facing errors.
pub(crate) fn report_error(error: &Error) {
    warn!("{}", error);
    eprintln!("{}: {}", SHELL_NAME, error);
}

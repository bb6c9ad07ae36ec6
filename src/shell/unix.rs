//! The JobControlShell runs pipelines in the foreground and background and
//! keeps a table of the jobs it launched.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::{self, ExitStatus};

use atty::{self, Stream};
use failure::ResultExt;
use nix::sys::signal::Signal;

use super::builtins::{self, BuiltinStatus};
use super::editor::{Editor, LineSource};
use super::execute_command::{
    continue_processes, open_output, spawn_processes, ProcessGroup, WaitOutcome,
};
use super::{
    job_control, report_error, signals, Flow, Shell, ShellConfig, PROMPT,
    SYNTAX_ERROR_EXIT_STATUS,
};
use crate::core::job::{JobId, JobState, Notice};
use crate::core::job_table::{JobStore, JobTable};
use crate::core::parser::{Command, Pipeline};
use crate::errors::{Error, ErrorKind, Result};
use crate::util::{self, ShellExitStatusExt};

/// Consecutive prompt failures tolerated before the prompt loop gives up.
const MAX_PROMPT_FAILURES: usize = 3;

pub struct JobControlShell {
    jobs: JobTable,
    /// Exit status of last command executed.
    last_exit_status: ExitStatus,
    config: ShellConfig,
    /// Is `false` if the shell is running a script or if installing the
    /// interactive signal handlers fails.
    is_interactive: bool,
}

impl JobControlShell {
    /// Constructs a shell with an empty job table. No process-wide state is
    /// touched; see [`create_shell`].
    pub fn new(config: ShellConfig) -> Self {
        Self {
            jobs: JobTable::default(),
            last_exit_status: ExitStatus::from_success(),
            config,
            is_interactive: false,
        }
    }

    fn initialize_interactive(&mut self) {
        if !self.config.enable_job_control || !atty::is(Stream::Stdin) {
            return;
        }

        match signals::install_shell_handlers() {
            Ok(()) => self.is_interactive = true,
            Err(e) => error!("failed to initialize interactive signal handling: {}", e),
        }
    }

    fn execute_pipeline(&mut self, pipeline: &Pipeline) -> Result<Flow> {
        if pipeline.len() == 1 {
            let command = &pipeline.stages[0];
            if let Some(program) = command.program() {
                if builtins::is_builtin(program) {
                    return self.execute_builtin(program, command);
                }
            }
        }

        if pipeline.background && self.jobs.is_full() {
            report_error(&Error::from(ErrorKind::JobTableFull));
            self.last_exit_status = ExitStatus::from_failure();
            return Ok(Flow::Continue);
        }

        let group = match spawn_processes(pipeline) {
            Ok(group) => group,
            Err(e) => {
                report_error(&e);
                self.last_exit_status = ExitStatus::from_failure();
                return Ok(Flow::Continue);
            }
        };

        if group.foreground {
            self.wait_for_foreground(pipeline, group)?;
        } else {
            self.register_background(pipeline, &group);
        }
        Ok(Flow::Continue)
    }

    /// Runs a builtin in the shell process. An output redirection replaces
    /// the builtin's stdout; input redirections are ignored.
    fn execute_builtin(&mut self, program: &str, command: &Command) -> Result<Flow> {
        let args = &command.argv[1..];
        let status = match command.output_file {
            Some(ref path) => match open_output(path) {
                Ok(mut file) => builtins::run(self, program, args, &mut file),
                Err(e) => {
                    report_error(&e);
                    BuiltinStatus::Failure(ExitStatus::from_failure())
                }
            },
            None => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                builtins::run(self, program, args, &mut handle)
            }
        };

        match status {
            BuiltinStatus::Success => self.last_exit_status = ExitStatus::from_success(),
            BuiltinStatus::Failure(status) => self.last_exit_status = status,
            BuiltinStatus::TerminateShell(status) => return Ok(Flow::Exit(status)),
        }
        Ok(Flow::Continue)
    }

    /// Waits for a foreground pipeline. If it stops it becomes a Stopped job;
    /// if the job table has no room for it, it is resumed and waited on again.
    fn wait_for_foreground(
        &mut self,
        pipeline: &Pipeline,
        mut group: ProcessGroup,
    ) -> Result<()> {
        loop {
            signals::set_foreground_job(true);
            let outcome = group.wait();
            signals::set_foreground_job(false);

            match outcome? {
                WaitOutcome::Exited(status) => {
                    self.last_exit_status = status;
                    return Ok(());
                }
                WaitOutcome::Stopped => {
                    let pids = group.live_pids();
                    match self.jobs.add_pipeline(&pids, &pipeline.input, false) {
                        Ok(job_id) => {
                            self.jobs.set_state(job_id, JobState::Stopped);
                            if let Some(job) = self.jobs.get(job_id) {
                                println!("{}", Notice::stopped(job));
                            }
                            self.last_exit_status = ExitStatus::from_signal(Signal::SIGTSTP);
                            return Ok(());
                        }
                        Err(e) => {
                            report_error(&e);
                            continue_processes(&pids)?;
                            group.mark_running();
                        }
                    }
                }
            }
        }
    }

    fn register_background(&mut self, pipeline: &Pipeline, group: &ProcessGroup) {
        let pids = group.live_pids();
        if pids.is_empty() {
            self.last_exit_status = group.exit_status();
            return;
        }

        match self.jobs.add_pipeline(&pids, &pipeline.input, true) {
            Ok(job_id) => {
                if let Some(job) = self.jobs.get(job_id) {
                    println!(
                        "{}",
                        Notice::Launched {
                            id: job.id(),
                            pid: job.pid(),
                        }
                    );
                }
                self.last_exit_status = ExitStatus::from_success();
            }
            Err(e) => {
                report_error(&e);
                self.last_exit_status = ExitStatus::from_failure();
            }
        }
    }

    /// Collects finished and stopped background jobs. Notices are only shown
    /// when the shell displays messages.
    fn reap_jobs(&mut self) {
        let temp_result = if self.config.display_messages {
            job_control::reap(&mut self.jobs, &mut io::stdout())
        } else {
            job_control::reap(&mut self.jobs, &mut io::sink())
        };
        log_if_err!(temp_result, "reap");
    }

    fn run_prompt_loop(&mut self, source: &mut dyn LineSource) -> ExitStatus {
        let mut failures = 0;
        loop {
            self.reap_jobs();

            let line = match source.readline(PROMPT) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    failures += 1;
                    error!("prompt: {}", e);
                    if failures >= MAX_PROMPT_FAILURES {
                        report_error(&e);
                        return ExitStatus::from_failure();
                    }
                    continue;
                }
            };
            failures = 0;

            if self.config.enable_command_history {
                source.add_history_entry(&line);
            }

            match self.execute_command_string(&line) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(status)) => return status,
                Err(e) => report_error(&e),
            }
        }

        ExitStatus::from_success()
    }

    fn check_job_control(&self) -> Result<()> {
        if self.is_job_control_enabled() {
            Ok(())
        } else {
            Err(Error::from(ErrorKind::NoJobControl))
        }
    }
}

impl Shell for JobControlShell {
    fn execute_command_string(&mut self, input: &str) -> Result<Flow> {
        let pipeline = match Pipeline::parse(input) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => return Ok(Flow::Continue),
            Err(e) => {
                if let ErrorKind::Syntax(_) = *e.kind() {
                    report_error(&e);
                    self.last_exit_status = ExitStatus::from_status(SYNTAX_ERROR_EXIT_STATUS);
                    return Ok(Flow::Continue);
                }

                return Err(e);
            }
        };

        self.execute_pipeline(&pipeline)
    }

    fn execute_commands_from_file(&mut self, path: &Path) -> Result<Flow> {
        let buffer = fs::read_to_string(path).context(ErrorKind::Io)?;
        for line in buffer.lines() {
            self.reap_jobs();
            if let Flow::Exit(status) = self.execute_command_string(line)? {
                return Ok(Flow::Exit(status));
            }
        }

        Ok(Flow::Continue)
    }

    fn execute_from_stdin(&mut self) -> ExitStatus {
        let mut editor = match Editor::new() {
            Ok(editor) => editor,
            Err(e) => {
                report_error(&e);
                return ExitStatus::from_failure();
            }
        };

        self.run_prompt_loop(&mut editor)
    }

    fn exit(&mut self, n: Option<ExitStatus>) -> ! {
        if self.config.display_messages {
            println!("exit");
        }

        let code = n
            .unwrap_or(self.last_exit_status)
            .code()
            .unwrap_or(1);

        info!("myshell has shut down with {}", code);
        process::exit(util::wrap_exit_code(code));
    }

    fn is_interactive(&self) -> bool {
        self.is_interactive
    }

    fn is_job_control_enabled(&self) -> bool {
        self.config.enable_job_control
    }

    fn last_exit_status(&self) -> ExitStatus {
        self.last_exit_status
    }

    fn jobs(&self) -> &dyn JobStore {
        &self.jobs
    }

    fn put_job_in_foreground(
        &mut self,
        job_id: JobId,
        stdout: &mut dyn Write,
    ) -> Result<WaitOutcome> {
        self.check_job_control()?;
        let outcome = job_control::foreground(&mut self.jobs, job_id, stdout)?;
        self.last_exit_status = match outcome {
            WaitOutcome::Exited(status) => status,
            WaitOutcome::Stopped => ExitStatus::from_signal(Signal::SIGTSTP),
        };
        Ok(outcome)
    }

    fn put_job_in_background(&mut self, job_id: JobId, stdout: &mut dyn Write) -> Result<()> {
        self.check_job_control()?;
        job_control::background(&mut self.jobs, job_id, stdout)
    }
}

impl fmt::Debug for JobControlShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JobControlShell {{ interactive: {}, last_exit_status: {} }}\n{:?}",
            self.is_interactive, self.last_exit_status, self.jobs
        )
    }
}

/// Creates the shell described by `config`. An interactive configuration
/// installs the shell's signal handlers when stdin is a terminal.
pub fn create_shell(config: ShellConfig) -> Result<Box<dyn Shell>> {
    let mut shell = JobControlShell::new(config);
    shell.initialize_interactive();
    info!("myshell started up (interactive: {})", shell.is_interactive());
    Ok(Box::new(shell))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn noninteractive() -> JobControlShell {
        JobControlShell::new(ShellConfig::noninteractive())
    }

    #[test]
    fn test_blank_line_is_ignored() {
        let mut shell = noninteractive();
        assert_eq!(shell.execute_command_string("   ").unwrap(), Flow::Continue);
        assert!(shell.last_exit_status().success());
    }

    #[test]
    fn test_syntax_error_status() {
        let mut shell = noninteractive();
        assert_eq!(shell.execute_command_string("cat <").unwrap(), Flow::Continue);
        assert_eq!(shell.last_exit_status().code(), Some(SYNTAX_ERROR_EXIT_STATUS));
    }

    #[test]
    fn test_last_exit_status_follows_commands() {
        let mut shell = noninteractive();
        shell.execute_command_string("false").unwrap();
        assert_eq!(shell.last_exit_status().code(), Some(1));
        shell.execute_command_string("true").unwrap();
        assert!(shell.last_exit_status().success());
        shell.execute_command_string("myshell-no-such-command").unwrap();
        assert_eq!(shell.last_exit_status().code(), Some(127));
    }

    #[test]
    fn test_exit_builtin_ends_the_script() {
        let dir = TempDir::new("myshell").unwrap();
        let script = dir.path().join("script.sh");
        let marker = dir.path().join("marker");
        fs::write(
            &script,
            format!("true\nexit 4\necho unreachable > {}\n", marker.display()),
        )
        .unwrap();

        let mut shell = noninteractive();
        let flow = shell.execute_commands_from_file(&script).unwrap();

        assert_eq!(flow, Flow::Exit(ExitStatus::from_status(4)));
        assert!(!marker.exists());
    }

    #[test]
    fn test_background_pipeline_is_tracked() {
        let mut shell = noninteractive();
        shell.execute_command_string("sleep 5 | sleep 5 &").unwrap();

        let (job_id, pids) = {
            let job = shell.jobs().get(JobId::CURRENT).unwrap();
            assert_eq!(job.command_text(), "sleep 5 | sleep 5 &");
            assert_eq!(job.state(), JobState::Running);
            (job.id(), job.pids().to_vec())
        };
        assert_eq!(job_id, JobId(1));
        assert_eq!(pids.len(), 2);

        for pid in pids {
            nix::sys::signal::kill(pid, Signal::SIGKILL).unwrap();
            let _ = nix::sys::wait::waitpid(pid, None);
        }
    }

    #[test]
    fn test_job_control_disabled() {
        let mut shell = noninteractive();
        let mut out: Vec<u8> = Vec::new();
        let err = shell
            .put_job_in_foreground(JobId::CURRENT, &mut out)
            .unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::NoJobControl);
        let err = shell
            .put_job_in_background(JobId::CURRENT, &mut out)
            .unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::NoJobControl);
    }

    #[test]
    fn test_builtin_output_redirection() {
        let dir = TempDir::new("myshell").unwrap();
        let out = dir.path().join("jobs.txt");

        let mut shell = noninteractive();
        shell
            .execute_command_string(&format!("jobs > {}", out.display()))
            .unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "No jobs\n");
    }

    #[test]
    fn test_stopped_foreground_job_is_registered() {
        let dir = TempDir::new("myshell").unwrap();
        let script = dir.path().join("stop.sh");
        fs::write(&script, "kill -STOP $$\n").unwrap();
        let command = format!("sh {}", script.display());

        let mut shell = JobControlShell::new(ShellConfig::interactive());
        assert_eq!(shell.execute_command_string(&command).unwrap(), Flow::Continue);

        assert_eq!(shell.last_exit_status().code(), Some(148));
        {
            let job = shell.jobs().get(JobId::CURRENT).unwrap();
            assert_eq!(job.id(), JobId(1));
            assert_eq!(job.state(), JobState::Stopped);
            assert_eq!(job.command_text(), command);
            assert!(!job.is_background());
        }

        let mut out: Vec<u8> = Vec::new();
        let outcome = shell.put_job_in_foreground(JobId(1), &mut out).unwrap();
        assert_eq!(outcome, WaitOutcome::Exited(ExitStatus::from_success()));
        assert!(shell.jobs().is_empty());
        assert!(shell.last_exit_status().success());
    }

    #[test]
    fn test_script_collects_finished_jobs() {
        let dir = TempDir::new("myshell").unwrap();
        let script = dir.path().join("script.sh");
        let listing = dir.path().join("jobs.txt");
        fs::write(
            &script,
            format!("true &\nsleep 0.3\njobs > {}\n", listing.display()),
        )
        .unwrap();

        let mut shell = noninteractive();
        shell.execute_commands_from_file(&script).unwrap();

        assert!(shell.jobs().is_empty());
        assert_eq!(fs::read_to_string(&listing).unwrap(), "No jobs\n");
    }

    /// Replays canned prompt results and counts how often it was asked.
    struct ScriptedSource {
        results: Vec<Result<Option<String>>>,
        reads: usize,
    }

    impl ScriptedSource {
        fn new(mut results: Vec<Result<Option<String>>>) -> Self {
            results.reverse();
            ScriptedSource { results, reads: 0 }
        }
    }

    impl LineSource for ScriptedSource {
        fn readline(&mut self, _prompt: &str) -> Result<Option<String>> {
            self.reads += 1;
            self.results.pop().unwrap_or_else(|| Err(Error::from(ErrorKind::Readline)))
        }

        fn add_history_entry(&mut self, _line: &str) {}
    }

    fn prompt_failure() -> Result<Option<String>> {
        Err(Error::from(ErrorKind::Readline))
    }

    #[test]
    fn test_prompt_gives_up_after_repeated_failures() {
        let mut source = ScriptedSource::new(vec![]);
        let status = noninteractive().run_prompt_loop(&mut source);

        assert_eq!(status.code(), Some(1));
        assert_eq!(source.reads, MAX_PROMPT_FAILURES);
    }

    #[test]
    fn test_prompt_failures_reset_after_a_line() {
        let mut source = ScriptedSource::new(vec![
            prompt_failure(),
            prompt_failure(),
            Ok(Some("true".to_string())),
            prompt_failure(),
            prompt_failure(),
            Ok(None),
        ]);
        let status = noninteractive().run_prompt_loop(&mut source);

        assert!(status.success());
        assert_eq!(source.reads, 6);
    }

    #[test]
    fn test_prompt_loop_stops_at_exit() {
        let mut source = ScriptedSource::new(vec![
            Ok(Some("false".to_string())),
            Ok(Some("exit 3".to_string())),
        ]);
        let status = noninteractive().run_prompt_loop(&mut source);

        assert_eq!(status.code(), Some(3));
        assert_eq!(source.reads, 2);
    }
}

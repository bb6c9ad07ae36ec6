//! Process orchestration: launches the stages of a pipeline as child
//! processes and wires their standard streams.
//!
//! All pipes are created before the first fork and are owned by [`Pipes`] in
//! the parent. Each child duplicates the ends it needs onto stdin/stdout,
//! applies explicit file redirections on top (so a file always wins over a
//! pipe on the same stream), and closes every pipe descriptor before `exec`.
//! The parent closes its copies once every stage has been spawned.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{self, ExitStatus};

use failure::Fail;
use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

use crate::core::parser::{Command, Pipeline};
use crate::errors::{Direction, Error, ErrorKind, Result};
use crate::shell::{report_error, signals, COMMAND_NOT_FOUND_EXIT_STATUS};
use crate::util::ShellExitStatusExt;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProcessStatus {
    Running,
    Stopped,
    Completed(ExitStatus),
}

/// How a blocking wait on a group of processes ended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WaitOutcome {
    Exited(ExitStatus),
    Stopped,
}

/// One stage of a launched pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Process {
    argv: String,
    /// `None` when the stage could not be launched.
    pid: Option<Pid>,
    status: ProcessStatus,
}

impl Process {
    fn new_external(command: &Command, pid: Pid) -> Self {
        Self {
            argv: command.argv.join(" "),
            pid: Some(pid),
            status: ProcessStatus::Running,
        }
    }

    fn failed(command: &Command, status_code: ExitStatus) -> Self {
        Self {
            argv: command.argv.join(" "),
            pid: None,
            status: ProcessStatus::Completed(status_code),
        }
    }

    pub fn argv(&self) -> &str {
        &self.argv
    }

    pub fn id(&self) -> Option<Pid> {
        self.pid
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    fn is_live(&self) -> bool {
        match self.status {
            ProcessStatus::Completed(_) => false,
            _ => self.pid.is_some(),
        }
    }

    fn status_code(&self) -> ExitStatus {
        match self.status {
            ProcessStatus::Completed(code) => code,
            _ => ExitStatus::from_success(),
        }
    }
}

/// The processes launched for one pipeline.
#[derive(Debug)]
pub struct ProcessGroup {
    pub processes: Vec<Process>,
    pub foreground: bool,
}

impl ProcessGroup {
    /// Ids of the stages that were launched and have not completed.
    pub fn live_pids(&self) -> Vec<Pid> {
        self.processes
            .iter()
            .filter(|p| p.is_live())
            .filter_map(Process::id)
            .collect()
    }

    /// Status of the pipeline, i.e. of its last stage.
    pub fn exit_status(&self) -> ExitStatus {
        self.processes
            .last()
            .map_or_else(ExitStatus::from_failure, Process::status_code)
    }

    /// Blocks until every launched stage has completed or stopped.
    pub fn wait(&mut self) -> Result<WaitOutcome> {
        for process in &mut self.processes {
            if let (Some(pid), ProcessStatus::Running) = (process.pid, process.status) {
                process.status = wait_for_process(pid)?;
                debug!("{} ({}): {:?}", pid, process.argv, process.status);
            }
        }

        if self
            .processes
            .iter()
            .any(|p| p.status == ProcessStatus::Stopped)
        {
            Ok(WaitOutcome::Stopped)
        } else {
            Ok(WaitOutcome::Exited(self.exit_status()))
        }
    }

    /// Records that stopped stages were sent `SIGCONT`.
    pub fn mark_running(&mut self) {
        for process in &mut self.processes {
            if process.status == ProcessStatus::Stopped {
                process.status = ProcessStatus::Running;
            }
        }
    }
}

/// Spawns one process per stage of `pipeline`.
///
/// Failing to create the pipes aborts the launch before anything is spawned.
/// Any other failure is local to its stage: it is reported, recorded as a
/// completed process, and the remaining stages are still launched. A fork
/// failure stops launching further stages. On return the parent holds no pipe
/// descriptors.
pub fn spawn_processes(pipeline: &Pipeline) -> Result<ProcessGroup> {
    let stage_count = pipeline.len();
    let pipes = Pipes::create(stage_count.saturating_sub(1))?;
    let pipe_fds = pipes.raw_fds();

    let mut processes = Vec::with_capacity(stage_count);
    for (i, command) in pipeline.stages.iter().enumerate() {
        let stdin_pipe = if i > 0 {
            Some(pipes.read_end(i - 1))
        } else {
            None
        };
        let stdout_pipe = if i + 1 < stage_count {
            Some(pipes.write_end(i))
        } else {
            None
        };

        match spawn_stage(command, stdin_pipe, stdout_pipe, &pipe_fds) {
            Ok(pid) => {
                debug!("spawned stage {} ({}) as {}", i, command.argv.join(" "), pid);
                processes.push(Process::new_external(command, pid));
            }
            Err(e) => {
                report_error(&e);
                let abort = matches!(*e.kind(), ErrorKind::Fork(_));
                processes.push(Process::failed(command, launch_failure_status(&e)));
                if abort {
                    warn!("aborting launch of '{}' after stage {}", pipeline.input, i);
                    break;
                }
            }
        }
    }

    pipes.close();
    Ok(ProcessGroup {
        processes,
        foreground: !pipeline.background,
    })
}

fn spawn_stage(
    command: &Command,
    stdin_pipe: Option<RawFd>,
    stdout_pipe: Option<RawFd>,
    pipe_fds: &[RawFd],
) -> Result<Pid> {
    let program = command
        .program()
        .ok_or_else(|| Error::syntax("empty command in pipeline"))?;

    // Opened here so a bad path is reported before forking. The parent's
    // copies are closed when these go out of scope.
    let input_file = match command.input_file {
        Some(ref path) => Some(open_input(path)?),
        None => None,
    };
    let output_file = match command.output_file {
        Some(ref path) => Some(open_output(path)?),
        None => None,
    };

    let redirects = Redirects {
        stdin_pipe,
        stdout_pipe,
        input_file: input_file.as_ref().map(AsRawFd::as_raw_fd),
        output_file: output_file.as_ref().map(AsRawFd::as_raw_fd),
        pipe_fds: pipe_fds.to_vec(),
    };

    let mut child = process::Command::new(program);
    child.args(&command.argv[1..]);
    // Only async-signal-safe calls happen in the closure: it runs in the
    // forked child right before exec.
    unsafe {
        child.pre_exec(move || redirects.apply());
    }

    let child = child.spawn().map_err(|e| spawn_error(program, e))?;
    Ok(Pid::from_raw(child.id() as libc::pid_t))
}

/// Descriptor plumbing performed in the child between fork and exec.
#[derive(Debug)]
struct Redirects {
    stdin_pipe: Option<RawFd>,
    stdout_pipe: Option<RawFd>,
    input_file: Option<RawFd>,
    output_file: Option<RawFd>,
    pipe_fds: Vec<RawFd>,
}

impl Redirects {
    fn apply(&self) -> io::Result<()> {
        signals::restore_default_dispositions()?;

        if let Some(fd) = self.stdin_pipe {
            unistd::dup2(fd, libc::STDIN_FILENO)?;
        }
        if let Some(fd) = self.stdout_pipe {
            unistd::dup2(fd, libc::STDOUT_FILENO)?;
        }
        if let Some(fd) = self.input_file {
            unistd::dup2(fd, libc::STDIN_FILENO)?;
        }
        if let Some(fd) = self.output_file {
            unistd::dup2(fd, libc::STDOUT_FILENO)?;
        }

        // Every pipe end must be closed here, or readers further down the
        // pipeline never see end-of-file.
        for &fd in &self.pipe_fds {
            if fd > libc::STDERR_FILENO {
                unistd::close(fd)?;
            }
        }

        Ok(())
    }
}

/// Both ends of every pipe of a pipeline, owned by the parent until all stages
/// are spawned.
struct Pipes {
    /// (`read_end_pipe`, `write_end_pipe`) for each pipe
    ends: Vec<(File, File)>,
}

impl Pipes {
    /// Creates `count` pipes. If one fails, the ones already created are
    /// closed before returning the error.
    fn create(count: usize) -> Result<Pipes> {
        let mut ends = Vec::with_capacity(count);
        for _ in 0..count {
            ends.push(create_pipe()?);
        }
        Ok(Pipes { ends })
    }

    fn read_end(&self, index: usize) -> RawFd {
        self.ends[index].0.as_raw_fd()
    }

    fn write_end(&self, index: usize) -> RawFd {
        self.ends[index].1.as_raw_fd()
    }

    fn raw_fds(&self) -> Vec<RawFd> {
        self.ends
            .iter()
            .flat_map(|(read_end, write_end)| vec![read_end.as_raw_fd(), write_end.as_raw_fd()])
            .collect()
    }

    fn close(self) {
        if !self.ends.is_empty() {
            trace!("closing {} pipe descriptors", self.ends.len() * 2);
        }
        drop(self);
    }
}

impl fmt::Debug for Pipes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipes({:?})", self.raw_fds())
    }
}

/// Wraps `unistd::pipe()` to return RAII structs instead of raw, owning file
/// descriptors. Returns (`read_end_pipe`, `write_end_pipe`).
///
/// Both ends are close-on-exec, so a process spawned by anything other than
/// this pipeline never inherits them.
fn create_pipe() -> Result<(File, File)> {
    let (read_end_pipe, write_end_pipe) = raw_pipe().map_err(Error::pipe)?;
    // It is safe to call from_raw_fd here because these Files become the sole
    // owners of the freshly created descriptors.
    unsafe {
        Ok((
            File::from_raw_fd(read_end_pipe),
            File::from_raw_fd(write_end_pipe),
        ))
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn raw_pipe() -> nix::Result<(RawFd, RawFd)> {
    unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn raw_pipe() -> nix::Result<(RawFd, RawFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let (read_end_pipe, write_end_pipe) = unistd::pipe()?;
    for &fd in &[read_end_pipe, write_end_pipe] {
        if let Err(e) = fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) {
            let _ = unistd::close(read_end_pipe);
            let _ = unistd::close(write_end_pipe);
            return Err(e);
        }
    }
    Ok((read_end_pipe, write_end_pipe))
}

pub(crate) fn open_input(path: &str) -> Result<File> {
    File::open(path).map_err(|e| Error::redirection(Direction::Input, path, e))
}

/// Opens `path` for writing, creating or truncating it.
pub(crate) fn open_output(path: &str) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| Error::redirection(Direction::Output, path, e))
}

fn spawn_error(program: &str, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        return Error::command_not_found(program);
    }

    match e.raw_os_error() {
        Some(libc::EAGAIN) | Some(libc::ENOMEM) => Error::fork(e),
        _ => Error::exec(program, e),
    }
}

fn launch_failure_status(e: &Error) -> ExitStatus {
    match *e.kind() {
        ErrorKind::CommandNotFound(_) => ExitStatus::from_status(COMMAND_NOT_FOUND_EXIT_STATUS),
        _ => ExitStatus::from_failure(),
    }
}

/// Blocks until `pid` exits, is killed, or stops.
pub fn wait_for_process(pid: Pid) -> Result<ProcessStatus> {
    waitpid_status(pid, WaitPidFlag::WUNTRACED)
}

/// Checks `pid` for a status change without blocking.
pub fn try_wait_process(pid: Pid) -> Result<ProcessStatus> {
    waitpid_status(pid, WaitPidFlag::WUNTRACED | WaitPidFlag::WNOHANG)
}

fn waitpid_status(pid: Pid, flags: WaitPidFlag) -> Result<ProcessStatus> {
    loop {
        match wait::waitpid(pid, Some(flags)) {
            Ok(WaitStatus::Exited(_, status_code)) => {
                debug!("{} exited with {}.", pid, status_code);
                return Ok(ProcessStatus::Completed(ExitStatus::from_status(
                    status_code,
                )));
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                debug!("{} terminated by signal {:?}.", pid, signal);
                return Ok(ProcessStatus::Completed(ExitStatus::from_signal(signal)));
            }
            Ok(WaitStatus::Stopped(_, signal)) => {
                debug!("{} was signaled to stop {:?}.", pid, signal);
                return Ok(ProcessStatus::Stopped);
            }
            Ok(WaitStatus::StillAlive) => return Ok(ProcessStatus::Running),
            Ok(status) => {
                trace!("ignoring wait status {:?}", status);
                if flags.contains(WaitPidFlag::WNOHANG) {
                    return Ok(ProcessStatus::Running);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => {
                warn!("{} is not a child of the shell or was already reaped", pid);
                return Ok(ProcessStatus::Completed(ExitStatus::from_failure()));
            }
            Err(e) => return Err(e.context(ErrorKind::Nix).into()),
        }
    }
}

/// Sends `SIGCONT` to every process in `pids`. Processes that already exited
/// are skipped.
pub(crate) fn continue_processes(pids: &[Pid]) -> Result<()> {
    use nix::sys::signal::{self, Signal};

    for &pid in pids {
        match signal::kill(pid, Signal::SIGCONT) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(e.context(ErrorKind::Nix).into()),
        }
    }
    Ok(())
}

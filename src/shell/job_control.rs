//! Job control operations: resuming jobs in the foreground or background and
//! collecting status changes of background jobs.
//!
//! Every function works on any [`JobStore`] and writes its user-facing notices
//! to the given writer, so the shell decides where they go.

use std::io::Write;
use std::process::ExitStatus;

use failure::ResultExt;
use nix::unistd::Pid;

use crate::core::job::{Job, JobId, JobState, Notice};
use crate::core::job_table::JobStore;
use crate::errors::{Error, ErrorKind, Result};
use crate::shell::execute_command::{
    continue_processes, try_wait_process, wait_for_process, ProcessStatus, WaitOutcome,
};
use crate::shell::signals;
use crate::util::ShellExitStatusExt;

/// Resumes a job and waits for it as the foreground job.
///
/// `JobId::CURRENT` selects the most recent job. The job's command text is
/// echoed first. A stopped job is sent `SIGCONT`. If the job stops again it
/// stays in the table as Stopped; once all of its processes have exited it is
/// removed.
pub fn foreground(
    jobs: &mut dyn JobStore,
    job_id: JobId,
    stdout: &mut dyn Write,
) -> Result<WaitOutcome> {
    let (job_id, state, pids) = {
        let job = lookup(jobs, job_id)?;
        writeln!(stdout, "{}", job.command_text()).context(ErrorKind::Io)?;
        (job.id(), job.state(), job.pids().to_vec())
    };
    debug!("putting job [{}] in foreground", job_id);

    if state == JobState::Stopped {
        continue_processes(&pids)?;
        jobs.set_state(job_id, JobState::Running);
    }
    if let Some(job) = jobs.get_mut(job_id) {
        job.set_background(false);
    }

    signals::set_foreground_job(true);
    let result = wait_for_job(jobs, job_id, &pids);
    signals::set_foreground_job(false);

    let outcome = result?;
    match outcome {
        WaitOutcome::Stopped => {
            jobs.set_state(job_id, JobState::Stopped);
            if let Some(job) = jobs.get(job_id) {
                writeln!(stdout, "{}", Notice::stopped(job)).context(ErrorKind::Io)?;
            }
        }
        WaitOutcome::Exited(status) => {
            debug!("job [{}] exited with {}", job_id, status);
            jobs.set_state(job_id, JobState::Done);
        }
    }
    Ok(outcome)
}

/// Resumes a stopped job without waiting for it.
pub fn background(jobs: &mut dyn JobStore, job_id: JobId, stdout: &mut dyn Write) -> Result<()> {
    let (job_id, pids) = {
        let job = lookup(jobs, job_id)?;
        if job.state() != JobState::Stopped {
            return Err(Error::job_already_running(job.id().0));
        }
        (job.id(), job.pids().to_vec())
    };
    debug!("putting job [{}] in background", job_id);

    continue_processes(&pids)?;
    jobs.set_state(job_id, JobState::Running);
    if let Some(job) = jobs.get_mut(job_id) {
        job.set_background(true);
        writeln!(stdout, "{}", Notice::resumed(job)).context(ErrorKind::Io)?;
    }
    Ok(())
}

/// Polls every running job without blocking.
///
/// A job whose processes have all exited is removed and announced as Done; a
/// job with a stopped process becomes Stopped and is announced.
pub fn reap(jobs: &mut dyn JobStore, stdout: &mut dyn Write) -> Result<()> {
    for job_id in jobs.ids() {
        let pids = match jobs.get(job_id) {
            Some(job) if job.state() == JobState::Running => job.pids().to_vec(),
            _ => continue,
        };

        let mut drained = false;
        let mut stopped = false;
        for pid in pids {
            match try_wait_process(pid)? {
                ProcessStatus::Completed(status) => {
                    trace!("job [{}]: {} exited with {}", job_id, pid, status);
                    if let Some(job) = jobs.get_mut(job_id) {
                        drained = job.mark_reaped(pid);
                    }
                }
                ProcessStatus::Stopped => stopped = true,
                ProcessStatus::Running => {}
            }
        }

        if drained {
            if let Some(job) = jobs.get(job_id) {
                writeln!(stdout, "{}", Notice::done(job)).context(ErrorKind::Io)?;
            }
            jobs.set_state(job_id, JobState::Done);
        } else if stopped {
            jobs.set_state(job_id, JobState::Stopped);
            if let Some(job) = jobs.get(job_id) {
                writeln!(stdout, "{}", Notice::stopped(job)).context(ErrorKind::Io)?;
            }
        }
    }
    Ok(())
}

fn lookup(jobs: &dyn JobStore, job_id: JobId) -> Result<&Job> {
    jobs.get(job_id).ok_or_else(|| {
        if job_id.is_current() {
            Error::job_not_found("current")
        } else {
            Error::job_not_found(format!("%{}", job_id))
        }
    })
}

/// Waits on every remaining process of a job, forgetting each one that exits.
fn wait_for_job(jobs: &mut dyn JobStore, job_id: JobId, pids: &[Pid]) -> Result<WaitOutcome> {
    let mut stopped = false;
    let mut status = ExitStatus::from_success();
    for &pid in pids {
        match wait_for_process(pid)? {
            ProcessStatus::Completed(code) => {
                status = code;
                if let Some(job) = jobs.get_mut(job_id) {
                    job.mark_reaped(pid);
                }
            }
            ProcessStatus::Stopped => stopped = true,
            ProcessStatus::Running => {}
        }
    }

    if stopped {
        Ok(WaitOutcome::Stopped)
    } else {
        Ok(WaitOutcome::Exited(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use std::thread;
    use std::time::{Duration, Instant};

    use nix::sys::signal::{self, Signal};
    use nix::sys::wait;

    use tempdir::TempDir;

    use crate::core::job_table::JobTable;

    fn spawn(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program).args(args).spawn().unwrap();
        Pid::from_raw(child.id() as i32)
    }

    fn kill_and_wait(pid: Pid) {
        let _ = signal::kill(pid, Signal::SIGKILL);
        let _ = wait::waitpid(pid, None);
    }

    /// Calls `reap` until `done` holds or a few seconds have passed.
    fn reap_until<F>(jobs: &mut JobTable, out: &mut Vec<u8>, done: F)
    where
        F: Fn(&JobTable) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(jobs) {
            assert!(Instant::now() < deadline, "timed out waiting for job status");
            reap(jobs, out).unwrap();
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn output(out: &[u8]) -> String {
        String::from_utf8_lossy(out).into_owned()
    }

    #[test]
    fn test_fg_without_jobs() {
        let mut jobs = JobTable::default();
        let mut out: Vec<u8> = Vec::new();

        let err = foreground(&mut jobs, JobId::CURRENT, &mut out).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::JobNotFound("current".to_string()));
        let err = foreground(&mut jobs, JobId(3), &mut out).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::JobNotFound("%3".to_string()));
        assert!(out.is_empty());
    }

    #[test]
    fn test_fg_waits_and_removes_job() {
        let mut jobs = JobTable::default();
        let mut out: Vec<u8> = Vec::new();
        let pid = spawn("sh", &["-c", "exit 3"]);
        let job_id = jobs.add(pid, "sh -c exit_3 &", true).unwrap();

        let outcome = foreground(&mut jobs, job_id, &mut out).unwrap();

        assert_eq!(outcome, WaitOutcome::Exited(ExitStatus::from_status(3)));
        assert_eq!(output(&out), "sh -c exit_3 &\n");
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_fg_continues_stopped_job() {
        let mut jobs = JobTable::default();
        let mut out: Vec<u8> = Vec::new();
        let pid = spawn("sleep", &["0.2"]);
        signal::kill(pid, Signal::SIGSTOP).unwrap();
        let job_id = jobs.add(pid, "sleep 0.2", false).unwrap();
        jobs.set_state(job_id, JobState::Stopped);

        let outcome = foreground(&mut jobs, JobId::CURRENT, &mut out).unwrap();

        assert_eq!(outcome, WaitOutcome::Exited(ExitStatus::from_success()));
        assert!(jobs.get(job_id).is_none());
    }

    #[test]
    fn test_bg_rejects_running_job() {
        let mut jobs = JobTable::default();
        let mut out: Vec<u8> = Vec::new();
        let pid = spawn("sleep", &["5"]);
        let job_id = jobs.add(pid, "sleep 5 &", true).unwrap();

        let err = background(&mut jobs, job_id, &mut out).unwrap_err();

        assert_eq!(*err.kind(), ErrorKind::JobAlreadyRunning(job_id.0));
        assert_eq!(jobs.get(job_id).unwrap().state(), JobState::Running);
        assert!(out.is_empty());
        kill_and_wait(pid);
    }

    #[test]
    fn test_stop_resume_and_finish_background_job() {
        let mut jobs = JobTable::default();
        let mut out: Vec<u8> = Vec::new();
        let pid = spawn("sleep", &["5"]);
        let job_id = jobs.add(pid, "sleep 5", true).unwrap();

        signal::kill(pid, Signal::SIGSTOP).unwrap();
        reap_until(&mut jobs, &mut out, |jobs| {
            jobs.get(job_id).map(Job::state) == Some(JobState::Stopped)
        });
        assert_eq!(output(&out), "\n[1]+  Stopped\t\tsleep 5\n");
        out.clear();

        background(&mut jobs, job_id, &mut out).unwrap();
        assert_eq!(output(&out), "[1]+ sleep 5 &\n");
        assert_eq!(jobs.get(job_id).unwrap().state(), JobState::Running);
        assert!(jobs.get(job_id).unwrap().is_background());
        out.clear();

        signal::kill(pid, Signal::SIGKILL).unwrap();
        reap_until(&mut jobs, &mut out, |jobs| jobs.is_empty());
        assert_eq!(output(&out), "\n[1]+  Done\t\tsleep 5\n");
    }

    #[test]
    fn test_reap_waits_for_every_stage() {
        let mut jobs = JobTable::default();
        let mut out: Vec<u8> = Vec::new();
        let quick = spawn("true", &[]);
        let slow = spawn("sleep", &["5"]);
        let job_id = jobs
            .add_pipeline(&[quick, slow], "true | sleep 5 &", true)
            .unwrap();

        reap_until(&mut jobs, &mut out, |jobs| {
            jobs.get(job_id).map_or(false, |job| job.pids().to_vec() == vec![slow])
        });
        assert!(out.is_empty());

        kill_and_wait(slow);
        // the shell no longer owns the status, so the job is simply drained
        reap_until(&mut jobs, &mut out, |jobs| jobs.is_empty());
        assert_eq!(output(&out), "\n[1]+  Done\t\ttrue | sleep 5 &\n");
    }

    #[test]
    fn test_reap_ignores_stopped_jobs() {
        let mut jobs = JobTable::default();
        let mut out: Vec<u8> = Vec::new();
        let pid = spawn("sleep", &["5"]);
        let job_id = jobs.add(pid, "sleep 5", false).unwrap();
        jobs.set_state(job_id, JobState::Stopped);

        reap(&mut jobs, &mut out).unwrap();

        assert_eq!(jobs.get(job_id).unwrap().state(), JobState::Stopped);
        assert!(out.is_empty());
        kill_and_wait(pid);
    }

    #[test]
    fn test_fg_ends_on_renewed_stop() {
        let dir = TempDir::new("myshell").unwrap();
        let script = dir.path().join("stop_twice.sh");
        fs::write(&script, "kill -STOP $$\nkill -STOP $$\n").unwrap();
        let script = script.display().to_string();

        let mut jobs = JobTable::default();
        let mut out: Vec<u8> = Vec::new();
        let pid = spawn("sh", &[&script]);
        let job_id = jobs.add(pid, "sh stop_twice.sh", false).unwrap();

        // first stop
        let outcome = foreground(&mut jobs, job_id, &mut out).unwrap();
        assert_eq!(outcome, WaitOutcome::Stopped);
        assert_eq!(jobs.get(job_id).unwrap().state(), JobState::Stopped);
        assert_eq!(
            output(&out),
            "sh stop_twice.sh\n\n[1]+  Stopped\t\tsh stop_twice.sh\n"
        );
        out.clear();

        // continued, then stops again
        let outcome = foreground(&mut jobs, job_id, &mut out).unwrap();
        assert_eq!(outcome, WaitOutcome::Stopped);
        let job = jobs.get(job_id).unwrap();
        assert_eq!(job.state(), JobState::Stopped);
        assert!(!job.is_background());
        assert_eq!(job.pids().to_vec(), vec![pid]);
        out.clear();

        let outcome = foreground(&mut jobs, job_id, &mut out).unwrap();
        assert_eq!(outcome, WaitOutcome::Exited(ExitStatus::from_success()));
        assert!(jobs.is_empty());
    }
}

use nix::sys::signal::Signal;
use serde_derive::Deserialize;

use crate::core::job::JobId;
use crate::core::job_table::JobListing;
use crate::shell::builtins::{self, prelude::*};
use crate::shell::execute_command::WaitOutcome;

/// Parses `%N` or `N`. A missing job spec or `0` selects the current job.
fn parse_job_spec(spec: Option<&String>) -> Result<JobId> {
    let spec = match spec {
        Some(spec) => spec,
        None => return Ok(JobId::CURRENT),
    };

    let number = spec.trim_start_matches('%');
    match number.parse::<u32>() {
        Ok(id) => Ok(JobId(id)),
        Err(_) => Err(Error::job_not_found(spec)),
    }
}

pub struct Jobs;

#[derive(Debug, Deserialize)]
struct JobsArgs {
    flag_l: bool,
    flag_p: bool,
}

impl BuiltinCommand for Jobs {
    const NAME: &'static str = builtins::JOBS_NAME;

    const HELP: &'static str = "\
jobs: display status of jobs.

Lists the active jobs, oldest first. The most recent job is marked with '+'.

Usage:
    jobs [-l | -p]

Options:
    -l  Lists process IDs in addition to the normal information.
    -p  Lists process IDs only.";

    fn run(
        shell: &mut dyn Shell,
        args: &[String],
        stdout: &mut dyn Write,
    ) -> Result<BuiltinStatus> {
        let args: JobsArgs = parse_args(Self::HELP, Self::NAME, args)?;
        debug!("{:?}", args);

        match shell.jobs().list() {
            JobListing::NoJobs if args.flag_p => {}
            listing @ JobListing::NoJobs => {
                writeln!(stdout, "{}", listing).context(ErrorKind::Io)?
            }
            JobListing::Jobs(rows) => {
                for row in rows {
                    let result = if args.flag_l {
                        writeln!(stdout, "{}", row.display_with_pid())
                    } else if args.flag_p {
                        writeln!(stdout, "{}", row.pid)
                    } else {
                        writeln!(stdout, "{}", row)
                    };
                    result.context(ErrorKind::Io)?;
                }
            }
        }

        Ok(BuiltinStatus::Success)
    }
}

pub struct Fg;

#[derive(Debug, Deserialize)]
struct FgArgs {
    arg_jobspec: Option<String>,
}

impl BuiltinCommand for Fg {
    const NAME: &'static str = builtins::FG_NAME;

    const HELP: &'static str = "\
fg: move job to the foreground.

Place the job identified by JOBSPEC in the foreground, continuing it if it
is stopped. If JOBSPEC is not present, the most recent job is used.

Usage:
    fg [<jobspec>]";

    fn run(
        shell: &mut dyn Shell,
        args: &[String],
        stdout: &mut dyn Write,
    ) -> Result<BuiltinStatus> {
        let args: FgArgs = parse_args(Self::HELP, Self::NAME, args)?;
        let job_id = parse_job_spec(args.arg_jobspec.as_ref())?;

        let status = match shell.put_job_in_foreground(job_id, stdout)? {
            WaitOutcome::Exited(status) if status.success() => BuiltinStatus::Success,
            WaitOutcome::Exited(status) => BuiltinStatus::Failure(status),
            WaitOutcome::Stopped => {
                BuiltinStatus::Failure(ExitStatus::from_signal(Signal::SIGTSTP))
            }
        };
        Ok(status)
    }
}

pub struct Bg;

#[derive(Debug, Deserialize)]
struct BgArgs {
    arg_jobspec: Option<String>,
}

impl BuiltinCommand for Bg {
    const NAME: &'static str = builtins::BG_NAME;

    const HELP: &'static str = "\
bg: move a job to the background.

Continue the stopped job identified by JOBSPEC in the background, as if it
had been started with `&'. If JOBSPEC is not present, the most recent job
is used.

Usage:
    bg [<jobspec>]";

    fn run(
        shell: &mut dyn Shell,
        args: &[String],
        stdout: &mut dyn Write,
    ) -> Result<BuiltinStatus> {
        let args: BgArgs = parse_args(Self::HELP, Self::NAME, args)?;
        let job_id = parse_job_spec(args.arg_jobspec.as_ref())?;
        shell.put_job_in_background(job_id, stdout)?;
        Ok(BuiltinStatus::Success)
    }
}

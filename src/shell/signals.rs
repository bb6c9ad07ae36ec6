//! Signal dispositions of the interactive shell and of the children it spawns.
//!
//! The shell itself survives `SIGINT` (redrawing the prompt when no foreground
//! job is running) and ignores `SIGQUIT` and `SIGTSTP`. Children get the
//! default dispositions back before `exec`.

use std::sync::atomic::{AtomicBool, Ordering};

use failure::ResultExt;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::errors::{ErrorKind, Result};
use crate::shell::PROMPT;

/// Signals whose disposition the interactive shell changes.
const SHELL_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTSTP];

static FOREGROUND_JOB: AtomicBool = AtomicBool::new(false);

/// Installs the interactive shell's handlers.
pub fn install_shell_handlers() -> Result<()> {
    let interrupt = SigAction::new(
        SigHandler::Handler(handle_interrupt),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());

    unsafe {
        signal::sigaction(Signal::SIGINT, &interrupt).context(ErrorKind::Nix)?;
        signal::sigaction(Signal::SIGQUIT, &ignore).context(ErrorKind::Nix)?;
        signal::sigaction(Signal::SIGTSTP, &ignore).context(ErrorKind::Nix)?;
    }
    debug!("installed interactive signal handlers");
    Ok(())
}

/// Resets the shell's signals to their default dispositions.
///
/// Runs in a forked child before `exec`, so it only makes async-signal-safe
/// calls.
pub fn restore_default_dispositions() -> nix::Result<()> {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for &signal in &SHELL_SIGNALS {
        unsafe {
            signal::sigaction(signal, &default)?;
        }
    }
    Ok(())
}

/// Records whether the shell is currently waiting on a foreground job.
pub fn set_foreground_job(running: bool) {
    FOREGROUND_JOB.store(running, Ordering::SeqCst);
}

pub fn is_foreground_job_running() -> bool {
    FOREGROUND_JOB.load(Ordering::SeqCst)
}

extern "C" fn handle_interrupt(_: libc::c_int) {
    write_stdout(b"\n");
    if !is_foreground_job_running() {
        write_stdout(PROMPT.as_bytes());
    }
}

fn write_stdout(bytes: &[u8]) {
    // write(2) is async-signal-safe; a short or failed write only loses the
    // redraw.
    unsafe {
        libc::write(
            libc::STDOUT_FILENO,
            bytes.as_ptr().cast::<libc::c_void>(),
            bytes.len(),
        );
    }
}

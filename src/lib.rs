//! myshell - an interactive command shell
//!
//! Parses command lines into pipelines, launches them as OS processes with
//! their standard streams wired through pipes and files, and keeps a table of
//! background and suspended jobs that can be resumed with `fg` and `bg`.

#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]

#[macro_use]
extern crate log;

/// Logs the error of a `Result` that the caller chose not to propagate.
macro_rules! log_if_err {
    ($result:expr) => {
        if let Err(e) = $result {
            error!("{}", e);
        }
    };
    ($result:expr, $fmt:expr) => {
        if let Err(e) = $result {
            error!(concat!($fmt, ": {}"), e);
        }
    };
    ($result:expr, $fmt:expr, $($arg:tt)*) => {
        if let Err(e) = $result {
            error!(concat!($fmt, ": {}"), $($arg)*, e);
        }
    };
}

pub mod core;
pub mod errors;
pub mod shell;
mod util;

pub use crate::shell::{create_shell, Flow, Shell, ShellConfig};
pub use crate::util::ShellExitStatusExt;

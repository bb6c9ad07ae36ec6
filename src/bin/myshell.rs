use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

use docopt::Docopt;
use log::{debug, error};
use myshell::errors::{Error, Result};
use myshell::{create_shell, Flow, Shell, ShellConfig, ShellExitStatusExt};
use nix::unistd::Pid;
use serde_derive::Deserialize;

const LOG_FILE_NAME: &str = ".myshell_log";

const USAGE: &str = "
myshell.

Usage:
    myshell [options]
    myshell [options] -c <command>
    myshell [options] <file>
    myshell (-h | --help)
    myshell --version

Options:
    -h --help       Show this screen.
    --version       Show version.
    -c              If the -c option is present, then commands are read from the first non-option
                        argument command_string.
    --log=<path>    File to write log to, defaults to ~/.myshell_log
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    arg_file: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_log: Option<String>,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    init_logger(args.flag_log.as_ref());
    debug!("{:?}", args);

    if args.flag_version {
        println!("myshell version {}", env!("CARGO_PKG_VERSION"));
    } else if args.flag_c || args.arg_file.is_some() {
        execute_from_command_string_or_file(&args);
    } else {
        execute_from_stdin();
    }
}

/// Logs to `path`, or to `~/.myshell_log`. The shell still runs when the log
/// file cannot be opened.
fn init_logger(path: Option<&String>) {
    let log_path = match path.map(PathBuf::from).or_else(default_log_path) {
        Some(log_path) => log_path,
        None => return,
    };
    let log_file = match fern::log_file(&log_path) {
        Ok(log_file) => log_file,
        Err(e) => {
            eprintln!("myshell: {}: {}", log_path.display(), e);
            return;
        }
    };

    let pid = Pid::this();
    let result = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Trace)
        .chain(log_file)
        .apply();
    if let Err(e) = result {
        eprintln!("myshell: failed to initialize logging: {}", e);
    }
}

fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_FILE_NAME))
}

fn execute_from_command_string_or_file(args: &Args) -> ! {
    let shell_config = ShellConfig::noninteractive();
    let mut shell = create_shell(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));

    let result = if let Some(ref command) = args.arg_command {
        shell.execute_command_string(command)
    } else if let Some(ref file_path) = args.arg_file {
        shell.execute_commands_from_file(Path::new(file_path))
    } else {
        unreachable!();
    };

    exit(result, shell.as_mut());
}

fn execute_from_stdin() -> ! {
    let shell_config = ShellConfig::interactive();
    let mut shell = create_shell(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));
    let status = shell.execute_from_stdin();
    shell.exit(Some(status))
}

fn display_error_and_exit(error: &Error) -> ! {
    error!("failed to create shell: {}", error);
    eprintln!("myshell: {}", error);
    process::exit(ExitStatus::from_failure().code().unwrap_or(1));
}

fn exit(result: Result<Flow>, shell: &mut dyn Shell) -> ! {
    match result {
        Ok(Flow::Exit(status)) => shell.exit(Some(status)),
        Ok(Flow::Continue) => shell.exit(None),
        Err(e) => {
            eprintln!("myshell: {}", e);
            shell.exit(Some(ExitStatus::from_failure()))
        }
    }
}

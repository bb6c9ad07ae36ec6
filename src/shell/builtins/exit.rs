use crate::shell::builtins::{self, prelude::*};
use crate::util::wrap_exit_code;

pub struct Exit;

impl BuiltinCommand for Exit {
    const NAME: &'static str = builtins::EXIT_NAME;

    const HELP: &'static str = "\
exit: exit [n]
    Exit the shell with a status of N. If N is omitted, the exit status
    is 0.";

    fn run(
        _shell: &mut dyn Shell,
        args: &[String],
        _stdout: &mut dyn Write,
    ) -> Result<BuiltinStatus> {
        let status_code = match args.first() {
            None => 0,
            Some(arg) => arg.parse::<i32>().map(wrap_exit_code).unwrap_or_else(|_| {
                eprintln!(
                    "{}: exit: {}: numeric argument required",
                    crate::shell::SHELL_NAME,
                    arg
                );
                builtins::USAGE_EXIT_STATUS
            }),
        };
        Ok(BuiltinStatus::TerminateShell(ExitStatus::from_status(
            status_code,
        )))
    }
}

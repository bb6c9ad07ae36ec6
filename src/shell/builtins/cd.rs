use std::env;
use std::path::PathBuf;

use crate::shell::builtins::{self, prelude::*};

pub struct Cd;

impl BuiltinCommand for Cd {
    const NAME: &'static str = builtins::CD_NAME;

    const HELP: &'static str = "\
cd: cd [dir]
    Change the current directory to DIR. The default DIR is the user's home
    directory.";

    fn run(
        _shell: &mut dyn Shell,
        args: &[String],
        _stdout: &mut dyn Write,
    ) -> Result<BuiltinStatus> {
        let dir = match args.first().map(String::as_str) {
            Some("~") | None => {
                ::dirs::home_dir().ok_or_else(|| Error::builtin_command("HOME not set", 1))?
            }
            Some(dir) => PathBuf::from(dir),
        };

        env::set_current_dir(&dir)
            .map_err(|e| Error::builtin_command(format!("{}: {}", dir.display(), e), 1))?;
        debug!("changed directory to {}", dir.display());
        Ok(BuiltinStatus::Success)
    }
}

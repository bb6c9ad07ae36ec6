use std::fmt;

use failure::Fail;
use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::{DefaultHistory, History},
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::errors::{ErrorKind, Result};

struct EditorHelper(FilenameCompleter);

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        self.0.complete(line, pos, ctx)
    }
}

impl Hinter for EditorHelper {
    type Hint = String;
}

impl Highlighter for EditorHelper {}

impl Validator for EditorHelper {}

impl Helper for EditorHelper {}

/// Line editor for the interactive prompt, with filename completion and an
/// in-memory history.
pub struct Editor {
    internal: rustyline::Editor<EditorHelper, DefaultHistory>,
}

/// Where the prompt loop reads its lines from.
pub trait LineSource {
    /// Reads one line. Returns `None` at end of input.
    fn readline(&mut self, prompt: &str) -> Result<Option<String>>;

    fn add_history_entry(&mut self, line: &str);
}

impl Editor {
    pub fn new() -> Result<Editor> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal =
            rustyline::Editor::with_config(config).map_err(|e| e.context(ErrorKind::Readline))?;
        internal.set_helper(Some(EditorHelper(FilenameCompleter::new())));

        Ok(Editor { internal })
    }
}

impl LineSource for Editor {
    /// An interrupted line comes back empty.
    fn readline(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(e) => Err(e.context(ErrorKind::Readline).into()),
        }
    }

    fn add_history_entry(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        let temp_result = self.internal.add_history_entry(line);
        log_if_err!(temp_result, "failed to add history entry");
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Editor {{ history: {} entries }}", self.internal.history().len())
    }
}

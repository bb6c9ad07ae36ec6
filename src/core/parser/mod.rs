//! myshell Parser
//!
//! A command line is split into whitespace-delimited tokens, the tokens are
//! split into stages on `|`, and each stage is parsed into a [`Command`].

pub use self::command::Command;
pub use self::lexer::tokenize;

use crate::errors::{Error, Result};

mod command;
mod lexer;

const STAGE_SEPARATOR: &str = "|";

/// All the stages of one input line.
#[derive(Clone, Debug, PartialEq)]
pub struct Pipeline {
    /// The line as typed, used as the job's display text.
    pub input: String,
    pub stages: Vec<Command>,
    pub background: bool,
}

impl Pipeline {
    /// Parses a full command line.
    ///
    /// Returns `Ok(None)` for a blank line. A separator at either end, or two
    /// adjacent separators, produce an empty stage, which is kept so the
    /// orchestrator can report it.
    pub fn parse(input: &str) -> Result<Option<Pipeline>> {
        let tokens = tokenize(input);
        if tokens.is_empty() {
            return Ok(None);
        }

        let segments: Vec<&[&str]> = tokens.split(|t| *t == STAGE_SEPARATOR).collect();
        let last_index = segments.len() - 1;
        let mut stages = Vec::with_capacity(segments.len());
        for (i, segment) in segments.into_iter().enumerate() {
            let command = Command::parse(segment)?.unwrap_or_default();
            if command.background && i != last_index {
                return Err(Error::syntax(format!("unexpected '&' before '{}'", STAGE_SEPARATOR)));
            }
            stages.push(command);
        }

        let background = stages.last().map_or(false, |c| c.background);
        let pipeline = Pipeline {
            input: input.trim().to_string(),
            stages,
            background,
        };
        debug!("parsed Pipeline: {:?}", pipeline);
        Ok(Some(pipeline))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

use crate::errors::{Error, Result};

const INPUT_REDIRECT: &str = "<";
const OUTPUT_REDIRECT: &str = ">";
const BACKGROUND: &str = "&";

/// One pipeline stage: a program, its arguments and its redirections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Command {
    /// `argv[0]` is the program. Empty for an empty pipeline stage.
    pub argv: Vec<String>,
    pub input_file: Option<String>,
    pub output_file: Option<String>,
    pub background: bool,
}

impl Command {
    /// Parses the tokens of a single stage.
    ///
    /// Returns `Ok(None)` when there is nothing to run. `<` and `>` consume the
    /// following token as a path and may appear anywhere; when repeated, the
    /// last one wins. A trailing `&` sets `background`.
    pub fn parse(tokens: &[&str]) -> Result<Option<Command>> {
        let (tokens, background) = match tokens.split_last() {
            Some((&BACKGROUND, rest)) => (rest, true),
            _ => (tokens, false),
        };

        let mut command = Command {
            background,
            ..Default::default()
        };
        let mut iter = tokens.iter();
        while let Some(&token) = iter.next() {
            match token {
                INPUT_REDIRECT => command.input_file = Some(redirect_target(token, iter.next())?),
                OUTPUT_REDIRECT => {
                    command.output_file = Some(redirect_target(token, iter.next())?)
                }
                word => command.argv.push(word.to_string()),
            }
        }

        if command.argv.is_empty() && command.input_file.is_none() && command.output_file.is_none()
        {
            if background {
                return Err(Error::syntax("unexpected '&'"));
            }
            return Ok(None);
        }

        trace!("parsed Command: {:?}", command);
        Ok(Some(command))
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }
}

fn redirect_target(operator: &str, target: Option<&&str>) -> Result<String> {
    match target {
        Some(&path) if path != INPUT_REDIRECT && path != OUTPUT_REDIRECT => Ok(path.to_string()),
        Some(&path) => Err(Error::syntax(format!(
            "unexpected '{}' after '{}'",
            path, operator
        ))),
        None => Err(Error::syntax(format!(
            "expected filename after '{}'",
            operator
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn parse(tokens: &[&str]) -> Command {
        Command::parse(tokens)
            .expect("parse failed")
            .expect("no command")
    }

    #[test]
    fn test_simple_command() {
        let command = parse(&["ls", "-l", "/tmp"]);
        assert_eq!(command.argv, vec!["ls", "-l", "/tmp"]);
        assert_eq!(command.program(), Some("ls"));
        assert!(!command.background);
        assert_eq!(command.input_file, None);
        assert_eq!(command.output_file, None);
    }

    #[test]
    fn test_redirections_interleaved_with_args() {
        let command = parse(&["<", "in.txt", "sort", "-r", ">", "out.txt", "-u"]);
        assert_eq!(command.argv, vec!["sort", "-r", "-u"]);
        assert_eq!(command.input_file.as_deref(), Some("in.txt"));
        assert_eq!(command.output_file.as_deref(), Some("out.txt"));
    }

    #[test]
    fn test_last_redirection_wins() {
        let command = parse(&["cat", ">", "a", ">", "b"]);
        assert_eq!(command.output_file.as_deref(), Some("b"));
    }

    #[test]
    fn test_trailing_ampersand_sets_background() {
        let command = parse(&["sleep", "5", "&"]);
        assert_eq!(command.argv, vec!["sleep", "5"]);
        assert!(command.background);
    }

    #[test]
    fn test_inner_ampersand_is_a_word() {
        let command = parse(&["echo", "&", "done"]);
        assert_eq!(command.argv, vec!["echo", "&", "done"]);
        assert!(!command.background);
    }

    #[test]
    fn test_empty_tokens_is_no_command() {
        assert_eq!(Command::parse(&[]).unwrap(), None);
    }

    #[test]
    fn test_lone_ampersand_is_syntax_error() {
        let err = Command::parse(&["&"]).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Syntax("unexpected '&'".to_string()));
    }

    #[test]
    fn test_dangling_redirection_is_syntax_error() {
        for tokens in &[&["cat", "<"][..], &["cat", ">"][..], &["cat", ">", "&"][..]] {
            let err = Command::parse(tokens).unwrap_err();
            match *err.kind() {
                ErrorKind::Syntax(ref message) => assert!(message.starts_with("expected filename")),
                ref kind => panic!("unexpected error kind: {:?}", kind),
            }
        }
    }

    #[test]
    fn test_operator_as_filename_is_syntax_error() {
        let err = Command::parse(&["cat", "<", ">", "out"]).unwrap_err();
        assert_eq!(
            *err.kind(),
            ErrorKind::Syntax("unexpected '>' after '<'".to_string())
        );
    }

    #[test]
    fn test_redirection_without_program_is_a_command() {
        let command = parse(&[">", "out.txt"]);
        assert!(command.is_empty());
        assert_eq!(command.output_file.as_deref(), Some("out.txt"));
    }
}

use crate::error::ShellError;
use crate::splitter::{MAX_STAGES, split_pipeline_with_limit};
use crate::tokenizer::tokenize;

/// One command of a pipeline, between two `|` (or an edge of the line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    text: String,
    command: String,
    args: Vec<String>,
}

impl Stage {
    /// Tokenize a single stage. Surrounding whitespace is not kept in the
    /// recorded text.
    pub fn parse(text: &str) -> Result<Self, ShellError> {
        let (command, args) = tokenize(text)?;
        Ok(Self {
            text: text.trim().to_owned(),
            command,
            args,
        })
    }

    /// The stage as typed by the user.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Program name, looked up in `PATH` at exec time.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Full argument vector; the first element is the command name.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// A non-empty, ordered sequence of stages whose standard streams are chained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Split and tokenize a command line, allowing up to [`MAX_STAGES`] stages.
    pub fn parse(line: &str) -> Result<Self, ShellError> {
        Self::parse_with_limit(line, MAX_STAGES)
    }

    pub fn parse_with_limit(line: &str, max_stages: usize) -> Result<Self, ShellError> {
        let stages = split_pipeline_with_limit(line, max_stages)?
            .into_iter()
            .map(Stage::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The only stage, when this is not a multi-stage pipeline.
    pub fn single(&self) -> Option<&Stage> {
        match self.stages.as_slice() {
            [stage] => Some(stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_stage_pipeline() {
        let pipeline = Pipeline::parse("echo hi | wc -l").unwrap();
        assert_eq!(pipeline.len(), 2);
        assert!(pipeline.single().is_none());

        let first = &pipeline.stages()[0];
        assert_eq!(first.command(), "echo");
        assert_eq!(first.text(), "echo hi");
        assert_eq!(first.args(), ["echo", "hi"]);

        let second = &pipeline.stages()[1];
        assert_eq!(second.command(), "wc");
        assert_eq!(second.args(), ["wc", "-l"]);
    }

    #[test]
    fn single_stage() {
        let pipeline = Pipeline::parse("  date ").unwrap();
        assert_eq!(pipeline.single().map(Stage::text), Some("date"));
    }

    #[test]
    fn empty_stage_anywhere_is_rejected() {
        for line in ["", "   ", "ls |", "| ls", "ls | | wc"] {
            assert!(
                matches!(Pipeline::parse(line), Err(ShellError::EmptyCommand)),
                "line {:?} should be rejected",
                line
            );
        }
    }
}

//! Splitting a command line into pipeline stages.

use crate::error::ShellError;

/// Maximum number of stages in one pipeline.
pub const MAX_STAGES: usize = 32;

/// The pipe delimiter between stages.
pub const PIPE: char = '|';

/// Split `line` on `|` into at most [`MAX_STAGES`] stage strings.
///
/// Segments are returned unmodified, in left-to-right order. A line without a
/// delimiter yields exactly one segment.
pub fn split_pipeline(line: &str) -> Result<Vec<&str>, ShellError> {
    split_pipeline_with_limit(line, MAX_STAGES)
}

/// Same as [`split_pipeline`] with a caller supplied stage limit.
pub fn split_pipeline_with_limit(line: &str, max: usize) -> Result<Vec<&str>, ShellError> {
    let stages: Vec<&str> = line.split(PIPE).collect();
    if stages.len() > max {
        return Err(ShellError::TooManyStages {
            count: stages.len(),
            max,
        });
    }
    Ok(stages)
}

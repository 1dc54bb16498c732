use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced by the pipeline engine to the dispatch loop.
///
/// None of these is fatal for the interpreter: each one aborts at most the
/// current line. A program that cannot be executed is not represented here,
/// because that failure is only observable inside the child, as exit status
/// [`EXEC_FAILURE_STATUS`](crate::spawn::EXEC_FAILURE_STATUS) plus a
/// diagnostic on stderr.
#[derive(Debug, Error)]
pub enum ShellError {
    /// A stage contained nothing but whitespace.
    #[error("empty command")]
    EmptyCommand,

    /// The line has more `|`-separated stages than the interpreter accepts.
    #[error("too many pipeline stages: {count} (at most {max} allowed)")]
    TooManyStages { count: usize, max: usize },

    /// The input line exceeds the configured maximum length.
    #[error("input line too long: {len} bytes (at most {max} allowed)")]
    LineTooLong { len: usize, max: usize },

    /// `exit` or `history` used as a stage of a multi-stage pipeline.
    #[error("{name}: builtin cannot be used in a pipeline")]
    BuiltinInPipeline { name: String },

    /// An inter-stage pipe could not be created.
    #[error("failed to create pipe for stage {stage}: {source}")]
    ChannelFailure {
        stage: usize,
        #[source]
        source: Errno,
    },

    /// The OS refused to create a process for a stage.
    #[error("{command}: failed to spawn process: {source}")]
    SpawnFailure {
        command: String,
        #[source]
        source: Errno,
    },

    /// Waiting for a child failed. Logged by the orchestrator, never
    /// propagated past the reap loop.
    #[error("failed to wait for process {pid}: {source}")]
    WaitFailure {
        pid: i32,
        #[source]
        source: Errno,
    },
}

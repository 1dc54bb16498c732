//! A small interactive shell built around a pipeline execution engine.
//!
//! A line such as `cat log | grep error | wc -l` is split into stages, each
//! stage is tokenized on whitespace, and the [`Orchestrator`] starts one
//! process per stage with the standard output of every stage piped into the
//! standard input of the next. Each spawned process is recorded in the
//! [`Session`] history together with its pid and spawn timestamps.
//!
//! The [`Interpreter`] wraps this in a read-eval loop with two builtins,
//! `exit` and `history`. Quoting, redirections, variables and job control are
//! intentionally not supported.

mod builtin;
pub mod channel;
pub mod config;
pub mod error;
pub mod history;
mod interpreter;
pub mod orchestrator;
pub mod pipeline;
pub mod spawn;
pub mod splitter;
pub mod tokenizer;

pub use builtin::Flow;
pub use config::{Args, Config};
pub use error::ShellError;
pub use history::{HistoryEntry, Session};
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::{Interpreter, LineSource};
pub use orchestrator::{Orchestrator, PipelineIo, PipelineState, ProcessResult};
pub use pipeline::{Pipeline, Stage};
pub use spawn::{ExitDisposition, ForkSpawner, ProcessHandle, Redirections, Spawner};

use crate::history::Session;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::io::Write;

/// What the dispatch loop should do after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// in-process, never spawning a child. They only get read access to the
/// session, so they cannot alter history.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "exit".
    fn name() -> &'static str;

    fn execute(self, session: &Session, out: &mut dyn Write) -> Result<Flow>;
}

/// Object-safe form of [`BuiltinCommand`].
pub(crate) trait BuiltinAction {
    fn execute(self: Box<Self>, session: &Session, out: &mut dyn Write) -> Result<Flow>;
}

impl<T: BuiltinCommand> BuiltinAction for T {
    fn execute(self: Box<Self>, session: &Session, out: &mut dyn Write) -> Result<Flow> {
        T::execute(*self, session, out)
    }
}

/// Usage text or an argument error produced by argh instead of a command.
struct InvalidArgs {
    output: String,
}

impl BuiltinAction for InvalidArgs {
    fn execute(self: Box<Self>, _session: &Session, out: &mut dyn Write) -> Result<Flow> {
        writeln!(out, "{}", self.output.trim_end())?;
        Ok(Flow::Continue)
    }
}

/// Creates a builtin from a command name and its arguments.
pub(crate) trait BuiltinFactory {
    fn name(&self) -> &'static str;

    /// Returns `None` when `name` is not this builtin. `args` excludes the
    /// command name.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn BuiltinAction>>;
}

pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> BuiltinFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn BuiltinAction>> {
        if name != T::name() {
            return None;
        }
        Some(match T::from_args(&[name], args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, .. }) => Box::new(InvalidArgs { output }),
        })
    }
}

/// `exit` and `history`.
pub(crate) fn default_builtins() -> Vec<Box<dyn BuiltinFactory>> {
    vec![
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<History>::default()),
    ]
}

#[derive(FromArgs)]
/// Leave the shell and print the session report.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _session: &Session, _out: &mut dyn Write) -> Result<Flow> {
        Ok(Flow::Exit)
    }
}

#[derive(FromArgs)]
/// List the commands spawned in this session, oldest first.
pub struct History {
    #[argh(switch, short = 'v')]
    /// also show pid, start and end time and spawn latency.
    pub verbose: bool,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, session: &Session, out: &mut dyn Write) -> Result<Flow> {
        if self.verbose {
            session.write_report(out)?;
        } else {
            session.write_history(out)?;
        }
        Ok(Flow::Continue)
    }
}

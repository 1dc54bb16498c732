use crate::builtin::{BuiltinAction, BuiltinFactory, Flow, default_builtins};
use crate::config::Config;
use crate::error::ShellError;
use crate::history::Session;
use crate::orchestrator::Orchestrator;
use crate::pipeline::{Pipeline, Stage};
use crate::spawn::{ExitDisposition, ForkSpawner, Spawner};
use nix::sys::signal::Signal;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Write};
use tracing::debug;

/// Where the dispatch loop gets its lines from.
pub trait LineSource {
    /// Read one line, showing `prompt`. `Ok(None)` means end of input.
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>>;
}

impl LineSource for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        match self.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.add_history_entry(line.as_str())?;
                }
                Ok(Some(line))
            }
            // Ctrl-C drops the current line.
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// The read-eval loop: recognizes builtins and hands everything else to the
/// [`Orchestrator`].
///
/// Example
/// ```no_run
/// use pipeshell::{Config, Interpreter};
/// Interpreter::new(Config::default()).repl().unwrap();
/// ```
pub struct Interpreter<S: Spawner = ForkSpawner> {
    config: Config,
    session: Session,
    orchestrator: Orchestrator<S>,
    builtins: Vec<Box<dyn BuiltinFactory>>,
}

impl Interpreter<ForkSpawner> {
    pub fn new(config: Config) -> Self {
        Self::with_spawner(config, ForkSpawner)
    }
}

impl Default for Interpreter<ForkSpawner> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<S: Spawner> Interpreter<S> {
    pub fn with_spawner(config: Config, spawner: S) -> Self {
        Self {
            config,
            session: Session::new(),
            orchestrator: Orchestrator::with_spawner(spawner),
            builtins: default_builtins(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn orchestrator(&self) -> &Orchestrator<S> {
        &self.orchestrator
    }

    /// Interactive loop on the terminal, followed by the session report.
    pub fn repl(self) -> anyhow::Result<()> {
        let mut editor = DefaultEditor::new()?;
        self.run_loop(&mut editor, &mut io::stdout(), &mut io::stderr())
    }

    /// Execute lines from `source` until `exit` or end of input, then write
    /// the session report to `out`.
    pub fn run_loop(
        mut self,
        source: &mut dyn LineSource,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> anyhow::Result<()> {
        while let Some(line) = source.read_line(&self.config.prompt)? {
            if self.execute_line(&line, out, err)? == Flow::Exit {
                break;
            }
        }
        self.session.finish(out)?;
        Ok(())
    }

    /// Execute one input line.
    ///
    /// Problems with the line or with starting its processes are reported on
    /// `err` and never end the loop; only failing to write to `out`/`err`
    /// is returned as an error.
    pub fn execute_line(
        &mut self,
        line: &str,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> anyhow::Result<Flow> {
        if line.len() > self.config.max_line_len {
            report(
                err,
                &ShellError::LineTooLong {
                    len: line.len(),
                    max: self.config.max_line_len,
                },
            )?;
            return Ok(Flow::Continue);
        }
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        let pipeline = match Pipeline::parse(line) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                report(err, &e)?;
                return Ok(Flow::Continue);
            }
        };

        if let Some(stage) = pipeline.single() {
            if let Some(builtin) = self.create_builtin(stage) {
                debug!(command = stage.command(), "running builtin");
                return builtin.execute(&self.session, out);
            }
        } else if let Some(stage) = pipeline
            .stages()
            .iter()
            .find(|stage| self.is_builtin(stage.command()))
        {
            let e = ShellError::BuiltinInPipeline {
                name: stage.command().to_owned(),
            };
            report(err, &e)?;
            return Ok(Flow::Continue);
        }

        // Children write straight to the inherited descriptors.
        out.flush()?;
        err.flush()?;

        debug!(stages = pipeline.len(), "running pipeline");
        match self.orchestrator.run(&pipeline, &mut self.session) {
            Ok(results) => {
                for result in results {
                    if !result.exit_status.success()
                        && result.exit_status != ExitDisposition::Signaled(Signal::SIGPIPE)
                    {
                        writeln!(err, "{}: {}", result.command, result.exit_status)?;
                    }
                }
            }
            Err(e) => report(err, &e)?,
        }
        Ok(Flow::Continue)
    }

    fn create_builtin(&self, stage: &Stage) -> Option<Box<dyn BuiltinAction>> {
        let args: Vec<&str> = stage.args()[1..].iter().map(String::as_str).collect();
        self.builtins
            .iter()
            .find_map(|factory| factory.try_create(stage.command(), &args))
    }

    fn is_builtin(&self, name: &str) -> bool {
        self.builtins.iter().any(|factory| factory.name() == name)
    }
}

fn report(err: &mut dyn Write, e: &ShellError) -> io::Result<()> {
    writeln!(err, "pipeshell: {}", e)
}

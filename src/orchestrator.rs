//! Building, running and reaping pipelines.

use crate::channel::{Channel, ChannelEnd, ChannelLedger};
use crate::error::ShellError;
use crate::history::{HistoryEntry, Session};
use crate::pipeline::Pipeline;
use crate::spawn::{ExitDisposition, ForkSpawner, ProcessHandle, Redirections, Spawner};
use chrono::{DateTime, Local};
use std::os::fd::{AsFd, OwnedFd};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Lifecycle of a single pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No pipeline has been run yet.
    Idle,
    /// Creating channels and spawning stages.
    Building,
    /// Every stage has been spawned.
    Running,
    /// Waiting for the stages to terminate.
    Collecting,
    Completed,
    /// A channel or a process could not be created.
    Aborted,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Position of the stage in its pipeline.
    pub stage: usize,
    pub command: String,
    pub pid: i32,
    /// `Pending` only if reaping the process failed.
    pub exit_status: ExitDisposition,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
}

/// Where the first stage reads from and the last stage writes to.
///
/// `None` means the interpreter's own stream is inherited. Descriptors given
/// here are closed once every stage has been spawned.
#[derive(Debug, Default)]
pub struct PipelineIo {
    pub stdin: Option<OwnedFd>,
    pub stdout: Option<OwnedFd>,
}

impl PipelineIo {
    pub fn inherit() -> Self {
        Self::default()
    }
}

struct Spawned {
    stage: usize,
    command: String,
    handle: ProcessHandle,
    start_time: DateTime<Local>,
    end_time: DateTime<Local>,
}

/// Runs pipelines: one process per stage, stdout of each stage piped into
/// stdin of the next.
///
/// The orchestrator exclusively owns every inter-stage channel. Once
/// [`run`](Orchestrator::run) returns, successfully or not, all of them are
/// closed and every spawned process has been waited for.
pub struct Orchestrator<S: Spawner = ForkSpawner> {
    spawner: S,
    ledger: ChannelLedger,
    state: PipelineState,
}

impl Orchestrator<ForkSpawner> {
    pub fn new() -> Self {
        Self::with_spawner(ForkSpawner)
    }
}

impl Default for Orchestrator<ForkSpawner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Spawner> Orchestrator<S> {
    pub fn with_spawner(spawner: S) -> Self {
        Self {
            spawner,
            ledger: ChannelLedger::new(),
            state: PipelineState::Idle,
        }
    }

    /// State reached by the most recent invocation.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Channel accounting across every invocation of this orchestrator.
    pub fn ledger(&self) -> &ChannelLedger {
        &self.ledger
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Run `pipeline` with the interpreter's own stdin and stdout at its ends.
    pub fn run(
        &mut self,
        pipeline: &Pipeline,
        session: &mut Session,
    ) -> Result<Vec<ProcessResult>, ShellError> {
        self.run_with(pipeline, PipelineIo::inherit(), session)
    }

    /// Run `pipeline`, recording one history entry per spawned stage, and
    /// wait for all of its processes.
    ///
    /// Failing to create a channel or a process aborts the invocation: the
    /// channels opened so far are closed, the stages already started are sent
    /// `SIGTERM` and reaped, and the error is returned. Stages that fail to
    /// exec are not errors here; they show up as a nonzero exit status.
    pub fn run_with(
        &mut self,
        pipeline: &Pipeline,
        io: PipelineIo,
        session: &mut Session,
    ) -> Result<Vec<ProcessResult>, ShellError> {
        self.transition(PipelineState::Building);
        let last = pipeline.len().saturating_sub(1);
        let mut spawned: Vec<Spawned> = Vec::with_capacity(pipeline.len());
        // Read end feeding the next stage.
        let mut handoff: Option<ChannelEnd> = None;

        for (index, stage) in pipeline.stages().iter().enumerate() {
            let channel = if index < last {
                match Channel::open(&self.ledger, index) {
                    Ok(channel) => Some(channel),
                    Err(err) => return Err(self.abort(err, handoff, spawned)),
                }
            } else {
                None
            };

            let stdin = if index == 0 {
                io.stdin.as_ref().map(|fd| fd.as_fd())
            } else {
                handoff.as_ref().map(|end| end.as_fd())
            };
            let stdout = match &channel {
                Some(channel) => Some(channel.writer.as_fd()),
                None => io.stdout.as_ref().map(|fd| fd.as_fd()),
            };

            let start_time = Local::now();
            let started = Instant::now();
            let spawn = self.spawner.spawn(stage, Redirections { stdin, stdout });
            let spawn_latency = started.elapsed();
            let end_time = Local::now();

            let handle = match spawn {
                Ok(handle) => handle,
                Err(err) => {
                    drop(channel);
                    return Err(self.abort(err, handoff, spawned));
                }
            };

            session.record(HistoryEntry::new(
                stage.command(),
                stage.text(),
                handle.pid().as_raw(),
                start_time,
                end_time,
                spawn_latency,
            ));
            spawned.push(Spawned {
                stage: index,
                command: stage.command().to_owned(),
                handle,
                start_time,
                end_time,
            });

            // The interpreter never writes into a channel. Replacing the
            // handoff closes the read end the stage just spawned inherited.
            handoff = channel.map(|Channel { reader, writer }| {
                drop(writer);
                reader
            });
        }
        drop(handoff);
        drop(io);

        self.transition(PipelineState::Running);
        self.transition(PipelineState::Collecting);
        let results = collect(spawned);
        self.transition(PipelineState::Completed);
        Ok(results)
    }

    fn abort(
        &mut self,
        err: ShellError,
        handoff: Option<ChannelEnd>,
        spawned: Vec<Spawned>,
    ) -> ShellError {
        self.transition(PipelineState::Aborted);
        warn!(error = %err, started = spawned.len(), "aborting pipeline");
        drop(handoff);
        for process in &spawned {
            process.handle.terminate();
        }
        for result in collect(spawned) {
            debug!(pid = result.pid, status = %result.exit_status, "reaped stage of aborted pipeline");
        }
        err
    }

    fn transition(&mut self, next: PipelineState) {
        trace!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }
}

/// Wait for every spawned stage. A failed wait is logged and leaves that
/// stage `Pending`; the remaining stages are still reaped.
fn collect(spawned: Vec<Spawned>) -> Vec<ProcessResult> {
    spawned
        .into_iter()
        .map(|mut process| {
            let exit_status = match process.handle.wait() {
                Ok(status) => status,
                Err(err) => {
                    warn!(error = %err, "failed to reap stage");
                    ExitDisposition::Pending
                }
            };
            debug!(
                stage = process.stage,
                pid = process.handle.pid().as_raw(),
                status = %exit_status,
                "stage finished"
            );
            ProcessResult {
                stage: process.stage,
                command: process.command,
                pid: process.handle.pid().as_raw(),
                exit_status,
                start_time: process.start_time,
                end_time: process.end_time,
            }
        })
        .collect()
}

use crate::error::ShellError;
use crate::pipeline::Stage;
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, dup2, execvp, fork};
use std::ffi::CString;
use std::fmt;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use tracing::{debug, warn};

/// Status a child exits with when its program image could not be replaced.
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// How a spawned process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Not reaped yet, or reaping failed.
    Pending,
    Exited(i32),
    Signaled(Signal),
}

impl ExitDisposition {
    /// Shell-style status code: the exit code, or 128 + signal number.
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitDisposition::Pending => None,
            ExitDisposition::Exited(code) => Some(*code),
            ExitDisposition::Signaled(signal) => Some(128 + *signal as i32),
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitDisposition::Exited(0))
    }
}

impl fmt::Display for ExitDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitDisposition::Pending => write!(f, "status unknown"),
            ExitDisposition::Exited(code) => write!(f, "exited with status {}", code),
            ExitDisposition::Signaled(signal) => write!(f, "terminated by {}", signal.as_str()),
        }
    }
}

/// The parent's view of a spawned child.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Pid,
    disposition: ExitDisposition,
}

impl ProcessHandle {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            disposition: ExitDisposition::Pending,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn disposition(&self) -> ExitDisposition {
        self.disposition
    }

    /// Block until this particular child terminates.
    ///
    /// Only this pid is waited for, so the collected status always belongs to
    /// this handle no matter in which order siblings exit.
    pub fn wait(&mut self) -> Result<ExitDisposition, ShellError> {
        if self.disposition != ExitDisposition::Pending {
            return Ok(self.disposition);
        }
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    self.disposition = ExitDisposition::Exited(code);
                    return Ok(self.disposition);
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    self.disposition = ExitDisposition::Signaled(signal);
                    return Ok(self.disposition);
                }
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(source) => {
                    return Err(ShellError::WaitFailure {
                        pid: self.pid.as_raw(),
                        source,
                    });
                }
            }
        }
    }

    /// Ask a still running child to stop. A child that already exited is not
    /// an error.
    pub fn terminate(&self) {
        if self.disposition != ExitDisposition::Pending {
            return;
        }
        match signal::kill(self.pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pid = self.pid.as_raw(), error = %e, "failed to signal child"),
        }
    }
}

/// Descriptors a child should use for its standard streams. `None` keeps the
/// stream inherited from the interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Redirections<'a> {
    pub stdin: Option<BorrowedFd<'a>>,
    pub stdout: Option<BorrowedFd<'a>>,
}

/// Creates one process per stage. The orchestrator talks to the OS only
/// through this trait.
pub trait Spawner {
    /// Start `stage` with the given standard streams and return its handle.
    /// Only ever returns in the parent.
    fn spawn(
        &mut self,
        stage: &Stage,
        redirect: Redirections<'_>,
    ) -> Result<ProcessHandle, ShellError>;
}

/// Spawns stages with `fork` + `execvp`.
#[derive(Debug, Default)]
pub struct ForkSpawner;

impl Spawner for ForkSpawner {
    fn spawn(
        &mut self,
        stage: &Stage,
        redirect: Redirections<'_>,
    ) -> Result<ProcessHandle, ShellError> {
        // Everything the child needs is allocated before forking.
        let image = ExecImage::new(stage)?;

        // SAFETY: the child only calls async-signal-safe functions (sigaction,
        // dup2, fcntl, execvp, write, _exit) before its image is replaced.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                debug!(pid = child.as_raw(), command = stage.command(), "spawned stage");
                Ok(ProcessHandle::new(child))
            }
            Ok(ForkResult::Child) => exec_stage(&image, redirect),
            Err(source) => Err(ShellError::SpawnFailure {
                command: stage.command().to_owned(),
                source,
            }),
        }
    }
}

/// Program, argv and failure message of a stage, as C strings.
struct ExecImage {
    program: CString,
    argv: Vec<CString>,
    diagnostic: Vec<u8>,
}

impl ExecImage {
    fn new(stage: &Stage) -> Result<Self, ShellError> {
        let to_c = |s: &str| {
            CString::new(s).map_err(|_| ShellError::SpawnFailure {
                command: stage.command().to_owned(),
                source: Errno::EINVAL,
            })
        };
        Ok(Self {
            program: to_c(stage.command())?,
            argv: stage
                .args()
                .iter()
                .map(|arg| to_c(arg.as_str()))
                .collect::<Result<_, _>>()?,
            diagnostic: format!("pipeshell: failed to execute '{}': ", stage.command())
                .into_bytes(),
        })
    }
}

/// Child side of a spawn: wire up stdin/stdout and become the target program.
fn exec_stage(image: &ExecImage, redirect: Redirections<'_>) -> ! {
    // Rust ignores SIGPIPE in the interpreter; children expect the default.
    // SAFETY: resetting a disposition to SIG_DFL installs no handler.
    if let Err(errno) = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) } {
        exit_with_diagnostic(image, errno);
    }
    if let Err(errno) = redirect_onto(redirect.stdin, libc::STDIN_FILENO)
        .and_then(|()| redirect_onto(redirect.stdout, libc::STDOUT_FILENO))
    {
        exit_with_diagnostic(image, errno);
    }
    match execvp(&image.program, &image.argv) {
        Err(errno) => exit_with_diagnostic(image, errno),
        Ok(never) => match never {},
    }
}

fn redirect_onto(fd: Option<BorrowedFd<'_>>, target: RawFd) -> nix::Result<()> {
    let Some(fd) = fd else {
        return Ok(());
    };
    if fd.as_raw_fd() == target {
        // dup2 onto itself would keep FD_CLOEXEC and exec would close it.
        fcntl(target, FcntlArg::F_SETFD(FdFlag::empty()))?;
        return Ok(());
    }
    loop {
        match dup2(fd.as_raw_fd(), target) {
            Err(Errno::EINTR) => continue,
            result => return result.map(drop),
        }
    }
}

fn exit_with_diagnostic(image: &ExecImage, errno: Errno) -> ! {
    write_stderr(&image.diagnostic);
    write_stderr(errno.desc().as_bytes());
    write_stderr(b"\n");
    // SAFETY: _exit skips atexit handlers and stdio buffers inherited from
    // the interpreter.
    unsafe { libc::_exit(EXEC_FAILURE_STATUS) }
}

fn write_stderr(bytes: &[u8]) {
    // SAFETY: the pointer and length come from a live slice.
    unsafe {
        libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};
    use std::os::fd::AsFd;

    fn spawn_and_wait(line: &str, redirect: Redirections<'_>) -> ExitDisposition {
        let stage = Stage::parse(line).unwrap();
        let mut handle = ForkSpawner.spawn(&stage, redirect).unwrap();
        assert!(handle.pid().as_raw() > 0);
        assert_eq!(handle.disposition(), ExitDisposition::Pending);
        handle.wait().unwrap()
    }

    #[test]
    fn exit_codes_are_collected() {
        assert_eq!(spawn_and_wait("true", Redirections::default()), ExitDisposition::Exited(0));
        assert_eq!(spawn_and_wait("false", Redirections::default()), ExitDisposition::Exited(1));
    }

    #[test]
    fn missing_program_exits_with_exec_failure_status() {
        let disposition = spawn_and_wait("nonexistent_binary_xyz", Redirections::default());
        assert_eq!(disposition, ExitDisposition::Exited(EXEC_FAILURE_STATUS));
        assert!(!disposition.success());
    }

    #[test]
    fn terminated_child_is_reported_as_signaled() {
        let stage = Stage::parse("sleep 30").unwrap();
        let mut handle = ForkSpawner.spawn(&stage, Redirections::default()).unwrap();
        handle.terminate();
        let disposition = handle.wait().unwrap();
        assert_eq!(disposition, ExitDisposition::Signaled(Signal::SIGTERM));
        assert_eq!(disposition.code(), Some(128 + 15));
        assert_eq!(disposition.to_string(), "terminated by SIGTERM");
    }

    #[test]
    fn stdout_redirection() {
        let mut out = tempfile::tempfile().unwrap();
        let redirect = Redirections {
            stdin: None,
            stdout: Some(out.as_fd()),
        };
        assert!(spawn_and_wait("echo redirected", redirect).success());

        out.seek(SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        out.read_to_string(&mut text).unwrap();
        assert_eq!(text, "redirected\n");
    }

    #[test]
    fn stdin_redirection() {
        let input = File::open("/dev/null").unwrap();
        let mut out = tempfile::tempfile().unwrap();
        let redirect = Redirections {
            stdin: Some(input.as_fd()),
            stdout: Some(out.as_fd()),
        };
        assert!(spawn_and_wait("wc -c", redirect).success());

        out.seek(SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        out.read_to_string(&mut text).unwrap();
        assert_eq!(text.trim(), "0");
    }

    #[test]
    fn wait_is_idempotent_after_reap() {
        let stage = Stage::parse("true").unwrap();
        let mut handle = ForkSpawner.spawn(&stage, Redirections::default()).unwrap();
        assert!(handle.wait().unwrap().success());
        assert!(handle.wait().unwrap().success());
        handle.terminate();
    }
}

//! Inter-stage pipes with owned, self-closing ends.
//!
//! Every end is close-on-exec: a child only keeps the copies `dup2` places on
//! its stdin and stdout, so no stage ever holds a stray end past `exec`.

use crate::error::ShellError;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts pipes created and ends still open for one orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ChannelLedger {
    inner: Arc<LedgerCounts>,
}

#[derive(Debug, Default)]
struct LedgerCounts {
    created: AtomicUsize,
    open_ends: AtomicUsize,
}

impl ChannelLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pipes created so far.
    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    /// Number of pipe ends not yet closed.
    pub fn open_ends(&self) -> usize {
        self.inner.open_ends.load(Ordering::SeqCst)
    }

    fn track(&self, fd: OwnedFd) -> ChannelEnd {
        self.inner.open_ends.fetch_add(1, Ordering::SeqCst);
        ChannelEnd {
            fd,
            ledger: self.clone(),
        }
    }
}

/// One end of an inter-stage pipe. The descriptor is closed on drop.
#[derive(Debug)]
pub struct ChannelEnd {
    fd: OwnedFd,
    ledger: ChannelLedger,
}

impl AsFd for ChannelEnd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for ChannelEnd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for ChannelEnd {
    fn drop(&mut self) {
        self.ledger.inner.open_ends.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A freshly created pipe: data written to `writer` is read from `reader`.
#[derive(Debug)]
pub struct Channel {
    pub reader: ChannelEnd,
    pub writer: ChannelEnd,
}

impl Channel {
    /// Create a close-on-exec pipe connecting stage `stage` to the next one.
    pub fn open(ledger: &ChannelLedger, stage: usize) -> Result<Self, ShellError> {
        let (reader, writer) =
            cloexec_pipe().map_err(|source| ShellError::ChannelFailure { stage, source })?;
        ledger.inner.created.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            reader: ledger.track(reader),
            writer: ledger.track(writer),
        })
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};

    let (reader, writer) = nix::unistd::pipe()?;
    for fd in [&reader, &writer] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((reader, writer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};
    use std::fs::File;
    use std::io::{Read, Write};

    #[test]
    fn ledger_tracks_open_ends() {
        let ledger = ChannelLedger::new();
        let channel = Channel::open(&ledger, 0).unwrap();
        assert_eq!(ledger.created(), 1);
        assert_eq!(ledger.open_ends(), 2);

        let Channel { reader, writer } = channel;
        drop(writer);
        assert_eq!(ledger.open_ends(), 1);
        drop(reader);
        assert_eq!(ledger.open_ends(), 0);
        assert_eq!(ledger.created(), 1);
    }

    #[test]
    fn ends_are_close_on_exec() {
        let ledger = ChannelLedger::new();
        let channel = Channel::open(&ledger, 0).unwrap();
        for end in [&channel.reader, &channel.writer] {
            let flags = fcntl(end.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
            assert!(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn data_flows_from_writer_to_reader() {
        let ledger = ChannelLedger::new();
        let Channel { reader, writer } = Channel::open(&ledger, 0).unwrap();

        let mut sink = File::from(writer.fd.try_clone().unwrap());
        sink.write_all(b"ping").unwrap();
        drop(sink);
        drop(writer);

        let mut source = File::from(reader.fd.try_clone().unwrap());
        drop(reader);
        let mut buf = String::new();
        source.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "ping");
        assert_eq!(ledger.open_ends(), 0);
    }
}

//! Per-session record of every spawned stage.

use chrono::{DateTime, Local};
use std::io::{self, Write};
use std::time::Duration;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Telemetry for one spawned stage. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    command: String,
    text: String,
    pid: i32,
    start_time: DateTime<Local>,
    end_time: DateTime<Local>,
    spawn_latency: Duration,
}

impl HistoryEntry {
    pub fn new(
        command: impl Into<String>,
        text: impl Into<String>,
        pid: i32,
        start_time: DateTime<Local>,
        end_time: DateTime<Local>,
        spawn_latency: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            text: text.into(),
            pid,
            start_time,
            end_time,
            spawn_latency,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// The whole stage, command name included.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Taken right before the process was created.
    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    /// Taken right after process creation returned in the parent.
    pub fn end_time(&self) -> DateTime<Local> {
        self.end_time
    }

    /// Time spent creating the process, measured on a monotonic clock.
    ///
    /// This is not how long the command ran: children are still running when
    /// the end timestamp is taken.
    pub fn spawn_latency(&self) -> Duration {
        self.spawn_latency
    }

    fn write_summary(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Command: {}", self.command)?;
        writeln!(out, "Arguments: {}", self.text)
    }

    fn write_details(&self, out: &mut dyn Write) -> io::Result<()> {
        self.write_summary(out)?;
        writeln!(out, "Pid: {}", self.pid)?;
        writeln!(out, "Start time: {}", self.start_time.format(TIME_FORMAT))?;
        writeln!(out, "End time: {}", self.end_time.format(TIME_FORMAT))?;
        writeln!(out, "Spawn latency: {} us", self.spawn_latency.as_micros())
    }
}

/// Owns the history of one interpreter run.
///
/// Entries are only ever appended; there is no capacity limit.
#[derive(Debug, Default)]
pub struct Session {
    history: Vec<HistoryEntry>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Command name and full text of each entry, as printed by `history`.
    pub fn write_history(&self, out: &mut dyn Write) -> io::Result<()> {
        for entry in &self.history {
            entry.write_summary(out)?;
            writeln!(out)?;
        }
        Ok(())
    }

    /// Every recorded field of each entry.
    pub fn write_report(&self, out: &mut dyn Write) -> io::Result<()> {
        for entry in &self.history {
            entry.write_details(out)?;
            writeln!(out)?;
        }
        Ok(())
    }

    /// End the session, writing the exit banner followed by the full report.
    pub fn finish(self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Exiting pipeshell")?;
        writeln!(out)?;
        self.write_report(out)?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(command: &str, text: &str, pid: i32) -> HistoryEntry {
        let now = Local::now();
        HistoryEntry::new(command, text, pid, now, now, Duration::from_micros(42))
    }

    #[test]
    fn entries_keep_insertion_order() {
        let mut session = Session::new();
        session.record(entry("echo", "echo hi", 10));
        session.record(entry("wc", "wc -l", 11));

        let commands: Vec<&str> = session.entries().iter().map(HistoryEntry::command).collect();
        assert_eq!(commands, vec!["echo", "wc"]);
        assert_eq!(session.entries()[1].pid(), 11);
    }

    #[test]
    fn history_listing_shows_command_and_text() {
        let mut session = Session::new();
        session.record(entry("ls", "ls -la /tmp", 1));

        let mut out = Vec::new();
        session.write_history(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Command: ls\nArguments: ls -la /tmp\n\n"
        );
    }

    #[test]
    fn history_listing_is_repeatable() {
        let mut session = Session::new();
        session.record(entry("true", "true", 1));
        session.record(entry("false", "false", 2));

        let mut first = Vec::new();
        let mut second = Vec::new();
        session.write_history(&mut first).unwrap();
        session.write_history(&mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(session.entries().len(), 2);
    }

    #[test]
    fn final_report_contains_every_field() {
        let mut session = Session::new();
        session.record(entry("date", "date -u", 4242));

        let mut out = Vec::new();
        session.finish(&mut out).unwrap();
        let report = String::from_utf8(out).unwrap();

        assert!(report.starts_with("Exiting pipeshell\n\n"));
        assert!(report.contains("Command: date\n"));
        assert!(report.contains("Arguments: date -u\n"));
        assert!(report.contains("Pid: 4242\n"));
        assert!(report.contains("Start time: "));
        assert!(report.contains("End time: "));
        assert!(report.contains("Spawn latency: 42 us\n"));
    }

    #[test]
    fn empty_session_reports_banner_only() {
        let mut out = Vec::new();
        Session::new().finish(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Exiting pipeshell\n\n");
    }
}

//! The report channel (C8): the one-way stream of access records an
//! injected process sends to its controller, per spec section 5/6.
//!
//! A [`ReportChannel`] wraps any `Write + Send` sink — in the DLL this is a
//! `File` built from a handle duplicated into the child at launch; in the
//! CLI's replay tooling it is a plain file or an in-memory buffer. Writes
//! are serialized behind a mutex because multiple detour call sites can
//! race to emit a record for the same handle.

pub mod framing;
pub mod json;
pub mod redact;

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use sandbox_core::{ReportChannelError, ReportRecord};

/// Past this many consecutive write failures the channel stops trying and
/// answers every further `emit` with [`ReportChannelError::TornDown`].
/// Section 4.8 leaves the exact number unspecified; 16 mirrors the
/// controller's own default retry budget for the duplicated pipe handle.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 16;

pub struct ReportChannel<W: Write + Send> {
    sink: Mutex<W>,
    failures: AtomicU32,
    threshold: u32,
    torn_down: AtomicBool,
}

impl<W: Write + Send> ReportChannel<W> {
    pub fn new(sink: W) -> Self {
        Self::with_threshold(sink, DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn with_threshold(sink: W, threshold: u32) -> Self {
        Self {
            sink: Mutex::new(sink),
            failures: AtomicU32::new(0),
            threshold,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Whether repeated failures have already torn this channel down.
    /// The attach bootstrap polls this after every batch of handler calls
    /// to decide whether to run the internal-error teardown.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// How many consecutive write failures have been observed. Resets to
    /// zero on the next successful write.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Frames and writes one record. A handler calls this after an access
    /// check returns a report-eligible result; the call never blocks on
    /// the controller's consumption of the channel beyond the OS pipe's
    /// own buffering.
    pub fn emit(&self, record: &ReportRecord) -> Result<(), ReportChannelError> {
        if self.is_torn_down() {
            return Err(ReportChannelError::TornDown);
        }
        let mut sink = self.sink.lock().expect("report channel sink mutex poisoned");
        match framing::write_record(&mut *sink, record) {
            Ok(()) => {
                self.failures.store(0, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                tracing::warn!(failures, error = %e, "report channel write failed");
                if failures >= self.threshold {
                    self.torn_down.store(true, Ordering::Release);
                    tracing::error!(threshold = self.threshold, "report channel torn down after repeated failures");
                }
                Err(ReportChannelError::SinkWrite(e.to_string()))
            }
        }
    }

    /// Flushes the underlying sink. Detour handlers do not call this per
    /// record — only the bootstrap's shutdown path, so report delivery is
    /// not serialized on every access check.
    pub fn flush(&self) -> std::io::Result<()> {
        self.sink.lock().expect("report channel sink mutex poisoned").flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandbox_core::{Action, CorrelationId, OperationId, PipId, ReportLevel, Usn};

    fn sample(id: u64) -> ReportRecord {
        ReportRecord::new(
            OperationId(id),
            CorrelationId(id),
            PipId(1),
            "CreateFile",
            r"C:\src\a.txt",
            0x1,
            Action::Allow,
            ReportLevel::Report,
            0,
            Usn(0),
        )
    }

    #[test]
    fn emits_are_readable_back_in_order() {
        let channel = ReportChannel::new(Vec::<u8>::new());
        for i in 0..3 {
            channel.emit(&sample(i)).unwrap();
        }
        let buf = channel.sink.lock().unwrap().clone();
        let records = framing::read_all(std::io::Cursor::new(buf)).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].operation_id, OperationId(2));
    }

    /// A sink whose every write fails, to drive the channel into
    /// `TornDown` without needing a real broken pipe.
    struct FailingSink;
    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("simulated broken pipe"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tears_down_after_the_failure_threshold() {
        let channel = ReportChannel::with_threshold(FailingSink, 3);
        for _ in 0..3 {
            assert!(channel.emit(&sample(0)).is_err());
        }
        assert!(channel.is_torn_down());
        match channel.emit(&sample(0)) {
            Err(ReportChannelError::TornDown) => {}
            other => panic!("expected TornDown, got {other:?}"),
        }
    }

    #[test]
    fn a_success_resets_the_failure_counter() {
        let channel = ReportChannel::with_threshold(Vec::<u8>::new(), 2);
        channel.emit(&sample(0)).unwrap();
        assert_eq!(channel.failure_count(), 0);
    }
}

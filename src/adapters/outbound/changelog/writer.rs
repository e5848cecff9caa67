use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::domain::models::ObjectChange;
use crate::ports::changelog::{ChangeSink, SinkError};

struct WriterState {
    out: Box<dyn Write + Send>,
    first: bool,
    closed: bool,
}

/// Streaming JSON-array writer for change logs.
///
/// Emits `[\n`, then elements separated by `,\n` with two-space
/// indentation, then `\n]\n` on close. Appends from concurrent callers are
/// serialized by an internal lock; batch-internal order is never changed.
pub struct FileChangeLog {
    state: Mutex<WriterState>,
}

impl FileChangeLog {
    /// Create (truncating) a log file at `path`
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Self::from_writer(Box::new(BufWriter::new(file)))
    }

    /// Stream the log to standard output
    pub fn stdout() -> Result<Self, SinkError> {
        Self::from_writer(Box::new(io::stdout()))
    }

    pub fn from_writer(mut out: Box<dyn Write + Send>) -> Result<Self, SinkError> {
        out.write_all(b"[\n")?;
        Ok(Self {
            state: Mutex::new(WriterState {
                out,
                first: true,
                closed: false,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WriterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ChangeSink for FileChangeLog {
    fn append_batch(&self, changes: &[ObjectChange]) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }

        for change in changes {
            if state.first {
                state.first = false;
            } else {
                state.out.write_all(b",\n")?;
            }
            state.out.write_all(b"  ")?;
            let encoded = serde_json::to_vec(change)?;
            state.out.write_all(&encoded)?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.closed {
            return Ok(());
        }
        state.out.write_all(b"\n]\n")?;
        state.out.flush()?;
        state.closed = true;
        Ok(())
    }
}

impl Drop for FileChangeLog {
    fn drop(&mut self) {
        // Finalize the array if the caller forgot to
        let _ = self.close();
    }
}

/// In-memory sink for tests and the collect API
#[derive(Default)]
pub struct MemoryChangeLog {
    changes: Mutex<Vec<ObjectChange>>,
    closed: std::sync::atomic::AtomicBool,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_changes(self) -> Vec<ObjectChange> {
        match self.changes.into_inner() {
            Ok(changes) => changes,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> Vec<ObjectChange> {
        match self.changes.lock() {
            Ok(changes) => changes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ChangeSink for MemoryChangeLog {
    fn append_batch(&self, changes: &[ObjectChange]) -> Result<(), SinkError> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        match self.changes.lock() {
            Ok(mut guard) => guard.extend_from_slice(changes),
            Err(poisoned) => poisoned.into_inner().extend_from_slice(changes),
        }
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}

use std::sync::{Arc, Mutex};

/// Append-only log of human-readable initialization status lines.
///
/// Producers append; consumers poll `snapshot` or `tail_from` at their
/// own pace. Lines are ordered and never removed, so a consumer that
/// remembers how far it has read sees every event exactly once.
#[derive(Clone, Default)]
pub struct ProgressLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!("[engine-init] {}", line);
        self.entries.lock().expect("progress log poisoned").push(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().expect("progress log poisoned").clone()
    }

    /// Lines appended at or after `start`. Enables incremental polling:
    /// pass the previously observed length to get only what is new.
    pub fn tail_from(&self, start: usize) -> Vec<String> {
        let entries = self.entries.lock().expect("progress log poisoned");
        entries.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("progress log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

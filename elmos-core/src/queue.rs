//! Insmod/rmmod queue
//!
//! Two ordered lists of module names (or the wildcard) that the emulator-launch
//! step loads or unloads on the next boot. A value lives in at most one of the
//! two lists, and never twice in the same one.

use crate::error::QueueError;
use crate::queue_file::QueueFile;

/// Queue entry meaning "every module"
pub const WILDCARD: &str = "all";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    Insmod,
    Rmmod,
}

impl QueueKind {
    /// Variable name in the queue file
    pub fn var_name(&self) -> &'static str {
        match self {
            QueueKind::Insmod => "MODULE_INS",
            QueueKind::Rmmod => "MODULE_REM",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QueueKind::Insmod => "insmod",
            QueueKind::Rmmod => "rmmod",
        }
    }

    pub fn opposite(&self) -> QueueKind {
        match self {
            QueueKind::Insmod => QueueKind::Rmmod,
            QueueKind::Rmmod => QueueKind::Insmod,
        }
    }
}

/// Result of an enqueue request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Added,
    AlreadyQueued,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueState {
    pub insmod: Vec<String>,
    pub rmmod: Vec<String>,
}

impl QueueState {
    pub fn queue(&self, kind: QueueKind) -> &[String] {
        match kind {
            QueueKind::Insmod => &self.insmod,
            QueueKind::Rmmod => &self.rmmod,
        }
    }

    pub(crate) fn queue_mut(&mut self, kind: QueueKind) -> &mut Vec<String> {
        match kind {
            QueueKind::Insmod => &mut self.insmod,
            QueueKind::Rmmod => &mut self.rmmod,
        }
    }

    /// Literal membership
    pub fn contains(&self, kind: QueueKind, value: &str) -> bool {
        self.queue(kind).iter().any(|v| v == value)
    }

    /// Whether a module is selected by a queue, directly or via the wildcard
    pub fn matches(&self, kind: QueueKind, module: &str) -> bool {
        self.contains(kind, WILDCARD) || self.contains(kind, module)
    }

    pub fn is_empty(&self) -> bool {
        self.insmod.is_empty() && self.rmmod.is_empty()
    }

    /// Append `value` to `kind` and drop it from the other queue.
    pub fn insert(&mut self, kind: QueueKind, value: &str) -> Outcome {
        if self.contains(kind, value) {
            return Outcome::AlreadyQueued;
        }
        self.queue_mut(kind).push(value.to_string());
        self.queue_mut(kind.opposite()).retain(|v| v != value);
        Outcome::Added
    }

    pub fn clear(&mut self) {
        self.insmod.clear();
        self.rmmod.clear();
    }
}

/// Owns the queue state and writes it back after every mutation
#[derive(Debug)]
pub struct QueueManager {
    store: QueueFile,
    state: QueueState,
}

impl QueueManager {
    /// Load the current state from `store`
    pub fn open(store: QueueFile) -> Result<Self, QueueError> {
        let state = store.load()?;
        Ok(Self { store, state })
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    pub fn store(&self) -> &QueueFile {
        &self.store
    }

    pub fn enqueue_insmod(&mut self, value: &str) -> Result<Outcome, QueueError> {
        self.enqueue(QueueKind::Insmod, value)
    }

    pub fn enqueue_rmmod(&mut self, value: &str) -> Result<Outcome, QueueError> {
        self.enqueue(QueueKind::Rmmod, value)
    }

    pub fn enqueue(&mut self, kind: QueueKind, value: &str) -> Result<Outcome, QueueError> {
        let mut next = self.state.clone();
        let outcome = next.insert(kind, value);
        if outcome == Outcome::AlreadyQueued {
            tracing::debug!(queue = kind.label(), value, "already queued");
            return Ok(outcome);
        }

        self.store.save(&next)?;
        self.state = next;
        tracing::info!(queue = kind.label(), value, "queued");
        Ok(outcome)
    }

    /// Empty both queues
    pub fn reset(&mut self) -> Result<(), QueueError> {
        let empty = QueueState::default();
        self.store.save(&empty)?;
        self.state = empty;
        tracing::info!("queue reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &tempfile::TempDir) -> QueueManager {
        QueueManager::open(QueueFile::new(dir.path().join(".elmos-queue"))).unwrap()
    }

    fn assert_exclusive(state: &QueueState) {
        for v in &state.insmod {
            assert!(!state.rmmod.contains(v), "{} in both queues", v);
        }
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = manager(&dir);

        assert_eq!(queue.enqueue_insmod("hello").unwrap(), Outcome::Added);
        let before = queue.state().clone();
        assert_eq!(queue.enqueue_insmod("hello").unwrap(), Outcome::AlreadyQueued);
        assert_eq!(queue.state(), &before);
        assert_eq!(queue.state().insmod, vec!["hello"]);
    }

    #[test]
    fn test_already_queued_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = manager(&dir);
        queue.enqueue_rmmod("hello").unwrap();

        // Remove the file; a no-op enqueue must not recreate it
        std::fs::remove_file(queue.store().path()).unwrap();
        assert_eq!(queue.enqueue_rmmod("hello").unwrap(), Outcome::AlreadyQueued);
        assert!(!queue.store().path().exists());
    }

    #[test]
    fn test_cross_queue_exclusivity() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = manager(&dir);

        queue.enqueue_rmmod("v").unwrap();
        queue.enqueue_insmod("v").unwrap();
        assert!(queue.state().contains(QueueKind::Insmod, "v"));
        assert!(!queue.state().contains(QueueKind::Rmmod, "v"));
        assert_exclusive(queue.state());

        queue.enqueue_rmmod("v").unwrap();
        assert!(!queue.state().contains(QueueKind::Insmod, "v"));
        assert!(queue.state().contains(QueueKind::Rmmod, "v"));
        assert_exclusive(queue.state());
    }

    #[test]
    fn test_wildcard_follows_same_rules() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = manager(&dir);

        queue.enqueue_insmod(WILDCARD).unwrap();
        queue.enqueue_insmod("a").unwrap();
        assert_eq!(queue.enqueue_insmod(WILDCARD).unwrap(), Outcome::AlreadyQueued);

        queue.enqueue_rmmod(WILDCARD).unwrap();
        assert_eq!(queue.state().insmod, vec!["a"]);
        assert_eq!(queue.state().rmmod, vec![WILDCARD]);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = manager(&dir);
        for name in ["c", "a", "b"] {
            queue.enqueue_insmod(name).unwrap();
        }
        assert_eq!(queue.state().insmod, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_mutations_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut queue = manager(&dir);
            queue.enqueue_insmod("a").unwrap();
            queue.enqueue_rmmod("b").unwrap();
        }
        let queue = manager(&dir);
        assert_eq!(queue.state().insmod, vec!["a"]);
        assert_eq!(queue.state().rmmod, vec!["b"]);
    }

    #[test]
    fn test_reset_clears_fully() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = manager(&dir);
        queue.enqueue_insmod("a").unwrap();
        queue.enqueue_rmmod("b").unwrap();

        queue.reset().unwrap();
        assert!(queue.state().is_empty());

        let on_disk = std::fs::read_to_string(queue.store().path()).unwrap();
        assert!(on_disk.contains("MODULE_INS=()\n"));
        assert!(on_disk.contains("MODULE_REM=()\n"));
        assert!(manager(&dir).state().is_empty());
    }

    #[test]
    fn test_matches_uses_wildcard_or_name() {
        let state = QueueState {
            insmod: vec![WILDCARD.to_string()],
            rmmod: vec!["b".to_string()],
        };
        assert!(state.matches(QueueKind::Insmod, "anything"));
        assert!(state.matches(QueueKind::Rmmod, "b"));
        assert!(!state.matches(QueueKind::Rmmod, "a"));
    }
}

//! Background persistence of the board.
//!
//! The placement path never touches the disk. It calls
//! [`PersistHandle::request_save`], which only raises a flag; a single
//! [`Persister`] task wakes up, snapshots the board and writes it on the
//! blocking pool. Requests that arrive while a save is running collapse
//! into one follow-up save, so a burst of placements costs at most two
//! writes.
//!
//! The in-memory board is always authoritative. A failed save is logged
//! and counted, and the next request retries with the then-current board.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::board::Board;
use crate::storage::{BoardStorage, StorageError};

#[derive(Debug, Default)]
struct PersistShared {
    save_requested: Notify,
    stop: Notify,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Cheap cloneable handle used to ask for a save.
#[derive(Debug, Clone, Default)]
pub struct PersistHandle {
    shared: Arc<PersistShared>,
}

impl PersistHandle {
    /// A handle with no persister behind it. Requests are accepted and
    /// ignored.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Ask for the board to be saved soon. Never blocks.
    pub fn request_save(&self) {
        self.shared.save_requested.notify_one();
    }

    /// Ask the persister to write a final save and exit.
    pub fn shutdown(&self) {
        self.shared.stop.notify_one();
    }

    /// Number of successful saves so far.
    pub fn completed_saves(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Number of failed saves so far.
    pub fn failed_saves(&self) -> u64 {
        self.shared.failed.load(Ordering::Acquire)
    }
}

/// Owns the storage backend and writes the board on request.
pub struct Persister {
    board: Arc<Board>,
    storage: Arc<dyn BoardStorage>,
    handle: PersistHandle,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("cells", &self.board.len())
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Persister {
    /// Create a persister for `board` backed by `storage`.
    pub fn new(board: Arc<Board>, storage: Arc<dyn BoardStorage>) -> Self {
        Self {
            board,
            storage,
            handle: PersistHandle::default(),
        }
    }

    /// Handle for requesting saves and reading counters.
    pub fn handle(&self) -> PersistHandle {
        self.handle.clone()
    }

    /// Fill the board from storage.
    ///
    /// Returns `false` when nothing had been stored yet, leaving the board
    /// blank.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the stored blob cannot be read.
    pub fn restore(&self) -> Result<bool, StorageError> {
        match self.storage.load()? {
            Some(blob) => {
                let expected = self.board.len();
                if blob.len() != expected {
                    info!(
                        stored = blob.len(),
                        expected, "stored board size differs, padding or truncating"
                    );
                }
                self.board.load(&blob);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Save the current board synchronously.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`StorageError`].
    pub fn save_now(&self) -> Result<(), StorageError> {
        let result = self.storage.save(&self.board.serialize());
        self.count(&result);
        result
    }

    /// Run the save loop on a background task until
    /// [`PersistHandle::shutdown`] is called, then write one final save.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let shared = Arc::clone(&self.handle.shared);
        loop {
            tokio::select! {
                () = shared.save_requested.notified() => self.save_off_thread().await,
                () = shared.stop.notified() => break,
            }
        }
        self.save_off_thread().await;
        debug!("board persister stopped");
    }

    async fn save_off_thread(&self) {
        let blob = self.board.serialize();
        let storage = Arc::clone(&self.storage);
        let result = match tokio::task::spawn_blocking(move || storage.save(&blob)).await {
            Ok(result) => result,
            Err(e) => Err(StorageError::Unavailable(format!("save task failed: {e}"))),
        };
        self.count(&result);
    }

    fn count(&self, result: &Result<(), StorageError>) {
        match result {
            Ok(()) => {
                self.handle.shared.completed.fetch_add(1, Ordering::AcqRel);
                debug!("board saved");
            }
            Err(e) => {
                self.handle.shared.failed.fetch_add(1, Ordering::AcqRel);
                error!(error = %e, "failed to save board");
            }
        }
    }
}

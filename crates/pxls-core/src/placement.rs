//! Admission and application of single-cell placements.
//!
//! [`PlacementService::place`] runs one request through a fixed sequence
//! of gates. The first gate that fails rejects the request with nothing
//! changed:
//!
//! 1. coordinates inside the board, else [`PlacementError::InvalidCoordinates`]
//! 2. color inside the palette, else [`PlacementError::InvalidColor`]
//! 3. cooldown elapsed for the client, else [`PlacementError::RateLimited`]
//!
//! An admitted request then writes the cell, starts the client's cooldown,
//! asks for a board save, and publishes a [`BoardEvent::Pixel`] to every
//! subscriber, the requester's own connection included. Saving happens off
//! the request path; a failed save is logged by the persister and never
//! undoes the placement.
//!
//! The write and the publish for one cell happen under a striped cell
//! lock, so every subscriber sees placements on a given cell in the order
//! they hit the board and its last event matches the cell's value.
//! Placements on cells in different stripes never wait on each other.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::board::{Board, BoardError};
use crate::broadcast::{BoardEvent, BroadcastHub};
use crate::clock::Clock;
use crate::cooldown::{ClientIdentity, CooldownTracker};
use crate::persist::PersistHandle;

/// A request to set one cell to one color.
///
/// Fields are wide signed integers so that any client-supplied number can
/// be represented and rejected by the gates rather than by parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct PlacementRequest {
    /// Column.
    pub x: i64,
    /// Row.
    pub y: i64,
    /// Palette index.
    pub color: i64,
}

/// The result of an accepted placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementReceipt {
    /// Column written.
    pub x: u32,
    /// Row written.
    pub y: u32,
    /// Color written.
    pub color: u8,
    /// Color the cell held before.
    pub previous: u8,
    /// Cooldown the client must now wait.
    pub cooldown: Duration,
}

/// Why a placement was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// The coordinates are off the board.
    #[error("Invalid coordinates")]
    InvalidCoordinates {
        /// Requested column.
        x: i64,
        /// Requested row.
        y: i64,
    },

    /// The color is not in the palette.
    #[error("Invalid color")]
    InvalidColor {
        /// Requested color id.
        color: i64,
    },

    /// The client's cooldown has not elapsed.
    #[error("Cooldown has not expired")]
    RateLimited {
        /// Time left before the client may place again.
        wait: Duration,
    },
}

/// Number of cell lock stripes.
const CELL_STRIPES: usize = 64;

/// Orchestrates validate, admit, apply, persist and notify for placements.
pub struct PlacementService {
    board: Arc<Board>,
    cooldowns: Arc<CooldownTracker>,
    hub: Arc<BroadcastHub>,
    persist: PersistHandle,
    clock: Arc<dyn Clock>,
    /// Held from the cell write through the publish; stripe = `index % CELL_STRIPES`.
    cell_locks: Vec<Mutex<()>>,
}

impl std::fmt::Debug for PlacementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementService")
            .field("width", &self.board.width())
            .field("height", &self.board.height())
            .field("cooldown", &self.cooldowns.cooldown())
            .finish_non_exhaustive()
    }
}

impl PlacementService {
    /// Wire a service from its collaborators.
    pub fn new(
        board: Arc<Board>,
        cooldowns: Arc<CooldownTracker>,
        hub: Arc<BroadcastHub>,
        persist: PersistHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            board,
            cooldowns,
            hub,
            persist,
            clock,
            cell_locks: (0..CELL_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// The board placements are written to.
    pub const fn board(&self) -> &Arc<Board> {
        &self.board
    }

    /// The cooldown table consulted by the rate-limit gate.
    pub const fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    /// The hub accepted placements are published on.
    pub const fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Remaining wait for `identity` right now.
    pub fn time_until_allowed(&self, identity: &ClientIdentity) -> Duration {
        self.cooldowns
            .time_until_allowed(identity, self.clock.now_millis())
    }

    /// Place using the service clock.
    ///
    /// # Errors
    ///
    /// Returns the first failed gate as a [`PlacementError`].
    pub fn place(
        &self,
        identity: &ClientIdentity,
        request: PlacementRequest,
    ) -> Result<PlacementReceipt, PlacementError> {
        self.place_at(identity, request, self.clock.now_millis())
    }

    /// Place as if the current time were `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns the first failed gate as a [`PlacementError`].
    pub fn place_at(
        &self,
        identity: &ClientIdentity,
        request: PlacementRequest,
        now_ms: u64,
    ) -> Result<PlacementReceipt, PlacementError> {
        let result = self.admit_and_apply(identity, request, now_ms);
        if let Err(ref e) = result {
            debug!(%identity, x = request.x, y = request.y, color = request.color, error = %e, "placement rejected");
        }
        result
    }

    fn admit_and_apply(
        &self,
        identity: &ClientIdentity,
        request: PlacementRequest,
        now_ms: u64,
    ) -> Result<PlacementReceipt, PlacementError> {
        let invalid_coordinates = PlacementError::InvalidCoordinates {
            x: request.x,
            y: request.y,
        };
        let (x, y, index) = match (u32::try_from(request.x), u32::try_from(request.y)) {
            (Ok(x), Ok(y)) => match self.board.index_of(x, y) {
                Some(index) => (x, y, index),
                None => return Err(invalid_coordinates),
            },
            _ => return Err(invalid_coordinates),
        };

        let color = u8::try_from(request.color)
            .ok()
            .filter(|c| self.board.palette().contains(*c))
            .ok_or(PlacementError::InvalidColor {
                color: request.color,
            })?;

        let wait = self.cooldowns.time_until_allowed(identity, now_ms);
        if !wait.is_zero() {
            return Err(PlacementError::RateLimited { wait });
        }

        let _cell = self.lock_cell(index);
        let previous = self.board.set_cell(x, y, color).map_err(|e| match e {
            BoardError::InvalidColor { .. } => PlacementError::InvalidColor {
                color: request.color,
            },
            BoardError::OutOfBounds { .. } | BoardError::InvalidDimensions { .. } => {
                invalid_coordinates
            }
        })?;
        self.cooldowns.record_placement(identity, now_ms);

        info!(target: "pixels", x, y, color, %identity, "pixel placed");

        self.persist.request_save();
        self.hub.publish(&BoardEvent::Pixel { x, y, color });

        Ok(PlacementReceipt {
            x,
            y,
            color,
            previous,
            cooldown: self.cooldowns.cooldown(),
        })
    }

    fn lock_cell(&self, index: usize) -> Option<MutexGuard<'_, ()>> {
        let stripe = index.checked_rem(CELL_STRIPES)?;
        self.cell_locks
            .get(stripe)
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::palette::Palette;
    use crate::persist::Persister;
    use crate::storage::{BoardStorage, MemoryStorage, StorageError};

    struct Fixture {
        service: PlacementService,
        clock: Arc<ManualClock>,
        hub: Arc<BroadcastHub>,
        persist: PersistHandle,
    }

    /// 3x3 board, two colors, five second cooldown.
    fn fixture() -> Fixture {
        let palette = Palette::new(vec!["#FFFFFF".to_owned(), "#000000".to_owned()]).unwrap();
        let board = Arc::new(Board::new(3, 3, palette).unwrap());
        let cooldowns = Arc::new(CooldownTracker::new(Duration::from_secs(5)));
        let hub = Arc::new(BroadcastHub::default());
        let clock = Arc::new(ManualClock::new(0));
        let persist = PersistHandle::detached();
        let service = PlacementService::new(
            board,
            cooldowns,
            Arc::clone(&hub),
            persist.clone(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Fixture {
            service,
            clock,
            hub,
            persist,
        }
    }

    fn req(x: i64, y: i64, color: i64) -> PlacementRequest {
        PlacementRequest { x, y, color }
    }

    #[test]
    fn cooldown_walkthrough() {
        let f = fixture();
        let a = ClientIdentity::from("A");

        let receipt = f.service.place(&a, req(1, 1, 1)).unwrap();
        assert_eq!(receipt.cooldown, Duration::from_secs(5));
        assert_eq!(receipt.previous, 0);
        assert_eq!(f.service.board().get_cell(1, 1).unwrap(), 1);
        assert_eq!(f.service.time_until_allowed(&a), Duration::from_secs(5));

        f.clock.set_millis(3_000);
        let err = f.service.place(&a, req(0, 0, 1)).unwrap_err();
        assert_eq!(
            err,
            PlacementError::RateLimited {
                wait: Duration::from_secs(2)
            }
        );
        assert_eq!(f.service.board().get_cell(0, 0).unwrap(), 0);

        f.clock.set_millis(6_000);
        f.service.place(&a, req(0, 0, 1)).unwrap();
        assert_eq!(f.service.board().get_cell(0, 0).unwrap(), 1);
    }

    #[test]
    fn accepted_exactly_at_cooldown_boundary() {
        let f = fixture();
        let a = ClientIdentity::from("A");
        f.service.place_at(&a, req(0, 0, 1), 1_000).unwrap();
        assert!(f.service.place_at(&a, req(0, 1, 1), 5_999).is_err());
        assert!(f.service.place_at(&a, req(0, 1, 1), 6_000).is_ok());
    }

    #[test]
    fn x_past_width_is_invalid_coordinates() {
        let f = fixture();
        let err = f.service.place(&"A".into(), req(3, 0, 1)).unwrap_err();
        assert_eq!(err, PlacementError::InvalidCoordinates { x: 3, y: 0 });
        assert_eq!(f.service.board().snapshot(), vec![0; 9]);
    }

    #[test]
    fn negative_and_huge_coordinates_are_invalid() {
        let f = fixture();
        let id = ClientIdentity::from("A");
        for (x, y) in [(-1, 0), (0, -1), (0, 3), (i64::MAX, 0), (0, i64::MIN)] {
            assert_eq!(
                f.service.place(&id, req(x, y, 0)),
                Err(PlacementError::InvalidCoordinates { x, y })
            );
        }
    }

    #[test]
    fn color_outside_palette_is_invalid_color() {
        let f = fixture();
        let id = ClientIdentity::from("A");
        for color in [2, 5, -1, 256, i64::MAX] {
            assert_eq!(
                f.service.place(&id, req(0, 0, color)),
                Err(PlacementError::InvalidColor { color })
            );
        }
        assert_eq!(f.service.board().snapshot(), vec![0; 9]);
    }

    #[test]
    fn coordinates_are_checked_before_color() {
        let f = fixture();
        assert!(matches!(
            f.service.place(&"A".into(), req(9, 9, 9)),
            Err(PlacementError::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn rejections_never_start_a_cooldown() {
        let f = fixture();
        let id = ClientIdentity::from("A");
        let _ = f.service.place(&id, req(-1, 0, 0));
        let _ = f.service.place(&id, req(0, 0, 7));
        assert!(f.service.cooldowns().last_placement(&id).is_none());
        assert!(f.service.place(&id, req(0, 0, 1)).is_ok());
    }

    #[test]
    fn rate_limited_attempt_does_not_reset_timer() {
        let f = fixture();
        let id = ClientIdentity::from("A");
        f.service.place_at(&id, req(0, 0, 1), 0).unwrap();
        assert!(f.service.place_at(&id, req(1, 0, 1), 4_000).is_err());
        assert_eq!(f.service.cooldowns().last_placement(&id), Some(0));
        assert!(f.service.place_at(&id, req(1, 0, 1), 5_000).is_ok());
    }

    #[test]
    fn last_accepted_placement_wins() {
        let f = fixture();
        for (i, color) in [1, 0, 1, 1, 0].into_iter().enumerate() {
            let id = ClientIdentity::new(format!("client-{i}"));
            f.service.place(&id, req(2, 2, color)).unwrap();
        }
        assert_eq!(f.service.board().get_cell(2, 2).unwrap(), 0);
    }

    #[test]
    fn accepted_placement_is_broadcast_rejected_is_not() {
        let f = fixture();
        let mut sub = f.hub.subscribe();
        f.service.place(&"A".into(), req(2, 1, 1)).unwrap();
        assert_eq!(
            sub.try_recv(),
            Some(BoardEvent::Pixel { x: 2, y: 1, color: 1 })
        );

        let _ = f.service.place(&"A".into(), req(0, 0, 1));
        assert_eq!(sub.try_recv(), None);
        // Detached handle: requests go nowhere, nothing is counted.
        assert_eq!(f.persist.completed_saves(), 0);
    }

    /// Service over a real, running persister.
    fn persisted_service(
        storage: Arc<dyn BoardStorage>,
    ) -> (PlacementService, PersistHandle, tokio::task::JoinHandle<()>) {
        let palette = Palette::new(vec!["#FFFFFF".to_owned(), "#000000".to_owned()]).unwrap();
        let board = Arc::new(Board::new(3, 3, palette).unwrap());
        let persister = Persister::new(Arc::clone(&board), storage);
        let handle = persister.handle();
        let task = persister.spawn();
        let service = PlacementService::new(
            board,
            Arc::new(CooldownTracker::new(Duration::from_secs(5))),
            Arc::new(BroadcastHub::default()),
            handle.clone(),
            Arc::new(ManualClock::new(0)) as Arc<dyn Clock>,
        );
        (service, handle, task)
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    struct BrokenStorage;

    impl BoardStorage for BrokenStorage {
        fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(None)
        }

        fn save(&self, _data: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("read-only volume".to_owned()))
        }
    }

    #[tokio::test]
    async fn accepted_placement_is_written_to_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let (service, handle, task) = persisted_service(storage.clone());

        service.place(&"A".into(), req(2, 1, 1)).unwrap();
        wait_until(|| handle.completed_saves() >= 1).await;

        let mut expected = vec![0; 9];
        expected[5] = 1;
        assert_eq!(storage.blob(), Some(expected));

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_save_keeps_placement_and_broadcast() {
        let (service, handle, task) = persisted_service(Arc::new(BrokenStorage));
        let mut sub = service.hub().subscribe();

        let receipt = service.place(&"A".into(), req(0, 2, 1)).unwrap();
        assert_eq!(receipt.cooldown, Duration::from_secs(5));
        wait_until(|| handle.failed_saves() >= 1).await;

        assert_eq!(service.board().get_cell(0, 2).unwrap(), 1);
        assert_eq!(
            sub.try_recv(),
            Some(BoardEvent::Pixel { x: 0, y: 2, color: 1 })
        );
        assert_eq!(handle.completed_saves(), 0);

        handle.shutdown();
        task.await.unwrap();
    }

    #[test]
    fn shortened_cooldown_applies_to_next_attempt() {
        let f = fixture();
        let id = ClientIdentity::from("A");
        f.service.place_at(&id, req(0, 0, 1), 0).unwrap();
        f.service.cooldowns().set_cooldown(Duration::from_secs(1));
        let receipt = f.service.place_at(&id, req(1, 0, 1), 1_000).unwrap();
        assert_eq!(receipt.cooldown, Duration::from_secs(1));
    }

    /// 1x1 board, sixteen colors, no cooldown, deep subscriber queues.
    fn single_cell_service() -> PlacementService {
        PlacementService::new(
            Arc::new(Board::new(1, 1, Palette::default()).unwrap()),
            Arc::new(CooldownTracker::new(Duration::ZERO)),
            Arc::new(BroadcastHub::new(4_096)),
            PersistHandle::detached(),
            Arc::new(ManualClock::new(0)) as Arc<dyn Clock>,
        )
    }

    #[test]
    fn same_cell_races_end_with_last_event_matching_board() {
        let service = Arc::new(single_cell_service());
        let mut sub = service.hub().subscribe();

        for round in 0..200 {
            let handles: Vec<_> = (1..=8i64)
                .map(|color| {
                    let service = Arc::clone(&service);
                    std::thread::spawn(move || {
                        let id = ClientIdentity::new(format!("writer-{color}"));
                        for _ in 0..50 {
                            service.place(&id, req(0, 0, color)).unwrap();
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            let mut last = None;
            let mut received = 0;
            while let Some(event) = sub.try_recv() {
                last = Some(event);
                received += 1;
            }
            assert_eq!(received, 8 * 50, "round {round}");
            let cell = service.board().get_cell(0, 0).unwrap();
            assert!((1..=8).contains(&cell), "round {round}");
            assert_eq!(
                last,
                Some(BoardEvent::Pixel {
                    x: 0,
                    y: 0,
                    color: cell
                }),
                "round {round}"
            );
        }
    }

    #[test]
    fn same_identity_race_leaves_other_identities_alone() {
        let f = Arc::new(fixture());
        f.clock.set_millis(100_000);
        f.service.cooldowns().record_placement(&"B".into(), 98_000);
        f.service.cooldowns().record_placement(&"C".into(), 40_000);

        let handles: Vec<_> = (0..9i64)
            .map(|i| {
                let f = Arc::clone(&f);
                std::thread::spawn(move || {
                    f.service
                        .place(&"A".into(), req(i % 3, i / 3, 1))
                        .map(|r| (r.x, r.y))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let accepted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert!(!accepted.is_empty());
        for r in &results {
            if let Err(e) = r {
                assert!(matches!(e, PlacementError::RateLimited { .. }));
            }
        }
        for &&(x, y) in &accepted {
            assert_eq!(f.service.board().get_cell(x, y).unwrap(), 1);
        }
        let painted = f.service.board().snapshot().iter().filter(|&&c| c == 1).count();
        assert_eq!(painted, accepted.len());

        assert_eq!(f.service.cooldowns().last_placement(&"A".into()), Some(100_000));
        assert_eq!(f.service.cooldowns().last_placement(&"B".into()), Some(98_000));
        assert_eq!(f.service.cooldowns().last_placement(&"C".into()), Some(40_000));
        assert_eq!(f.service.cooldowns().tracked_identities(), 3);
    }

    #[test]
    fn concurrent_distinct_clients_all_land() {
        let f = Arc::new(fixture());
        let handles: Vec<_> = (0..9i64)
            .map(|i| {
                let f = Arc::clone(&f);
                std::thread::spawn(move || {
                    let id = ClientIdentity::new(format!("c{i}"));
                    f.service.place(&id, req(i % 3, i / 3, 1)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(f.service.board().snapshot(), vec![1; 9]);
        assert_eq!(f.service.cooldowns().tracked_identities(), 9);
    }
}

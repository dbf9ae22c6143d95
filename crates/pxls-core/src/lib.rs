//! Shared canvas state, placement admission, and live fan-out for Pxls.
//!
//! Clients read a grid of colored cells, place one cell at a time subject
//! to a per-client cooldown, and receive everyone else's placements as
//! they happen. This crate holds that core with no HTTP in it.
//!
//! # Modules
//!
//! - [`palette`] -- The immutable list of valid colors.
//! - [`board`] -- The grid itself, with per-cell atomic reads and writes
//!   and the flat one-byte-per-cell persisted form.
//! - [`cooldown`] -- Client identity and the last-placement table that
//!   drives rate limiting.
//! - [`placement`] -- [`PlacementService`], which validates, admits,
//!   applies, persists and publishes a single placement.
//! - [`broadcast`] -- [`BroadcastHub`], the subscriber registry that fans
//!   events out to live connections.
//! - [`storage`] -- The load/save interface for the persisted board.
//! - [`persist`] -- Background saving so the placement path never waits
//!   on disk.
//! - [`clock`] -- Injectable time source.
//! - [`config`] -- Configuration loading from `pxls-config.yaml`.
//!
//! [`PlacementService`]: placement::PlacementService
//! [`BroadcastHub`]: broadcast::BroadcastHub

pub mod board;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod palette;
pub mod persist;
pub mod placement;
pub mod storage;

pub use board::{Board, BoardError};
pub use broadcast::{BoardEvent, BroadcastHub, SubscriberId, Subscription};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::{ClientIdentity, CooldownTracker};
pub use palette::Palette;
pub use persist::{PersistHandle, Persister};
pub use placement::{PlacementError, PlacementReceipt, PlacementRequest, PlacementService};
pub use storage::{BoardStorage, FileStorage, MemoryStorage, StorageError};

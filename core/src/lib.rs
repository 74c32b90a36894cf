#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Citadel Defence engine.
//!
//! This crate defines the message surface that connects the authoritative
//! world actor to every other component. Producers submit [`RaiderCommand`]
//! and [`WallCommand`] values describing desired mutations, the world applies
//! them on its dedicated thread, and readers obtain consistent state through
//! snapshot views resolved by callbacks on that same thread. Nothing outside
//! the world ever touches the entity collections directly.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of walls that may stand on the grid at any moment.
pub const WALL_CAP: usize = 10;

/// Score awarded when a wall destroys a raider.
pub const KILL_SCORE: u64 = 100;

/// Score awarded for every elapsed score tick.
pub const TICK_SCORE: u64 = 10;

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Offsets the cell by signed deltas, yielding `None` on underflow.
    ///
    /// Callers still need a [`GridBounds::contains`] check for the upper
    /// edges; this only guards against stepping below column or row zero.
    #[must_use]
    pub fn checked_offset(self, delta_column: i64, delta_row: i64) -> Option<CellCoord> {
        let column = i64::from(self.column).checked_add(delta_column)?;
        let row = i64::from(self.row).checked_add(delta_row)?;
        if column < 0 || row < 0 {
            return None;
        }
        Some(CellCoord::new(
            u32::try_from(column).ok()?,
            u32::try_from(row).ok()?,
        ))
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.column, self.row)
    }
}

/// Fractional display position a raider occupies while animating a step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    x: f64,
    y: f64,
}

impl Position {
    /// Creates a position from explicit coordinates.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Places the position exactly on the centre of a grid cell.
    #[must_use]
    pub fn from_cell(cell: CellCoord) -> Self {
        Self {
            x: f64::from(cell.column()),
            y: f64::from(cell.row()),
        }
    }

    /// Horizontal coordinate in cell units.
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.x
    }

    /// Vertical coordinate in cell units.
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.y
    }

    /// Linearly interpolates between `self` and `other`.
    ///
    /// A factor of `0.0` yields `self` and `1.0` yields `other` exactly, so
    /// the final animation frame lands on the destination without residual
    /// floating-point error.
    #[must_use]
    pub fn lerp(self, other: Position, factor: f64) -> Position {
        if factor >= 1.0 {
            return other;
        }
        Position {
            x: self.x + (other.x - self.x) * factor,
            y: self.y + (other.y - self.y) * factor,
        }
    }
}

/// Discrete bounds of the playing field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBounds {
    columns: u32,
    rows: u32,
}

impl GridBounds {
    /// Creates bounds with the provided dimensions.
    #[must_use]
    pub const fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    /// Number of columns in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows in the grid.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: CellCoord) -> bool {
        cell.column() < self.columns && cell.row() < self.rows
    }

    /// The four corner cells where raiders enter the grid.
    #[must_use]
    pub const fn corners(&self) -> [CellCoord; 4] {
        let east = self.columns.saturating_sub(1);
        let south = self.rows.saturating_sub(1);
        [
            CellCoord::new(0, 0),
            CellCoord::new(east, 0),
            CellCoord::new(0, south),
            CellCoord::new(east, south),
        ]
    }

    /// Central cell that hosts the citadel.
    #[must_use]
    pub const fn citadel_cell(&self) -> CellCoord {
        CellCoord::new(
            self.columns.saturating_sub(1) / 2,
            self.rows.saturating_sub(1) / 2,
        )
    }
}

impl Default for GridBounds {
    fn default() -> Self {
        Self::new(9, 9)
    }
}

/// The objective raiders advance toward, fixed for the whole session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Citadel {
    cell: CellCoord,
}

impl Citadel {
    /// Anchors the citadel at the provided cell.
    #[must_use]
    pub const fn at(cell: CellCoord) -> Self {
        Self { cell }
    }

    /// Cell occupied by the citadel.
    #[must_use]
    pub const fn cell(&self) -> CellCoord {
        self.cell
    }
}

/// Unique identifier assigned to a raider by the spawner.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RaiderId(u32);

impl RaiderId {
    /// Creates a new raider identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Structural state of a wall.
///
/// Health only ever advances: a hit turns `Intact` into `Damaged`, and a hit
/// on a `Damaged` wall destroys it. `Destroyed` is the terminal state; a
/// destroyed wall is removed from the world immediately, so views only ever
/// contain `Intact` and `Damaged` walls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WallHealth {
    /// Freshly built and undamaged.
    Intact,
    /// Hit once; the next hit destroys the wall.
    Damaged,
    /// Hit twice; the wall no longer stands.
    Destroyed,
}

/// Immutable representation of a single raider used for queries.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaiderSnapshot {
    /// Unique identifier assigned to the raider.
    pub id: RaiderId,
    /// Grid cell the raider has committed to (rounded during animation).
    pub cell: CellCoord,
    /// Cell the raider occupied before its latest step.
    pub prev_cell: CellCoord,
    /// Fractional display position, mid-animation values included.
    pub position: Position,
    /// Destination of an in-flight step, if one is reserved.
    pub next_cell: Option<CellCoord>,
    /// Interval between this raider's successive movement steps.
    pub cadence: Duration,
}

/// Read-only snapshot describing all raiders on the grid.
#[derive(Clone, Debug, Default)]
pub struct RaiderView {
    snapshots: Vec<RaiderSnapshot>,
}

impl RaiderView {
    /// Creates a new raider view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<RaiderSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured raider snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &RaiderSnapshot> {
        self.snapshots.iter()
    }

    /// Number of raiders captured by the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view captured no raiders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<RaiderSnapshot> {
        self.snapshots
    }
}

/// Immutable representation of a single wall used for queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallSnapshot {
    /// Cell occupied by the wall, unique among walls.
    pub cell: CellCoord,
    /// Current structural state.
    pub health: WallHealth,
}

/// Read-only snapshot describing all standing walls.
#[derive(Clone, Debug, Default)]
pub struct WallView {
    snapshots: Vec<WallSnapshot>,
}

impl WallView {
    /// Creates a new wall view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<WallSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.cell);
        Self { snapshots }
    }

    /// Iterator over the captured wall snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &WallSnapshot> {
        self.snapshots.iter()
    }

    /// Number of walls captured by the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view captured no walls.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Looks up the wall standing on the provided cell, if any.
    #[must_use]
    pub fn at(&self, cell: CellCoord) -> Option<&WallSnapshot> {
        self.snapshots.iter().find(|snapshot| snapshot.cell == cell)
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<WallSnapshot> {
        self.snapshots
    }
}

/// Callback resolved on the world actor thread with the current raider view.
pub type RaiderQueryFn = Box<dyn FnOnce(&RaiderView) + Send>;

/// Callback resolved on the world actor thread with the current wall view.
pub type WallQueryFn = Box<dyn FnOnce(&WallView) + Send>;

/// Commands accepted on the raider channel of the world actor.
pub enum RaiderCommand {
    /// Admits a freshly spawned raider at its entry cell.
    Admit {
        /// Identifier allocated by the spawner.
        id: RaiderId,
        /// Corner cell the raider enters from.
        cell: CellCoord,
        /// Interval between the raider's movement steps.
        cadence: Duration,
    },
    /// Atomically checks a step destination for collisions and reserves it.
    ///
    /// The reply resolves exactly once: `true` when no other raider occupies
    /// or has reserved the destination and the reservation was recorded,
    /// `false` when the step must be forfeited.
    ReserveStep {
        /// Raider attempting the step.
        id: RaiderId,
        /// Candidate destination cell.
        to: CellCoord,
        /// Single-resolution reply channel awaited by the movement task.
        reply: Sender<bool>,
    },
    /// Updates a raider's fractional display position mid-animation.
    Nudge {
        /// Raider being animated.
        id: RaiderId,
        /// Interpolated position for the current frame.
        position: Position,
    },
    /// Commits a reserved step, snapping the raider onto its destination.
    Arrive {
        /// Raider that finished animating.
        id: RaiderId,
    },
    /// Removes a raider destroyed by a wall, awarding the kill score.
    Remove {
        /// Raider to remove.
        id: RaiderId,
    },
    /// Records that a raider reached the citadel, latching game-over.
    Breach {
        /// Raider that reached the citadel.
        id: RaiderId,
    },
    /// Resolves a read-only raider view on the actor thread.
    Query {
        /// Callback invoked with the current view.
        callback: RaiderQueryFn,
    },
    /// Sentinel that performs no mutation; used to wake the actor on stop.
    Noop,
}

impl fmt::Debug for RaiderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admit { id, cell, cadence } => f
                .debug_struct("Admit")
                .field("id", id)
                .field("cell", cell)
                .field("cadence", cadence)
                .finish(),
            Self::ReserveStep { id, to, .. } => f
                .debug_struct("ReserveStep")
                .field("id", id)
                .field("to", to)
                .finish_non_exhaustive(),
            Self::Nudge { id, position } => f
                .debug_struct("Nudge")
                .field("id", id)
                .field("position", position)
                .finish(),
            Self::Arrive { id } => f.debug_struct("Arrive").field("id", id).finish(),
            Self::Remove { id } => f.debug_struct("Remove").field("id", id).finish(),
            Self::Breach { id } => f.debug_struct("Breach").field("id", id).finish(),
            Self::Query { .. } => f.debug_struct("Query").finish_non_exhaustive(),
            Self::Noop => f.write_str("Noop"),
        }
    }
}

/// Commands accepted on the wall channel of the world actor.
pub enum WallCommand {
    /// Places a new wall, subject to the cap and uniqueness checks.
    Place {
        /// Cell the wall should occupy.
        cell: CellCoord,
    },
    /// Damages an intact wall after a raider collision.
    Damage {
        /// Cell of the wall that was hit.
        cell: CellCoord,
    },
    /// Removes an already-damaged wall after a second collision.
    Demolish {
        /// Cell of the wall that was hit.
        cell: CellCoord,
    },
    /// Resolves a read-only wall view on the actor thread.
    Query {
        /// Callback invoked with the current view.
        callback: WallQueryFn,
    },
    /// Sentinel that performs no mutation; used to wake the actor on stop.
    Noop,
}

impl fmt::Debug for WallCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Place { cell } => f.debug_struct("Place").field("cell", cell).finish(),
            Self::Damage { cell } => f.debug_struct("Damage").field("cell", cell).finish(),
            Self::Demolish { cell } => {
                f.debug_struct("Demolish").field("cell", cell).finish()
            }
            Self::Query { .. } => f.debug_struct("Query").finish_non_exhaustive(),
            Self::Noop => f.write_str("Noop"),
        }
    }
}

/// Domain events published by the world for the event log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// A raider entered the grid at a corner cell.
    RaiderSpawned {
        /// Identifier of the spawned raider.
        id: RaiderId,
        /// Corner cell the raider entered from.
        cell: CellCoord,
    },
    /// A wall destroyed a raider.
    RaiderDestroyed {
        /// Identifier of the destroyed raider.
        id: RaiderId,
        /// Cell where the collision happened.
        cell: CellCoord,
    },
    /// A wall finished construction.
    WallBuilt {
        /// Cell the wall occupies.
        cell: CellCoord,
    },
    /// A raider hit an intact wall.
    WallDamaged {
        /// Cell of the damaged wall.
        cell: CellCoord,
    },
    /// A raider hit a damaged wall, destroying it.
    WallDestroyed {
        /// Cell the wall occupied.
        cell: CellCoord,
    },
    /// A raider reached the citadel; the session is over.
    CitadelBreached {
        /// Identifier of the raider that broke through.
        id: RaiderId,
        /// Cell of the citadel.
        cell: CellCoord,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RaiderSpawned { id, cell } => {
                write!(f, "Raider {} spawned at {cell}", id.get())
            }
            Self::RaiderDestroyed { id, cell } => {
                write!(f, "Raider {} destroyed at {cell}", id.get())
            }
            Self::WallBuilt { cell } => write!(f, "Wall built at {cell}"),
            Self::WallDamaged { cell } => write!(f, "Wall at {cell} damaged"),
            Self::WallDestroyed { cell } => write!(f, "Wall at {cell} destroyed"),
            Self::CitadelBreached { id, cell } => {
                write!(f, "Citadel at {cell} breached by raider {}", id.get())
            }
        }
    }
}

/// Failure to submit a command to the world actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The world has shut down and its command queues are closed.
    #[error("world state is no longer accepting commands")]
    Closed,
}

/// Failure to resolve a snapshot query or reserve-step round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The world has shut down and its command queues are closed.
    #[error("world state is no longer accepting queries")]
    Closed,
    /// The world dropped the request before resolving the reply.
    #[error("world state dropped the query before replying")]
    Dropped,
}

/// Failure to launch one of the engine's dedicated threads.
#[derive(Debug, Error)]
pub enum StartError {
    /// The operating system refused to spawn a thread.
    #[error("failed to spawn the {name} thread")]
    Thread {
        /// Name the thread would have carried.
        name: &'static str,
        /// Underlying operating-system error.
        #[source]
        source: std::io::Error,
    },
}

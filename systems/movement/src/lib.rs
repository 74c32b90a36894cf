#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-raider movement protocol.
//!
//! A [`Movement`] value is the recurring unit of work scheduled for one
//! raider. Each invocation performs a single discrete step: propose a
//! candidate cell biased toward the citadel, reserve it through an atomic
//! round trip against the world actor, animate the transition with a fixed
//! number of interpolation frames, then resolve citadel and wall collisions
//! at the arrival cell. The task owns no shared state; everything it knows
//! about other entities arrives through snapshot views.

use std::thread;
use std::time::Duration;

use citadel_defence_core::{
    CellCoord, Citadel, GridBounds, Position, QueryError, RaiderCommand, RaiderId, SubmitError,
    WallCommand, WallHealth,
};
use citadel_defence_world::WorldHandle;
use crossbeam_channel::bounded;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

const DEFAULT_BIAS: f64 = 0.7;
const DEFAULT_FRAMES: u32 = 10;
const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(40);

/// Pacing and bias parameters for movement tasks.
#[derive(Clone, Copy, Debug)]
pub struct MovementConfig {
    bias: f64,
    frames: u32,
    frame_duration: Duration,
}

impl MovementConfig {
    /// Creates a configuration with an explicit citadel bias, frame count
    /// and inter-frame suspension.
    #[must_use]
    pub const fn new(bias: f64, frames: u32, frame_duration: Duration) -> Self {
        Self {
            bias,
            frames,
            frame_duration,
        }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BIAS, DEFAULT_FRAMES, DEFAULT_FRAME_DURATION)
    }
}

/// Result of one movement invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The raider lives on; invoke the task again after its cadence.
    Continue,
    /// The raider is gone; the task must not be scheduled again.
    Retired,
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Recurring movement task bound to a single raider.
pub struct Movement {
    id: RaiderId,
    cell: CellCoord,
    bounds: GridBounds,
    citadel: Citadel,
    world: WorldHandle,
    config: MovementConfig,
    rng: SmallRng,
    retired: bool,
}

impl Movement {
    /// Creates a movement task for the raider standing on `cell`.
    #[must_use]
    pub fn new(
        id: RaiderId,
        cell: CellCoord,
        world: WorldHandle,
        config: MovementConfig,
        rng_seed: u64,
    ) -> Self {
        let bounds = world.bounds();
        Self {
            id,
            cell,
            bounds,
            citadel: Citadel::at(bounds.citadel_cell()),
            world,
            config,
            rng: SmallRng::seed_from_u64(rng_seed),
            retired: false,
        }
    }

    /// Identifier of the raider this task drives.
    #[must_use]
    pub const fn raider_id(&self) -> RaiderId {
        self.id
    }

    /// Cell the task last committed for its raider.
    #[must_use]
    pub const fn current_cell(&self) -> CellCoord {
        self.cell
    }

    /// Reports whether the raider has been destroyed or broke through.
    #[must_use]
    pub const fn is_retired(&self) -> bool {
        self.retired
    }

    /// Performs one discrete movement step.
    ///
    /// Once the task has retired, further invocations are no-ops. A world
    /// that shut down mid-step also retires the task: losing the engine is
    /// cooperative cancellation, not an error worth surfacing.
    pub fn step(&mut self) -> StepOutcome {
        if self.retired {
            return StepOutcome::Retired;
        }
        match self.try_step() {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!(id = self.id.get(), %error, "world unavailable, retiring movement task");
                self.retired = true;
                StepOutcome::Retired
            }
        }
    }

    fn try_step(&mut self) -> Result<StepOutcome, StepError> {
        let Some(to) = self.propose() else {
            // Off-grid or already on the citadel cell: forfeit this cadence.
            return Ok(StepOutcome::Continue);
        };
        if !self.reserve(to)? {
            debug!(id = self.id.get(), %to, "step contested, forfeiting");
            return Ok(StepOutcome::Continue);
        }
        self.animate(to)?;
        if to == self.citadel.cell() {
            self.world.submit_raider(RaiderCommand::Breach { id: self.id })?;
            self.retired = true;
            return Ok(StepOutcome::Retired);
        }
        self.resolve_wall_collision(to)
    }

    /// Chooses a candidate cell: biased one step toward the citadel, or a
    /// uniformly random direction on a random axis. Never diagonal.
    fn propose(&mut self) -> Option<CellCoord> {
        let citadel = self.citadel.cell();
        let delta_column = i64::from(citadel.column()) - i64::from(self.cell.column());
        let delta_row = i64::from(citadel.row()) - i64::from(self.cell.row());

        let (step_column, step_row) = if self.rng.gen_bool(self.config.bias) {
            toward_citadel(delta_column, delta_row)?
        } else {
            let direction = if self.rng.gen_bool(0.5) { 1 } else { -1 };
            if self.rng.gen_bool(0.5) {
                (direction, 0)
            } else {
                (0, direction)
            }
        };

        self.cell
            .checked_offset(step_column, step_row)
            .filter(|candidate| self.bounds.contains(*candidate))
    }

    /// Round-trip reservation: submits the check-and-reserve command and
    /// suspends until the actor resolves the single-use reply.
    fn reserve(&mut self, to: CellCoord) -> Result<bool, StepError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.world.submit_raider(RaiderCommand::ReserveStep {
            id: self.id,
            to,
            reply: reply_tx,
        })?;
        reply_rx
            .recv()
            .map_err(|_| StepError::Query(QueryError::Dropped))
    }

    /// Animates the transition with linear interpolation frames; the final
    /// frame snaps exactly onto the destination cell.
    fn animate(&mut self, to: CellCoord) -> Result<(), StepError> {
        let from = Position::from_cell(self.cell);
        let target = Position::from_cell(to);
        let frames = self.config.frames.max(1);
        for frame in 1..=frames {
            let factor = f64::from(frame) / f64::from(frames);
            self.world.submit_raider(RaiderCommand::Nudge {
                id: self.id,
                position: from.lerp(target, factor),
            })?;
            thread::sleep(self.config.frame_duration);
        }
        self.world.submit_raider(RaiderCommand::Arrive { id: self.id })?;
        self.cell = to;
        Ok(())
    }

    fn resolve_wall_collision(&mut self, at: CellCoord) -> Result<StepOutcome, StepError> {
        let walls = self.world.wall_view().map_err(StepError::Query)?;
        let Some(wall) = walls.at(at).copied() else {
            return Ok(StepOutcome::Continue);
        };
        match wall.health {
            WallHealth::Intact => {
                self.world.submit_wall(WallCommand::Damage { cell: at })?;
            }
            WallHealth::Damaged | WallHealth::Destroyed => {
                self.world.submit_wall(WallCommand::Demolish { cell: at })?;
            }
        }
        self.world.submit_raider(RaiderCommand::Remove { id: self.id })?;
        self.retired = true;
        Ok(StepOutcome::Retired)
    }
}

/// One-cell step along the axis with the larger absolute offset toward the
/// citadel; equal offsets prefer the horizontal axis. `None` when already on
/// the citadel cell.
fn toward_citadel(delta_column: i64, delta_row: i64) -> Option<(i64, i64)> {
    if delta_column == 0 && delta_row == 0 {
        return None;
    }
    if delta_column.abs() >= delta_row.abs() && delta_column != 0 {
        Some((delta_column.signum(), 0))
    } else {
        Some((0, delta_row.signum()))
    }
}

#[cfg(test)]
mod tests {
    use super::toward_citadel;

    #[test]
    fn equal_offsets_prefer_the_horizontal_axis() {
        assert_eq!(toward_citadel(4, 4), Some((1, 0)));
        assert_eq!(toward_citadel(-3, 3), Some((-1, 0)));
    }

    #[test]
    fn larger_vertical_offset_steps_vertically() {
        assert_eq!(toward_citadel(3, 4), Some((0, 1)));
        assert_eq!(toward_citadel(0, -2), Some((0, -1)));
    }

    #[test]
    fn standing_on_the_citadel_proposes_nothing() {
        assert_eq!(toward_citadel(0, 0), None);
    }
}

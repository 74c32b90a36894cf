//! Command application over the collections owned by the world actor.
//!
//! Everything in this module runs on the `world-state` thread. The collection
//! types are deliberately private: the only way state leaves this module is
//! through snapshot views.

use std::sync::Arc;
use std::time::Duration;

use citadel_defence_core::{
    CellCoord, Citadel, Event, GridBounds, Position, RaiderCommand, RaiderId, RaiderSnapshot,
    RaiderView, WallCommand, WallHealth, WallSnapshot, WallView, KILL_SCORE, WALL_CAP,
};
use citadel_defence_event_log::EventPublisher;
use tracing::debug;

use crate::Scalars;

#[derive(Clone, Debug)]
struct Raider {
    id: RaiderId,
    cell: CellCoord,
    prev_cell: CellCoord,
    next_cell: Option<CellCoord>,
    position: Position,
    cadence: Duration,
}

#[derive(Clone, Copy, Debug)]
struct Wall {
    cell: CellCoord,
    health: WallHealth,
}

pub(crate) struct State {
    bounds: GridBounds,
    citadel: Citadel,
    raiders: Vec<Raider>,
    walls: Vec<Wall>,
    scalars: Arc<Scalars>,
    events: EventPublisher,
}

impl State {
    pub(crate) fn new(bounds: GridBounds, scalars: Arc<Scalars>, events: EventPublisher) -> Self {
        Self {
            citadel: Citadel::at(bounds.citadel_cell()),
            bounds,
            raiders: Vec::new(),
            walls: Vec::new(),
            scalars,
            events,
        }
    }

    pub(crate) fn apply_raider(&mut self, command: RaiderCommand) {
        match command {
            RaiderCommand::Admit { id, cell, cadence } => self.admit(id, cell, cadence),
            RaiderCommand::ReserveStep { id, to, reply } => {
                let _ = reply.send(self.reserve_step(id, to));
            }
            RaiderCommand::Nudge { id, position } => {
                if let Some(raider) = self.raider_mut(id) {
                    raider.position = position;
                }
            }
            RaiderCommand::Arrive { id } => self.arrive(id),
            RaiderCommand::Remove { id } => self.remove(id),
            RaiderCommand::Breach { id } => self.breach(id),
            RaiderCommand::Query { callback } => callback(&self.raider_view()),
            RaiderCommand::Noop => {}
        }
    }

    pub(crate) fn apply_wall(&mut self, command: WallCommand) {
        match command {
            WallCommand::Place { cell } => self.place(cell),
            WallCommand::Damage { cell } => self.damage(cell),
            WallCommand::Demolish { cell } => self.demolish(cell),
            WallCommand::Query { callback } => callback(&self.wall_view()),
            WallCommand::Noop => {}
        }
    }

    fn admit(&mut self, id: RaiderId, cell: CellCoord, cadence: Duration) {
        if self.raiders.iter().any(|raider| raider.id == id) {
            debug!(id = id.get(), "duplicate raider admission dropped");
            return;
        }
        self.raiders.push(Raider {
            id,
            cell,
            prev_cell: cell,
            next_cell: None,
            position: Position::from_cell(cell),
            cadence,
        });
        self.events.publish(Event::RaiderSpawned { id, cell });
    }

    /// Checks the destination against every other raider's committed cell and
    /// reserved next cell, recording the reservation when free.
    ///
    /// The check and the reservation happen in one actor-side step, so two
    /// raiders contending for the same cell can never both receive `true`.
    fn reserve_step(&mut self, id: RaiderId, to: CellCoord) -> bool {
        let contested = self.raiders.iter().any(|other| {
            other.id != id && (other.cell == to || other.next_cell == Some(to))
        });
        if contested {
            return false;
        }
        let Some(raider) = self.raider_mut(id) else {
            return false;
        };
        raider.prev_cell = raider.cell;
        raider.next_cell = Some(to);
        true
    }

    fn arrive(&mut self, id: RaiderId) {
        if let Some(raider) = self.raider_mut(id) {
            if let Some(next) = raider.next_cell.take() {
                raider.cell = next;
                raider.position = Position::from_cell(next);
            }
        }
    }

    fn remove(&mut self, id: RaiderId) {
        let Some(index) = self.raiders.iter().position(|raider| raider.id == id) else {
            return;
        };
        let raider = self.raiders.remove(index);
        self.scalars.add_score(KILL_SCORE);
        self.events.publish(Event::RaiderDestroyed {
            id,
            cell: raider.cell,
        });
    }

    fn breach(&mut self, id: RaiderId) {
        if let Some(index) = self.raiders.iter().position(|raider| raider.id == id) {
            let _ = self.raiders.remove(index);
        }
        self.scalars.set_game_over();
        self.events.publish(Event::CitadelBreached {
            id,
            cell: self.citadel.cell(),
        });
    }

    fn place(&mut self, cell: CellCoord) {
        if self.walls.len() >= WALL_CAP {
            debug!(%cell, "wall cap reached, placement dropped");
            return;
        }
        if !self.bounds.contains(cell) || cell == self.citadel.cell() {
            debug!(%cell, "invalid wall placement dropped");
            return;
        }
        if self.walls.iter().any(|wall| wall.cell == cell) {
            debug!(%cell, "duplicate wall placement dropped");
            return;
        }
        self.walls.push(Wall {
            cell,
            health: WallHealth::Intact,
        });
        self.scalars.set_wall_count(self.walls.len());
        self.events.publish(Event::WallBuilt { cell });
    }

    fn damage(&mut self, cell: CellCoord) {
        let Some(wall) = self.walls.iter_mut().find(|wall| wall.cell == cell) else {
            return;
        };
        if wall.health == WallHealth::Intact {
            wall.health = WallHealth::Damaged;
            self.events.publish(Event::WallDamaged { cell });
        }
    }

    fn demolish(&mut self, cell: CellCoord) {
        let Some(index) = self
            .walls
            .iter()
            .position(|wall| wall.cell == cell && wall.health == WallHealth::Damaged)
        else {
            return;
        };
        let _ = self.walls.remove(index);
        self.scalars.set_wall_count(self.walls.len());
        self.events.publish(Event::WallDestroyed { cell });
    }

    fn raider_mut(&mut self, id: RaiderId) -> Option<&mut Raider> {
        self.raiders.iter_mut().find(|raider| raider.id == id)
    }

    fn raider_view(&self) -> RaiderView {
        RaiderView::from_snapshots(
            self.raiders
                .iter()
                .map(|raider| RaiderSnapshot {
                    id: raider.id,
                    cell: raider.cell,
                    prev_cell: raider.prev_cell,
                    position: raider.position,
                    next_cell: raider.next_cell,
                    cadence: raider.cadence,
                })
                .collect(),
        )
    }

    fn wall_view(&self) -> WallView {
        WallView::from_snapshots(
            self.walls
                .iter()
                .map(|wall| WallSnapshot {
                    cell: wall.cell,
                    health: wall.health,
                })
                .collect(),
        )
    }
}

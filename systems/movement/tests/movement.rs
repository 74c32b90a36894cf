use std::time::{Duration, Instant};

use citadel_defence_core::{
    CellCoord, GridBounds, RaiderCommand, RaiderId, WallCommand, WallHealth, KILL_SCORE,
};
use citadel_defence_event_log::EventLog;
use citadel_defence_system_movement::{Movement, MovementConfig, StepOutcome};
use citadel_defence_world::{WorldConfig, WorldState};

const CADENCE: Duration = Duration::from_millis(500);
const ALWAYS_TOWARD_CITADEL: MovementConfig =
    MovementConfig::new(1.0, 2, Duration::from_millis(1));

fn start_world() -> (WorldState, EventLog) {
    let log = EventLog::start(Box::new(std::io::sink())).expect("start event log");
    let config = WorldConfig::new(GridBounds::default(), Duration::ZERO, 30);
    let world = WorldState::start(config, log.publisher()).expect("start world");
    (world, log)
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn admit(world: &WorldState, id: u32, cell: CellCoord) {
    world
        .handle()
        .submit_raider(RaiderCommand::Admit {
            id: RaiderId::new(id),
            cell,
            cadence: CADENCE,
        })
        .expect("submit admit");
}

#[test]
fn fully_biased_raider_marches_into_the_citadel() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    let start = CellCoord::new(0, 0);
    admit(&world, 1, start);

    let mut task = Movement::new(
        RaiderId::new(1),
        start,
        handle.clone(),
        ALWAYS_TOWARD_CITADEL,
        7,
    );
    let mut outcome = StepOutcome::Continue;
    // Manhattan distance from the corner to the citadel is eight cells.
    for _ in 0..8 {
        outcome = task.step();
        if outcome == StepOutcome::Retired {
            break;
        }
    }

    assert_eq!(outcome, StepOutcome::Retired);
    assert!(task.is_retired());
    assert!(
        wait_until(Duration::from_secs(1), || handle.is_game_over()),
        "reaching the citadel must end the session",
    );
    assert!(wait_until(Duration::from_secs(1), || {
        handle
            .raider_view()
            .map(|view| view.is_empty())
            .unwrap_or(false)
    }));

    world.stop();
    log.stop();
}

#[test]
fn intact_wall_stops_a_raider_and_takes_damage() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    let wall_cell = CellCoord::new(1, 0);
    handle
        .submit_wall(WallCommand::Place { cell: wall_cell })
        .expect("submit place");
    admit(&world, 1, CellCoord::new(0, 0));

    let mut task = Movement::new(
        RaiderId::new(1),
        CellCoord::new(0, 0),
        handle.clone(),
        ALWAYS_TOWARD_CITADEL,
        11,
    );
    assert_eq!(task.step(), StepOutcome::Retired);

    assert!(
        wait_until(Duration::from_secs(1), || handle.score() >= KILL_SCORE),
        "the wall collision must award the kill score",
    );
    let walls = handle.wall_view().expect("wall view");
    assert_eq!(
        walls.at(wall_cell).map(|wall| wall.health),
        Some(WallHealth::Damaged),
        "a first collision leaves the wall damaged but standing",
    );

    world.stop();
    log.stop();
}

#[test]
fn second_collision_demolishes_a_damaged_wall() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    let wall_cell = CellCoord::new(1, 0);
    handle
        .submit_wall(WallCommand::Place { cell: wall_cell })
        .expect("submit place");
    handle
        .submit_wall(WallCommand::Damage { cell: wall_cell })
        .expect("submit damage");
    admit(&world, 1, CellCoord::new(0, 0));

    let mut task = Movement::new(
        RaiderId::new(1),
        CellCoord::new(0, 0),
        handle.clone(),
        ALWAYS_TOWARD_CITADEL,
        13,
    );
    assert_eq!(task.step(), StepOutcome::Retired);

    assert!(
        wait_until(Duration::from_secs(1), || handle.wall_count() == 0),
        "a damaged wall must fall on the second collision",
    );
    assert!(
        wait_until(Duration::from_secs(1), || handle.score() >= KILL_SCORE),
        "the colliding raider still dies for the kill score",
    );

    world.stop();
    log.stop();
}

#[test]
fn contested_destination_forfeits_the_step() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    admit(&world, 1, CellCoord::new(0, 0));
    // Raider 2 is parked on the only cell raider 1's bias can propose.
    admit(&world, 2, CellCoord::new(1, 0));

    let mut task = Movement::new(
        RaiderId::new(1),
        CellCoord::new(0, 0),
        handle.clone(),
        ALWAYS_TOWARD_CITADEL,
        17,
    );
    assert_eq!(task.step(), StepOutcome::Continue);
    assert_eq!(task.current_cell(), CellCoord::new(0, 0));
    assert!(!task.is_retired());

    let view = handle.raider_view().expect("raider view");
    let first = view
        .iter()
        .find(|snapshot| snapshot.id == RaiderId::new(1))
        .expect("raider 1 present");
    assert_eq!(
        first.cell,
        CellCoord::new(0, 0),
        "a forfeited step must not move the raider",
    );

    world.stop();
    log.stop();
}

#[test]
fn retired_task_ignores_further_invocations() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    let wall_cell = CellCoord::new(1, 0);
    handle
        .submit_wall(WallCommand::Place { cell: wall_cell })
        .expect("submit place");
    admit(&world, 1, CellCoord::new(0, 0));

    let mut task = Movement::new(
        RaiderId::new(1),
        CellCoord::new(0, 0),
        handle.clone(),
        ALWAYS_TOWARD_CITADEL,
        19,
    );
    assert_eq!(task.step(), StepOutcome::Retired);
    assert!(wait_until(Duration::from_secs(1), || {
        handle.score() >= KILL_SCORE
    }));

    let score_before = handle.score();
    assert_eq!(task.step(), StepOutcome::Retired);
    assert_eq!(task.step(), StepOutcome::Retired);
    assert_eq!(
        handle.score(),
        score_before,
        "a retired task must not touch the world again",
    );

    world.stop();
    log.stop();
}

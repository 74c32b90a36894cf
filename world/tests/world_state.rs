use std::time::{Duration, Instant};

use citadel_defence_core::{
    CellCoord, GridBounds, RaiderCommand, RaiderId, WallCommand, KILL_SCORE, WALL_CAP,
};
use citadel_defence_event_log::EventLog;
use citadel_defence_world::{WorldConfig, WorldState};
use crossbeam_channel::bounded;

const CADENCE: Duration = Duration::from_millis(500);

fn start_world(score_tick: Duration) -> (WorldState, EventLog) {
    let log = EventLog::start(Box::new(std::io::sink())).expect("start event log");
    let config = WorldConfig::new(GridBounds::default(), score_tick, 30);
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
fn admitted_raiders_appear_in_snapshot_views() {
    let (mut world, mut log) = start_world(Duration::ZERO);
    admit(&world, 1, CellCoord::new(0, 0));
    admit(&world, 2, CellCoord::new(8, 8));

    let view = world.handle().raider_view().expect("raider view");
    let ids: Vec<u32> = view.iter().map(|snapshot| snapshot.id.get()).collect();
    assert_eq!(ids, vec![1, 2]);

    world.stop();
    log.stop();
}

#[test]
fn contested_step_reservation_resolves_to_single_winner() {
    let (mut world, mut log) = start_world(Duration::ZERO);
    let handle = world.handle();
    admit(&world, 1, CellCoord::new(0, 0));
    admit(&world, 2, CellCoord::new(2, 0));

    let contested = CellCoord::new(1, 0);
    let (first_tx, first_rx) = bounded(1);
    let (second_tx, second_rx) = bounded(1);
    handle
        .submit_raider(RaiderCommand::ReserveStep {
            id: RaiderId::new(1),
            to: contested,
            reply: first_tx,
        })
        .expect("submit first reservation");
    handle
        .submit_raider(RaiderCommand::ReserveStep {
            id: RaiderId::new(2),
            to: contested,
            reply: second_tx,
        })
        .expect("submit second reservation");

    let first = first_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("first reply");
    let second = second_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("second reply");
    assert!(
        first ^ second,
        "exactly one raider may reserve a contested cell, got {first} and {second}",
    );

    world.stop();
    log.stop();
}

#[test]
fn kill_and_tick_scores_accumulate_monotonically() {
    let (mut world, mut log) = start_world(Duration::from_millis(20));
    let handle = world.handle();
    admit(&world, 1, CellCoord::new(0, 0));
    handle
        .submit_raider(RaiderCommand::Remove {
            id: RaiderId::new(1),
        })
        .expect("submit remove");

    assert!(
        wait_until(Duration::from_secs(1), || handle.score() >= KILL_SCORE),
        "kill score must arrive",
    );
    let after_kill = handle.score();
    assert!(
        wait_until(Duration::from_secs(1), || handle.score() > after_kill),
        "tick score must keep accruing",
    );
    assert!(handle.score() >= after_kill, "score never decreases");

    world.stop();
    log.stop();
}

#[test]
fn breach_latches_game_over() {
    let (mut world, mut log) = start_world(Duration::ZERO);
    let handle = world.handle();
    admit(&world, 1, CellCoord::new(4, 4));
    handle
        .submit_raider(RaiderCommand::Breach {
            id: RaiderId::new(1),
        })
        .expect("submit breach");

    assert!(wait_until(Duration::from_secs(1), || handle.is_game_over()));

    // Later traffic must not reset the flag.
    admit(&world, 2, CellCoord::new(0, 0));
    let _ = handle.raider_view().expect("raider view");
    assert!(handle.is_game_over(), "game over is terminal");

    world.stop();
    log.stop();
}

#[test]
fn wall_cap_holds_under_direct_command_load() {
    let (mut world, mut log) = start_world(Duration::ZERO);
    let handle = world.handle();
    for index in 0..(WALL_CAP as u32 + 1) {
        handle
            .submit_wall(WallCommand::Place {
                cell: CellCoord::new(index % 9, index / 9),
            })
            .expect("submit place");
    }

    assert!(wait_until(Duration::from_secs(1), || {
        handle.wall_count() == WALL_CAP
    }));
    let view = handle.wall_view().expect("wall view");
    assert_eq!(view.len(), WALL_CAP, "the eleventh wall must be rejected");

    world.stop();
    log.stop();
}

#[test]
fn stop_drains_commands_accepted_before_shutdown() {
    let (mut world, mut log) = start_world(Duration::ZERO);
    let handle = world.handle();
    for column in 0..3u32 {
        handle
            .submit_wall(WallCommand::Place {
                cell: CellCoord::new(column, 0),
            })
            .expect("submit place");
    }
    world.stop();

    assert_eq!(
        handle.wall_count(),
        3,
        "placements accepted before stop must be applied",
    );
    assert!(
        handle
            .submit_wall(WallCommand::Place {
                cell: CellCoord::new(5, 5),
            })
            .is_err(),
        "submissions after stop must fail",
    );

    world.stop();
    log.stop();
}

use std::time::{Duration, Instant};

use citadel_defence_core::{CellCoord, GridBounds, RaiderCommand, RaiderId, WallCommand, WALL_CAP};
use citadel_defence_event_log::EventLog;
use citadel_defence_system_builder::{Builder, BuilderConfig, RequestError};
use citadel_defence_world::{WorldConfig, WorldState};

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

#[test]
fn builds_are_spaced_by_the_throttle() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    let throttle = Duration::from_millis(150);
    let mut builder =
        Builder::start(handle.clone(), BuilderConfig::new(10, throttle)).expect("start builder");
    let requester = builder.requester();

    let started = Instant::now();
    for column in 0..3u32 {
        requester
            .request(CellCoord::new(column, 0))
            .expect("request accepted");
    }

    assert!(wait_until(Duration::from_secs(2), || handle.wall_count() == 3));
    assert!(
        started.elapsed() >= throttle * 2,
        "three builds must span at least two throttle pauses",
    );

    builder.stop();
    world.stop();
    log.stop();
}

#[test]
fn full_queue_refuses_further_requests() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    // A one-minute throttle parks the builder after its first build.
    let mut builder = Builder::start(
        handle.clone(),
        BuilderConfig::new(2, Duration::from_secs(60)),
    )
    .expect("start builder");
    let requester = builder.requester();

    requester.request(CellCoord::new(0, 0)).expect("first request");
    assert!(wait_until(Duration::from_secs(1), || handle.wall_count() == 1));

    requester.request(CellCoord::new(1, 0)).expect("second request");
    requester.request(CellCoord::new(2, 0)).expect("third request");
    assert_eq!(
        requester.request(CellCoord::new(3, 0)),
        Err(RequestError::QueueFull),
    );

    builder.stop();
    world.stop();
    log.stop();
}

#[test]
fn duplicate_and_capped_requests_are_refused_early() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    let mut builder = Builder::start(
        handle.clone(),
        BuilderConfig::new(10, Duration::from_millis(1)),
    )
    .expect("start builder");
    let requester = builder.requester();

    let occupied = CellCoord::new(0, 0);
    handle
        .submit_wall(WallCommand::Place { cell: occupied })
        .expect("submit place");
    assert!(wait_until(Duration::from_secs(1), || handle.wall_count() == 1));
    assert_eq!(requester.request(occupied), Err(RequestError::Duplicate));

    for index in 1..WALL_CAP as u32 {
        handle
            .submit_wall(WallCommand::Place {
                cell: CellCoord::new(index % 9, index / 9),
            })
            .expect("submit place");
    }
    assert!(wait_until(Duration::from_secs(1), || {
        handle.wall_count() == WALL_CAP
    }));
    assert_eq!(
        requester.request(CellCoord::new(5, 5)),
        Err(RequestError::CapReached),
    );

    builder.stop();
    world.stop();
    log.stop();
}

#[test]
fn eleventh_build_request_is_rejected_at_the_cap() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    let mut builder = Builder::start(
        handle.clone(),
        BuilderConfig::new(10, Duration::from_millis(1)),
    )
    .expect("start builder");
    let requester = builder.requester();

    for index in 0..WALL_CAP as u32 {
        requester
            .request(CellCoord::new(index % 9, index / 9))
            .expect("request accepted");
    }
    assert!(wait_until(Duration::from_secs(2), || {
        handle.wall_count() == WALL_CAP
    }));
    assert_eq!(requester.queued_builds(), 0, "the backlog must drain");

    assert_eq!(
        requester.request(CellCoord::new(5, 5)),
        Err(RequestError::CapReached),
    );
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(handle.wall_count(), WALL_CAP, "the cap must hold");

    builder.stop();
    world.stop();
    log.stop();
}

#[test]
fn contested_cell_is_skipped_at_build_time() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    let mut builder = Builder::start(
        handle.clone(),
        BuilderConfig::new(10, Duration::from_millis(1)),
    )
    .expect("start builder");
    let requester = builder.requester();

    let contested = CellCoord::new(3, 3);
    handle
        .submit_raider(RaiderCommand::Admit {
            id: RaiderId::new(1),
            cell: contested,
            cadence: Duration::from_secs(60),
        })
        .expect("submit admit");
    assert!(wait_until(Duration::from_secs(1), || {
        handle
            .raider_view()
            .map(|view| !view.is_empty())
            .unwrap_or(false)
    }));

    requester.request(contested).expect("request accepted");
    requester
        .request(CellCoord::new(7, 7))
        .expect("request accepted");

    // The second request builds, proving the first was dequeued and skipped.
    assert!(wait_until(Duration::from_secs(1), || handle.wall_count() == 1));
    let walls = handle.wall_view().expect("wall view");
    assert!(
        walls.at(contested).is_none(),
        "a cell under a raider must stay clear",
    );

    builder.stop();
    world.stop();
    log.stop();
}

#[test]
fn requests_fail_closed_after_stop() {
    let (mut world, mut log) = start_world();
    let handle = world.handle();
    let mut builder = Builder::start(handle.clone(), BuilderConfig::default()).expect("start builder");
    let requester = builder.requester();
    builder.stop();

    assert_eq!(
        requester.request(CellCoord::new(1, 1)),
        Err(RequestError::Closed),
    );
    builder.stop();

    world.stop();
    log.stop();
}

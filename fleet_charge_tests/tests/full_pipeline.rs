// End-to-end tests for the fleet-charge pipeline.
//
// Each test starts a real relay, connects real dashboard bridges, station
// finders and a passive viewer, and checks what every subscriber observes:
// dashboard → relay → finder → relay → dashboard → relay → viewers.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use fleet_charge_dashboard::Command;
use fleet_charge_protocol::event::DashboardEvent;
use fleet_charge_sim::{Phase, SimConfig, StationCorrelation};
use fleet_charge_tests::{
    POLL_TIMEOUT, TestViewer, connect_dashboard, drive_for, drive_until, drive_until_seen, fleet,
    spawn_finder, start_test_relay, user, vehicle,
};

fn is_charge_now(event: &DashboardEvent) -> bool {
    matches!(event, DashboardEvent::ChargeNow { .. })
}

fn is_batch(event: &DashboardEvent) -> bool {
    matches!(event, DashboardEvent::ChargeNowMultiple { .. })
}

/// One vehicle at 22 draining 5: a single tick crosses and the one user is
/// assigned the station the finder returns.
#[test]
fn single_vehicle_is_assigned_a_station() {
    let (handle, addr) = start_test_relay();
    let finder = spawn_finder(addr, &[("loc-u1", "S-7")]);
    let mut viewer = TestViewer::connect(addr);
    let mut dashboard = connect_dashboard(
        addr,
        "dashboard",
        fleet(vec![user("u1", "v1")], vec![vehicle("v1", 5.0, 22.0)]),
        SimConfig::default(),
    );

    dashboard.start();
    dashboard.tick();
    assert!(!dashboard.dashboard().simulator().is_running());

    let assigned = drive_until_seen(&mut dashboard, &mut viewer, "chargeNow", is_charge_now);
    assert_eq!(
        assigned,
        DashboardEvent::ChargeNow {
            station: "S-7".into(),
            user_id: "u1".into(),
        }
    );

    // Viewer saw the run start, the crossing stop, and the request.
    let timers: Vec<_> = viewer
        .named("timerUpdate")
        .into_iter()
        .cloned()
        .collect();
    assert_eq!(
        timers,
        vec![
            DashboardEvent::TimerUpdate { timer: true },
            DashboardEvent::TimerUpdate { timer: false },
        ]
    );
    assert_eq!(
        viewer.named("location"),
        vec![&DashboardEvent::Location {
            loc: "loc-u1".into()
        }]
    );

    finder.stop();
    handle.stop();
}

/// Three users sharing one vehicle: three requests in crossing order and one
/// batch; by default the latest station goes to everyone.
#[test]
fn shared_vehicle_gets_one_batch() {
    let (handle, addr) = start_test_relay();
    let finder = spawn_finder(addr, &[("loc-u1", "S1"), ("loc-u2", "S2"), ("loc-u3", "S3")]);
    let mut viewer = TestViewer::connect(addr);
    let mut dashboard = connect_dashboard(
        addr,
        "dashboard",
        fleet(
            vec![user("u1", "v1"), user("u2", "v1"), user("u3", "v1")],
            vec![vehicle("v1", 5.0, 22.0)],
        ),
        SimConfig::default(),
    );

    dashboard.start();
    dashboard.tick();
    let batch = drive_until_seen(&mut dashboard, &mut viewer, "chargeNowMultiple", is_batch);
    assert_eq!(
        batch,
        DashboardEvent::ChargeNowMultiple {
            stations: vec!["S3".into(), "S3".into(), "S3".into()],
            user_ids: vec!["u1".into(), "u2".into(), "u3".into()],
        }
    );

    let locations: Vec<_> = viewer
        .named("location")
        .into_iter()
        .map(|e| match e {
            DashboardEvent::Location { loc } => loc.clone(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(locations, ["loc-u1", "loc-u2", "loc-u3"]);
    assert!(viewer.named("chargeNow").is_empty());

    finder.stop();
    handle.stop();
}

#[test]
fn in_order_correlation_pairs_each_answer() {
    let (handle, addr) = start_test_relay();
    let finder = spawn_finder(addr, &[("loc-u1", "S1"), ("loc-u2", "S2"), ("loc-u3", "S3")]);
    let mut viewer = TestViewer::connect(addr);
    let config = SimConfig {
        station_correlation: StationCorrelation::InOrder,
        ..SimConfig::default()
    };
    let mut dashboard = connect_dashboard(
        addr,
        "dashboard",
        fleet(
            vec![user("u1", "v1"), user("u2", "v1"), user("u3", "v1")],
            vec![vehicle("v1", 5.0, 22.0)],
        ),
        config,
    );

    dashboard.start();
    dashboard.tick();
    let batch = drive_until_seen(&mut dashboard, &mut viewer, "chargeNowMultiple", is_batch);
    assert_eq!(
        batch,
        DashboardEvent::ChargeNowMultiple {
            stations: vec!["S1".into(), "S2".into(), "S3".into()],
            user_ids: vec!["u1".into(), "u2".into(), "u3".into()],
        }
    );

    finder.stop();
    handle.stop();
}

/// No finder answers: no assignment is ever published, and the run is
/// already marked processed.
#[test]
fn unanswered_request_assigns_nothing() {
    let (handle, addr) = start_test_relay();
    let mut viewer = TestViewer::connect(addr);
    let mut dashboard = connect_dashboard(
        addr,
        "dashboard",
        fleet(vec![user("u1", "v1")], vec![vehicle("v1", 5.0, 22.0)]),
        SimConfig::default(),
    );

    dashboard.start();
    dashboard.tick();
    drive_for(&mut dashboard, &mut viewer, Duration::from_millis(300));

    assert_eq!(viewer.named("location").len(), 1);
    assert!(viewer.named("chargeNow").is_empty());
    let coordinator = dashboard.dashboard().coordinator();
    assert!(coordinator.is_processed());
    assert!(coordinator.is_awaiting());

    handle.stop();
}

/// A second dashboard follows the first one's run state without echoing
/// it, and the first ignores its own echo.
#[test]
fn run_state_is_shared_without_echo() {
    let (handle, addr) = start_test_relay();
    let mut viewer = TestViewer::connect(addr);
    let make_fleet = || fleet(vec![user("u1", "v1")], vec![vehicle("v1", 1.0, 80.0)]);
    let mut a = connect_dashboard(addr, "a", make_fleet(), SimConfig::default());
    let mut b = connect_dashboard(addr, "b", make_fleet(), SimConfig::default());

    a.start();
    drive_until(&mut b, "b to follow a", |b| {
        b.dashboard().simulator().is_running()
    });
    // a processes its own echo and stays running.
    a.pump(Duration::from_millis(200));
    assert!(a.dashboard().simulator().is_running());

    a.stop();
    drive_until(&mut b, "b to stop", |b| !b.dashboard().simulator().is_running());

    assert_eq!(a.published(), 2);
    assert_eq!(b.published(), 0);
    drive_for(&mut a, &mut viewer, Duration::from_millis(100));
    assert_eq!(viewer.named("timerUpdate").len(), 2);

    handle.stop();
}

/// Shutting down with a partial batch publishes the resolved part.
#[test]
fn shutdown_flushes_resolved_users() {
    let (handle, addr) = start_test_relay();
    // Only u1's location is known.
    let finder = spawn_finder(addr, &[("loc-u1", "S1")]);
    let mut viewer = TestViewer::connect(addr);
    let config = SimConfig {
        station_correlation: StationCorrelation::InOrder,
        ..SimConfig::default()
    };
    let mut dashboard = connect_dashboard(
        addr,
        "dashboard",
        fleet(
            vec![user("u1", "v1"), user("u2", "v1")],
            vec![vehicle("v1", 5.0, 22.0)],
        ),
        config,
    );

    dashboard.start();
    dashboard.tick();
    drive_until(&mut dashboard, "the first answer", |d| {
        matches!(
            d.dashboard().coordinator().phase(),
            Phase::Awaiting { answers, .. } if answers.len() == 1
        )
    });
    dashboard.shutdown();

    let start = Instant::now();
    loop {
        assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for batch");
        viewer.drain();
        if !viewer.named("chargeNowMultiple").is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(
        viewer.named("chargeNowMultiple"),
        vec![&DashboardEvent::ChargeNowMultiple {
            stations: vec!["S1".into()],
            user_ids: vec!["u1".into()],
        }]
    );

    finder.stop();
    handle.stop();
}

/// The real event loop: ticks come from the deadline, commands from a
/// channel, and the crossing is reached on the second tick.
#[test]
fn run_loop_ticks_on_its_own() {
    let (handle, addr) = start_test_relay();
    let finder = spawn_finder(addr, &[("loc-u1", "S-9")]);
    let mut viewer = TestViewer::connect(addr);
    let config = SimConfig {
        tick_interval_ms: 20,
        ..SimConfig::default()
    };
    let dashboard = connect_dashboard(
        addr,
        "dashboard",
        fleet(vec![user("u1", "v1")], vec![vehicle("v1", 5.0, 30.0)]),
        config,
    );

    let (tx, rx) = mpsc::channel();
    let loop_thread = thread::spawn(move || dashboard.run(&rx, |_| {}));
    tx.send(Command::Toggle).unwrap();

    let start = Instant::now();
    loop {
        assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for chargeNow");
        viewer.drain();
        if !viewer.named("chargeNow").is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(
        viewer.named("chargeNow"),
        vec![&DashboardEvent::ChargeNow {
            station: "S-9".into(),
            user_id: "u1".into(),
        }]
    );

    tx.send(Command::Quit).unwrap();
    loop_thread.join().unwrap();
    finder.stop();
    handle.stop();
}

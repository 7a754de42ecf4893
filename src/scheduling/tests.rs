use super::SimulationScheduler;
use crate::flight_control::{AutopilotMode, FlightMode, RouteUpdate, VehicleHealth};
use crate::mode_control::{Command, CommandError, PreconditionError};
use crate::util::{GeoPoint, SimConfig};
use tokio::time::Duration;

const ORIGIN: GeoPoint = GeoPoint::new(0.0, 0.0);

fn scheduler_at(home: GeoPoint) -> SimulationScheduler {
    SimulationScheduler::new(SimConfig { home, ..SimConfig::default() })
}

fn armed_scheduler() -> SimulationScheduler {
    let mut scheduler = scheduler_at(ORIGIN);
    scheduler.apply(Command::SetConnected(true)).unwrap();
    scheduler.apply(Command::Arm).unwrap();
    scheduler
}

fn tick_until(scheduler: &mut SimulationScheduler, mode: FlightMode, limit: usize) {
    for _ in 0..limit {
        scheduler.tick();
        if scheduler.context().telemetry().mode == mode {
            return;
        }
    }
    panic!("mode {mode} not reached within {limit} ticks");
}

async fn advance_tick(scheduler: &mut SimulationScheduler) {
    tokio::time::advance(scheduler.context().config().tick).await;
    scheduler.tick();
}

fn sample_count(scheduler: &SimulationScheduler) -> usize { scheduler.context().route().sample_count() }

#[test]
fn test_stepping_without_runtime() {
    let mut scheduler = armed_scheduler();
    let ack = scheduler.apply(Command::Takeoff { altitude: 10.0 }).unwrap();
    assert!(ack.maneuver_started);
    assert!(scheduler.context().is_trace_pending());
    tick_until(&mut scheduler, FlightMode::Guided, 60);
    scheduler.apply(Command::Goto { position: GeoPoint::new(0.0001, 0.0) }).unwrap();
    scheduler.apply(Command::ReturnToLaunch).unwrap();
    scheduler.apply(Command::Land).unwrap();
    tick_until(&mut scheduler, FlightMode::Grounded, 100);
    assert_eq!(sample_count(&scheduler), 0);
}

#[test]
fn test_simulated_health_survives_disconnect() {
    let mut scheduler = armed_scheduler();
    assert_eq!(scheduler.context().telemetry().health, VehicleHealth::SIMULATED);
    scheduler.apply(Command::SetConnected(false)).unwrap();
    assert_eq!(scheduler.context().telemetry().health, VehicleHealth::SIMULATED);
    assert!(!scheduler.context().telemetry().armed);

    scheduler.apply(Command::SetConnected(true)).unwrap();
    let mode_switch = Command::SetMode { mode: AutopilotMode::Loiter };
    assert_eq!(
        scheduler.apply(mode_switch),
        Err(CommandError::Precondition(PreconditionError::NoAutopilot))
    );
}

#[tokio::test]
async fn test_takeoff_and_land_scenario() {
    let mut scheduler = scheduler_at(ORIGIN);
    assert!(scheduler.tick().is_none());
    scheduler.apply(Command::SetConnected(true)).unwrap();
    let ack = scheduler.apply(Command::Arm).unwrap();
    assert!(ack.armed);

    let ack = scheduler.apply(Command::Takeoff { altitude: 10.0 }).unwrap();
    assert_eq!(ack.mode, FlightMode::Takeoff);
    assert_eq!(scheduler.context().target().and_then(|t| t.altitude), Some(10.0));

    tick_until(&mut scheduler, FlightMode::Guided, 60);
    let state = *scheduler.context().telemetry();
    assert!((state.altitude - 10.0).abs() <= 0.1);
    assert_eq!(state.vertical_speed, 0.0);

    let ack = scheduler.apply(Command::Land).unwrap();
    assert_eq!(ack.mode, FlightMode::Land);
    tick_until(&mut scheduler, FlightMode::Grounded, 60);
    let state = *scheduler.context().telemetry();
    assert_eq!(state.altitude, 0.0);
    assert!(!state.armed);
    assert_eq!(scheduler.context().target(), None);
}

#[tokio::test]
async fn test_return_to_launch_ends_at_home() {
    let mut scheduler = armed_scheduler();
    scheduler.apply(Command::Takeoff { altitude: 15.0 }).unwrap();
    tick_until(&mut scheduler, FlightMode::Guided, 100);
    let dest = GeoPoint::new(0.0008, 0.0005);
    scheduler.apply(Command::Goto { position: dest }).unwrap();
    for _ in 0..300 {
        scheduler.tick();
    }
    assert_eq!(scheduler.context().telemetry().position, dest);

    scheduler.apply(Command::ReturnToLaunch).unwrap();
    let mut modes = vec![scheduler.context().telemetry().mode];
    for _ in 0..2000 {
        let state = *scheduler.context().telemetry();
        assert!(state.altitude >= 0.0);
        assert!((0.0..360.0).contains(&state.heading));
        if let Some(transition) = scheduler.tick().and_then(|r| r.transition) {
            modes.push(transition.to);
        }
        if scheduler.context().telemetry().mode == FlightMode::Grounded {
            break;
        }
    }
    assert_eq!(modes, vec![FlightMode::Rtl, FlightMode::Land, FlightMode::Grounded]);
    let state = scheduler.context().telemetry();
    assert!(!state.armed);
    assert!(state.altitude.abs() <= 0.1);
    assert_eq!(state.position, scheduler.context().home());
    assert_eq!(state.position, ORIGIN);
}

#[tokio::test]
async fn test_takeoff_reanchors_home() {
    let mut scheduler = scheduler_at(ORIGIN);
    scheduler.apply(Command::SetConnected(true)).unwrap();
    let staged = GeoPoint::new(0.0001, 0.0);
    scheduler.apply(Command::Goto { position: staged }).unwrap();
    tick_until(&mut scheduler, FlightMode::Grounded, 200);
    assert_eq!(scheduler.context().telemetry().position, staged);

    scheduler.apply(Command::Arm).unwrap();
    scheduler.apply(Command::Takeoff { altitude: 5.0 }).unwrap();
    assert_eq!(scheduler.context().home(), staged);

    scheduler.apply(Command::SetConnected(false)).unwrap();
    assert_eq!(scheduler.context().home(), ORIGIN);
    assert_eq!(scheduler.context().telemetry().position, ORIGIN);
}

#[tokio::test]
async fn test_rejected_command_leaves_state_unchanged() {
    let mut scheduler = scheduler_at(ORIGIN);
    scheduler.apply(Command::SetConnected(true)).unwrap();
    let telemetry = *scheduler.context().telemetry();
    let route = scheduler.context().route().points();

    let err = scheduler.apply(Command::Takeoff { altitude: 10.0 }).unwrap_err();
    assert_eq!(err, CommandError::Precondition(PreconditionError::NotArmed));
    assert!(scheduler.apply(Command::Land).is_err());
    assert!(scheduler.apply(Command::Takeoff { altitude: -3.0 }).is_err());

    assert_eq!(*scheduler.context().telemetry(), telemetry);
    assert_eq!(scheduler.context().route().points(), route);
    assert_eq!(scheduler.context().target(), None);
    assert!(!scheduler.context().is_trace_pending());
}

#[tokio::test(start_paused = true)]
async fn test_trace_buffer_waits_for_delay() {
    let mut scheduler = armed_scheduler();
    scheduler.apply(Command::Takeoff { altitude: 50.0 }).unwrap();
    assert_eq!(scheduler.context().route().points(), vec![ORIGIN]);

    for step in 1..=99 {
        advance_tick(&mut scheduler).await;
        assert_eq!(sample_count(&scheduler), 0, "sample recorded at step {step}");
    }
    advance_tick(&mut scheduler).await;

    let mut last_len = sample_count(&scheduler);
    for _ in 101..=200 {
        advance_tick(&mut scheduler).await;
        let len = sample_count(&scheduler);
        assert!(len > 0 && len >= last_len);
        last_len = len;
    }

    // a new maneuver starts over
    scheduler.apply(Command::Goto { position: GeoPoint::new(0.001, 0.0) }).unwrap();
    assert_eq!(sample_count(&scheduler), 0);
    assert_eq!(scheduler.context().route().points().len(), 1);
    advance_tick(&mut scheduler).await;
    assert_eq!(sample_count(&scheduler), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_trace_delay() {
    let mut scheduler = armed_scheduler();
    scheduler.apply(Command::Takeoff { altitude: 20.0 }).unwrap();
    for _ in 0..50 {
        advance_tick(&mut scheduler).await;
    }
    assert!(scheduler.context().is_trace_pending());

    scheduler.apply(Command::SetConnected(false)).unwrap();
    assert!(!scheduler.context().is_trace_pending());
    tokio::time::advance(Duration::from_secs(20)).await;
    scheduler.apply(Command::SetConnected(true)).unwrap();
    for _ in 0..50 {
        advance_tick(&mut scheduler).await;
    }
    assert_eq!(sample_count(&scheduler), 0);
}

#[tokio::test(start_paused = true)]
async fn test_started_scheduler_runs_commands_between_ticks() {
    let mut handle = scheduler_at(ORIGIN).start();
    let mut telemetry = handle.telemetry();

    handle.submit(Command::SetConnected(true)).await.unwrap();
    handle.submit(Command::Arm).await.unwrap();
    let ack = handle.submit(Command::Takeoff { altitude: 10.0 }).await.unwrap();
    assert!(ack.maneuver_started);
    assert_eq!(handle.route().take_update(), Some(RouteUpdate::Replace(vec![ORIGIN])));

    // the borrow returned by wait_for must not outlive this statement
    let reached = tokio::time::timeout(
        Duration::from_secs(30),
        telemetry.wait_for(|t| t.mode == FlightMode::Guided),
    )
    .await
    .is_ok_and(|res| res.is_ok());
    assert!(reached, "takeoff never completed");

    let scheduler = handle.stop().await.unwrap();
    let state = scheduler.context().telemetry();
    assert_eq!(state.mode, FlightMode::Guided);
    assert!((state.altitude - 10.0).abs() <= 0.1);
    assert!(!scheduler.context().is_trace_pending());

    assert_eq!(handle.submit(Command::Land).await, Err(CommandError::SchedulerStopped));
    assert!(handle.stop().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_route_feed_streams_only_new_samples() {
    let config = SimConfig { home: ORIGIN, trace_delay: Duration::ZERO, ..SimConfig::default() };
    let mut handle = SimulationScheduler::new(config).start();
    let mut feed = handle.route();
    assert_eq!(feed.take_update(), Some(RouteUpdate::Replace(Vec::new())));

    handle.submit(Command::SetConnected(true)).await.unwrap();
    handle.submit(Command::Goto { position: GeoPoint::new(0.5, 0.0) }).await.unwrap();
    feed.changed().await.unwrap();
    let mut total = match feed.take_update() {
        Some(RouteUpdate::Replace(points)) => {
            assert_eq!(points[0], ORIGIN);
            points.len() - 1
        }
        other => panic!("expected a new route, got {other:?}"),
    };

    while total < 500 {
        tokio::time::timeout(Duration::from_secs(5), feed.changed()).await.unwrap().unwrap();
        match feed.take_update() {
            // each tick appends a single sample
            Some(RouteUpdate::Extend(points)) => {
                assert!((1..=2).contains(&points.len()), "{} samples at once", points.len());
                total += points.len();
            }
            other => panic!("expected appended samples, got {other:?}"),
        }
    }
    handle.stop().await;
}

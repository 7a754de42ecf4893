use super::{Inbound, LiveLink, SnapshotPublisher, TelemetryFrame, TelemetrySource, decode_inbound};
use crate::flight_control::{
    AutopilotMode, FlightMode, PathTracer, RouteUpdate, TelemetryState, VehicleHealth,
};
use crate::mode_control::{Command, CommandError, PreconditionError};
use crate::util::{GeoPoint, GotoPolicy, SimConfig};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::{net::TcpListener, sync::watch, time::Duration};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};

const HOME: GeoPoint = GeoPoint::new(5.0, 5.0);

fn decode_telemetry(line: &str) -> TelemetryFrame {
    match decode_inbound(line) {
        Ok(Inbound::Telemetry(frame)) => frame,
        other => panic!("expected a telemetry frame, got {other:?}"),
    }
}

async fn wait_for_state(
    rx: &mut watch::Receiver<TelemetryState>,
    pred: impl FnMut(&TelemetryState) -> bool,
) -> bool {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred)).await.is_ok_and(|r| r.is_ok())
}

async fn next_bridge_command<S>(bridge: &mut WebSocketStream<S>) -> serde_json::Value
where S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), bridge.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[test]
fn test_simulated_snapshot_parses_as_live_frame() {
    let state = TelemetryState {
        position: GeoPoint::new(28.364_123, 75.588_456),
        altitude: 12.4,
        heading: 271.5,
        ground_speed: 15.0,
        airspeed: 17.0,
        vertical_speed: -2.0,
        roll: -7.5,
        pitch: -10.0,
        armed: true,
        mode: FlightMode::Rtl,
        health: VehicleHealth::SIMULATED,
    };
    let mut json = serde_json::to_value(TelemetryFrame::from(&state)).unwrap();
    json["type"] = "telemetry".into();
    let line = json.to_string();
    assert!(line.contains("\"relative_alt\":12.4"));
    assert!(line.contains("\"mode\":\"RTL\""));
    assert!(line.contains("\"battery_percentage\":100.0"));
    assert!(line.contains("\"gps_satellites\":15"));

    let parsed = decode_telemetry(&line).apply_to(&TelemetryState::initial(HOME));
    assert!(parsed.position.distance_to(state.position) < 1e-6);
    assert!((parsed.altitude - state.altitude).abs() < 1e-9);
    assert!((parsed.heading - state.heading).abs() < 1e-9);
    assert!((parsed.vertical_speed - state.vertical_speed).abs() < 1e-9);
    assert_eq!((parsed.armed, parsed.mode), (true, FlightMode::Rtl));
    assert_eq!(parsed.health, VehicleHealth::SIMULATED);
}

#[test]
fn test_health_fields_merge_individually() {
    let mut prev = TelemetryState::initial(HOME);
    prev.health = VehicleHealth::SIMULATED;

    let line = r#"{"battery_voltage":11.1,"battery_percentage":42.5,"gps_satellites":7,"gps_fix":false,"gps_fix_type":1}"#;
    let next = decode_telemetry(line).apply_to(&prev);
    assert_eq!(next.health.battery_voltage, 11.1);
    assert_eq!(next.health.battery_percentage, 42.5);
    assert_eq!(next.health.gps_satellites, 7);
    assert!(!next.health.gps_fix);
    assert_eq!(next.health.gps_fix_type, 1);
    assert_eq!(next.health.battery_current, prev.health.battery_current);
    assert_eq!(next.health.gps_hdop, prev.health.gps_hdop);
    assert_eq!(next.position, prev.position);

    assert!(decode_inbound(r#"{"gps_satellites":-3}"#).is_err());
}

#[test]
fn test_publisher_wakes_route_feed_only_on_new_samples() {
    let mut tracer = PathTracer::new(Duration::ZERO);
    let state = TelemetryState::initial(HOME);
    let publisher = SnapshotPublisher::new(state, tracer.view());
    let mut feed = publisher.route();
    assert_eq!(feed.take_update(), Some(RouteUpdate::Replace(Vec::new())));

    tracer.reset(HOME);
    publisher.publish(&state);
    assert!(feed.changed().now_or_never().is_some());
    assert_eq!(feed.take_update(), Some(RouteUpdate::Replace(vec![HOME])));

    for i in 1..=300 {
        let point = GeoPoint::new(5.0 + f64::from(i) * 1e-5, 5.0);
        assert!(tracer.record(point));
        publisher.publish(&state);
        assert_eq!(feed.take_update(), Some(RouteUpdate::Extend(vec![point])));
    }

    // a snapshot without a new sample does not wake the feed
    publisher.publish(&state);
    assert!(feed.changed().now_or_never().is_none());
    assert_eq!(feed.take_update(), None);

    feed.rewind();
    match feed.take_update() {
        Some(RouteUpdate::Replace(points)) => assert_eq!(points.len(), 301),
        other => panic!("expected the whole route, got {other:?}"),
    }
}

#[test]
fn test_partial_frames_merge_into_previous() {
    let mut prev = TelemetryState::initial(HOME);
    prev.heading = 42.0;
    prev.altitude = 3.0;

    let next = decode_telemetry(r#"{"type":"telemetry","armed":true}"#).apply_to(&prev);
    assert_eq!(next.position, HOME);
    assert_eq!(next.altitude, 3.0);
    assert_eq!(next.heading, 42.0);
    assert!(next.armed);

    // no yaw, moved north: heading is inferred
    let moved = decode_telemetry(r#"{"lat":5.001}"#).apply_to(&next);
    assert!(moved.heading.abs() < 1e-6 || (moved.heading - 360.0).abs() < 1e-6);
    assert_eq!(moved.position, GeoPoint::new(5.001, 5.0));

    // tiny jitter keeps the heading
    let jitter = decode_telemetry(r#"{"lon":5.0000001}"#).apply_to(&prev);
    assert_eq!(jitter.heading, 42.0);

    let yawed = decode_telemetry(r#"{"yaw":-90.0,"relative_alt":-0.3}"#).apply_to(&prev);
    assert_eq!(yawed.heading, 270.0);
    assert_eq!(yawed.altitude, 0.0);
}

#[test]
fn test_live_mode_names() {
    let prev = TelemetryState::initial(HOME);
    let frame = |armed: bool, mode: &str| {
        let line = serde_json::json!({ "armed": armed, "mode": mode }).to_string();
        decode_telemetry(&line).apply_to(&prev).mode
    };
    assert_eq!(frame(true, "STABILIZE"), FlightMode::Guided);
    assert_eq!(frame(false, "STABILIZE"), FlightMode::Grounded);
    assert_eq!(frame(true, "rtl"), FlightMode::Rtl);
    assert_eq!(frame(true, "Land"), FlightMode::Land);
    assert_eq!(frame(false, "GUIDED"), FlightMode::Guided);
}

#[test]
fn test_malformed_frames_are_rejected() {
    for line in ["not json", "[1.0, 2.0]", r#"{"lat":"north"}"#, r#"{"type":5}"#, "42"] {
        assert!(decode_inbound(line).is_err(), "{line} was accepted");
    }
    assert_eq!(
        decode_inbound(r#"{"type":"status","message":"Takeoff command successful"}"#).unwrap(),
        Inbound::Status("Takeoff command successful".to_string())
    );
    assert_eq!(decode_inbound(r#"{"type":"heartbeat"}"#).unwrap(), Inbound::Other("heartbeat".to_string()));
}

#[tokio::test]
async fn test_live_link_mirrors_bridge() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config =
        SimConfig { home: HOME, goto_policy: GotoPolicy::RequireAirborne, ..SimConfig::default() };
    let mut link = LiveLink::start(format!("ws://{addr}"), &config);
    let mut telemetry = link.telemetry();

    assert_eq!(
        link.submit(Command::Arm).await,
        Err(CommandError::Precondition(PreconditionError::NotConnected))
    );
    link.submit(Command::SetConnected(true)).await.unwrap();
    let (socket, _) =
        tokio::time::timeout(Duration::from_secs(5), listener.accept()).await.unwrap().unwrap();
    let mut bridge = accept_async(socket).await.unwrap();

    let first = r#"{"type":"telemetry","lat":1.0,"lon":2.0,"relative_alt":0.0,"armed":false,"mode":"STABILIZE","battery_percentage":87.0,"gps_satellites":11}"#;
    bridge.send(Message::text(first.to_owned())).await.unwrap();
    assert!(wait_for_state(&mut telemetry, |t| t.position.lat() == 1.0).await);
    let state = *telemetry.borrow();
    assert_eq!(state.mode, FlightMode::Grounded);
    assert_eq!((state.health.battery_percentage, state.health.gps_satellites), (87.0, 11));

    for text in ["garbage", r#"{"type":"status","message":"hi"}"#, r#"{"lat":1.001}"#] {
        bridge.send(Message::text(text.to_owned())).await.unwrap();
    }
    bridge.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    assert!(wait_for_state(&mut telemetry, |t| t.position.lat() == 1.001).await);
    let state = *telemetry.borrow();
    assert_eq!(state.position.lon(), 2.0);
    assert!(state.heading.abs() < 1e-6 || (state.heading - 360.0).abs() < 1e-6);
    assert_eq!(state.health.battery_percentage, 87.0);

    let ack = link.submit(Command::Arm).await.unwrap();
    assert!(!ack.maneuver_started);
    assert_eq!(next_bridge_command(&mut bridge).await["command"], "arm");

    link.submit(Command::SetMode { mode: AutopilotMode::Loiter }).await.unwrap();
    let forwarded = next_bridge_command(&mut bridge).await;
    assert_eq!(forwarded["command"], "set_mode");
    assert_eq!(forwarded["params"]["mode"], "LOITER");

    assert_eq!(
        link.submit(Command::Goto { position: GeoPoint::new(1.01, 2.0) }).await,
        Err(CommandError::Precondition(PreconditionError::NotAirborne))
    );

    // losing the bridge resets the snapshot
    drop(bridge);
    assert!(wait_for_state(&mut telemetry, |t| *t == TelemetryState::initial(HOME)).await);
    assert_eq!(
        link.submit(Command::Land).await,
        Err(CommandError::Precondition(PreconditionError::NotConnected))
    );

    link.shutdown().await;
    assert_eq!(link.submit(Command::Arm).await, Err(CommandError::LinkUnavailable));
}

use super::telemetry_frame::{Inbound, LinkError, decode_inbound};
use super::telemetry_source::{RouteFeed, SnapshotPublisher, TelemetrySource};
use crate::flight_control::{PathTracer, TelemetryState};
use crate::mode_control::{Command, CommandAck, CommandError, ModeStateMachine};
use crate::util::SimConfig;
use crate::{cmd, error, info, log, warn};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Duration, MissedTickBehavior},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

type CommandReply = oneshot::Sender<Result<CommandAck, CommandError>>;

/// WebSocket session with the bridge. Every text message carries one JSON frame.
struct BridgeConnection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl BridgeConnection {
    async fn open(url: &str) -> Result<Self, LinkError> {
        let (socket, _) = tokio::time::timeout(LiveLink::RECONNECT_INTERVAL, connect_async(url))
            .await
            .map_err(|_| LinkError::ConnectTimeout)??;
        Ok(Self { socket })
    }

    async fn send(&mut self, value: &serde_json::Value) -> Result<(), LinkError> {
        self.socket.send(Message::text(serde_json::to_string(value)?)).await?;
        Ok(())
    }

    /// Next text frame, `None` once the bridge closed the session. Pings are answered by the
    /// socket itself, binary frames are skipped.
    async fn next_text(&mut self) -> Result<Option<String>, LinkError> {
        while let Some(msg) = self.socket.next().await {
            match msg? {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    async fn close(mut self) {
        if let Err(e) = self.socket.close(None).await {
            log!("Closing the bridge session failed: {e}");
        }
    }
}

async fn next_text(conn: &mut Option<BridgeConnection>) -> Result<Option<String>, LinkError> {
    match conn {
        Some(conn) => conn.next_text().await,
        None => std::future::pending().await,
    }
}

/// Encodes an operator command in the message format of the bridge.
///
/// `goto_position` carries the target both as coordinates and as a local north/east/down
/// offset from the current position, holding the current altitude.
fn bridge_command(cmd: Command, state: &TelemetryState) -> serde_json::Value {
    match cmd {
        Command::Takeoff { altitude } => {
            json!({ "command": cmd.to_string(), "params": { "altitude": altitude } })
        }
        Command::Goto { position } => {
            let dist = state.position.distance_to(position);
            let bearing = state.position.bearing_to(position).to_radians();
            json!({
                "command": cmd.to_string(),
                "params": {
                    "lat": position.lat(),
                    "lon": position.lon(),
                    "north": dist * bearing.cos(),
                    "east": dist * bearing.sin(),
                    "down": -state.altitude,
                },
            })
        }
        Command::SetMode { mode } => {
            json!({ "command": cmd.to_string(), "params": { "mode": mode.to_string() } })
        }
        _ => json!({ "command": cmd.to_string() }),
    }
}

/// Live counterpart of the simulator: mirrors telemetry from an external flight controller
/// bridge and forwards operator commands to it.
struct LiveLinkTask {
    url: String,
    telemetry: TelemetryState,
    machine: ModeStateMachine,
    tracer: PathTracer,
    /// The operator asked for a connection, keep reconnecting while set.
    enabled: bool,
}

impl LiveLinkTask {
    fn new(url: String, config: &SimConfig) -> Self {
        Self {
            url,
            telemetry: TelemetryState::initial(config.home),
            machine: ModeStateMachine::new(config),
            tracer: PathTracer::new(config.trace_delay),
            enabled: false,
        }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<(Command, CommandReply)>,
        publisher: SnapshotPublisher,
        c_tok: CancellationToken,
    ) {
        let mut conn: Option<BridgeConnection> = None;
        let mut retry = tokio::time::interval(LiveLink::RECONNECT_INTERVAL);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = c_tok.cancelled() => break,
                Some((cmd, reply)) = cmd_rx.recv() => {
                    let res = self.handle_command(cmd, &mut conn).await;
                    match &res {
                        Ok(ack) => cmd!("{cmd} forwarded, vehicle {ack}."),
                        Err(e) => cmd!("{cmd} rejected: {e}."),
                    }
                    if cmd == Command::SetConnected(true) && conn.is_none() {
                        retry.reset_immediately();
                    }
                    publisher.publish(&self.telemetry);
                    let _ = reply.send(res);
                }
                _ = retry.tick(), if self.enabled && conn.is_none() => {
                    match BridgeConnection::open(&self.url).await {
                        Ok(opened) => {
                            info!("Connected to live bridge at {}.", self.url);
                            conn = Some(opened);
                            self.set_link(true);
                        }
                        Err(e) => warn!("Live bridge at {} unavailable: {e}", self.url),
                    }
                    publisher.publish(&self.telemetry);
                }
                frame = next_text(&mut conn), if conn.is_some() => {
                    match frame {
                        Ok(Some(text)) => self.ingest(&text),
                        Ok(None) => {
                            warn!("Live bridge closed the connection.");
                            conn = None;
                            self.set_link(false);
                            retry.reset();
                        }
                        Err(e) => {
                            warn!("Live bridge connection lost: {e}");
                            conn = None;
                            self.set_link(false);
                            retry.reset();
                        }
                    }
                    publisher.publish(&self.telemetry);
                }
            }
        }

        if let Some(bridge) = conn.take() {
            bridge.close().await;
        }
        self.tracer.halt();
        info!("Live link stopped.");
    }

    /// Mirrors the transport state into the state machine. A lost link resets the snapshot.
    fn set_link(&mut self, up: bool) {
        if self.machine.is_connected() == up {
            return;
        }
        if let Err(e) = self.machine.apply(Command::SetConnected(up), &mut self.telemetry) {
            error!("Link state change rejected: {e}");
        }
        if !up {
            self.tracer.halt();
        }
    }

    fn ingest(&mut self, text: &str) {
        match decode_inbound(text) {
            Ok(Inbound::Telemetry(frame)) => {
                self.telemetry = frame.apply_to(&self.telemetry);
                self.tracer.record(self.telemetry.position);
            }
            Ok(Inbound::Status(message)) => log!("Bridge status: {message}"),
            Ok(Inbound::Other(kind)) => log!("Ignoring bridge frame of type '{kind}'."),
            Err(e) => warn!("Ignoring malformed bridge frame: {e}"),
        }
    }

    async fn handle_command(
        &mut self,
        cmd: Command,
        conn: &mut Option<BridgeConnection>,
    ) -> Result<CommandAck, CommandError> {
        if let Command::SetConnected(enable) = cmd {
            self.enabled = enable;
            if !enable {
                if let Some(bridge) = conn.take() {
                    bridge.close().await;
                }
                self.set_link(false);
            }
            return Ok(self.ack(false));
        }

        self.machine.check(&cmd, &self.telemetry)?;
        let Some(bridge) = conn.as_mut() else {
            return Err(CommandError::LinkUnavailable);
        };
        if let Err(e) = bridge.send(&bridge_command(cmd, &self.telemetry)).await {
            warn!("Forwarding {cmd} failed: {e}");
            *conn = None;
            self.set_link(false);
            return Err(CommandError::LinkUnavailable);
        }

        if cmd.starts_maneuver() {
            self.tracer.reset(self.telemetry.position);
        } else if cmd == Command::Land {
            self.tracer.halt();
        }
        Ok(self.ack(cmd.starts_maneuver()))
    }

    fn ack(&self, maneuver_started: bool) -> CommandAck {
        CommandAck { mode: self.telemetry.mode, armed: self.telemetry.armed, maneuver_started }
    }
}

/// Handle of the live link task.
#[derive(Debug)]
pub struct LiveLink {
    cmd_tx: mpsc::Sender<(Command, CommandReply)>,
    telemetry_rx: watch::Receiver<TelemetryState>,
    route: RouteFeed,
    c_tok: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl LiveLink {
    /// Delay between two connection attempts to the bridge.
    pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(3);
    const CMD_QUEUE_SIZE: usize = 16;

    /// Spawns the link task. No connection is attempted before `SetConnected(true)` arrives.
    ///
    /// # Arguments
    /// * `url` – WebSocket URL of the bridge, e.g. `ws://localhost:8765`.
    /// * `config` – Home position, trace delay and goto policy of the mirrored vehicle.
    pub fn start(url: impl Into<String>, config: &SimConfig) -> Self {
        let task = LiveLinkTask::new(url.into(), config);
        let publisher = SnapshotPublisher::new(task.telemetry, task.tracer.view());
        let (telemetry_rx, route) = (publisher.telemetry(), publisher.route());
        let (cmd_tx, cmd_rx) = mpsc::channel(Self::CMD_QUEUE_SIZE);
        let c_tok = CancellationToken::new();
        let join = tokio::spawn(task.run(cmd_rx, publisher, c_tok.clone()));
        Self { cmd_tx, telemetry_rx, route, c_tok, join: Some(join) }
    }
}

#[async_trait]
impl TelemetrySource for LiveLink {
    fn source_name(&self) -> &'static str { "live link" }

    async fn submit(&self, cmd: Command) -> Result<CommandAck, CommandError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx.send((cmd, reply_tx)).await.map_err(|_| CommandError::LinkUnavailable)?;
        reply_rx.await.map_err(|_| CommandError::LinkUnavailable)?
    }

    fn telemetry(&self) -> watch::Receiver<TelemetryState> { self.telemetry_rx.clone() }

    fn route(&self) -> RouteFeed {
        let mut feed = self.route.clone();
        feed.rewind();
        feed
    }

    async fn shutdown(&mut self) {
        self.c_tok.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!("Live link task failed: {e}");
            }
        }
    }
}

impl Drop for LiveLink {
    fn drop(&mut self) { self.c_tok.cancel(); }
}

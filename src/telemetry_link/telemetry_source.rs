use crate::flight_control::{RouteCursor, RouteUpdate, RouteView, TelemetryState};
use crate::mode_control::{Command, CommandAck, CommandError};
use async_trait::async_trait;
use tokio::sync::watch;

/// Anything that produces vehicle snapshots and accepts operator commands.
///
/// Implemented by the simulation scheduler and by the live link, so the operator side does not
/// care where the telemetry comes from.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Short name for log output.
    fn source_name(&self) -> &'static str;

    /// Submits a command and waits for its outcome.
    async fn submit(&self, cmd: Command) -> Result<CommandAck, CommandError>;

    /// Receiver of the latest vehicle snapshot.
    fn telemetry(&self) -> watch::Receiver<TelemetryState>;

    /// A fresh feed of the route, positioned before its first update.
    fn route(&self) -> RouteFeed;

    /// Stops the source. Pending commands fail afterwards.
    async fn shutdown(&mut self);
}

/// Incremental route updates for one consumer.
///
/// The watch channel only carries the cheap [`RouteCursor`] as a wake-up signal, the points
/// themselves are pulled from the shared [`RouteView`] on demand.
#[derive(Debug, Clone)]
pub struct RouteFeed {
    view: RouteView,
    cursor_rx: watch::Receiver<RouteCursor>,
    seen: Option<RouteCursor>,
}

impl RouteFeed {
    /// Waits until the route changed after the last [`RouteFeed::take_update`].
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.cursor_rx.changed().await
    }

    /// Takes everything not yet handed out by this feed.
    ///
    /// The first call and every call after a trace reset yield [`RouteUpdate::Replace`],
    /// otherwise only the newly appended samples are returned.
    pub fn take_update(&mut self) -> Option<RouteUpdate> {
        self.cursor_rx.borrow_and_update();
        let (cursor, update) = self.view.update_since(self.seen);
        self.seen = Some(cursor);
        update
    }

    /// Forgets what was handed out, the next update replaces the whole route.
    pub fn rewind(&mut self) { self.seen = None; }
}

/// Sending side of the snapshot channels handed out by a [`TelemetrySource`].
#[derive(Debug)]
pub struct SnapshotPublisher {
    telemetry_tx: watch::Sender<TelemetryState>,
    cursor_tx: watch::Sender<RouteCursor>,
    route: RouteView,
}

impl SnapshotPublisher {
    pub fn new(telemetry: TelemetryState, route: RouteView) -> Self {
        Self {
            telemetry_tx: watch::Sender::new(telemetry),
            cursor_tx: watch::Sender::new(route.cursor()),
            route,
        }
    }

    pub fn telemetry(&self) -> watch::Receiver<TelemetryState> { self.telemetry_tx.subscribe() }

    pub fn route(&self) -> RouteFeed {
        RouteFeed { view: self.route.clone(), cursor_rx: self.cursor_tx.subscribe(), seen: None }
    }

    /// Publishes a snapshot. Route subscribers are only woken if the trace moved on.
    pub fn publish(&self, telemetry: &TelemetryState) {
        self.telemetry_tx.send_replace(*telemetry);
        let cursor = self.route.cursor();
        self.cursor_tx.send_if_modified(|current| {
            if *current == cursor {
                false
            } else {
                *current = cursor;
                true
            }
        });
    }
}

use super::sim_context::{SimContext, TickReport};
use crate::flight_control::TelemetryState;
use crate::mode_control::{Command, CommandAck, CommandError};
use crate::telemetry_link::{RouteFeed, SnapshotPublisher, TelemetrySource};
use crate::util::SimConfig;
use crate::{cmd, error, event, info};
use async_trait::async_trait;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

type CommandReply = oneshot::Sender<Result<CommandAck, CommandError>>;

/// Drives a [`SimContext`] at a fixed rate.
///
/// Can be stepped by hand via [`SimulationScheduler::tick`], or moved into its own task with
/// [`SimulationScheduler::start`].
#[derive(Debug)]
pub struct SimulationScheduler {
    ctx: SimContext,
}

impl SimulationScheduler {
    /// Capacity of the command queue in front of the scheduler task.
    const CMD_QUEUE_SIZE: usize = 16;

    pub fn new(config: SimConfig) -> Self { Self { ctx: SimContext::new(config) } }

    #[cfg(test)]
    pub fn context(&self) -> &SimContext { &self.ctx }

    #[cfg(test)]
    pub fn tick(&mut self) -> Option<TickReport> { self.ctx.tick() }

    pub fn apply(&mut self, cmd: Command) -> Result<CommandAck, CommandError> {
        let res = self.ctx.apply(cmd);
        match &res {
            Ok(ack) => cmd!("{cmd} accepted, now {ack}."),
            Err(e) => cmd!("{cmd} rejected: {e}."),
        }
        res
    }

    /// Moves the scheduler into a dedicated tokio task.
    ///
    /// # Returns
    /// * `SchedulerHandle` – Submits commands and hands out the snapshot receivers.
    pub fn start(self) -> SchedulerHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(Self::CMD_QUEUE_SIZE);
        let publisher = SnapshotPublisher::new(*self.ctx.telemetry(), self.ctx.route());
        let (telemetry_rx, route) = (publisher.telemetry(), publisher.route());
        let c_tok = CancellationToken::new();
        let join = tokio::spawn(self.run(cmd_rx, publisher, c_tok.clone()));
        SchedulerHandle { cmd_tx, telemetry_rx, route, c_tok, join: Some(join) }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<(Command, CommandReply)>,
        publisher: SnapshotPublisher,
        c_tok: CancellationToken,
    ) -> Self {
        let mut interval = tokio::time::interval(self.ctx.config().tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Simulation scheduler started at {}.", self.ctx.home());

        loop {
            let connected = self.ctx.is_connected();
            tokio::select! {
                biased;
                () = c_tok.cancelled() => break,
                Some((cmd, reply)) = cmd_rx.recv() => {
                    let res = self.apply(cmd);
                    if !connected && self.ctx.is_connected() {
                        interval.reset();
                    }
                    publisher.publish(self.ctx.telemetry());
                    // the submitter may have given up waiting
                    let _ = reply.send(res);
                }
                _ = interval.tick(), if connected => {
                    if let Some(report) = self.ctx.tick() {
                        if let Some(transition) = report.transition {
                            let cause =
                                if report.events.position_arrived { "position" } else { "altitude" };
                            event!("Mode transition {transition} on {cause} arrival.");
                        }
                        publisher.publish(self.ctx.telemetry());
                    }
                }
            }
        }

        self.ctx.halt_trace();
        info!("Simulation scheduler stopped.");
        self
    }
}

/// Control handle of a started [`SimulationScheduler`].
#[derive(Debug)]
pub struct SchedulerHandle {
    cmd_tx: mpsc::Sender<(Command, CommandReply)>,
    telemetry_rx: watch::Receiver<TelemetryState>,
    route: RouteFeed,
    c_tok: CancellationToken,
    join: Option<JoinHandle<SimulationScheduler>>,
}

impl SchedulerHandle {
    /// Queues `cmd` and waits until it was applied or rejected between two ticks.
    pub async fn submit(&self, cmd: Command) -> Result<CommandAck, CommandError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx.send((cmd, reply_tx)).await.map_err(|_| CommandError::SchedulerStopped)?;
        reply_rx.await.map_err(|_| CommandError::SchedulerStopped)?
    }

    pub fn telemetry(&self) -> watch::Receiver<TelemetryState> { self.telemetry_rx.clone() }

    /// A fresh route feed, see [`TelemetrySource::route`].
    pub fn route(&self) -> RouteFeed {
        let mut feed = self.route.clone();
        feed.rewind();
        feed
    }

    /// Stops the tick loop and returns the scheduler with its final state.
    ///
    /// # Returns
    /// * `Option<SimulationScheduler>` – `None` if it was already stopped or its task panicked.
    pub async fn stop(&mut self) -> Option<SimulationScheduler> {
        self.c_tok.cancel();
        let join = self.join.take()?;
        match join.await {
            Ok(scheduler) => Some(scheduler),
            Err(e) => {
                error!("Simulation scheduler task failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl TelemetrySource for SchedulerHandle {
    fn source_name(&self) -> &'static str { "simulator" }

    async fn submit(&self, cmd: Command) -> Result<CommandAck, CommandError> {
        SchedulerHandle::submit(self, cmd).await
    }

    fn telemetry(&self) -> watch::Receiver<TelemetryState> { SchedulerHandle::telemetry(self) }

    fn route(&self) -> RouteFeed { SchedulerHandle::route(self) }

    async fn shutdown(&mut self) { self.stop().await; }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) { self.c_tok.cancel(); }
}

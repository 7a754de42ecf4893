use super::operator_endpoint::{OperatorEndpoint, OperatorEvent};
use super::operator_messages::{DownstreamFrame, UpstreamMessage};
use crate::mode_control::Command;
use crate::telemetry_link::TelemetrySource;
use crate::{error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Connects an [`OperatorEndpoint`] to a [`TelemetrySource`].
///
/// Snapshots and route changes flow down to the operators, commands flow up to the source and
/// every outcome is answered with a status frame.
pub struct OperatorRelay {
    source: Arc<dyn TelemetrySource>,
    c_tok: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl OperatorRelay {
    pub fn start(endpoint: Arc<OperatorEndpoint>, source: Box<dyn TelemetrySource>) -> Self {
        let source: Arc<dyn TelemetrySource> = Arc::from(source);
        let c_tok = CancellationToken::new();
        let downlink = tokio::spawn(Self::run_downlink(
            Arc::clone(&endpoint),
            Arc::clone(&source),
            c_tok.clone(),
        ));
        let uplink = tokio::spawn(Self::run_uplink(endpoint, Arc::clone(&source), c_tok.clone()));
        info!("Relaying the {} to operators.", source.source_name());
        Self { source, c_tok, tasks: vec![downlink, uplink] }
    }

    async fn run_downlink(
        endpoint: Arc<OperatorEndpoint>,
        source: Arc<dyn TelemetrySource>,
        c_tok: CancellationToken,
    ) {
        let mut telemetry = source.telemetry();
        let mut route = source.route();
        let mut events = endpoint.subscribe();
        loop {
            tokio::select! {
                () = c_tok.cancelled() => break,
                event = events.recv() => match event {
                    // greets a new operator, every operator gets the whole route again
                    Ok(OperatorEvent::Connected(_)) => {
                        let snapshot = *telemetry.borrow();
                        endpoint.send_downstream(&DownstreamFrame::telemetry(&snapshot));
                        route.rewind();
                        if let Some(update) = route.take_update() {
                            endpoint.send_downstream(&DownstreamFrame::route_update(&update));
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
                changed = telemetry.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let frame = DownstreamFrame::telemetry(&telemetry.borrow_and_update());
                    if endpoint.is_operator_connected() {
                        endpoint.send_downstream(&frame);
                    }
                }
                changed = route.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let Some(update) = route.take_update() else { continue };
                    if endpoint.is_operator_connected() {
                        endpoint.send_downstream(&DownstreamFrame::route_update(&update));
                    }
                }
            }
        }
    }

    async fn run_uplink(
        endpoint: Arc<OperatorEndpoint>,
        source: Arc<dyn TelemetrySource>,
        c_tok: CancellationToken,
    ) {
        let mut events = endpoint.subscribe();
        loop {
            let event = tokio::select! {
                () = c_tok.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(OperatorEvent::Message(message)) => {
                    let status = Self::execute(source.as_ref(), message).await;
                    endpoint.send_downstream(&DownstreamFrame::status(status));
                }
                Ok(OperatorEvent::Malformed(reason)) => {
                    warn!("Malformed operator message: {reason}");
                    endpoint.send_downstream(&DownstreamFrame::status(format!(
                        "malformed message: {reason}"
                    )));
                }
                Ok(OperatorEvent::Connected(peer)) => info!("Operator {peer} connected."),
                Ok(OperatorEvent::Disconnected(peer)) => info!("Operator {peer} disconnected."),
                Err(RecvError::Lagged(n)) => warn!("Operator relay skipped {n} events."),
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Parses and submits one operator message.
    ///
    /// # Returns
    /// * `String` – Human readable outcome for the status frame.
    async fn execute(source: &dyn TelemetrySource, message: UpstreamMessage) -> String {
        let name = message.command.clone();
        let cmd = match Command::try_from(message) {
            Ok(cmd) => cmd,
            Err(e) => return format!("{name} rejected: {e}"),
        };
        match source.submit(cmd).await {
            Ok(ack) => format!("{cmd} accepted: {ack}"),
            Err(e) => format!("{cmd} rejected: {e}"),
        }
    }

    /// Stops relaying and shuts the telemetry source down.
    pub async fn stop(mut self) {
        self.c_tok.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Operator relay task failed: {e}");
            }
        }
        match Arc::get_mut(&mut self.source) {
            Some(source) => source.shutdown().await,
            None => warn!("Telemetry source still shared, leaving it running."),
        }
    }
}

use super::operator_messages::{DownstreamFrame, UpstreamMessage};
use crate::{error, warn};
use futures::StreamExt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{broadcast, oneshot};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

#[derive(Debug, Clone)]
pub enum OperatorEvent {
    Connected(SocketAddr),
    Disconnected(SocketAddr),
    Message(UpstreamMessage),
    /// A line that could not be read as a command, with the reason.
    Malformed(String),
}

/// TCP endpoint for operator consoles speaking newline-delimited JSON.
///
/// Every downstream frame is broadcast to all connected operators.
#[derive(Debug)]
pub struct OperatorEndpoint {
    downstream_sender: broadcast::Sender<Option<Arc<str>>>,
    upstream_event_sender: broadcast::Sender<OperatorEvent>,
    close_oneshot_sender: Option<oneshot::Sender<()>>,
    local_addr: SocketAddr,
}

impl OperatorEndpoint {
    const CHANNEL_CAPACITY: usize = 64;
    /// Longest accepted upstream line in bytes. A longer line closes the connection.
    pub const MAX_LINE_LENGTH: usize = 16 * 1024;

    async fn handle_connection_rx(
        lines: &mut FramedRead<OwnedReadHalf, LinesCodec>,
        upstream_event_sender: &broadcast::Sender<OperatorEvent>,
    ) -> Result<(), LinesCodecError> {
        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event = match serde_json::from_str::<UpstreamMessage>(&line) {
                Ok(message) => OperatorEvent::Message(message),
                Err(e) => OperatorEvent::Malformed(e.to_string()),
            };
            let _ = upstream_event_sender.send(event);
        }
        Ok(())
    }

    async fn handle_connection_tx(
        socket: &mut OwnedWriteHalf,
        downstream_receiver: &mut broadcast::Receiver<Option<Arc<str>>>,
    ) -> Result<(), LinesCodecError> {
        loop {
            match downstream_receiver.recv().await {
                Ok(Some(line)) => socket.write_all(line.as_bytes()).await?,
                Ok(None) | Err(broadcast::error::RecvError::Closed) => return Ok(()),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Operator connection lagging, dropped {n} frames.");
                }
            }
        }
    }

    /// Binds the endpoint and starts accepting operator connections.
    ///
    /// # Arguments
    /// * `addr` – Listen address, port `0` picks a free port.
    ///
    /// # Returns
    /// * `io::Result<Self>` – The running endpoint, or the bind error.
    pub async fn start(addr: impl ToSocketAddrs) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let downstream_sender = broadcast::Sender::new(Self::CHANNEL_CAPACITY);
        let upstream_event_sender = broadcast::Sender::new(Self::CHANNEL_CAPACITY);
        let (close_oneshot_sender, mut close_oneshot_receiver) = oneshot::channel::<()>();
        let inst = Self {
            downstream_sender: downstream_sender.clone(),
            upstream_event_sender: upstream_event_sender.clone(),
            close_oneshot_sender: Some(close_oneshot_sender),
            local_addr,
        };

        tokio::spawn(async move {
            loop {
                let accept = tokio::select! {
                    accept = listener.accept() => accept,
                    _ = &mut close_oneshot_receiver => break,
                };

                let (socket, peer) = match accept {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Operator endpoint stopped accepting: {e}");
                        break;
                    }
                };
                // subscribe first so the greeting snapshot reaches the new operator
                let mut downstream_receiver = downstream_sender.subscribe();
                let _ = upstream_event_sender.send(OperatorEvent::Connected(peer));
                let upstream_event_sender_local = upstream_event_sender.clone();

                tokio::spawn(async move {
                    let (rx_socket, mut tx_socket) = socket.into_split();
                    let mut lines = FramedRead::new(
                        rx_socket,
                        LinesCodec::new_with_max_length(OperatorEndpoint::MAX_LINE_LENGTH),
                    );

                    let result = tokio::select! {
                        res = OperatorEndpoint::handle_connection_tx(&mut tx_socket, &mut downstream_receiver) => res,
                        res = OperatorEndpoint::handle_connection_rx(&mut lines, &upstream_event_sender_local) => res,
                    };

                    let _ = upstream_event_sender_local.send(OperatorEvent::Disconnected(peer));
                    match result {
                        Err(LinesCodecError::Io(e))
                            if e.kind() == ErrorKind::UnexpectedEof
                                || e.kind() == ErrorKind::ConnectionReset
                                || e.kind() == ErrorKind::ConnectionAborted
                                || e.kind() == ErrorKind::BrokenPipe =>
                        {
                            return;
                        }
                        Err(LinesCodecError::MaxLineLengthExceeded) => {
                            warn!("Closing operator connection {peer}, line too long.");
                            let reason = format!(
                                "malformed message: line exceeds {} bytes",
                                OperatorEndpoint::MAX_LINE_LENGTH
                            );
                            if let Ok(line) = DownstreamFrame::status(reason).encode_line() {
                                let _ = tx_socket.write_all(line.as_bytes()).await;
                            }
                        }
                        Err(e) => warn!("Closing operator connection {peer} due to {e}"),
                        Ok(()) => {}
                    }
                    let _ = tx_socket.shutdown().await;
                });
            }
        });
        Ok(inst)
    }

    pub fn local_addr(&self) -> SocketAddr { self.local_addr }

    /// Broadcasts `frame` to every connected operator.
    pub fn send_downstream(&self, frame: &DownstreamFrame) {
        match frame.encode_line() {
            Ok(line) => {
                let _ = self.downstream_sender.send(Some(Arc::from(line)));
            }
            Err(e) => error!("Failed to encode downstream frame: {e}"),
        }
    }

    pub fn is_operator_connected(&self) -> bool { self.downstream_sender.receiver_count() > 0 }

    pub fn subscribe(&self) -> broadcast::Receiver<OperatorEvent> {
        self.upstream_event_sender.subscribe()
    }
}

impl Drop for OperatorEndpoint {
    fn drop(&mut self) {
        if let Some(close) = self.close_oneshot_sender.take() {
            let _ = close.send(());
        }
        let _ = self.downstream_sender.send(None);
    }
}

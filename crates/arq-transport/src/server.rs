use std::net::SocketAddr;
use std::sync::Arc;

use arq_abstract::{Content, Packet, PacketType};
use arq_core::{ReceiverWindow, WindowState};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::endpoint::EndpointConfig;
use crate::error::TransportError;
use crate::node::{Node, NodeStats};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ServerSummary {
    pub node: NodeStats,
    pub accepted: u64,
    pub rejected: u64,
    pub acks_sent: u64,
    pub naks_sent: u64,
    pub window_start: u32,
    pub expected_number: u32,
}

/// Receiving endpoint: a [`Node`] feeding one [`ReceiverWindow`].
pub struct Server;

impl Server {
    /// Bind the node, start the receiver window and spawn the endpoint task.
    pub async fn spawn(config: EndpointConfig) -> Result<ServerHandle, TransportError> {
        let node = Arc::new(Node::bind(config.bind, config.channel).await?);
        let local_addr = node.local_addr();

        let (control_tx, control_rx) = mpsc::unbounded_channel::<Packet>();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel::<Content>();
        let sink = move |packet: Packet| {
            let _ = control_tx.send(packet);
        };
        let output = move |packet: Packet| {
            let _ = delivery_tx.send(packet.into_content());
        };
        let window = ReceiverWindow::new(config.window, sink, output)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(serve(
            Arc::clone(&node),
            window,
            config.peer,
            control_rx,
            shutdown_rx,
        ));

        info!(
            "Server listening on {} (window {}, sequence {}, {:?})",
            local_addr,
            config.window.window_length(),
            config.window.sequence_length(),
            config.window.mode()
        );

        Ok(ServerHandle {
            local_addr,
            node,
            deliveries: delivery_rx,
            shutdown: shutdown_tx,
            task,
        })
    }
}

pub struct ServerHandle {
    local_addr: SocketAddr,
    node: Arc<Node>,
    deliveries: mpsc::UnboundedReceiver<Content>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<ServerSummary, TransportError>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Next content delivered in order to the application; `None` once the
    /// endpoint has stopped.
    pub async fn next_delivery(&mut self) -> Option<Content> {
        self.deliveries.recv().await
    }

    /// Content already delivered and not yet taken.
    pub fn try_next_delivery(&mut self) -> Option<Content> {
        self.deliveries.try_recv().ok()
    }

    pub async fn shutdown(self) -> Result<ServerSummary, TransportError> {
        let _ = self.shutdown.send(true);
        self.task.await?
    }
}

async fn serve(
    node: Arc<Node>,
    window: ReceiverWindow,
    peer: Option<SocketAddr>,
    control: mpsc::UnboundedReceiver<Packet>,
    shutdown: watch::Receiver<bool>,
) -> Result<ServerSummary, TransportError> {
    let result = pump(&node, &window, peer, control, shutdown).await;

    let state: WindowState = window.state();
    // Joining the drain thread blocks
    if let Err(err) = tokio::task::spawn_blocking(move || window.shutdown()).await {
        error!("Receiver window on {} failed to stop: {}", node.local_addr(), err);
    }

    let mut summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            warn!("Server on {} failed: {}", node.local_addr(), err);
            return Err(err);
        }
    };
    summary.window_start = state.window_start;
    summary.expected_number = state.expected_number;
    summary.node = node.stats();
    info!("Server on {} stopped", node.local_addr());
    Ok(summary)
}

async fn pump(
    node: &Node,
    window: &ReceiverWindow,
    mut peer: Option<SocketAddr>,
    mut control: mpsc::UnboundedReceiver<Packet>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ServerSummary, TransportError> {
    let fixed_peer = peer.is_some();
    let mut summary = ServerSummary::default();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            Some(packet) = control.recv() => {
                let Some(dest) = peer else {
                    warn!("No peer known yet, discarding {}", packet);
                    continue;
                };
                match packet.kind() {
                    PacketType::Ack => summary.acks_sent += 1,
                    _ => summary.naks_sent += 1,
                }
                node.send(&packet, dest).await?;
            }
            received = node.recv() => {
                let (packet, source) = received?;
                if !packet.is_data() {
                    debug!("Server ignoring control frame {}", packet);
                    continue;
                }
                if !fixed_peer {
                    peer = Some(source);
                }
                if window.receive(packet) {
                    summary.accepted += 1;
                } else {
                    summary.rejected += 1;
                }
            }
        }
    }
    Ok(summary)
}

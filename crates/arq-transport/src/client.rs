use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arq_abstract::{ArqMode, Content, Packet, PacketType};
use arq_core::SenderWindow;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use crate::endpoint::EndpointConfig;
use crate::error::TransportError;
use crate::node::{Node, NodeStats};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ClientSummary {
    pub node: NodeStats,
    pub frames_sent: u64,
    pub retransmissions: u64,
    pub acknowledged: u64,
    pub acks_received: u64,
    pub naks_received: u64,
    pub timeouts: u64,
}

pub struct Client;

impl Client {
    pub async fn spawn(config: EndpointConfig) -> Result<ClientHandle, TransportError> {
        let peer = config.peer.ok_or(TransportError::MissingPeer)?;
        let window = config.window;
        if window.mode() == ArqMode::SelectiveRepeat
            && window.sequence_length() < 2 * window.window_length()
        {
            warn!(
                "Selective repeat with sequence {} < 2 x window {}: stale retransmissions can alias new frames",
                window.sequence_length(),
                window.window_length()
            );
        }

        let node = Arc::new(Node::bind(config.bind, config.channel).await?);
        let local_addr = node.local_addr();

        let (submit_tx, submit_rx) = mpsc::channel(window.window_length() as usize);
        let (acked_tx, acked_rx) = watch::channel(0u64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(
            Driver {
                node: Arc::clone(&node),
                peer,
                window: SenderWindow::new(window),
                retransmit_timeout: config.retransmit_timeout(),
                summary: ClientSummary::default(),
            }
            .run(submit_rx, acked_tx, shutdown_rx),
        );

        info!(
            "Client on {} sending to {} (window {}, sequence {}, {:?})",
            local_addr,
            peer,
            window.window_length(),
            window.sequence_length(),
            window.mode()
        );

        Ok(ClientHandle {
            local_addr,
            node,
            submit: submit_tx,
            submitted: AtomicU64::new(0),
            acked: acked_rx,
            shutdown: shutdown_tx,
            task: Some(task),
        })
    }
}

/// Handle to a running sender. New content is only pulled from the
/// submission queue while the window has room, so a full window pushes back
/// on [`ClientHandle::send`].
pub struct ClientHandle {
    local_addr: SocketAddr,
    node: Arc<Node>,
    submit: mpsc::Sender<Content>,
    submitted: AtomicU64,
    acked: watch::Receiver<u64>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<Result<ClientSummary, TransportError>>>,
}

impl ClientHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Submit content for reliable delivery. Waits while the window and the
    /// submission queue are full.
    ///
    /// Content that cannot go out as a single datagram is refused here and
    /// never reaches the window.
    pub async fn send(&mut self, content: Content) -> Result<(), TransportError> {
        Node::encode_frame(&Packet::new(0, content.clone()))?;
        if self.submit.send(content).await.is_err() {
            return Err(self.stopped().await);
        }
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Wait until everything submitted so far has been acknowledged. If the
    /// endpoint task has stopped, returns the error that stopped it.
    pub async fn wait_idle(&mut self, limit: Duration) -> Result<(), TransportError> {
        let target = self.submitted.load(Ordering::SeqCst);
        let mut acked = self.acked.clone();
        match timeout(limit, acked.wait_for(|n| *n >= target)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(self.stopped().await),
            Err(_) => Err(TransportError::Timeout(limit)),
        }
    }

    pub fn acknowledged(&self) -> u64 {
        *self.acked.borrow()
    }

    pub async fn shutdown(mut self) -> Result<ClientSummary, TransportError> {
        let _ = self.shutdown.send(true);
        match self.task.take() {
            Some(task) => task.await?,
            None => Err(TransportError::Closed),
        }
    }

    /// Join a task that has already exited and take its failure.
    async fn stopped(&mut self) -> TransportError {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(Err(err)) => err,
                Ok(Ok(_)) => TransportError::Closed,
                Err(err) => TransportError::Join(err),
            },
            None => TransportError::Closed,
        }
    }
}

struct Driver {
    node: Arc<Node>,
    peer: SocketAddr,
    window: SenderWindow,
    retransmit_timeout: Duration,
    summary: ClientSummary,
}

impl Driver {
    async fn run(
        mut self,
        mut submissions: mpsc::Receiver<Content>,
        acked: watch::Sender<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ClientSummary, TransportError> {
        let node = Arc::clone(&self.node);
        let mut deadline = Instant::now() + self.retransmit_timeout;
        let mut accepting = true;

        loop {
            let acked_before = self.window.acked_total();
            let was_empty = self.window.in_flight() == 0;

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                received = node.recv() => {
                    let (packet, _) = received?;
                    self.on_control(&packet).await?;
                }
                _ = sleep_until(deadline), if self.window.in_flight() > 0 => {
                    self.summary.timeouts += 1;
                    debug!("Retransmit timer expired with base #{}", self.window.base());
                    let frames = self.window.on_timeout();
                    self.transmit(frames).await?;
                    deadline = Instant::now() + self.retransmit_timeout;
                }
                submitted = submissions.recv(), if accepting && self.window.has_capacity() => {
                    match submitted {
                        Some(content) => {
                            let frames = self.window.offer(content);
                            self.transmit(frames).await?;
                        }
                        None => accepting = false,
                    }
                }
            }

            // Restart the timer on progress or when the first frame goes out
            let started = was_empty && self.window.in_flight() > 0;
            if self.window.acked_total() > acked_before || started {
                deadline = Instant::now() + self.retransmit_timeout;
            }
            acked.send_replace(self.window.acked_total());
        }

        self.summary.node = self.node.stats();
        self.summary.retransmissions = self.window.retransmissions();
        self.summary.acknowledged = self.window.acked_total();
        info!(
            "Client on {} stopped ({} acknowledged, {} retransmissions)",
            self.node.local_addr(),
            self.summary.acknowledged,
            self.summary.retransmissions
        );
        Ok(self.summary)
    }

    async fn on_control(&mut self, packet: &Packet) -> Result<(), TransportError> {
        match packet.kind() {
            PacketType::Ack => self.summary.acks_received += 1,
            PacketType::NakGoBackN | PacketType::NakSelectiveRepeat => {
                self.summary.naks_received += 1
            }
            PacketType::String | PacketType::FileInfo => {
                debug!("Client ignoring data frame {}", packet);
                return Ok(());
            }
        }
        let frames = self.window.on_control(packet);
        self.transmit(frames).await
    }

    async fn transmit(&mut self, frames: Vec<Packet>) -> Result<(), TransportError> {
        for frame in &frames {
            if let Err(err) = self.node.send(frame, self.peer).await {
                warn!("Client failed to send {}: {}", frame, err);
                return Err(err);
            }
            self.summary.frames_sent += 1;
        }
        Ok(())
    }
}

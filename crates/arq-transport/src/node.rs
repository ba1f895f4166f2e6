use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use arq_abstract::{ChannelConfig, Packet, PacketType};
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::TransportError;

const MAX_DATAGRAM: usize = 65_535;

/// Largest UDP payload over IPv4 (65535 minus IP and UDP headers).
pub const MAX_PAYLOAD: usize = 65_507;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
    pub malformed: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
}

struct FaultInjector {
    rng: StdRng,
    drop_rate: f64,
    // Deterministic faults: drop the first inbound frame matching the number
    drop_data_once: Vec<u32>,
    drop_ack_once: Vec<u32>,
}

impl FaultInjector {
    fn new(channel: ChannelConfig) -> Self {
        let rng = match channel.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            drop_rate: channel.drop_rate,
            drop_data_once: Vec::new(),
            drop_ack_once: Vec::new(),
        }
    }

    fn should_drop(&mut self, packet: &Packet) -> bool {
        if let Some(number) = packet.number() {
            let once = match packet.kind() {
                kind if kind.is_data() => &mut self.drop_data_once,
                PacketType::Ack => &mut self.drop_ack_once,
                _ => return self.random_drop(),
            };
            if let Some(pos) = once.iter().position(|n| *n == number) {
                once.remove(pos);
                debug!("Deterministically dropping {}", packet);
                return true;
            }
        }
        self.random_drop()
    }

    fn random_drop(&mut self) -> bool {
        self.drop_rate > 0.0 && self.rng.random::<f64>() < self.drop_rate
    }
}

/// UDP socket carrying [`Packet`]s. Loss is applied on receipt, after
/// decoding and before the frame reaches any window.
pub struct Node {
    socket: UdpSocket,
    local_addr: SocketAddr,
    faults: Mutex<FaultInjector>,
    counters: Counters,
    recv_buf: tokio::sync::Mutex<Vec<u8>>,
}

impl Node {
    /// Bind to `addr`; port 0 lets the OS pick one.
    pub async fn bind(addr: SocketAddr, channel: ChannelConfig) -> Result<Self, TransportError> {
        channel.validate()?;
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        debug!(
            "Node bound on {} (drop rate {:.2})",
            local_addr, channel.drop_rate
        );
        Ok(Self {
            socket,
            local_addr,
            faults: Mutex::new(FaultInjector::new(channel)),
            counters: Counters::default(),
            recv_buf: tokio::sync::Mutex::new(vec![0u8; MAX_DATAGRAM]),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Drop the next inbound data frame carrying `number`.
    pub fn drop_next_data(&self, number: u32) {
        self.faults().drop_data_once.push(number);
    }

    /// Drop the next inbound ACK carrying `number`.
    pub fn drop_next_ack(&self, number: u32) {
        self.faults().drop_ack_once.push(number);
    }

    /// Encode `packet`, failing if it cannot fit in one datagram.
    pub fn encode_frame(packet: &Packet) -> Result<Bytes, TransportError> {
        let bytes = packet.encode()?;
        if bytes.len() > MAX_PAYLOAD {
            return Err(TransportError::FrameTooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub async fn send(&self, packet: &Packet, dest: SocketAddr) -> Result<(), TransportError> {
        let bytes = Self::encode_frame(packet)?;
        self.socket.send_to(&bytes, dest).await?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        debug!("[{} -> {}] {}", self.local_addr, dest, packet);
        Ok(())
    }

    /// Wait for the next frame that survives decoding and fault injection.
    ///
    /// Cancel safe: nothing is lost if the future is dropped between
    /// datagrams.
    pub async fn recv(&self) -> Result<(Packet, SocketAddr), TransportError> {
        let mut buf = self.recv_buf.lock().await;
        loop {
            let (len, source) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                // ICMP unreachable from an earlier send, reported on some platforms
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused
                    ) =>
                {
                    debug!("Ignoring {} on {}", err, self.local_addr);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            self.counters.received.fetch_add(1, Ordering::Relaxed);

            let packet = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(err) => {
                    self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                    warn!("Discarding malformed datagram from {}: {}", source, err);
                    continue;
                }
            };

            if self.faults().should_drop(&packet) {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("[{} -> {}] DROP {}", source, self.local_addr, packet);
                continue;
            }
            return Ok((packet, source));
        }
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
        }
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, FaultInjector> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

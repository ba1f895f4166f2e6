use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use arq_abstract::{ChannelConfig, SessionConfig, WindowConfig};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub const DEFAULT_CLIENT_PORT: u16 = 50000;
pub const DEFAULT_SERVER_PORT: u16 = 50001;

/// Settings for one endpoint of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub bind: SocketAddr,
    /// Where frames are sent. A server without a peer answers whoever sent
    /// the latest data frame.
    pub peer: Option<SocketAddr>,
    pub window: WindowConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default = "default_timeout_ms")]
    pub retransmit_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    200
}

impl EndpointConfig {
    pub fn new(bind: SocketAddr, window: WindowConfig) -> Self {
        Self {
            bind,
            peer: None,
            window,
            channel: ChannelConfig::default(),
            retransmit_timeout_ms: default_timeout_ms(),
        }
    }

    /// Loopback endpoint on an OS-assigned port.
    pub fn loopback(session: &SessionConfig) -> Result<Self, TransportError> {
        let bind = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        Ok(Self {
            bind,
            peer: None,
            window: session.window()?,
            channel: session.channel()?,
            retransmit_timeout_ms: session.retransmit_timeout_ms,
        })
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.retransmit_timeout_ms)
    }
}

use arq_abstract::{ChannelConfig, Content, WindowConfig};
use serde::Serialize;

use crate::client::ClientSummary;
use crate::server::ServerSummary;

/// Outcome of one sender/receiver session, written as JSON by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub window: WindowConfig,
    pub channel: ChannelConfig,
    pub duration_ms: u64,
    pub submitted: Vec<Content>,
    pub delivered: Vec<Content>,
    pub client: ClientSummary,
    pub server: ServerSummary,
}

impl SessionReport {
    /// Everything submitted arrived exactly once, in submission order.
    pub fn delivered_in_order(&self) -> bool {
        self.delivered == self.submitted
    }

    pub fn frames_sent(&self) -> u64 {
        self.client.frames_sent
    }

    pub fn datagrams_dropped(&self) -> u64 {
        self.client.node.dropped + self.server.node.dropped
    }
}

use std::time::{Duration, Instant};

use arq_abstract::{Content, SessionConfig};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::client::{Client, ClientHandle};
use crate::endpoint::EndpointConfig;
use crate::error::TransportError;
use crate::report::SessionReport;
use crate::server::{Server, ServerHandle};

/// Grace period for buffered frames to leave the receiver after the last ACK.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Client/server pair on loopback, used by the demo and the scenario runner.
pub struct LoopbackSession {
    config: SessionConfig,
    server: ServerHandle,
    client: ClientHandle,
}

impl LoopbackSession {
    pub async fn start(config: SessionConfig) -> Result<Self, TransportError> {
        let server = Server::spawn(EndpointConfig::loopback(&config)?).await?;

        // Distinct seed so both directions do not lose the same positions
        let mut client_channel = config.channel()?;
        client_channel.seed = client_channel.seed.map(|seed| seed.wrapping_add(1));
        let client_config = EndpointConfig::loopback(&config)?
            .with_peer(server.local_addr())
            .with_channel(client_channel);
        let client = Client::spawn(client_config).await?;

        Ok(Self {
            config,
            server,
            client,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    /// Submit `outgoing`, wait for every frame to be acknowledged within
    /// `limit`, then stop both endpoints.
    pub async fn run(
        mut self,
        outgoing: Vec<Content>,
        limit: Duration,
    ) -> Result<SessionReport, TransportError> {
        let started = Instant::now();
        for content in &outgoing {
            self.client.send(content.clone()).await?;
        }
        self.client.wait_idle(limit).await?;

        let mut delivered = Vec::with_capacity(outgoing.len());
        while delivered.len() < outgoing.len() {
            match timeout(DRAIN_GRACE, self.server.next_delivery()).await {
                Ok(Some(content)) => delivered.push(content),
                _ => {
                    warn!(
                        "Only {} of {} items delivered",
                        delivered.len(),
                        outgoing.len()
                    );
                    break;
                }
            }
        }
        while let Some(extra) = self.server.try_next_delivery() {
            delivered.push(extra);
        }
        let duration_ms = started.elapsed().as_millis() as u64;

        let client = self.client.shutdown().await?;
        let server = self.server.shutdown().await?;
        info!(
            "Session finished in {} ms: {} delivered, {} frames sent",
            duration_ms,
            delivered.len(),
            client.frames_sent
        );

        Ok(SessionReport {
            window: self.config.window()?,
            channel: self.config.channel()?,
            duration_ms,
            submitted: outgoing,
            delivered,
            client,
            server,
        })
    }
}

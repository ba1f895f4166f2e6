pub mod client;
pub mod endpoint;
pub mod error;
pub mod node;
pub mod report;
pub mod server;
pub mod session;

pub use client::{Client, ClientHandle, ClientSummary};
pub use endpoint::{DEFAULT_CLIENT_PORT, DEFAULT_SERVER_PORT, EndpointConfig};
pub use error::TransportError;
pub use node::{MAX_PAYLOAD, Node, NodeStats};
pub use report::SessionReport;
pub use server::{Server, ServerHandle, ServerSummary};
pub use session::LoopbackSession;

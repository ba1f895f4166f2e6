pub mod config;
pub mod error;
pub mod interface;
pub mod packet;
pub mod scenario;
pub mod sequence;

pub use interface::{PacketOutput, PacketSink};
pub use packet::{Content, Packet, PacketType};
// Re-export tags so callers can match on raw type bytes
pub use packet::tags;

pub use config::{ArqMode, ChannelConfig, MAX_WINDOW_LENGTH, SessionConfig, WindowConfig};
pub use error::{ConfigError, DecodeError, EncodeError};
pub use scenario::{SessionConfigOverride, TestAction, TestAssertion, TestScenario};
pub use sequence::SequenceSpace;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sequence::SequenceSpace;

/// Largest window a receiver will allocate slots for.
pub const MAX_WINDOW_LENGTH: u32 = 1 << 16;

/// Retransmission discipline of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArqMode {
    #[default]
    GoBackN,
    SelectiveRepeat,
}

/// Window geometry shared by a sender and its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindowConfig")]
pub struct WindowConfig {
    window_length: u32,
    sequence_length: u32,
    mode: ArqMode,
}

#[derive(Deserialize)]
struct RawWindowConfig {
    window_length: u32,
    sequence_length: u32,
    #[serde(default)]
    mode: ArqMode,
}

impl TryFrom<RawWindowConfig> for WindowConfig {
    type Error = ConfigError;

    fn try_from(raw: RawWindowConfig) -> Result<Self, Self::Error> {
        WindowConfig::new(raw.window_length, raw.sequence_length, raw.mode)
    }
}

impl WindowConfig {
    /// Rejects `sequence_length <= window_length`: with fewer numbers than
    /// window slots + 1, a retransmitted old frame aliases a new one.
    pub fn new(
        window_length: u32,
        sequence_length: u32,
        mode: ArqMode,
    ) -> Result<Self, ConfigError> {
        if window_length == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if window_length > MAX_WINDOW_LENGTH {
            return Err(ConfigError::WindowTooLong(window_length));
        }
        if sequence_length <= window_length {
            return Err(ConfigError::SequenceTooShort {
                window_length,
                sequence_length,
            });
        }
        if i32::try_from(sequence_length).is_err() {
            return Err(ConfigError::SequenceTooLong(sequence_length));
        }
        Ok(Self {
            window_length,
            sequence_length,
            mode,
        })
    }

    /// Window of one with alternating numbers 0/1.
    pub fn stop_and_wait() -> Self {
        Self {
            window_length: 1,
            sequence_length: 2,
            mode: ArqMode::GoBackN,
        }
    }

    /// Smallest valid sequence space for `window_length`.
    pub fn minimal(window_length: u32, mode: ArqMode) -> Result<Self, ConfigError> {
        Self::new(window_length, window_length.saturating_add(1), mode)
    }

    pub fn window_length(&self) -> u32 {
        self.window_length
    }

    pub fn sequence_length(&self) -> u32 {
        self.sequence_length
    }

    pub fn mode(&self) -> ArqMode {
        self.mode
    }

    pub fn is_go_back_n(&self) -> bool {
        self.mode == ArqMode::GoBackN
    }

    pub fn sequence_space(&self) -> SequenceSpace {
        SequenceSpace::new(self.sequence_length)
    }
}

/// Fault injection applied by a node to inbound datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Probability in `[0, 1)` that an inbound datagram is silently discarded.
    pub drop_rate: f64,
    /// Seed for the drop decision; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            seed: None,
        }
    }
}

impl ChannelConfig {
    pub fn lossy(drop_rate: f64, seed: Option<u64>) -> Result<Self, ConfigError> {
        let config = Self { drop_rate, seed };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.drop_rate) {
            return Err(ConfigError::InvalidDropRate(self.drop_rate));
        }
        Ok(())
    }
}

/// Flat, serialisable settings for one sender/receiver session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub window_length: u32,
    pub sequence_length: u32,
    pub mode: ArqMode,
    pub drop_rate: f64,
    pub seed: Option<u64>,
    pub retransmit_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_length: 4,
            sequence_length: 8,
            mode: ArqMode::GoBackN,
            drop_rate: 0.2,
            seed: Some(42),
            retransmit_timeout_ms: 200,
        }
    }
}

impl SessionConfig {
    pub fn window(&self) -> Result<WindowConfig, ConfigError> {
        WindowConfig::new(self.window_length, self.sequence_length, self.mode)
    }

    pub fn channel(&self) -> Result<ChannelConfig, ConfigError> {
        ChannelConfig::lossy(self.drop_rate, self.seed)
    }
}

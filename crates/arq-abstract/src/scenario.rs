use crate::config::SessionConfig;
use crate::packet::Content;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub config: SessionConfigOverride,
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScenario {
    /// Contents the scenario submits to the sender, in submission order.
    pub fn outgoing(&self) -> Vec<Content> {
        self.actions.iter().filter_map(TestAction::content).collect()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SessionConfigOverride {
    pub window_length: Option<u32>,
    pub sequence_length: Option<u32>,
    pub mode: Option<crate::ArqMode>,
    pub drop_rate: Option<f64>,
    pub seed: Option<u64>,
    pub retransmit_timeout_ms: Option<u64>,
}

impl SessionConfigOverride {
    pub fn apply_to(&self, config: &mut SessionConfig) {
        if let Some(v) = self.window_length {
            config.window_length = v;
        }
        if let Some(v) = self.sequence_length {
            config.sequence_length = v;
        }
        if let Some(v) = self.mode {
            config.mode = v;
        }
        if let Some(v) = self.drop_rate {
            config.drop_rate = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        if let Some(v) = self.retransmit_timeout_ms {
            config.retransmit_timeout_ms = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Application submits a string frame
    SendString { data: String },
    /// Application announces a file by name and size
    SendFileInfo { name: String, size: u32 },
    /// Deterministically drop the first data frame with this number arriving at the receiver
    DropNextData { number: u32 },
    /// Deterministically drop the first ACK with this number arriving at the sender
    DropNextAck { number: u32 },
}

impl TestAction {
    pub fn content(&self) -> Option<Content> {
        match self {
            TestAction::SendString { data } => Some(Content::text(data.clone())),
            TestAction::SendFileInfo { name, size } => Some(Content::file_info(name.clone(), *size)),
            TestAction::DropNextData { .. } | TestAction::DropNextAck { .. } => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that specific string data was delivered to the application
    DataDelivered { data: String },
    /// Assert that everything sent was delivered exactly once, in submission order
    DeliveredInOrder,
    /// Assert that the total number of frames sent by the sender is within range
    SenderPacketCount { min: u32, max: Option<u32> },
    /// Assert that the session finishes within time
    MaxDuration { ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name = "sr-basic"
description = "selective repeat with one forced loss"

[config]
window_length = 4
sequence_length = 8
mode = "selective-repeat"
drop_rate = 0.0

[[actions]]
type = "send_string"
data = "alpha"

[[actions]]
type = "drop_next_data"
number = 0

[[actions]]
type = "send_file_info"
name = "report.pdf"
size = 1024

[[assertions]]
type = "delivered_in_order"

[[assertions]]
type = "max_duration"
ms = 5000
"#;

    #[test]
    fn parses_scenario_toml() {
        let scenario: TestScenario = toml::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.name, "sr-basic");
        assert_eq!(scenario.actions.len(), 3);
        assert_eq!(
            scenario.outgoing(),
            vec![Content::text("alpha"), Content::file_info("report.pdf", 1024)]
        );
        assert!(matches!(
            scenario.assertions[0],
            TestAssertion::DeliveredInOrder
        ));
    }

    #[test]
    fn override_only_touches_given_fields() {
        let scenario: TestScenario = toml::from_str(SCENARIO).unwrap();
        let mut config = SessionConfig::default();
        let timeout = config.retransmit_timeout_ms;
        scenario.config.apply_to(&mut config);

        assert_eq!(config.window_length, 4);
        assert_eq!(config.mode, crate::ArqMode::SelectiveRepeat);
        assert_eq!(config.drop_rate, 0.0);
        assert_eq!(config.retransmit_timeout_ms, timeout);
    }
}

use anyhow::{Context, anyhow};
use std::fs;
use std::path::Path;
use std::time::Duration;

use arq_abstract::{Content, SessionConfig, TestAction, TestAssertion, TestScenario};
use arq_transport::{LoopbackSession, SessionReport, TransportError};
use tracing::info;

const DEFAULT_MAX_DURATION_MS: u64 = 10_000;

pub async fn run_scenario(path: &Path) -> anyhow::Result<SessionReport> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: TestScenario = toml::from_str(&content).context("Failed to parse scenario")?;
    run(&scenario).await
}

pub async fn run(scenario: &TestScenario) -> anyhow::Result<SessionReport> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let mut config = SessionConfig::default();
    scenario.config.apply_to(&mut config);

    let session = LoopbackSession::start(config)
        .await
        .context("Failed to start loopback session")?;

    // Deterministic faults
    for action in &scenario.actions {
        match action {
            TestAction::DropNextData { number } => session.server().node().drop_next_data(*number),
            TestAction::DropNextAck { number } => session.client().node().drop_next_ack(*number),
            TestAction::SendString { .. } | TestAction::SendFileInfo { .. } => {}
        }
    }

    let max_duration = scenario
        .assertions
        .iter()
        .find_map(|a| match a {
            TestAssertion::MaxDuration { ms } => Some(*ms),
            _ => None,
        })
        .unwrap_or(DEFAULT_MAX_DURATION_MS);

    let report = match session
        .run(scenario.outgoing(), Duration::from_millis(max_duration))
        .await
    {
        Err(TransportError::Timeout(_)) => {
            return Err(anyhow!("Test timed out after {} ms", max_duration));
        }
        other => other.context("Session failed")?,
    };

    check_assertions(&scenario.assertions, &report)?;
    info!("Test Scenario Passed!");
    Ok(report)
}

pub fn check_assertions(
    assertions: &[TestAssertion],
    report: &SessionReport,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                let found = report
                    .delivered
                    .iter()
                    .any(|c| matches!(c, Content::Text { message } if message == data));
                if !found {
                    return Err(anyhow!(
                        "Assertion Failed: Data {:?} was not delivered",
                        data
                    ));
                }
            }
            TestAssertion::DeliveredInOrder => {
                if !report.delivered_in_order() {
                    return Err(anyhow!(
                        "Assertion Failed: delivered {} items, expected {} in submission order",
                        report.delivered.len(),
                        report.submitted.len()
                    ));
                }
            }
            TestAssertion::SenderPacketCount { min, max } => {
                let sent = report.frames_sent();
                if sent < u64::from(*min) {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} packets, expected min {}",
                        sent,
                        min
                    ));
                }
                if let Some(max) = max {
                    if sent > u64::from(*max) {
                        return Err(anyhow!(
                            "Assertion Failed: Sender sent {} packets, expected max {}",
                            sent,
                            max
                        ));
                    }
                }
            }
            TestAssertion::MaxDuration { ms } => {
                if report.duration_ms > *ms {
                    return Err(anyhow!(
                        "Assertion Failed: session took {} ms, limit {} ms",
                        report.duration_ms,
                        ms
                    ));
                }
            }
        }
    }
    Ok(())
}

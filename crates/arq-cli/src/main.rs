mod scenario_runner;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use arq_abstract::{ArqMode, Content, SessionConfig, WindowConfig};
use arq_transport::{
    Client, DEFAULT_CLIENT_PORT, DEFAULT_SERVER_PORT, EndpointConfig, LoopbackSession, Server,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sliding-window ARQ over UDP")]
struct Args {
    /// Log at debug level unless RUST_LOG overrides it.
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    /// Write a JSON report of the finished run.
    #[arg(long, global = true)]
    trace_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Receive frames and print delivered content until interrupted.
    Serve {
        #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_SERVER_PORT)))]
        bind: SocketAddr,
        /// Send ACK/NAK here instead of to the latest sender.
        #[arg(long)]
        peer: Option<SocketAddr>,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Send strings and file announcements to a server.
    Send {
        #[arg(long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_SERVER_PORT)))]
        peer: SocketAddr,
        #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_CLIENT_PORT)))]
        bind: SocketAddr,
        /// String payload; repeatable.
        #[arg(short, long = "message")]
        messages: Vec<String>,
        /// Announce a file by name and size; repeatable.
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
        /// Give up waiting for acknowledgements after this many seconds.
        #[arg(long, default_value_t = 30)]
        wait_secs: u64,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Run a client and a server in-process over loopback.
    Demo {
        /// Number of strings to send.
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Run a TOML scenario and check its assertions.
    Scenario { path: PathBuf },
}

#[derive(clap::Args, Debug, Clone)]
struct WindowArgs {
    #[arg(long, default_value_t = 4)]
    window: u32,
    /// Defaults to window + 1 for go-back-n and 2 x window for selective-repeat.
    #[arg(long)]
    sequence: Option<u32>,
    #[arg(long, value_enum, default_value_t = ModeArg::GoBackN)]
    mode: ModeArg,
    /// Probability of discarding each inbound datagram.
    #[arg(long)]
    drop_rate: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 200)]
    timeout_ms: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
    GoBackN,
    SelectiveRepeat,
    StopAndWait,
}

impl WindowArgs {
    fn session(&self, default_drop_rate: f64) -> Result<SessionConfig> {
        let (mode, window) = match self.mode {
            ModeArg::GoBackN => (ArqMode::GoBackN, self.window),
            ModeArg::SelectiveRepeat => (ArqMode::SelectiveRepeat, self.window),
            ModeArg::StopAndWait => (ArqMode::GoBackN, 1),
        };
        let sequence = match self.sequence {
            Some(sequence) => sequence,
            None => match mode {
                ArqMode::GoBackN => window.checked_add(1),
                ArqMode::SelectiveRepeat => window.checked_mul(2),
            }
            .with_context(|| format!("No sequence length fits window {window}"))?,
        };
        Ok(SessionConfig {
            window_length: window,
            sequence_length: sequence,
            mode,
            drop_rate: self.drop_rate.unwrap_or(default_drop_rate),
            seed: self.seed,
            retransmit_timeout_ms: self.timeout_ms,
        })
    }

    fn endpoint(&self, bind: SocketAddr) -> Result<EndpointConfig> {
        let session = self.session(0.0)?;
        let window: WindowConfig = session.window().context("Invalid window settings")?;
        let mut config = EndpointConfig::new(bind, window)
            .with_channel(session.channel().context("Invalid drop rate")?);
        config.retransmit_timeout_ms = session.retransmit_timeout_ms;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);
    info!("arq starting…");

    match args.command {
        Command::Serve { bind, peer, window } => {
            let summary = serve(window.endpoint(bind)?, peer).await?;
            write_trace_if(&args.trace_out, &summary)?;
        }
        Command::Send {
            peer,
            bind,
            messages,
            files,
            wait_secs,
            window,
        } => {
            let mut outgoing: Vec<Content> = messages.into_iter().map(Content::text).collect();
            for path in &files {
                outgoing.push(file_info(path)?);
            }
            let config = window.endpoint(bind)?.with_peer(peer);
            let summary = send(config, outgoing, Duration::from_secs(wait_secs)).await?;
            write_trace_if(&args.trace_out, &summary)?;
        }
        Command::Demo { count, window } => {
            let report = run_demo(window.session(0.2)?, count).await?;
            write_trace_if(&args.trace_out, &report)?;
        }
        Command::Scenario { path } => {
            let report = scenario_runner::run_scenario(&path).await?;
            write_trace_if(&args.trace_out, &report)?;
        }
    }

    Ok(())
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(
    config: EndpointConfig,
    peer: Option<SocketAddr>,
) -> Result<arq_transport::ServerSummary> {
    let config = match peer {
        Some(peer) => config.with_peer(peer),
        None => config,
    };
    let mut server = Server::spawn(config).await.context("Failed to start server")?;
    info!("Press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            delivered = server.next_delivery() => match delivered {
                Some(content) => println!("{content}"),
                None => break,
            },
        }
    }

    let summary = server.shutdown().await.context("Server failed")?;
    info!(
        "Server stopped: {} accepted, {} rejected, {} dropped",
        summary.accepted, summary.rejected, summary.node.dropped
    );
    Ok(summary)
}

async fn send(
    config: EndpointConfig,
    outgoing: Vec<Content>,
    wait: Duration,
) -> Result<arq_transport::ClientSummary> {
    if outgoing.is_empty() {
        anyhow::bail!("Nothing to send: pass --message or --file");
    }
    let mut client = Client::spawn(config).await.context("Failed to start client")?;
    for content in outgoing {
        info!("Sending {content}");
        client.send(content).await?;
    }
    client
        .wait_idle(wait)
        .await
        .context("Peer did not acknowledge everything")?;

    let summary = client.shutdown().await.context("Client failed")?;
    info!(
        "All {} frames acknowledged ({} retransmissions)",
        summary.acknowledged, summary.retransmissions
    );
    Ok(summary)
}

async fn run_demo(config: SessionConfig, count: usize) -> Result<arq_transport::SessionReport> {
    info!(
        "Demo: {:?}, window {}, sequence {}, drop rate {:.2}",
        config.mode, config.window_length, config.sequence_length, config.drop_rate
    );
    let outgoing = (1..=count)
        .map(|i| Content::text(format!("Packet {i}")))
        .collect();

    let session = LoopbackSession::start(config)
        .await
        .context("Failed to start loopback session")?;
    let report = session.run(outgoing, Duration::from_secs(60)).await?;

    for content in &report.delivered {
        println!("{content}");
    }
    info!(
        "Delivered {} of {} in {} ms ({} frames sent, {} dropped)",
        report.delivered.len(),
        report.submitted.len(),
        report.duration_ms,
        report.frames_sent(),
        report.datagrams_dropped()
    );
    Ok(report)
}

fn file_info(path: &Path) -> Result<Content> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata of {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("File name of {} is not valid UTF-8", path.display()))?;
    let size = u32::try_from(metadata.len())
        .with_context(|| format!("{} is larger than 4 GiB", path.display()))?;
    Ok(Content::file_info(name, size))
}

fn write_trace_if<T: Serialize>(path: &Option<PathBuf>, report: &T) -> Result<()> {
    match path {
        Some(path) => write_trace(path, report),
        None => Ok(()),
    }
}

fn write_trace<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize report")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_args(window: u32, mode: ModeArg) -> WindowArgs {
        WindowArgs {
            window,
            sequence: None,
            mode,
            drop_rate: None,
            seed: None,
            timeout_ms: 200,
        }
    }

    #[test]
    fn default_sequence_follows_mode() {
        let config = window_args(4, ModeArg::GoBackN).session(0.0).unwrap();
        assert_eq!(config.sequence_length, 5);
        let config = window_args(4, ModeArg::SelectiveRepeat).session(0.0).unwrap();
        assert_eq!(config.sequence_length, 8);
        let config = window_args(9, ModeArg::StopAndWait).session(0.3).unwrap();
        assert_eq!((config.window_length, config.sequence_length), (1, 2));
        assert_eq!(config.drop_rate, 0.3);
    }

    #[test]
    fn huge_window_is_an_error_not_a_panic() {
        assert!(window_args(u32::MAX, ModeArg::GoBackN).session(0.0).is_err());
        assert!(window_args(u32::MAX, ModeArg::SelectiveRepeat).session(0.0).is_err());

        let bind = SocketAddr::from(([127, 0, 0, 1], 0));
        let err = window_args(500_000_000, ModeArg::SelectiveRepeat)
            .endpoint(bind)
            .unwrap_err();
        assert!(format!("{err:#}").contains("exceeds"), "{err:#}");
    }
}

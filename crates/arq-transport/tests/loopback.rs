use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use arq_abstract::{
    ArqMode, ChannelConfig, Content, EncodeError, Packet, SessionConfig, WindowConfig,
};
use arq_transport::{Client, EndpointConfig, LoopbackSession, Node, Server, TransportError};
use tokio::time::timeout;

const LIMIT: Duration = Duration::from_secs(20);

fn loopback() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

// An IPv4 socket cannot send here, so every send to it fails
fn unreachable_peer() -> SocketAddr {
    SocketAddr::from((Ipv6Addr::LOCALHOST, 9))
}

fn messages(count: usize) -> Vec<Content> {
    (0..count).map(|i| Content::text(format!("line {i}"))).collect()
}

fn session(window: u32, sequence: u32, mode: ArqMode, drop_rate: f64) -> SessionConfig {
    SessionConfig {
        window_length: window,
        sequence_length: sequence,
        mode,
        drop_rate,
        seed: Some(7),
        retransmit_timeout_ms: 50,
    }
}

#[tokio::test]
async fn go_back_n_delivers_in_order_over_lossy_channel() {
    let session = LoopbackSession::start(session(4, 8, ArqMode::GoBackN, 0.2))
        .await
        .unwrap();
    let report = session.run(messages(30), LIMIT).await.unwrap();

    assert!(report.delivered_in_order(), "{:?}", report.delivered);
    assert!(report.frames_sent() >= 30);
    assert_eq!(report.client.acknowledged, 30);
}

#[tokio::test]
async fn selective_repeat_delivers_in_order_over_lossy_channel() {
    let session = LoopbackSession::start(session(4, 8, ArqMode::SelectiveRepeat, 0.2))
        .await
        .unwrap();
    let report = session.run(messages(30), LIMIT).await.unwrap();

    assert!(report.delivered_in_order(), "{:?}", report.delivered);
    assert!(report.datagrams_dropped() > 0);
}

#[tokio::test]
async fn stop_and_wait_keeps_one_frame_in_flight() {
    let mut config = session(1, 2, ArqMode::GoBackN, 0.0);
    config.retransmit_timeout_ms = 1000;
    let session = LoopbackSession::start(config).await.unwrap();
    let mut outgoing = messages(5);
    outgoing.push(Content::file_info("notes.txt", 1234));
    let report = session.run(outgoing, LIMIT).await.unwrap();

    assert!(report.delivered_in_order());
    assert_eq!(report.client.retransmissions, 0);
    assert_eq!(report.frames_sent(), 6);
}

#[tokio::test]
async fn forced_data_loss_is_recovered() {
    let session = LoopbackSession::start(session(4, 8, ArqMode::SelectiveRepeat, 0.0))
        .await
        .unwrap();
    session.server().node().drop_next_data(1);
    session.client().node().drop_next_ack(3);

    let report = session.run(messages(6), LIMIT).await.unwrap();

    assert!(report.delivered_in_order());
    assert_eq!(report.server.node.dropped, 1);
    assert!(report.client.retransmissions >= 1);
    assert!(report.server.naks_sent >= 1);
}

#[tokio::test]
async fn server_naks_out_of_order_go_back_n_frame() {
    let window = WindowConfig::new(4, 8, ArqMode::GoBackN).unwrap();
    let mut server = Server::spawn(EndpointConfig::new(loopback(), window))
        .await
        .unwrap();
    let peer = Node::bind(loopback(), ChannelConfig::default()).await.unwrap();

    peer.send(&Packet::text(2, "early"), server.local_addr())
        .await
        .unwrap();
    let (nak, _) = peer.recv().await.unwrap();
    let (ack, _) = peer.recv().await.unwrap();
    assert_eq!(nak, Packet::nak_go_back_n(0));
    assert_eq!(ack, Packet::ack(0));

    peer.send(&Packet::text(0, "first"), server.local_addr())
        .await
        .unwrap();
    assert_eq!(server.next_delivery().await, Some(Content::text("first")));
    let (ack, _) = peer.recv().await.unwrap();
    assert_eq!(ack, Packet::ack(1));

    let summary = server.shutdown().await.unwrap();
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.expected_number, 1);
}

#[tokio::test]
async fn client_requires_peer() {
    let window = WindowConfig::stop_and_wait();
    let result = arq_transport::Client::spawn(EndpointConfig::new(loopback(), window)).await;
    assert!(matches!(result, Err(TransportError::MissingPeer)));
}

#[tokio::test]
async fn report_serializes_to_json() {
    let session = LoopbackSession::start(session(2, 4, ArqMode::GoBackN, 0.0))
        .await
        .unwrap();
    let report = session.run(messages(2), LIMIT).await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["window"]["window_length"], 2);
    assert_eq!(json["delivered"][0]["type"], "text");
    assert_eq!(json["client"]["acknowledged"], 2);
}

#[tokio::test]
async fn oversized_content_is_refused_and_later_content_still_flows() {
    let window = WindowConfig::new(4, 8, ArqMode::GoBackN).unwrap();
    let mut server = Server::spawn(EndpointConfig::new(loopback(), window))
        .await
        .unwrap();
    let mut client =
        Client::spawn(EndpointConfig::new(loopback(), window).with_peer(server.local_addr()))
            .await
            .unwrap();

    let err = client
        .send(Content::text("x".repeat(70_000)))
        .await
        .unwrap_err();
    assert!(
        matches!(err, TransportError::Encode(EncodeError::StringTooLong(70_000))),
        "{err}"
    );
    // Encodes fine but exceeds one UDP datagram
    let err = client
        .send(Content::text("x".repeat(65_520)))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::FrameTooLarge(_)), "{err}");

    client.send(Content::text("after")).await.unwrap();
    client.wait_idle(LIMIT).await.unwrap();
    assert_eq!(server.next_delivery().await, Some(Content::text("after")));

    let summary = client.shutdown().await.unwrap();
    assert_eq!(summary.acknowledged, 1);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn wait_idle_reports_why_the_client_stopped() {
    let window = WindowConfig::stop_and_wait();
    let mut client =
        Client::spawn(EndpointConfig::new(loopback(), window).with_peer(unreachable_peer()))
            .await
            .unwrap();

    client.send(Content::text("lost")).await.unwrap();
    let err = client.wait_idle(LIMIT).await.unwrap_err();
    assert!(matches!(err, TransportError::Io(_)), "{err}");

    let err = client.send(Content::text("later")).await.unwrap_err();
    assert!(matches!(err, TransportError::Closed), "{err}");
}

#[tokio::test]
async fn session_surfaces_client_failure_instead_of_closed() {
    let session = LoopbackSession::start(session(2, 4, ArqMode::GoBackN, 0.0))
        .await
        .unwrap();
    let outgoing = vec![Content::text("x".repeat(70_000)), Content::text("after")];

    let err = session.run(outgoing, LIMIT).await.unwrap_err();
    assert!(matches!(err, TransportError::Encode(_)), "{err}");
}

#[tokio::test]
async fn server_releases_window_when_control_frames_cannot_be_sent() {
    let window = WindowConfig::new(4, 8, ArqMode::GoBackN).unwrap();
    let mut server =
        Server::spawn(EndpointConfig::new(loopback(), window).with_peer(unreachable_peer()))
            .await
            .unwrap();
    let peer = Node::bind(loopback(), ChannelConfig::default()).await.unwrap();

    peer.send(&Packet::text(0, "first"), server.local_addr())
        .await
        .unwrap();
    assert_eq!(server.next_delivery().await, Some(Content::text("first")));

    // The delivery channel closes only once the drain thread has been joined
    let next = timeout(LIMIT, server.next_delivery()).await.unwrap();
    assert_eq!(next, None);

    let err = server.shutdown().await.unwrap_err();
    assert!(matches!(err, TransportError::Io(_)), "{err}");
}

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use arq_abstract::{ArqMode, Content, ConfigError, Packet, PacketType, WindowConfig};
use arq_core::{ReceiverWindow, WindowError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    window: ReceiverWindow,
    outputs: Receiver<Packet>,
    sent: Arc<Mutex<Vec<Packet>>>,
}

impl Harness {
    fn new(window_length: u32, sequence_length: u32, mode: ArqMode) -> Self {
        let config = WindowConfig::new(window_length, sequence_length, mode).unwrap();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (tx, outputs) = mpsc::channel();

        let sink = {
            let sent = Arc::clone(&sent);
            move |packet: Packet| sent.lock().unwrap().push(packet)
        };
        let output = move |packet: Packet| {
            let _ = tx.send(packet);
        };

        let window = ReceiverWindow::new(config, sink, output).unwrap();
        Self {
            window,
            outputs,
            sent,
        }
    }

    fn receive(&self, number: u32) -> bool {
        self.window.receive(Packet::text(number, format!("m{number}")))
    }

    fn next_outputs(&self, count: usize) -> Vec<u32> {
        (0..count)
            .map(|_| {
                self.outputs
                    .recv_timeout(TIMEOUT)
                    .expect("output not delivered")
                    .number()
                    .unwrap()
            })
            .collect()
    }

    fn assert_no_output(&self) {
        assert!(
            self.outputs
                .recv_timeout(Duration::from_millis(100))
                .is_err()
        );
    }

    fn sent(&self) -> Vec<Packet> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_of(&self, kind: PacketType) -> Vec<u32> {
        self.sent()
            .iter()
            .filter(|p| p.kind() == kind)
            .filter_map(Packet::number)
            .collect()
    }

    fn wait_for_ack(&self, number: u32) {
        let deadline = Instant::now() + TIMEOUT;
        while !self.sent().contains(&Packet::ack(number)) {
            assert!(Instant::now() < deadline, "ACK({number}) never sent");
            thread::sleep(Duration::from_millis(5));
        }
    }
}

#[test]
fn go_back_n_rejects_out_of_order_and_requests_expected() {
    let h = Harness::new(4, 8, ArqMode::GoBackN);

    assert!(!h.receive(2));
    assert_eq!(
        h.sent(),
        vec![Packet::nak_go_back_n(0), Packet::ack(0)]
    );
    h.assert_no_output();
    assert_eq!(h.window.expected_number(), 0);

    assert!(h.receive(0));
    assert_eq!(h.next_outputs(1), vec![0]);
    h.wait_for_ack(1);
    assert_eq!(h.window.expected_number(), 1);

    // 2 was discarded, not parked ahead of the frontier
    assert!(h.receive(1));
    assert_eq!(h.next_outputs(1), vec![1]);
    h.assert_no_output();
    h.wait_for_ack(2);
    assert_eq!(h.window.expected_number(), 2);
}

#[test]
fn go_back_n_delivers_in_order_stream() {
    let h = Harness::new(3, 6, ArqMode::GoBackN);
    for n in 0..3 {
        assert!(h.receive(n));
    }
    assert_eq!(h.next_outputs(3), vec![0, 1, 2]);
    assert!(h.sent_of(PacketType::NakGoBackN).is_empty());
}

#[test]
fn wraparound_crosses_sequence_boundary() {
    for mode in [ArqMode::GoBackN, ArqMode::SelectiveRepeat] {
        let h = Harness::new(3, 5, mode);
        for n in 0..3 {
            assert!(h.receive(n));
        }
        assert_eq!(h.next_outputs(3), vec![0, 1, 2]);

        for n in [3, 4, 0] {
            assert!(h.receive(n), "{mode:?} rejected #{n}");
        }
        assert_eq!(h.next_outputs(3), vec![3, 4, 0]);
        h.wait_for_ack(1);
        assert_eq!(h.window.window_start(), 1);
    }
}

#[test]
fn selective_repeat_duplicate_is_not_redelivered() {
    let h = Harness::new(4, 8, ArqMode::SelectiveRepeat);
    assert!(h.receive(0));
    assert_eq!(h.next_outputs(1), vec![0]);
    h.wait_for_ack(1);

    assert!(!h.receive(0));
    h.assert_no_output();
    assert_eq!(h.window.expected_number(), 1);
    assert_eq!(h.window.window_start(), 1);
}

#[test]
fn selective_repeat_duplicate_inside_window_overwrites_slot() {
    let h = Harness::new(4, 8, ArqMode::SelectiveRepeat);
    assert!(h.receive(2));
    assert!(h.receive(2));
    assert_eq!(h.window.expected_number(), 3);
    h.assert_no_output();

    assert!(h.receive(0));
    assert!(h.receive(1));
    assert_eq!(h.next_outputs(3), vec![0, 1, 2]);
    h.assert_no_output();
}

#[test]
fn out_of_range_frame_reannounces_window_start() {
    let h = Harness::new(4, 8, ArqMode::SelectiveRepeat);
    assert!(!h.receive(5));
    assert_eq!(h.sent(), vec![Packet::ack(0)]);
    assert_eq!(h.window.expected_number(), 0);
    h.assert_no_output();

    for n in 0..4 {
        assert!(h.receive(n));
    }
    assert_eq!(h.next_outputs(4), vec![0, 1, 2, 3]);
    h.wait_for_ack(4);

    // Nothing from the rejected 5 is waiting behind 4
    assert!(h.receive(4));
    assert_eq!(h.next_outputs(1), vec![4]);
    h.assert_no_output();
}

#[test]
fn selective_repeat_end_to_end_scenario() {
    let h = Harness::new(4, 8, ArqMode::SelectiveRepeat);

    assert!(h.receive(0));
    assert!(h.sent_of(PacketType::NakSelectiveRepeat).is_empty());

    assert!(h.receive(2));
    assert_eq!(h.sent_of(PacketType::NakSelectiveRepeat), vec![1]);

    assert!(h.receive(1));
    assert!(h.receive(3));
    assert_eq!(h.next_outputs(4), vec![0, 1, 2, 3]);
    h.wait_for_ack(4);
    assert_eq!(h.sent_of(PacketType::NakSelectiveRepeat), vec![1]);
}

#[test]
fn selective_repeat_gap_naks_every_missing_number() {
    let h = Harness::new(4, 8, ArqMode::SelectiveRepeat);
    assert!(h.receive(3));
    assert_eq!(h.sent_of(PacketType::NakSelectiveRepeat), vec![0, 1, 2]);
    assert_eq!(h.window.expected_number(), 4);
    h.assert_no_output();
}

#[test]
fn selective_repeat_permutations_deliver_sorted() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let h = Harness::new(8, 16, ArqMode::SelectiveRepeat);
        let mut numbers: Vec<u32> = (0..8).collect();
        numbers.extend([1, 4, 6]);
        numbers.shuffle(&mut rng);

        for n in &numbers {
            h.receive(*n);
        }
        assert_eq!(h.next_outputs(8), (0..8).collect::<Vec<_>>());
        h.assert_no_output();
    }
}

#[test]
fn non_data_and_unnumbered_frames_are_ignored() {
    let h = Harness::new(4, 8, ArqMode::SelectiveRepeat);
    assert!(!h.window.receive(Packet::ack(0)));
    assert!(!h.window.receive(Packet::unnumbered(Content::text("x"))));
    assert!(!h.receive(8));
    assert!(h.sent().is_empty());
    h.assert_no_output();
}

#[test]
fn invalid_lengths_are_rejected() {
    let result = ReceiverWindow::with_lengths(4, 4, true, |_: Packet| {}, |_: Packet| {});
    assert!(matches!(
        result,
        Err(WindowError::Config(ConfigError::SequenceTooShort { .. }))
    ));
}

#[test]
fn shutdown_stops_drain_thread() {
    let h = Harness::new(2, 4, ArqMode::GoBackN);
    assert!(h.receive(0));
    assert_eq!(h.next_outputs(1), vec![0]);
    h.window.shutdown();
}

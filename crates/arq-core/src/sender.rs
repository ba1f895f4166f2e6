use std::collections::VecDeque;

use arq_abstract::{ArqMode, Content, Packet, SequenceSpace, WindowConfig};
use tracing::{debug, trace};

/// Send-side window. Pure: every method returns the frames that must go on
/// the wire, and the caller owns timers and I/O.
#[derive(Debug)]
pub struct SenderWindow {
    config: WindowConfig,
    space: SequenceSpace,
    /// Oldest unacknowledged number.
    base: u32,
    next_number: u32,
    in_flight: VecDeque<Packet>,
    queued: VecDeque<Content>,
    acked_total: u64,
    retransmissions: u64,
}

impl SenderWindow {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            space: config.sequence_space(),
            base: 0,
            next_number: 0,
            in_flight: VecDeque::with_capacity(config.window_length() as usize),
            queued: VecDeque::new(),
            acked_total: 0,
            retransmissions: 0,
        }
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_number(&self) -> u32 {
        self.next_number
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    pub fn acked_total(&self) -> u64 {
        self.acked_total
    }

    pub fn retransmissions(&self) -> u64 {
        self.retransmissions
    }

    /// Whether another [`offer`](Self::offer) would be sent right away
    /// instead of waiting in the queue.
    pub fn has_capacity(&self) -> bool {
        self.in_flight.len() + self.queued.len() < self.config.window_length() as usize
    }

    /// Nothing in flight and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.queued.is_empty()
    }

    /// Queue `content` and return whatever can be sent now.
    pub fn offer(&mut self, content: Content) -> Vec<Packet> {
        self.queued.push_back(content);
        self.fill()
    }

    /// Cumulative acknowledgement: the receiver's window now starts at
    /// `number`.
    pub fn on_ack(&mut self, number: u32) -> Vec<Packet> {
        self.slide_to(number);
        self.fill()
    }

    /// Go-Back-N NAK: everything from `number` on is resent.
    pub fn on_nak_go_back_n(&mut self, number: u32) -> Vec<Packet> {
        self.slide_to(number);
        let mut out = self.retransmit_all();
        out.extend(self.fill());
        out
    }

    /// Selective-Repeat NAK: only the named frame is resent.
    pub fn on_nak_selective(&mut self, number: u32) -> Vec<Packet> {
        let offset = self.space.position(number, self.base) as usize;
        match self.in_flight.get(offset) {
            Some(packet) => {
                debug!("Selective retransmit of #{}", number);
                self.retransmissions += 1;
                vec![packet.clone()]
            }
            None => {
                trace!("NAK #{} not in flight, ignored", number);
                Vec::new()
            }
        }
    }

    /// Retransmit timer expired without progress.
    pub fn on_timeout(&mut self) -> Vec<Packet> {
        match self.config.mode() {
            ArqMode::GoBackN => self.retransmit_all(),
            ArqMode::SelectiveRepeat => match self.in_flight.front() {
                Some(packet) => {
                    self.retransmissions += 1;
                    vec![packet.clone()]
                }
                None => Vec::new(),
            },
        }
    }

    /// Dispatch a control frame arriving from the receiver.
    pub fn on_control(&mut self, packet: &Packet) -> Vec<Packet> {
        let Some(number) = packet.number() else {
            return Vec::new();
        };
        if !self.space.contains(number) {
            return Vec::new();
        }
        match packet.content() {
            Content::Ack => self.on_ack(number),
            Content::NakGoBackN => self.on_nak_go_back_n(number),
            Content::NakSelectiveRepeat => self.on_nak_selective(number),
            Content::Text { .. } | Content::FileInfo { .. } => Vec::new(),
        }
    }

    /// Release every in-flight frame before `number`. Numbers that do not
    /// fall within the in-flight range are stale and ignored.
    fn slide_to(&mut self, number: u32) {
        let offset = self.space.position(number, self.base) as usize;
        if offset == 0 || offset > self.in_flight.len() {
            return;
        }
        self.in_flight.drain(..offset);
        self.base = number;
        self.acked_total += offset as u64;
        debug!("Window slid to {} ({} acknowledged)", number, offset);
    }

    fn retransmit_all(&mut self) -> Vec<Packet> {
        self.retransmissions += self.in_flight.len() as u64;
        if !self.in_flight.is_empty() {
            debug!(
                "Retransmitting {} frames from #{}",
                self.in_flight.len(),
                self.base
            );
        }
        self.in_flight.iter().cloned().collect()
    }

    fn fill(&mut self) -> Vec<Packet> {
        let window_length = self.config.window_length() as usize;
        let mut out = Vec::new();
        while self.in_flight.len() < window_length {
            let Some(content) = self.queued.pop_front() else {
                break;
            };
            let packet = Packet::new(self.next_number, content);
            self.next_number = self.space.next(self.next_number);
            self.in_flight.push_back(packet.clone());
            out.push(packet);
        }
        out
    }
}

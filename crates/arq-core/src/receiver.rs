use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use arq_abstract::{ArqMode, Packet, PacketOutput, PacketSink, SequenceSpace, WindowConfig};
use tracing::{debug, info, warn};

use crate::error::WindowError;
use crate::slot_buffer::{Closed, SlotBuffer};

/// Snapshot of the receiver's frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Oldest number not yet delivered to the application.
    pub window_start: u32,
    /// Next number the policy expects to arrive.
    pub expected_number: u32,
}

struct Shared {
    config: WindowConfig,
    space: SequenceSpace,
    state: Mutex<WindowState>,
    slots: SlotBuffer<Packet>,
    sink: Box<dyn PacketSink>,
    output: Box<dyn PacketOutput>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn window_length(&self) -> u32 {
        self.config.window_length()
    }
}

/// Receive-side window for Go-Back-N and Selective-Repeat.
///
/// A drain thread moves contiguous frames from the front of the slot buffer
/// to the application and acknowledges each batch with `ACK(window_start)`.
/// Lock order is always window state first, then the slot buffer.
pub struct ReceiverWindow {
    shared: Arc<Shared>,
    drain: Option<JoinHandle<()>>,
}

impl ReceiverWindow {
    /// Build the window and start its drain thread.
    pub fn new<S, O>(config: WindowConfig, sink: S, output: O) -> Result<Self, WindowError>
    where
        S: PacketSink + 'static,
        O: PacketOutput + 'static,
    {
        let shared = Arc::new(Shared {
            config,
            space: config.sequence_space(),
            state: Mutex::new(WindowState {
                window_start: 0,
                expected_number: 0,
            }),
            slots: SlotBuffer::new(config.window_length() as usize),
            sink: Box::new(sink),
            output: Box::new(output),
        });

        let drain = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("arq-receiver-drain".to_string())
                .spawn(move || drain_loop(&shared))?
        };

        debug!(
            "Receiver window started: window={} sequence={} mode={:?}",
            config.window_length(),
            config.sequence_length(),
            config.mode()
        );

        Ok(Self {
            shared,
            drain: Some(drain),
        })
    }

    /// Validate raw lengths, then build the window.
    pub fn with_lengths<S, O>(
        window_length: u32,
        sequence_length: u32,
        go_back_n: bool,
        sink: S,
        output: O,
    ) -> Result<Self, WindowError>
    where
        S: PacketSink + 'static,
        O: PacketOutput + 'static,
    {
        let mode = if go_back_n {
            ArqMode::GoBackN
        } else {
            ArqMode::SelectiveRepeat
        };
        let config = WindowConfig::new(window_length, sequence_length, mode)?;
        Self::new(config, sink, output)
    }

    pub fn config(&self) -> WindowConfig {
        self.shared.config
    }

    pub fn state(&self) -> WindowState {
        *self.shared.lock_state()
    }

    pub fn window_start(&self) -> u32 {
        self.state().window_start
    }

    pub fn expected_number(&self) -> u32 {
        self.state().expected_number
    }

    /// Apply the window policy to one arrived data frame.
    ///
    /// Returns whether the frame was accepted into the window. Frames without
    /// a number, with a number outside the sequence space, or carrying no
    /// data are rejected without emitting anything.
    pub fn receive(&self, packet: Packet) -> bool {
        let Some(number) = packet.number() else {
            warn!("Dropping unnumbered {:?} frame", packet.kind());
            return false;
        };
        if !self.shared.space.contains(number) {
            warn!(
                "Dropping frame #{} outside sequence space of {}",
                number,
                self.shared.space.length()
            );
            return false;
        }
        if !packet.is_data() {
            debug!("Ignoring {:?} frame #{} on receive path", packet.kind(), number);
            return false;
        }

        let mut state = self.shared.lock_state();
        match self.shared.config.mode() {
            ArqMode::GoBackN => self.go_back_n(&mut state, number, packet),
            ArqMode::SelectiveRepeat => self.selective_repeat(&mut state, number, packet),
        }
    }

    fn go_back_n(&self, state: &mut WindowState, number: u32, packet: Packet) -> bool {
        let shared = &self.shared;
        let expected = state.expected_number;

        if number == expected {
            // Slot 0 unless the drain thread still holds earlier frames.
            let position = shared.space.position(number, state.window_start);
            if position < shared.window_length() {
                shared.slots.set(position as usize, packet);
                state.expected_number = shared.space.next(expected);
                debug!("GBN accepted #{}", number);
                return true;
            }
            debug!("GBN window full at #{}, drain behind", number);
        } else {
            debug!("GBN out of order #{} (expected {})", number, expected);
        }

        shared.sink.send_packet(Packet::nak_go_back_n(expected));
        shared.sink.send_packet(Packet::ack(expected));
        false
    }

    fn selective_repeat(&self, state: &mut WindowState, number: u32, packet: Packet) -> bool {
        let shared = &self.shared;
        let number_pos = shared.space.position(number, state.window_start);
        let expected_pos = shared.space.position(state.expected_number, state.window_start);

        if number_pos >= shared.window_length() {
            debug!(
                "SR #{} outside window starting at {}",
                number, state.window_start
            );
            shared.sink.send_packet(Packet::ack(state.window_start));
            return false;
        }

        match number_pos.cmp(&expected_pos) {
            Ordering::Less => {
                debug!("SR late or duplicate #{}", number);
                shared.slots.set(number_pos as usize, packet);
            }
            Ordering::Equal => {
                debug!("SR accepted #{}", number);
                shared.slots.set(number_pos as usize, packet);
                state.expected_number = shared.space.next(state.expected_number);
            }
            Ordering::Greater => {
                // NAK every gap number and move the frontier past it. A late
                // original of a NAK'd number then lands in the `Less` arm.
                while state.expected_number != number {
                    debug!("SR gap, NAK #{}", state.expected_number);
                    shared
                        .sink
                        .send_packet(Packet::nak_selective_repeat(state.expected_number));
                    state.expected_number = shared.space.next(state.expected_number);
                }
                shared.slots.set(number_pos as usize, packet);
                state.expected_number = shared.space.next(state.expected_number);
            }
        }
        true
    }

    /// Stop the drain thread and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shared.slots.close();
        if let Some(handle) = self.drain.take() {
            if handle.join().is_err() {
                warn!("Receiver drain thread panicked");
            }
        }
    }
}

impl Drop for ReceiverWindow {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drain_loop(shared: &Shared) {
    while shared.slots.await_not_empty().is_ok() {
        let Ok((batch, window_start)) = take_ready(shared) else {
            break;
        };
        for packet in batch {
            shared.output.output_packet(packet);
        }
        shared.sink.send_packet(Packet::ack(window_start));
    }
    info!("Terminating receiver drain loop");
}

/// Remove every contiguous frame from the front, advancing the window start
/// once per frame.
fn take_ready(shared: &Shared) -> Result<(Vec<Packet>, u32), Closed> {
    let mut state = shared.lock_state();
    let ready = shared.slots.size();
    let mut batch = Vec::with_capacity(ready);
    for _ in 0..ready {
        batch.push(shared.slots.remove()?);
        state.window_start = shared.space.next(state.window_start);
    }
    Ok((batch, state.window_start))
}

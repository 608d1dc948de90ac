//! # Serial Framing
//!
//! Turns the raw byte stream coming from the modem into lines and sorts each
//! line into one of four buckets:
//!
//! 1. asynchronous publish notifications (`+MQTTSUBRECV...`), queued for the
//!    endpoint task;
//! 2. the `CLOSED` marker, raised as a link-closed signal;
//! 3. the answer to the command currently in flight;
//! 4. everything else, which is dropped.
//!
//! [`SerialFramer::on_byte_received`] is meant to be called from the UART
//! receive interrupt (or a task draining the UART, see
//! [`crate::transport::pump_rx`]). It never blocks and never allocates: all
//! buffers are fixed-size and the only locks are short critical sections.
//!
//! Commands are issued through [`AtClient`], which owns the write half of the
//! transport.

pub mod client;
pub mod line;
pub mod slot;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::config::INBOUND_QUEUE_DEPTH;

pub use client::AtClient;
pub use line::{Assembled, CrState, Line, LineAssembler};
pub use slot::{ArmError, CommandSlot, Response};

/// Prefix of an asynchronous publish notification.
pub const ASYNC_PUBLISH_MARKER: &str = "+MQTTSUBRECV";

/// Line sent by the modem when the connection is torn down.
pub const CLOSED_MARKER: &str = "CLOSED";

/// Channel carrying asynchronous publish lines to the endpoint.
pub type InboundChannel = Channel<CriticalSectionRawMutex, Line, INBOUND_QUEUE_DEPTH>;

/// How a completed line was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Classified {
    /// Queued for the endpoint.
    AsyncPublish,
    /// `CLOSED` marker; the link-closed signal was raised.
    Closed,
    /// Resolved the command in flight.
    Response,
    /// Dropped.
    Unclassified,
}

/// Shared receive-side state of the modem link.
pub struct SerialFramer {
    assembler: Mutex<CriticalSectionRawMutex, RefCell<LineAssembler>>,
    slot: CommandSlot,
    inbound: InboundChannel,
    closed: Signal<CriticalSectionRawMutex, ()>,
}

impl SerialFramer {
    /// A framer with no partial line, no pending command and an empty queue.
    pub const fn new() -> Self {
        Self {
            assembler: Mutex::new(RefCell::new(LineAssembler::new())),
            slot: CommandSlot::new(),
            inbound: Channel::new(),
            closed: Signal::new(),
        }
    }

    /// Feed one received byte.
    pub fn on_byte_received(&self, byte: u8) {
        let assembled = self.assembler.lock(|asm| asm.borrow_mut().push(byte));
        match assembled {
            Some(Assembled::Line(line)) => {
                self.dispatch(line);
            }
            Some(Assembled::Rejected(reason)) => {
                warn!("framer: dropped line: {}", reason.describe());
            }
            None => {}
        }
    }

    /// Feed a chunk of received bytes, in order.
    pub fn on_bytes(&self, bytes: &[u8]) {
        for byte in bytes {
            self.on_byte_received(*byte);
        }
    }

    /// Classify a completed line and hand it to whoever waits for it.
    pub fn dispatch(&self, line: Line) -> Classified {
        if line.starts_with(ASYNC_PUBLISH_MARKER.as_bytes()) {
            if self.inbound.try_send(line).is_err() {
                warn!("framer: inbound queue full, dropping publish");
            }
            return Classified::AsyncPublish;
        }
        if line.as_slice() == CLOSED_MARKER.as_bytes() {
            self.closed.signal(());
            return Classified::Closed;
        }
        match core::str::from_utf8(&line) {
            Ok(text) if self.slot.offer(text) => return Classified::Response,
            Ok(text) => trace!("framer: unclassified line: {}", text),
            Err(_) => trace!("framer: unclassified binary line of {} bytes", line.len()),
        }
        Classified::Unclassified
    }

    /// The command/response slot.
    pub fn slot(&self) -> &CommandSlot {
        &self.slot
    }

    /// Wait for the next asynchronous publish line.
    pub async fn receive_async_line(&self) -> Line {
        self.inbound.receive().await
    }

    /// Take the next asynchronous publish line if one is queued.
    pub fn try_receive_async_line(&self) -> Option<Line> {
        self.inbound.try_receive().ok()
    }

    /// Wait until the modem reports `CLOSED`.
    pub async fn wait_closed(&self) {
        self.closed.wait().await;
    }

    /// Consume a pending `CLOSED` report without waiting.
    pub fn take_closed(&self) -> bool {
        self.closed.try_take().is_some()
    }

    /// Bytes currently buffered for an incomplete line.
    pub fn pending_len(&self) -> usize {
        self.assembler.lock(|asm| asm.borrow().len())
    }

    /// Drop partial input and queued lines, e.g. after a modem reset.
    pub fn reset(&self) {
        self.assembler.lock(|asm| asm.borrow_mut().reset());
        self.inbound.clear();
        self.closed.reset();
    }
}

impl Default for SerialFramer {
    fn default() -> Self {
        Self::new()
    }
}

//! Command issuing side of the modem link.

use embassy_time::{Duration, with_timeout};

use super::SerialFramer;
use super::slot::{AbandonOnDrop, ArmError, Response};
use crate::error::Error;
use crate::transport::ModemTransport;

/// Line terminator for everything sent to the modem.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Issues AT commands and waits for their answers.
///
/// Only one command can be in flight: the slot rejects a second one with
/// [`Error::Busy`]. Share the client behind an async mutex (see
/// [`SharedClient`]) to serialise callers.
pub struct AtClient<'a, T: ModemTransport> {
    transport: T,
    framer: &'a SerialFramer,
}

/// An `AtClient` shared between the endpoint and the connection manager.
pub type SharedClient<'a, T> =
    embassy_sync::mutex::Mutex<embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex, AtClient<'a, T>>;

impl<'a, T: ModemTransport> AtClient<'a, T> {
    pub fn new(transport: T, framer: &'a SerialFramer) -> Self {
        Self { transport, framer }
    }

    /// The framer this client correlates responses on.
    pub fn framer(&self) -> &'a SerialFramer {
        self.framer
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Write `text` followed by CRLF without waiting for anything.
    pub async fn write_line(&mut self, text: &str) -> Result<(), Error<T::Error>> {
        trace!("at: > {}", text);
        self.transport
            .write(text.as_bytes())
            .await
            .map_err(Error::Transport)?;
        self.transport
            .write(TERMINATOR)
            .await
            .map_err(Error::Transport)
    }

    /// Send `text` and wait up to `timeout` for a line starting with
    /// `expected`. Returns whatever followed the prefix on that line.
    pub async fn send_command(
        &mut self,
        text: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<Response, Error<T::Error>> {
        trace!("at: > {}", text);
        self.exchange(&[text.as_bytes(), TERMINATOR], expected, timeout)
            .await
            .inspect_err(|_| debug!("at: `{}` got no `{}`", text, expected))
    }

    /// Write `data` verbatim (no terminator) and wait for `expected`. Used
    /// for payloads streamed after a `>` prompt.
    pub async fn send_raw(
        &mut self,
        data: &[u8],
        expected: &str,
        timeout: Duration,
    ) -> Result<Response, Error<T::Error>> {
        trace!("at: > <{} raw bytes>", data.len());
        self.exchange(&[data], expected, timeout).await
    }

    async fn exchange(
        &mut self,
        parts: &[&[u8]],
        expected: &str,
        timeout: Duration,
    ) -> Result<Response, Error<T::Error>> {
        let slot = self.framer.slot();
        // Armed before writing, so a fast answer cannot slip past.
        let generation = slot.arm(expected).map_err(|e| match e {
            ArmError::Busy => Error::Busy,
            ArmError::PrefixTooLong => Error::CommandTooLong,
        })?;
        let _abandon = AbandonOnDrop { slot, generation };

        for part in parts {
            self.transport.write(part).await.map_err(Error::Transport)?;
        }

        with_timeout(timeout, slot.wait(generation))
            .await
            .map_err(|_| Error::Timeout)
    }

    /// Like [`send_command`](Self::send_command) but only reports whether the
    /// expected answer arrived.
    pub async fn probe(&mut self, text: &str, expected: &str, timeout: Duration) -> bool {
        self.send_command(text, expected, timeout).await.is_ok()
    }
}

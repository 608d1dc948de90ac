//! # Modem Transport Abstraction
//!
//! The modem is reached over a byte-oriented serial link. Outbound traffic
//! goes through the `ModemTransport` trait; inbound bytes are pushed into a
//! [`SerialFramer`] either from the UART interrupt or by [`pump_rx`].

use embedded_io_async::{Read, Write};

use crate::framer::SerialFramer;

/// Write half of the link to the modem.
#[allow(async_fn_in_trait)]
pub trait ModemTransport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug;

    /// Write the whole buffer to the modem.
    async fn write(&mut self, buf: &[u8]) -> Result<(), Self::Error>;
}

/// Transport over any `embedded-io-async` writer, typically the TX half of a
/// UART driver.
pub struct UartTransport<W> {
    tx: W,
}

impl<W: Write> UartTransport<W> {
    pub fn new(tx: W) -> Self {
        Self { tx }
    }

    /// Give the writer back.
    pub fn into_inner(self) -> W {
        self.tx
    }
}

impl<W: Write> ModemTransport for UartTransport<W> {
    type Error = W::Error;

    async fn write(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.tx.write_all(buf).await?;
        // Flush so the command actually leaves before we start waiting.
        self.tx.flush().await
    }
}

impl<T: ModemTransport + ?Sized> ModemTransport for &mut T {
    type Error = T::Error;

    async fn write(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        (**self).write(buf).await
    }
}

/// Receive loop for drivers without a per-byte interrupt hook.
///
/// Reads chunks from `rx` and feeds them to `framer` until the reader fails
/// or reports end of stream.
pub async fn pump_rx<R: Read>(mut rx: R, framer: &SerialFramer) -> Result<(), R::Error> {
    let mut chunk = [0u8; 64];
    loop {
        match rx.read(&mut chunk).await {
            Ok(0) => {
                warn!("transport: rx stream ended");
                return Ok(());
            }
            Ok(n) => framer.on_bytes(&chunk[..n]),
            Err(e) => {
                warn!("transport: rx read failed");
                return Err(e);
            }
        }
    }
}

//! # Pub/Sub Messaging over an AT-Command Modem
//!
//! `myrtio-at-mqtt` is the `no_std`, asynchronous messaging layer of a sensor
//! node that reaches its MQTT broker through a companion modem speaking the
//! ESP-AT command set over a UART. It is built on the
//! [Embassy](https://embassy.dev/) synchronisation and timer primitives.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** every buffer is a fixed-capacity `heapless`
//!   type sized in [`config`].
//! - **Interrupt-safe receive path:** [`SerialFramer::on_byte_received`] can
//!   run in the UART interrupt; it only takes short critical sections.
//! - **One command in flight:** [`AtClient`] correlates each command with the
//!   first line starting with its expected prefix. A late answer to a
//!   timed-out command is discarded.
//! - **MQTT wildcards:** subscriptions accept `+` and `#`; incoming messages
//!   are dispatched to every matching subscriber exactly once.
//! - **Node/twin topic protocol:** [`Protocol`] builds `DATA`, `HEARTBEAT`,
//!   `START`, `STOP`, `COMMAND` and `LOST` topics for the node itself and for
//!   its twins.
//!
//! ## Architecture
//!
//! ```ignore
//! static FRAMER: SerialFramer = SerialFramer::new();
//!
//! // UART RX interrupt or task:
//! FRAMER.on_byte_received(byte);
//!
//! // Bring-up:
//! let client: &'static SharedClient<_> = CLIENT.init(Mutex::new(AtClient::new(UartTransport::new(tx), &FRAMER)));
//! let mut manager = ConnectionManager::new(client, &FRAMER, ConnectionOptions::default());
//! manager.init_chip().await;
//! bringup::connect_until_successful(&mut manager, &credentials, bringup::RETRY_DELAY).await;
//! bringup::connect_broker_until_successful(&mut manager, &broker, bringup::RETRY_DELAY).await;
//!
//! // Messaging:
//! let identity = Identity::new("eip://uni-due.de/es", "enV5")?;
//! let endpoint = ENDPOINT.init(Endpoint::<_, 8>::new(client, &FRAMER, identity, EndpointOptions::default()));
//! let protocol = Protocol::new(endpoint);
//! protocol.publish_heartbeat("enV5").await?;
//! endpoint.run().await;
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through the `log` crate with the `log` feature, or
//! through `defmt` with the `defmt` feature. With neither, nothing is
//! emitted.

#![cfg_attr(not(test), no_std)]

// Must stay first so the logging macros are visible in every module.
#[macro_use]
mod fmt;

pub mod bringup;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod framer;
pub mod identity;
pub mod outbox;
pub mod protocol;
pub mod topic;
pub mod transport;

// Re-export key types for easier access at the crate root.
pub use config::{ConnectionOptions, EndpointOptions};
pub use connection::{BrokerOptions, ConnectionManager, ConnectionStatus, Credentials};
pub use endpoint::{Endpoint, Posting, Subscriber};
pub use error::{Error, ProtocolError, TopicError};
pub use framer::client::SharedClient;
pub use framer::{AtClient, SerialFramer};
pub use identity::{Identity, Scope};
pub use protocol::{MessageKind, Protocol, Segment};
pub use transport::{ModemTransport, UartTransport};

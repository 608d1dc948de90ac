//! # Connection Management
//!
//! Brings the modem from power-on to a network link and an MQTT broker
//! session, and keeps track of where it currently stands.
//!
//! ```text
//!  NotReady ──init_chip──▶ Ready
//!                            │
//!        LinkDown ──connect──▶ LinkUp ──connect_broker──▶ BrokerUp
//!           ▲                    │                           │
//!           └─────disconnect─────┘◀────disconnect_broker─────┘
//! ```
//!
//! A `CLOSED` line from the modem drops both the link and the broker
//! session (see [`ConnectionManager::poll_link_closed`]).

use core::fmt::Write as _;

use embassy_time::Timer;

use crate::config::ConnectionOptions;
use crate::endpoint::wire::{Command, LINK_ID, push_quoted};
use crate::error::Error;
use crate::framer::SerialFramer;
use crate::framer::client::SharedClient;
use crate::transport::ModemTransport;

const PROBE: &str = "AT";
const SOFT_RESET: &str = "AT+RST";
const ECHO_OFF: &str = "ATE0";
const SINGLE_CONNECTION: &str = "AT+CIPMUX=0";
const LEAVE: &str = "AT+CWQAP";
const OK: &str = "OK";
const GOT_IP: &str = "WIFI GOT IP";
const BROKER_CONNECTED: &str = "+MQTTCONNECTED";

/// Whether the modem answered its probe and was configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipStatus {
    NotReady,
    Ready,
}

/// Wi-Fi association of the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    Disconnected,
    Connected,
}

/// MQTT session state of the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BrokerStatus {
    Disconnected,
    Connected,
}

/// Snapshot of the modem, network and broker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionStatus {
    pub chip: ChipStatus,
    pub link: LinkStatus,
    pub broker: BrokerStatus,
}

impl ConnectionStatus {
    pub const fn new() -> Self {
        Self {
            chip: ChipStatus::NotReady,
            link: LinkStatus::Disconnected,
            broker: BrokerStatus::Disconnected,
        }
    }

    pub fn is_online(&self) -> bool {
        self.link == LinkStatus::Connected && self.broker == BrokerStatus::Connected
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Network credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

impl<'a> Credentials<'a> {
    pub const fn new(ssid: &'a str, password: &'a str) -> Self {
        Self { ssid, password }
    }
}

/// Where and how to open the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerOptions<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    /// Let the modem reconnect on its own after a broker drop.
    pub reconnect: bool,
}

impl<'a> BrokerOptions<'a> {
    pub const fn new(host: &'a str, port: u16, client_id: &'a str) -> Self {
        Self {
            host,
            port,
            client_id,
            username: "",
            password: "",
            reconnect: false,
        }
    }

    pub const fn with_auth(mut self, username: &'a str, password: &'a str) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    pub const fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }
}

fn join_command(credentials: &Credentials<'_>) -> Option<Command> {
    let mut cmd = Command::new();
    cmd.push_str("AT+CWJAP=").ok()?;
    push_quoted(&mut cmd, credentials.ssid).ok()?;
    cmd.push(',').ok()?;
    push_quoted(&mut cmd, credentials.password).ok()?;
    Some(cmd)
}

fn user_config_command(broker: &BrokerOptions<'_>) -> Option<Command> {
    let mut cmd = Command::new();
    // scheme 1: MQTT over TCP
    write!(cmd, "AT+MQTTUSERCFG={},1,", LINK_ID).ok()?;
    push_quoted(&mut cmd, broker.client_id).ok()?;
    cmd.push(',').ok()?;
    push_quoted(&mut cmd, broker.username).ok()?;
    cmd.push(',').ok()?;
    push_quoted(&mut cmd, broker.password).ok()?;
    cmd.push_str(",0,0,\"\"").ok()?;
    Some(cmd)
}

fn broker_connect_command(broker: &BrokerOptions<'_>) -> Option<Command> {
    let mut cmd = Command::new();
    write!(cmd, "AT+MQTTCONN={},", LINK_ID).ok()?;
    push_quoted(&mut cmd, broker.host).ok()?;
    write!(cmd, ",{},{}", broker.port, u8::from(broker.reconnect)).ok()?;
    Some(cmd)
}

fn broker_clean_command() -> Option<Command> {
    let mut cmd = Command::new();
    write!(cmd, "AT+MQTTCLEAN={}", LINK_ID).ok()?;
    Some(cmd)
}

/// Drives the modem through bring-up and tracks [`ConnectionStatus`].
pub struct ConnectionManager<'a, T: ModemTransport> {
    client: &'a SharedClient<'a, T>,
    framer: &'a SerialFramer,
    options: ConnectionOptions,
    status: ConnectionStatus,
}

impl<'a, T: ModemTransport> ConnectionManager<'a, T> {
    /// `framer` must be the framer `client` was created with.
    pub fn new(
        client: &'a SharedClient<'a, T>,
        framer: &'a SerialFramer,
        options: ConnectionOptions,
    ) -> Self {
        Self {
            client,
            framer,
            options,
            status: ConnectionStatus::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Reset the modem and wait until it answers, however long that takes.
    /// Then switch off echo and multiplexing.
    pub async fn init_chip(&mut self) {
        self.status = ConnectionStatus::new();
        let mut client = self.client.lock().await;

        self.soft_reset(&mut client).await;
        while !client
            .probe(PROBE, OK, self.options.probe_timeout)
            .await
        {
            warn!("connection: modem not responding, retrying");
            Timer::after(self.options.probe_retry_delay).await;
            self.soft_reset(&mut client).await;
        }
        debug!("connection: modem responding");

        if !client
            .probe(ECHO_OFF, OK, self.options.config_timeout)
            .await
        {
            warn!("connection: could not disable echo");
        }

        let mut retries_left = self.options.config_retries;
        while !client
            .probe(SINGLE_CONNECTION, OK, self.options.config_timeout)
            .await
        {
            warn!("connection: could not select single connection mode");
            if retries_left == 0 {
                break;
            }
            retries_left -= 1;
        }

        self.status.chip = ChipStatus::Ready;
        info!("connection: modem ready");
    }

    async fn soft_reset(&self, client: &mut crate::framer::AtClient<'a, T>) {
        if client.write_line(SOFT_RESET).await.is_err() {
            warn!("connection: reset command could not be written");
        }
        Timer::after(self.options.reset_settle).await;
        // Boot chatter must not leak into the next exchange.
        self.framer.reset();
    }

    /// Join the network.
    pub async fn connect(&mut self, credentials: &Credentials<'_>) -> Result<(), Error<T::Error>> {
        if self.status.chip != ChipStatus::Ready {
            warn!("connection: modem not ready");
            return Err(Error::ChipNotReady);
        }
        if self.status.link == LinkStatus::Connected {
            warn!("connection: already connected");
            return Err(Error::AlreadyConnected);
        }
        let cmd = join_command(credentials).ok_or(Error::CommandTooLong)?;

        let mut client = self.client.lock().await;
        match client
            .send_command(&cmd, GOT_IP, self.options.join_timeout)
            .await
        {
            Ok(_) => {
                self.status.link = LinkStatus::Connected;
                info!("connection: joined {}", credentials.ssid);
                Ok(())
            }
            Err(Error::Transport(e)) => {
                self.status.link = LinkStatus::Disconnected;
                Err(Error::Transport(e))
            }
            Err(e) => {
                self.status.link = LinkStatus::Disconnected;
                warn!("connection: failed to join {}: {}", credentials.ssid, e.describe());
                Err(Error::LinkJoinFailure)
            }
        }
    }

    /// Leave the network. On failure the status is left as it was.
    pub async fn disconnect(&mut self) -> Result<(), Error<T::Error>> {
        if self.status.chip != ChipStatus::Ready {
            return Err(Error::ChipNotReady);
        }
        if self.status.link == LinkStatus::Disconnected {
            debug!("connection: no link to leave");
            return Err(Error::NotConnected);
        }

        let mut client = self.client.lock().await;
        match client
            .send_command(LEAVE, OK, self.options.leave_timeout)
            .await
        {
            Ok(_) => {
                self.status.link = LinkStatus::Disconnected;
                self.status.broker = BrokerStatus::Disconnected;
                info!("connection: left network");
                Ok(())
            }
            Err(Error::Transport(e)) => Err(Error::Transport(e)),
            Err(e) => {
                warn!("connection: failed to leave network: {}", e.describe());
                Err(Error::LinkLeaveFailure)
            }
        }
    }

    /// Configure the MQTT user and open the broker session.
    pub async fn connect_broker(&mut self, broker: &BrokerOptions<'_>) -> Result<(), Error<T::Error>> {
        if self.status.chip != ChipStatus::Ready {
            return Err(Error::ChipNotReady);
        }
        if self.status.link != LinkStatus::Connected {
            return Err(Error::NotConnected);
        }
        if self.status.broker == BrokerStatus::Connected {
            return Err(Error::AlreadyConnected);
        }
        let user = user_config_command(broker).ok_or(Error::CommandTooLong)?;
        let conn = broker_connect_command(broker).ok_or(Error::CommandTooLong)?;

        let mut client = self.client.lock().await;
        let timeout = self.options.broker_timeout;
        let outcome = match client.send_command(&user, OK, timeout).await {
            Ok(_) => client.send_command(&conn, BROKER_CONNECTED, timeout).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(_) => {
                self.status.broker = BrokerStatus::Connected;
                info!("connection: broker session open at {}:{}", broker.host, broker.port);
                Ok(())
            }
            Err(Error::Transport(e)) => Err(Error::Transport(e)),
            Err(e) => {
                warn!("connection: broker {} refused: {}", broker.host, e.describe());
                Err(Error::BrokerRefused)
            }
        }
    }

    /// Close the broker session.
    pub async fn disconnect_broker(&mut self) -> Result<(), Error<T::Error>> {
        if self.status.broker == BrokerStatus::Disconnected {
            return Err(Error::NotConnected);
        }
        let cmd = broker_clean_command().ok_or(Error::CommandTooLong)?;

        let mut client = self.client.lock().await;
        client
            .send_command(&cmd, OK, self.options.broker_timeout)
            .await
            .inspect_err(|e| warn!("connection: broker close failed: {}", e.describe()))?;
        self.status.broker = BrokerStatus::Disconnected;
        info!("connection: broker session closed");
        Ok(())
    }

    /// Apply a pending `CLOSED` report. Returns `true` if there was one.
    pub fn poll_link_closed(&mut self) -> bool {
        if !self.framer.take_closed() {
            return false;
        }
        warn!("connection: modem reported CLOSED");
        self.status.link = LinkStatus::Disconnected;
        self.status.broker = BrokerStatus::Disconnected;
        true
    }

    /// Wait for the modem to report `CLOSED`, then mark everything down.
    pub async fn wait_link_closed(&mut self) {
        self.framer.wait_closed().await;
        warn!("connection: modem reported CLOSED");
        self.status.link = LinkStatus::Disconnected;
        self.status.broker = BrokerStatus::Disconnected;
    }
}

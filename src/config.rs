//! Capacities and runtime options.
//!
//! Buffers are sized at compile time so nothing on the receive path ever
//! allocates. Timeouts and retry counts are runtime options with `with_*`
//! builders and defaults that suit ESP-AT firmware.

use embassy_time::Duration;

/// Longest line accepted from the modem, terminator excluded.
pub const LINE_CAPACITY: usize = 512;

/// Asynchronous publish lines buffered between the receive path and the
/// endpoint task.
pub const INBOUND_QUEUE_DEPTH: usize = 4;

/// Longest AT command line, terminator excluded.
pub const COMMAND_CAPACITY: usize = 512;

/// Longest expected-response prefix for a synchronous command.
pub const MAX_EXPECTED_LEN: usize = 32;

/// Longest single topic segment (twin name, data id, service name).
pub const MAX_SEGMENT_LEN: usize = 32;

/// Longest message kind tag (`HEARTBEAT`).
pub const MAX_KIND_LEN: usize = 9;

/// Capacity of a protocol-level topic: `<twin>/<kind>/<id>`.
pub const TOPIC_CAPACITY: usize = MAX_SEGMENT_LEN + 1 + MAX_KIND_LEN + 1 + MAX_SEGMENT_LEN;

/// Longest identity domain, e.g. `eip://uni-due.de/es`.
pub const MAX_DOMAIN_LEN: usize = 64;

/// Longest identity client id.
pub const MAX_CLIENT_ID_LEN: usize = 32;

/// Capacity of a topic as it goes on the wire, identity prefix included.
pub const FULL_TOPIC_CAPACITY: usize = MAX_DOMAIN_LEN + 1 + MAX_CLIENT_ID_LEN + 1 + TOPIC_CAPACITY;

/// Largest payload carried by a queued posting.
pub const MAX_PAYLOAD_LEN: usize = 128;

/// Timeouts and retry policy for bringing the modem and network up.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    /// Timeout for a single `AT` liveness probe.
    pub probe_timeout: Duration,
    /// Delay between two failed liveness probes.
    pub probe_retry_delay: Duration,
    /// Time the modem needs after `AT+RST` before it answers again.
    pub reset_settle: Duration,
    /// Timeout for the configuration commands sent after the probe.
    pub config_timeout: Duration,
    /// Extra attempts for a failed configuration command.
    pub config_retries: u8,
    /// Timeout for joining the network.
    pub join_timeout: Duration,
    /// Timeout for leaving the network.
    pub leave_timeout: Duration,
    /// Timeout for each broker session command.
    pub broker_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(100),
            probe_retry_delay: Duration::from_millis(1000),
            reset_settle: Duration::from_millis(500),
            config_timeout: Duration::from_millis(100),
            config_retries: 2,
            join_timeout: Duration::from_secs(10),
            leave_timeout: Duration::from_millis(5000),
            broker_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionOptions {
    /// Same as [`Default::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set [`Self::probe_timeout`].
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set [`Self::probe_retry_delay`].
    pub fn with_probe_retry_delay(mut self, delay: Duration) -> Self {
        self.probe_retry_delay = delay;
        self
    }

    /// Set [`Self::reset_settle`].
    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    /// Set [`Self::config_timeout`].
    pub fn with_config_timeout(mut self, timeout: Duration) -> Self {
        self.config_timeout = timeout;
        self
    }

    /// Set [`Self::config_retries`].
    pub fn with_config_retries(mut self, retries: u8) -> Self {
        self.config_retries = retries;
        self
    }

    /// Set [`Self::join_timeout`].
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Set [`Self::leave_timeout`].
    pub fn with_leave_timeout(mut self, timeout: Duration) -> Self {
        self.leave_timeout = timeout;
        self
    }

    /// Set [`Self::broker_timeout`].
    pub fn with_broker_timeout(mut self, timeout: Duration) -> Self {
        self.broker_timeout = timeout;
        self
    }
}

/// Options for the publish/subscribe commands issued by the endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EndpointOptions {
    /// Timeout for a publish, subscribe or unsubscribe acknowledgement.
    pub command_timeout: Duration,
    /// Extra attempts for a subscribe that was not acknowledged.
    pub subscribe_retries: u8,
    /// MQTT QoS level requested from the modem (0 or 1).
    pub qos: u8,
    /// Publish with the retain flag set.
    pub retain: bool,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(1000),
            subscribe_retries: 3,
            qos: 0,
            retain: false,
        }
    }
}

impl EndpointOptions {
    /// Same as [`Default::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set [`Self::command_timeout`].
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set [`Self::subscribe_retries`].
    pub fn with_subscribe_retries(mut self, retries: u8) -> Self {
        self.subscribe_retries = retries;
        self
    }

    /// Set the QoS level; anything above 1 is clamped, the modem link has no
    /// use for exactly-once delivery.
    pub fn with_qos(mut self, qos: u8) -> Self {
        self.qos = qos.min(1);
        self
    }

    /// Set [`Self::retain`].
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

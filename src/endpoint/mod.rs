//! # Communication Endpoint
//!
//! The endpoint turns `(topic, payload)` publishes into modem commands and
//! turns asynchronous publish notifications from the modem into deliveries to
//! local subscribers.
//!
//! Subscribers are plain objects implementing [`Subscriber`]; they are called
//! synchronously from the task that runs [`Endpoint::run`] (or calls
//! [`Endpoint::process_next`]), never from the receive interrupt.
//!
//! ```ignore
//! static FRAMER: SerialFramer = SerialFramer::new();
//!
//! let client = mk_static!(SharedClient<'static, Uart>, Mutex::new(AtClient::new(uart, &FRAMER)));
//! let endpoint = mk_static!(Endpoint<'static, Uart, 8>, Endpoint::new(client, &FRAMER, identity, EndpointOptions::default()));
//!
//! endpoint.subscribe_remote("twin/DATA/+", &PRINTER).await?;
//! spawner.must_spawn(endpoint_task(endpoint));
//! ```

pub mod table;
pub mod wire;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::config::EndpointOptions;
use crate::error::{Error, ProtocolError};
use crate::framer::SerialFramer;
use crate::framer::client::SharedClient;
use crate::identity::{FullTopic, Identity, Scope};
use crate::topic;
use crate::transport::ModemTransport;

pub use table::{Inserted, Removed, Subscription, SubscriptionTable};
use wire::PublishForm;

/// A message as delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting<'a> {
    /// Full topic the message was published on.
    pub topic: &'a str,
    /// Raw payload bytes.
    pub data: &'a [u8],
}

impl<'a> Posting<'a> {
    /// Payload as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&'a str> {
        core::str::from_utf8(self.data).ok()
    }
}

/// Receiver of messages for a subscribed pattern.
pub trait Subscriber: Sync {
    /// Called once per matching message, on the dispatching task.
    fn deliver(&self, posting: &Posting<'_>);
}

impl<F> Subscriber for F
where
    F: Fn(&Posting<'_>) + Sync,
{
    fn deliver(&self, posting: &Posting<'_>) {
        self(posting)
    }
}

/// Publish/subscribe dispatcher on top of the modem link.
pub struct Endpoint<'a, T: ModemTransport, const MAX_SUBS: usize> {
    client: &'a SharedClient<'a, T>,
    framer: &'a SerialFramer,
    identity: Identity,
    options: EndpointOptions,
    table: Mutex<CriticalSectionRawMutex, RefCell<SubscriptionTable<'a, MAX_SUBS>>>,
}

impl<'a, T: ModemTransport, const MAX_SUBS: usize> Endpoint<'a, T, MAX_SUBS> {
    /// `framer` must be the framer `client` was created with.
    pub fn new(
        client: &'a SharedClient<'a, T>,
        framer: &'a SerialFramer,
        identity: Identity,
        options: EndpointOptions,
    ) -> Self {
        Self {
            client,
            framer,
            identity,
            options,
            table: Mutex::new(RefCell::new(SubscriptionTable::new())),
        }
    }

    /// The framer inbound notifications are read from.
    pub fn framer(&self) -> &'a SerialFramer {
        self.framer
    }

    /// Identity used to qualify every topic.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Number of (pattern, subscriber) entries.
    pub fn subscription_count(&self) -> usize {
        self.table.lock(|t| t.borrow().len())
    }

    /// Returns `true` if some subscriber is registered for exactly `pattern`
    /// (already qualified with the identity prefix).
    pub fn is_subscribed(&self, full_pattern: &str) -> bool {
        self.table.lock(|t| t.borrow().has_pattern(full_pattern))
    }

    /// Publish on one of this node's own topics.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), Error<T::Error>> {
        self.publish_scoped(Scope::Local, topic, payload).await
    }

    /// Publish on a twin's topic.
    pub async fn publish_remote(&self, topic: &str, payload: &[u8]) -> Result<(), Error<T::Error>> {
        self.publish_scoped(Scope::Remote, topic, payload).await
    }

    /// Subscribe to a pattern in this node's namespace.
    pub async fn subscribe(
        &self,
        pattern: &str,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.subscribe_scoped(Scope::Local, pattern, subscriber).await
    }

    /// Subscribe to a pattern in the twins' namespace.
    pub async fn subscribe_remote(
        &self,
        pattern: &str,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.subscribe_scoped(Scope::Remote, pattern, subscriber).await
    }

    /// Drop `subscriber` from a pattern in this node's namespace.
    pub async fn unsubscribe(
        &self,
        pattern: &str,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.unsubscribe_scoped(Scope::Local, pattern, subscriber).await
    }

    /// Drop `subscriber` from a pattern in the twins' namespace.
    pub async fn unsubscribe_remote(
        &self,
        pattern: &str,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.unsubscribe_scoped(Scope::Remote, pattern, subscriber).await
    }

    /// Publish `payload` on `topic` qualified for `scope`.
    ///
    /// Payloads that cannot travel inside the command line are streamed
    /// after the modem's `>` prompt.
    pub async fn publish_scoped(
        &self,
        scope: Scope,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), Error<T::Error>> {
        topic::validate_concrete(topic)?;
        let full = self.identity.qualify(scope, topic)?;
        let form = wire::publish(&full, payload, self.options.qos, self.options.retain)
            .map_err(|_| Error::CommandTooLong)?;
        let timeout = self.options.command_timeout;

        let mut client = self.client.lock().await;
        match form {
            PublishForm::Inline(cmd) => {
                client.send_command(&cmd, "OK", timeout).await?;
            }
            PublishForm::Raw(header) => {
                client.send_command(&header, ">", timeout).await?;
                client
                    .send_raw(payload, wire::RAW_PUBLISH_OK, timeout)
                    .await?;
            }
        }
        trace!("endpoint: published {} bytes to {}", payload.len(), full.as_str());
        Ok(())
    }

    /// Register `subscriber` for `pattern` qualified for `scope`.
    ///
    /// The modem is asked to subscribe only for a pattern nobody holds yet;
    /// the entry is added once it acknowledged.
    pub async fn subscribe_scoped(
        &self,
        scope: Scope,
        pattern: &str,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        topic::validate_pattern(pattern)?;
        let full = self.identity.qualify(scope, pattern)?;

        let (outcome, full_table) = self.table.lock(|t| {
            let t = t.borrow();
            (t.probe(&full, subscriber), t.is_full())
        });
        if outcome != Inserted::Duplicate && full_table {
            return Err(Error::TableFull);
        }

        match outcome {
            Inserted::Duplicate => return Ok(()),
            Inserted::ExistingPattern => {}
            Inserted::NewPattern => self.request_subscription(&full).await?,
        }

        let inserted = self.table.lock(|t| t.borrow_mut().insert(&full, subscriber));
        if inserted.is_err() {
            // The table filled up while the modem was busy.
            if outcome == Inserted::NewPattern && !self.is_subscribed(&full) {
                self.release_subscription(&full).await;
            }
            return Err(Error::TableFull);
        }
        debug!("endpoint: subscribed to {}", full.as_str());
        Ok(())
    }

    /// Remove `subscriber` from `pattern` qualified for `scope`. Removing
    /// an absent entry is a no-op; the modem hears about it only when the
    /// last subscriber of the pattern goes.
    pub async fn unsubscribe_scoped(
        &self,
        scope: Scope,
        pattern: &str,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        let full = self.identity.qualify(scope, pattern)?;
        let removed = self.table.lock(|t| t.borrow_mut().remove(&full, subscriber));
        if removed != Removed::LastForPattern {
            return Ok(());
        }

        self.release_subscription(&full).await;
        Ok(())
    }

    /// Best-effort `AT+MQTTUNSUB`; a missing acknowledgement is only logged.
    async fn release_subscription(&self, full: &FullTopic) {
        let Ok(cmd) = wire::unsubscribe(full) else {
            warn!("endpoint: unsubscribe from {} does not fit a command", full.as_str());
            return;
        };
        let mut client = self.client.lock().await;
        if let Err(e) = client
            .send_command(&cmd, "OK", self.options.command_timeout)
            .await
        {
            warn!("endpoint: unsubscribe from {} not acknowledged: {}", full.as_str(), e.describe());
        }
    }

    async fn request_subscription(&self, full: &FullTopic) -> Result<(), Error<T::Error>> {
        let cmd = wire::subscribe(full, self.options.qos).map_err(|_| Error::CommandTooLong)?;
        let mut client = self.client.lock().await;
        let mut attempts_left = self.options.subscribe_retries;
        loop {
            match client
                .send_command(&cmd, "OK", self.options.command_timeout)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if attempts_left == 0 => {
                    warn!("endpoint: subscribe to {} failed: {}", full.as_str(), e.describe());
                    return Err(e);
                }
                Err(e) => {
                    debug!("endpoint: subscribe to {} retrying: {}", full.as_str(), e.describe());
                    attempts_left -= 1;
                }
            }
        }
    }

    /// Handle one asynchronous publish line. Returns how many subscribers
    /// received the message.
    pub fn on_async_line(&self, line: &[u8]) -> Result<usize, ProtocolError> {
        let posting = wire::parse_async_line(line).inspect_err(|e| {
            warn!("endpoint: dropped notification of {} bytes: {}", line.len(), e.describe());
        })?;

        let subscribers = self.table.lock(|t| t.borrow().matching(posting.topic));
        if subscribers.is_empty() {
            trace!("endpoint: no subscriber for {}", posting.topic);
        }
        for subscriber in subscribers.iter() {
            subscriber.deliver(&posting);
        }
        Ok(subscribers.len())
    }

    /// Wait for the next asynchronous publish line and dispatch it.
    pub async fn process_next(&self) {
        let line = self.framer.receive_async_line().await;
        let _ = self.on_async_line(&line);
    }

    /// Dispatch every line that is already queued. Returns the number of
    /// lines handled.
    pub fn process_pending(&self) -> usize {
        let mut handled = 0;
        while let Some(line) = self.framer.try_receive_async_line() {
            let _ = self.on_async_line(&line);
            handled += 1;
        }
        handled
    }

    /// Dispatch loop for a dedicated task.
    pub async fn run(&self) -> ! {
        loop {
            self.process_next().await;
        }
    }
}

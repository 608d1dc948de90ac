//! # Topic Protocol
//!
//! Structured topics on top of the [`Endpoint`]. A node's own topics look
//! like `<kind>[/<id>]`, a twin's topics like `<twin>/<kind>[/<id>]`, where
//! `kind` is one of the fixed [`MessageKind`] tags.
//!
//! ```ignore
//! let protocol = Protocol::new(endpoint);
//! let temp = Segment::new("temp")?;
//!
//! protocol.publish_data(temp, b"21.5").await?;
//! protocol.subscribe_for_data(Segment::new("twinX")?, temp, &PRINTER).await?;
//! ```

use heapless::String;

use crate::config::{MAX_SEGMENT_LEN, TOPIC_CAPACITY};
use crate::endpoint::{Endpoint, Subscriber};
use crate::error::{Error, TopicError};
use crate::topic::DELIMITER;
use crate::transport::ModemTransport;

/// A protocol topic before the identity prefix is applied.
pub type Topic = String<TOPIC_CAPACITY>;

/// Payload of an "on" command.
pub const ON: &[u8] = b"1";
/// Payload of an "off" command.
pub const OFF: &[u8] = b"0";

/// Kind of message, the middle segment of every protocol topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageKind {
    /// Sensor reading, payload is the value.
    Data,
    /// Liveness announcement.
    Heartbeat,
    /// Request to start publishing a data id.
    Start,
    /// Request to stop publishing a data id.
    Stop,
    /// Instruction for a service, e.g. an LED.
    Command,
    /// Last will, set by the broker when a node vanishes.
    Lost,
}

impl MessageKind {
    /// The topic segment for this kind.
    pub const fn tag(self) -> &'static str {
        match self {
            MessageKind::Data => "DATA",
            MessageKind::Heartbeat => "HEARTBEAT",
            MessageKind::Start => "START",
            MessageKind::Stop => "STOP",
            MessageKind::Command => "COMMAND",
            MessageKind::Lost => "LOST",
        }
    }
}

/// A single topic segment: non-empty, without `/`, at most
/// [`MAX_SEGMENT_LEN`] bytes. Wildcards are allowed so that subscriptions
/// can use `+` for the twin or id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a>(&'a str);

impl<'a> Segment<'a> {
    /// Check `value` and wrap it.
    pub fn new(value: &'a str) -> Result<Self, TopicError> {
        if value.is_empty() {
            return Err(TopicError::Empty);
        }
        if value.contains(DELIMITER) {
            return Err(TopicError::ContainsDelimiter);
        }
        if value.len() > MAX_SEGMENT_LEN {
            return Err(TopicError::TooLong);
        }
        Ok(Self(value))
    }

    /// The segment text.
    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

impl<'a> TryFrom<&'a str> for Segment<'a> {
    type Error = TopicError;

    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

fn build(parts: &[&str]) -> Topic {
    let mut topic = Topic::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            let _ = topic.push(DELIMITER);
        }
        // TOPIC_CAPACITY fits two segments, a tag and two delimiters.
        let _ = topic.push_str(part);
    }
    topic
}

/// `<kind>[/<id>]`
pub fn local_topic(kind: MessageKind, id: Option<Segment<'_>>) -> Topic {
    match id {
        Some(id) => build(&[kind.tag(), id.as_str()]),
        None => build(&[kind.tag()]),
    }
}

/// `<twin>/<kind>[/<id>]`
pub fn remote_topic(twin: Segment<'_>, kind: MessageKind, id: Option<Segment<'_>>) -> Topic {
    match id {
        Some(id) => build(&[twin.as_str(), kind.tag(), id.as_str()]),
        None => build(&[twin.as_str(), kind.tag()]),
    }
}

/// Stateless facade that maps protocol operations onto endpoint calls.
pub struct Protocol<'e, 'a, T: ModemTransport, const MAX_SUBS: usize> {
    endpoint: &'e Endpoint<'a, T, MAX_SUBS>,
}

impl<T: ModemTransport, const MAX_SUBS: usize> Clone for Protocol<'_, '_, T, MAX_SUBS> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ModemTransport, const MAX_SUBS: usize> Copy for Protocol<'_, '_, T, MAX_SUBS> {}

impl<'e, 'a, T: ModemTransport, const MAX_SUBS: usize> Protocol<'e, 'a, T, MAX_SUBS> {
    /// Wrap an endpoint.
    pub fn new(endpoint: &'e Endpoint<'a, T, MAX_SUBS>) -> Self {
        Self { endpoint }
    }

    /// The endpoint every call goes through.
    pub fn endpoint(&self) -> &'e Endpoint<'a, T, MAX_SUBS> {
        self.endpoint
    }

    /// Publish on `<kind>[/<id>]` in this node's namespace.
    pub async fn publish(
        &self,
        kind: MessageKind,
        id: Option<Segment<'_>>,
        payload: &[u8],
    ) -> Result<(), Error<T::Error>> {
        self.endpoint
            .publish(&local_topic(kind, id), payload)
            .await
    }

    /// Publish on `<twin>/<kind>[/<id>]`.
    pub async fn publish_remote(
        &self,
        twin: Segment<'_>,
        kind: MessageKind,
        id: Option<Segment<'_>>,
        payload: &[u8],
    ) -> Result<(), Error<T::Error>> {
        self.endpoint
            .publish_remote(&remote_topic(twin, kind, id), payload)
            .await
    }

    /// Subscribe to `<kind>[/<id>]` in this node's namespace.
    pub async fn subscribe(
        &self,
        kind: MessageKind,
        id: Option<Segment<'_>>,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.endpoint
            .subscribe(&local_topic(kind, id), subscriber)
            .await
    }

    /// Subscribe to `<twin>/<kind>[/<id>]`.
    pub async fn subscribe_remote(
        &self,
        twin: Segment<'_>,
        kind: MessageKind,
        id: Option<Segment<'_>>,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.endpoint
            .subscribe_remote(&remote_topic(twin, kind, id), subscriber)
            .await
    }

    /// Undo [`Self::subscribe`].
    pub async fn unsubscribe(
        &self,
        kind: MessageKind,
        id: Option<Segment<'_>>,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.endpoint
            .unsubscribe(&local_topic(kind, id), subscriber)
            .await
    }

    /// Undo [`Self::subscribe_remote`].
    pub async fn unsubscribe_remote(
        &self,
        twin: Segment<'_>,
        kind: MessageKind,
        id: Option<Segment<'_>>,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.endpoint
            .unsubscribe_remote(&remote_topic(twin, kind, id), subscriber)
            .await
    }

    // Own topics.

    /// Publish a reading of `id` on `DATA/<id>`.
    pub async fn publish_data(&self, id: Segment<'_>, value: &[u8]) -> Result<(), Error<T::Error>> {
        self.publish(MessageKind::Data, Some(id), value).await
    }

    /// Announce liveness; the payload names the sender.
    pub async fn publish_heartbeat(&self, who: &str) -> Result<(), Error<T::Error>> {
        self.publish(MessageKind::Heartbeat, None, who.as_bytes())
            .await
    }

    /// Listen for twins asking this node to start publishing `id`.
    pub async fn subscribe_for_start_request(
        &self,
        id: Segment<'_>,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.subscribe(MessageKind::Start, Some(id), subscriber)
            .await
    }

    /// Undo [`Self::subscribe_for_start_request`].
    pub async fn unsubscribe_from_start_request(
        &self,
        id: Segment<'_>,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.unsubscribe(MessageKind::Start, Some(id), subscriber)
            .await
    }

    /// Listen for twins asking this node to stop publishing `id`.
    pub async fn subscribe_for_stop_request(
        &self,
        id: Segment<'_>,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.subscribe(MessageKind::Stop, Some(id), subscriber)
            .await
    }

    /// Undo [`Self::subscribe_for_stop_request`].
    pub async fn unsubscribe_from_stop_request(
        &self,
        id: Segment<'_>,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.unsubscribe(MessageKind::Stop, Some(id), subscriber)
            .await
    }

    /// Listen for commands addressed to `service` on this node.
    pub async fn subscribe_for_command(
        &self,
        service: Segment<'_>,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.subscribe(MessageKind::Command, Some(service), subscriber)
            .await
    }

    /// Undo [`Self::subscribe_for_command`].
    pub async fn unsubscribe_from_command(
        &self,
        service: Segment<'_>,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.unsubscribe(MessageKind::Command, Some(service), subscriber)
            .await
    }

    // Twin topics.

    /// Ask `twin` to start publishing `id`; `receiver` names who wants it.
    pub async fn publish_start_request(
        &self,
        twin: Segment<'_>,
        id: Segment<'_>,
        receiver: &str,
    ) -> Result<(), Error<T::Error>> {
        self.publish_remote(twin, MessageKind::Start, Some(id), receiver.as_bytes())
            .await
    }

    /// Ask `twin` to stop publishing `id`.
    pub async fn publish_stop_request(
        &self,
        twin: Segment<'_>,
        id: Segment<'_>,
        receiver: &str,
    ) -> Result<(), Error<T::Error>> {
        self.publish_remote(twin, MessageKind::Stop, Some(id), receiver.as_bytes())
            .await
    }

    /// Send `command` to `service` on `twin`.
    pub async fn publish_command(
        &self,
        twin: Segment<'_>,
        service: Segment<'_>,
        command: &[u8],
    ) -> Result<(), Error<T::Error>> {
        self.publish_remote(twin, MessageKind::Command, Some(service), command)
            .await
    }

    /// Send [`ON`] to `service` on `twin`.
    pub async fn publish_on_command(
        &self,
        twin: Segment<'_>,
        service: Segment<'_>,
    ) -> Result<(), Error<T::Error>> {
        self.publish_command(twin, service, ON).await
    }

    /// Send [`OFF`] to `service` on `twin`.
    pub async fn publish_off_command(
        &self,
        twin: Segment<'_>,
        service: Segment<'_>,
    ) -> Result<(), Error<T::Error>> {
        self.publish_command(twin, service, OFF).await
    }

    /// Receive readings of `id` published by `twin`.
    pub async fn subscribe_for_data(
        &self,
        twin: Segment<'_>,
        id: Segment<'_>,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.subscribe_remote(twin, MessageKind::Data, Some(id), subscriber)
            .await
    }

    /// Undo [`Self::subscribe_for_data`].
    pub async fn unsubscribe_from_data(
        &self,
        twin: Segment<'_>,
        id: Segment<'_>,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.unsubscribe_remote(twin, MessageKind::Data, Some(id), subscriber)
            .await
    }

    /// Receive heartbeats of `source`; `+` for every node.
    pub async fn subscribe_for_heartbeat(
        &self,
        source: Segment<'_>,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.subscribe_remote(source, MessageKind::Heartbeat, None, subscriber)
            .await
    }

    /// Undo [`Self::subscribe_for_heartbeat`].
    pub async fn unsubscribe_from_heartbeat(
        &self,
        source: Segment<'_>,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.unsubscribe_remote(source, MessageKind::Heartbeat, None, subscriber)
            .await
    }

    /// Learn when `twin` drops off the broker.
    pub async fn subscribe_for_lost(
        &self,
        twin: Segment<'_>,
        subscriber: &'a dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.subscribe_remote(twin, MessageKind::Lost, None, subscriber)
            .await
    }

    /// Undo [`Self::subscribe_for_lost`].
    pub async fn unsubscribe_from_lost(
        &self,
        twin: Segment<'_>,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error<T::Error>> {
        self.unsubscribe_remote(twin, MessageKind::Lost, None, subscriber)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(s: &str) -> Segment<'_> {
        Segment::new(s).unwrap()
    }

    #[test]
    fn local_topics() {
        assert_eq!(local_topic(MessageKind::Data, Some(seg("temp"))).as_str(), "DATA/temp");
        assert_eq!(local_topic(MessageKind::Heartbeat, None).as_str(), "HEARTBEAT");
        assert_eq!(local_topic(MessageKind::Command, Some(seg("led"))).as_str(), "COMMAND/led");
    }

    #[test]
    fn remote_topics() {
        assert_eq!(
            remote_topic(seg("twinX"), MessageKind::Data, Some(seg("temp"))).as_str(),
            "twinX/DATA/temp"
        );
        assert_eq!(
            remote_topic(seg("twinX"), MessageKind::Heartbeat, None).as_str(),
            "twinX/HEARTBEAT"
        );
        assert_eq!(remote_topic(seg("+"), MessageKind::Lost, None).as_str(), "+/LOST");
    }

    #[test]
    fn longest_segments_fit() {
        let long = "s".repeat(MAX_SEGMENT_LEN);
        let topic = remote_topic(seg(&long), MessageKind::Heartbeat, Some(seg(&long)));
        assert_eq!(topic.len(), 2 * MAX_SEGMENT_LEN + 2 + "HEARTBEAT".len());
    }

    #[test]
    fn segment_validation() {
        assert_eq!(Segment::new(""), Err(TopicError::Empty));
        assert_eq!(Segment::new("a/b"), Err(TopicError::ContainsDelimiter));
        assert_eq!(
            Segment::new(&"s".repeat(MAX_SEGMENT_LEN + 1)),
            Err(TopicError::TooLong)
        );
    }
}

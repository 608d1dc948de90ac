//! Queued publishing for tasks that do not own the endpoint.
//!
//! Sensor loops and other producers hand owned postings to a channel through
//! a [`PostingSender`]; the networking task drains them into the
//! [`Endpoint`] with [`Outbox::flush_into`], [`Outbox::forward_next`] or
//! [`Outbox::serve`].

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::{String, Vec};

use crate::config::{MAX_PAYLOAD_LEN, TOPIC_CAPACITY};
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::identity::Scope;
use crate::transport::ModemTransport;

/// A publish with inline storage for topic and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPosting {
    /// Namespace the topic is qualified for.
    pub scope: Scope,
    /// Topic before the identity prefix is applied.
    pub topic: String<TOPIC_CAPACITY>,
    /// Payload bytes.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
}

impl OwnedPosting {
    /// Copy `topic` and `payload` into inline storage.
    pub fn new(scope: Scope, topic: &str, payload: &[u8]) -> Result<Self, PostError> {
        let mut owned_topic = String::new();
        owned_topic
            .push_str(topic)
            .map_err(|_| PostError::TopicTooLong)?;
        let mut owned_payload = Vec::new();
        owned_payload
            .extend_from_slice(payload)
            .map_err(|_| PostError::PayloadTooLarge)?;
        Ok(Self {
            scope,
            topic: owned_topic,
            payload: owned_payload,
        })
    }
}

/// Why a posting was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PostError {
    /// Topic exceeds [`TOPIC_CAPACITY`].
    TopicTooLong,
    /// Payload exceeds [`MAX_PAYLOAD_LEN`].
    PayloadTooLarge,
    /// No room in the channel.
    QueueFull,
}

/// Channel shared by producers and the [`Outbox`].
pub type PostingChannel<const DEPTH: usize> =
    Channel<CriticalSectionRawMutex, OwnedPosting, DEPTH>;

/// Cloneable producer handle.
#[derive(Clone, Copy)]
pub struct PostingSender<'c, const DEPTH: usize> {
    tx: Sender<'c, CriticalSectionRawMutex, OwnedPosting, DEPTH>,
}

impl<'c, const DEPTH: usize> PostingSender<'c, DEPTH> {
    /// Producer handle for `channel`.
    pub fn new(channel: &'c PostingChannel<DEPTH>) -> Self {
        Self {
            tx: channel.sender(),
        }
    }

    /// Queue a posting, waiting for room if the queue is full.
    pub async fn post(&self, scope: Scope, topic: &str, payload: &[u8]) -> Result<(), PostError> {
        let posting = OwnedPosting::new(scope, topic, payload)?;
        self.tx.send(posting).await;
        Ok(())
    }

    /// Queue a posting without waiting.
    pub fn try_post(&self, scope: Scope, topic: &str, payload: &[u8]) -> Result<(), PostError> {
        let posting = OwnedPosting::new(scope, topic, payload)?;
        self.tx.try_send(posting).map_err(|_| PostError::QueueFull)
    }
}

/// Consumer side, owned by the task that talks to the modem.
pub struct Outbox<'c, const DEPTH: usize> {
    rx: Receiver<'c, CriticalSectionRawMutex, OwnedPosting, DEPTH>,
}

impl<'c, const DEPTH: usize> Outbox<'c, DEPTH> {
    /// Consumer for `channel`.
    pub fn new(channel: &'c PostingChannel<DEPTH>) -> Self {
        Self {
            rx: channel.receiver(),
        }
    }

    /// Number of postings waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Publish everything already queued. A failed publish is logged and
    /// dropped. Returns how many postings were published.
    pub async fn flush_into<T: ModemTransport, const MAX_SUBS: usize>(
        &self,
        endpoint: &Endpoint<'_, T, MAX_SUBS>,
    ) -> usize {
        let mut published = 0;
        while let Ok(posting) = self.rx.try_receive() {
            if Self::forward(endpoint, &posting).await.is_ok() {
                published += 1;
            }
        }
        published
    }

    /// Wait for the next posting and publish it.
    pub async fn forward_next<T: ModemTransport, const MAX_SUBS: usize>(
        &self,
        endpoint: &Endpoint<'_, T, MAX_SUBS>,
    ) -> Result<(), Error<T::Error>> {
        let posting = self.rx.receive().await;
        Self::forward(endpoint, &posting).await
    }

    /// Networking task body: dispatch inbound messages and publish queued
    /// postings, whichever is ready first.
    pub async fn serve<T: ModemTransport, const MAX_SUBS: usize>(
        &self,
        endpoint: &Endpoint<'_, T, MAX_SUBS>,
    ) -> ! {
        loop {
            match select(endpoint.process_next(), self.rx.receive()).await {
                Either::First(()) => {}
                Either::Second(posting) => {
                    let _ = Self::forward(endpoint, &posting).await;
                }
            }
        }
    }

    async fn forward<T: ModemTransport, const MAX_SUBS: usize>(
        endpoint: &Endpoint<'_, T, MAX_SUBS>,
        posting: &OwnedPosting,
    ) -> Result<(), Error<T::Error>> {
        endpoint
            .publish_scoped(posting.scope, &posting.topic, &posting.payload)
            .await
            .inspect_err(|e| {
                warn!("outbox: dropped posting to {}: {}", posting.topic.as_str(), e.describe())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_postings_are_rejected_at_enqueue() {
        let channel = PostingChannel::<2>::new();
        let sender = PostingSender::new(&channel);
        let long_topic = "t".repeat(TOPIC_CAPACITY + 1);
        assert_eq!(
            sender.try_post(Scope::Local, &long_topic, b""),
            Err(PostError::TopicTooLong)
        );
        assert_eq!(
            sender.try_post(Scope::Local, "DATA/x", &[0; MAX_PAYLOAD_LEN + 1]),
            Err(PostError::PayloadTooLarge)
        );
        assert!(channel.is_empty());
    }

    #[test]
    fn full_queue_reports_queue_full() {
        let channel = PostingChannel::<1>::new();
        let sender = PostingSender::new(&channel);
        assert_eq!(sender.try_post(Scope::Remote, "t/START/x", b"me"), Ok(()));
        assert_eq!(
            sender.try_post(Scope::Remote, "t/START/x", b"me"),
            Err(PostError::QueueFull)
        );
        let outbox = Outbox::new(&channel);
        assert_eq!(outbox.len(), 1);
    }
}

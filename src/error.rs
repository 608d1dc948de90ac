//! # Error Types
//!
//! Errors produced by the modem link, the endpoint and the connection manager.
//! Transport failures never escape as panics; every public operation returns
//! one of these values and the caller picks the retry policy.

use core::fmt;

/// The primary error enum of the crate.
///
/// It is generic over the transport error type `T`, so a UART driver error
/// can be carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<T> {
    /// Writing to the underlying transport failed.
    Transport(T),
    /// The expected response to a command did not arrive in time.
    Timeout,
    /// Another synchronous command is still waiting for its response.
    Busy,
    /// The modem has not passed its liveness probe yet.
    ChipNotReady,
    /// The network link is already up.
    AlreadyConnected,
    /// The operation needs a link or broker session that is not up.
    NotConnected,
    /// Joining the network failed or timed out.
    LinkJoinFailure,
    /// Leaving the network failed or timed out.
    LinkLeaveFailure,
    /// The broker did not accept the session.
    BrokerRefused,
    /// The formatted command does not fit into the command buffer.
    CommandTooLong,
    /// A topic or topic segment was rejected.
    Topic(TopicError),
    /// The subscription table has no free slot.
    TableFull,
}

impl<T> Error<T> {
    /// Short static description, usable from log statements regardless of
    /// whether `T` can be formatted by the active logger.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport error",
            Self::Timeout => "command timed out",
            Self::Busy => "command already in flight",
            Self::ChipNotReady => "modem not ready",
            Self::AlreadyConnected => "already connected",
            Self::NotConnected => "not connected",
            Self::LinkJoinFailure => "network join failed",
            Self::LinkLeaveFailure => "network leave failed",
            Self::BrokerRefused => "broker refused session",
            Self::CommandTooLong => "command too long",
            Self::Topic(e) => e.describe(),
            Self::TableFull => "subscription table full",
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Error<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e:?}"),
            other => f.write_str(other.describe()),
        }
    }
}

impl<T> From<TopicError> for Error<T> {
    fn from(err: TopicError) -> Self {
        Error::Topic(err)
    }
}

/// Reasons a topic, topic segment or identity part is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopicError {
    /// The topic or a required segment is empty.
    Empty,
    /// The value exceeds its fixed capacity.
    TooLong,
    /// A single segment contains the `/` delimiter.
    ContainsDelimiter,
    /// A wildcard marker is misplaced (`#` not last, or `+`/`#` inside a segment).
    InvalidWildcard,
    /// A publish-side topic contains a wildcard segment.
    WildcardInConcrete,
}

impl TopicError {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Empty => "empty topic",
            Self::TooLong => "topic too long",
            Self::ContainsDelimiter => "segment contains '/'",
            Self::InvalidWildcard => "misplaced wildcard",
            Self::WildcardInConcrete => "wildcard in concrete topic",
        }
    }
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Problems found on the receive path.
///
/// These are only ever logged: a bad line from the modem must not take the
/// receive path down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An asynchronous publish notification could not be parsed.
    MalformedAsyncLine,
    /// A line exceeded the line buffer and was dropped.
    LineOverflow,
    /// A notification topic was not valid UTF-8.
    InvalidUtf8,
}

impl ProtocolError {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::MalformedAsyncLine => "malformed async line",
            Self::LineOverflow => "line overflow",
            Self::InvalidUtf8 => "invalid utf-8",
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

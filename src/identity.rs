//! Device identity and topic scoping.
//!
//! Every topic that leaves the node is qualified with the node's identity:
//! local topics with `<domain>/<client_id>/`, remote (twin-addressed) topics
//! with `<domain>/` only. The identity is built once at startup and handed to
//! the endpoint.

use core::fmt::Write as _;

use heapless::String;

use crate::config::{FULL_TOPIC_CAPACITY, MAX_CLIENT_ID_LEN, MAX_DOMAIN_LEN, TOPIC_CAPACITY};
use crate::error::TopicError;
use crate::topic::{self, DELIMITER};

/// A topic as it is sent to and received from the broker.
pub type FullTopic = String<FULL_TOPIC_CAPACITY>;

/// Which part of the namespace a topic lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Scope {
    /// This node's own topics.
    Local,
    /// Topics of a twin, addressed by name.
    Remote,
}

/// Device identity: `<domain>/<client_id>` in front of this node's topics,
/// `<domain>` in front of a twin's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    domain: String<MAX_DOMAIN_LEN>,
    client_id: String<MAX_CLIENT_ID_LEN>,
}

impl Identity {
    /// Build an identity. `domain` may span several segments; `client_id` is
    /// a single segment. Either may be empty.
    pub fn new(domain: &str, client_id: &str) -> Result<Self, TopicError> {
        if client_id.contains(DELIMITER) {
            return Err(TopicError::ContainsDelimiter);
        }
        if !domain.is_empty() && !topic::is_concrete(domain) {
            return Err(TopicError::WildcardInConcrete);
        }
        if !client_id.is_empty() && !topic::is_concrete(client_id) {
            return Err(TopicError::WildcardInConcrete);
        }
        let mut id = Self::anonymous();
        id.domain.push_str(domain).map_err(|_| TopicError::TooLong)?;
        id.client_id
            .push_str(client_id)
            .map_err(|_| TopicError::TooLong)?;
        Ok(id)
    }

    /// An identity that adds no prefix at all.
    pub const fn anonymous() -> Self {
        Self {
            domain: String::new(),
            client_id: String::new(),
        }
    }

    /// Namespace shared by all nodes.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// This node's name within the domain.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Prefix `topic` for the given scope.
    pub fn qualify(&self, scope: Scope, topic: &str) -> Result<FullTopic, TopicError> {
        if topic.is_empty() {
            return Err(TopicError::Empty);
        }
        if topic.len() > TOPIC_CAPACITY {
            return Err(TopicError::TooLong);
        }
        let mut full = FullTopic::new();
        let client_id = match scope {
            Scope::Local => self.client_id.as_str(),
            Scope::Remote => "",
        };
        for part in [self.domain.as_str(), client_id] {
            if !part.is_empty() {
                // Capacity covers domain, client id and topic at their maxima.
                let _ = write!(full, "{}{}", part, DELIMITER);
            }
        }
        let _ = full.push_str(topic);
        Ok(full)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_topics_carry_domain_and_client_id() {
        let id = Identity::new("eip://uni-due.de/es", "enV5").unwrap();
        assert_eq!(
            id.qualify(Scope::Local, "DATA/temp").unwrap().as_str(),
            "eip://uni-due.de/es/enV5/DATA/temp"
        );
        assert_eq!(
            id.qualify(Scope::Remote, "twinX/DATA/temp").unwrap().as_str(),
            "eip://uni-due.de/es/twinX/DATA/temp"
        );
    }

    #[test]
    fn empty_parts_are_skipped() {
        let id = Identity::anonymous();
        assert_eq!(id.qualify(Scope::Local, "DATA").unwrap().as_str(), "DATA");
        let id = Identity::new("", "node").unwrap();
        assert_eq!(id.qualify(Scope::Local, "DATA").unwrap().as_str(), "node/DATA");
        assert_eq!(id.qualify(Scope::Remote, "t/DATA").unwrap().as_str(), "t/DATA");
    }

    #[test]
    fn client_id_is_a_single_segment() {
        assert_eq!(Identity::new("d", "a/b"), Err(TopicError::ContainsDelimiter));
        assert_eq!(Identity::new("d/+", "a"), Err(TopicError::WildcardInConcrete));
    }

    #[test]
    fn oversized_topic_is_rejected() {
        let id = Identity::anonymous();
        let long = "x".repeat(TOPIC_CAPACITY + 1);
        assert_eq!(id.qualify(Scope::Local, &long), Err(TopicError::TooLong));
    }
}

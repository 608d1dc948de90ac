//! Subscription table for the endpoint.

use heapless::{String, Vec};

use super::Subscriber;
use crate::config::FULL_TOPIC_CAPACITY;
use crate::topic;

/// One (pattern, subscriber) pair.
pub struct Subscription<'s> {
    pub pattern: String<FULL_TOPIC_CAPACITY>,
    pub subscriber: &'s dyn Subscriber,
}

/// Outcome of [`SubscriptionTable::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// First subscriber for this pattern; the broker must be told.
    NewPattern,
    /// The pattern is already subscribed at the broker.
    ExistingPattern,
    /// This exact pair was already present.
    Duplicate,
}

/// Outcome of [`SubscriptionTable::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removed {
    /// Nothing matched the pair.
    Absent,
    /// Removed; other subscribers still use the pattern.
    Entry,
    /// Removed the last subscriber of the pattern.
    LastForPattern,
}

/// The table is full or the pattern is longer than a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full;

fn same_subscriber(a: &dyn Subscriber, b: &dyn Subscriber) -> bool {
    core::ptr::addr_eq(a as *const dyn Subscriber, b as *const dyn Subscriber)
}

/// Multimap from pattern to subscribers, bounded to `MAX_SUBS` entries.
///
/// Subscriber identity is the address of the subscriber object, so the same
/// object subscribed under two patterns is two entries, but is still only
/// delivered once per message.
///
/// # Example
///
/// ```ignore
/// let mut table = SubscriptionTable::<8>::new();
/// table.insert("es/twin/DATA/+", &printer)?;
/// for subscriber in table.matching("es/twin/DATA/temp") {
///     subscriber.deliver(&posting);
/// }
/// ```
pub struct SubscriptionTable<'s, const MAX_SUBS: usize> {
    entries: Vec<Subscription<'s>, MAX_SUBS>,
}

impl<'s, const MAX_SUBS: usize> SubscriptionTable<'s, MAX_SUBS> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Returns `true` if any subscriber uses exactly this pattern.
    pub fn has_pattern(&self, pattern: &str) -> bool {
        self.entries.iter().any(|e| e.pattern == pattern)
    }

    fn position(&self, pattern: &str, subscriber: &dyn Subscriber) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.pattern == pattern && same_subscriber(e.subscriber, subscriber))
    }

    /// Classify what inserting the pair would do, without inserting.
    pub fn probe(&self, pattern: &str, subscriber: &dyn Subscriber) -> Inserted {
        if self.position(pattern, subscriber).is_some() {
            Inserted::Duplicate
        } else if self.has_pattern(pattern) {
            Inserted::ExistingPattern
        } else {
            Inserted::NewPattern
        }
    }

    /// Add a pair. Duplicates are not stored twice.
    pub fn insert(&mut self, pattern: &str, subscriber: &'s dyn Subscriber) -> Result<Inserted, Full> {
        let outcome = self.probe(pattern, subscriber);
        if outcome == Inserted::Duplicate {
            return Ok(outcome);
        }
        let mut owned = String::new();
        owned.push_str(pattern).map_err(|_| Full)?;
        self.entries
            .push(Subscription {
                pattern: owned,
                subscriber,
            })
            .map_err(|_| Full)?;
        Ok(outcome)
    }

    /// Remove a pair. Removing an absent pair is not an error.
    pub fn remove(&mut self, pattern: &str, subscriber: &dyn Subscriber) -> Removed {
        let Some(index) = self.position(pattern, subscriber) else {
            return Removed::Absent;
        };
        self.entries.swap_remove(index);
        if self.has_pattern(pattern) {
            Removed::Entry
        } else {
            Removed::LastForPattern
        }
    }

    /// Distinct subscribers whose pattern matches the concrete `topic`.
    pub fn matching(&self, topic: &str) -> Vec<&'s dyn Subscriber, MAX_SUBS> {
        let mut found: Vec<&'s dyn Subscriber, MAX_SUBS> = Vec::new();
        for entry in self.entries.iter() {
            if !topic::matches(&entry.pattern, topic) {
                continue;
            }
            if found.iter().any(|s| same_subscriber(*s, entry.subscriber)) {
                continue;
            }
            // `found` has the same capacity as `entries`.
            let _ = found.push(entry.subscriber);
        }
        found
    }

    /// Iterate over the subscribed patterns (with repetitions).
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.pattern.as_str())
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the table has no free slot left.
    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<const MAX_SUBS: usize> Default for SubscriptionTable<'_, MAX_SUBS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::endpoint::Posting;

    struct Counter(AtomicUsize);

    impl Subscriber for Counter {
        fn deliver(&self, _posting: &Posting<'_>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn insert_reports_pattern_novelty() {
        let a = Counter(AtomicUsize::new(0));
        let b = Counter(AtomicUsize::new(0));
        let mut table = SubscriptionTable::<4>::new();
        assert_eq!(table.insert("x/+", &a), Ok(Inserted::NewPattern));
        assert_eq!(table.insert("x/+", &b), Ok(Inserted::ExistingPattern));
        assert_eq!(table.insert("x/+", &a), Ok(Inserted::Duplicate));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_reports_last_subscriber() {
        let a = Counter(AtomicUsize::new(0));
        let b = Counter(AtomicUsize::new(0));
        let mut table = SubscriptionTable::<4>::new();
        table.insert("x", &a).unwrap();
        table.insert("x", &b).unwrap();
        assert_eq!(table.remove("x", &a), Removed::Entry);
        assert_eq!(table.remove("x", &a), Removed::Absent);
        assert_eq!(table.remove("x", &b), Removed::LastForPattern);
        assert!(table.is_empty());
    }

    #[test]
    fn full_table_rejects_inserts() {
        let a = Counter(AtomicUsize::new(0));
        let mut table = SubscriptionTable::<1>::new();
        table.insert("x", &a).unwrap();
        assert_eq!(table.insert("y", &a), Err(Full));
        assert!(table.is_full());
    }

    #[test]
    fn matching_is_distinct_per_subscriber() {
        let a = Counter(AtomicUsize::new(0));
        let b = Counter(AtomicUsize::new(0));
        let mut table = SubscriptionTable::<4>::new();
        table.insert("x/#", &a).unwrap();
        table.insert("x/+", &a).unwrap();
        table.insert("x/y", &b).unwrap();
        table.insert("z", &b).unwrap();
        assert_eq!(table.matching("x/y").len(), 2);
        assert_eq!(table.matching("x/q").len(), 1);
        assert_eq!(table.matching("q").len(), 0);
    }
}

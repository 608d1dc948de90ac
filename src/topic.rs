//! # Topic Matching
//!
//! Topics are `/`-separated segment lists. Subscription patterns may use the
//! MQTT wildcards:
//!
//! - `+` matches exactly one segment, so `a/+` does **not** match `a`;
//! - `#` matches zero or more trailing segments and must be the last segment.
//!
//! Matching walks both topics segment by segment with lazy iterators.

use crate::error::TopicError;

/// Segment delimiter.
pub const DELIMITER: char = '/';
/// Single-level wildcard segment.
pub const SINGLE_LEVEL: &str = "+";
/// Multi-level wildcard segment.
pub const MULTI_LEVEL: &str = "#";

/// Lazily split a topic into its segments.
pub fn segments(topic: &str) -> core::str::Split<'_, char> {
    topic.split(DELIMITER)
}

/// Returns `true` if the concrete `topic` satisfies the subscription `pattern`.
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut wanted = segments(pattern);
    let mut given = segments(topic);

    loop {
        match (wanted.next(), given.next()) {
            (Some(MULTI_LEVEL), _) => return true,
            (Some(SINGLE_LEVEL), Some(_)) => {}
            (Some(w), Some(g)) if w == g => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Plain equality, no wildcard semantics.
pub fn equal(a: &str, b: &str) -> bool {
    a == b
}

/// Returns `true` if `topic` holds no wildcard segment.
pub fn is_concrete(topic: &str) -> bool {
    segments(topic).all(|s| s != SINGLE_LEVEL && s != MULTI_LEVEL)
}

/// Check that `pattern` is a well-formed subscription pattern.
pub fn validate_pattern(pattern: &str) -> Result<(), TopicError> {
    if pattern.is_empty() {
        return Err(TopicError::Empty);
    }
    let mut iter = segments(pattern).peekable();
    while let Some(segment) = iter.next() {
        match segment {
            MULTI_LEVEL if iter.peek().is_some() => return Err(TopicError::InvalidWildcard),
            MULTI_LEVEL | SINGLE_LEVEL => {}
            s if s.contains(['+', '#']) => return Err(TopicError::InvalidWildcard),
            _ => {}
        }
    }
    Ok(())
}

/// Check that `topic` can be published to.
pub fn validate_concrete(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if !is_concrete(topic) {
        return Err(TopicError::WildcardInConcrete);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_wildcard_needs_exactly_one_segment() {
        assert!(matches("a/+/c", "a/b/c"));
        assert!(!matches("a/+/c", "a/b/b/c"));
        assert!(!matches("a/+/c", "a/c"));
        assert!(!matches("a/+", "a"));
        assert!(matches("a/+", "a/b"));
        assert!(!matches("a/+", "a/b/c"));
    }

    #[test]
    fn multi_level_wildcard_takes_the_rest() {
        assert!(matches("a/#", "a"));
        assert!(matches("a/#", "a/b"));
        assert!(matches("a/#", "a/b/c"));
        assert!(!matches("a/#", "b"));
        assert!(matches("#", "a"));
        assert!(matches("#", "a/b/c"));
    }

    #[test]
    fn literal_patterns_degenerate_to_equality() {
        for (p, t) in [("a/b", "a/b"), ("a/b", "a/c"), ("a", "a/b"), ("a/b", "a")] {
            assert_eq!(matches(p, t), equal(p, t), "{p} vs {t}");
        }
    }

    #[test]
    fn empty_segments_are_compared_literally() {
        assert!(matches("a//c", "a//c"));
        assert!(matches("a/+/c", "a//c"));
        assert!(!matches("a/b/", "a/b"));
    }

    #[test]
    fn pattern_validation() {
        assert_eq!(validate_pattern("a/+/c"), Ok(()));
        assert_eq!(validate_pattern("#"), Ok(()));
        assert_eq!(validate_pattern("a/#"), Ok(()));
        assert_eq!(validate_pattern(""), Err(TopicError::Empty));
        assert_eq!(validate_pattern("a/#/c"), Err(TopicError::InvalidWildcard));
        assert_eq!(validate_pattern("a/b+/c"), Err(TopicError::InvalidWildcard));
    }

    #[test]
    fn concrete_validation() {
        assert_eq!(validate_concrete("twin/DATA/temp"), Ok(()));
        assert_eq!(validate_concrete("twin/+/temp"), Err(TopicError::WildcardInConcrete));
        assert_eq!(validate_concrete(""), Err(TopicError::Empty));
    }
}

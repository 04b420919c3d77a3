//! Compound key construction: `K = topic ⊕ separator ⊕ timer_id`.
//!
//! `topic` and `timer_id` must be non-empty and must not contain the
//! separator, so that `K` is a bijection onto its components:
//! `split(join(topic, timer_id)) == (topic, timer_id)`.

use crate::error::TimerError;

/// Validate that an identifier (`topic` or `timer_id`) is non-empty and does
/// not contain `separator`.
pub fn validate_identifier(value: &str, separator: &str) -> Result<(), TimerError> {
    if value.is_empty() || value.contains(separator) {
        return Err(TimerError::InvalidIdentifier(value.to_string()));
    }
    Ok(())
}

/// Build the compound store key `K` from a validated `topic` and `timer_id`.
pub fn join(topic: &str, timer_id: &str, separator: &str) -> String {
    format!("{topic}{separator}{timer_id}")
}

/// Split a compound key `K` back into `(topic, timer_id)` on the first
/// occurrence of `separator`. Returns `None` if the separator is absent,
/// which the dispatch loop treats as a corrupted entry.
pub fn split<'a>(key: &'a str, separator: &str) -> Option<(&'a str, &'a str)> {
    key.find(separator)
        .map(|idx| (&key[..idx], &key[idx + separator.len()..]))
}

//! Stateless filters over event and adaptation histories
//!
//! Both functions take a snapshot slice and return a new vector, so they can
//! be called on copies outside of any lock.

use super::HistoryEntry;

/// Keep entries whose guarantee id and agreement term both match
pub fn filter_by_identity<T>(entries: &[T], guarantee_id: &str, agreement_term: &str) -> Vec<T>
where
    T: HistoryEntry + Clone,
{
    entries
        .iter()
        .filter(|e| e.guarantee_id() == guarantee_id && e.agreement_term() == agreement_term)
        .cloned()
        .collect()
}

/// Keep entries with `time >= now - retention_secs`.
///
/// A zero retention window keeps nothing.
pub fn filter_by_age<T>(entries: &[T], retention_secs: u64, now: i64) -> Vec<T>
where
    T: HistoryEntry + Clone,
{
    if retention_secs == 0 {
        return Vec::new();
    }
    let cutoff = now.saturating_sub(i64::try_from(retention_secs).unwrap_or(i64::MAX));
    entries
        .iter()
        .filter(|e| e.time() >= cutoff)
        .cloned()
        .collect()
}

/// Entries for the identity that are still inside the retention window
pub fn relevant<T>(
    entries: &[T],
    guarantee_id: &str,
    agreement_term: &str,
    retention_secs: u64,
    now: i64,
) -> Vec<T>
where
    T: HistoryEntry + Clone,
{
    filter_by_age(
        &filter_by_identity(entries, guarantee_id, agreement_term),
        retention_secs,
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventType, Operator};

    fn event(guarantee: &str, term: &str, time: i64) -> Event {
        Event::new(guarantee, term, time, 10.0, 5.0, EventType::Breach, Operator::Gt)
    }

    #[test]
    fn test_filter_by_identity_requires_both_fields() {
        let events = vec![
            event("g-1", "power", 10),
            event("g-1", "energy", 11),
            event("g-2", "power", 12),
            event("g-1", "power", 13),
        ];

        let filtered = filter_by_identity(&events, "g-1", "power");
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|e| e.guarantee_id == "g-1" && e.agreement_term == "power"));
    }

    #[test]
    fn test_filter_by_age() {
        let events = vec![event("g", "t", 100), event("g", "t", 150), event("g", "t", 200)];

        let kept = filter_by_age(&events, 60, 200);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].time, 150);

        // Boundary is inclusive
        let kept = filter_by_age(&events, 100, 200);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_zero_retention_discards_everything() {
        let events = vec![event("g", "t", 200)];
        assert!(filter_by_age(&events, 0, 200).is_empty());
    }

    #[test]
    fn test_huge_retention_keeps_everything() {
        let events = vec![event("g", "t", -1_000_000_000_000), event("g", "t", 0), event("g", "t", 200)];
        assert_eq!(filter_by_age(&events, u64::MAX, 200).len(), 3);
        assert_eq!(filter_by_age(&events, i64::MAX as u64 + 1, 200).len(), 3);
    }

    #[test]
    fn test_filtering_filtered_history_is_noop() {
        let events = vec![event("g", "t", 100), event("g", "t", 150), event("g", "t", 200)];
        let once = filter_by_age(&events, 60, 200);
        let twice = filter_by_age(&once, 60, 200);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_relevant_combines_filters() {
        let events = vec![
            event("g", "t", 10),
            event("g", "t", 95),
            event("g", "other", 99),
            event("h", "t", 99),
        ];
        let kept = relevant(&events, "g", "t", 10, 100);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].time, 95);
    }
}

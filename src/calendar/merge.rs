//! Grouping of occurrences into master + exceptions.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::event::RawOccurrence;

const SYNTHETIC_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_3a2e_9d4b_4f0a_8e57_21c9_b0d3_7a15);

/// Decides which occurrences describe the same logical event.
pub trait IdentityStrategy: Send + Sync {
    fn identity(&self, occurrence: &RawOccurrence) -> String;
}

/// `UID` when present, otherwise a UUIDv5 of title and start instant.
/// Two distinct same-named events at the same instant will be conflated.
#[derive(Debug, Clone, Copy, Default)]
pub struct UidOrSynthesized;

impl IdentityStrategy for UidOrSynthesized {
    fn identity(&self, occurrence: &RawOccurrence) -> String {
        match &occurrence.uid {
            Some(uid) => uid.clone(),
            None => synthesized_identity(&occurrence.title, occurrence.start.instant),
        }
    }
}

pub fn synthesized_identity(title: &str, start: DateTime<Utc>) -> String {
    let key = format!("{title}|{}", start.to_rfc3339());
    format!("synthetic-{}", Uuid::new_v5(&SYNTHETIC_NAMESPACE, key.as_bytes()))
}

/// All occurrences sharing one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedGroup {
    pub identity: String,
    pub master: RawOccurrence,
    pub exceptions: BTreeMap<NaiveDate, RawOccurrence>,
    /// Further master occurrences that collapsed into the first.
    pub duplicates: usize,
    /// The master is a promoted exception.
    pub promoted: bool,
}

struct PendingGroup {
    identity: String,
    master: Option<RawOccurrence>,
    /// Insertion order is kept so promotion picks the first seen.
    exceptions: Vec<(NaiveDate, RawOccurrence)>,
    duplicates: usize,
}

impl PendingGroup {
    fn add(&mut self, occurrence: RawOccurrence) {
        match occurrence.recurrence_date {
            Some(date) => {
                if let Some(slot) = self.exceptions.iter_mut().find(|(d, _)| *d == date) {
                    tracing::debug!(
                        "Exception for {} on {date} overwritten by occurrence #{}",
                        self.identity,
                        occurrence.number
                    );
                    slot.1 = occurrence;
                } else {
                    self.exceptions.push((date, occurrence));
                }
            }
            None if self.master.is_none() => self.master = Some(occurrence),
            None => {
                tracing::debug!(
                    "Duplicate occurrence #{} of {} collapsed",
                    occurrence.number,
                    self.identity
                );
                self.duplicates += 1;
            }
        }
    }

    fn finish(mut self) -> Option<MergedGroup> {
        let (master, promoted) = match self.master.take() {
            Some(master) => (master, false),
            None if !self.exceptions.is_empty() => {
                let (date, first) = self.exceptions.remove(0);
                tracing::warn!(
                    "{} has no master occurrence, promoting exception for {date}",
                    self.identity
                );
                (first, true)
            }
            None => return None,
        };
        Some(MergedGroup {
            identity: self.identity,
            master,
            exceptions: self.exceptions.into_iter().collect(),
            duplicates: self.duplicates,
            promoted,
        })
    }
}

/// Single pass grouping; groups come back in first-seen order.
pub fn merge_occurrences(
    occurrences: Vec<RawOccurrence>,
    strategy: &dyn IdentityStrategy,
) -> Vec<MergedGroup> {
    let mut groups: Vec<PendingGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for occurrence in occurrences {
        let identity = strategy.identity(&occurrence);
        let slot = *index.entry(identity.clone()).or_insert_with(|| {
            groups.push(PendingGroup {
                identity,
                master: None,
                exceptions: Vec::new(),
                duplicates: 0,
            });
            groups.len() - 1
        });
        groups[slot].add(occurrence);
    }

    groups.into_iter().filter_map(PendingGroup::finish).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::time_utils::{ResolvedTime, TimeSource};
    use chrono::TimeZone;

    fn occurrence(number: usize, title: &str, uid: Option<&str>, recurrence: Option<(i32, u32, u32)>) -> RawOccurrence {
        RawOccurrence {
            number,
            title: title.to_string(),
            description: None,
            location: None,
            start: ResolvedTime {
                instant: Utc.with_ymd_and_hms(2025, 10, 19, 1, 0, 0).unwrap(),
                source: TimeSource::Zoned,
                zone: Some("America/New_York".into()),
            },
            end: None,
            rrule: None,
            uid: uid.map(str::to_string),
            recurrence_date: recurrence.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            attributes: None,
        }
    }

    #[test]
    fn master_and_exception_merge_into_one_group() {
        let groups = merge_occurrences(
            vec![
                occurrence(1, "GOLDILOXX", Some("X"), None),
                occurrence(2, "GOLDILOXX", Some("X"), Some((2025, 10, 25))),
            ],
            &UidOrSynthesized,
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].identity, "X");
        assert_eq!(groups[0].master.number, 1);
        assert_eq!(groups[0].exceptions.len(), 1);
        assert!(!groups[0].promoted);
    }

    #[test]
    fn duplicate_masters_collapse() {
        let groups = merge_occurrences(
            vec![
                occurrence(1, "GOLDILOXX", Some("X"), None),
                occurrence(2, "GOLDILOXX", Some("X"), None),
            ],
            &UidOrSynthesized,
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].duplicates, 1);
        assert_eq!(groups[0].master.number, 1);
    }

    #[test]
    fn later_exception_for_same_date_wins() {
        let groups = merge_occurrences(
            vec![
                occurrence(1, "A", Some("X"), None),
                occurrence(2, "A", Some("X"), Some((2025, 10, 25))),
                occurrence(3, "A", Some("X"), Some((2025, 10, 25))),
            ],
            &UidOrSynthesized,
        );
        let exception = groups[0]
            .exceptions
            .get(&NaiveDate::from_ymd_opt(2025, 10, 25).unwrap())
            .unwrap();
        assert_eq!(exception.number, 3);
    }

    #[test]
    fn first_exception_is_promoted_without_master() {
        let groups = merge_occurrences(
            vec![
                occurrence(1, "A", Some("X"), Some((2025, 11, 1))),
                occurrence(2, "A", Some("X"), Some((2025, 10, 25))),
            ],
            &UidOrSynthesized,
        );
        assert_eq!(groups.len(), 1);
        assert!(groups[0].promoted);
        assert_eq!(groups[0].master.number, 1);
        assert_eq!(groups[0].exceptions.len(), 1);
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let groups = merge_occurrences(
            vec![
                occurrence(1, "B", Some("b"), None),
                occurrence(2, "A", Some("a"), None),
                occurrence(3, "B", Some("b"), Some((2025, 10, 25))),
            ],
            &UidOrSynthesized,
        );
        let ids: Vec<_> = groups.iter().map(|g| g.identity.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn missing_uid_groups_by_title_and_start() {
        let groups = merge_occurrences(
            vec![
                occurrence(1, "Same", None, None),
                occurrence(2, "Same", None, None),
                occurrence(3, "Other", None, None),
            ],
            &UidOrSynthesized,
        );
        assert_eq!(groups.len(), 2);
        assert!(groups[0].identity.starts_with("synthetic-"));
        assert_eq!(groups[0].duplicates, 1);
    }

    #[test]
    fn identity_strategy_is_replaceable() {
        struct ByTitle;
        impl IdentityStrategy for ByTitle {
            fn identity(&self, occurrence: &RawOccurrence) -> String {
                occurrence.title.to_lowercase()
            }
        }
        let groups = merge_occurrences(
            vec![
                occurrence(1, "Bear Night", Some("one"), None),
                occurrence(2, "BEAR NIGHT", Some("two"), None),
            ],
            &ByTitle,
        );
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn synthesized_identity_is_deterministic() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(synthesized_identity("A", start), synthesized_identity("A", start));
        assert_ne!(synthesized_identity("A", start), synthesized_identity("B", start));
    }
}

//! Collapses records sharing a business key down to one survivor per key.
use std::cmp::Ordering;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{FailureReason, RecordFailure};
use crate::normalization::{EntityDescriptor, FieldValue, NormalizedRecord, Survivorship};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Resolution {
    /// Survivors in order of first appearance of their key.
    pub records: Vec<NormalizedRecord>,
    /// Keys that appeared more than once.
    pub duplicate_groups: usize,
    /// Records dropped in favour of a survivor.
    pub discarded: usize,
    /// Records with no usable key or comparison value.
    pub unkeyable: usize,
    pub failures: Vec<RecordFailure>,
}

fn compare(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::Date(x), FieldValue::Date(y)) => Some(x.cmp(y)),
        (FieldValue::Integer(x), FieldValue::Integer(y)) => Some(x.cmp(y)),
        (FieldValue::Decimal(x), FieldValue::Decimal(y)) => Some(x.cmp(y)),
        (FieldValue::Text(x), FieldValue::Text(y)) => Some(x.cmp(y)),
        (FieldValue::Boolean(x), FieldValue::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DuplicateResolver<'d> {
    descriptor: &'d EntityDescriptor,
}

impl<'d> DuplicateResolver<'d> {
    pub fn new(descriptor: &'d EntityDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn resolve(&self, records: Vec<NormalizedRecord>) -> Resolution {
        let mut groups: IndexMap<String, (NormalizedRecord, usize)> = IndexMap::new();
        let mut out = Resolution::default();
        let rule = self.descriptor.survivorship;

        for record in records {
            let Some(key) = record.key(self.descriptor) else {
                out.unkeyable += 1;
                out.failures.push(RecordFailure {
                    key: String::new(),
                    reason: FailureReason::Unkeyable {
                        field: self.descriptor.business_key,
                    },
                });
                continue;
            };
            if let Survivorship::EarliestBy(field) = rule {
                if record.get(field).is_null() {
                    out.unkeyable += 1;
                    out.failures.push(RecordFailure {
                        key,
                        reason: FailureReason::Unkeyable { field },
                    });
                    continue;
                }
            }
            match groups.get_mut(&key) {
                None => {
                    groups.insert(key, (record, 1));
                }
                Some((kept, seen)) => {
                    *seen += 1;
                    let replace = match rule {
                        Survivorship::FirstSeen => false,
                        Survivorship::LastSeen => true,
                        Survivorship::EarliestBy(field) => {
                            compare(record.get(field), kept.get(field)) == Some(Ordering::Less)
                        }
                    };
                    if replace {
                        *kept = record;
                    }
                }
            }
        }

        for (key, (record, seen)) in groups {
            if seen > 1 {
                out.duplicate_groups += 1;
                out.discarded += seen - 1;
                debug!(entity = self.descriptor.kind.label(), %key, copies = seen, "collapsed duplicates");
            }
            out.records.push(record);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::entities;
    use chrono::NaiveDate;

    fn obs(id: Option<&str>, date: Option<&str>, company: &str) -> NormalizedRecord {
        let mut rec = NormalizedRecord::new().with("marketing_company", FieldValue::Text(company.into()));
        rec.set(
            "campaign_id",
            id.map_or(FieldValue::Null, |v| FieldValue::Text(v.into())),
        );
        rec.set(
            "campaign_observation_date",
            date.map_or(FieldValue::Null, |d| {
                FieldValue::Date(NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap())
            }),
        );
        rec
    }

    #[test]
    fn keeps_earliest_observation() {
        let d = entities::campaign();
        let res = DuplicateResolver::new(&d).resolve(vec![
            obs(Some("A"), Some("2025-01-05"), "late"),
            obs(Some("B"), Some("2025-02-01"), "other"),
            obs(Some("A"), Some("2025-01-01"), "early"),
        ]);
        assert_eq!(res.records.len(), 2);
        assert_eq!(res.duplicate_groups, 1);
        assert_eq!(res.discarded, 1);
        assert_eq!(res.records[0].get("marketing_company").as_text(), Some("early"));
        assert_eq!(res.records[1].key(&d).as_deref(), Some("B"));
    }

    #[test]
    fn ties_keep_first_seen() {
        let d = entities::campaign();
        let res = DuplicateResolver::new(&d).resolve(vec![
            obs(Some("A"), Some("2025-01-01"), "first"),
            obs(Some("A"), Some("2025-01-01"), "second"),
            obs(Some("A"), Some("2025-01-03"), "third"),
        ]);
        assert_eq!(res.records.len(), 1);
        assert_eq!(res.discarded, 2);
        assert_eq!(res.records[0].get("marketing_company").as_text(), Some("first"));
    }

    #[test]
    fn unkeyable_records_are_excluded_from_dedup_counts() {
        let d = entities::campaign();
        let res = DuplicateResolver::new(&d).resolve(vec![
            obs(None, Some("2025-01-01"), "no id"),
            obs(Some("A"), None, "no date"),
            obs(Some("A"), Some("2025-01-02"), "ok"),
        ]);
        assert_eq!(res.unkeyable, 2);
        assert_eq!(res.duplicate_groups, 0);
        assert_eq!(res.discarded, 0);
        assert_eq!(res.records.len(), 1);
        assert_eq!(
            res.failures[1].reason,
            FailureReason::Unkeyable {
                field: "campaign_observation_date"
            }
        );
    }

    #[test]
    fn last_seen_replaces() {
        let d = entities::spend_summary();
        let row = |total: &str| {
            NormalizedRecord::new()
                .with("date_coded", FieldValue::Text("2025-W01".into()))
                .with("category", FieldValue::Text(total.into()))
        };
        let res = DuplicateResolver::new(&d).resolve(vec![row("old"), row("new")]);
        assert_eq!(res.records.len(), 1);
        assert_eq!(res.records[0].get("category").as_text(), Some("new"));
    }
}

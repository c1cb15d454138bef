use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use tracing::debug;

use super::field::{self, DateParse, FieldType, FieldValue};

/// Which record stream a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Campaign,
    SpendSummary,
    SubjectLine,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Campaign => "campaign",
            EntityKind::SpendSummary => "spend_summary",
            EntityKind::SubjectLine => "subject_line",
        }
    }
}

/// One mapped column: CSV label to target field.
#[derive(Debug, Clone)]
pub struct Column {
    pub source: &'static str,
    pub target: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

impl Column {
    pub const fn new(source: &'static str, target: &'static str, ty: FieldType) -> Self {
        Self {
            source,
            target,
            ty,
            required: false,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A field computed from already-normalized fields.
#[derive(Clone)]
pub struct Derived {
    pub target: &'static str,
    pub ty: FieldType,
    pub derive: fn(&NormalizedRecord) -> FieldValue,
}

impl fmt::Debug for Derived {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("target", &self.target)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

/// Which record of a duplicate group survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Survivorship {
    /// Keep the smallest value of this field; ties keep the first seen.
    /// Records with a null comparison value are unkeyable.
    EarliestBy(&'static str),
    FirstSeen,
    LastSeen,
}

/// Everything the pipeline needs to know about one entity type.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub table: &'static str,
    pub business_key: &'static str,
    pub columns: Vec<Column>,
    pub derived: Vec<Derived>,
    /// Fields overwritten when the business key already exists.
    pub update_fields: Vec<&'static str>,
    pub survivorship: Survivorship,
}

impl EntityDescriptor {
    /// Source labels that must be present in the CSV header.
    pub fn required_sources(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| c.required)
            .map(|c| c.source)
            .collect()
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().filter(|c| c.required).map(|c| c.target)
    }

    /// Target fields in write order: mapped columns (first occurrence) then derived.
    pub fn field_types(&self) -> IndexMap<&'static str, FieldType> {
        let mut out = IndexMap::new();
        for c in &self.columns {
            out.entry(c.target).or_insert(c.ty);
        }
        for d in &self.derived {
            out.entry(d.target).or_insert(d.ty);
        }
        out
    }

    pub fn is_required(&self, target: &str) -> bool {
        self.columns.iter().any(|c| c.required && c.target == target)
    }
}

/// A typed record keyed by target field name, in descriptor order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedRecord {
    fields: IndexMap<&'static str, FieldValue>,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &'static str, value: FieldValue) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &'static str, value: FieldValue) {
        self.fields.insert(field, value);
    }

    /// Value of `field`; missing fields read as null.
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&FieldValue::Null)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    /// Business key text, if the key field is populated.
    pub fn key(&self, descriptor: &EntityDescriptor) -> Option<String> {
        self.get(descriptor.business_key).key_text()
    }
}

/// A raw CSV row: source label to cell text.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    cells: HashMap<String, String>,
}

impl RawRow {
    pub fn from_record(headers: &csv::StringRecord, record: &csv::StringRecord) -> Self {
        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        Self { cells }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let cells = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { cells }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.cells.get(label).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MapperOptions {
    /// Null out dates whose US and EU readings disagree instead of taking the US one.
    pub reject_ambiguous_dates: bool,
}

/// Result of mapping one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    Admissible(NormalizedRecord),
    /// A required field normalized to null; the first such field is named.
    Inadmissible { missing: &'static str },
}

/// Per-row mapping outcome plus the number of ambiguous date cells it contained.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub mapped: Mapped,
    pub ambiguous_dates: usize,
}

/// Applies an [`EntityDescriptor`] to raw rows.
#[derive(Debug, Clone)]
pub struct RecordMapper<'d> {
    descriptor: &'d EntityDescriptor,
    options: MapperOptions,
}

impl<'d> RecordMapper<'d> {
    pub fn new(descriptor: &'d EntityDescriptor, options: MapperOptions) -> Self {
        Self {
            descriptor,
            options,
        }
    }

    pub fn descriptor(&self) -> &'d EntityDescriptor {
        self.descriptor
    }

    pub fn map_row(&self, row: &RawRow) -> RowOutcome {
        let mut record = NormalizedRecord::new();
        let mut ambiguous_dates = 0usize;
        for col in &self.descriptor.columns {
            let raw = row.get(col.source);
            let value = match col.ty {
                FieldType::Date | FieldType::DatePrefix => {
                    let parsed = if col.ty == FieldType::Date {
                        field::parse_date_checked(raw)
                    } else {
                        field::parse_date_prefix_checked(raw)
                    };
                    self.resolve_date(col, raw, parsed, &mut ambiguous_dates)
                }
                ty => field::normalize(raw, ty),
            };
            record.set(col.target, value);
        }
        for d in &self.descriptor.derived {
            let value = (d.derive)(&record);
            record.set(d.target, value);
        }
        let mapped = match self
            .descriptor
            .required_fields()
            .find(|f| record.get(f).is_null())
        {
            Some(missing) => Mapped::Inadmissible { missing },
            None => Mapped::Admissible(record),
        };
        RowOutcome {
            mapped,
            ambiguous_dates,
        }
    }

    fn resolve_date(
        &self,
        col: &Column,
        raw: Option<&str>,
        parsed: DateParse,
        ambiguous: &mut usize,
    ) -> FieldValue {
        if let DateParse::Ambiguous {
            chosen,
            alternative,
        } = parsed
        {
            *ambiguous += 1;
            debug!(
                column = col.source,
                raw = raw.unwrap_or_default(),
                %chosen,
                %alternative,
                rejected = self.options.reject_ambiguous_dates,
                "ambiguous date"
            );
            if self.options.reject_ambiguous_dates {
                return FieldValue::Null;
            }
        }
        parsed.chosen().map_or(FieldValue::Null, FieldValue::Date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor {
            kind: EntityKind::Campaign,
            table: "t",
            business_key: "id",
            columns: vec![
                Column::new("ID", "id", FieldType::Text).required(),
                Column::new("Seen", "seen", FieldType::Date).required(),
                Column::new("Volume", "volume", FieldType::Integer),
            ],
            derived: vec![Derived {
                target: "label",
                ty: FieldType::Text,
                derive: |r| match r.get("id").as_text() {
                    Some(id) => FieldValue::Text(format!("#{id}")),
                    None => FieldValue::Null,
                },
            }],
            update_fields: vec!["seen"],
            survivorship: Survivorship::EarliestBy("seen"),
        }
    }

    #[test]
    fn maps_and_derives() {
        let d = descriptor();
        let mapper = RecordMapper::new(&d, MapperOptions::default());
        let row = RawRow::from_pairs([
            ("ID", " A1 "),
            ("Seen", "2025-01-02"),
            ("Volume", "12.0"),
            ("Unmapped", "ignored"),
        ]);
        let out = mapper.map_row(&row);
        let Mapped::Admissible(rec) = out.mapped else {
            panic!("expected admissible");
        };
        assert_eq!(rec.get("id"), &FieldValue::Text("A1".into()));
        assert_eq!(rec.get("volume"), &FieldValue::Integer(12));
        assert_eq!(rec.get("label"), &FieldValue::Text("#A1".into()));
        assert!(rec.get("Unmapped").is_null());
        assert_eq!(rec.key(&d).as_deref(), Some("A1"));
    }

    #[test]
    fn missing_required_is_inadmissible() {
        let d = descriptor();
        let mapper = RecordMapper::new(&d, MapperOptions::default());
        let out = mapper.map_row(&RawRow::from_pairs([("ID", "A1"), ("Seen", "not a date")]));
        assert_eq!(out.mapped, Mapped::Inadmissible { missing: "seen" });
    }

    #[test]
    fn ambiguous_dates_counted_and_optionally_rejected() {
        let d = descriptor();
        let row = RawRow::from_pairs([("ID", "A1"), ("Seen", "03/04/2025")]);

        let lenient = RecordMapper::new(&d, MapperOptions::default()).map_row(&row);
        assert_eq!(lenient.ambiguous_dates, 1);
        match lenient.mapped {
            Mapped::Admissible(rec) => assert_eq!(
                rec.get("seen").as_date(),
                NaiveDate::from_ymd_opt(2025, 3, 4)
            ),
            other => panic!("unexpected {other:?}"),
        }

        let strict = RecordMapper::new(
            &d,
            MapperOptions {
                reject_ambiguous_dates: true,
            },
        )
        .map_row(&row);
        assert_eq!(strict.ambiguous_dates, 1);
        assert_eq!(strict.mapped, Mapped::Inadmissible { missing: "seen" });
    }

    #[test]
    fn field_types_preserve_order_and_include_derived() {
        let d = descriptor();
        let names: Vec<_> = d.field_types().keys().copied().collect();
        assert_eq!(names, vec!["id", "seen", "volume", "label"]);
        assert_eq!(d.required_sources(), vec!["ID", "Seen"]);
    }
}

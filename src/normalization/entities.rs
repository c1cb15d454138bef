//! Descriptor tables for the three CSV exports the importers understand.
use sha2::{Digest, Sha256};

use super::field::FieldType::{Boolean, Date, DatePrefix, Decimal, Integer, Text};
use super::field::FieldValue;
use super::record::{
    Column, Derived, EntityDescriptor, EntityKind, NormalizedRecord, Survivorship,
};

const THUMBNAIL_BASE: &str = "https://via.placeholder.com/150x100";

fn campaign_thumbnail(record: &NormalizedRecord) -> FieldValue {
    let url = match record.get("marketing_company").as_text() {
        Some(company) => format!(
            "{THUMBNAIL_BASE}/4F46E5/FFFFFF?text={}",
            company.replace(' ', "+")
        ),
        None => format!("{THUMBNAIL_BASE}/6B7280/FFFFFF?text=Unknown"),
    };
    FieldValue::Text(url)
}

/// Marketing campaign observations, one row per campaign id.
pub fn campaign() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::Campaign,
        table: "marketing_campaigns",
        business_key: "campaign_id",
        columns: vec![
            Column::new("Campaign ID", "campaign_id", Text).required(),
            Column::new("Campaign Observation Date", "campaign_observation_date", Date).required(),
            Column::new("Media Channel", "media_channel", Text).required(),
            Column::new("Marketing Company", "marketing_company", Text).required(),
            Column::new("Industry", "industry", Text).required(),
            Column::new("Subindustry", "subindustry", Text),
            Column::new("Product Type", "product_type", Text),
            Column::new("Brand", "brand", Text),
            Column::new("Product", "product", Text),
            Column::new("Bundled Products", "bundled_products", Text),
            Column::new("Properties", "properties", Text),
            Column::new("Affiliated Company", "affiliated_company", Text),
            Column::new("Post Link", "post_link", Text),
            Column::new("Landing Page", "landing_page", Text),
            Column::new("Campaign Observation Country", "campaign_observation_country", Text),
            Column::new("Estimated Volume", "estimated_volume", Integer),
            Column::new("Estimated Spend", "estimated_spend", Decimal),
            Column::new("Email - Inbox Rate", "email_inbox_rate", Text),
            Column::new("Email - Spam Rate", "email_spam_rate", Text),
            Column::new("Email - Read Rate", "email_read_rate", Text),
            Column::new("Email - Delete Rate", "email_delete_rate", Text),
            Column::new(
                "Email - Delete Without Read Rate",
                "email_delete_without_read_rate",
                Text,
            ),
            Column::new("Subject Line", "subject_line", Text),
            Column::new("Email- Sender Domain", "email_sender_domain", Text),
            Column::new("Social - Post Type", "social_post_type", Text),
            Column::new("Social - Engagement", "social_engagement", Text),
            Column::new("Digital - Domain Ad Seen On", "digital_domain_ad_seen_on", Text),
            Column::new("Panelist Location", "panelist_location", Text),
            Column::new("Metro Area", "metro_area", Text),
            Column::new("Is General Branding", "is_general_branding", Boolean),
            Column::new("Text Content", "text_content", Text),
            Column::new("Day Part", "day_part", Text),
            Column::new("Ad Duration (seconds)", "ad_duration_seconds", Integer),
            Column::new("Channel", "channel", Text),
            Column::new("Program", "program", Text),
        ],
        derived: vec![Derived {
            target: "thumbnail_url",
            ty: Text,
            derive: campaign_thumbnail,
        }],
        update_fields: vec![
            "campaign_observation_date",
            "media_channel",
            "marketing_company",
            "industry",
            "estimated_volume",
            "estimated_spend",
        ],
        survivorship: Survivorship::EarliestBy("campaign_observation_date"),
    }
}

/// Spend columns of the periodic summary export, label then field.
const SPEND_COLUMNS: [(&str, &str); 22] = [
    ("Chime", "chime"),
    ("Credit Karma", "credit_karma"),
    ("Self Financial, Inc.", "self_financial"),
    ("American Express", "american_express"),
    ("Capital One", "capital_one"),
    ("Discover", "discover"),
    ("Dave", "dave"),
    ("Earnin", "earnin"),
    ("Empower Finance, Inc.", "empower_finance"),
    ("MoneyLion", "moneylion"),
    ("Ally", "ally"),
    ("Current", "current"),
    ("One Finance", "one_finance"),
    ("Varo", "varo"),
    ("Rocket Money", "rocket_money"),
    ("SoFI", "sofi"),
    ("CashApp", "cashapp"),
    ("PayPal", "paypal"),
    ("Venmo", "venmo"),
    ("Bank of America", "bank_of_america"),
    ("Chase", "chase"),
    ("Wells Fargo", "wells_fargo"),
];

/// Periodic spend totals per company, keyed by the coded date label.
pub fn spend_summary() -> EntityDescriptor {
    let mut columns = vec![Column::new("DATE (Coded)", "date_coded", Text).required()];
    columns.extend(
        SPEND_COLUMNS
            .iter()
            .map(|&(source, target)| Column::new(source, target, Decimal)),
    );
    columns.push(Column::new("YEAR", "year", Text));
    columns.push(Column::new("Grand Total", "grand_total", Decimal));
    columns.push(Column::new("Category", "category", Text));

    let update_fields = columns
        .iter()
        .map(|c| c.target)
        .filter(|t| *t != "date_coded")
        .collect();

    EntityDescriptor {
        kind: EntityKind::SpendSummary,
        table: "spend_summary",
        business_key: "date_coded",
        columns,
        derived: Vec::new(),
        update_fields,
        survivorship: Survivorship::LastSeen,
    }
}

/// Stable composite key for a subject line observation.
fn subject_line_key(record: &NormalizedRecord) -> FieldValue {
    let Some(subject) = record.get("subject_line").key_text() else {
        return FieldValue::Null;
    };
    let mut hasher = Sha256::new();
    for part in [
        Some(subject),
        record.get("company").key_text(),
        record.get("date_sent").key_text(),
    ] {
        hasher.update(part.unwrap_or_default().as_bytes());
        hasher.update(b"\x1f");
    }
    let digest = hasher.finalize();
    FieldValue::Text(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// Email subject lines with deliverability rates; the text is embedded later.
pub fn subject_line() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::SubjectLine,
        table: "subject_lines",
        business_key: "line_key",
        columns: vec![
            Column::new("Subject", "subject_line", Text).required(),
            Column::new("Read Rate", "open_rate", Decimal).required(),
            Column::new("Date", "date_sent", DatePrefix),
            Column::new("Company", "company", Text),
            Column::new("Sub-Industry", "sub_industry", Text),
            Column::new("Mailing Type", "mailing_type", Text),
            Column::new("Inbox Rate", "inbox_rate", Decimal),
            Column::new("Spam Rate", "spam_rate", Decimal),
            Column::new("Read Rate", "read_rate", Decimal),
            Column::new("Read & Delete Rate", "read_delete_rate", Decimal),
            Column::new("Delete Without Read Rate", "delete_without_read_rate", Decimal),
            Column::new("Projected Volume", "projected_volume", Integer),
        ],
        derived: vec![Derived {
            target: "line_key",
            ty: Text,
            derive: subject_line_key,
        }],
        update_fields: vec![
            "open_rate",
            "sub_industry",
            "mailing_type",
            "inbox_rate",
            "spam_rate",
            "read_rate",
            "read_delete_rate",
            "delete_without_read_rate",
            "projected_volume",
        ],
        survivorship: Survivorship::FirstSeen,
    }
}

pub fn descriptor_for(kind: EntityKind) -> EntityDescriptor {
    match kind {
        EntityKind::Campaign => campaign(),
        EntityKind::SpendSummary => spend_summary(),
        EntityKind::SubjectLine => subject_line(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::record::{Mapped, MapperOptions, RawRow, RecordMapper};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn campaign_thumbnail_uses_company_name() {
        let d = campaign();
        let row = RawRow::from_pairs([
            ("Campaign ID", "X1"),
            ("Campaign Observation Date", "2025-01-01"),
            ("Media Channel", "email"),
            ("Marketing Company", "Acme Corp"),
            ("Industry", "Finance"),
            ("Estimated Spend", "1500.25"),
            ("Is General Branding", "TRUE"),
        ]);
        let Mapped::Admissible(rec) = RecordMapper::new(&d, MapperOptions::default()).map_row(&row).mapped else {
            panic!("campaign row should be admissible");
        };
        assert_eq!(
            rec.get("thumbnail_url").as_text(),
            Some("https://via.placeholder.com/150x100/4F46E5/FFFFFF?text=Acme+Corp")
        );
        assert_eq!(rec.get("is_general_branding"), &FieldValue::Boolean(true));
        assert_eq!(
            rec.get("estimated_spend"),
            &FieldValue::Decimal(BigDecimal::from_str("1500.25").unwrap())
        );
    }

    #[test]
    fn unknown_company_gets_grey_placeholder() {
        let rec = NormalizedRecord::new();
        assert_eq!(
            campaign_thumbnail(&rec).as_text(),
            Some("https://via.placeholder.com/150x100/6B7280/FFFFFF?text=Unknown")
        );
    }

    #[test]
    fn spend_summary_strips_currency() {
        let d = spend_summary();
        assert_eq!(d.columns.len(), 26);
        assert!(!d.update_fields.contains(&"date_coded"));
        let row = RawRow::from_pairs([
            ("DATE (Coded)", "2025-W01"),
            ("Chime", "$12,500.00"),
            ("Grand Total", "$1,000,000"),
            ("Venmo", "n/a"),
        ]);
        let Mapped::Admissible(rec) = RecordMapper::new(&d, MapperOptions::default()).map_row(&row).mapped else {
            panic!("spend row should be admissible");
        };
        assert_eq!(
            rec.get("chime"),
            &FieldValue::Decimal(BigDecimal::from_str("12500.00").unwrap())
        );
        assert_eq!(
            rec.get("grand_total"),
            &FieldValue::Decimal(BigDecimal::from_str("1000000").unwrap())
        );
        assert!(rec.get("venmo").is_null());
    }

    #[test]
    fn subject_line_key_is_stable_and_discriminating() {
        let d = subject_line();
        let mapper = RecordMapper::new(&d, MapperOptions::default());
        let map = |subject: &str, company: &str| {
            let row = RawRow::from_pairs([
                ("Subject", subject),
                ("Read Rate", "0.31"),
                ("Company", company),
                ("Date", "9/24/2025 16:04"),
            ]);
            match mapper.map_row(&row).mapped {
                Mapped::Admissible(rec) => rec,
                other => panic!("unexpected {other:?}"),
            }
        };
        let a = map("Your offer inside", "Chime");
        let b = map("Your offer inside", "Chime");
        let c = map("Your offer inside", "Dave");
        assert_eq!(a.key(&d), b.key(&d));
        assert_ne!(a.key(&d), c.key(&d));
        assert_eq!(a.key(&d).map(|k| k.len()), Some(64));
        assert_eq!(a.get("open_rate"), a.get("read_rate"));
    }

    const SCHEMA: &str = include_str!("../../sql/schema.sql");

    fn table_columns(table: &str) -> Vec<&'static str> {
        let open = format!("CREATE TABLE IF NOT EXISTS {table} (");
        let start = SCHEMA.find(&open).expect("table in schema") + open.len();
        let body = &SCHEMA[start..start + SCHEMA[start..].find(");").unwrap()];
        body.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
    }

    #[test]
    fn schema_has_every_descriptor_column_and_unique_key() {
        for d in [campaign(), spend_summary(), subject_line()] {
            let columns = table_columns(d.table);
            let has = |field: &str| {
                columns
                    .iter()
                    .any(|l| l.split_whitespace().next() == Some(field))
            };
            for field in d.field_types().keys() {
                assert!(has(*field), "{}.{field} missing from schema", d.table);
            }
            assert!(has("updated_at"), "{} lacks updated_at", d.table);
            let key = columns
                .iter()
                .find(|l| l.split_whitespace().next() == Some(d.business_key))
                .unwrap();
            assert!(key.contains("NOT NULL UNIQUE"), "{key}");
        }
        assert!(SCHEMA.contains("CREATE UNIQUE INDEX IF NOT EXISTS idx_subject_lines_line_key ON subject_lines(line_key)"));
    }

    #[test]
    fn schema_embeddings_reference_subject_lines_once() {
        let columns = table_columns("subject_line_embeddings");
        assert!(columns.iter().any(|l| l.starts_with("subject_line_id")
            && l.contains("UNIQUE REFERENCES subject_lines(id)")));
        let embedding = format!("embedding vector({})", crate::config::DEFAULT_EMBED_DIMENSIONS);
        assert!(columns.iter().any(|l| l.starts_with(&embedding)));
    }

    #[test]
    fn subject_line_requires_read_rate() {
        let d = subject_line();
        let row = RawRow::from_pairs([("Subject", "Hello"), ("Read Rate", "")]);
        assert_eq!(
            RecordMapper::new(&d, MapperOptions::default()).map_row(&row).mapped,
            Mapped::Inadmissible { missing: "open_rate" }
        );
    }
}

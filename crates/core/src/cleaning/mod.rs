//! Raw board items → typed, canonical items plus a data-quality report.
//!
//! Cleaning is pure: the same items and schema always produce the same output, and
//! nothing here performs I/O.

pub mod classify;
pub mod dates;
pub mod numbers;
pub mod status;
pub mod text;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::domain::item::{CleanValue, CleanedField, CleanedItem, Provenance, RawItem};
use crate::domain::quality::QualityReport;
use crate::domain::schema::{BoardSchema, FieldKind};

use self::classify::classify_column;
use self::dates::{iso, DateParser};
use self::numbers::parse_number;
use self::status::canonical_status;
use self::text::normalize_text;

#[derive(Clone, Debug, Default)]
pub struct DataCleaner {
    dates: DateParser,
}

impl DataCleaner {
    pub fn new(dates: DateParser) -> Self {
        Self { dates }
    }

    /// Cleans every field of every item. Items are never dropped here; unusable values are
    /// marked and counted, and the metric stage decides what to exclude.
    pub fn clean(&self, items: &[RawItem], schema: &BoardSchema) -> (Vec<CleanedItem>, QualityReport) {
        let mut report = QualityReport { total_items: items.len(), ..QualityReport::default() };
        let mut cleaned_items = Vec::with_capacity(items.len());

        for item in items {
            let field_names = schema
                .fields
                .keys()
                .chain(item.fields.keys())
                .map(String::as_str)
                .collect::<BTreeSet<_>>();

            let mut fields = BTreeMap::new();
            for name in field_names {
                let kind = schema
                    .field(name)
                    .map(|definition| definition.kind)
                    .unwrap_or_else(|| classify_column(name, "").kind);
                let raw = item.fields.get(name).and_then(|value| value.as_deref());
                let cleaned = self.clean_value(kind, raw);
                record_outcome(&mut report, &cleaned, kind, name, &item.name);
                fields.insert(name.to_string(), cleaned);
            }

            cleaned_items.push(CleanedItem {
                board_id: schema.board_id.clone(),
                id: item.id.clone(),
                name: item.name.clone(),
                group: item.group.clone(),
                fields,
            });
        }

        debug!(
            event_name = "cleaning.board.completed",
            board_id = %schema.board_id,
            total_items = report.total_items,
            missing_values = report.missing_values,
            unparseable_dates = report.unparseable_dates,
            unparseable_numbers = report.unparseable_numbers,
            "cleaned board items"
        );

        (cleaned_items, report)
    }

    pub fn clean_value(&self, kind: FieldKind, raw: Option<&str>) -> CleanedField {
        let Some(original) = raw.filter(|value| !value.trim().is_empty()) else {
            return CleanedField {
                raw: raw.map(str::to_string),
                value: CleanValue::Missing,
                provenance: Provenance::Missing,
            };
        };
        let trimmed = original.trim();

        let (value, canonical) = match kind {
            FieldKind::Date => match self.dates.parse(trimmed) {
                Some(date) => (CleanValue::Date(date), iso(date)),
                None => return unparseable(original),
            },
            FieldKind::Number => match parse_number(trimmed) {
                Some(number) => {
                    let value = CleanValue::Number(number);
                    let label = value.label().unwrap_or_default();
                    (value, label)
                }
                None => return unparseable(original),
            },
            FieldKind::Category => {
                let label = canonical_status(trimmed).map_or_else(|| normalize_text(trimmed), str::to_string);
                (CleanValue::Category(label.clone()), label)
            }
            FieldKind::Text => {
                let label = normalize_text(trimmed);
                (CleanValue::Text(label.clone()), label)
            }
            FieldKind::Passthrough => {
                return CleanedField {
                    raw: Some(original.to_string()),
                    value: CleanValue::Text(original.to_string()),
                    provenance: Provenance::Original,
                };
            }
        };

        let provenance = if canonical == original { Provenance::Original } else { Provenance::Normalized };
        CleanedField { raw: Some(original.to_string()), value, provenance }
    }

    /// Canonical label for a raw value of `kind`, as it will appear after cleaning.
    pub fn canonical_label(&self, kind: FieldKind, raw: &str) -> Option<String> {
        self.clean_value(kind, Some(raw)).value.label()
    }
}

fn unparseable(original: &str) -> CleanedField {
    CleanedField {
        raw: Some(original.to_string()),
        value: CleanValue::Unparseable(original.to_string()),
        provenance: Provenance::Unparseable,
    }
}

fn record_outcome(report: &mut QualityReport, cleaned: &CleanedField, kind: FieldKind, field: &str, item: &str) {
    match cleaned.provenance {
        Provenance::Original => {}
        Provenance::Normalized => report.normalization_events += 1,
        Provenance::Missing => report.missing_values += 1,
        Provenance::Unparseable => {
            let raw = cleaned.raw.as_deref().unwrap_or_default();
            if kind == FieldKind::Date {
                report.unparseable_dates += 1;
                report.issues.push(format!("Unparseable date in '{field}' for item '{item}': '{raw}'"));
            } else {
                report.unparseable_numbers += 1;
                report.issues.push(format!("Unparseable number in '{field}' for item '{item}': '{raw}'"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use crate::cleaning::dates::DateParser;
    use crate::domain::item::{CleanValue, ItemGroup, Provenance, RawItem};
    use crate::domain::plan::{Aggregation, MetricSpec};
    use crate::domain::quality::QualityReport;
    use crate::domain::schema::{BoardId, BoardSchema, FieldDef, FieldKind};
    use crate::metrics::MetricEngine;

    use super::DataCleaner;

    fn definition(kind: FieldKind) -> FieldDef {
        FieldDef { kind, source_type: "text".to_string(), distinct_values: None, unit: None }
    }

    fn schema() -> BoardSchema {
        let mut fields = BTreeMap::new();
        fields.insert("Close Date".to_string(), definition(FieldKind::Date));
        fields.insert("Deal Value".to_string(), definition(FieldKind::Number));
        fields.insert("Deal Status".to_string(), definition(FieldKind::Category));
        fields.insert("Sector".to_string(), definition(FieldKind::Text));
        BoardSchema {
            board_id: BoardId::from("1001"),
            key: "deals".to_string(),
            name: "Deals".to_string(),
            fields,
        }
    }

    fn item(name: &str, values: &[(&str, Option<&str>)]) -> RawItem {
        RawItem {
            id: format!("id-{name}"),
            name: name.to_string(),
            group: ItemGroup::default(),
            fields: values
                .iter()
                .map(|(field, value)| ((*field).to_string(), value.map(str::to_string)))
                .collect(),
        }
    }

    fn full_item(name: &str, date: &str, value: &str, status: &str) -> RawItem {
        item(
            name,
            &[
                ("Close Date", Some(date)),
                ("Deal Value", Some(value)),
                ("Deal Status", Some(status)),
                ("Sector", Some("mining")),
            ],
        )
    }

    #[test]
    fn valid_and_invalid_dates_are_reported_separately() {
        let cleaner = DataCleaner::default();
        let items = vec![
            full_item("Alpha", "26th Feb 2026", "₹1.2Cr", "open"),
            full_item("Beta", "31/02/2026", "3.5K", "Open"),
        ];

        let (cleaned, report) = cleaner.clean(&items, &schema());

        assert_eq!(
            cleaned[0].value("Close Date"),
            Some(CleanValue::Date(NaiveDate::from_ymd_opt(2026, 2, 26).expect("valid")))
        );
        assert_eq!(cleaned[1].value("Close Date"), Some(CleanValue::Unparseable("31/02/2026".to_string())));
        assert_eq!(report.unparseable_dates, 1);
        assert_eq!(report.total_items, 2);
        assert_eq!(report.issues, vec!["Unparseable date in 'Close Date' for item 'Beta': '31/02/2026'"]);
    }

    #[test]
    fn missing_values_are_counted_and_marked() {
        let cleaner = DataCleaner::default();
        let items = vec![item("Gamma", &[("Close Date", None), ("Deal Value", Some("  "))])];

        let (cleaned, report) = cleaner.clean(&items, &schema());

        // Deal Status and Sector are absent from the item entirely and count too.
        assert_eq!(report.missing_values, 4);
        assert_eq!(cleaned[0].fields["Deal Value"].provenance, Provenance::Missing);
        assert_eq!(cleaned[0].value("Sector"), Some(CleanValue::Missing));
    }

    #[test]
    fn normalization_events_count_changed_values_only() {
        let cleaner = DataCleaner::default();
        let items = vec![full_item("Delta", "2026-02-26", "1200", "IN PROGRESS")];

        let (cleaned, report) = cleaner.clean(&items, &schema());

        assert_eq!(cleaned[0].value("Deal Status"), Some(CleanValue::Category("In Progress".to_string())));
        assert_eq!(cleaned[0].value("Sector"), Some(CleanValue::Text("Mining".to_string())));
        // status and sector changed; ISO date and plain number did not.
        assert_eq!(report.normalization_events, 2);
    }

    #[test]
    fn unmapped_statuses_share_one_title_cased_group() {
        let cleaner = DataCleaner::default();
        let items = vec![
            full_item("Alpha", "2026-02-26", "100", " on  hold "),
            full_item("Beta", "2026-02-26", "200", "On Hold"),
            full_item("Gamma", "2026-02-26", "300", "ON HOLD"),
        ];

        let (cleaned, _) = cleaner.clean(&items, &schema());

        assert_eq!(cleaned[0].value("Deal Status"), Some(CleanValue::Category("On Hold".to_string())));
        assert_eq!(cleaned[1].fields["Deal Status"].provenance, Provenance::Original);

        let by_status = MetricSpec {
            name: "by_status".to_string(),
            aggregation: Aggregation::BreakdownBy { category_field: "Deal Status".to_string() },
            target_field: None,
            board: None,
        };
        let result = MetricEngine::new(DateParser::standard()).compute_metric(&cleaned, &[], &by_status);
        let breakdown = result.breakdown.expect("breakdown present");
        assert_eq!(breakdown.len(), 1, "{breakdown:?}");
        assert_eq!(breakdown.get("On Hold"), Some(&3.0));
    }

    #[test]
    fn unknown_status_values_pass_through() {
        let cleaner = DataCleaner::default();
        let cleaned = cleaner.clean_value(FieldKind::Category, Some("On Hold"));
        assert_eq!(cleaned.value, CleanValue::Category("On Hold".to_string()));
        assert_eq!(cleaned.provenance, Provenance::Original);
    }

    #[test]
    fn unclassified_fields_are_kept_verbatim() {
        let cleaner = DataCleaner::default();
        let items = vec![item("Eps", &[("Attachment Link", Some(" https://x.test/a "))])];

        let (cleaned, _) = cleaner.clean(&items, &schema());

        let field = &cleaned[0].fields["Attachment Link"];
        assert_eq!(field.value, CleanValue::Text(" https://x.test/a ".to_string()));
        assert_eq!(field.provenance, Provenance::Original);
    }

    #[test]
    fn cleaning_partitions_sum_to_the_whole() {
        let cleaner = DataCleaner::default();
        let schema = schema();
        let a = full_item("A", "31/02/2026", "TBD", "won");
        let b = item("B", &[("Close Date", Some("02-26-2026"))]);
        let c = full_item("C", "26/02/2026", "₹4.5L", "lost");

        let (_, ab) = cleaner.clean(&[a.clone(), b.clone()], &schema);
        let (_, c_only) = cleaner.clean(&[c.clone()], &schema);
        let (_, whole) = cleaner.clean(&[a, b, c], &schema);

        assert_eq!(QualityReport::sum([&ab, &c_only]).counters(), whole.counters());
        assert_eq!(QualityReport::sum([&c_only, &ab]).counters(), whole.counters());
    }

    #[test]
    fn canonical_labels_match_cleaned_output() {
        let cleaner = DataCleaner::default();
        assert_eq!(cleaner.canonical_label(FieldKind::Category, "closedwon").as_deref(), Some("Closed Won"));
        assert_eq!(cleaner.canonical_label(FieldKind::Text, "renewable  energy").as_deref(), Some("Renewable Energy"));
        assert_eq!(cleaner.canonical_label(FieldKind::Date, "bogus"), None);
    }
}

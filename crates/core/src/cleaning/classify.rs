//! Maps source columns to the semantic [`FieldKind`] used by cleaning.

use crate::domain::schema::FieldKind;

pub const CURRENCY_UNIT: &str = "INR";

const DATE_TITLES: &[&str] = &[
    "close date (a)",
    "tentative close date",
    "created date",
    "data delivery date",
    "date of po/loi",
    "probable start date",
    "probable end date",
    "last invoice date",
    "collection date",
];

const CURRENCY_TITLES: &[&str] = &[
    "masked deal value",
    "amount in rupees (excl of gst) (masked)",
    "amount in rupees (incl of gst) (masked)",
    "billed value in rupees (excl of gst.) (masked)",
    "billed value in rupees (incl of gst.) (masked)",
    "collected amount in rupees (incl of gst.) (masked)",
    "amount to be billed in rs. (exl. of gst) (masked)",
    "amount to be billed in rs. (incl. of gst) (masked)",
    "amount receivable (masked)",
];

const QUANTITY_TITLES: &[&str] =
    &["quantity by ops", "quantity billed (till date)", "balance in quantity"];

const CATEGORY_TITLES: &[&str] = &[
    "deal status",
    "deal stage",
    "closure probability",
    "execution status",
    "billing status",
    "invoice status",
    "wo status (billed)",
    "collection status",
    "nature of work",
    "document type",
    "type of work",
    "ar priority account",
    "product deal",
    "actual billing month",
    "owner code",
    "bd/kam personnel code",
    "is any skylark software platform part of the client deliverables in this deal?",
    "last executed month of recurring project",
];

const TEXT_TITLES: &[&str] =
    &["sector/service", "sector", "expected billing month", "actual collection month"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub kind: FieldKind,
    pub unit: Option<String>,
}

impl Classification {
    fn of(kind: FieldKind) -> Self {
        Self { kind, unit: None }
    }
}

/// Known column titles win; otherwise the source column type decides.
pub fn classify_column(title: &str, source_type: &str) -> Classification {
    let key = title.trim().to_lowercase();
    let key = key.as_str();

    if DATE_TITLES.contains(&key) {
        return Classification::of(FieldKind::Date);
    }
    if CURRENCY_TITLES.contains(&key) {
        return Classification { kind: FieldKind::Number, unit: Some(CURRENCY_UNIT.to_string()) };
    }
    if QUANTITY_TITLES.contains(&key) {
        return Classification::of(FieldKind::Number);
    }
    if CATEGORY_TITLES.contains(&key) {
        return Classification::of(FieldKind::Category);
    }
    if TEXT_TITLES.contains(&key) {
        return Classification::of(FieldKind::Text);
    }

    let kind = match source_type.trim().to_lowercase().as_str() {
        "date" => FieldKind::Date,
        "numbers" | "numeric" => FieldKind::Number,
        "status" | "color" | "dropdown" => FieldKind::Category,
        "text" | "long_text" | "long-text" => FieldKind::Text,
        _ => FieldKind::Passthrough,
    };
    Classification::of(kind)
}

#[cfg(test)]
mod tests {
    use crate::domain::schema::FieldKind;

    use super::{classify_column, CURRENCY_UNIT};

    #[test]
    fn known_titles_override_source_types() {
        let deal_value = classify_column("Masked Deal value", "text");
        assert_eq!(deal_value.kind, FieldKind::Number);
        assert_eq!(deal_value.unit.as_deref(), Some(CURRENCY_UNIT));

        assert_eq!(classify_column("Tentative Close Date", "text").kind, FieldKind::Date);
        assert_eq!(classify_column("Deal Stage", "text").kind, FieldKind::Category);
        assert_eq!(classify_column("Sector/service", "dropdown").kind, FieldKind::Text);
        assert_eq!(classify_column("Quantity by Ops", "text").unit, None);
    }

    #[test]
    fn unknown_titles_fall_back_to_source_type() {
        assert_eq!(classify_column("Kickoff", "date").kind, FieldKind::Date);
        assert_eq!(classify_column("Hours", "numbers").kind, FieldKind::Number);
        assert_eq!(classify_column("Region", "status").kind, FieldKind::Category);
        assert_eq!(classify_column("Notes", "long_text").kind, FieldKind::Text);
        assert_eq!(classify_column("Files", "file").kind, FieldKind::Passthrough);
    }
}

//! Canonical labels for status-like category values.

/// Lower-cased variant → canonical label.
pub const STATUS_LABELS: &[(&str, &str)] = &[
    // deals
    ("open", "Open"),
    ("closed", "Closed"),
    ("closed won", "Closed Won"),
    ("closed lost", "Closed Lost"),
    ("won", "Closed Won"),
    ("lost", "Closed Lost"),
    // execution
    ("not started", "Not Started"),
    ("in progress", "In Progress"),
    ("wip", "In Progress"),
    ("completed", "Completed"),
    ("complete", "Completed"),
    ("done", "Completed"),
    ("executed until current month", "Executed Until Current Month"),
    // billing
    ("partially billed", "Partially Billed"),
    ("fully billed", "Fully Billed"),
    ("not billed", "Not Billed"),
    ("update required", "Update Required"),
    // closure probability
    ("very high", "Very High"),
    ("high", "High"),
    ("medium", "Medium"),
    ("low", "Low"),
    ("very low", "Very Low"),
    // invoices
    ("pending", "Pending"),
    ("paid", "Paid"),
    ("overdue", "Overdue"),
    ("cancelled", "Cancelled"),
    ("canceled", "Cancelled"),
];

fn compact(value: &str) -> String {
    value.chars().filter(|character| character.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

/// Looks up `raw` in [`STATUS_LABELS`], ignoring case, spacing, `_` and `-`.
///
/// `None` means no mapping exists; callers fall back to title case.
pub fn canonical_status(raw: &str) -> Option<&'static str> {
    let key = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if key.is_empty() {
        return None;
    }
    if let Some((_, label)) = STATUS_LABELS.iter().find(|(variant, _)| *variant == key) {
        return Some(label);
    }
    let key = compact(&key);
    STATUS_LABELS.iter().find(|(variant, _)| compact(variant) == key).map(|(_, label)| *label)
}

#[cfg(test)]
mod tests {
    use super::canonical_status;

    #[test]
    fn spelling_variants_share_one_label() {
        for raw in ["in progress", "IN PROGRESS", "inprogress", "In_Progress", " in-progress "] {
            assert_eq!(canonical_status(raw), Some("In Progress"), "input `{raw}`");
        }
        assert_eq!(canonical_status("closedwon"), Some("Closed Won"));
        assert_eq!(canonical_status("canceled"), Some("Cancelled"));
    }

    #[test]
    fn unknown_values_have_no_mapping() {
        assert_eq!(canonical_status("On Hold"), None);
        assert_eq!(canonical_status(""), None);
    }
}

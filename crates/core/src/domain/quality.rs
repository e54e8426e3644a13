use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Aggregate cleaning outcomes for one request.
///
/// Counters are plain sums of per-field outcomes, so [`QualityReport::merge`] is
/// associative and commutative over them. `issues` is a human-readable sample that
/// is only truncated when the report is finalised for the response envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct QualityReport {
    pub total_items: usize,
    pub missing_values: usize,
    pub unparseable_dates: usize,
    pub unparseable_numbers: usize,
    pub normalization_events: usize,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl QualityReport {
    pub fn merge(&mut self, other: &QualityReport) {
        self.total_items += other.total_items;
        self.missing_values += other.missing_values;
        self.unparseable_dates += other.unparseable_dates;
        self.unparseable_numbers += other.unparseable_numbers;
        self.normalization_events += other.normalization_events;
        self.issues.extend(other.issues.iter().cloned());
    }

    pub fn sum<'a>(reports: impl IntoIterator<Item = &'a QualityReport>) -> QualityReport {
        let mut total = QualityReport::default();
        for report in reports {
            total.merge(report);
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.total_items == 0
            && self.missing_values == 0
            && self.unparseable_dates == 0
            && self.unparseable_numbers == 0
            && self.normalization_events == 0
            && self.issues.is_empty()
    }

    /// Counters only, for order-independent comparisons.
    pub fn counters(&self) -> [usize; 5] {
        [
            self.total_items,
            self.missing_values,
            self.unparseable_dates,
            self.unparseable_numbers,
            self.normalization_events,
        ]
    }

    pub fn issue_count(&self) -> usize {
        self.missing_values + self.unparseable_dates + self.unparseable_numbers
    }

    /// Share of items affected by `count`, in percent, capped at 100.
    pub fn percent_of_items(&self, count: usize) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        (count as f64 / self.total_items as f64 * 100.0).min(100.0)
    }

    pub fn summary(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!(
            "{} data quality issues found across {} items: {} missing values, {} unparseable dates, {} unparseable numbers; {} values normalized.",
            self.issue_count(),
            self.total_items,
            self.missing_values,
            self.unparseable_dates,
            self.unparseable_numbers,
            self.normalization_events,
        )
    }

    pub fn truncate_issues(&mut self, max: usize) {
        if self.issues.len() > max {
            let total = self.issues.len();
            self.issues.truncate(max);
            self.issues.push(format!("... and {} more issues", total - max));
        }
    }
}

impl Serialize for QualityReport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("QualityReport", 7)?;
        state.serialize_field("total_items", &self.total_items)?;
        state.serialize_field("missing_values", &self.missing_values)?;
        state.serialize_field("unparseable_dates", &self.unparseable_dates)?;
        state.serialize_field("unparseable_numbers", &self.unparseable_numbers)?;
        state.serialize_field("normalization_events", &self.normalization_events)?;
        state.serialize_field("summary", &self.summary())?;
        state.serialize_field("issues", &self.issues)?;
        state.end()
    }
}

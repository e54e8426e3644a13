//! Deterministic aggregation over cleaned items.
//!
//! Every number the response composer may cite comes from here. Filters are applied in
//! plan order as a conjunction; an item whose filtered or aggregated value is
//! unparseable is left out of the metric and counted in [`MetricResult::excluded`].

pub mod filters;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::cleaning::dates::DateParser;
use crate::domain::item::{CleanValue, CleanedItem};
use crate::domain::metric::{MetricResult, MetricValue};
use crate::domain::plan::{Aggregation, Filter, MetricSpec, QueryPlan};
use crate::domain::schema::BoardSchema;

use self::filters::{evaluate, FilterOutcome};

pub const COUNT_UNIT: &str = "items";
pub const UNKNOWN_GROUP: &str = "Unknown";

#[derive(Clone, Debug, Default)]
pub struct MetricEngine {
    dates: DateParser,
    units: BTreeMap<String, String>,
}

/// What a single item contributes to a metric.
enum Contribution {
    Counted,
    Value(CleanValue),
    Grouped { group: String, amount: f64 },
}

enum Selection {
    Eligible(Contribution),
    Skipped,
    Excluded,
}

impl MetricEngine {
    pub fn new(dates: DateParser) -> Self {
        Self { dates, units: BTreeMap::new() }
    }

    /// Picks up field units (currency and similar) from the request's board schemas.
    pub fn with_schemas(mut self, schemas: &[BoardSchema]) -> Self {
        for schema in schemas {
            for (name, definition) in &schema.fields {
                if let Some(unit) = &definition.unit {
                    self.units.insert(name.clone(), unit.clone());
                }
            }
        }
        self
    }

    pub fn compute(&self, items: &[CleanedItem], plan: &QueryPlan) -> Vec<MetricResult> {
        plan.metrics.iter().map(|metric| self.compute_metric(items, &plan.filters, metric)).collect()
    }

    pub fn compute_metric(&self, items: &[CleanedItem], filters: &[Filter], metric: &MetricSpec) -> MetricResult {
        let mut contributions = Vec::new();
        let mut excluded = 0;

        for item in items {
            if metric.board.as_ref().is_some_and(|board| *board != item.board_id) {
                continue;
            }
            match self.select(item, filters, metric) {
                Selection::Eligible(contribution) => contributions.push(contribution),
                Selection::Skipped => {}
                Selection::Excluded => excluded += 1,
            }
        }

        let eligible = contributions.len();
        let (value, breakdown) = aggregate(&metric.aggregation, contributions);
        let unit = self.unit_for(metric);

        debug!(
            event_name = "metrics.computed",
            metric = %metric.name,
            aggregation = metric.aggregation.as_str(),
            eligible,
            excluded,
            "computed metric"
        );

        MetricResult {
            name: metric.name.clone(),
            aggregation: metric.aggregation.as_str().to_string(),
            board_id: metric.board.clone(),
            value,
            unit,
            breakdown,
            eligible,
            excluded,
        }
    }

    fn select(&self, item: &CleanedItem, filters: &[Filter], metric: &MetricSpec) -> Selection {
        for filter in filters {
            match evaluate(filter, item, &self.dates) {
                FilterOutcome::Match => {}
                FilterOutcome::NoMatch => return Selection::Skipped,
                FilterOutcome::Excluded => return Selection::Excluded,
            }
        }

        let target = metric.target_field.as_deref().map(|field| item.value(field));

        match &metric.aggregation {
            Aggregation::Count => match target.map(present) {
                None | Some(Ok(_)) => Selection::Eligible(Contribution::Counted),
                Some(Err(selection)) => selection,
            },
            Aggregation::BreakdownBy { category_field } => {
                let group = match item.value(category_field) {
                    None => return Selection::Skipped,
                    Some(CleanValue::Unparseable(_)) => return Selection::Excluded,
                    Some(value) => value.label().unwrap_or_else(|| UNKNOWN_GROUP.to_string()),
                };
                let amount = match target.map(present) {
                    None => 1.0,
                    Some(Ok(CleanValue::Number(amount))) => amount,
                    Some(Ok(_)) => return Selection::Excluded,
                    Some(Err(selection)) => return selection,
                };
                Selection::Eligible(Contribution::Grouped { group, amount })
            }
            aggregation => {
                let Some(value) = target else {
                    return Selection::Skipped;
                };
                let value = match present(value) {
                    Ok(value) => value,
                    Err(selection) => return selection,
                };
                match (aggregation, &value) {
                    (Aggregation::CountDistinct, _)
                    | (Aggregation::Sum | Aggregation::Average, CleanValue::Number(_))
                    | (Aggregation::Min | Aggregation::Max, CleanValue::Number(_) | CleanValue::Date(_)) => {
                        Selection::Eligible(Contribution::Value(value))
                    }
                    _ => Selection::Excluded,
                }
            }
        }
    }

    fn unit_for(&self, metric: &MetricSpec) -> Option<String> {
        match &metric.aggregation {
            Aggregation::Count | Aggregation::CountDistinct => Some(COUNT_UNIT.to_string()),
            Aggregation::BreakdownBy { .. } if metric.target_field.is_none() => Some(COUNT_UNIT.to_string()),
            _ => metric.target_field.as_ref().and_then(|field| self.units.get(field).cloned()),
        }
    }
}

/// Splits a target lookup into a usable value or the selection outcome that replaces it.
fn present(value: Option<CleanValue>) -> Result<CleanValue, Selection> {
    match value {
        None | Some(CleanValue::Missing) => Err(Selection::Skipped),
        Some(CleanValue::Unparseable(_)) => Err(Selection::Excluded),
        Some(value) => Ok(value),
    }
}

fn aggregate(
    aggregation: &Aggregation,
    contributions: Vec<Contribution>,
) -> (MetricValue, Option<BTreeMap<String, f64>>) {
    match aggregation {
        Aggregation::Count => (MetricValue::Number(contributions.len() as f64), None),
        Aggregation::CountDistinct => {
            let labels = contributions
                .into_iter()
                .filter_map(|contribution| match contribution {
                    Contribution::Value(value) => value.label().map(|label| label.to_lowercase()),
                    _ => None,
                })
                .collect::<BTreeSet<_>>();
            (MetricValue::Number(labels.len() as f64), None)
        }
        Aggregation::Sum => (MetricValue::Number(numbers(&contributions).sum()), None),
        Aggregation::Average => {
            let values = numbers(&contributions).collect::<Vec<_>>();
            if values.is_empty() {
                (MetricValue::NoData, None)
            } else {
                (MetricValue::Number(values.iter().sum::<f64>() / values.len() as f64), None)
            }
        }
        Aggregation::Min => (extreme(&contributions, false), None),
        Aggregation::Max => (extreme(&contributions, true), None),
        Aggregation::BreakdownBy { .. } => {
            let mut groups = BTreeMap::new();
            for contribution in contributions {
                if let Contribution::Grouped { group, amount } = contribution {
                    *groups.entry(group).or_insert(0.0) += amount;
                }
            }
            (MetricValue::Number(groups.values().sum()), Some(groups))
        }
    }
}

fn numbers(contributions: &[Contribution]) -> impl Iterator<Item = f64> + '_ {
    contributions.iter().filter_map(|contribution| match contribution {
        Contribution::Value(value) => value.as_number(),
        _ => None,
    })
}

fn dates(contributions: &[Contribution]) -> impl Iterator<Item = NaiveDate> + '_ {
    contributions.iter().filter_map(|contribution| match contribution {
        Contribution::Value(value) => value.as_date(),
        _ => None,
    })
}

fn extreme(contributions: &[Contribution], largest: bool) -> MetricValue {
    let fold = |best: Option<f64>, next: f64| match best {
        Some(best) if (largest && best >= next) || (!largest && best <= next) => Some(best),
        _ => Some(next),
    };
    if let Some(number) = numbers(contributions).fold(None, fold) {
        return MetricValue::Number(number);
    }
    let best_date = if largest { dates(contributions).max() } else { dates(contributions).min() };
    best_date.map_or(MetricValue::NoData, MetricValue::Date)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use crate::cleaning::dates::DateParser;
    use crate::domain::item::{CleanValue, CleanedField, CleanedItem, ItemGroup, Provenance};
    use crate::domain::metric::MetricValue;
    use crate::domain::plan::{Aggregation, Filter, FilterOperator, FilterValue, MetricSpec, Operand, QueryPlan};
    use crate::domain::schema::{BoardId, BoardSchema, FieldDef, FieldKind};

    use super::{MetricEngine, COUNT_UNIT, UNKNOWN_GROUP};

    fn item(board: &str, name: &str, fields: Vec<(&str, CleanValue)>) -> CleanedItem {
        CleanedItem {
            board_id: BoardId::from(board),
            id: format!("{board}-{name}"),
            name: name.to_string(),
            group: ItemGroup::default(),
            fields: fields
                .into_iter()
                .map(|(field, value)| {
                    (field.to_string(), CleanedField { raw: None, value, provenance: Provenance::Original })
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn deal(name: &str, sector: &str, value: CleanValue) -> CleanedItem {
        item("deals", name, vec![("Sector", CleanValue::Text(sector.to_string())), ("Deal Value", value)])
    }

    fn metric(name: &str, aggregation: Aggregation, target: Option<&str>) -> MetricSpec {
        MetricSpec { name: name.to_string(), aggregation, target_field: target.map(str::to_string), board: None }
    }

    fn plan(filters: Vec<Filter>, metrics: Vec<MetricSpec>) -> QueryPlan {
        QueryPlan { boards: vec![BoardId::from("deals")], filters, metrics, ..QueryPlan::default() }
    }

    fn sector_is(sector: &str) -> Filter {
        Filter {
            field: "Sector".to_string(),
            operator: FilterOperator::Equals,
            value: FilterValue::One(Operand::Text(sector.to_string())),
        }
    }

    #[test]
    fn sum_and_average_skip_unparseable_values_and_disclose_them() {
        let items = vec![
            deal("A", "Mining", CleanValue::Number(100.0)),
            deal("B", "Mining", CleanValue::Unparseable("TBD".to_string())),
            deal("C", "Mining", CleanValue::Number(300.0)),
            deal("D", "Energy", CleanValue::Number(1_000.0)),
            deal("E", "Mining", CleanValue::Missing),
        ];
        let engine = MetricEngine::new(DateParser::standard());
        let results = engine.compute(
            &items,
            &plan(
                vec![sector_is("mining")],
                vec![
                    metric("total", Aggregation::Sum, Some("Deal Value")),
                    metric("mean", Aggregation::Average, Some("Deal Value")),
                ],
            ),
        );

        assert_eq!(results[0].value, MetricValue::Number(400.0));
        assert_eq!(results[0].eligible, 2);
        assert_eq!(results[0].excluded, 1);
        assert_eq!(results[1].value, MetricValue::Number(200.0));
    }

    #[test]
    fn empty_selections_yield_defined_results() {
        let items = vec![deal("A", "Mining", CleanValue::Number(5.0))];
        let engine = MetricEngine::new(DateParser::standard());
        let results = engine.compute(
            &items,
            &plan(
                vec![sector_is("aerospace")],
                vec![
                    metric("mean", Aggregation::Average, Some("Deal Value")),
                    metric("total", Aggregation::Sum, Some("Deal Value")),
                    metric("largest", Aggregation::Max, Some("Deal Value")),
                    metric("deals", Aggregation::Count, None),
                ],
            ),
        );

        assert_eq!(results[0].value, MetricValue::NoData);
        assert_eq!(results[1].value, MetricValue::Number(0.0));
        assert_eq!(results[2].value, MetricValue::NoData);
        assert_eq!(results[3].value, MetricValue::Number(0.0));
        assert_eq!(results[3].unit.as_deref(), Some(COUNT_UNIT));
    }

    #[test]
    fn breakdown_groups_by_canonical_label() {
        let items = vec![
            deal("A", "Mining", CleanValue::Number(10.0)),
            deal("B", "Mining", CleanValue::Number(15.0)),
            deal("C", "Energy", CleanValue::Number(20.0)),
            item("deals", "D", vec![("Sector", CleanValue::Missing), ("Deal Value", CleanValue::Number(1.0))]),
        ];
        let engine = MetricEngine::new(DateParser::standard());

        let counts = engine.compute_metric(
            &items,
            &[],
            &metric("by_sector", Aggregation::BreakdownBy { category_field: "Sector".to_string() }, None),
        );
        let breakdown = counts.breakdown.expect("breakdown present");
        assert_eq!(breakdown.get("Mining"), Some(&2.0));
        assert_eq!(breakdown.get(UNKNOWN_GROUP), Some(&1.0));
        assert_eq!(counts.value, MetricValue::Number(4.0));

        let sums = engine.compute_metric(
            &items,
            &[],
            &metric("value_by_sector", Aggregation::BreakdownBy { category_field: "Sector".to_string() }, Some("Deal Value")),
        );
        assert_eq!(sums.breakdown.expect("breakdown present").get("Mining"), Some(&25.0));
    }

    #[test]
    fn min_and_max_work_on_dates() {
        let date = |day| CleanValue::Date(NaiveDate::from_ymd_opt(2026, 2, day).expect("valid"));
        let items = vec![
            item("deals", "A", vec![("Close Date", date(26))]),
            item("deals", "B", vec![("Close Date", date(3))]),
        ];
        let engine = MetricEngine::new(DateParser::standard());

        let earliest = engine.compute_metric(&items, &[], &metric("first", Aggregation::Min, Some("Close Date")));
        let latest = engine.compute_metric(&items, &[], &metric("last", Aggregation::Max, Some("Close Date")));

        assert_eq!(earliest.value, MetricValue::Date(NaiveDate::from_ymd_opt(2026, 2, 3).expect("valid")));
        assert_eq!(latest.value, MetricValue::Date(NaiveDate::from_ymd_opt(2026, 2, 26).expect("valid")));
    }

    #[test]
    fn count_distinct_and_board_scoping() {
        let items = vec![
            deal("A", "Mining", CleanValue::Number(1.0)),
            deal("B", "mining", CleanValue::Number(2.0)),
            deal("C", "Energy", CleanValue::Number(3.0)),
            item("workorders", "W", vec![("Sector", CleanValue::Text("Aviation".to_string()))]),
        ];
        let engine = MetricEngine::new(DateParser::standard());

        let all = engine.compute_metric(&items, &[], &metric("sectors", Aggregation::CountDistinct, Some("Sector")));
        assert_eq!(all.value, MetricValue::Number(3.0));

        let scoped = MetricSpec { board: Some(BoardId::from("deals")), ..metric("sectors", Aggregation::CountDistinct, Some("Sector")) };
        assert_eq!(engine.compute_metric(&items, &[], &scoped).value, MetricValue::Number(2.0));
    }

    #[test]
    fn units_come_from_schemas() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "Deal Value".to_string(),
            FieldDef {
                kind: FieldKind::Number,
                source_type: "numbers".to_string(),
                distinct_values: None,
                unit: Some("INR".to_string()),
            },
        );
        let schema = BoardSchema { board_id: BoardId::from("deals"), key: "deals".to_string(), name: "Deals".to_string(), fields };
        let engine = MetricEngine::new(DateParser::standard()).with_schemas(&[schema]);

        let result = engine.compute_metric(
            &[deal("A", "Mining", CleanValue::Number(7.0))],
            &[],
            &metric("total", Aggregation::Sum, Some("Deal Value")),
        );
        assert_eq!(result.unit.as_deref(), Some("INR"));
    }
}

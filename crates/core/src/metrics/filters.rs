use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::cleaning::dates::DateParser;
use crate::cleaning::numbers::parse_number;
use crate::domain::item::{CleanValue, CleanedItem};
use crate::domain::plan::{Filter, FilterOperator, FilterValue, Operand};

const NUMBER_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOutcome {
    Match,
    NoMatch,
    /// The item's value for the filtered field is unparseable.
    Excluded,
}

/// Evaluates one filter. A field the item's board does not have is not applicable and
/// matches; a missing value never matches.
pub fn evaluate(filter: &Filter, item: &CleanedItem, dates: &DateParser) -> FilterOutcome {
    let Some(value) = item.value(&filter.field) else {
        return FilterOutcome::Match;
    };
    match value {
        CleanValue::Missing => FilterOutcome::NoMatch,
        CleanValue::Unparseable(_) => FilterOutcome::Excluded,
        value if satisfies(filter.operator, &filter.value, &value, dates) => FilterOutcome::Match,
        _ => FilterOutcome::NoMatch,
    }
}

fn satisfies(operator: FilterOperator, expected: &FilterValue, value: &CleanValue, dates: &DateParser) -> bool {
    match (operator, expected) {
        (FilterOperator::Equals, FilterValue::One(operand)) => equals(value, operand, dates),
        (FilterOperator::Contains, FilterValue::One(operand)) => contains(value, operand),
        (FilterOperator::GreaterThan, FilterValue::One(operand)) => {
            compare(value, operand, dates) == Some(Ordering::Greater)
        }
        (FilterOperator::LessThan, FilterValue::One(operand)) => {
            compare(value, operand, dates) == Some(Ordering::Less)
        }
        (FilterOperator::InRange, FilterValue::Range { min, max }) => {
            in_range(value, min.as_ref(), max.as_ref(), dates)
        }
        (FilterOperator::InRange, FilterValue::Set(bounds)) if bounds.len() == 2 => {
            in_range(value, bounds.first(), bounds.get(1), dates)
        }
        (FilterOperator::InSet, FilterValue::Set(members)) => {
            members.iter().any(|member| equals(value, member, dates))
        }
        (FilterOperator::InSet, FilterValue::One(operand)) => equals(value, operand, dates),
        _ => false,
    }
}

fn in_range(value: &CleanValue, min: Option<&Operand>, max: Option<&Operand>, dates: &DateParser) -> bool {
    let above_min = min.map_or(true, |bound| {
        matches!(compare(value, bound, dates), Some(Ordering::Greater | Ordering::Equal))
    });
    let below_max = max.map_or(true, |bound| {
        matches!(compare(value, bound, dates), Some(Ordering::Less | Ordering::Equal))
    });
    above_min && below_max
}

fn equals(value: &CleanValue, operand: &Operand, dates: &DateParser) -> bool {
    compare(value, operand, dates) == Some(Ordering::Equal)
}

fn contains(value: &CleanValue, operand: &Operand) -> bool {
    let needle = operand_text(operand).to_lowercase();
    value.label().is_some_and(|label| label.to_lowercase().contains(&needle))
}

/// Orders a cleaned value against a filter literal. `None` means the two are not comparable.
pub fn compare(value: &CleanValue, operand: &Operand, dates: &DateParser) -> Option<Ordering> {
    match value {
        CleanValue::Number(number) => {
            let other = match operand {
                Operand::Number(other) => *other,
                Operand::Text(text) => parse_number(text)?,
            };
            if (number - other).abs() <= NUMBER_TOLERANCE {
                Some(Ordering::Equal)
            } else {
                number.partial_cmp(&other)
            }
        }
        CleanValue::Date(date) => {
            let Operand::Text(text) = operand else {
                return None;
            };
            let other = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .ok()
                .or_else(|| dates.parse(text))?;
            Some(date.cmp(&other))
        }
        CleanValue::Category(label) | CleanValue::Text(label) => {
            Some(label.to_lowercase().cmp(&operand_text(operand).to_lowercase()))
        }
        CleanValue::Missing | CleanValue::Unparseable(_) => None,
    }
}

fn operand_text(operand: &Operand) -> String {
    match operand {
        Operand::Number(number) => CleanValue::Number(*number).label().unwrap_or_default(),
        Operand::Text(text) => text.trim().to_string(),
    }
}

//! Metadata and document predicates.
//!
//! Filters arrive as JSON trees (`{"field": {"$gt": 1}}`, `{"$and": [...]}`,
//! `{"$contains": "text"}`) and are parsed once into [`WhereFilter`] and
//! [`DocumentFilter`]. Evaluation is pure and never fails: every parse-time
//! problem is reported as a validation error before any item is scanned.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::collection::{ItemRecord, Metadata};
use crate::error::{Error, Result};
use crate::validation::validate_field_name;

/// A comparison applied to one metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
}

impl Condition {
    fn parse(operator: &str, operand: &Value) -> Result<Self> {
        let condition = match operator {
            "$eq" => Self::Eq(operand.clone()),
            "$ne" => Self::Ne(operand.clone()),
            "$gt" => Self::Gt(operand.clone()),
            "$gte" => Self::Gte(operand.clone()),
            "$lt" => Self::Lt(operand.clone()),
            "$lte" => Self::Lte(operand.clone()),
            "$in" => Self::In(array_operand(operator, operand)?),
            "$nin" => Self::Nin(array_operand(operator, operand)?),
            other => {
                return Err(Error::validation(format!(
                    "unsupported metadata operator '{other}'"
                )))
            }
        };
        Ok(condition)
    }

    fn holds(&self, actual: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => values_equal(actual, expected),
            Self::Ne(expected) => !values_equal(actual, expected),
            Self::Gt(bound) => compare_numeric(actual, bound, Ordering::is_gt),
            Self::Gte(bound) => compare_numeric(actual, bound, Ordering::is_ge),
            Self::Lt(bound) => compare_numeric(actual, bound, Ordering::is_lt),
            Self::Lte(bound) => compare_numeric(actual, bound, Ordering::is_le),
            Self::In(candidates) => candidates
                .iter()
                .any(|candidate| values_equal(actual, candidate)),
            Self::Nin(candidates) => !candidates
                .iter()
                .any(|candidate| values_equal(actual, candidate)),
        }
    }
}

/// All conditions listed for a single field; every one must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub conditions: Vec<Condition>,
}

/// Boolean filter tree over item metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum WhereFilter {
    And(Vec<WhereFilter>),
    Or(Vec<WhereFilter>),
    Field(FieldFilter),
}

impl WhereFilter {
    /// `{field: value}` shorthand for `$eq`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, vec![Condition::Eq(value.into())])
    }

    pub fn field(field: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self::Field(FieldFilter {
            field: field.into(),
            conditions,
        })
    }

    pub fn and(filters: Vec<WhereFilter>) -> Self {
        Self::And(filters)
    }

    pub fn or(filters: Vec<WhereFilter>) -> Self {
        Self::Or(filters)
    }

    /// Parses and validates a JSON filter tree.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(Error::validation("where filter must be a JSON object"));
        };

        let mut clauses = Vec::with_capacity(object.len());
        for (key, operand) in object {
            clauses.push(parse_clause(key, operand)?);
        }

        if clauses.len() == 1 {
            return Ok(clauses.remove(0));
        }
        Ok(Self::And(clauses))
    }

    /// Evaluates the tree against an item's metadata; a missing map behaves
    /// like an empty one.
    pub fn matches_metadata(&self, metadata: Option<&Metadata>) -> bool {
        match self {
            Self::And(filters) => filters
                .iter()
                .all(|filter| filter.matches_metadata(metadata)),
            Self::Or(filters) => filters
                .iter()
                .any(|filter| filter.matches_metadata(metadata)),
            Self::Field(FieldFilter { field, conditions }) => {
                let actual = metadata.and_then(|metadata| metadata.get(field));
                conditions.iter().all(|condition| condition.holds(actual))
            }
        }
    }

    /// Re-checks field names of programmatically built trees.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Self::And(filters) | Self::Or(filters) => {
                filters.iter().try_for_each(WhereFilter::validate)
            }
            Self::Field(FieldFilter { field, .. }) => validate_field_name(field).map(|_| ()),
        }
    }
}

impl TryFrom<Value> for WhereFilter {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(&value)
    }
}

impl TryFrom<&Value> for WhereFilter {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        Self::from_json(value)
    }
}

fn parse_clause(key: &str, operand: &Value) -> Result<WhereFilter> {
    match key {
        "$and" => Ok(WhereFilter::And(parse_filter_list(key, operand)?)),
        "$or" => Ok(WhereFilter::Or(parse_filter_list(key, operand)?)),
        other if other.starts_with('$') => Err(Error::validation(format!(
            "unsupported logical operator '{other}'"
        ))),
        field => {
            validate_field_name(field)?;
            let conditions = match operand {
                Value::Object(operators) => operators
                    .iter()
                    .map(|(operator, value)| Condition::parse(operator, value))
                    .collect::<Result<Vec<_>>>()?,
                scalar => vec![Condition::Eq(scalar.clone())],
            };
            Ok(WhereFilter::field(field, conditions))
        }
    }
}

fn parse_filter_list(operator: &str, operand: &Value) -> Result<Vec<WhereFilter>> {
    let Value::Array(items) = operand else {
        return Err(Error::validation(format!(
            "'{operator}' expects an array of filters"
        )));
    };
    items.iter().map(WhereFilter::from_json).collect()
}

fn array_operand(operator: &str, operand: &Value) -> Result<Vec<Value>> {
    match operand {
        Value::Array(values) => Ok(values.clone()),
        _ => Err(Error::validation(format!(
            "'{operator}' expects an array operand"
        ))),
    }
}

fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    let actual = actual.unwrap_or(&Value::Null);
    match (actual, expected) {
        (Value::Number(left), Value::Number(right)) => {
            compare_numbers(left, right).is_some_and(Ordering::is_eq)
        }
        _ => actual == expected,
    }
}

fn compare_numeric(actual: Option<&Value>, bound: &Value, holds: fn(Ordering) -> bool) -> bool {
    match (actual, bound) {
        (Some(Value::Number(actual)), Value::Number(bound)) => {
            compare_numbers(actual, bound).is_some_and(holds)
        }
        _ => false,
    }
}

/// Integers compare exactly; a float on either side compares as `f64`.
fn compare_numbers(left: &Number, right: &Number) -> Option<Ordering> {
    match (integer_value(left), integer_value(right)) {
        (Some(left), Some(right)) => Some(left.cmp(&right)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn integer_value(number: &Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

/// Substring predicate over an item's document text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct DocumentFilter {
    pub contains: Option<String>,
    pub not_contains: Option<String>,
}

impl DocumentFilter {
    pub fn contains(text: impl Into<String>) -> Self {
        Self {
            contains: Some(text.into()),
            not_contains: None,
        }
    }

    pub fn not_contains(text: impl Into<String>) -> Self {
        Self {
            contains: None,
            not_contains: Some(text.into()),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(Error::validation("where_document must be a JSON object"));
        };

        let mut filter = Self::default();
        for (operator, operand) in object {
            let Value::String(text) = operand else {
                return Err(Error::validation(format!(
                    "'{operator}' expects a string operand"
                )));
            };
            match operator.as_str() {
                "$contains" => filter.contains = Some(text.clone()),
                "$not_contains" => filter.not_contains = Some(text.clone()),
                other => {
                    return Err(Error::validation(format!(
                        "unsupported document operator '{other}'"
                    )))
                }
            }
        }
        Ok(filter)
    }

    /// A missing document is treated as the empty string.
    pub fn matches_document(&self, document: Option<&str>) -> bool {
        let document = document.unwrap_or("");
        if let Some(needle) = &self.contains {
            if !document.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.not_contains {
            if document.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

impl TryFrom<Value> for DocumentFilter {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(&value)
    }
}

impl From<DocumentFilter> for Value {
    fn from(filter: DocumentFilter) -> Self {
        let mut object = Map::new();
        if let Some(text) = filter.contains {
            object.insert("$contains".to_string(), Value::String(text));
        }
        if let Some(text) = filter.not_contains {
            object.insert("$not_contains".to_string(), Value::String(text));
        }
        Value::Object(object)
    }
}

/// Evaluates both predicates against one item. Absent filters match.
pub fn matches(
    item: &ItemRecord,
    filter: Option<&WhereFilter>,
    document_filter: Option<&DocumentFilter>,
) -> bool {
    if let Some(filter) = filter {
        if !filter.matches_metadata(item.metadata.as_ref()) {
            return false;
        }
    }
    if let Some(document_filter) = document_filter {
        if !document_filter.matches_document(item.document.as_deref()) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests;

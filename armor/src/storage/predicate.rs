use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    /// Inclusive on both ends, needs two reference values.
    Between,
    In,
}

/// Partition level filter over bucket start instants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantPredicate {
    pub field: String,
    pub operator: Operator,
    pub values: Vec<DateTime<Utc>>,
}

impl InstantPredicate {
    pub fn new(field: &str, operator: Operator, values: Vec<DateTime<Utc>>) -> Self {
        Self { field: field.to_string(), operator, values }
    }

    pub fn test(&self, instant: &DateTime<Utc>) -> bool {
        let first = self.values.first();
        match self.operator {
            Operator::Equals | Operator::In => self.values.iter().any(|v| v == instant),
            Operator::NotEquals => self.values.iter().all(|v| v != instant),
            Operator::LessThan => first.is_some_and(|v| instant < v),
            Operator::LessThanEqual => first.is_some_and(|v| instant <= v),
            Operator::GreaterThan => first.is_some_and(|v| instant > v),
            Operator::GreaterThanEqual => first.is_some_and(|v| instant >= v),
            Operator::Between => match (first, self.values.get(1)) {
                (Some(low), Some(high)) => low <= instant && instant <= high,
                _ => false,
            },
        }
    }
}

//! Typed filter shared by every filtered query, delete and count call.
//!
//! Serializes to the Qdrant filter dialect and can also be evaluated
//! in-process against a payload map.

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Range {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Condition {
    Match { key: String, r#match: MatchValue },
    Range { key: String, range: Range },
    HasId { has_id: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchValue {
    pub value: Value,
}

impl Condition {
    fn matches(&self, id: &str, fields: &Map<String, Value>) -> bool {
        match self {
            Condition::Match { key, r#match } => match fields.get(key) {
                // Array fields match when any element does.
                Some(Value::Array(items)) => items.iter().any(|v| v == &r#match.value),
                Some(v) => v == &r#match.value,
                None => false,
            },
            Condition::Range { key, range } => {
                let Some(n) = fields.get(key).and_then(|v| v.as_i64()) else {
                    return false;
                };
                range.gte.is_none_or(|g| n >= g) && range.lte.is_none_or(|l| n <= l)
            }
            Condition::HasId { has_id } => has_id.iter().any(|h| h == id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    must: Vec<Condition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    must_not: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must_match(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.must.push(Condition::Match {
            key: key.to_string(),
            r#match: MatchValue {
                value: value.into(),
            },
        });
        self
    }

    pub fn must_not_match(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.must_not.push(Condition::Match {
            key: key.to_string(),
            r#match: MatchValue {
                value: value.into(),
            },
        });
        self
    }

    pub fn range(mut self, key: &str, gte: Option<i64>, lte: Option<i64>) -> Self {
        if gte.is_some() || lte.is_some() {
            self.must.push(Condition::Range {
                key: key.to_string(),
                range: Range { gte, lte },
            });
        }
        self
    }

    pub fn has_ids(mut self, ids: &[String]) -> Self {
        self.must.push(Condition::HasId {
            has_id: ids.to_vec(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    pub fn matches(&self, id: &str, fields: &Map<String, Value>) -> bool {
        self.must.iter().all(|c| c.matches(id, fields))
            && !self.must_not.iter().any(|c| c.matches(id, fields))
    }
}

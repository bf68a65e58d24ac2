//! Random payload values for repeated publishes
//!
//! A mock spec names payload fields and the kind of value to put in them,
//! e.g. `id:int,sent:time` or `["id:int", "sent:time"]`. Every publish gets
//! freshly generated values.

use chrono::{SecondsFormat, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

use super::{Task, TestCase};

/// Kind of random value generated for a field
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockKind {
    Int,
    Float,
    Text,
    Time,
    Bool,
    /// Unrecognized type name; filled with a short random string
    Unknown(String),
}

impl MockKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "int" => MockKind::Int,
            "float" | "float64" => MockKind::Float,
            "string" => MockKind::Text,
            "time" | "datetime" | "date" => MockKind::Time,
            "bool" | "boolean" => MockKind::Bool,
            other => MockKind::Unknown(other.to_string()),
        }
    }

    pub fn generate<R: Rng>(&self, rng: &mut R) -> Value {
        match self {
            MockKind::Int => Value::from(rng.random_range(0..1_000_000i64)),
            MockKind::Float => Value::from(rng.random::<f64>() * 100_000.0),
            MockKind::Text => Value::from(random_text(rng, 12)),
            MockKind::Time => Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            MockKind::Bool => Value::from(rng.random_bool(0.5)),
            MockKind::Unknown(_) => Value::from(random_text(rng, 8)),
        }
    }
}

impl fmt::Display for MockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockKind::Int => write!(f, "int"),
            MockKind::Float => write!(f, "float"),
            MockKind::Text => write!(f, "string"),
            MockKind::Time => write!(f, "time"),
            MockKind::Bool => write!(f, "bool"),
            MockKind::Unknown(name) => write!(f, "{name}"),
        }
    }
}

fn random_text<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockField {
    pub field: String,
    pub kind: MockKind,
}

/// Parsed `field:type` list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MockSpec {
    pub fields: Vec<MockField>,
    /// Entries that were not `field:type` pairs; they are skipped
    pub invalid: Vec<String>,
}

impl MockSpec {
    /// Parse a comma separated list or a JSON array of `field:type` pairs
    ///
    /// Never fails: malformed pairs end up in `invalid` and unknown types
    /// are kept as [`MockKind::Unknown`], both with a warning.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let entries: Vec<String> = if raw.starts_with('[') {
            serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|_| {
                split_pairs(raw.trim_start_matches('[').trim_end_matches(']'))
            })
        } else {
            split_pairs(raw)
        };

        let mut spec = MockSpec::default();
        for entry in entries {
            let entry = entry.trim_matches(|c| matches!(c, ' ' | '"' | '\n' | '\t'));
            if entry.is_empty() {
                continue;
            }

            match entry.split_once(':') {
                Some((field, kind)) if !field.trim().is_empty() => {
                    let kind = MockKind::parse(kind);
                    if let MockKind::Unknown(name) = &kind {
                        warn!("Unknown mock type {name:?} for field {field}, using a random string");
                    }
                    spec.fields.push(MockField {
                        field: field.trim().to_string(),
                        kind,
                    });
                }
                _ => {
                    warn!("Ignoring mock entry {entry:?}, expected field:type");
                    spec.invalid.push(entry.to_string());
                }
            }
        }
        spec
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Overwrite the mocked fields of a payload with fresh values
    pub fn apply<R: Rng>(&self, payload: &mut Map<String, Value>, rng: &mut R) {
        for mock in &self.fields {
            payload.insert(mock.field.clone(), mock.kind.generate(rng));
        }
    }
}

fn split_pairs(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}

/// Tasks publishing a test case `quantity` times, each with its own mocked
/// values
///
/// A quantity of 0 is treated as 1. Task names get a `#n` suffix when more
/// than one task is built.
pub fn repeated_tasks<R: Rng>(
    test_case: &TestCase,
    quantity: usize,
    mocks: &MockSpec,
    rng: &mut R,
) -> Vec<Task<TestCase>> {
    let quantity = quantity.max(1);
    (0..quantity)
        .map(|i| {
            let mut payload = test_case.clone();
            mocks.apply(&mut payload.json_pool, rng);
            let name = if quantity == 1 {
                test_case.name.clone()
            } else {
                format!("{} #{}", test_case.name, i + 1)
            };
            Task::new(name, payload)
        })
        .collect()
}

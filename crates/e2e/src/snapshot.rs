//! Expected-state snapshots used as the oracle at each verification checkpoint

use serde_json::{Map, Value};

use crate::error::FieldMismatch;

/// Ordered mapping of field name to JSON value
pub type FieldSet = Map<String, Value>;

/// Expectation for a single field
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    /// The field must equal this value
    Value(Value),
    /// The field must be missing or JSON `null`
    Absent,
}

impl Expected {
    fn describe(&self) -> String {
        match self {
            Expected::Value(value) => value.to_string(),
            Expected::Absent => "absent (missing or null)".to_string(),
        }
    }

    fn matches(&self, actual: Option<&Value>) -> bool {
        match (self, actual) {
            (Expected::Absent, None) | (Expected::Absent, Some(Value::Null)) => true,
            (Expected::Absent, Some(_)) => false,
            (Expected::Value(_), None) => false,
            (Expected::Value(expected), Some(actual)) => values_match(expected, actual),
        }
    }
}

/// Immutable set of field expectations, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    fields: Vec<(String, Expected)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect exactly the values of `fields`
    pub fn from_fields(fields: &FieldSet) -> Self {
        fields
            .iter()
            .fold(Self::new(), |snapshot, (name, value)| snapshot.expect(name, value.clone()))
    }

    /// Expect `field` to equal `value`, replacing any earlier expectation
    pub fn expect(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field.into(), Expected::Value(value.into()))
    }

    /// Expect `field` to be missing or null
    pub fn absent(self, field: impl Into<String>) -> Self {
        self.set(field.into(), Expected::Absent)
    }

    /// Copy of this snapshot with `updates` overlaid; untouched fields keep their expectation
    pub fn with_updates(&self, updates: &FieldSet) -> Self {
        updates
            .iter()
            .fold(self.clone(), |snapshot, (name, value)| snapshot.expect(name, value.clone()))
    }

    /// Copy of this snapshot with `names` expected absent
    pub fn with_absent(&self, names: &[&str]) -> Self {
        names
            .iter()
            .fold(self.clone(), |snapshot, name| snapshot.absent(*name))
    }

    pub fn get(&self, field: &str) -> Option<&Expected> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, expected)| expected)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expected)> {
        self.fields.iter().map(|(name, expected)| (name.as_str(), expected))
    }

    /// Every field of the snapshot that `observed` does not satisfy.
    /// Fields present in `observed` but not named by the snapshot are ignored.
    pub fn compare(&self, observed: &FieldSet) -> Vec<FieldMismatch> {
        self.fields
            .iter()
            .filter_map(|(name, expected)| {
                let actual = observed.get(name);
                if expected.matches(actual) {
                    None
                } else {
                    Some(FieldMismatch {
                        field: name.clone(),
                        expected: expected.describe(),
                        actual: actual
                            .map(Value::to_string)
                            .unwrap_or_else(|| "missing".to_string()),
                    })
                }
            })
            .collect()
    }

    fn set(mut self, field: String, expected: Expected) -> Self {
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = expected,
            None => self.fields.push((field, expected)),
        }
        self
    }
}

/// Exact JSON equality, plus numeric equality when one side is a number and
/// the other a number or numeric string (`2023`, `2023.0`, `"2023"`).
/// Integers compare exactly; `f64` is used only when one side is fractional.
fn values_match(expected: &Value, actual: &Value) -> bool {
    if expected == actual {
        return true;
    }
    if !expected.is_number() && !actual.is_number() {
        return false;
    }
    match (as_number(expected), as_number(actual)) {
        (Some(Numeric::Int(a)), Some(Numeric::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i128),
    Float(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }
}

fn as_number(value: &Value) -> Option<Numeric> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .map(Numeric::Int)
            .or_else(|| n.as_f64().map(Numeric::Float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i128>()
                .map(Numeric::Int)
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(Numeric::Float))
        }
        _ => None,
    }
}

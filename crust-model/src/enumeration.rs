use serde_json::Value;

/// A named set of integer-valued labels.
///
/// The wire carries the integer; the accessor layer hands out the label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    variants: Vec<(i64, String)>,
}

impl EnumType {
    /// Creates an enum from `(value, label)` pairs.
    pub fn new<L: Into<String>>(
        name: impl Into<String>,
        variants: impl IntoIterator<Item = (i64, L)>,
    ) -> Self {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(|(v, l)| (v, l.into())).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label for an integer value.
    pub fn label(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(v, _)| *v == value)
            .map(|(_, l)| l.as_str())
    }

    /// Integer value for a label.
    pub fn value_of(&self, label: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(_, l)| l == label)
            .map(|(v, _)| *v)
    }

    /// All `(value, label)` pairs in declaration order.
    pub fn variants(&self) -> impl Iterator<Item = (i64, &str)> {
        self.variants.iter().map(|(v, l)| (*v, l.as_str()))
    }

    /// Reads an integer from either a wire integer or a label string.
    pub fn coerce(&self, value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => self.value_of(s).or_else(|| s.trim().parse().ok()),
            _ => None,
        }
    }

    /// Label for a wire value, as a JSON string, or `null` when unknown.
    pub fn label_value(&self, raw: &Value) -> Value {
        raw.as_i64()
            .and_then(|v| self.label(v))
            .map_or(Value::Null, |l| Value::String(l.to_string()))
    }
}

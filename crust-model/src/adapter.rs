//! Scalar adapter contract and the built-in adapters.
//!
//! An adapter owns the internal representation of one property value and
//! converts between it and the wire ("raw") representation. The entity holds
//! one adapter instance per adapter-typed property for its whole lifetime.

use serde_json::{Map, Value};
use std::fmt;

use crate::schema::PropertyConfig;
use crate::validate::ValidationError;

/// A custom scalar data type.
pub trait DataType: fmt::Debug + Send + Sync {
    /// Wire representation.
    fn raw(&self) -> Value;

    /// Replaces the internal state from a wire value.
    fn set_raw(&mut self, raw: &Value);

    /// Normalized representation handed to callers.
    fn value(&self) -> Value;

    /// Replaces the internal state from a normalized value.
    fn set_value(&mut self, value: &Value);

    /// Self-validation; empty means valid.
    fn validate(&self) -> Vec<ValidationError> {
        Vec::new()
    }
}

/// Constructs a fresh adapter instance for a property.
pub type AdapterFactory = fn(&PropertyConfig) -> Box<dyn DataType>;

// ── Flag ─────────────────────────────────────────────────────────

/// Bit flags, sent as one integer and held as the list of set bits.
///
/// Each element of the normalized value is a power of two, lowest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flag {
    bits: Vec<i64>,
}

impl Flag {
    pub fn new(raw: i64) -> Self {
        Self {
            bits: Self::to_bits(raw),
        }
    }

    /// Adapter factory for schema registration.
    pub fn boxed(_config: &PropertyConfig) -> Box<dyn DataType> {
        Box::new(Self::default())
    }

    /// Splits an integer into its set powers of two.
    pub fn to_bits(raw: i64) -> Vec<i64> {
        (0..63)
            .map(|shift| 1i64 << shift)
            .filter(|bit| raw & bit != 0)
            .collect()
    }

    /// Sums a list of flag values back into one integer.
    pub fn to_int(bits: &[i64]) -> i64 {
        bits.iter().fold(0, |acc, bit| acc | bit)
    }

    pub fn bits(&self) -> &[i64] {
        &self.bits
    }

    /// Replaces the set bits directly.
    pub fn set_bits(&mut self, bits: Vec<i64>) {
        self.bits = Self::to_bits(Self::to_int(&bits));
    }
}

impl DataType for Flag {
    fn raw(&self) -> Value {
        Value::from(Self::to_int(&self.bits))
    }

    fn set_raw(&mut self, raw: &Value) {
        self.bits = Self::to_bits(raw.as_i64().unwrap_or(0));
    }

    fn value(&self) -> Value {
        Value::Array(self.bits.iter().map(|b| Value::from(*b)).collect())
    }

    fn set_value(&mut self, value: &Value) {
        match value {
            Value::Array(items) => {
                self.set_bits(items.iter().filter_map(Value::as_i64).collect());
            }
            Value::Null => self.bits.clear(),
            other => self.set_raw(other),
        }
    }
}

// ── BitArray ─────────────────────────────────────────────────────

/// A fixed-width row of booleans, sent as one integer.
///
/// Width comes from the property's `max_length` (default 1). The first
/// element is the most significant bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitArray {
    width: usize,
    bits: Vec<bool>,
}

impl BitArray {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            bits: vec![false; width],
        }
    }

    /// Adapter factory for schema registration.
    pub fn boxed(config: &PropertyConfig) -> Box<dyn DataType> {
        Box::new(Self::new(config.max_length.unwrap_or(1)))
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    fn load(&mut self, raw: u64) {
        let binary = format!("{raw:0width$b}", width = self.width);
        self.bits = binary.chars().map(|c| c == '1').collect();
    }

    fn to_int(&self) -> u64 {
        self.bits.iter().fold(0, |acc, bit| (acc << 1) | u64::from(*bit))
    }
}

impl DataType for BitArray {
    fn raw(&self) -> Value {
        Value::from(self.to_int())
    }

    fn set_raw(&mut self, raw: &Value) {
        self.load(raw.as_u64().unwrap_or(0));
    }

    fn value(&self) -> Value {
        Value::Array(self.bits.iter().map(|b| Value::Bool(*b)).collect())
    }

    fn set_value(&mut self, value: &Value) {
        match value {
            Value::Array(items) => {
                self.bits = items.iter().map(|v| v.as_bool().unwrap_or(false)).collect();
            }
            other => self.set_raw(other),
        }
    }
}

// ── Point ────────────────────────────────────────────────────────

/// A geographic coordinate, sent as `{latitude, longitude}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Point {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }

    /// Adapter factory for schema registration.
    pub fn boxed(_config: &PropertyConfig) -> Box<dyn DataType> {
        Box::new(Self::default())
    }
}

impl DataType for Point {
    fn raw(&self) -> Value {
        if self.latitude.is_none() && self.longitude.is_none() {
            return Value::Null;
        }
        let mut map = Map::new();
        map.insert("latitude".into(), self.latitude.map_or(Value::Null, Value::from));
        map.insert("longitude".into(), self.longitude.map_or(Value::Null, Value::from));
        Value::Object(map)
    }

    fn set_raw(&mut self, raw: &Value) {
        self.latitude = raw.get("latitude").and_then(Value::as_f64);
        self.longitude = raw.get("longitude").and_then(Value::as_f64);
    }

    fn value(&self) -> Value {
        self.raw()
    }

    fn set_value(&mut self, value: &Value) {
        self.set_raw(value);
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.latitude.is_none() {
            errors.push(ValidationError::required_part("latitude"));
        }
        if self.longitude.is_none() {
            errors.push(ValidationError::required_part("longitude"));
        }
        errors
    }
}

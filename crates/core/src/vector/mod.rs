//! Vector data structures: features with attributes and optional geometry.
//!
//! Lookup tables (sensitivity scores, seasonality factors) are feature
//! collections whose features carry no geometry.

use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Numeric view of the value. Only numeric variants convert; text
    /// must go through an explicit conversion first.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse-anything numeric view, used by `to_real` and text-to-float.
    pub fn to_real(&self) -> Option<f64> {
        match self {
            AttributeValue::String(s) => s.trim().parse::<f64>().ok(),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64(),
        }
    }

    /// Value used to match rows in a join. `Null` never matches.
    pub fn join_key(&self) -> Option<String> {
        match self {
            AttributeValue::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "NULL"),
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<Option<f64>> for AttributeValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(AttributeValue::Null, AttributeValue::Float)
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, AttributeValue>,
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Create a feature with no geometry (a plain table row)
    pub fn empty() -> Self {
        Self {
            geometry: None,
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Builder-style attribute setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set_property(key, value.into());
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features sharing one ordered field list.
///
/// The field list is the table schema: every feature pushed registers
/// its attribute names, and missing attributes read as `Null`.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    fields: Vec<String>,
    features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty collection with a predeclared schema
    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collection = Self::new();
        for field in fields {
            collection.add_field(field);
        }
        collection
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    /// Register a field; no-op if it already exists
    pub fn add_field(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has_field(&name) {
            self.fields.push(name);
        }
    }

    pub fn push(&mut self, feature: Feature) {
        let mut new_fields: Vec<&String> = feature
            .properties
            .keys()
            .filter(|k| !self.has_field(k))
            .collect();
        new_fields.sort();
        let new_fields: Vec<String> = new_fields.into_iter().cloned().collect();
        self.fields.extend(new_fields);
        self.features.push(feature);
    }

    /// Attribute of feature `index`, `Null` when absent
    pub fn value(&self, index: usize, field: &str) -> &AttributeValue {
        self.features
            .get(index)
            .and_then(|f| f.get_property(field))
            .unwrap_or(&AttributeValue::Null)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Feature> {
        self.features.iter_mut()
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

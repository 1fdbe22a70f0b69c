use std::fmt;

use serde::Serialize;

use super::schema::FeatureSchema;

/// Value of a single attribute of a feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

impl AttributeValue {
    /// Numeric view of the value, `None` for text and null.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(value) => Some(*value as f64),
            AttributeValue::Real(value) => Some(*value),
            AttributeValue::Text(_) | AttributeValue::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(value) => write!(f, "{}", value),
            AttributeValue::Real(value) => write!(f, "{}", value),
            AttributeValue::Text(value) => write!(f, "{}", value),
            AttributeValue::Null => Ok(()),
        }
    }
}

/// A geometry plus one attribute value per field of the owning collection's schema,
/// in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: geo::Geometry,
    pub attributes: Vec<AttributeValue>,
}

impl Feature {
    pub fn new(geometry: geo::Geometry, attributes: Vec<AttributeValue>) -> Self {
        Self {
            geometry,
            attributes,
        }
    }

    /// Look up an attribute by field name.
    pub fn attribute(&self, schema: &FeatureSchema, name: &str) -> Option<&AttributeValue> {
        schema
            .position(name)
            .and_then(|position| self.attributes.get(position))
    }
}

impl From<geo::Geometry> for Feature {
    fn from(value: geo::Geometry) -> Self {
        Self {
            geometry: value,
            attributes: Vec::new(),
        }
    }
}

/// Named set of features sharing one schema.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    pub name: String,
    pub schema: FeatureSchema,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(name: &str, schema: FeatureSchema, features: Vec<Feature>) -> Self {
        Self {
            name: name.to_string(),
            schema,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

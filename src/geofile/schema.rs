use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value type of an attribute field. Maps onto the GDAL field types
/// `OFTInteger`/`OFTInteger64`, `OFTReal` and `OFTString`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Real,
    Text,
}

/// Declaration of a single attribute field of a feature collection.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Field width, e.g. number of characters for text or digits for integers.
    #[serde(default)]
    pub length: Option<i32>,
    /// Number of decimals, only meaningful for real fields.
    #[serde(default)]
    pub precision: Option<i32>,
    #[serde(default)]
    pub nullable: bool,
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            length: None,
            precision: None,
            nullable: false,
        }
    }

    pub fn with_length(mut self, length: i32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Integer fields wider than 9 digits are stored as 64 bit integers, narrower ones as
    /// 32 bit integers (a dBASE LONG).
    pub fn is_wide_integer(&self) -> bool {
        self.field_type == FieldType::Integer && matches!(self.length, Some(length) if length > 9)
    }

    /// Whether an integer value can be stored in this field without overflowing.
    pub fn holds_integer(&self, value: i64) -> bool {
        self.is_wide_integer() || i32::try_from(value).is_ok()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("field at position {0} has an empty name")]
    EmptyName(usize),
    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),
}

/// Ordered, immutable list of field definitions shared by every feature of a collection.
/// The attribute values of a feature are stored in the same order as the fields here.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    fields: Vec<FieldDefinition>,
}

impl FeatureSchema {
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for (position, field) in fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyName(position));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }
}

//! Runtime schema projection.
//!
//! The output shape is only known once a plan is loaded. A [`RecordSchema`]
//! describes that shape (one property per plan field) and projects sanitized
//! data into it by encoding the data generically and decoding it back
//! through the schema, so the emitted [`Record`] has exactly the declared
//! properties:
//!
//! - keys not in the schema are dropped,
//! - declared keys missing from the data get the property's zero value,
//! - values of the wrong type are coerced or zeroed, never an error.

mod decode;

use std::collections::HashMap;

use serde::de::DeserializeSeed;
use serde::Serialize;

use crate::convert::ValueKind;
use crate::plan::Field;
use crate::record::{FieldValue, Record, Sanitized};

pub use decode::RecordSeed;

/// Error type for projection
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("failed to encode sanitized data: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode data through the record schema: {0}")]
    Decode(#[source] serde_json::Error),
}

/// How many values a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Scalar by default, or a sequence when the harvester returned one.
    AsHarvested,
    /// Always a sequence.
    List,
}

/// One property of the projected record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    pub cardinality: Cardinality,
}

impl Property {
    pub fn from_field(field: &Field) -> Self {
        Self {
            name: field.key(),
            kind: field.kind(),
            cardinality: if field.field_type.is_list() {
                Cardinality::List
            } else {
                Cardinality::AsHarvested
            },
        }
    }

    /// Value used when the property is missing from the data.
    pub fn zero(&self) -> FieldValue {
        match self.cardinality {
            Cardinality::List => FieldValue::List(Vec::new()),
            Cardinality::AsHarvested => self.kind.zero(),
        }
    }
}

/// Record description built from a plan's fields.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSchema {
    properties: Vec<Property>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl RecordSchema {
    pub fn from_fields(fields: &[Field]) -> Self {
        let properties: Vec<Property> = fields.iter().map(Property::from_field).collect();

        let index = properties
            .iter()
            .enumerate()
            .map(|(i, property)| (property.name.clone(), i))
            .collect();

        Self { properties, index }
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.position(name).map(|i| &self.properties[i])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Record with every property set to its zero value.
    pub fn zero_record(&self) -> Record {
        let mut record = Record::new();
        for property in &self.properties {
            record.insert(property.name.clone(), property.zero());
        }
        record
    }

    /// Project sanitized data into the schema's shape.
    pub fn project(&self, sanitized: &Sanitized) -> Result<Record, ProjectionError> {
        let encoded = serde_json::to_vec(sanitized).map_err(ProjectionError::Encode)?;
        self.decode(&encoded)
    }

    /// Decode JSON bytes through the schema.
    pub fn decode(&self, bytes: &[u8]) -> Result<Record, ProjectionError> {
        let mut deserializer = serde_json::Deserializer::from_slice(bytes);
        let record = RecordSeed(self)
            .deserialize(&mut deserializer)
            .map_err(ProjectionError::Decode)?;
        deserializer.end().map_err(ProjectionError::Decode)?;

        tracing::trace!(properties = record.len(), "projected record");

        Ok(record)
    }

    /// Decode an in-memory JSON value through the schema, e.g. the output of
    /// a transform script.
    pub fn project_value(&self, value: &serde_json::Value) -> Result<Record, ProjectionError> {
        RecordSeed(self)
            .deserialize(value)
            .map_err(ProjectionError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::FieldType;
    use serde_json::json;

    fn schema(fields: &[(&str, FieldType)]) -> RecordSchema {
        let fields: Vec<Field> = fields
            .iter()
            .map(|(name, ty)| Field::new(*name, *ty, "p"))
            .collect();
        RecordSchema::from_fields(&fields)
    }

    #[test]
    fn test_projection_keeps_exactly_the_declared_property() {
        let schema = schema(&[("numberWithText", FieldType::new(ValueKind::Number))]);

        let mut sanitized = Sanitized::new();
        sanitized.insert("number_with_text".to_string(), FieldValue::Integer(1337));
        sanitized.insert("extra".to_string(), FieldValue::Text("dropped".to_string()));

        let record = schema.project(&sanitized).unwrap();

        assert_eq!(record.len(), 1);
        assert_eq!(record.get("number_with_text"), Some(&FieldValue::Integer(1337)));
        assert_eq!(record.to_json().unwrap(), r#"{"number_with_text":1337}"#);
    }

    #[test]
    fn test_missing_properties_are_zeroed_in_plan_order() {
        let schema = schema(&[
            ("title", FieldType::new(ValueKind::Text)),
            ("count", FieldType::new(ValueKind::Number)),
            ("price", FieldType::new(ValueKind::Decimal)),
            ("at", FieldType::new(ValueKind::DateTime)),
            ("tags", FieldType::list_of(ValueKind::Text)),
        ]);

        let record = schema.project(&Sanitized::new()).unwrap();

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"title": "", "count": 0, "price": 0.0, "at": "", "tags": []})
        );
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["title", "count", "price", "at", "tags"]);
    }

    #[test]
    fn test_harvested_sequences_survive_projection() {
        let schema = schema(&[("textList", FieldType::new(ValueKind::Text))]);

        let mut sanitized = Sanitized::new();
        sanitized.insert("text_list".to_string(), FieldValue::from(vec!["a", "b", "c"]));

        let record = schema.project(&sanitized).unwrap();

        assert_eq!(record.get("text_list"), Some(&FieldValue::from(vec!["a", "b", "c"])));
    }

    #[test]
    fn test_list_properties_wrap_scalars() {
        let schema = schema(&[("ids", FieldType::list_of(ValueKind::Number))]);

        let record = schema.project_value(&json!({"ids": "7"})).unwrap();

        assert_eq!(record.get("ids"), Some(&FieldValue::from(vec![7i64])));
    }

    #[test]
    fn test_mismatches_are_coerced_or_zeroed() {
        let schema = schema(&[
            ("count", FieldType::new(ValueKind::Number)),
            ("price", FieldType::new(ValueKind::Decimal)),
            ("title", FieldType::new(ValueKind::Text)),
            ("nested", FieldType::new(ValueKind::Number)),
            ("deep", FieldType::list_of(ValueKind::Number)),
        ]);

        let record = schema
            .project_value(&json!({
                "count": "42",
                "price": 3,
                "title": 12.5,
                "nested": {"a": 1},
                "deep": [1, [2, 3], null, "4"]
            }))
            .unwrap();

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "count": 42,
                "price": 3.0,
                "title": "12.5",
                "nested": 0,
                "deep": [1, 0, 0, 4]
            })
        );
    }

    #[test]
    fn test_non_object_projects_to_zero_record() {
        let schema = schema(&[("count", FieldType::new(ValueKind::Number))]);

        assert_eq!(schema.decode(b"[1, 2, 3]").unwrap(), schema.zero_record());
        assert_eq!(schema.decode(b"null").unwrap(), schema.zero_record());
    }

    #[test]
    fn test_malformed_bytes_are_an_error() {
        let schema = schema(&[("count", FieldType::new(ValueKind::Number))]);

        assert!(matches!(schema.decode(b"{\"count\": "), Err(ProjectionError::Decode(_))));
        assert!(matches!(schema.decode(b"{} {}"), Err(ProjectionError::Decode(_))));
    }

    #[test]
    fn test_schema_description() {
        let schema = schema(&[("publishedAt", FieldType::list_of(ValueKind::DateTime))]);

        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({"properties": [{"name": "published_at", "type": "datetime", "cardinality": "list"}]})
        );
    }
}

//! The raw record model.
//!
//! A raw record is `{ "_type": name | [names], "id": scalar, ...fields }`.
//! Parsing classifies every field exactly once into a [`RawValue`] and drops
//! transient fields, so downstream code works with tagged values instead of
//! probing JSON shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TypeError};
use crate::identity::{EntityId, TypeName};
use crate::scalar::Scalar;

/// Key names and transient marker used when reading raw records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFormat {
    /// Fields whose name starts with this prefix are never stored.
    /// An empty prefix disables the convention.
    pub transient_prefix: String,
    /// Key holding the type tag.
    pub type_key: String,
    /// Key holding the record id.
    pub id_key: String,
}

impl Default for RawFormat {
    fn default() -> Self {
        Self {
            transient_prefix: "_".into(),
            type_key: "_type".into(),
            id_key: "id".into(),
        }
    }
}

/// A parsed record that has not been normalized into a store yet.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRecord {
    /// Declared types in declaration order, without duplicates. Empty only
    /// for partial records that omitted the tag.
    pub types: Vec<TypeName>,
    pub id: EntityId,
    /// Data fields in key order; transient fields and the type/id keys are
    /// already removed.
    pub fields: Vec<(String, RawValue)>,
}

/// A classified field value of a raw record.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Scalar(Scalar),
    Record(RawRecord),
    List(Vec<RawRecord>),
}

impl RawRecord {
    /// The first declared type, if any.
    pub fn primary_type(&self) -> Option<&TypeName> {
        self.types.first()
    }

    /// Look up a data field by name.
    pub fn field(&self, name: &str) -> Option<&RawValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

impl RawFormat {
    /// Returns `true` if a field with this name is transient.
    pub fn is_transient(&self, field: &str) -> bool {
        !self.transient_prefix.is_empty() && field.starts_with(&self.transient_prefix)
    }

    /// Parse a complete record: the type tag is required at every depth.
    pub fn parse_record(&self, value: &Value) -> Result<RawRecord> {
        self.parse(value, true)
    }

    /// Parse a partial record for merging. Type tags may be omitted; ids may not.
    pub fn parse_partial(&self, value: &Value) -> Result<RawRecord> {
        self.parse(value, false)
    }

    /// Parse either a single complete record or an array of them.
    pub fn parse_batch(&self, value: &Value) -> Result<Vec<RawRecord>> {
        match value {
            Value::Array(items) => items.iter().map(|v| self.parse_record(v)).collect(),
            other => Ok(vec![self.parse_record(other)?]),
        }
    }

    fn parse(&self, value: &Value, require_type: bool) -> Result<RawRecord> {
        let Value::Object(object) = value else {
            return Err(TypeError::NotARecord(kind_of(value).into()));
        };

        let types = self.parse_types(object)?;
        if require_type && types.is_empty() {
            return Err(TypeError::MissingType {
                key: self.type_key.clone(),
            });
        }

        let id = match object.get(&self.id_key) {
            None | Some(Value::Null) => {
                return Err(TypeError::MissingId {
                    key: self.id_key.clone(),
                })
            }
            Some(v) => EntityId::from_json(v)?,
        };

        let mut fields = Vec::with_capacity(object.len());
        for (name, value) in object {
            if name == &self.type_key || name == &self.id_key || self.is_transient(name) {
                continue;
            }
            fields.push((name.clone(), self.parse_value(name, value, require_type)?));
        }

        Ok(RawRecord { types, id, fields })
    }

    fn parse_types(&self, object: &Map<String, Value>) -> Result<Vec<TypeName>> {
        match object.get(&self.type_key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(name)) => Ok(vec![TypeName::from(name.as_str())]),
            Some(Value::Array(names)) => {
                let mut types: Vec<TypeName> = Vec::with_capacity(names.len());
                for name in names {
                    let Value::String(name) = name else {
                        return Err(TypeError::InvalidType(name.to_string()));
                    };
                    if !types.iter().any(|t| t.as_str() == name) {
                        types.push(TypeName::from(name.as_str()));
                    }
                }
                Ok(types)
            }
            Some(other) => Err(TypeError::InvalidType(other.to_string())),
        }
    }

    fn parse_value(&self, field: &str, value: &Value, require_type: bool) -> Result<RawValue> {
        match value {
            Value::Array(items) => {
                let mut records = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    if !item.is_object() {
                        return Err(TypeError::InvalidListElement {
                            field: field.to_string(),
                            index,
                        });
                    }
                    records.push(self.parse(item, require_type)?);
                }
                Ok(RawValue::List(records))
            }
            Value::Object(_) => Ok(RawValue::Record(self.parse(value, require_type)?)),
            scalar => Ok(RawValue::Scalar(
                Scalar::from_json(scalar).unwrap_or(Scalar::Null),
            )),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn format() -> RawFormat {
        RawFormat::default()
    }

    #[test]
    fn parses_flat_record() {
        let raw = format()
            .parse_record(&json!({"_type": "station", "id": 101, "name": "Gunitsawa"}))
            .unwrap();
        assert_eq!(raw.types, vec![TypeName::from("station")]);
        assert_eq!(raw.id, EntityId::Int(101));
        assert_eq!(raw.fields.len(), 1);
        assert_eq!(
            raw.field("name"),
            Some(&RawValue::Scalar(Scalar::from("Gunitsawa")))
        );
    }

    #[test]
    fn id_is_not_a_field_and_transients_are_dropped() {
        let raw = format()
            .parse_record(&json!({"_type": "a", "id": 1, "_cache": 5, "x": null}))
            .unwrap();
        assert!(raw.field("id").is_none());
        assert!(raw.field("_cache").is_none());
        assert_eq!(raw.field("x"), Some(&RawValue::Scalar(Scalar::Null)));
    }

    #[test]
    fn multi_type_tags_are_deduplicated_in_order() {
        let raw = format()
            .parse_record(&json!({"_type": ["category", "category_root", "category"], "id": 1}))
            .unwrap();
        assert_eq!(
            raw.types,
            vec![TypeName::from("category"), TypeName::from("category_root")]
        );
        assert_eq!(raw.primary_type(), Some(&TypeName::from("category")));
    }

    #[test]
    fn nested_objects_and_lists_are_classified() {
        let raw = format()
            .parse_record(&json!({
                "_type": "station_category",
                "id": 1,
                "station": {"_type": "station", "id": 101},
                "tags": [{"_type": "tag", "id": "a"}, {"_type": "tag", "id": "b"}]
            }))
            .unwrap();
        match raw.field("station") {
            Some(RawValue::Record(child)) => assert_eq!(child.id, EntityId::Int(101)),
            other => panic!("unexpected {other:?}"),
        }
        match raw.field("tags") {
            Some(RawValue::List(items)) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn complete_records_require_type_at_every_depth() {
        let err = format()
            .parse_record(&json!({"_type": "a", "id": 1, "child": {"id": 2}}))
            .unwrap_err();
        assert_eq!(err, TypeError::MissingType { key: "_type".into() });
    }

    #[test]
    fn partial_records_may_omit_type() {
        let raw = format()
            .parse_partial(&json!({"id": 2, "child": {"id": 3, "name": "x"}}))
            .unwrap();
        assert!(raw.types.is_empty());
        assert!(matches!(raw.field("child"), Some(RawValue::Record(c)) if c.types.is_empty()));
    }

    #[test]
    fn missing_or_null_id_is_rejected() {
        assert_eq!(
            format().parse_record(&json!({"_type": "a"})).unwrap_err(),
            TypeError::MissingId { key: "id".into() }
        );
        assert!(format().parse_record(&json!({"_type": "a", "id": null})).is_err());
    }

    #[test]
    fn invalid_type_tags_are_rejected() {
        assert!(matches!(
            format().parse_record(&json!({"_type": 3, "id": 1})),
            Err(TypeError::InvalidType(_))
        ));
        assert!(matches!(
            format().parse_record(&json!({"_type": ["a", 1], "id": 1})),
            Err(TypeError::InvalidType(_))
        ));
        assert!(matches!(
            format().parse_record(&json!({"_type": [], "id": 1})),
            Err(TypeError::MissingType { .. })
        ));
    }

    #[test]
    fn scalar_list_elements_are_rejected() {
        let err = format()
            .parse_record(&json!({"_type": "a", "id": 1, "tags": ["x"]}))
            .unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidListElement {
                field: "tags".into(),
                index: 0
            }
        );
    }

    #[test]
    fn non_objects_are_not_records() {
        assert_eq!(
            format().parse_record(&json!(5)).unwrap_err(),
            TypeError::NotARecord("a number".into())
        );
    }

    #[test]
    fn batch_accepts_single_or_array() {
        let one = format().parse_batch(&json!({"_type": "a", "id": 1})).unwrap();
        assert_eq!(one.len(), 1);
        let many = format()
            .parse_batch(&json!([{"_type": "a", "id": 1}, {"_type": "a", "id": 2}]))
            .unwrap();
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn custom_keys_and_empty_prefix() {
        let custom = RawFormat {
            transient_prefix: String::new(),
            type_key: "kind".into(),
            id_key: "key".into(),
        };
        let raw = custom
            .parse_record(&json!({"kind": "a", "key": "k1", "_keep": 1}))
            .unwrap();
        assert_eq!(raw.id, EntityId::from("k1"));
        assert!(raw.field("_keep").is_some());
    }
}

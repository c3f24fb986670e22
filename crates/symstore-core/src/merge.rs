//! Field-by-field merge of partial records into existing ones.
//!
//! Merge policy per incoming field:
//!
//! - list: not merged (element additions and removals are out of scope)
//! - object with the same id as the current reference: merged recursively
//! - any other object: the reference is replaced, then merged
//! - null: the field is removed
//! - scalar: replaced when different
//!
//! Changed fields fire their field subscriptions, then the record's own
//! subscriptions, then those of each direct parent. Bubbling stops after
//! one hop.

use symstore_types::{RawRecord, RawValue, Scalar, TypeError};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::graph::Graph;
use crate::record::{FieldValue, RecordHandle};
use crate::subscription::Dispatch;

impl Graph {
    /// Merge `raw` into the record at `handle`. Returns `true` if any field
    /// changed, directly or through a nested merge.
    ///
    /// Input that would fail part-way is rejected before any field is
    /// written.
    pub(crate) fn merge_record(
        &mut self,
        handle: RecordHandle,
        raw: &RawRecord,
        dispatch: &mut Dispatch,
    ) -> StoreResult<bool> {
        self.check_replacements(handle, raw)?;
        self.merge_fields(handle, raw, dispatch)
    }

    /// Every nested object that would replace a reference must carry a type.
    /// Recursion follows the raw tree, so reference cycles cannot loop.
    fn check_replacements(&self, handle: RecordHandle, raw: &RawRecord) -> StoreResult<()> {
        for (name, value) in &raw.fields {
            let RawValue::Record(nested) = value else {
                continue;
            };
            let current = self
                .record(handle)?
                .fields
                .get(name)
                .and_then(FieldValue::as_reference);
            match current {
                Some(child) if self.record(child)?.id == nested.id => {
                    self.check_replacements(child, nested)?;
                }
                _ if nested.types.is_empty() => return Err(self.missing_type()),
                _ => {}
            }
        }
        Ok(())
    }

    fn missing_type(&self) -> StoreError {
        StoreError::Raw(TypeError::MissingType {
            key: self.config.format.type_key.clone(),
        })
    }

    fn merge_fields(
        &mut self,
        handle: RecordHandle,
        raw: &RawRecord,
        dispatch: &mut Dispatch,
    ) -> StoreResult<bool> {
        let mut changed: Vec<String> = Vec::new();

        for (name, value) in &raw.fields {
            let field_changed = match value {
                RawValue::List(_) => {
                    debug!(record = ?handle, field = %name, "list field left unmerged");
                    false
                }
                RawValue::Record(nested) => self.merge_reference(handle, name, nested, dispatch)?,
                RawValue::Scalar(Scalar::Null) => self.clear_field(handle, name)?,
                RawValue::Scalar(scalar) => self.merge_scalar(handle, name, scalar)?,
            };
            if field_changed {
                changed.push(name.clone());
            }
        }

        if changed.is_empty() {
            return Ok(false);
        }

        debug!(record = ?handle, id = %raw.id, fields = ?changed, "record changed");
        self.notify_changed(handle, &changed, dispatch)?;
        Ok(true)
    }

    fn merge_reference(
        &mut self,
        handle: RecordHandle,
        name: &str,
        nested: &RawRecord,
        dispatch: &mut Dispatch,
    ) -> StoreResult<bool> {
        let current = self
            .record(handle)?
            .fields
            .get(name)
            .and_then(FieldValue::as_reference);
        if let Some(child) = current {
            if self.record(child)?.id == nested.id {
                return self.merge_fields(child, nested, dispatch);
            }
        }

        if nested.types.is_empty() {
            return Err(self.missing_type());
        }

        let child = self.resolve_or_create(&nested.types, &nested.id, dispatch)?;
        let previous = self
            .record_mut(handle)?
            .fields
            .insert(name.to_string(), FieldValue::Reference(child));
        self.record_mut(child)?.add_parent(handle);
        if let Some(previous) = previous {
            self.release(handle, previous.references())?;
        }
        debug!(record = ?handle, field = %name, child = ?child, "reference replaced");

        self.merge_fields(child, nested, dispatch)?;
        Ok(true)
    }

    fn clear_field(&mut self, handle: RecordHandle, name: &str) -> StoreResult<bool> {
        let Some(previous) = self.record_mut(handle)?.fields.remove(name) else {
            return Ok(false);
        };
        let was_null = matches!(previous, FieldValue::Scalar(Scalar::Null));
        self.release(handle, previous.references())?;
        Ok(!was_null)
    }

    fn merge_scalar(
        &mut self,
        handle: RecordHandle,
        name: &str,
        scalar: &Scalar,
    ) -> StoreResult<bool> {
        let record = self.record_mut(handle)?;
        if let Some(FieldValue::Scalar(current)) = record.fields.get(name) {
            if current == scalar {
                return Ok(false);
            }
        }
        let previous = record
            .fields
            .insert(name.to_string(), FieldValue::Scalar(scalar.clone()));
        if let Some(previous) = previous {
            self.release(handle, previous.references())?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use symstore_types::{EntityId, RawFormat, TypeName};

    use super::*;
    use crate::config::StoreConfig;

    fn graph_with(value: Value) -> Graph {
        let mut g = Graph::new(StoreConfig::default());
        let raw = RawFormat::default().parse_record(&value).unwrap();
        let mut dispatch = Dispatch::new();
        g.load_record(&raw, None, &mut dispatch).unwrap();
        g
    }

    fn handle(g: &Graph, type_name: &str, id: i64) -> RecordHandle {
        g.find(&[TypeName::from(type_name)], &EntityId::Int(id)).unwrap()
    }

    fn merge(g: &mut Graph, type_name: &str, value: Value) -> bool {
        let raw = RawFormat::default().parse_partial(&value).unwrap();
        let h = g.find(&[TypeName::from(type_name)], &raw.id).unwrap();
        let mut dispatch = Dispatch::new();
        g.merge_record(h, &raw, &mut dispatch).unwrap()
    }

    fn scalar(g: &Graph, h: RecordHandle, field: &str) -> Option<Scalar> {
        g.record(h)
            .unwrap()
            .fields
            .get(field)
            .and_then(FieldValue::as_scalar)
            .cloned()
    }

    #[test]
    fn identical_scalars_report_no_change() {
        let mut g = graph_with(json!({"_type": "station", "id": 1, "name": "Chelela"}));
        assert!(!merge(&mut g, "station", json!({"id": 1, "name": "Chelela"})));
    }

    #[test]
    fn different_or_new_scalars_change() {
        let mut g = graph_with(json!({"_type": "station", "id": 1, "name": "Chelela"}));
        assert!(merge(&mut g, "station", json!({"id": 1, "name": "Hongtsho"})));
        assert!(merge(&mut g, "station", json!({"id": 1, "identifier": "56788"})));
        let h = handle(&g, "station", 1);
        assert_eq!(scalar(&g, h, "name"), Some(Scalar::from("Hongtsho")));
        assert_eq!(scalar(&g, h, "identifier"), Some(Scalar::from("56788")));
    }

    #[test]
    fn transient_fields_are_ignored() {
        let mut g = graph_with(json!({"_type": "station", "id": 1}));
        assert!(!merge(&mut g, "station", json!({"id": 1, "_dirty": true})));
    }

    #[test]
    fn null_removes_field_and_releases_child() {
        let mut g = graph_with(json!({
            "_type": "station_category",
            "id": 1,
            "station": {"_type": "station", "id": 101}
        }));
        let station = handle(&g, "station", 101);
        assert!(merge(&mut g, "station_category", json!({"id": 1, "station": null})));
        let sc = handle(&g, "station_category", 1);
        assert!(g.record(sc).unwrap().fields.get("station").is_none());
        assert!(g.record(station).unwrap().parents.is_empty());
        assert!(!merge(&mut g, "station_category", json!({"id": 1, "station": null})));
    }

    #[test]
    fn null_over_null_is_not_a_change() {
        let mut g = graph_with(json!({"_type": "sc", "id": 1, "unique_id": null}));
        assert!(!merge(&mut g, "sc", json!({"id": 1, "unique_id": null})));
    }

    #[test]
    fn same_id_reference_merges_recursively() {
        let mut g = graph_with(json!({
            "_type": "sc",
            "id": 1,
            "station": {"_type": "station", "id": 101, "name": "Gunitsawa"}
        }));
        assert!(!merge(&mut g, "sc", json!({"id": 1, "station": {"id": 101, "name": "Gunitsawa"}})));
        assert!(merge(&mut g, "sc", json!({"id": 1, "station": {"id": 101, "name": "Paro"}})));
        let station = handle(&g, "station", 101);
        assert_eq!(scalar(&g, station, "name"), Some(Scalar::from("Paro")));
    }

    #[test]
    fn different_id_replaces_reference() {
        let mut g = graph_with(json!({
            "_type": "sc",
            "id": 1,
            "station": {"_type": "station", "id": 101}
        }));
        let old = handle(&g, "station", 101);
        assert!(merge(
            &mut g,
            "sc",
            json!({"id": 1, "station": {"_type": "station", "id": 102, "name": "Chelela"}})
        ));
        let new = handle(&g, "station", 102);
        let sc = handle(&g, "sc", 1);
        assert_eq!(
            g.record(sc).unwrap().fields.get("station"),
            Some(&FieldValue::Reference(new))
        );
        assert!(g.record(old).unwrap().parents.is_empty());
        assert_eq!(g.record(new).unwrap().parents, vec![sc]);
        assert_eq!(scalar(&g, new, "name"), Some(Scalar::from("Chelela")));
    }

    #[test]
    fn replacement_marks_new_collection_member() {
        let mut g = graph_with(json!({"_type": "sc", "id": 1}));
        let raw = RawFormat::default()
            .parse_partial(&json!({"id": 1, "station": {"_type": "station", "id": 7}}))
            .unwrap();
        let h = handle(&g, "sc", 1);
        let mut dispatch = Dispatch::new();
        assert!(g.merge_record(h, &raw, &mut dispatch).unwrap());
        assert_eq!(dispatch.take_collections(), vec![TypeName::from("station")]);
    }

    #[test]
    fn replacement_without_type_is_an_error() {
        let mut g = graph_with(json!({"_type": "sc", "id": 1}));
        let raw = RawFormat::default()
            .parse_partial(&json!({"id": 1, "station": {"id": 7}}))
            .unwrap();
        let h = handle(&g, "sc", 1);
        let err = g.merge_record(h, &raw, &mut Dispatch::new()).unwrap_err();
        assert!(matches!(err, StoreError::Raw(TypeError::MissingType { .. })));
    }

    #[test]
    fn rejected_replacement_leaves_earlier_fields_untouched() {
        let mut g = graph_with(json!({"_type": "sc", "id": 1, "name": "a"}));
        let raw = RawFormat::default()
            .parse_partial(&json!({"id": 1, "name": "b", "station": {"id": 7}}))
            .unwrap();
        let h = handle(&g, "sc", 1);
        let mut dispatch = Dispatch::new();
        assert!(g.merge_record(h, &raw, &mut dispatch).is_err());
        assert_eq!(scalar(&g, h, "name"), Some(Scalar::from("a")));
        assert_eq!(dispatch.len(), 0);
        assert!(g.collections.get("station").is_none());
    }

    #[test]
    fn nested_replacement_without_type_is_caught_up_front() {
        let mut g = graph_with(json!({
            "_type": "sc",
            "id": 1,
            "name": "a",
            "station": {"_type": "station", "id": 101, "city": {"_type": "city", "id": 5}}
        }));
        let raw = RawFormat::default()
            .parse_partial(&json!({
                "id": 1,
                "name": "b",
                "station": {"id": 101, "city": {"id": 6}, "name": "Paro"}
            }))
            .unwrap();
        let h = handle(&g, "sc", 1);
        assert!(g.merge_record(h, &raw, &mut Dispatch::new()).is_err());
        assert_eq!(scalar(&g, h, "name"), Some(Scalar::from("a")));
        let station = handle(&g, "station", 101);
        assert_eq!(scalar(&g, station, "name"), None);
    }

    #[test]
    fn self_reference_is_checked_at_every_depth() {
        let mut g = graph_with(json!({"_type": "node", "id": 1, "next": {"_type": "node", "id": 1}}));
        let raw = RawFormat::default()
            .parse_partial(&json!({"id": 1, "label": "x", "next": {"id": 1, "next": {"id": 2}}}))
            .unwrap();
        let h = handle(&g, "node", 1);
        assert!(g.merge_record(h, &raw, &mut Dispatch::new()).is_err());
        assert_eq!(scalar(&g, h, "label"), None);
    }

    #[test]
    fn object_over_scalar_becomes_reference() {
        let mut g = graph_with(json!({"_type": "sc", "id": 1, "station": "none"}));
        assert!(merge(
            &mut g,
            "sc",
            json!({"id": 1, "station": {"_type": "station", "id": 3}})
        ));
        let sc = handle(&g, "sc", 1);
        assert!(g.record(sc).unwrap().fields["station"].as_reference().is_some());
    }

    #[test]
    fn scalar_over_reference_releases_child() {
        let mut g = graph_with(json!({
            "_type": "sc",
            "id": 1,
            "station": {"_type": "station", "id": 101}
        }));
        let station = handle(&g, "station", 101);
        assert!(merge(&mut g, "sc", json!({"id": 1, "station": 101})));
        assert!(g.record(station).unwrap().parents.is_empty());
    }

    #[test]
    fn list_fields_are_left_untouched() {
        let mut g = graph_with(json!({
            "_type": "category",
            "id": 1,
            "children": [{"_type": "category", "id": 2}]
        }));
        assert!(!merge(
            &mut g,
            "category",
            json!({"id": 1, "children": [{"_type": "category", "id": 3}]})
        ));
        let root = handle(&g, "category", 1);
        assert_eq!(g.record(root).unwrap().fields["children"].references().len(), 1);
        assert!(g.find(&[TypeName::from("category")], &EntityId::Int(3)).is_none());
    }
}

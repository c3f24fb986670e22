//! The entity graph: collections plus the record arena.
//!
//! # Invariants
//!
//! - Every handle in `Collection::items`, in a record field, or in a
//!   record's `parents` resolves to a live arena slot.
//! - `parents` of a record lists exactly the live records whose fields
//!   reference it, once each.
//! - A record is filed under `items[id]` of every collection it declares,
//!   unless that slot was already taken by a different record.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use symstore_types::{EntityId, TypeName};
use tracing::warn;

use crate::collection::Collection;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::record::{FieldValue, Record, RecordHandle};
use crate::subscription::{Dispatch, Notification, Subscriber, Target};

pub(crate) struct Graph {
    pub(crate) config: StoreConfig,
    pub(crate) collections: BTreeMap<TypeName, Collection>,
    /// Arena. Evicted slots become `None` and are never reused or
    /// reclaimed; see the eviction module for the resulting limits.
    pub(crate) records: Vec<Option<Record>>,
    next_subscriber: u64,
}

impl Graph {
    pub(crate) fn new(config: StoreConfig) -> Self {
        Self {
            config,
            collections: BTreeMap::new(),
            records: Vec::new(),
            next_subscriber: 1,
        }
    }

    pub(crate) fn record(&self, handle: RecordHandle) -> StoreResult<&Record> {
        self.records
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| dangling(handle))
    }

    pub(crate) fn record_mut(&mut self, handle: RecordHandle) -> StoreResult<&mut Record> {
        self.records
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| dangling(handle))
    }

    pub(crate) fn live_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }

    /// First record filed under `id` in any of `types`, in declaration order.
    pub(crate) fn find(&self, types: &[TypeName], id: &EntityId) -> Option<RecordHandle> {
        types
            .iter()
            .filter_map(|t| self.collections.get(t))
            .find_map(|c| c.get(id))
    }

    /// Find the record for `(types, id)` or create it, and file it under
    /// every declared collection. Collections that gained a member are
    /// marked on `dispatch`.
    pub(crate) fn resolve_or_create(
        &mut self,
        types: &[TypeName],
        id: &EntityId,
        dispatch: &mut Dispatch,
    ) -> StoreResult<RecordHandle> {
        let handle = match self.find(types, id) {
            Some(handle) => handle,
            None => {
                let handle = RecordHandle(self.records.len());
                self.records
                    .push(Some(Record::new(Vec::with_capacity(types.len()), id.clone())));
                handle
            }
        };

        for type_name in types {
            let collection = self
                .collections
                .entry(type_name.clone())
                .or_insert_with(|| Collection::new(type_name.clone()));
            match collection.get(id) {
                None => {
                    collection.items.insert(id.clone(), handle);
                    dispatch.collection_changed(type_name);
                }
                Some(existing) if existing != handle => {
                    warn!(
                        type_name = %type_name,
                        id = %id,
                        "id already taken by another record in this collection; keeping existing"
                    );
                    continue;
                }
                Some(_) => {}
            }
            let record = self.record_mut(handle)?;
            if !record.types.contains(type_name) {
                record.types.push(type_name.clone());
            }
        }

        Ok(handle)
    }

    /// Drop `parent` from the back-references of each former child that
    /// `parent` no longer references through any field.
    pub(crate) fn release(
        &mut self,
        parent: RecordHandle,
        former_children: Vec<RecordHandle>,
    ) -> StoreResult<()> {
        for child in former_children {
            if self.record(parent)?.holds_reference(child) {
                continue;
            }
            self.record_mut(child)?.remove_parent(parent);
        }
        Ok(())
    }

    pub(crate) fn next_subscriber_id(&mut self) -> u64 {
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        id
    }

    pub(crate) fn attach_subscriber(
        &mut self,
        target: &Target,
        subscriber: Rc<Subscriber>,
    ) -> StoreResult<()> {
        match target {
            Target::Collection(t) => match self.collections.get_mut(t) {
                Some(c) => c.subscriptions.push(subscriber),
                None => return Err(StoreError::UnknownModel(t.clone())),
            },
            Target::Record(h) => self.record_mut(*h)?.subscriptions.push(subscriber),
        }
        Ok(())
    }

    pub(crate) fn detach_subscriber(&mut self, target: &Target, id: u64) {
        let set = match target {
            Target::Collection(t) => self.collections.get_mut(t).map(|c| &mut c.subscriptions),
            Target::Record(h) => self
                .records
                .get_mut(h.0)
                .and_then(Option::as_mut)
                .map(|r| &mut r.subscriptions),
        };
        if let Some(set) = set {
            set.retain(|s| s.id != id);
        }
    }

    /// Queue the subscriptions fired when `fields` of `handle` changed:
    /// each field's subscriptions, then the record's own, then the own
    /// subscriptions of every direct parent.
    pub(crate) fn notify_changed(
        &self,
        handle: RecordHandle,
        fields: &[String],
        dispatch: &mut Dispatch,
    ) -> StoreResult<()> {
        let record = self.record(handle)?;
        for field in fields {
            for sub in &record.subscriptions {
                if sub.field.as_deref() == Some(field.as_str()) {
                    dispatch.enqueue(sub, Notification::record(handle, Some(field.clone())));
                }
            }
        }
        self.notify_record(handle, dispatch)?;
        for parent in &record.parents {
            self.notify_record(*parent, dispatch)?;
        }
        Ok(())
    }

    fn notify_record(&self, handle: RecordHandle, dispatch: &mut Dispatch) -> StoreResult<()> {
        for sub in &self.record(handle)?.subscriptions {
            if sub.field.is_none() {
                dispatch.enqueue(sub, Notification::record(handle, None));
            }
        }
        Ok(())
    }

    /// Queue collection subscriptions for every collection marked changed.
    pub(crate) fn flush_collections(&self, dispatch: &mut Dispatch) {
        for type_name in dispatch.take_collections() {
            if let Some(collection) = self.collections.get(&type_name) {
                for sub in &collection.subscriptions {
                    dispatch.enqueue(sub, Notification::collection(collection.type_name.clone()));
                }
            }
        }
    }

    /// Rebuild a nested JSON tree for `handle`. A record already on the
    /// current path is emitted as a `{type, id}` stub.
    pub(crate) fn denormalize(
        &self,
        handle: RecordHandle,
        path: &mut Vec<RecordHandle>,
    ) -> StoreResult<Value> {
        let record = self.record(handle)?;
        let format = &self.config.format;
        let mut object = Map::new();
        let type_tag = match record.types.as_slice() {
            [single] => Value::String(single.to_string()),
            many => Value::Array(many.iter().map(|t| Value::String(t.to_string())).collect()),
        };
        object.insert(format.type_key.clone(), type_tag);
        object.insert(format.id_key.clone(), record.id.to_json());

        if path.contains(&handle) {
            return Ok(Value::Object(object));
        }

        path.push(handle);
        for (name, value) in &record.fields {
            let json = match value {
                FieldValue::Scalar(s) => s.to_json(),
                FieldValue::Reference(child) => self.denormalize(*child, path)?,
                FieldValue::ReferenceList(children) => Value::Array(
                    children
                        .iter()
                        .map(|c| self.denormalize(*c, path))
                        .collect::<StoreResult<_>>()?,
                ),
            };
            object.insert(name.clone(), json);
        }
        path.pop();

        Ok(Value::Object(object))
    }
}

fn dangling(handle: RecordHandle) -> StoreError {
    StoreError::Corrupt {
        reason: format!("dangling record handle {handle:?}"),
    }
}

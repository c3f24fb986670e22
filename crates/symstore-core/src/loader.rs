//! Normalization of raw record trees into the entity graph.

use symstore_types::{RawRecord, RawValue};
use tracing::debug;

use crate::error::StoreResult;
use crate::graph::Graph;
use crate::record::{FieldValue, RecordHandle};
use crate::subscription::Dispatch;

impl Graph {
    /// Load one raw record (and everything nested in it) and return its
    /// handle. `parent` is the record whose field holds this one.
    ///
    /// Re-encountering an identity resolves to the same record, so shared
    /// children end up as one record with several parents.
    pub(crate) fn load_record(
        &mut self,
        raw: &RawRecord,
        parent: Option<RecordHandle>,
        dispatch: &mut Dispatch,
    ) -> StoreResult<RecordHandle> {
        let handle = self.resolve_or_create(&raw.types, &raw.id, dispatch)?;
        if let Some(parent) = parent {
            self.record_mut(handle)?.add_parent(parent);
        }

        for (name, value) in &raw.fields {
            let normalized = match value {
                RawValue::Scalar(s) => FieldValue::Scalar(s.clone()),
                RawValue::Record(child) => {
                    FieldValue::Reference(self.load_record(child, Some(handle), dispatch)?)
                }
                RawValue::List(children) => FieldValue::ReferenceList(
                    children
                        .iter()
                        .map(|child| self.load_record(child, Some(handle), dispatch))
                        .collect::<StoreResult<_>>()?,
                ),
            };
            let previous = self
                .record_mut(handle)?
                .fields
                .insert(name.clone(), normalized);
            if let Some(previous) = previous {
                self.release(handle, previous.references())?;
            }
        }

        debug!(
            record = ?handle,
            id = %raw.id,
            fields = raw.fields.len(),
            "loaded record"
        );
        Ok(handle)
    }
}

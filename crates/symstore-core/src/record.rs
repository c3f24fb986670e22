//! Entity records and their field values.
//!
//! Records live in the store's arena and refer to each other through
//! [`RecordHandle`]s. A handle is an arena index: child references point
//! down, `parents` point back up, and neither direction owns the other.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use symstore_types::{EntityId, Scalar, TypeName};

use crate::subscription::Subscriber;

/// Stable reference to a record in a store's arena.
///
/// Handles are never reused within a store, so a handle to an evicted
/// record stays dangling instead of aliasing a newer record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordHandle(pub(crate) usize);

impl RecordHandle {
    /// The arena slot index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordHandle({})", self.0)
    }
}

/// A normalized field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A leaf value stored inline.
    Scalar(Scalar),
    /// A nested record.
    Reference(RecordHandle),
    /// A list of nested records, in input order.
    ReferenceList(Vec<RecordHandle>),
}

impl FieldValue {
    /// Records referenced by this value, in order.
    pub fn references(&self) -> Vec<RecordHandle> {
        match self {
            Self::Scalar(_) => Vec::new(),
            Self::Reference(h) => vec![*h],
            Self::ReferenceList(hs) => hs.clone(),
        }
    }

    /// The scalar, if this is an inline value.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The referenced record, if this is a single reference.
    pub fn as_reference(&self) -> Option<RecordHandle> {
        match self {
            Self::Reference(h) => Some(*h),
            _ => None,
        }
    }

    /// The referenced records, if this is a reference list.
    pub fn as_list(&self) -> Option<&[RecordHandle]> {
        match self {
            Self::ReferenceList(hs) => Some(hs),
            _ => None,
        }
    }

    fn holds(&self, child: RecordHandle) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Reference(h) => *h == child,
            Self::ReferenceList(hs) => hs.contains(&child),
        }
    }
}

/// Arena entry for one entity.
pub(crate) struct Record {
    pub(crate) types: Vec<TypeName>,
    pub(crate) id: EntityId,
    pub(crate) fields: BTreeMap<String, FieldValue>,
    /// Records currently holding a reference to this one. No duplicates.
    pub(crate) parents: Vec<RecordHandle>,
    pub(crate) subscriptions: Vec<Rc<Subscriber>>,
    /// Loaded at the top level of a `load` call.
    pub(crate) root: bool,
}

impl Record {
    pub(crate) fn new(types: Vec<TypeName>, id: EntityId) -> Self {
        Self {
            types,
            id,
            fields: BTreeMap::new(),
            parents: Vec::new(),
            subscriptions: Vec::new(),
            root: false,
        }
    }

    /// Add a back-reference. Returns `false` if it was already present.
    pub(crate) fn add_parent(&mut self, parent: RecordHandle) -> bool {
        if self.parents.contains(&parent) {
            return false;
        }
        self.parents.push(parent);
        true
    }

    pub(crate) fn remove_parent(&mut self, parent: RecordHandle) {
        self.parents.retain(|p| *p != parent);
    }

    /// Returns `true` if any field of this record references `child`.
    pub(crate) fn holds_reference(&self, child: RecordHandle) -> bool {
        self.fields.values().any(|v| v.holds(child))
    }

    /// All distinct records referenced from this record's fields.
    pub(crate) fn children(&self) -> Vec<RecordHandle> {
        let mut out: Vec<RecordHandle> = Vec::new();
        for value in self.fields.values() {
            for h in value.references() {
                if !out.contains(&h) {
                    out.push(h);
                }
            }
        }
        out
    }

    pub(crate) fn view(&self, handle: RecordHandle) -> RecordView {
        RecordView {
            handle,
            types: self.types.clone(),
            id: self.id.clone(),
            fields: self.fields.clone(),
            parents: self.parents.clone(),
        }
    }
}

/// Owned snapshot of a record, as seen by readers and callbacks.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordView {
    pub handle: RecordHandle,
    pub types: Vec<TypeName>,
    pub id: EntityId,
    pub fields: BTreeMap<String, FieldValue>,
    pub parents: Vec<RecordHandle>,
}

impl RecordView {
    /// The first declared type.
    pub fn primary_type(&self) -> Option<&TypeName> {
        self.types.first()
    }

    /// Look up a field by name.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Shortcut for a scalar field.
    pub fn scalar(&self, field: &str) -> Option<&Scalar> {
        self.fields.get(field).and_then(FieldValue::as_scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new(vec![TypeName::from("category")], EntityId::Int(1))
    }

    #[test]
    fn parents_are_deduplicated() {
        let mut r = record();
        assert!(r.add_parent(RecordHandle(4)));
        assert!(!r.add_parent(RecordHandle(4)));
        assert!(r.add_parent(RecordHandle(5)));
        assert_eq!(r.parents, vec![RecordHandle(4), RecordHandle(5)]);
        r.remove_parent(RecordHandle(4));
        assert_eq!(r.parents, vec![RecordHandle(5)]);
    }

    #[test]
    fn children_are_distinct_across_fields() {
        let mut r = record();
        r.fields.insert("a".into(), FieldValue::Reference(RecordHandle(2)));
        r.fields.insert(
            "b".into(),
            FieldValue::ReferenceList(vec![RecordHandle(2), RecordHandle(3)]),
        );
        r.fields.insert("c".into(), FieldValue::Scalar(Scalar::from("x")));
        assert_eq!(r.children(), vec![RecordHandle(2), RecordHandle(3)]);
        assert!(r.holds_reference(RecordHandle(3)));
        assert!(!r.holds_reference(RecordHandle(9)));
    }

    #[test]
    fn view_exposes_scalars() {
        let mut r = record();
        r.fields.insert("name".into(), FieldValue::Scalar(Scalar::from("Admin")));
        let view = r.view(RecordHandle(0));
        assert_eq!(view.scalar("name"), Some(&Scalar::from("Admin")));
        assert_eq!(view.primary_type(), Some(&TypeName::from("category")));
        assert!(view.get("missing").is_none());
    }
}

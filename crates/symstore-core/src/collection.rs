use std::collections::BTreeMap;
use std::rc::Rc;

use symstore_types::{EntityId, TypeName};

use crate::record::RecordHandle;
use crate::subscription::Subscriber;

/// All records of one declared type, keyed by id.
pub(crate) struct Collection {
    pub(crate) type_name: TypeName,
    pub(crate) items: BTreeMap<EntityId, RecordHandle>,
    pub(crate) subscriptions: Vec<Rc<Subscriber>>,
}

impl Collection {
    pub(crate) fn new(type_name: TypeName) -> Self {
        Self {
            type_name,
            items: BTreeMap::new(),
            subscriptions: Vec::new(),
        }
    }

    pub(crate) fn get(&self, id: &EntityId) -> Option<RecordHandle> {
        self.items.get(id).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Items in id order.
    pub(crate) fn entries(&self) -> Vec<(EntityId, RecordHandle)> {
        self.items.iter().map(|(id, h)| (id.clone(), *h)).collect()
    }
}

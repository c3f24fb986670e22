//! Subscriptions and change dispatch.
//!
//! A subscription attaches a callback to a collection, a record, or one
//! field of a record. Mutations never call callbacks directly: they queue
//! `(subscriber, notification)` pairs into a [`Dispatch`] while the entity
//! graph is borrowed, and the store delivers the queue after the borrow is
//! released. Callbacks may therefore re-enter the store freely.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use symstore_types::{EntityId, TypeName};

use crate::graph::Graph;
use crate::record::RecordHandle;
use crate::store::Store;

/// Callback invoked with the store and the change being reported.
pub type Callback = dyn Fn(&Store, &Notification);

/// What a subscription listens to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Members added to or removed from a collection.
    Collection(TypeName),
    /// Any change to one record, including changes bubbled up from its
    /// direct children.
    Record { type_name: TypeName, id: EntityId },
    /// Changes to one field of one record.
    Field {
        type_name: TypeName,
        id: EntityId,
        field: String,
    },
}

impl Scope {
    /// Listen to membership changes of a collection.
    pub fn collection(type_name: impl Into<TypeName>) -> Self {
        Self::Collection(type_name.into())
    }

    /// Listen to every change of one record.
    pub fn record(type_name: impl Into<TypeName>, id: impl Into<EntityId>) -> Self {
        Self::Record {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// Listen to one field of one record.
    pub fn field(
        type_name: impl Into<TypeName>,
        id: impl Into<EntityId>,
        field: impl Into<String>,
    ) -> Self {
        Self::Field {
            type_name: type_name.into(),
            id: id.into(),
            field: field.into(),
        }
    }

    /// The model type the scope targets.
    pub fn type_name(&self) -> &TypeName {
        match self {
            Self::Collection(t) => t,
            Self::Record { type_name, .. } | Self::Field { type_name, .. } => type_name,
        }
    }

    /// The record id, or `None` for a collection scope.
    pub fn id(&self) -> Option<&EntityId> {
        match self {
            Self::Collection(_) => None,
            Self::Record { id, .. } | Self::Field { id, .. } => Some(id),
        }
    }

    /// The field name, for a field scope.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection(t) => write!(f, "{t}"),
            Self::Record { type_name, id } => write!(f, "{type_name}#{id}"),
            Self::Field {
                type_name,
                id,
                field,
            } => write!(f, "{type_name}#{id}.{field}"),
        }
    }
}

/// The object a notification is about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Collection(TypeName),
    Record(RecordHandle),
}

/// One change report delivered to a callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub source: Source,
    /// The changed field, or `None` for whole-record and collection events.
    pub field: Option<String>,
}

impl Notification {
    pub(crate) fn collection(type_name: TypeName) -> Self {
        Self {
            source: Source::Collection(type_name),
            field: None,
        }
    }

    pub(crate) fn record(handle: RecordHandle, field: Option<String>) -> Self {
        Self {
            source: Source::Record(handle),
            field,
        }
    }
}

/// Where a subscriber is registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    Collection(TypeName),
    Record(RecordHandle),
}

/// Registered callback. Shared between the target's subscription set, any
/// in-flight dispatch queue, and the caller's [`Subscription`].
pub(crate) struct Subscriber {
    pub(crate) id: u64,
    /// Field filter; `None` listens to the whole target.
    pub(crate) field: Option<String>,
    active: Cell<bool>,
    callback: Box<Callback>,
}

impl Subscriber {
    pub(crate) fn new(id: u64, field: Option<String>, callback: Box<Callback>) -> Self {
        Self {
            id,
            field,
            active: Cell::new(true),
            callback,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Mark inactive. Returns `true` if it was active.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.replace(false)
    }

    pub(crate) fn fire(&self, store: &Store, notification: &Notification) {
        if self.is_active() {
            (self.callback)(store, notification);
        }
    }
}

/// Handle to a live subscription.
///
/// Dropping the handle does not cancel; call [`Subscription::cancel`].
pub struct Subscription {
    subscriber: Rc<Subscriber>,
    target: Target,
    scope: Scope,
    graph: Weak<RefCell<Graph>>,
}

impl Subscription {
    pub(crate) fn new(
        subscriber: Rc<Subscriber>,
        target: Target,
        scope: Scope,
        graph: Weak<RefCell<Graph>>,
    ) -> Self {
        Self {
            subscriber,
            target,
            scope,
            graph,
        }
    }

    /// Deregister. Returns `true` on the first call, `false` afterwards.
    ///
    /// Once cancelled the callback is never invoked again, including for
    /// notifications already queued by a mutation in progress.
    pub fn cancel(&self) -> bool {
        if !self.subscriber.deactivate() {
            return false;
        }
        if let Some(graph) = self.graph.upgrade() {
            // Inactive subscribers are also skipped at dispatch time, so a
            // failed borrow only delays the removal.
            if let Ok(mut graph) = graph.try_borrow_mut() {
                graph.detach_subscriber(&self.target, self.subscriber.id);
            }
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.subscriber.is_active()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.subscriber.id)
            .field("scope", &self.scope)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Notifications collected during one store operation.
///
/// Each subscriber is queued at most once per operation; its first queued
/// position wins.
#[derive(Default)]
pub(crate) struct Dispatch {
    queue: Vec<(Rc<Subscriber>, Notification)>,
    queued: HashSet<u64>,
    collections: Vec<TypeName>,
}

impl Dispatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enqueue(&mut self, subscriber: &Rc<Subscriber>, notification: Notification) {
        if subscriber.is_active() && self.queued.insert(subscriber.id) {
            self.queue.push((Rc::clone(subscriber), notification));
        }
    }

    /// Record that a collection gained or lost members.
    pub(crate) fn collection_changed(&mut self, type_name: &TypeName) {
        if !self.collections.contains(type_name) {
            self.collections.push(type_name.clone());
        }
    }

    pub(crate) fn take_collections(&mut self) -> Vec<TypeName> {
        std::mem::take(&mut self.collections)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn into_queue(self) -> Vec<(Rc<Subscriber>, Notification)> {
        self.queue
    }
}

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use symstore_types::{EntityId, TypeName};
use tracing::{debug, warn};

use crate::config::{EvictionPolicy, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::graph::Graph;
use crate::record::{FieldValue, RecordHandle, RecordView};
use crate::subscription::{Dispatch, Notification, Scope, Source, Subscriber, Subscription, Target};

/// In-memory normalizing entity store.
///
/// All entry points take `&self` and no internal borrow is held while
/// callbacks run, so a callback may read from, update, or subscribe to the
/// store that notified it. The store is `!Send`: every mutation happens on
/// one thread.
pub struct Store {
    graph: Rc<RefCell<Graph>>,
}

impl Store {
    /// Create an empty store.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            graph: Rc::new(RefCell::new(Graph::new(config))),
        }
    }

    /// Create a store with the default configuration and load `value` into it.
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        let store = Self::default();
        store.load(value)?;
        Ok(store)
    }

    /// A copy of the configuration the store was built with.
    pub fn config(&self) -> StoreConfig {
        self.graph.borrow().config.clone()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Load one raw record or an array of them.
    ///
    /// Returns the handles of the top-level records, in input order.
    /// Collection subscriptions fire once for every collection that gained
    /// members. Record and field subscriptions do not fire; observed
    /// changes go through [`Store::update`].
    pub fn load(&self, value: &Value) -> StoreResult<Vec<RecordHandle>> {
        let (handles, dispatch) = {
            let mut graph = self.graph.borrow_mut();
            let raws = graph.config.format.parse_batch(value)?;
            let mut dispatch = Dispatch::new();
            let mut handles = Vec::with_capacity(raws.len());
            for raw in &raws {
                let handle = graph.load_record(raw, None, &mut dispatch)?;
                graph.record_mut(handle)?.root = true;
                handles.push(handle);
            }
            graph.flush_collections(&mut dispatch);
            debug!(records = handles.len(), total = graph.live_count(), "load complete");
            (handles, dispatch)
        };
        self.deliver(dispatch);
        Ok(handles)
    }

    /// Merge a partial record into the existing record of the same identity.
    ///
    /// Returns `Ok(true)` if anything changed. An unknown type or id is
    /// logged and reported as `Ok(false)`; malformed input and graph
    /// corruption are errors. A nested object that would replace a
    /// reference without a type tag is rejected before anything is written.
    pub fn update(&self, value: &Value) -> StoreResult<bool> {
        let (result, dispatch) = {
            let mut graph = self.graph.borrow_mut();
            let raw = graph.config.format.parse_partial(value)?;

            let known: Vec<TypeName> = raw
                .types
                .iter()
                .filter(|t| graph.collections.contains_key(*t))
                .cloned()
                .collect();
            if known.is_empty() {
                warn!(types = ?raw.types, id = %raw.id, "ignoring update for unknown model");
                return Ok(false);
            }
            let Some(handle) = graph.find(&known, &raw.id) else {
                warn!(types = ?raw.types, id = %raw.id, "ignoring update for unknown record");
                return Ok(false);
            };

            let mut dispatch = Dispatch::new();
            let result = graph.merge_record(handle, &raw, &mut dispatch);
            if result.is_ok() && graph.config.eviction == EvictionPolicy::Unreachable {
                graph.sweep_unreachable(&mut dispatch);
            }
            graph.flush_collections(&mut dispatch);
            debug!(record = ?handle, ok = result.is_ok(), queued = dispatch.len(), "update complete");
            (result, dispatch)
        };
        // Changes applied before a failure are still reported.
        self.deliver(dispatch);
        result
    }

    /// Register `callback` for changes within `scope`.
    ///
    /// The callback fires once before this returns, with the current state,
    /// and then on every matching change until the returned subscription is
    /// cancelled.
    pub fn subscribe<F>(&self, scope: Scope, callback: F) -> StoreResult<Subscription>
    where
        F: Fn(&Store, &Notification) + 'static,
    {
        let (subscription, replay) = {
            let mut graph = self.graph.borrow_mut();
            let (target, replay) = resolve_scope(&graph, &scope)?;
            if let (Target::Record(handle), Some(field)) = (&target, scope.field_name()) {
                if !graph.record(*handle)?.fields.contains_key(field) {
                    warn!(
                        scope = %scope,
                        "subscribing to a field the record does not have yet"
                    );
                }
            }
            let id = graph.next_subscriber_id();
            let subscriber = Rc::new(Subscriber::new(
                id,
                scope.field_name().map(str::to_string),
                Box::new(callback),
            ));
            graph.attach_subscriber(&target, Rc::clone(&subscriber))?;
            debug!(subscription = id, scope = %scope, "subscribed");
            (
                Subscription::new(
                    Rc::clone(&subscriber),
                    target,
                    scope,
                    Rc::downgrade(&self.graph),
                ),
                (subscriber, replay),
            )
        };
        let (subscriber, notification) = replay;
        subscriber.fire(self, &notification);
        Ok(subscription)
    }

    /// Run the reachability sweep now, regardless of the configured policy.
    ///
    /// Returns the evicted identities as (primary type, id).
    pub fn collect_unreachable(&self) -> Vec<(TypeName, EntityId)> {
        let (evicted, dispatch) = {
            let mut graph = self.graph.borrow_mut();
            let mut dispatch = Dispatch::new();
            let evicted = graph.sweep_unreachable(&mut dispatch);
            graph.flush_collections(&mut dispatch);
            (evicted, dispatch)
        };
        self.deliver(dispatch);
        evicted
    }

    fn deliver(&self, dispatch: Dispatch) {
        for (subscriber, notification) in dispatch.into_queue() {
            subscriber.fire(self, &notification);
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.graph.borrow().live_count()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all collections, sorted.
    pub fn collection_names(&self) -> Vec<TypeName> {
        self.graph.borrow().collections.keys().cloned().collect()
    }

    /// Returns `true` if a collection exists for `type_name`.
    pub fn has_collection(&self, type_name: &str) -> bool {
        self.graph.borrow().collections.contains_key(type_name)
    }

    /// Number of records in a collection, or `None` if it does not exist.
    pub fn collection_len(&self, type_name: &str) -> Option<usize> {
        self.graph.borrow().collections.get(type_name).map(|c| c.len())
    }

    /// Members of a collection in id order.
    pub fn items(&self, type_name: &str) -> Option<Vec<(EntityId, RecordHandle)>> {
        self.graph
            .borrow()
            .collections
            .get(type_name)
            .map(|c| c.entries())
    }

    /// Look up a record by type and id.
    pub fn find(&self, type_name: &str, id: impl Into<EntityId>) -> Option<RecordHandle> {
        let id = id.into();
        self.graph
            .borrow()
            .collections
            .get(type_name)
            .and_then(|c| c.get(&id))
    }

    /// Snapshot of a record. `None` for an evicted handle.
    pub fn record(&self, handle: RecordHandle) -> Option<RecordView> {
        self.graph
            .borrow()
            .record(handle)
            .ok()
            .map(|r| r.view(handle))
    }

    /// The current value of one field of a record.
    pub fn field(&self, handle: RecordHandle, name: &str) -> Option<FieldValue> {
        self.graph
            .borrow()
            .record(handle)
            .ok()
            .and_then(|r| r.fields.get(name).cloned())
    }

    /// Records currently referencing `handle`.
    pub fn parents(&self, handle: RecordHandle) -> Vec<RecordHandle> {
        self.graph
            .borrow()
            .record(handle)
            .map(|r| r.parents.clone())
            .unwrap_or_default()
    }

    /// The record rebuilt as a nested JSON tree.
    pub fn to_json(&self, handle: RecordHandle) -> Option<Value> {
        self.graph
            .borrow()
            .denormalize(handle, &mut Vec::new())
            .ok()
    }

    /// Number of live subscriptions registered with exactly this scope.
    /// Zero when the scope's target does not exist.
    pub fn subscription_count(&self, scope: &Scope) -> usize {
        let graph = self.graph.borrow();
        let Ok((target, _)) = resolve_scope(&graph, scope) else {
            return 0;
        };
        let field = scope.field_name();
        let set = match &target {
            Target::Collection(t) => graph.collections.get(t).map(|c| &c.subscriptions),
            Target::Record(h) => graph.record(*h).ok().map(|r| &r.subscriptions),
        };
        set.map(|subs| {
            subs.iter()
                .filter(|s| s.is_active() && s.field.as_deref() == field)
                .count()
        })
        .unwrap_or(0)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let graph = self.graph.borrow();
        f.debug_struct("Store")
            .field("collections", &graph.collections.len())
            .field("records", &graph.live_count())
            .finish()
    }
}

/// Map a scope to its target and the notification used for replay.
fn resolve_scope(graph: &Graph, scope: &Scope) -> StoreResult<(Target, Notification)> {
    let type_name = scope.type_name();
    let collection = graph
        .collections
        .get(type_name)
        .ok_or_else(|| StoreError::UnknownModel(type_name.clone()))?;

    match scope {
        Scope::Collection(t) => Ok((
            Target::Collection(t.clone()),
            Notification::collection(t.clone()),
        )),
        Scope::Record { id, .. } | Scope::Field { id, .. } => {
            let handle = collection.get(id).ok_or_else(|| StoreError::UnknownRecord {
                type_name: type_name.clone(),
                id: id.clone(),
            })?;
            Ok((
                Target::Record(handle),
                Notification {
                    source: Source::Record(handle),
                    field: scope.field_name().map(str::to_string),
                },
            ))
        }
    }
}

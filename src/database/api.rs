use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::lock::Mutex as AsyncMutex;
use serde_json::{Map, Value};

use crate::database::backend::{
    select_backend, DatabaseBackend, InMemoryBackend, RestBackend, TransactionOutcome,
};
use crate::database::error::{invalid_argument, DatabaseResult};
use crate::database::query::{compare_keys, QueryIndex, QueryLimit, QueryParams};

/// Handle to a hierarchical store. Cloning is cheap and clones share the
/// backend and the listener registry.
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    backend: Arc<dyn DatabaseBackend>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    write_gate: AsyncMutex<()>,
}

impl fmt::Debug for DatabaseInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseInner")
            .field("backend", &"dynamic")
            .field("next_listener_id", &self.next_listener_id)
            .finish()
    }
}

/// A location in the store.
#[derive(Clone, Debug)]
pub struct DatabaseReference {
    database: Database,
    path: Vec<String>,
}

/// A location plus ordering and filtering. Every builder consumes the query
/// and returns a new one; the source reference is never modified.
#[derive(Clone, Debug)]
pub struct DatabaseQuery {
    reference: DatabaseReference,
    params: QueryParams,
}

/// Kinds of change notification a listener can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Value,
    ChildAdded,
    ChildChanged,
    ChildRemoved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Value => "value",
            EventKind::ChildAdded => "child_added",
            EventKind::ChildChanged => "child_changed",
            EventKind::ChildRemoved => "child_removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time value of a location.
#[derive(Clone, Debug)]
pub struct DataSnapshot {
    reference: DatabaseReference,
    value: Value,
}

impl DataSnapshot {
    pub fn reference(&self) -> &DatabaseReference {
        &self.reference
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    pub fn key(&self) -> Option<&str> {
        self.reference.key()
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Returns a snapshot for the provided relative path.
    pub fn child(&self, relative_path: &str) -> DatabaseResult<DataSnapshot> {
        let segments = normalize_path(relative_path)?;
        let reference = self.reference.child(relative_path)?;
        let value = segments
            .iter()
            .try_fold(&self.value, |current, segment| child_value(current, segment))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(DataSnapshot { reference, value })
    }

    /// Number of direct children.
    pub fn size(&self) -> usize {
        match &self.value {
            Value::Object(map) => map.len(),
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }
}

/// A notification delivered to a listener.
#[derive(Clone, Debug)]
pub struct DatabaseEvent {
    pub kind: EventKind,
    pub snapshot: DataSnapshot,
    /// Key of the sibling preceding the child, for child events.
    pub previous_name: Option<String>,
}

/// Outcome of [`DatabaseReference::transaction`].
#[derive(Clone, Debug)]
pub struct TransactionResult {
    pub committed: bool,
    pub snapshot: DataSnapshot,
}

type ListenerCallback = Arc<dyn Fn(DatabaseResult<DatabaseEvent>) + Send + Sync>;

#[derive(Clone)]
struct Listener {
    target: ListenerTarget,
    kind: EventKind,
    callback: ListenerCallback,
}

#[derive(Clone)]
struct ListenerTarget {
    path: Vec<String>,
    params: QueryParams,
}

impl ListenerTarget {
    fn matches(&self, changed_path: &[String]) -> bool {
        is_prefix(&self.path, changed_path) || is_prefix(changed_path, &self.path)
    }
}

/// RAII-style listener registration; dropping the handle detaches the
/// underlying listener. Each registration owns exactly one listener.
pub struct ListenerRegistration {
    database: Database,
    id: Option<u64>,
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("id", &self.id)
            .finish()
    }
}

impl ListenerRegistration {
    fn new(database: Database, id: u64) -> Self {
        Self {
            database,
            id: Some(id),
        }
    }

    pub fn detach(mut self) {
        if let Some(id) = self.id.take() {
            self.database.remove_listener(id);
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.database.remove_listener(id);
        }
    }
}

impl Database {
    /// Creates a database kept entirely in process memory.
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::default()))
    }

    /// Creates a database talking to the REST endpoint at `url`
    /// (for example `http://127.0.0.1:9000/?ns=demo`).
    pub fn rest(url: &str) -> DatabaseResult<Self> {
        Ok(Self::with_backend(Arc::new(RestBackend::new(url)?)))
    }

    pub fn with_backend(backend: Arc<dyn DatabaseBackend>) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                backend,
                listeners: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
                write_gate: AsyncMutex::new(()),
            }),
        }
    }

    /// REST when a URL is given and usable, in-memory otherwise.
    pub(crate) fn from_url(url: Option<&str>) -> Self {
        Self::with_backend(select_backend(url))
    }

    pub fn reference(&self, path: &str) -> DatabaseResult<DatabaseReference> {
        let segments = normalize_path(path)?;
        Ok(self.reference_from_segments(segments))
    }

    /// Number of listeners currently attached to this database.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap().len()
    }

    fn reference_from_segments(&self, segments: Vec<String>) -> DatabaseReference {
        DatabaseReference {
            database: self.clone(),
            path: segments,
        }
    }

    async fn register_listener(
        &self,
        target: ListenerTarget,
        kind: EventKind,
        callback: ListenerCallback,
    ) -> DatabaseResult<ListenerRegistration> {
        let _gate = self.inner.write_gate.lock().await;
        let current = self.read_target(&target).await?;

        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let listener = Listener {
            target,
            kind,
            callback,
        };
        self.inner
            .listeners
            .lock()
            .unwrap()
            .insert(id, listener.clone());

        match kind {
            EventKind::Value => {
                let snapshot = self.snapshot_at(&listener.target.path, current);
                (listener.callback)(Ok(DatabaseEvent {
                    kind,
                    snapshot,
                    previous_name: None,
                }));
            }
            EventKind::ChildAdded => {
                self.emit_child_events(&listener, &Value::Null, &current);
            }
            EventKind::ChildChanged | EventKind::ChildRemoved => {}
        }

        Ok(ListenerRegistration::new(self.clone(), id))
    }

    fn remove_listener(&self, id: u64) -> bool {
        self.inner.listeners.lock().unwrap().remove(&id).is_some()
    }

    fn listeners_for(&self, changed_path: &[String]) -> Vec<(u64, Listener)> {
        let listeners = self.inner.listeners.lock().unwrap();
        let mut matching: Vec<(u64, Listener)> = listeners
            .iter()
            .filter(|(_, listener)| listener.target.matches(changed_path))
            .map(|(id, listener)| (*id, listener.clone()))
            .collect();
        matching.sort_by_key(|(id, _)| *id);
        matching
    }

    fn is_registered(&self, id: u64) -> bool {
        self.inner.listeners.lock().unwrap().contains_key(&id)
    }

    async fn read_target(&self, target: &ListenerTarget) -> DatabaseResult<Value> {
        self.inner.backend.get(&target.path, &target.params).await
    }

    /// Runs a write against the backend and notifies every listener whose
    /// location overlaps `changed_path` with the before/after values.
    ///
    /// Writes through one `Database` are serialized so each listener sees
    /// the before/after pair of a single write. A listener whose location
    /// cannot be read receives the error; the write itself still goes ahead.
    async fn write<T, F>(&self, changed_path: &[String], operation: F) -> DatabaseResult<T>
    where
        F: std::future::Future<Output = DatabaseResult<T>>,
    {
        let _gate = self.inner.write_gate.lock().await;
        let affected = self.listeners_for(changed_path);
        let mut before = Vec::with_capacity(affected.len());
        for (_, listener) in &affected {
            before.push(self.read_target(&listener.target).await);
        }

        let output = operation.await?;

        for ((id, listener), old_value) in affected.into_iter().zip(before) {
            if !self.is_registered(id) {
                continue;
            }
            let change = match old_value {
                Ok(old_value) => self
                    .read_target(&listener.target)
                    .await
                    .map(|new_value| (old_value, new_value)),
                Err(err) => Err(err),
            };
            match change {
                Ok((old_value, new_value)) => self.notify(&listener, &old_value, &new_value),
                Err(err) => (listener.callback)(Err(err)),
            }
        }
        Ok(output)
    }

    fn notify(&self, listener: &Listener, old_value: &Value, new_value: &Value) {
        if old_value == new_value {
            return;
        }
        match listener.kind {
            EventKind::Value => {
                let snapshot = self.snapshot_at(&listener.target.path, new_value.clone());
                (listener.callback)(Ok(DatabaseEvent {
                    kind: EventKind::Value,
                    snapshot,
                    previous_name: None,
                }));
            }
            _ => self.emit_child_events(listener, old_value, new_value),
        }
    }

    fn emit_child_events(&self, listener: &Listener, old_value: &Value, new_value: &Value) {
        let old_children = ordered_children(old_value);
        let new_children = ordered_children(new_value);
        let source = match listener.kind {
            EventKind::ChildAdded | EventKind::ChildChanged => &new_children,
            EventKind::ChildRemoved => &old_children,
            EventKind::Value => return,
        };

        let mut previous: Option<String> = None;
        for (key, value) in source {
            let fire = match listener.kind {
                EventKind::ChildAdded => find_child(&old_children, key).is_none(),
                EventKind::ChildChanged => {
                    find_child(&old_children, key).is_some_and(|old| old != value)
                }
                EventKind::ChildRemoved => find_child(&new_children, key).is_none(),
                EventKind::Value => false,
            };
            if fire {
                let mut segments = listener.target.path.clone();
                segments.push(key.clone());
                let snapshot = self.snapshot_at(&segments, value.clone());
                (listener.callback)(Ok(DatabaseEvent {
                    kind: listener.kind,
                    snapshot,
                    previous_name: previous.clone(),
                }));
            }
            previous = Some(key.clone());
        }
    }

    fn snapshot_at(&self, path: &[String], value: Value) -> DataSnapshot {
        DataSnapshot {
            reference: self.reference_from_segments(path.to_vec()),
            value,
        }
    }
}

impl DatabaseReference {
    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn child(&self, relative: &str) -> DatabaseResult<DatabaseReference> {
        let mut segments = self.path.clone();
        segments.extend(normalize_path(relative)?);
        Ok(DatabaseReference {
            database: self.database.clone(),
            path: segments,
        })
    }

    pub fn parent(&self) -> Option<DatabaseReference> {
        let (_, parent) = self.path.split_last()?;
        Some(DatabaseReference {
            database: self.database.clone(),
            path: parent.to_vec(),
        })
    }

    /// Last path segment, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.path.last().map(|segment| segment.as_str())
    }

    pub fn path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    /// Starts an unordered, unfiltered query at this location.
    pub fn query(&self) -> DatabaseQuery {
        DatabaseQuery {
            reference: self.clone(),
            params: QueryParams::default(),
        }
    }

    pub async fn get(&self) -> DatabaseResult<DataSnapshot> {
        self.query().get().await
    }

    pub async fn on<F>(&self, kind: EventKind, callback: F) -> DatabaseResult<ListenerRegistration>
    where
        F: Fn(DatabaseResult<DatabaseEvent>) + Send + Sync + 'static,
    {
        self.query().on(kind, callback).await
    }

    pub async fn set(&self, value: Value) -> DatabaseResult<()> {
        let backend = &self.database.inner.backend;
        self.database
            .write(&self.path, backend.set(&self.path, value))
            .await
    }

    /// Applies partial updates; each key is a child path relative to this
    /// location (e.g. `"profile/name"`).
    pub async fn update(&self, updates: Map<String, Value>) -> DatabaseResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut operations = Vec::with_capacity(updates.len());
        for (key, value) in updates {
            let relative = normalize_path(&key)?;
            if relative.is_empty() {
                return Err(invalid_argument("Database update path cannot be empty"));
            }
            let mut segments = self.path.clone();
            segments.extend(relative);
            operations.push((segments, value));
        }

        let backend = &self.database.inner.backend;
        self.database
            .write(&self.path, backend.update(&self.path, operations))
            .await
    }

    pub async fn remove(&self) -> DatabaseResult<()> {
        let backend = &self.database.inner.backend;
        self.database
            .write(&self.path, backend.delete(&self.path))
            .await
    }

    /// Atomically rewrites this location. Returning `None` from `update`
    /// aborts without writing.
    pub async fn transaction<F>(&self, update: F) -> DatabaseResult<TransactionResult>
    where
        F: Fn(Value) -> Option<Value> + Send + Sync,
    {
        let backend = &self.database.inner.backend;
        let TransactionOutcome { committed, value } = self
            .database
            .write(&self.path, backend.transaction(&self.path, &update))
            .await?;
        Ok(TransactionResult {
            committed,
            snapshot: self.database.snapshot_at(&self.path, value),
        })
    }
}

impl DatabaseQuery {
    pub fn reference(&self) -> &DatabaseReference {
        &self.reference
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    pub fn order_by_child(mut self, path: &str) -> DatabaseResult<Self> {
        validate_order_by_child_target(path)?;
        let segments = normalize_path(path)?;
        if segments.is_empty() {
            return Err(invalid_argument("orderByChild path cannot be empty"));
        }
        self.params.set_index(QueryIndex::Child(segments))?;
        Ok(self)
    }

    pub fn order_by_key(mut self) -> DatabaseResult<Self> {
        self.params.set_index(QueryIndex::Key)?;
        Ok(self)
    }

    pub fn order_by_value(mut self) -> DatabaseResult<Self> {
        self.params.set_index(QueryIndex::Value)?;
        Ok(self)
    }

    pub fn start_at(mut self, value: Value) -> DatabaseResult<Self> {
        self.params.set_start(value)?;
        Ok(self)
    }

    pub fn end_at(mut self, value: Value) -> DatabaseResult<Self> {
        self.params.set_end(value)?;
        Ok(self)
    }

    pub fn equal_to(mut self, value: Value) -> DatabaseResult<Self> {
        self.params.set_start(value.clone())?;
        self.params.set_end(value)?;
        Ok(self)
    }

    pub fn limit_to_first(mut self, limit: u32) -> DatabaseResult<Self> {
        if limit == 0 {
            return Err(invalid_argument("limitToFirst must be greater than zero"));
        }
        self.params.set_limit(QueryLimit::First(limit))?;
        Ok(self)
    }

    pub fn limit_to_last(mut self, limit: u32) -> DatabaseResult<Self> {
        if limit == 0 {
            return Err(invalid_argument("limitToLast must be greater than zero"));
        }
        self.params.set_limit(QueryLimit::Last(limit))?;
        Ok(self)
    }

    /// One-shot read of the query result.
    pub async fn get(&self) -> DatabaseResult<DataSnapshot> {
        let database = &self.reference.database;
        let value = database
            .inner
            .backend
            .get(&self.reference.path, &self.params)
            .await?;
        Ok(database.snapshot_at(&self.reference.path, value))
    }

    /// Attaches a listener. Value listeners receive the current value right
    /// away; child-added listeners receive every existing child.
    ///
    /// Notifications are driven by writes made through this `Database` (or a
    /// clone of it). Changes made by other clients of a REST backend are not
    /// observed. A failed read of the listened location is delivered to the
    /// callback as `Err`.
    pub async fn on<F>(&self, kind: EventKind, callback: F) -> DatabaseResult<ListenerRegistration>
    where
        F: Fn(DatabaseResult<DatabaseEvent>) + Send + Sync + 'static,
    {
        let target = ListenerTarget {
            path: self.reference.path.clone(),
            params: self.params.clone(),
        };
        self.reference
            .database
            .register_listener(target, kind, Arc::new(callback))
            .await
    }
}

fn normalize_path(path: &str) -> DatabaseResult<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(invalid_argument(
                "Database path cannot contain empty segments",
            ));
        }
        if segment.contains(['.', '#', '$', '[', ']']) {
            return Err(invalid_argument(format!(
                "Database path segment '{segment}' cannot contain '.', '#', '$', '[' or ']'"
            )));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

fn validate_order_by_child_target(path: &str) -> DatabaseResult<()> {
    match path {
        "$key" => Err(invalid_argument(
            "order_by_child(\"$key\") is invalid; call order_by_key() instead",
        )),
        "$priority" => Err(invalid_argument(
            "order_by_child(\"$priority\") is invalid",
        )),
        "$value" => Err(invalid_argument(
            "order_by_child(\"$value\") is invalid; call order_by_value() instead",
        )),
        _ => Ok(()),
    }
}

fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() <= path.len()
        && prefix
            .iter()
            .zip(path.iter())
            .all(|(left, right)| left == right)
}

fn child_value<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn find_child<'a>(children: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    children
        .iter()
        .find(|(candidate, _)| candidate == key)
        .map(|(_, value)| value)
}

fn ordered_children(value: &Value) -> Vec<(String, Value)> {
    let mut children: Vec<(String, Value)> = match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, child)| (key.clone(), child.clone()))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, child)| (index.to_string(), child.clone()))
            .collect(),
        _ => Vec::new(),
    };
    children.sort_by(|left, right| compare_keys(&left.0, &right.0));
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    type Captured = Arc<Mutex<Vec<(EventKind, Option<String>, Value, Option<String>)>>>;

    fn capture(events: &Captured) -> impl Fn(DatabaseResult<DatabaseEvent>) + Send + Sync {
        let events = events.clone();
        move |result| {
            let event = result.expect("listener event");
            events.lock().unwrap().push((
                event.kind,
                event.snapshot.key().map(str::to_string),
                event.snapshot.value().clone(),
                event.previous_name,
            ));
        }
    }

    #[test]
    fn set_and_get_value() {
        let database = Database::in_memory();
        let messages = database.reference("/messages").unwrap();
        block_on(messages.set(json!({ "greeting": "hello" }))).unwrap();

        let snapshot = block_on(messages.get()).unwrap();
        assert!(snapshot.exists());
        assert_eq!(snapshot.key(), Some("messages"));
        assert_eq!(snapshot.into_value(), json!({ "greeting": "hello" }));
    }

    #[test]
    fn reference_navigation() {
        let database = Database::in_memory();
        let nested = database.reference("users/alice/profile").unwrap();
        assert_eq!(nested.path(), "/users/alice/profile");
        assert_eq!(nested.parent().unwrap().path(), "/users/alice");
        assert_eq!(database.reference("/").unwrap().path(), "/");
        assert!(database.reference("/").unwrap().parent().is_none());
    }

    #[test]
    fn invalid_path_characters_are_rejected() {
        let database = Database::in_memory();
        let err = database.reference("items/a.b").unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");
        let err = database.reference("items//b").unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");
    }

    #[test]
    fn snapshot_child_and_size() {
        let database = Database::in_memory();
        let profiles = database.reference("profiles").unwrap();
        block_on(profiles.set(json!({
            "alice": { "age": 31, "city": "Rome" },
            "bob": { "age": 29 }
        })))
        .unwrap();

        let snapshot = block_on(profiles.get()).unwrap();
        assert_eq!(snapshot.size(), 2);
        let alice = snapshot.child("alice").unwrap();
        assert_eq!(alice.key(), Some("alice"));
        assert_eq!(alice.child("age").unwrap().value(), &json!(31));
        assert!(!snapshot.child("carol").unwrap().exists());
    }

    #[test]
    fn query_builders_return_new_queries() {
        let database = Database::in_memory();
        let base = database.reference("items").unwrap().query();
        let ordered = base.clone().order_by_child("price").unwrap();
        assert!(base.params().is_default());
        assert!(!ordered.params().is_default());
    }

    #[test]
    fn query_rejects_conflicting_constraints() {
        let database = Database::in_memory();
        let query = database.reference("items").unwrap().query();

        let err = query
            .clone()
            .order_by_key()
            .unwrap()
            .order_by_value()
            .unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");

        let err = query
            .clone()
            .start_at(json!(1))
            .unwrap()
            .equal_to(json!(2))
            .unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");

        assert!(query.clone().limit_to_first(0).is_err());
        assert!(query.clone().order_by_child("").is_err());
        assert!(query.order_by_child("$key").is_err());
    }

    #[test]
    fn filtered_get_applies_query() {
        let database = Database::in_memory();
        let scores = database.reference("scores").unwrap();
        block_on(scores.set(json!({
            "a": { "score": 10 },
            "b": { "score": 20 },
            "c": { "score": 30 }
        })))
        .unwrap();

        let snapshot = block_on(
            scores
                .query()
                .order_by_child("score")
                .unwrap()
                .start_at(json!(15))
                .unwrap()
                .limit_to_first(1)
                .unwrap()
                .get(),
        )
        .unwrap();
        assert_eq!(snapshot.value(), &json!({ "b": { "score": 20 } }));
    }

    #[test]
    fn value_listener_receives_initial_and_updates() {
        let database = Database::in_memory();
        let counter = database.reference("counters/main").unwrap();
        let events: Captured = Arc::default();

        let registration = block_on(counter.on(EventKind::Value, capture(&events))).unwrap();
        block_on(counter.set(json!(1))).unwrap();
        block_on(counter.set(json!(1))).unwrap();
        block_on(counter.set(json!(2))).unwrap();

        {
            let values: Vec<Value> = events.lock().unwrap().iter().map(|e| e.2.clone()).collect();
            assert_eq!(values, vec![Value::Null, json!(1), json!(2)]);
        }

        registration.detach();
        block_on(counter.set(json!(3))).unwrap();
        assert_eq!(events.lock().unwrap().len(), 3);
        assert_eq!(database.listener_count(), 0);
    }

    #[test]
    fn child_listeners_report_added_changed_removed() {
        let database = Database::in_memory();
        let items = database.reference("items").unwrap();
        block_on(items.set(json!({ "a": 1 }))).unwrap();

        let events: Captured = Arc::default();
        let _added = block_on(items.on(EventKind::ChildAdded, capture(&events))).unwrap();
        let _changed = block_on(items.on(EventKind::ChildChanged, capture(&events))).unwrap();
        let _removed = block_on(items.on(EventKind::ChildRemoved, capture(&events))).unwrap();

        block_on(items.child("b").unwrap().set(json!(2))).unwrap();
        block_on(items.child("a").unwrap().set(json!(10))).unwrap();
        block_on(items.child("b").unwrap().remove()).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            events.as_slice(),
            &[
                (EventKind::ChildAdded, Some("a".to_string()), json!(1), None),
                (
                    EventKind::ChildAdded,
                    Some("b".to_string()),
                    json!(2),
                    Some("a".to_string())
                ),
                (EventKind::ChildChanged, Some("a".to_string()), json!(10), None),
                (
                    EventKind::ChildRemoved,
                    Some("b".to_string()),
                    json!(2),
                    Some("a".to_string())
                ),
            ]
        );
    }

    #[test]
    fn detaching_one_listener_keeps_the_other() {
        let database = Database::in_memory();
        let reference = database.reference("shared").unwrap();
        let first: Captured = Arc::default();
        let second: Captured = Arc::default();

        let first_registration =
            block_on(reference.on(EventKind::Value, capture(&first))).unwrap();
        let _second_registration =
            block_on(reference.on(EventKind::Value, capture(&second))).unwrap();

        first_registration.detach();
        block_on(reference.set(json!("changed"))).unwrap();

        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(second.lock().unwrap().len(), 2);
    }

    #[test]
    fn transaction_notifies_listeners() {
        let database = Database::in_memory();
        let counter = database.reference("counter").unwrap();
        let events: Captured = Arc::default();
        let _registration = block_on(counter.on(EventKind::Value, capture(&events))).unwrap();

        let result = block_on(
            counter.transaction(|current| Some(json!(current.as_i64().unwrap_or(0) + 5))),
        )
        .unwrap();

        assert!(result.committed);
        assert_eq!(result.snapshot.value(), &json!(5));
        assert_eq!(events.lock().unwrap().last().unwrap().2, json!(5));
    }

    #[test]
    fn update_merges_children() {
        let database = Database::in_memory();
        let items = database.reference("items").unwrap();
        block_on(items.set(json!({ "a": { "count": 1 }, "b": true }))).unwrap();

        let mut updates = Map::new();
        updates.insert("a/count".to_string(), json!(2));
        block_on(items.update(updates)).unwrap();

        let value = block_on(items.get()).unwrap().into_value();
        assert_eq!(value, json!({ "a": { "count": 2 }, "b": true }));

        let mut invalid = Map::new();
        invalid.insert("/".to_string(), json!(1));
        assert!(block_on(items.update(invalid)).is_err());
    }
}

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock};

use chrono::Utc;
use serde_json::{Map, Value};

use crate::cms::compositor::{apply_filters, apply_order_by};
use crate::cms::config::CmsConfig;
use crate::cms::error::{invalid_options, CmsError, CmsResult};
use crate::cms::navigation::{shape_items, MenuStructure};
use crate::cms::options::QueryOptions;
use crate::cms::path::{build_path, ResourceKind, ResourcePath};
use crate::cms::projector::{pluck_entry, pluck_fields};
use crate::compose;
use crate::database::error::max_retries;
use crate::database::{
    DataSnapshot, Database, DatabaseEvent, DatabaseQuery, DatabaseReference, EventKind,
    ListenerRegistration, TransactionResult,
};
use crate::logger::Logger;
use crate::util::compose::{async_step, sync_step, Step};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@cms/content"));

const MAX_ADD_ATTEMPTS: usize = 16;

/// Client for content, navigation and schema collections stored in a
/// [`Database`]. Clones share the same context and subscriptions.
#[derive(Clone)]
pub struct Cms {
    inner: Arc<CmsInner>,
}

struct CmsInner {
    config: CmsConfig,
    database: Database,
    context: RwLock<Context>,
    subscriptions: Mutex<HashMap<u64, SubscriptionEntry>>,
    next_subscription_id: AtomicU64,
}

#[derive(Clone, Debug)]
struct Context {
    environment: String,
    locale: String,
}

struct SubscriptionEntry {
    key: RegistrationKey,
    _registration: ListenerRegistration,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RegistrationKey {
    kind: ResourceKind,
    target: Target,
    event: EventKind,
}

impl fmt::Debug for Cms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let context = self.context();
        f.debug_struct("Cms")
            .field("environment", &context.environment)
            .field("locale", &context.locale)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// What an operation addresses inside a collection: the collection root, a
/// collection key (`"products"`) or a single entry below a key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Target {
    key: Option<String>,
    entry: Option<String>,
}

impl Target {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            entry: None,
        }
    }

    pub fn entry(key: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            entry: Some(entry.into()),
        }
    }

    pub fn collection_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn entry_key(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn is_entry(&self) -> bool {
        self.entry.is_some()
    }
}

impl From<&str> for Target {
    fn from(key: &str) -> Self {
        Target::key(key)
    }
}

impl From<String> for Target {
    fn from(key: String) -> Self {
        Target::key(key)
    }
}

impl From<(&str, &str)> for Target {
    fn from((key, entry): (&str, &str)) -> Self {
        Target::entry(key, entry)
    }
}

impl From<u64> for Target {
    fn from(key: u64) -> Self {
        Target::key(key.to_string())
    }
}

impl From<(&str, u64)> for Target {
    fn from((key, entry): (&str, u64)) -> Self {
        Target::entry(key, entry.to_string())
    }
}

impl From<(String, String)> for Target {
    fn from((key, entry): (String, String)) -> Self {
        Target::entry(key, entry)
    }
}

/// Notification delivered by [`Resource::subscribe`], with `fields` applied.
#[derive(Clone, Debug, PartialEq)]
pub struct CmsEvent {
    pub kind: EventKind,
    /// Key of the location the value belongs to.
    pub key: Option<String>,
    pub value: Value,
    pub previous_name: Option<String>,
}

/// Handle to one subscription. Dropping it keeps the subscription alive;
/// call [`Subscription::unsubscribe`] or [`Resource::unsubscribe`] to end it.
#[derive(Debug)]
pub struct Subscription {
    cms: Cms,
    id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.cms.inner.subscriptions.lock().unwrap().contains_key(&self.id)
    }

    /// Removes exactly this subscription. Returns `false` when it was
    /// already removed.
    pub fn unsubscribe(self) -> bool {
        self.cms.remove_subscription(self.id)
    }
}

impl Cms {
    /// Creates a client over an existing database.
    pub fn new(config: CmsConfig, database: Database) -> CmsResult<Self> {
        config.validate()?;
        let context = Context {
            environment: config.environment.clone(),
            locale: config.locale.clone(),
        };
        Ok(Self {
            inner: Arc::new(CmsInner {
                config,
                database,
                context: RwLock::new(context),
                subscriptions: Mutex::new(HashMap::new()),
                next_subscription_id: AtomicU64::new(1),
            }),
        })
    }

    /// Creates a client talking to `config.database_url`, or to an in-memory
    /// database when no usable URL is configured.
    pub fn initialize(config: CmsConfig) -> CmsResult<Self> {
        config.validate()?;
        let database = Database::from_url(config.database_url.as_deref());
        Self::new(config, database)
    }

    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    pub fn config(&self) -> &CmsConfig {
        &self.inner.config
    }

    pub fn environment(&self) -> String {
        self.context().environment
    }

    pub fn locale(&self) -> String {
        self.context().locale
    }

    /// Switches the environment used to resolve content and navigation paths.
    pub fn set_environment(&self, environment: &str) -> CmsResult<()> {
        self.inner.config.check_environment(environment)?;
        self.inner.context.write().unwrap().environment = environment.to_string();
        LOGGER.debug(format!("environment set to {environment}"));
        Ok(())
    }

    /// Switches the locale used to resolve content and navigation paths.
    pub fn set_locale(&self, locale: &str) -> CmsResult<()> {
        self.inner.config.check_locale(locale)?;
        self.inner.context.write().unwrap().locale = locale.to_string();
        LOGGER.debug(format!("locale set to {locale}"));
        Ok(())
    }

    pub fn content(&self) -> ContentResource {
        ContentResource(self.resource(ResourceKind::Content))
    }

    pub fn navigation(&self) -> NavigationResource {
        NavigationResource(self.resource(ResourceKind::Navigation))
    }

    pub fn schemas(&self) -> SchemaResource {
        SchemaResource(self.resource(ResourceKind::Schema))
    }

    pub fn resource(&self, kind: ResourceKind) -> Resource {
        Resource {
            cms: self.clone(),
            kind,
        }
    }

    /// Number of live subscriptions made through this client.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().unwrap().len()
    }

    fn context(&self) -> Context {
        self.inner.context.read().unwrap().clone()
    }

    fn register(&self, key: RegistrationKey, registration: ListenerRegistration) -> Subscription {
        let id = self
            .inner
            .next_subscription_id
            .fetch_add(1, Ordering::SeqCst);
        LOGGER.debug(format!(
            "subscribed to {} {:?} ({})",
            key.kind, key.target, key.event
        ));
        self.inner.subscriptions.lock().unwrap().insert(
            id,
            SubscriptionEntry {
                key,
                _registration: registration,
            },
        );
        Subscription {
            cms: self.clone(),
            id,
        }
    }

    fn remove_subscription(&self, id: u64) -> bool {
        let removed = self.inner.subscriptions.lock().unwrap().remove(&id);
        // The listener detaches when the entry drops, outside the lock.
        removed.is_some()
    }

    fn remove_matching<P>(&self, predicate: P) -> usize
    where
        P: Fn(&RegistrationKey) -> bool,
    {
        let removed: Vec<SubscriptionEntry> = {
            let mut subscriptions = self.inner.subscriptions.lock().unwrap();
            let ids: Vec<u64> = subscriptions
                .iter()
                .filter(|(_, entry)| predicate(&entry.key))
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| subscriptions.remove(id))
                .collect()
        };
        removed.len()
    }
}

/// Operations shared by every collection kind.
#[derive(Clone, Debug)]
pub struct Resource {
    cms: Cms,
    kind: ResourceKind,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn cms(&self) -> &Cms {
        &self.cms
    }

    /// Resolves the store path for `target` under the current environment
    /// and locale.
    pub fn path(&self, target: impl Into<Target>) -> CmsResult<ResourcePath> {
        let target = target.into();
        let context = self.cms.context();
        let base = build_path(
            self.kind,
            target.collection_key(),
            &context.environment,
            &context.locale,
        )?;
        let path = match target.entry_key() {
            Some(entry) => base.entry(entry)?,
            None => base,
        };
        LOGGER.debug(format!("resolved {} path {path}", self.kind));
        Ok(path)
    }

    pub fn reference(&self, target: impl Into<Target>) -> CmsResult<DatabaseReference> {
        let path = self.path(target)?;
        Ok(self.cms.inner.database.reference(path.as_str())?)
    }

    /// Reads `target` with ordering and filters applied and no projection.
    pub async fn get_raw(
        &self,
        target: impl Into<Target>,
        options: &QueryOptions,
    ) -> CmsResult<DataSnapshot> {
        let reference = self.reference(target)?;
        let pipeline = compose!(fetch_step(), query_steps(options));
        pipeline.apply(reference.query()).await
    }

    /// Reads `target` and keeps only `options.fields` on each entry, or on
    /// the entry itself when `target` addresses a single entry.
    pub async fn get(&self, target: impl Into<Target>, options: &QueryOptions) -> CmsResult<Value> {
        let target = target.into();
        let single_entry = target.is_entry();
        let fields = options.fields.clone();
        let reference = self.reference(target)?;

        let pipeline = compose!(
            sync_step(move |snapshot: DataSnapshot| {
                Ok::<_, CmsError>(project_value(
                    snapshot.value(),
                    fields.as_deref(),
                    single_entry,
                ))
            }),
            fetch_step(),
            query_steps(options),
        );
        pipeline.apply(reference.query()).await
    }

    /// Reads the entries whose `field` equals `value`. The field ordering and
    /// the equality bound replace any ordering or bounds in `options`.
    pub async fn get_by_field(
        &self,
        target: impl Into<Target>,
        field: &str,
        value: impl Into<Value>,
        options: &QueryOptions,
    ) -> CmsResult<Value> {
        let options = QueryOptions {
            order_by_child: Some(Value::String(field.to_string())),
            order_by_value: false,
            order_by_key: false,
            start_at: None,
            end_at: None,
            equal_to: Some(value.into()),
            ..options.clone()
        };
        self.get(target, &options).await
    }

    /// Listens for `event` on `target`, delivering store events untouched.
    pub async fn subscribe_raw<F>(
        &self,
        target: impl Into<Target>,
        event: EventKind,
        options: &QueryOptions,
        callback: F,
    ) -> CmsResult<Subscription>
    where
        F: Fn(CmsResult<DatabaseEvent>) + Send + Sync + 'static,
    {
        let target = target.into();
        let reference = self.reference(target.clone())?;
        let query = query_steps(options).apply(reference.query()).await?;
        let registration = query
            .on(event, move |result| callback(result.map_err(CmsError::from)))
            .await?;
        let key = RegistrationKey {
            kind: self.kind,
            target,
            event,
        };
        Ok(self.cms.register(key, registration))
    }

    /// Listens for `event` on `target`, applying `options.fields` to every
    /// delivered value. Child events carry a single entry and are projected
    /// as such.
    ///
    /// Only writes made through this client's [`Database`] are observed.
    /// Store failures reach `callback` as
    /// [`CmsErrorCode::Store`](crate::cms::CmsErrorCode::Store) errors.
    pub async fn subscribe<F>(
        &self,
        target: impl Into<Target>,
        event: EventKind,
        options: &QueryOptions,
        callback: F,
    ) -> CmsResult<Subscription>
    where
        F: Fn(CmsResult<CmsEvent>) + Send + Sync + 'static,
    {
        let target = target.into();
        let single_entry = target.is_entry();
        let fields = options.fields.clone();
        self.subscribe_raw(target, event, options, move |result| {
            callback(result.map(|event| {
                let entry_level = single_entry || event.kind != EventKind::Value;
                CmsEvent {
                    kind: event.kind,
                    key: event.snapshot.key().map(str::to_string),
                    value: project_value(event.snapshot.value(), fields.as_deref(), entry_level),
                    previous_name: event.previous_name,
                }
            }))
        })
        .await
    }

    /// Ends every subscription this client holds for `target` and `event`
    /// (any event when `None`). Returns how many were removed.
    pub fn unsubscribe(&self, target: impl Into<Target>, event: Option<EventKind>) -> usize {
        let target = target.into();
        let kind = self.kind;
        let removed = self.cms.remove_matching(|key| {
            key.kind == kind
                && key.target == target
                && event.map_or(true, |event| key.event == event)
        });
        LOGGER.debug(format!("removed {removed} {kind} subscription(s)"));
        removed
    }

    pub async fn set(&self, target: impl Into<Target>, value: Value) -> CmsResult<()> {
        Ok(self.reference(target)?.set(value).await?)
    }

    /// Merges `updates` (child paths relative to `target`) into the stored
    /// value. An empty map writes nothing.
    pub async fn update(
        &self,
        target: impl Into<Target>,
        updates: Map<String, Value>,
    ) -> CmsResult<()> {
        Ok(self.reference(target)?.update(updates).await?)
    }

    pub async fn remove(&self, target: impl Into<Target>) -> CmsResult<()> {
        Ok(self.reference(target)?.remove().await?)
    }

    /// Atomically rewrites `target`; returning `None` from `update` aborts.
    pub async fn transaction<F>(
        &self,
        target: impl Into<Target>,
        update: F,
    ) -> CmsResult<TransactionResult>
    where
        F: Fn(Value) -> Option<Value> + Send + Sync,
    {
        Ok(self.reference(target)?.transaction(update).await?)
    }
}

/// Content collections, keyed by content type.
#[derive(Clone, Debug)]
pub struct ContentResource(Resource);

impl Deref for ContentResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}

impl ContentResource {
    /// Stores `value` as a new entry of `content_type`, keyed by the current
    /// time in milliseconds and stamped with a matching `id`. Returns the key.
    pub async fn add(&self, content_type: &str, value: Value) -> CmsResult<String> {
        let Value::Object(fields) = value else {
            return Err(invalid_options("value", "content entries must be objects"));
        };

        let mut key = Utc::now().timestamp_millis();
        for _ in 0..MAX_ADD_ATTEMPTS {
            let entry_key = key.to_string();
            let mut entry = fields.clone();
            entry.insert("id".to_string(), Value::from(key));
            let entry = Value::Object(entry);

            let reference = self.reference(Target::entry(content_type, entry_key.as_str()))?;
            let result = reference
                .transaction(move |current| current.is_null().then(|| entry.clone()))
                .await?;
            if result.committed {
                LOGGER.debug(format!("added {content_type} entry {entry_key}"));
                return Ok(entry_key);
            }
            key += 1;
        }
        Err(max_retries(format!("Could not find a free key for a new {content_type} entry")).into())
    }
}

/// Navigation menus.
#[derive(Clone, Debug)]
pub struct NavigationResource(Resource);

impl Deref for NavigationResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}

impl NavigationResource {
    /// Reads the `items` of menu `key`, ordered and filtered by `options`,
    /// and returns them flat or nested.
    pub async fn get_items(
        &self,
        key: &str,
        structure: MenuStructure,
        options: &QueryOptions,
    ) -> CmsResult<Value> {
        let reference = self.reference(key)?.child("items")?;
        let fields = options.fields.clone();
        let pipeline = compose!(
            sync_step(move |snapshot: DataSnapshot| {
                Ok::<_, CmsError>(shape_items(snapshot.value(), structure, fields.as_deref()))
            }),
            fetch_step(),
            query_steps(options),
        );
        pipeline.apply(reference.query()).await
    }
}

/// Content type schemas. Schema paths do not depend on environment or locale.
#[derive(Clone, Debug)]
pub struct SchemaResource(Resource);

impl Deref for SchemaResource {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.0
    }
}

impl SchemaResource {
    /// Reads the field definitions of schema `key`, each projected with
    /// `options.fields`.
    pub async fn get_fields(&self, key: &str, options: &QueryOptions) -> CmsResult<Value> {
        let reference = self.reference(key)?.child("fields")?;
        let fields = options.fields.clone();
        let pipeline = compose!(
            sync_step(move |snapshot: DataSnapshot| {
                Ok::<_, CmsError>(project_value(snapshot.value(), fields.as_deref(), false))
            }),
            fetch_step(),
            query_steps(options),
        );
        pipeline.apply(reference.query()).await
    }
}

/// Ordering, then filters.
fn query_steps(
    options: &QueryOptions,
) -> impl Step<DatabaseQuery, Output = DatabaseQuery, Error = CmsError> {
    let order_options = options.clone();
    let filter_options = options.clone();
    compose!(
        sync_step(move |query: DatabaseQuery| apply_filters(query, &filter_options)),
        sync_step(move |query: DatabaseQuery| apply_order_by(query, &order_options)),
    )
}

fn fetch_step() -> impl Step<DatabaseQuery, Output = DataSnapshot, Error = CmsError> {
    async_step(|query: DatabaseQuery| async move { Ok::<_, CmsError>(query.get().await?) })
}

fn project_value(value: &Value, fields: Option<&[String]>, single_entry: bool) -> Value {
    match fields {
        None => value.clone(),
        Some(fields) if single_entry => pluck_entry(value, fields),
        Some(fields) => pluck_fields(value, fields),
    }
}

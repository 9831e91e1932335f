use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{HeaderValue, ETAG};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{Map, Value};
use url::Url;

use crate::database::error::{
    internal_error, invalid_argument, max_retries, permission_denied, DatabaseError,
    DatabaseResult,
};
use crate::database::query::QueryParams;
use crate::logger::Logger;

/// Update function handed to [`DatabaseBackend::transaction`]. Returning
/// `None` aborts the transaction.
pub type TransactionUpdate<'a> = &'a (dyn Fn(Value) -> Option<Value> + Send + Sync);

/// Result of a transaction: whether the write was committed and the value the
/// location holds afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionOutcome {
    pub committed: bool,
    pub value: Value,
}

const MAX_TRANSACTION_ATTEMPTS: usize = 25;
const IF_MATCH_HEADER: &str = "if-match";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Storage primitive behind a [`Database`](crate::database::Database).
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    async fn get(&self, path: &[String], params: &QueryParams) -> DatabaseResult<Value>;
    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()>;
    async fn update(
        &self,
        base_path: &[String],
        updates: Vec<(Vec<String>, Value)>,
    ) -> DatabaseResult<()>;
    async fn delete(&self, path: &[String]) -> DatabaseResult<()>;
    async fn transaction(
        &self,
        path: &[String],
        update: TransactionUpdate<'_>,
    ) -> DatabaseResult<TransactionOutcome>;
}

/// Picks the REST backend when a database URL is configured, falling back to
/// the in-memory backend when the URL cannot be used.
pub(crate) fn select_backend(database_url: Option<&str>) -> Arc<dyn DatabaseBackend> {
    if let Some(url) = database_url {
        match RestBackend::new(url) {
            Ok(backend) => return Arc::new(backend),
            Err(err) => {
                LOGGER.warn(format!(
                    "Falling back to in-memory database backend: {err}"
                ));
            }
        }
    }
    Arc::new(InMemoryBackend::default())
}

pub(crate) struct InMemoryBackend {
    data: Mutex<Value>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            data: Mutex::new(Value::Object(Default::default())),
        }
    }
}

#[async_trait]
impl DatabaseBackend for InMemoryBackend {
    async fn get(&self, path: &[String], params: &QueryParams) -> DatabaseResult<Value> {
        let data = self.data.lock().unwrap();
        let value = get_at_path(&data, path)
            .filter(|value| !is_empty_object(value))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(params.evaluate(&value))
    }

    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()> {
        let mut data = self.data.lock().unwrap();
        set_at_path(&mut data, path, value);
        Ok(())
    }

    async fn update(
        &self,
        _base_path: &[String],
        updates: Vec<(Vec<String>, Value)>,
    ) -> DatabaseResult<()> {
        let mut data = self.data.lock().unwrap();
        for (path, value) in updates {
            set_at_path(&mut data, &path, value);
        }
        Ok(())
    }

    async fn delete(&self, path: &[String]) -> DatabaseResult<()> {
        let mut data = self.data.lock().unwrap();
        delete_at_path(&mut data, path);
        Ok(())
    }

    async fn transaction(
        &self,
        path: &[String],
        update: TransactionUpdate<'_>,
    ) -> DatabaseResult<TransactionOutcome> {
        let mut data = self.data.lock().unwrap();
        let current = get_at_path(&data, path).cloned().unwrap_or(Value::Null);
        match update(current.clone()) {
            Some(next) => {
                set_at_path(&mut data, path, next.clone());
                Ok(TransactionOutcome {
                    committed: true,
                    value: next,
                })
            }
            None => Ok(TransactionOutcome {
                committed: false,
                value: current,
            }),
        }
    }
}

pub(crate) struct RestBackend {
    client: Client,
    base_url: Url,
    base_query: Vec<(String, String)>,
}

impl RestBackend {
    pub(crate) fn new(raw_url: &str) -> DatabaseResult<Self> {
        let mut url = Url::parse(raw_url)
            .map_err(|err| invalid_argument(format!("Invalid database_url '{raw_url}': {err}")))?;

        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_owned();
            path.push('/');
            url.set_path(&path);
        }

        let base_query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.set_query(None);

        let client = Client::builder()
            .build()
            .map_err(|err| internal_error(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: url,
            base_query,
        })
    }

    fn url_for_path(&self, path: &[String], query: &[(String, String)]) -> DatabaseResult<Url> {
        let relative = if path.is_empty() {
            ".json".to_string()
        } else {
            let encoded: Vec<String> = path
                .iter()
                .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
                .collect();
            format!("./{}.json", encoded.join("/"))
        };
        let mut url = self
            .base_url
            .join(&relative)
            .map_err(|err| internal_error(format!("Failed to compose database URL: {err}")))?;

        if !self.base_query.is_empty() || !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (key, value) in self.base_query.iter().chain(query.iter()) {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn handle_reqwest_error(&self, err: reqwest::Error) -> DatabaseError {
        if let Some(status) = err.status() {
            return self.handle_http_error(status, None);
        }
        internal_error(format!("Database request failed: {err}"))
    }

    fn handle_http_error(&self, status: StatusCode, body: Option<String>) -> DatabaseError {
        let message = body.as_deref().and_then(extract_error_message);

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => invalid_argument(
                message.unwrap_or_else(|| "Invalid data payload".to_string()),
            ),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => permission_denied(
                message.unwrap_or_else(|| "Permission denied".to_string()),
            ),
            _ => internal_error(format!(
                "Database request failed with status {}{}",
                status.as_str(),
                message.map(|b| format!(": {b}")).unwrap_or_default()
            )),
        }
    }

    async fn send_request(
        &self,
        method: Method,
        path: &[String],
        query: &[(String, String)],
        body: Option<&Value>,
        header: Option<(&'static str, HeaderValue)>,
    ) -> DatabaseResult<Response> {
        let url = self.url_for_path(path, query)?;
        log::debug!("database request {method} {url}");
        let mut request = self.client.request(method, url);
        if let Some(payload) = body {
            request = request.json(payload);
        }
        if let Some((name, value)) = header {
            request = request.header(name, value);
        }

        request
            .send()
            .await
            .map_err(|err| self.handle_reqwest_error(err))
    }

    async fn ensure_success(&self, response: Response) -> DatabaseResult<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.ok();
            Err(self.handle_http_error(status, body))
        }
    }

    async fn read_with_etag(&self, path: &[String]) -> DatabaseResult<(HeaderValue, Value)> {
        let response = self
            .send_request(
                Method::GET,
                path,
                &[],
                None,
                Some(("X-Firebase-ETag", HeaderValue::from_static("true"))),
            )
            .await?;
        let response = self.ensure_success(response).await?;
        let etag = response
            .headers()
            .get(ETAG)
            .cloned()
            .ok_or_else(|| internal_error("Database response is missing an ETag header"))?;
        let value = response
            .json()
            .await
            .map_err(|err| internal_error(format!("Failed to decode database response: {err}")))?;
        Ok((etag, value))
    }
}

fn silent() -> Vec<(String, String)> {
    vec![("print".to_string(), "silent".to_string())]
}

#[async_trait]
impl DatabaseBackend for RestBackend {
    async fn get(&self, path: &[String], params: &QueryParams) -> DatabaseResult<Value> {
        let query = params.to_rest_params()?;
        let response = self
            .send_request(Method::GET, path, &query, None, None)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Value::Null);
        }

        let response = self.ensure_success(response).await?;

        response
            .json()
            .await
            .map_err(|err| internal_error(format!("Failed to decode database response: {err}")))
    }

    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()> {
        let response = self
            .send_request(Method::PUT, path, &silent(), Some(&value), None)
            .await?;
        self.ensure_success(response).await.map(|_| ())
    }

    async fn update(
        &self,
        base_path: &[String],
        updates: Vec<(Vec<String>, Value)>,
    ) -> DatabaseResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut payload = Map::with_capacity(updates.len());
        for (absolute_path, value) in updates {
            if !path_starts_with(&absolute_path, base_path) {
                return Err(internal_error(
                    "Database update contained a path outside the reference",
                ));
            }
            let relative = &absolute_path[base_path.len()..];
            if relative.is_empty() {
                return Err(invalid_argument(
                    "Database update path cannot be empty relative to the reference",
                ));
            }
            payload.insert(relative.join("/"), value);
        }

        let body = Value::Object(payload);
        let response = self
            .send_request(Method::PATCH, base_path, &silent(), Some(&body), None)
            .await?;
        self.ensure_success(response).await.map(|_| ())
    }

    async fn delete(&self, path: &[String]) -> DatabaseResult<()> {
        let response = self
            .send_request(Method::DELETE, path, &silent(), None, None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.ensure_success(response).await.map(|_| ())
    }

    async fn transaction(
        &self,
        path: &[String],
        update: TransactionUpdate<'_>,
    ) -> DatabaseResult<TransactionOutcome> {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let (etag, current) = self.read_with_etag(path).await?;
            let Some(next) = update(current.clone()) else {
                return Ok(TransactionOutcome {
                    committed: false,
                    value: current,
                });
            };

            let response = self
                .send_request(
                    Method::PUT,
                    path,
                    &silent(),
                    Some(&next),
                    Some((IF_MATCH_HEADER, etag)),
                )
                .await?;
            if response.status() == StatusCode::PRECONDITION_FAILED {
                log::debug!("transaction attempt {attempt} lost a write race, retrying");
                continue;
            }
            self.ensure_success(response).await?;
            return Ok(TransactionOutcome {
                committed: true,
                value: next,
            });
        }

        Err(max_retries(format!(
            "Transaction gave up after {MAX_TRANSACTION_ATTEMPTS} conflicting attempts"
        )))
    }
}

fn set_at_path(root: &mut Value, path: &[String], value: Value) {
    if value.is_null() {
        delete_at_path(root, path);
        return;
    }
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for segment in parents {
        current = ensure_object(current)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Default::default()));
    }

    ensure_object(current).insert(last.clone(), value);
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Default::default());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

fn get_at_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |current, segment| match current {
        Value::Object(obj) => obj.get(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index)),
        _ => None,
    })
}

fn path_starts_with(path: &[String], prefix: &[String]) -> bool {
    if prefix.len() > path.len() {
        return false;
    }
    path.iter()
        .zip(prefix.iter())
        .all(|(left, right)| left == right)
}

fn delete_at_path(root: &mut Value, path: &[String]) {
    if path.is_empty() {
        *root = Value::Object(Default::default());
        return;
    }
    remove_child(root, path);
}

/// Removes the value at `path` together with every object left empty on the
/// way up. Returns whether `value` itself ended up empty.
fn remove_child(value: &mut Value, path: &[String]) -> bool {
    let (Some((first, rest)), Value::Object(map)) = (path.split_first(), value) else {
        return false;
    };
    let emptied = match map.get_mut(first) {
        Some(child) => rest.is_empty() || remove_child(child, rest),
        None => false,
    };
    if emptied {
        map.remove(first);
    }
    map.is_empty()
}

fn extract_error_message(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
        if let Some(Value::String(message)) = obj.get("error") {
            return Some(message.clone());
        }
    }

    Some(raw.to_string())
}

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@cms/database"));

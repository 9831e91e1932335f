use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use realtime_cms::database::error::internal_error;
use realtime_cms::database::{
    DatabaseBackend, DatabaseResult, QueryParams, TransactionOutcome, TransactionUpdate,
};
use serde_json::{Map, Value};

/// Store whose reads can be switched to fail while writes keep working.
#[derive(Default)]
pub struct FlakyBackend {
    data: Mutex<Value>,
    failing_reads: AtomicBool,
    writes: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyBackend {
    pub fn fail_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn value_at(&self, path: &[&str]) -> Value {
        let data = self.data.lock().unwrap();
        let mut current = &*data;
        for segment in path {
            match current.get(*segment) {
                Some(child) => current = child,
                None => return Value::Null,
            }
        }
        current.clone()
    }

    fn store(&self, path: &[String], value: Value) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut data = self.data.lock().unwrap();
        let mut current = &mut *data;
        for segment in path {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            current = current
                .as_object_mut()
                .map(|object| object.entry(segment.clone()).or_insert(Value::Null))
                .unwrap();
        }
        *current = value;
    }
}

#[async_trait]
impl DatabaseBackend for FlakyBackend {
    async fn get(&self, path: &[String], _params: &QueryParams) -> DatabaseResult<Value> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(internal_error("Read failed"));
        }
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        Ok(self.value_at(&segments))
    }

    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()> {
        self.store(path, value);
        Ok(())
    }

    async fn update(
        &self,
        _base_path: &[String],
        updates: Vec<(Vec<String>, Value)>,
    ) -> DatabaseResult<()> {
        for (path, value) in updates {
            self.store(&path, value);
        }
        Ok(())
    }

    async fn delete(&self, path: &[String]) -> DatabaseResult<()> {
        self.store(path, Value::Null);
        Ok(())
    }

    async fn transaction(
        &self,
        path: &[String],
        update: TransactionUpdate<'_>,
    ) -> DatabaseResult<TransactionOutcome> {
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        let current = self.value_at(&segments);
        match update(current.clone()) {
            Some(value) => {
                self.store(path, value.clone());
                Ok(TransactionOutcome {
                    committed: true,
                    value,
                })
            }
            None => Ok(TransactionOutcome {
                committed: false,
                value: current,
            }),
        }
    }
}

//! Purpose: Database handle enforcing capability and indexing policy per operation.
//! Exports: `Db`, `DbConfig`, `GetOptions`, `IteratorOptions`.
//! Role: The only path from typed operations to transport requests.
//! Invariants: Capability and index refusals happen before any request is sent.
//! Invariants: The cache is advisory; the remote log is the sole source of truth.
//! Invariants: After `unload()` succeeds every operation fails with `Unloaded`.
#![allow(clippy::result_large_err)]

use crate::api::cache::DbCache;
use crate::api::events::EventStream;
use crate::api::metadata::{Capability, DbMetadata, DbType};
use crate::api::transport::{ApiResult, Transport};
use crate::core::error::{Error, ErrorKind};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-handle flags, fixed at construction.
#[derive(Clone, Copy, Debug)]
pub struct DbConfig {
    pub use_cache: bool,
    pub enforce_capabilities: bool,
    pub enforce_index_by: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            enforce_capabilities: true,
            enforce_index_by: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GetOptions {
    /// Overrides the handle's cache flag for this call.
    pub cache: Option<bool>,
    /// When the value is a sequence, return its first element (or `{}`).
    pub unpack: bool,
}

/// Range options for `iterator`/`iterator_raw`, sent as the request body.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IteratorOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
}

pub struct Db {
    transport: Arc<dyn Transport>,
    metadata: DbMetadata,
    index_by: Option<String>,
    config: DbConfig,
    cache: DbCache,
    unloaded: AtomicBool,
}

impl Db {
    pub fn new(transport: Arc<dyn Transport>, metadata: DbMetadata, config: DbConfig) -> Self {
        let index_by = metadata.index_by().map(str::to_string);
        Self {
            transport,
            metadata,
            index_by,
            config,
            cache: DbCache::new(),
            unloaded: AtomicBool::new(false),
        }
    }

    pub fn dbname(&self) -> &str {
        &self.metadata.dbname
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn db_type(&self) -> DbType {
        self.metadata.db_type
    }

    pub fn metadata(&self) -> &DbMetadata {
        &self.metadata
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.metadata.capabilities
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.metadata.has_capability(capability)
    }

    pub fn putable(&self) -> bool {
        self.has_capability(Capability::Put)
    }

    pub fn addable(&self) -> bool {
        self.has_capability(Capability::Add)
    }

    pub fn removable(&self) -> bool {
        self.has_capability(Capability::Remove)
    }

    pub fn iterable(&self) -> bool {
        self.has_capability(Capability::Iterator)
    }

    pub fn queryable(&self) -> bool {
        self.has_capability(Capability::Query)
    }

    pub fn valuable(&self) -> bool {
        self.has_capability(Capability::Value)
    }

    pub fn incrementable(&self) -> bool {
        self.has_capability(Capability::Inc)
    }

    pub fn indexed(&self) -> bool {
        self.index_by.is_some()
    }

    pub fn index_by(&self) -> Option<&str> {
        self.index_by.as_deref()
    }

    pub fn can_append(&self) -> Option<bool> {
        self.metadata.can_append
    }

    pub fn write_access(&self) -> Option<&Value> {
        self.metadata.write.as_ref()
    }

    pub fn cached(&self) -> bool {
        self.config.use_cache
    }

    pub fn cache_get(&self, item: &str) -> Option<Value> {
        self.cache.get(item)
    }

    pub fn cache_remove(&self, item: &str) {
        self.cache.remove(item);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Fresh metadata from the server; the handle's own copy is immutable.
    pub fn info(&self) -> ApiResult<Value> {
        self.ensure_open("info")?;
        self.call("GET", &["db", self.id_ref()], None, "info")
    }

    pub fn get(&self, item: &str) -> ApiResult<Value> {
        self.get_with(item, GetOptions::default())
    }

    pub fn get_with(&self, item: &str, options: GetOptions) -> ApiResult<Value> {
        self.ensure_open("get")?;
        let cache = options.cache.unwrap_or(self.config.use_cache);
        if cache {
            if let Some(hit) = self.cache.get(item) {
                return Ok(unpack_value(hit, options.unpack));
            }
        }
        let value = self.call("GET", &["db", self.id_ref(), item], None, "get")?;
        if cache {
            self.cache.set(item, value.clone());
        }
        Ok(unpack_value(value, options.unpack))
    }

    /// Raw read of the underlying entry; never consults or fills the cache.
    pub fn get_raw(&self, item: &str) -> ApiResult<Value> {
        self.ensure_open("get_raw")?;
        self.call("GET", &["db", self.id_ref(), "raw", item], None, "get_raw")
    }

    pub fn put(&self, item: &Value) -> ApiResult<String> {
        self.put_with(item, None)
    }

    /// Appends a new write even for an identical payload; every call returns
    /// a fresh hash. On success the item is cached under its index-field
    /// value (falling back to its `key` field) and under the hash.
    pub fn put_with(&self, item: &Value, cache: Option<bool>) -> ApiResult<String> {
        self.ensure_open("put")?;
        self.require(Capability::Put, "put")?;
        if let Some(field) = &self.index_by {
            if self.config.enforce_index_by && item.get(field).is_none() {
                return Err(Error::new(ErrorKind::MissingIndex)
                    .with_message(format!("document does not contain field '{field}'"))
                    .with_db(self.dbname())
                    .with_op("put"));
            }
        }
        let cache_enabled = cache.unwrap_or(self.config.use_cache);
        let response = self.call("POST", &["db", self.id_ref(), "put"], Some(item), "put")?;
        let hash = self.entry_hash(response, "put")?;
        if cache_enabled {
            if let Some(key) = self.item_cache_key(item) {
                self.cache.set(key, item.clone());
            }
            self.cache.set(hash.clone(), item.clone());
        }
        Ok(hash)
    }

    pub fn add(&self, item: &Value) -> ApiResult<String> {
        self.add_with(item, None)
    }

    pub fn add_with(&self, item: &Value, cache: Option<bool>) -> ApiResult<String> {
        self.ensure_open("add")?;
        self.require(Capability::Add, "add")?;
        let cache_enabled = cache.unwrap_or(self.config.use_cache);
        let response = self.call("POST", &["db", self.id_ref(), "add"], Some(item), "add")?;
        let hash = self.entry_hash(response, "add")?;
        if cache_enabled {
            self.cache.set(hash.clone(), item.clone());
        }
        Ok(hash)
    }

    /// Returns the authoritative post-increment total as reported by the
    /// server; never computed locally.
    pub fn inc(&self, delta: i64) -> ApiResult<Value> {
        self.ensure_open("inc")?;
        self.require(Capability::Inc, "inc")?;
        self.call(
            "POST",
            &["db", self.id_ref(), "inc"],
            Some(&json!({ "val": delta })),
            "inc",
        )
    }

    pub fn value(&self) -> ApiResult<Value> {
        self.ensure_open("value")?;
        self.require(Capability::Value, "value")?;
        self.call("GET", &["db", self.id_ref(), "value"], None, "value")
    }

    pub fn iterator(&self, options: &IteratorOptions) -> ApiResult<Value> {
        self.ensure_open("iterator")?;
        self.require(Capability::Iterator, "iterator")?;
        let body = iterator_body(options, "iterator", self.dbname())?;
        self.call(
            "GET",
            &["db", self.id_ref(), "iterator"],
            Some(&body),
            "iterator",
        )
    }

    /// Like `iterator`, but yields the raw log entries.
    pub fn iterator_raw(&self, options: &IteratorOptions) -> ApiResult<Value> {
        self.ensure_open("iterator_raw")?;
        self.require(Capability::Iterator, "iterator_raw")?;
        let body = iterator_body(options, "iterator_raw", self.dbname())?;
        self.call(
            "GET",
            &["db", self.id_ref(), "rawiterator"],
            Some(&body),
            "iterator_raw",
        )
    }

    pub fn index(&self) -> ApiResult<Value> {
        self.ensure_open("index")?;
        self.call("GET", &["db", self.id_ref(), "index"], None, "index")
    }

    /// Full snapshot. When the result is a mapping the whole cache is
    /// replaced by it; the cache is never merged with a snapshot.
    pub fn all(&self) -> ApiResult<Value> {
        self.ensure_open("all")?;
        let value = self.call("GET", &["db", self.id_ref(), "all"], None, "all")?;
        if let Value::Object(snapshot) = &value {
            self.cache.replace(snapshot.clone());
        }
        Ok(value)
    }

    /// Deletes the item remotely and evicts its cache entry, so a later
    /// cached `get` cannot resurrect the deleted value.
    pub fn remove(&self, item: &str) -> ApiResult<Value> {
        self.ensure_open("remove")?;
        self.require(Capability::Remove, "remove")?;
        let value = self.call("DELETE", &["db", self.id_ref(), item], None, "remove")?;
        self.cache.remove(item);
        Ok(value)
    }

    /// Destroys the database server-side. The handle transitions to the
    /// unloaded state and must not be reused.
    pub fn unload(&self) -> ApiResult<Value> {
        self.ensure_open("unload")?;
        let value = self.call("DELETE", &["db", self.id_ref()], None, "unload")?;
        self.unloaded.store(true, Ordering::SeqCst);
        self.cache.clear();
        Ok(value)
    }

    /// Opens the named server-push channel. The returned stream is lazy and
    /// unbounded; dropping or cancelling it releases the connection.
    pub fn events(&self, name: &str) -> ApiResult<EventStream> {
        self.ensure_open("events")?;
        let reader = self
            .transport
            .stream(&["db", self.id_ref(), "events", name], None)
            .map_err(|err| err.with_db(self.dbname()).with_op("events"))?;
        Ok(EventStream::new(reader))
    }

    pub fn find_peers(&self) -> ApiResult<Value> {
        self.find_peers_with(&Value::Object(Map::new()))
    }

    pub fn find_peers_with(&self, options: &Value) -> ApiResult<Value> {
        self.ensure_open("find_peers")?;
        self.call(
            "POST",
            &["peers", "searches", "db", self.id_ref()],
            Some(options),
            "find_peers",
        )
    }

    pub fn get_peers(&self) -> ApiResult<Value> {
        self.ensure_open("get_peers")?;
        self.call("GET", &["db", self.id_ref(), "peers"], None, "get_peers")
    }

    fn id_ref(&self) -> &str {
        &self.metadata.id
    }

    fn ensure_open(&self, op: &str) -> ApiResult<()> {
        if self.unloaded.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Unloaded)
                .with_message("database handle was unloaded")
                .with_db(self.dbname())
                .with_op(op));
        }
        Ok(())
    }

    fn require(&self, capability: Capability, op: &str) -> ApiResult<()> {
        if self.config.enforce_capabilities && !self.has_capability(capability) {
            tracing::debug!(db = %self.dbname(), %capability, "refusing operation");
            return Err(Error::new(ErrorKind::Capability)
                .with_message(format!(
                    "database {} does not have {} capability",
                    self.dbname(),
                    capability
                ))
                .with_db(self.dbname())
                .with_op(op)
                .with_capability(capability.as_str()));
        }
        Ok(())
    }

    fn call(
        &self,
        method: &str,
        segments: &[&str],
        body: Option<&Value>,
        op: &str,
    ) -> ApiResult<Value> {
        self.transport
            .request(method, segments, body, None)
            .map_err(|err| err.with_db(self.dbname()).with_op(op))
    }

    fn entry_hash(&self, response: Value, op: &str) -> ApiResult<String> {
        response
            .get("hash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::new(ErrorKind::Decode)
                    .with_message("write response missing hash")
                    .with_db(self.dbname())
                    .with_op(op)
                    .with_body(response.to_string())
            })
    }

    /// Cache key for a written item: the index field's value when present,
    /// otherwise the generic `key` field.
    fn item_cache_key(&self, item: &Value) -> Option<String> {
        let field = self
            .index_by
            .as_deref()
            .and_then(|field| item.get(field))
            .or_else(|| item.get("key"))?;
        Some(match field {
            Value::String(key) => key.clone(),
            other => other.to_string(),
        })
    }
}

/// Explicit shape branch for `get`'s unpack mode: sequences yield their
/// first element (defaulting to an empty mapping); other shapes pass through.
fn unpack_value(value: Value, unpack: bool) -> Value {
    if !unpack {
        return value;
    }
    match value {
        Value::Array(mut items) => {
            if items.is_empty() {
                Value::Object(Map::new())
            } else {
                items.swap_remove(0)
            }
        }
        other => other,
    }
}

fn iterator_body(options: &IteratorOptions, op: &str, dbname: &str) -> ApiResult<Value> {
    serde_json::to_value(options).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("failed to encode iterator options")
            .with_db(dbname)
            .with_op(op)
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::{Db, DbConfig, GetOptions, IteratorOptions, unpack_value};
    use crate::api::metadata::DbMetadata;
    use crate::api::transport::{ApiResult, Transport};
    use crate::core::error::{Error, ErrorKind};
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::io::Read;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct Call {
        method: String,
        segments: Vec<String>,
        body: Option<Value>,
    }

    /// Spy transport: records every call, pops scripted responses in order,
    /// and answers `null` once the script runs out.
    #[derive(Default)]
    struct SpyTransport {
        calls: Mutex<Vec<Call>>,
        responses: Mutex<VecDeque<ApiResult<Value>>>,
    }

    impl SpyTransport {
        fn scripted(responses: Vec<ApiResult<Value>>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into_iter().collect()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call_at(&self, index: usize) -> Call {
            let calls = self.calls.lock().unwrap();
            let call = &calls[index];
            Call {
                method: call.method.clone(),
                segments: call.segments.clone(),
                body: call.body.clone(),
            }
        }
    }

    impl Transport for SpyTransport {
        fn request(
            &self,
            method: &str,
            segments: &[&str],
            body: Option<&Value>,
            _timeout: Option<Duration>,
        ) -> ApiResult<Value> {
            self.calls.lock().unwrap().push(Call {
                method: method.to_string(),
                segments: segments.iter().map(|s| s.to_string()).collect(),
                body: body.cloned(),
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Value::Null))
        }

        fn stream(
            &self,
            _segments: &[&str],
            _timeout: Option<Duration>,
        ) -> ApiResult<Box<dyn Read + Send + Sync>> {
            Err(Error::new(ErrorKind::Transport).with_message("stream not scripted"))
        }
    }

    fn keyvalue_metadata() -> DbMetadata {
        serde_json::from_value(json!({
            "dbname": "keyvalue_test",
            "id": "kv-id",
            "type": "keyvalue",
            "capabilities": ["get", "put", "remove"]
        }))
        .expect("metadata")
    }

    fn docstore_metadata() -> DbMetadata {
        serde_json::from_value(json!({
            "dbname": "docstore_test",
            "id": "doc-id",
            "type": "docstore",
            "capabilities": ["get", "put", "query", "remove"],
            "options": {"indexBy": "_id"}
        }))
        .expect("metadata")
    }

    fn feed_metadata() -> DbMetadata {
        serde_json::from_value(json!({
            "dbname": "feed_test",
            "id": "feed-id",
            "type": "feed",
            "capabilities": ["add", "get", "remove", "iterator"]
        }))
        .expect("metadata")
    }

    fn counter_metadata() -> DbMetadata {
        serde_json::from_value(json!({
            "dbname": "counter_test",
            "id": "counter-id",
            "type": "counter",
            "capabilities": ["inc", "value"]
        }))
        .expect("metadata")
    }

    #[test]
    fn add_on_keyvalue_refuses_before_any_request() {
        let spy = SpyTransport::scripted(Vec::new());
        let db = Db::new(spy.clone(), keyvalue_metadata(), DbConfig::default());
        let err = db.add(&json!({"x": 1})).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Capability);
        assert_eq!(err.db(), Some("keyvalue_test"));
        assert_eq!(err.capability(), Some("add"));
        assert_eq!(spy.call_count(), 0);
    }

    #[test]
    fn put_on_feed_refuses_before_any_request() {
        let spy = SpyTransport::scripted(Vec::new());
        let db = Db::new(spy.clone(), feed_metadata(), DbConfig::default());
        let err = db.put(&json!({"key": "k"})).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Capability);
        assert_eq!(spy.call_count(), 0);
    }

    #[test]
    fn capability_enforcement_can_be_disabled() {
        let spy = SpyTransport::scripted(vec![Ok(json!({"hash": "zdpuHash1"}))]);
        let config = DbConfig {
            enforce_capabilities: false,
            ..DbConfig::default()
        };
        let db = Db::new(spy.clone(), keyvalue_metadata(), config);
        let hash = db.add(&json!({"x": 1})).expect("hash");
        assert_eq!(hash, "zdpuHash1");
        assert_eq!(spy.call_count(), 1);
    }

    #[test]
    fn effective_capabilities_match_server_metadata() {
        let db = Db::new(
            SpyTransport::scripted(Vec::new()),
            counter_metadata(),
            DbConfig::default(),
        );
        assert!(db.incrementable());
        assert!(db.valuable());
        assert!(!db.putable());
        assert!(!db.addable());
        assert!(!db.removable());
        assert!(!db.iterable());
        assert!(!db.queryable());
    }

    #[test]
    fn indexed_put_requires_index_field() {
        let spy = SpyTransport::scripted(Vec::new());
        let db = Db::new(spy.clone(), docstore_metadata(), DbConfig::default());
        let err = db.put(&json!({"value": "v"})).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::MissingIndex);
        assert_eq!(err.db(), Some("docstore_test"));
        assert_eq!(spy.call_count(), 0);
    }

    #[test]
    fn index_enforcement_can_be_disabled() {
        let spy = SpyTransport::scripted(vec![Ok(json!({"hash": "zdpuHash2"}))]);
        let config = DbConfig {
            enforce_index_by: false,
            ..DbConfig::default()
        };
        let db = Db::new(spy.clone(), docstore_metadata(), config);
        let hash = db.put(&json!({"value": "v"})).expect("hash");
        assert_eq!(hash, "zdpuHash2");
        assert_eq!(spy.call_count(), 1);
    }

    #[test]
    fn put_caches_under_index_value_and_hash() {
        let spy = SpyTransport::scripted(vec![Ok(json!({"hash": "zdpuHash3"}))]);
        let db = Db::new(spy.clone(), docstore_metadata(), DbConfig::default());
        let item = json!({"_id": "doc-1", "value": "v"});
        let hash = db.put(&item).expect("hash");
        assert_eq!(db.cache_get("doc-1"), Some(item.clone()));
        assert_eq!(db.cache_get(&hash), Some(item));
    }

    #[test]
    fn put_falls_back_to_key_field_for_cache_key() {
        let spy = SpyTransport::scripted(vec![Ok(json!({"hash": "zdpuHash4"}))]);
        let db = Db::new(spy.clone(), keyvalue_metadata(), DbConfig::default());
        let item = json!({"key": "k", "value": "v"});
        db.put(&item).expect("hash");
        assert_eq!(db.cache_get("k"), Some(item));
    }

    #[test]
    fn cache_round_trip_skips_transport() {
        let spy = SpyTransport::scripted(vec![Ok(json!({"hash": "zdpuHash5"}))]);
        let db = Db::new(spy.clone(), keyvalue_metadata(), DbConfig::default());
        let item = json!({"key": "k", "value": "v"});
        db.put(&item).expect("hash");
        assert_eq!(db.get("k").expect("value"), item);
        // put only; the get was answered from the cache
        assert_eq!(spy.call_count(), 1);

        db.clear_cache();
        let fresh = db.get("k").expect("value");
        assert_eq!(fresh, Value::Null);
        assert_eq!(spy.call_count(), 2);
        assert_eq!(
            spy.call_at(1),
            Call {
                method: "GET".to_string(),
                segments: vec!["db".to_string(), "kv-id".to_string(), "k".to_string()],
                body: None,
            }
        );
    }

    #[test]
    fn get_with_cache_disabled_always_hits_transport() {
        let spy = SpyTransport::scripted(vec![Ok(json!("v1")), Ok(json!("v2"))]);
        let db = Db::new(
            spy.clone(),
            keyvalue_metadata(),
            DbConfig {
                use_cache: false,
                ..DbConfig::default()
            },
        );
        assert_eq!(db.get("k").expect("value"), json!("v1"));
        assert_eq!(db.get("k").expect("value"), json!("v2"));
        assert_eq!(spy.call_count(), 2);
    }

    #[test]
    fn get_unpack_takes_first_sequence_element() {
        let spy = SpyTransport::scripted(vec![Ok(json!([{"_id": "doc-1"}, {"_id": "doc-2"}]))]);
        let db = Db::new(spy, docstore_metadata(), DbConfig::default());
        let value = db
            .get_with(
                "doc-1",
                GetOptions {
                    cache: Some(false),
                    unpack: true,
                },
            )
            .expect("value");
        assert_eq!(value, json!({"_id": "doc-1"}));
    }

    #[test]
    fn unpack_of_empty_sequence_is_empty_mapping() {
        assert_eq!(unpack_value(json!([]), true), json!({}));
        assert_eq!(unpack_value(json!("scalar"), true), json!("scalar"));
        assert_eq!(unpack_value(json!([1, 2]), false), json!([1, 2]));
    }

    #[test]
    fn get_raw_bypasses_cache() {
        let spy = SpyTransport::scripted(vec![Ok(json!({"raw": true}))]);
        let db = Db::new(spy.clone(), keyvalue_metadata(), DbConfig::default());
        db.get_raw("k").expect("value");
        assert_eq!(db.cache_get("k"), None);
        assert_eq!(
            spy.call_at(0).segments,
            vec!["db", "kv-id", "raw", "k"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn all_replaces_cache_instead_of_merging() {
        let spy = SpyTransport::scripted(vec![
            Ok(json!({"hash": "zdpuStale"})),
            Ok(json!({"y": "fresh"})),
        ]);
        let db = Db::new(spy, keyvalue_metadata(), DbConfig::default());
        // pre-populate a stale key that the snapshot no longer contains
        db.put(&json!({"key": "x", "value": "stale"})).expect("hash");
        assert!(db.cache_get("x").is_some());
        let snapshot = db.all().expect("snapshot");
        assert_eq!(snapshot, json!({"y": "fresh"}));
        assert_eq!(db.cache_get("x"), None);
        assert_eq!(db.cache_get("y"), Some(json!("fresh")));
    }

    #[test]
    fn remove_evicts_cache_entry() {
        let spy = SpyTransport::scripted(vec![
            Ok(json!({"hash": "zdpuHash6"})),
            Ok(json!({"hash": "zdpuHash7"})),
        ]);
        let db = Db::new(spy.clone(), keyvalue_metadata(), DbConfig::default());
        db.put(&json!({"key": "k", "value": "v"})).expect("hash");
        assert!(db.cache_get("k").is_some());
        db.remove("k").expect("confirmation");
        assert_eq!(db.cache_get("k"), None);
        assert_eq!(spy.call_at(1).method, "DELETE");
    }

    #[test]
    fn inc_posts_integer_delta() {
        let spy = SpyTransport::scripted(vec![Ok(json!(7))]);
        let db = Db::new(spy.clone(), counter_metadata(), DbConfig::default());
        let total = db.inc(7).expect("total");
        assert_eq!(total, json!(7));
        let call = spy.call_at(0);
        assert_eq!(call.method, "POST");
        assert_eq!(call.body, Some(json!({"val": 7})));
    }

    #[test]
    fn iterator_sends_options_as_body() {
        let spy = SpyTransport::scripted(vec![Ok(json!([]))]);
        let db = Db::new(spy.clone(), feed_metadata(), DbConfig::default());
        let options = IteratorOptions {
            limit: Some(10),
            reverse: Some(true),
            ..IteratorOptions::default()
        };
        db.iterator(&options).expect("entries");
        let call = spy.call_at(0);
        assert_eq!(call.segments.last().map(String::as_str), Some("iterator"));
        assert_eq!(call.body, Some(json!({"limit": 10, "reverse": true})));
    }

    #[test]
    fn iterator_raw_uses_rawiterator_endpoint() {
        let spy = SpyTransport::scripted(vec![Ok(json!([]))]);
        let db = Db::new(spy.clone(), feed_metadata(), DbConfig::default());
        db.iterator_raw(&IteratorOptions::default()).expect("entries");
        assert_eq!(
            spy.call_at(0).segments.last().map(String::as_str),
            Some("rawiterator")
        );
    }

    #[test]
    fn write_response_without_hash_is_decode_failure() {
        let spy = SpyTransport::scripted(vec![Ok(json!({"ok": true}))]);
        let db = Db::new(spy, keyvalue_metadata(), DbConfig::default());
        let err = db.put(&json!({"key": "k"})).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.op(), Some("put"));
    }

    #[test]
    fn unloaded_handle_fails_fast() {
        let spy = SpyTransport::scripted(vec![Ok(json!({}))]);
        let db = Db::new(spy.clone(), keyvalue_metadata(), DbConfig::default());
        db.unload().expect("unload");
        let err = db.get("k").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Unloaded);
        let err = db.put(&json!({"key": "k"})).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Unloaded);
        // only the unload itself reached the transport
        assert_eq!(spy.call_count(), 1);
    }

    #[test]
    fn transport_errors_gain_db_and_op_context() {
        let spy = SpyTransport::scripted(vec![Err(Error::new(ErrorKind::Server)
            .with_status(500)
            .with_message("server reported an error"))]);
        let db = Db::new(spy, keyvalue_metadata(), DbConfig::default());
        let err = db.get_with("k", GetOptions { cache: Some(false), unpack: false }).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.db(), Some("keyvalue_test"));
        assert_eq!(err.op(), Some("get"));
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn find_peers_posts_to_search_endpoint() {
        let spy = SpyTransport::scripted(vec![Ok(json!({"searchID": "kv-id"}))]);
        let db = Db::new(spy.clone(), keyvalue_metadata(), DbConfig::default());
        db.find_peers().expect("search");
        let call = spy.call_at(0);
        assert_eq!(call.method, "POST");
        assert_eq!(
            call.segments,
            vec!["peers", "searches", "db", "kv-id"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(call.body, Some(json!({})));
    }
}

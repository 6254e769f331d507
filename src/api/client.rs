//! Purpose: Entry point for talking to an OrbitDB REST API server.
//! Exports: `Client`, `ClientConfig`.
//! Role: Opens databases and hands out `Db` handles sharing one transport.
//! Invariants: A handle exists only after a successful open call.
//! Invariants: Per-database flag overrides never mutate the client defaults.
#![allow(clippy::result_large_err)]

use crate::api::db::{Db, DbConfig};
use crate::api::metadata::{DbMetadata, OpenOptions};
use crate::api::transport::{ApiResult, DEFAULT_TIMEOUT, HttpTransport, Transport};
use crate::core::error::{Error, ErrorKind};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct ClientConfig {
    /// Default timeout applied to every request.
    pub timeout: Duration,
    pub use_cache: bool,
    pub enforce_capabilities: bool,
    pub enforce_index_by: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            use_cache: true,
            enforce_capabilities: true,
            enforce_index_by: true,
        }
    }
}

#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        Self::with_config(base_url, ClientConfig::default())
    }

    pub fn with_config(base_url: impl Into<String>, config: ClientConfig) -> ApiResult<Self> {
        let transport = HttpTransport::with_timeout(base_url, config.timeout)?;
        Ok(Self {
            transport: Arc::new(transport),
            config,
        })
    }

    /// Builds a client over an existing transport. This is the seam used by
    /// tests to substitute a scripted transport.
    pub fn from_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> ClientConfig {
        self.config
    }

    /// Lists all databases known to the server.
    pub fn list_dbs(&self) -> ApiResult<Value> {
        self.transport
            .request("GET", &["dbs"], None, None)
            .map_err(|err| err.with_op("list_dbs"))
    }

    /// Opens (or creates, per `options`) a database and returns its metadata.
    pub fn open_db(&self, dbname: &str, options: &OpenOptions) -> ApiResult<DbMetadata> {
        let body = serde_json::to_value(options).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("failed to encode open options")
                .with_db(dbname)
                .with_op("open")
                .with_source(err)
        })?;
        let value = self
            .transport
            .request("POST", &["db", dbname], Some(&body), None)
            .map_err(|err| err.with_db(dbname).with_op("open"))?;
        serde_json::from_value(value.clone()).map_err(|err| {
            Error::new(ErrorKind::Decode)
                .with_message("invalid database metadata")
                .with_db(dbname)
                .with_op("open")
                .with_body(value.to_string())
                .with_source(err)
        })
    }

    /// Opens a database and wraps it in a handle with the client defaults.
    pub fn db(&self, dbname: &str) -> ApiResult<Db> {
        self.db_with(dbname, &OpenOptions::new(), self.db_config())
    }

    pub fn db_with(
        &self,
        dbname: &str,
        options: &OpenOptions,
        config: DbConfig,
    ) -> ApiResult<Db> {
        let metadata = self.open_db(dbname, options)?;
        Ok(Db::new(self.transport.clone(), metadata, config))
    }

    /// Current peer searches registered on the server.
    pub fn searches(&self) -> ApiResult<Value> {
        self.transport
            .request("GET", &["peers", "searches"], None, None)
            .map_err(|err| err.with_op("searches"))
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            use_cache: self.config.use_cache,
            enforce_capabilities: self.config.enforce_capabilities,
            enforce_index_by: self.config.enforce_index_by,
        }
    }
}

//! Purpose: Serde models for server-issued database metadata and open options.
//! Exports: `DbMetadata`, `DbType`, `Capability`, `OpenOptions`.
//! Role: Wire shapes for the open-database exchange; the metadata is authoritative.
//! Invariants: `id` is opaque and never rewritten by the client.
//! Invariants: Capability and type names are the fixed server vocabulary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Get,
    Put,
    Add,
    Remove,
    Iterator,
    Query,
    Value,
    Inc,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Get => "get",
            Capability::Put => "put",
            Capability::Add => "add",
            Capability::Remove => "remove",
            Capability::Iterator => "iterator",
            Capability::Query => "query",
            Capability::Value => "value",
            Capability::Inc => "inc",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DbType {
    #[serde(rename = "keyvalue")]
    KeyValue,
    #[serde(rename = "docstore")]
    DocStore,
    #[serde(rename = "feed")]
    Feed,
    #[serde(rename = "eventlog")]
    EventLog,
    #[serde(rename = "counter")]
    Counter,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::KeyValue => "keyvalue",
            DbType::DocStore => "docstore",
            DbType::Feed => "feed",
            DbType::EventLog => "eventlog",
            DbType::Counter => "counter",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one remote database as returned by the open call.
#[derive(Clone, Debug, Deserialize)]
pub struct DbMetadata {
    pub dbname: String,
    pub id: String,
    #[serde(rename = "type")]
    pub db_type: DbType,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(rename = "canAppend", default)]
    pub can_append: Option<bool>,
    /// Access-control descriptor, opaque to the client.
    #[serde(default)]
    pub write: Option<Value>,
}

impl DbMetadata {
    /// Document field used as the primary key, when the database is indexed.
    pub fn index_by(&self) -> Option<&str> {
        self.options.get("indexBy").and_then(Value::as_str)
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Body of the open-database request. The server creates the database when
/// `create` is set and the name is new.
#[derive(Clone, Debug, Default, Serialize)]
pub struct OpenOptions {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub create: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub db_type: Option<DbType>,
    #[serde(rename = "indexBy", skip_serializing_if = "Option::is_none")]
    pub index_by: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub overwrite: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open-or-create with the given type.
    pub fn create(db_type: DbType) -> Self {
        Self {
            create: true,
            db_type: Some(db_type),
            index_by: None,
            overwrite: false,
        }
    }

    pub fn with_index_by(mut self, field: impl Into<String>) -> Self {
        self.index_by = Some(field.into());
        self
    }

    pub fn with_overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

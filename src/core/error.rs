//! Purpose: Define the error type shared by the transport and database layers.
//! Exports: `Error`, `ErrorKind`.
//! Role: Single error channel; callers match on `ErrorKind` instead of strings.
//! Invariants: Local refusals (Capability/MissingIndex/Unloaded) never follow a request.
//! Invariants: Remote failures keep the raw body available for diagnostics.

use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Network failure or timeout while talking to the server.
    Transport,
    /// Response body was not valid JSON.
    Decode,
    /// Server answered with a non-success status.
    Server,
    /// Operation not in the database's capability set.
    Capability,
    /// Write payload missing the database's index field.
    MissingIndex,
    /// Handle used after a successful `unload()`.
    Unloaded,
    /// Local misuse, e.g. an invalid base URL.
    Usage,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    db: Option<String>,
    op: Option<String>,
    status: Option<u16>,
    body: Option<String>,
    detail: Option<Value>,
    capability: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            db: None,
            op: None,
            status: None,
            body: None,
            detail: None,
            capability: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Name of the database the failing operation was issued against.
    pub fn db(&self) -> Option<&str> {
        self.db.as_deref()
    }

    /// Operation attempted when the failure occurred.
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Raw response body, attached to decode and server failures.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Parsed response body, attached to server failures whose body was JSON.
    pub fn detail(&self) -> Option<&Value> {
        self.detail.as_ref()
    }

    pub fn capability(&self) -> Option<&str> {
        self.capability.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(db) = &self.db {
            write!(f, " (db: {db})")?;
        }
        if let Some(op) = &self.op {
            write!(f, " (op: {op})")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        if let Some(capability) = &self.capability {
            write!(f, " (capability: {capability})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

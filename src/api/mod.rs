//! Purpose: Define the stable public API surface of the client.
//! Exports: Client, database handle, transport contract, and wire types.
//! Role: Public, additive-only surface; internals stay behind this module.
//! Invariants: This module is the only public path to the HTTP plumbing.

mod cache;
mod client;
mod db;
mod events;
mod metadata;
mod transport;

pub use crate::core::error::{Error, ErrorKind};
pub use cache::DbCache;
pub use client::{Client, ClientConfig};
pub use db::{Db, DbConfig, GetOptions, IteratorOptions};
pub use events::{Event, EventStream};
pub use metadata::{Capability, DbMetadata, DbType, OpenOptions};
pub use transport::{ApiResult, DEFAULT_TIMEOUT, HttpTransport, Transport};

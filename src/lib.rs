//! Purpose: Client library for the OrbitDB REST API.
//! Exports: `api` (client, database handles, transport contract, errors).
//! Role: Library crate consumed by applications embedding an OrbitDB client.
//! Invariants: All network access goes through the `api::Transport` trait.
//! Invariants: No persisted local state; caches live in process memory only.
pub mod api;
pub mod core;

//! Purpose: Internal support modules for the client.
//! Exports: `error`.
//! Role: Keeps the error channel independent of the HTTP surface.
pub mod error;

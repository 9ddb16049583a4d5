//! Event-sourced entity stores for the quiz backend.
//!
//! Every entity lives in a pair of tables: the object table holds the
//! current rows, the event table an append-only log of changes. Stores load
//! the rows once and then follow the log to keep an indexed in-memory copy.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

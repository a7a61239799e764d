//! # ASCR Common Library
//!
//! Shared code for the ASCR curation services including:
//! - Error taxonomy shared by the record store, task tracker and worker
//! - Configuration loading and root folder resolution
//! - Event types (AscrEvent enum) and the EventBus
//! - SSE adapter for live subscribers
//! - SQLite pool initialization
//! - Utility functions

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, ErrorKind, Result};

//! Instrumented downstream dependencies
//!
//! Each wrapper opens a client span per call, honours the request deadline
//! and feeds the business metrics catalog.

pub mod cache;
pub mod database;

pub use cache::{CacheBackend, CacheError, InstrumentedCache, MemoryCache};
pub use database::{DatabaseBackend, DatabaseError, InstrumentedDatabase, NoopDatabase, Row};

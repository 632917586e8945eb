//! Persistence layer: libSQL-backed append-only signup sink.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{SignupStore, StoredSignup};

//! `SignupStore` trait: the append-only sink completed signups go to.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::wizard::aggregate::SignupRow;

/// A signup row as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSignup {
    pub id: String,
    pub row: SignupRow,
}

/// Backend-agnostic persistence for completed signups.
#[async_trait]
pub trait SignupStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Append one signup. Returns the generated row id.
    async fn append_signup(&self, row: &SignupRow) -> Result<String, DatabaseError>;

    /// Most recent signups first, up to `limit`.
    async fn list_signups(&self, limit: usize) -> Result<Vec<StoredSignup>, DatabaseError>;

    /// Total number of stored signups.
    async fn count_signups(&self) -> Result<usize, DatabaseError>;
}

//! libSQL backend: async `SignupStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{SignupStore, StoredSignup};
use crate::wizard::aggregate::{BusinessProfile, SignupRow};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const SIGNUP_COLUMNS: &str =
    "id, created_at, first_name, last_name, work_email, company_name, industry, country, website";

fn row_to_signup(row: &libsql::Row) -> Result<StoredSignup, libsql::Error> {
    let created_str: String = row.get(1)?;
    Ok(StoredSignup {
        id: row.get(0)?,
        row: SignupRow {
            timestamp: parse_datetime(&created_str),
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            work_email: row.get(4)?,
            business: BusinessProfile {
                company_name: row.get(5)?,
                industry: row.get(6)?,
                country: row.get(7)?,
                website: row.get(8)?,
            },
        },
    })
}

#[async_trait]
impl SignupStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn append_signup(&self, row: &SignupRow) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                &format!("INSERT INTO signups ({SIGNUP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    id.clone(),
                    row.timestamp.to_rfc3339(),
                    row.first_name.clone(),
                    row.last_name.clone(),
                    row.work_email.clone(),
                    row.business.company_name.clone(),
                    row.business.industry.clone(),
                    row.business.country.clone(),
                    row.business.website.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_signup: {e}")))?;

        debug!(id = %id, work_email = %row.work_email, "Signup appended");
        Ok(id)
    }

    async fn list_signups(&self, limit: usize) -> Result<Vec<StoredSignup>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SIGNUP_COLUMNS} FROM signups ORDER BY created_at DESC LIMIT ?1"),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_signups: {e}")))?;

        let mut signups = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_signup(&row) {
                Ok(s) => signups.push(s),
                Err(e) => tracing::warn!("Skipping signup row: {e}"),
            }
        }
        Ok(signups)
    }

    async fn count_signups(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM signups", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_signups: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count_signups: {e}")))?;
        match row {
            Some(row) => {
                let n: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_signups: {e}")))?;
                Ok(n as usize)
            }
            None => Ok(0),
        }
    }
}

//! SQLite Address Book
//!
//! Durable storage for address bindings that survives service restarts.
//! Uses connection pooling via r2d2 for concurrent access.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::traits::{AddressBinding, AddressBook, StorageError, StorageResult};
use crate::keys::Mode;

const SELECT_COLUMNS: &str =
    "SELECT customer_id, loan_id, address, path, internal_key, mode, created_at FROM address_bindings";

/// SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == 1555 || err.extended_code == 2067
    )
}

/// SQLite-backed address book with connection pooling
pub struct SqliteAddressBook {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAddressBook {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let book = Self { pool };
        book.run_migrations()?;

        Ok(book)
    }

    /// Create an in-memory book (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let book = Self { pool };
        book.run_migrations()?;

        Ok(book)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS address_bindings (
                customer_id INTEGER NOT NULL,
                loan_id INTEGER NOT NULL,
                address TEXT NOT NULL UNIQUE,
                path TEXT NOT NULL,
                internal_key TEXT NOT NULL,
                mode TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (customer_id, loan_id)
            );

            CREATE INDEX IF NOT EXISTS idx_address_bindings_customer
                ON address_bindings(customer_id);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_binding(row: &rusqlite::Row) -> rusqlite::Result<AddressBinding> {
        let mode: String = row.get("mode")?;
        let mode = mode
            .parse::<Mode>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;

        Ok(AddressBinding {
            customer_id: row.get::<_, i64>("customer_id")? as u32,
            loan_id: row.get::<_, i64>("loan_id")? as u32,
            address: row.get("address")?,
            path: row.get("path")?,
            internal_key: row.get("internal_key")?,
            mode,
            created_at: row.get::<_, i64>("created_at")? as u64,
        })
    }

    fn get_with(
        conn: &Connection,
        customer_id: u32,
        loan_id: u32,
    ) -> Result<Option<AddressBinding>, StorageError> {
        conn.query_row(
            &format!("{} WHERE customer_id = ?1 AND loan_id = ?2", SELECT_COLUMNS),
            params![customer_id as i64, loan_id as i64],
            Self::row_to_binding,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    // Synchronous helpers for the trait implementation

    fn insert_sync(&self, binding: AddressBinding) -> Result<AddressBinding, StorageError> {
        let conn = self.conn()?;

        let inserted = conn.execute(
            r#"
            INSERT INTO address_bindings (
                customer_id, loan_id, address, path, internal_key, mode, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                binding.customer_id as i64,
                binding.loan_id as i64,
                binding.address,
                binding.path,
                binding.internal_key,
                binding.mode.as_str(),
                binding.created_at as i64,
            ],
        );

        match inserted {
            Ok(_) => Ok(binding),
            Err(e) if is_unique_violation(&e) => {
                match Self::get_with(&conn, binding.customer_id, binding.loan_id)? {
                    Some(existing) if existing.same_binding(&binding) => Ok(existing),
                    Some(existing) => Err(StorageError::Conflict(format!(
                        "customer {} loan {} is bound to {}",
                        existing.customer_id, existing.loan_id, existing.address
                    ))),
                    None => Err(StorageError::Conflict(format!(
                        "address {} is already bound",
                        binding.address
                    ))),
                }
            }
            Err(e) => Err(StorageError::Database(e.to_string())),
        }
    }

    fn get_sync(&self, customer_id: u32, loan_id: u32) -> Result<Option<AddressBinding>, StorageError> {
        let conn = self.conn()?;
        Self::get_with(&conn, customer_id, loan_id)
    }

    fn get_by_address_sync(&self, address: &str) -> Result<Option<AddressBinding>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("{} WHERE address = ?1", SELECT_COLUMNS),
            params![address],
            Self::row_to_binding,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn list_for_customer_sync(&self, customer_id: u32) -> Result<Vec<AddressBinding>, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE customer_id = ?1 ORDER BY loan_id",
                SELECT_COLUMNS
            ))
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let bindings = stmt
            .query_map(params![customer_id as i64], Self::row_to_binding)
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        Ok(bindings)
    }

    fn count_sync(&self) -> Result<usize, StorageError> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM address_bindings", [], |row| row.get(0))
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(count as usize)
    }
}

#[async_trait]
impl AddressBook for SqliteAddressBook {
    async fn insert(&self, binding: AddressBinding) -> StorageResult<AddressBinding> {
        self.insert_sync(binding)
    }

    async fn get(&self, customer_id: u32, loan_id: u32) -> StorageResult<Option<AddressBinding>> {
        self.get_sync(customer_id, loan_id)
    }

    async fn get_by_address(&self, address: &str) -> StorageResult<Option<AddressBinding>> {
        self.get_by_address_sync(address)
    }

    async fn list_for_customer(&self, customer_id: u32) -> StorageResult<Vec<AddressBinding>> {
        self.list_for_customer_sync(customer_id)
    }

    async fn count(&self) -> StorageResult<usize> {
        self.count_sync()
    }
}

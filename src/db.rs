// 🗄️ Entity Store - whole-collection read/replace over a tabular backend
//
// The store is the single source of truth. It only offers bulk operations:
// read a whole collection, replace a whole collection. Each replace is one
// atomic snapshot (a single SQLite transaction here); callers serialize
// read-modify-write cycles per collection.

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::entities::{Account, Claim, Policy};
use crate::error::StorageError;
use crate::schema::{Collection, Record, Table};

// ============================================================================
// STORE CONTRACT
// ============================================================================

pub trait EntityStore: Send + Sync {
    /// Read a whole collection
    fn read(&self, collection: Collection) -> Result<Table, StorageError>;

    /// Replace a whole collection with `table`
    fn write(&self, collection: Collection, table: &Table) -> Result<(), StorageError>;
}

/// Read a collection and decode it into typed records
pub fn read_records<R, S>(store: &S) -> Result<Vec<R>, StorageError>
where
    R: Record,
    S: EntityStore + ?Sized,
{
    store.read(R::COLLECTION)?.into_records()
}

/// Encode typed records and replace their collection
pub fn write_records<R, S>(store: &S, records: &[R]) -> Result<(), StorageError>
where
    R: Record,
    S: EntityStore + ?Sized,
{
    store.write(R::COLLECTION, &Table::from_records(records))
}

/// Copy all three collections from one store into another (replace semantics).
///
/// Every collection is decoded before anything is written, so a row that
/// would not read back fails the copy and leaves the target untouched.
/// Output columns are canonical whatever order the source used.
/// Returns row counts per collection.
pub fn copy_collections<A, B>(from: &A, to: &B) -> Result<Vec<(Collection, usize)>, StorageError>
where
    A: EntityStore + ?Sized,
    B: EntityStore + ?Sized,
{
    let accounts: Vec<Account> = read_records(from)?;
    let claims: Vec<Claim> = read_records(from)?;
    let policies: Vec<Policy> = read_records(from)?;

    write_records(to, &accounts)?;
    write_records(to, &claims)?;
    write_records(to, &policies)?;

    let counts = vec![
        (Collection::Accounts, accounts.len()),
        (Collection::Claims, claims.len()),
        (Collection::Policies, policies.len()),
    ];
    for (collection, rows) in &counts {
        info!(collection = %collection, rows = *rows, "collection copied");
    }
    Ok(counts)
}

fn check_columns(collection: Collection, table: &Table) -> Result<(), StorageError> {
    let expected = collection.columns();
    if table.columns.len() != expected.len()
        || table.columns.iter().zip(expected.iter()).any(|(a, b)| a != b)
    {
        return Err(StorageError::Schema {
            collection,
            detail: format!("expected columns {:?}, got {:?}", expected, table.columns),
        });
    }
    if let Some(bad) = table.rows.iter().position(|r| r.len() != expected.len()) {
        return Err(StorageError::Schema {
            collection,
            detail: format!("row {} has {} cells", bad + 1, table.rows[bad].len()),
        });
    }
    Ok(())
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Process-local store; every collection starts empty
pub struct MemoryStore {
    tables: RwLock<HashMap<Collection, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let tables = Collection::ALL
            .iter()
            .map(|c| (*c, Table::empty(*c)))
            .collect();
        MemoryStore {
            tables: RwLock::new(tables),
        }
    }

    /// Drop a collection entirely, so reads report it missing
    pub fn remove(&self, collection: Collection) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        tables.remove(&collection);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for MemoryStore {
    fn read(&self, collection: Collection) -> Result<Table, StorageError> {
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        tables
            .get(&collection)
            .cloned()
            .ok_or(StorageError::Missing { collection })
    }

    fn write(&self, collection: Collection, table: &Table) -> Result<(), StorageError> {
        check_columns(collection, table)?;
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        tables.insert(collection, table.clone());
        Ok(())
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure all tables exist
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        setup_database(&conn)?;
        info!(path = %path.display(), "SQLite entity store opened");
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }
}

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    for collection in Collection::ALL {
        let columns = collection
            .columns()
            .iter()
            .map(|c| format!("{} TEXT", quote(c)))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote(collection.table_name()),
                columns
            ),
            [],
        )?;
    }

    Ok(())
}

pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Render any SQLite value as a cell, whatever type affinity it was stored with
pub(crate) fn cell_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn map_sqlite(collection: Collection, err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked =>
        {
            StorageError::Locked { collection }
        }
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("no such table") => {
            StorageError::Missing { collection }
        }
        _ => StorageError::Sqlite(err),
    }
}

impl EntityStore for SqliteStore {
    fn read(&self, collection: Collection) -> Result<Table, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote(collection.table_name()));
        let mut stmt = conn.prepare(&sql).map_err(|e| map_sqlite(collection, e))?;

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(cell_text))
                    .collect::<rusqlite::Result<Vec<String>>>()
            })
            .map_err(|e| map_sqlite(collection, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| map_sqlite(collection, e))?;

        debug!(collection = %collection, rows = rows.len(), "collection read");
        Ok(Table { columns, rows })
    }

    fn write(&self, collection: Collection, table: &Table) -> Result<(), StorageError> {
        check_columns(collection, table)?;

        let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let tx = conn.transaction().map_err(|e| map_sqlite(collection, e))?;

        let name = quote(collection.table_name());
        tx.execute(&format!("DELETE FROM {}", name), [])
            .map_err(|e| map_sqlite(collection, e))?;

        {
            let columns = table.columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
            let placeholders = (1..=table.columns.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = tx
                .prepare(&format!("INSERT INTO {} ({}) VALUES ({})", name, columns, placeholders))
                .map_err(|e| map_sqlite(collection, e))?;
            for row in &table.rows {
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(|e| map_sqlite(collection, e))?;
            }
        }

        tx.commit().map_err(|e| map_sqlite(collection, e))?;
        debug!(collection = %collection, rows = table.len(), "collection replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_store::CsvStore;
    use crate::entities::NewAccount;

    fn account(name: &str) -> Account {
        Account::new(NewAccount {
            name: name.to_string(),
            age: 40,
            city: "Chennai".to_string(),
            state: "Tamil Nadu".to_string(),
            pincode: "600001".to_string(),
        })
    }

    #[test]
    fn test_sqlite_replace_collection() {
        let store = SqliteStore::open_in_memory().unwrap();

        let first = vec![account("One"), account("Two")];
        write_records(&store, &first).unwrap();
        let read: Vec<Account> = read_records(&store).unwrap();
        assert_eq!(read, first);

        // Replace, not append
        let second = vec![account("Three")];
        write_records(&store, &second).unwrap();
        let read: Vec<Account> = read_records(&store).unwrap();
        assert_eq!(read, second);
    }

    #[test]
    fn test_sqlite_reads_untyped_columns() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO accounts VALUES ('A1', 'Imported', 52, 'Delhi', 'Delhi', 110001)",
                [],
            )
            .unwrap();
        }

        let read: Vec<Account> = read_records(&store).unwrap();
        assert_eq!(read[0].age, 52);
        assert_eq!(read[0].pincode, "110001");
    }

    #[test]
    fn test_sqlite_missing_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute("DROP TABLE policies", []).unwrap();
        }

        let err = store.read(Collection::Policies).unwrap_err();
        assert!(matches!(err, StorageError::Missing { collection: Collection::Policies }));
    }

    #[test]
    fn test_sqlite_file_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");

        {
            let store = SqliteStore::open(&path, Duration::from_millis(500)).unwrap();
            write_records(&store, &[Policy::new("HAN-1", "Gold")]).unwrap();
        }

        let store = SqliteStore::open(&path, Duration::from_millis(500)).unwrap();
        let policies: Vec<Policy> = read_records(&store).unwrap();
        assert_eq!(policies, vec![Policy::new("HAN-1", "Gold")]);
    }

    #[test]
    fn test_write_rejects_foreign_layout() {
        let store = MemoryStore::new();
        let table = Table {
            columns: vec!["HAN".to_string()],
            rows: vec![],
        };
        let err = store.write(Collection::Policies, &table).unwrap_err();
        assert!(matches!(err, StorageError::Schema { .. }));
    }

    #[test]
    fn test_memory_store_missing_collection() {
        let store = MemoryStore::new();
        store.remove(Collection::Claims).unwrap();
        assert!(matches!(
            store.read(Collection::Claims),
            Err(StorageError::Missing { collection: Collection::Claims })
        ));
    }

    #[test]
    fn test_copy_collections() {
        let source = MemoryStore::new();
        write_records(&source, &[account("Copied")]).unwrap();
        write_records(&source, &[Policy::new("HAN-9", "Basic")]).unwrap();

        let target = SqliteStore::open_in_memory().unwrap();
        let counts = copy_collections(&source, &target).unwrap();

        assert_eq!(
            counts,
            vec![(Collection::Accounts, 1), (Collection::Claims, 0), (Collection::Policies, 1)]
        );
        let accounts: Vec<Account> = read_records(&target).unwrap();
        assert_eq!(accounts[0].name, "Copied");
    }

    #[test]
    fn test_copy_rejects_undecodable_rows_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvStore::init(dir.path()).unwrap();
        std::fs::write(
            source.path(Collection::Accounts),
            "AccountId,Name,Age,City,State,Pincode\nA1,Asha,34.0,Pune,MH,411001\n",
        )
        .unwrap();
        std::fs::write(source.path(Collection::Policies), "HAN,Policy Name\nHAN-1,Gold\n").unwrap();

        let target = SqliteStore::open_in_memory().unwrap();
        write_records(&target, &[Policy::new("HAN-0", "Existing")]).unwrap();

        let err = copy_collections(&source, &target).unwrap_err();
        match err {
            StorageError::Schema { collection, detail } => {
                assert_eq!(collection, Collection::Accounts);
                assert!(detail.contains("row 1"), "{}", detail);
            }
            other => panic!("expected schema error, got {:?}", other),
        }

        let policies: Vec<Policy> = read_records(&target).unwrap();
        assert_eq!(policies, vec![Policy::new("HAN-0", "Existing")]);
        assert!(read_records::<Account, _>(&target).unwrap().is_empty());
    }

    #[test]
    fn test_copy_normalizes_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvStore::init(dir.path()).unwrap();
        std::fs::write(source.path(Collection::Policies), "Policy Name,HAN\nGold,HAN-1\n").unwrap();

        let target = SqliteStore::open_in_memory().unwrap();
        copy_collections(&source, &target).unwrap();

        let table = target.read(Collection::Policies).unwrap();
        assert_eq!(table.columns, vec!["HAN".to_string(), "Policy Name".to_string()]);
        let policies: Vec<Policy> = read_records(&target).unwrap();
        assert_eq!(policies, vec![Policy::new("HAN-1", "Gold")]);
    }

    #[test]
    fn test_sqlite_write_while_another_writer_holds_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let store = SqliteStore::open(&path, Duration::from_millis(10)).unwrap();

        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let err = store
            .write(Collection::Policies, &Table::from_records(&[Policy::new("HAN-1", "Gold")]))
            .unwrap_err();
        assert!(matches!(err, StorageError::Locked { collection: Collection::Policies }));
        assert!(err.is_retryable());

        other.execute_batch("COMMIT").unwrap();
        write_records(&store, &[Policy::new("HAN-1", "Gold")]).unwrap();
        assert_eq!(read_records::<Policy, _>(&store).unwrap().len(), 1);
    }
}

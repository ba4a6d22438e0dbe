// 📜 Audit Log - one immutable entry per changed column
//
// Three independent append-only logs (Accounts, Claims, Policies), each with
// headers: Timestamp, <key column>, Column, OldValue, NewValue.
// A log is created with its header on first append. Appends are never
// batched: each call is durable or fails on its own.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::{cell_text, quote};
use crate::error::AuditError;
use crate::schema::Collection;

// ============================================================================
// AUDIT ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub target_id: String,
    pub column: String,
    pub old_value: String,
    pub new_value: String,
}

impl AuditEntry {
    pub fn new(target_id: &str, column: &str, old_value: &str, new_value: &str) -> Self {
        AuditEntry {
            timestamp: Utc::now(),
            target_id: target_id.to_string(),
            column: column.to_string(),
            old_value: old_value.to_string(),
            new_value: new_value.to_string(),
        }
    }

    fn to_row(&self) -> [String; 5] {
        [
            self.timestamp.to_rfc3339(),
            self.target_id.clone(),
            self.column.clone(),
            self.old_value.clone(),
            self.new_value.clone(),
        ]
    }

    fn from_row(kind: Collection, row: &[String]) -> Result<Self, AuditError> {
        let corrupt = |detail: String| AuditError::Corrupt { kind, detail };
        if row.len() < 5 {
            return Err(corrupt(format!("expected 5 cells, got {}", row.len())));
        }
        let timestamp = DateTime::parse_from_rfc3339(&row[0])
            .map_err(|e| corrupt(format!("Timestamp {:?}: {}", row[0], e)))?
            .with_timezone(&Utc);
        Ok(AuditEntry {
            timestamp,
            target_id: row[1].clone(),
            column: row[2].clone(),
            old_value: row[3].clone(),
            new_value: row[4].clone(),
        })
    }
}

// ============================================================================
// AUDIT LOG CONTRACT
// ============================================================================

pub trait AuditLog: Send + Sync {
    /// Append one entry to the log for `kind`, creating the log if needed
    fn append(&self, kind: Collection, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Entries for one target, in append order
    fn history(&self, kind: Collection, target_id: &str) -> Result<Vec<AuditEntry>, AuditError>;

    /// Stamp and append a single field change
    fn record(
        &self,
        kind: Collection,
        target_id: &str,
        column: &str,
        old_value: &str,
        new_value: &str,
    ) -> Result<AuditEntry, AuditError> {
        let entry = AuditEntry::new(target_id, column, old_value, new_value);
        self.append(kind, &entry)?;
        info!(kind = %kind, target_id, column, "audit entry written");
        Ok(entry)
    }
}

// ============================================================================
// IN-MEMORY LOG
// ============================================================================

#[derive(Default)]
pub struct MemoryAuditLog {
    logs: Mutex<HashMap<Collection, Vec<AuditEntry>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry of one log, in append order
    pub fn entries(&self, kind: Collection) -> Result<Vec<AuditEntry>, AuditError> {
        let logs = self.logs.lock().map_err(|_| AuditError::Poisoned)?;
        Ok(logs.get(&kind).cloned().unwrap_or_default())
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, kind: Collection, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut logs = self.logs.lock().map_err(|_| AuditError::Poisoned)?;
        logs.entry(kind).or_default().push(entry.clone());
        Ok(())
    }

    fn history(&self, kind: Collection, target_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self
            .entries(kind)?
            .into_iter()
            .filter(|e| e.target_id == target_id)
            .collect())
    }
}

// ============================================================================
// SQLITE LOG
// ============================================================================

/// Tables accounts_log, claims_log, policies_log
pub struct SqliteAuditLog {
    conn: Mutex<Connection>,
    created: Mutex<HashSet<Collection>>,
}

fn log_table(kind: Collection) -> String {
    format!("{}_log", kind.table_name())
}

fn map_sqlite(kind: Collection, err: rusqlite::Error) -> AuditError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked =>
        {
            AuditError::Locked { kind }
        }
        _ => AuditError::Sqlite(err),
    }
}

impl SqliteAuditLog {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                warn!(dir = %parent.display(), "log directory is missing, creating it");
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, AuditError> {
        Ok(Self::with_connection(Connection::open_in_memory()?))
    }

    fn with_connection(conn: Connection) -> Self {
        SqliteAuditLog {
            conn: Mutex::new(conn),
            created: Mutex::new(HashSet::new()),
        }
    }

    fn ensure_table(&self, conn: &Connection, kind: Collection) -> Result<(), AuditError> {
        let mut created = self.created.lock().map_err(|_| AuditError::Poisoned)?;
        if created.contains(&kind) {
            return Ok(());
        }
        let columns = kind
            .audit_columns()
            .iter()
            .map(|c| format!("{} TEXT NOT NULL", quote(c)))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(
            &format!("CREATE TABLE IF NOT EXISTS {} ({})", quote(&log_table(kind)), columns),
            [],
        )
        .map_err(|e| map_sqlite(kind, e))?;
        created.insert(kind);
        Ok(())
    }
}

impl AuditLog for SqliteAuditLog {
    fn append(&self, kind: Collection, entry: &AuditEntry) -> Result<(), AuditError> {
        let conn = self.conn.lock().map_err(|_| AuditError::Poisoned)?;
        self.ensure_table(&conn, kind)?;

        let row = entry.to_row();
        conn.execute(
            &format!("INSERT INTO {} VALUES (?1, ?2, ?3, ?4, ?5)", quote(&log_table(kind))),
            params![row[0], row[1], row[2], row[3], row[4]],
        )
        .map_err(|e| map_sqlite(kind, e))?;
        Ok(())
    }

    fn history(&self, kind: Collection, target_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
        let conn = self.conn.lock().map_err(|_| AuditError::Poisoned)?;
        self.ensure_table(&conn, kind)?;

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 ORDER BY rowid",
            quote(&log_table(kind)),
            quote(kind.key_column())
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| map_sqlite(kind, e))?;
        let rows = stmt
            .query_map([target_id], |row| {
                (0..5)
                    .map(|i| row.get_ref(i).map(cell_text))
                    .collect::<rusqlite::Result<Vec<String>>>()
            })
            .map_err(|e| map_sqlite(kind, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| map_sqlite(kind, e))?;

        rows.iter().map(|r| AuditEntry::from_row(kind, r)).collect()
    }
}

// ============================================================================
// CSV LOG
// ============================================================================

/// <dir>/Accounts.csv, <dir>/Claims.csv, <dir>/Policies.csv
pub struct CsvAuditLog {
    dir: PathBuf,
    // serializes appends so rows from concurrent writers never interleave
    write_lock: Mutex<()>,
}

fn map_io(kind: Collection, err: std::io::Error) -> AuditError {
    if err.kind() == ErrorKind::PermissionDenied {
        AuditError::Locked { kind }
    } else {
        AuditError::Io(err)
    }
}

impl CsvAuditLog {
    pub fn open(dir: &Path) -> Result<Self, AuditError> {
        if !dir.exists() {
            warn!(dir = %dir.display(), "log directory is missing, creating it");
            std::fs::create_dir_all(dir)?;
        }
        Ok(CsvAuditLog {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self, kind: Collection) -> PathBuf {
        self.dir.join(format!("{}.csv", kind.name()))
    }
}

impl AuditLog for CsvAuditLog {
    fn append(&self, kind: Collection, entry: &AuditEntry) -> Result<(), AuditError> {
        let _guard = self.write_lock.lock().map_err(|_| AuditError::Poisoned)?;
        let path = self.path(kind);
        // absent or zero-length: no header yet
        let fresh = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| map_io(kind, e))?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if fresh {
            warn!(kind = %kind, path = %path.display(), "audit log does not exist, creating it");
            wtr.write_record(kind.audit_columns())?;
        }
        wtr.write_record(entry.to_row())?;
        wtr.flush().map_err(|e| map_io(kind, e))?;
        Ok(())
    }

    fn history(&self, kind: Collection, target_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
        let path = self.path(kind);
        if !path.is_file() {
            return Ok(Vec::new());
        }

        let mut rdr = csv::Reader::from_path(&path)?;
        let mut entries = Vec::new();
        for result in rdr.records() {
            let record = result?;
            if record.get(1) != Some(target_id) {
                continue;
            }
            let row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            entries.push(AuditEntry::from_row(kind, &row)?);
        }
        Ok(entries)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_keeps_kinds_apart() {
        let log = MemoryAuditLog::new();
        log.record(Collection::Accounts, "A1", "City", "Pune", "Nashik").unwrap();
        log.record(Collection::Claims, "A1", "Status", "Not Paid", "Paid").unwrap();

        assert_eq!(log.entries(Collection::Accounts).unwrap().len(), 1);
        assert_eq!(log.entries(Collection::Claims).unwrap().len(), 1);
        assert!(log.entries(Collection::Policies).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_log_history_in_append_order() {
        let log = SqliteAuditLog::open_in_memory().unwrap();
        log.record(Collection::Policies, "HAN-1", "Policy Name", "Gold", "Platinum").unwrap();
        log.record(Collection::Policies, "HAN-2", "Policy Name", "Basic", "Plus").unwrap();
        log.record(Collection::Policies, "HAN-1", "Policy Name", "Platinum", "Diamond").unwrap();

        let history = log.history(Collection::Policies, "HAN-1").unwrap();
        let values: Vec<(&str, &str)> = history
            .iter()
            .map(|e| (e.old_value.as_str(), e.new_value.as_str()))
            .collect();
        assert_eq!(values, vec![("Gold", "Platinum"), ("Platinum", "Diamond")]);
    }

    #[test]
    fn test_sqlite_log_history_before_first_append() {
        let log = SqliteAuditLog::open_in_memory().unwrap();
        assert!(log.history(Collection::Claims, "C1").unwrap().is_empty());
    }

    #[test]
    fn test_csv_log_lazy_header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvAuditLog::open(&dir.path().join("logs")).unwrap();

        log.record(Collection::Accounts, "A1", "City", "Pune", "Nashik").unwrap();
        log.record(Collection::Accounts, "A1", "Age", "34", "35").unwrap();

        let contents = std::fs::read_to_string(log.path(Collection::Accounts)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,AccountId,Column,OldValue,NewValue");
        assert!(lines[1].ends_with("A1,City,Pune,Nashik"));

        let history = log.history(Collection::Accounts, "A1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].column, "Age");
    }

    #[test]
    fn test_csv_log_headers_use_entity_key() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvAuditLog::open(dir.path()).unwrap();

        log.record(Collection::Claims, "C1", "BillAmount", "10", "0").unwrap();
        log.record(Collection::Policies, "HAN-1", "Policy Name", "A", "B").unwrap();

        let claims = std::fs::read_to_string(log.path(Collection::Claims)).unwrap();
        let policies = std::fs::read_to_string(log.path(Collection::Policies)).unwrap();
        assert!(claims.starts_with("Timestamp,Id,Column,OldValue,NewValue"));
        assert!(policies.starts_with("Timestamp,HAN,Column,OldValue,NewValue"));
    }

    #[test]
    fn test_csv_log_empty_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvAuditLog::open(dir.path()).unwrap();
        std::fs::write(log.path(Collection::Policies), "").unwrap();

        log.record(Collection::Policies, "HAN-1", "Policy Name", "Gold", "Platinum").unwrap();

        let contents = std::fs::read_to_string(log.path(Collection::Policies)).unwrap();
        assert!(contents.starts_with("Timestamp,HAN,Column,OldValue,NewValue"));
        let history = log.history(Collection::Policies, "HAN-1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].new_value, "Platinum");
    }

    #[test]
    fn test_sqlite_log_append_while_another_writer_holds_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let log = SqliteAuditLog::open(&path, Duration::from_millis(10)).unwrap();
        log.record(Collection::Accounts, "A1", "City", "Pune", "Nashik").unwrap();

        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let err = log
            .record(Collection::Accounts, "A1", "City", "Nashik", "Nagpur")
            .unwrap_err();
        assert!(matches!(err, AuditError::Locked { kind: Collection::Accounts }));

        other.execute_batch("COMMIT").unwrap();
        log.record(Collection::Accounts, "A1", "City", "Nashik", "Nagpur").unwrap();
        assert_eq!(log.history(Collection::Accounts, "A1").unwrap().len(), 2);
    }
}

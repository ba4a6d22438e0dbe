// 📂 CSV Entity Store - one file per collection
//
// <dir>/Accounts.csv, <dir>/Claims.csv, <dir>/Policies.csv with a header row.
// Replacing a collection writes a sibling temp file and renames it over the
// original, so readers never see a half-written file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::db::EntityStore;
use crate::error::StorageError;
use crate::schema::{Collection, Table};

pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    /// Use `dir` as the store root, creating the directory if needed.
    /// Collection files are not created; reading one that is absent fails.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        if !dir.exists() {
            warn!(dir = %dir.display(), "data directory is missing, creating it");
            fs::create_dir_all(dir)?;
        }
        Ok(CsvStore {
            dir: dir.to_path_buf(),
        })
    }

    /// Open and create any missing collection file with just its header
    pub fn init(dir: &Path) -> Result<Self, StorageError> {
        let store = Self::open(dir)?;
        for collection in Collection::ALL {
            if !store.path(collection).is_file() {
                info!(collection = %collection, "creating empty collection file");
                store.write(collection, &Table::empty(collection))?;
            }
        }
        Ok(store)
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.csv", collection.name()))
    }
}

fn map_io(collection: Collection, err: std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::PermissionDenied {
        StorageError::Locked { collection }
    } else {
        StorageError::Io(err)
    }
}

fn map_csv(collection: Collection, err: csv::Error) -> StorageError {
    if let csv::ErrorKind::Io(io) = err.kind() {
        if io.kind() == ErrorKind::PermissionDenied {
            return StorageError::Locked { collection };
        }
    }
    StorageError::Csv(err)
}

impl EntityStore for CsvStore {
    fn read(&self, collection: Collection) -> Result<Table, StorageError> {
        let path = self.path(collection);
        if !path.is_file() {
            return Err(StorageError::Missing { collection });
        }

        let mut rdr = csv::Reader::from_path(&path).map_err(|e| map_csv(collection, e))?;
        let columns = rdr
            .headers()
            .map_err(|e| map_csv(collection, e))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| map_csv(collection, e))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        debug!(collection = %collection, rows = rows.len(), "collection read from CSV");
        Ok(Table { columns, rows })
    }

    fn write(&self, collection: Collection, table: &Table) -> Result<(), StorageError> {
        let path = self.path(collection);
        let tmp = self.dir.join(format!(".{}.csv.tmp", collection.name()));

        {
            let mut wtr = csv::Writer::from_path(&tmp).map_err(|e| map_csv(collection, e))?;
            wtr.write_record(&table.columns).map_err(|e| map_csv(collection, e))?;
            for row in &table.rows {
                wtr.write_record(row).map_err(|e| map_csv(collection, e))?;
            }
            wtr.flush().map_err(|e| map_io(collection, e))?;
        }

        fs::rename(&tmp, &path).map_err(|e| map_io(collection, e))?;
        debug!(collection = %collection, rows = table.len(), "collection written to CSV");
        Ok(())
    }
}

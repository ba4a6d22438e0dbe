// ⚙️ Configuration - environment keys, optionally seeded from a KEY=VALUE file
//
// CLAIMS_LEDGER_CONFIG_PATH names an env file; process environment wins over it.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub bind_addr: SocketAddr,
    pub store_kind: StoreKind,
    /// SQLite file, or directory of collection CSVs
    pub data_path: PathBuf,
    /// SQLite file, or directory of audit CSVs
    pub audit_path: PathBuf,
    pub cache_lease_ms: u64,
    pub cache_capacity: usize,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ConfigError {
    pub code: &'static str,
    pub message: String,
}

impl LedgerConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("CLAIMS_LEDGER_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                merged.extend(parse_env_file(config_path)?);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_addr = parse_socket_addr(
            kv.get("CLAIMS_LEDGER_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000),
            "CLAIMS_LEDGER_BIND_ADDR",
        )?;

        let store_kind = parse_store_kind(kv.get("CLAIMS_LEDGER_STORE"))?;
        let (default_data, default_audit) = match store_kind {
            StoreKind::Sqlite => ("data/ledger.db", "data/logs/audit.db"),
            StoreKind::Csv => ("data", "data/logs"),
        };
        let data_path = parse_path(kv.get("CLAIMS_LEDGER_DATA_PATH"), default_data);
        let audit_path = parse_path(kv.get("CLAIMS_LEDGER_AUDIT_PATH"), default_audit);

        let cache_lease_ms = parse_u64(
            kv.get("CLAIMS_LEDGER_CACHE_LEASE_MS"),
            60_000,
            "CLAIMS_LEDGER_CACHE_LEASE_MS",
        )?;
        let cache_capacity = parse_usize(
            kv.get("CLAIMS_LEDGER_CACHE_CAPACITY"),
            0,
            "CLAIMS_LEDGER_CACHE_CAPACITY",
        )?;

        let busy_timeout_ms = parse_u64(
            kv.get("CLAIMS_LEDGER_BUSY_TIMEOUT_MS"),
            5_000,
            "CLAIMS_LEDGER_BUSY_TIMEOUT_MS",
        )?;
        if busy_timeout_ms == 0 {
            return Err(ConfigError {
                code: "ERR_INVALID_CONFIG",
                message: "CLAIMS_LEDGER_BUSY_TIMEOUT_MS must be >= 1".to_string(),
            });
        }

        Ok(LedgerConfig {
            bind_addr,
            store_kind,
            data_path,
            audit_path,
            cache_lease_ms,
            cache_capacity,
            busy_timeout_ms,
        })
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            lease_duration: Duration::from_millis(self.cache_lease_ms),
            capacity: self.cache_capacity,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|_| ConfigError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| ConfigError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        return s[1..s.len() - 1].to_string();
    }
    s.to_string()
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| ConfigError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a socket address like 127.0.0.1:8000", key),
        }),
    }
}

fn parse_store_kind(value: Option<&String>) -> Result<StoreKind, ConfigError> {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(StoreKind::Sqlite),
        Some(v) if v.is_empty() || v == "sqlite" => Ok(StoreKind::Sqlite),
        Some(v) if v == "csv" => Ok(StoreKind::Csv),
        Some(_) => Err(ConfigError {
            code: "ERR_INVALID_CONFIG",
            message: "CLAIMS_LEDGER_STORE must be sqlite or csv".to_string(),
        }),
    }
}

fn parse_path(value: Option<&String>, default: &str) -> PathBuf {
    match value {
        Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => PathBuf::from(default),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| ConfigError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}

fn parse_usize(value: Option<&String>, default: usize, key: &'static str) -> Result<usize, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<usize>().map_err(|_| ConfigError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a non-negative integer", key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_apply_to_empty_env() {
        let cfg = LedgerConfig::from_kv(&HashMap::new()).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:8000".parse().unwrap());
        assert_eq!(cfg.store_kind, StoreKind::Sqlite);
        assert_eq!(cfg.data_path, PathBuf::from("data/ledger.db"));
        assert_eq!(cfg.cache().lease_duration, Duration::from_secs(60));
        assert_eq!(cfg.cache().capacity, 0);
    }

    #[test]
    fn test_csv_store_changes_default_paths() {
        let cfg = LedgerConfig::from_kv(&env(&[("CLAIMS_LEDGER_STORE", "CSV")])).unwrap();
        assert_eq!(cfg.store_kind, StoreKind::Csv);
        assert_eq!(cfg.data_path, PathBuf::from("data"));
        assert_eq!(cfg.audit_path, PathBuf::from("data/logs"));
    }

    #[test]
    fn test_unknown_store_fails() {
        let err = LedgerConfig::from_kv(&env(&[("CLAIMS_LEDGER_STORE", "xlsx")])).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn test_non_numeric_lease_fails() {
        let err =
            LedgerConfig::from_kv(&env(&[("CLAIMS_LEDGER_CACHE_LEASE_MS", "soon")])).unwrap_err();
        assert!(err.message.contains("CLAIMS_LEDGER_CACHE_LEASE_MS"));
    }

    #[test]
    fn test_zero_busy_timeout_fails() {
        let err =
            LedgerConfig::from_kv(&env(&[("CLAIMS_LEDGER_BUSY_TIMEOUT_MS", "0")])).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn test_env_file_values_are_unquoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.env");
        std::fs::write(
            &path,
            "# comment\nCLAIMS_LEDGER_DATA_PATH=\"/srv/ledger.db\"\nCLAIMS_LEDGER_CACHE_CAPACITY=4\n",
        )
        .unwrap();

        let kv = parse_env_file(path.to_str().unwrap()).unwrap();
        let cfg = LedgerConfig::from_kv(&kv).unwrap();
        assert_eq!(cfg.data_path, PathBuf::from("/srv/ledger.db"));
        assert_eq!(cfg.cache_capacity, 4);
    }

    #[test]
    fn test_malformed_env_file_line_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.env");
        std::fs::write(&path, "NOT A PAIR\n").unwrap();

        let err = parse_env_file(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.code, "ERR_CONFIG_FILE_PARSE");
    }
}

//! Daemon configuration from the environment.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `SPOOL_SOCKET_PATH` | IPC socket location | `~/.spool/daemon.sock` |
//! | `SPOOL_WORKDIR` | Project directory handed to handlers | current directory |
//! | `SPOOL_LOG_JSON` | Emit structured JSON log lines | `false` |
//!
//! Command-line flags override whatever is read here.

use crate::errors::{SpoolError, SpoolResult};
use std::path::PathBuf;

pub const SOCKET_PATH_VAR: &str = "SPOOL_SOCKET_PATH";
pub const WORKDIR_VAR: &str = "SPOOL_WORKDIR";
pub const LOG_JSON_VAR: &str = "SPOOL_LOG_JSON";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub socket_path: PathBuf,
    pub workdir: PathBuf,
    pub json_logs: bool,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> SpoolResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SpoolResult<Self> {
        let socket_path = match lookup(SOCKET_PATH_VAR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => default_socket_path()?,
        };

        let workdir = match lookup(WORKDIR_VAR) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::current_dir()
                .map_err(|e| SpoolError::client_io(".", &e.to_string()))?,
        };

        let json_logs = match lookup(LOG_JSON_VAR) {
            Some(raw) => parse_flag(LOG_JSON_VAR, &raw)?,
            None => false,
        };

        Ok(Self {
            socket_path,
            workdir,
            json_logs,
        })
    }

    /// Create the socket's parent directory if needed
    pub fn ensure_socket_dir(&self) -> SpoolResult<()> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SpoolError::client_io(&parent.display().to_string(), &e.to_string()))?;
        }
        Ok(())
    }
}

/// `~/.spool/daemon.sock`
pub fn default_socket_path() -> SpoolResult<PathBuf> {
    let home = dirs::home_dir().ok_or_else(SpoolError::config_missing_home)?;
    Ok(home.join(".spool").join("daemon.sock"))
}

fn parse_flag(key: &str, raw: &str) -> SpoolResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(SpoolError::config_invalid_value(key, raw, "a boolean flag")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_explicit_values() {
        let config = Config::from_lookup(lookup(&[
            (SOCKET_PATH_VAR, "/tmp/spool-test.sock"),
            (WORKDIR_VAR, "/srv/project"),
            (LOG_JSON_VAR, "yes"),
        ]))
        .unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/spool-test.sock"));
        assert_eq!(config.workdir, PathBuf::from("/srv/project"));
        assert!(config.json_logs);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.socket_path.ends_with(".spool/daemon.sock"));
        assert_eq!(config.workdir, std::env::current_dir().unwrap());
        assert!(!config.json_logs);
    }

    #[test]
    fn test_invalid_flag() {
        let err = Config::from_lookup(lookup(&[(LOG_JSON_VAR, "sometimes")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    #[serial]
    fn test_from_process_env() {
        std::env::set_var(SOCKET_PATH_VAR, "/tmp/from-env.sock");
        std::env::set_var(LOG_JSON_VAR, "0");
        let config = Config::from_env();
        std::env::remove_var(SOCKET_PATH_VAR);
        std::env::remove_var(LOG_JSON_VAR);

        let config = config.unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/from-env.sock"));
        assert!(!config.json_logs);
    }

    #[test]
    fn test_ensure_socket_dir_creates_parent() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            socket_path: temp.path().join("nested/dir/daemon.sock"),
            workdir: temp.path().to_path_buf(),
            json_logs: false,
        };
        config.ensure_socket_dir().unwrap();
        assert!(temp.path().join("nested/dir").is_dir());
    }
}

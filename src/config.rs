use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_POLL_MS: u64 = 100;
const MIN_UPSTREAM_SECS: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Period of the full status refresh.
    pub poll_interval_ms: u64,
    /// Period of the fetch + ahead/behind refresh.
    pub upstream_interval_secs: u64,
    /// Directory under the working tree that is never watched.
    pub exclude: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            upstream_interval_secs: 60,
            exclude: ".git".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, String> {
        let mut config = match config_path(|key| std::env::var_os(key)) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        if let Some(path) = std::env::var_os("VIGIL_LOG") {
            config.log_file = Some(PathBuf::from(path));
        }
        Ok(config)
    }

    /// A missing file is not an error; an unreadable or malformed one is.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(format!("Cannot read config {}: {}", path.display(), e)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_MS))
    }

    pub fn upstream_interval(&self) -> Duration {
        Duration::from_secs(self.upstream_interval_secs.max(MIN_UPSTREAM_SECS))
    }
}

fn config_path(var: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    if let Some(path) = var("VIGIL_CONFIG") {
        return Some(PathBuf::from(path));
    }
    if let Some(dir) = var("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join("vigil").join("config.json"));
    }
    var("HOME").map(|home| PathBuf::from(home).join(".config/vigil/config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn resolves_config_location_in_order() {
        assert_eq!(
            config_path(vars(&[("VIGIL_CONFIG", "/etc/v.json"), ("HOME", "/home/u")])),
            Some(PathBuf::from("/etc/v.json"))
        );
        assert_eq!(
            config_path(vars(&[("XDG_CONFIG_HOME", "/xdg"), ("HOME", "/home/u")])),
            Some(PathBuf::from("/xdg/vigil/config.json"))
        );
        assert_eq!(
            config_path(vars(&[("XDG_CONFIG_HOME", ""), ("HOME", "/home/u")])),
            Some(PathBuf::from("/home/u/.config/vigil/config.json"))
        );
        assert_eq!(config_path(vars(&[])), None);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "poll_interval_ms": 250, "exclude": ".hg" }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.exclude, ".hg");
        assert_eq!(config.upstream_interval(), Duration::from_secs(60));
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn rejects_malformed_and_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::from_file(&path).unwrap_err().starts_with("Invalid config"));

        std::fs::write(&path, r#"{ "poll_ms": 5 }"#).unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = Config {
            poll_interval_ms: 0,
            upstream_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(MIN_POLL_MS));
        assert_eq!(config.upstream_interval(), Duration::from_secs(MIN_UPSTREAM_SECS));
    }
}

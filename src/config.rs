use std::path::PathBuf;
use std::str::FromStr;

/// Server settings, read from `HALLBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// WAL appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            password: "hallbook".into(),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or empty keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_connections = parse_or(&get, "HALLBOOK_MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "HALLBOOK_MAX_CONNECTIONS",
                value: "0".into(),
            });
        }

        Ok(Self {
            bind: get("HALLBOOK_BIND").unwrap_or(defaults.bind),
            port: parse_or(&get, "HALLBOOK_PORT", defaults.port)?,
            data_dir: get("HALLBOOK_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            password: get("HALLBOOK_PASSWORD").unwrap_or(defaults.password),
            max_connections,
            compact_threshold: parse_or(&get, "HALLBOOK_COMPACT_THRESHOLD", defaults.compact_threshold)?,
            metrics_port: match get("HALLBOOK_METRICS_PORT") {
                Some(v) => Some(parse_value("HALLBOOK_METRICS_PORT", v)?),
                None => None,
            },
            tls_cert: get("HALLBOOK_TLS_CERT").map(PathBuf::from),
            tls_key: get("HALLBOOK_TLS_KEY").map(PathBuf::from),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("hallbook.wal")
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        Some(v) => parse_value(var, v),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:5433");
        assert_eq!(config.wal_path(), PathBuf::from("./data/hallbook.wal"));
    }

    #[test]
    fn reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("HALLBOOK_BIND", "127.0.0.1"),
            ("HALLBOOK_PORT", "6000"),
            ("HALLBOOK_DATA_DIR", "/var/lib/hallbook"),
            ("HALLBOOK_PASSWORD", "s3cret"),
            ("HALLBOOK_MAX_CONNECTIONS", "8"),
            ("HALLBOOK_COMPACT_THRESHOLD", "50"),
            ("HALLBOOK_METRICS_PORT", "9100"),
            ("HALLBOOK_TLS_CERT", "/etc/cert.pem"),
            ("HALLBOOK_TLS_KEY", "/etc/key.pem"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:6000");
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/hallbook/hallbook.wal"));
        assert_eq!(config.password, "s3cret");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.tls_cert, Some(PathBuf::from("/etc/cert.pem")));
        assert_eq!(config.tls_key, Some(PathBuf::from("/etc/key.pem")));
    }

    #[test]
    fn empty_values_fall_back() {
        let config = Config::from_lookup(lookup(&[("HALLBOOK_PORT", " "), ("HALLBOOK_METRICS_PORT", "")])).unwrap();
        assert_eq!(config.port, 5433);
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn bad_numbers_are_errors() {
        let err = Config::from_lookup(lookup(&[("HALLBOOK_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("HALLBOOK_PORT"));
        assert!(Config::from_lookup(lookup(&[("HALLBOOK_MAX_CONNECTIONS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("HALLBOOK_METRICS_PORT", "70000")])).is_err());
    }
}

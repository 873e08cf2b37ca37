use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read once at startup from `RESERVD_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub cors_origin: String,
    pub request_timeout: Duration,
    pub notify_delay: Duration,
    pub seed_tables: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3001,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            cors_origin: "http://localhost:5173".into(),
            request_timeout: Duration::from_secs(30),
            notify_delay: Duration::from_millis(1000),
            seed_tables: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparseable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        Self {
            bind: lookup("RESERVD_BIND").unwrap_or(d.bind),
            port: lookup("RESERVD_PORT").and_then(|s| s.parse().ok()).unwrap_or(d.port),
            data_dir: lookup("RESERVD_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            metrics_port: lookup("RESERVD_METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: parsed("RESERVD_COMPACT_THRESHOLD").unwrap_or(d.compact_threshold),
            cors_origin: lookup("RESERVD_CORS_ORIGIN").unwrap_or(d.cors_origin),
            request_timeout: parsed("RESERVD_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.request_timeout),
            notify_delay: parsed("RESERVD_NOTIFY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.notify_delay),
            seed_tables: lookup("RESERVD_SEED_TABLES")
                .is_some_and(|s| matches!(s.trim(), "1" | "true" | "yes")),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservd.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = from_pairs(&[]);
        assert_eq!(c.addr(), "0.0.0.0:3001");
        assert_eq!(c.cors_origin, "http://localhost:5173");
        assert_eq!(c.metrics_port, None);
        assert!(!c.seed_tables);
        assert_eq!(c.wal_path(), PathBuf::from("./data/reservd.wal"));
    }

    #[test]
    fn overrides_and_bad_values() {
        let c = from_pairs(&[
            ("RESERVD_PORT", "8080"),
            ("RESERVD_METRICS_PORT", "9100"),
            ("RESERVD_NOTIFY_DELAY_MS", "0"),
            ("RESERVD_COMPACT_THRESHOLD", "lots"),
            ("RESERVD_SEED_TABLES", "true"),
        ]);
        assert_eq!(c.port, 8080);
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.notify_delay, Duration::ZERO);
        assert_eq!(c.compact_threshold, 1000);
        assert!(c.seed_tables);
    }
}

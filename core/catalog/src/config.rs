use std::path::PathBuf;

const DEFAULT_ADDR: &str = "0.0.0.0:8000";

/// Service settings, read once from the environment at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub db_path: PathBuf,
    pub addr: String,
}

impl ServiceConfig {
    /// `CATALOG_DB_PATH` (or the older `DB_PATH`) and `CATALOG_ADDR`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("CATALOG_DB_PATH")
            .or_else(|| lookup("DB_PATH"))
            .map(PathBuf::from)
            .unwrap_or_else(|| default_db_path(lookup("HOME")));

        let addr = lookup("CATALOG_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());

        Self { db_path, addr }
    }
}

/// `$HOME/.local/share/workflow-catalog/catalog.db`, or `./catalog.db` without a home
pub fn default_db_path(home: Option<String>) -> PathBuf {
    match home {
        Some(home) => PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("workflow-catalog")
            .join("catalog.db"),
        None => PathBuf::from("catalog.db"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[("HOME", "/home/ci")]));
        assert_eq!(config.addr, "0.0.0.0:8000");
        assert_eq!(
            config.db_path,
            PathBuf::from("/home/ci/.local/share/workflow-catalog/catalog.db")
        );
    }

    #[test]
    fn test_no_home_falls_back_to_cwd() {
        let config = ServiceConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.db_path, PathBuf::from("catalog.db"));
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("DB_PATH", "/tmp/legacy.db"),
            ("CATALOG_ADDR", "127.0.0.1:9000"),
        ]));
        assert_eq!(config.db_path, PathBuf::from("/tmp/legacy.db"));
        assert_eq!(config.addr, "127.0.0.1:9000");

        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("DB_PATH", "/tmp/legacy.db"),
            ("CATALOG_DB_PATH", "/tmp/catalog.db"),
        ]));
        assert_eq!(config.db_path, PathBuf::from("/tmp/catalog.db"));
    }
}

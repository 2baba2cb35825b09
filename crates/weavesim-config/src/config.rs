//! Hierarchical keyed configuration (§6: "Hierarchical keyed
//! configuration with string paths (e.g., `sys.caches.l2.size`,
//! `sys.cores.hp.type`). Unused-key detection at close time is fatal in
//! strict mode.").

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use crate::error::ConfigError;
use crate::value::{coerce, FromConfigValue};

/// A parsed `sys.*`-style config tree plus the bookkeeping needed to
/// catch typo'd or stale keys: every successful `get`/`get_required`
/// records the path it touched, and [`Config::check_unused`] compares
/// that against every leaf actually present in the file.
pub struct Config {
    root: toml::Value,
    accessed: Mutex<HashSet<String>>,
    strict: bool,
}

impl Config {
    pub fn from_str(text: &str, strict: bool) -> Result<Self, ConfigError> {
        let root: toml::Value = toml::from_str(text)?;
        Ok(Self { root, accessed: Mutex::new(HashSet::new()), strict })
    }

    pub fn from_file(path: impl AsRef<Path>, strict: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_str(&text, strict)
    }

    fn navigate(&self, path: &str) -> Option<&toml::Value> {
        let mut cur = &self.root;
        for segment in path.split('.') {
            cur = cur.get(segment)?;
        }
        Some(cur)
    }

    /// `config.get<T>(path, default)`: returns `default` if the path is
    /// absent, but still records the path as read so an explicitly
    /// defaulted key doesn't show up as "unused" — mirroring the original,
    /// which writes every default back into an in-memory mirror so a
    /// dumped config shows exactly what ran.
    pub fn get<T: FromConfigValue>(&self, path: &str, default: T) -> T {
        self.accessed.lock().unwrap().insert(path.to_string());
        match self.navigate(path) {
            Some(value) => coerce(path, value).unwrap_or(default),
            None => default,
        }
    }

    /// `config.get<T>(path)` with no default: fatal (configuration error,
    /// §7) if the key is missing or the wrong type.
    pub fn get_required<T: FromConfigValue>(&self, path: &str) -> Result<T, ConfigError> {
        self.accessed.lock().unwrap().insert(path.to_string());
        let value = self.navigate(path).ok_or_else(|| ConfigError::MissingKey(path.to_string()))?;
        coerce(path, value)
    }

    /// `config.subgroups(path)`: the child table names directly under
    /// `path`, e.g. the configured cache levels under `sys.caches`. Sorted
    /// for reproducibility — the original's `g_unordered_map` iteration
    /// order happens to be backend-dependent, so this is an intentional
    /// behavior change (§9 "implementation is free to...") rather than a
    /// blind port.
    pub fn subgroups(&self, path: &str) -> Result<Vec<String>, ConfigError> {
        let value = self.navigate(path).ok_or_else(|| ConfigError::MissingKey(path.to_string()))?;
        let table = value.as_table().ok_or_else(|| ConfigError::NotATable(path.to_string()))?;
        let mut names: Vec<String> = table
            .iter()
            .filter(|(_, v)| v.is_table())
            .map(|(k, _)| k.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// §7 "configuration error...fatal at initialization": walks every
    /// leaf in the file and fails if strict mode is on and any of them
    /// was never read by a `get`/`get_required` call.
    pub fn check_unused(&self) -> Result<(), ConfigError> {
        if !self.strict {
            return Ok(());
        }
        let accessed = self.accessed.lock().unwrap();
        let mut unused = Vec::new();
        collect_leaves(&self.root, String::new(), &mut |path| {
            if !accessed.contains(&path) {
                unused.push(path);
            }
        });
        if unused.is_empty() {
            Ok(())
        } else {
            unused.sort();
            let count = unused.len();
            Err(ConfigError::UnusedKeys(count, unused))
        }
    }
}

fn collect_leaves(value: &toml::Value, prefix: String, visit: &mut impl FnMut(String)) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                collect_leaves(child, path, visit);
            }
        }
        _ => visit(prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [sys]
        frequency = 2000
        lineSize = 64

        [sys.caches.l1d]
        size = 32768
        latency = 4

        [sys.caches.l2]
        size = 262144
        latency = 10
    "#;

    #[test]
    fn get_reads_nested_paths_with_defaults() {
        let cfg = Config::from_str(SAMPLE, false).unwrap();
        assert_eq!(cfg.get::<u32>("sys.frequency", 0), 2000);
        assert_eq!(cfg.get::<u32>("sys.caches.l1d.size", 0), 32768);
        assert_eq!(cfg.get::<u32>("sys.mem.bandwidth", 6400), 6400);
    }

    #[test]
    fn subgroups_lists_sorted_child_tables() {
        let cfg = Config::from_str(SAMPLE, false).unwrap();
        assert_eq!(cfg.subgroups("sys.caches").unwrap(), vec!["l1d", "l2"]);
    }

    #[test]
    fn strict_mode_fails_close_when_a_key_is_never_read() {
        let cfg = Config::from_str(SAMPLE, true).unwrap();
        cfg.get::<u32>("sys.frequency", 0);
        cfg.get::<u32>("sys.lineSize", 0);
        cfg.get::<u32>("sys.caches.l1d.size", 0);
        cfg.get::<u32>("sys.caches.l1d.latency", 0);
        // sys.caches.l2.* never read.
        let err = cfg.check_unused().unwrap_err();
        match err {
            ConfigError::UnusedKeys(count, keys) => {
                assert_eq!(count, 2);
                assert!(keys.contains(&"sys.caches.l2.size".to_string()));
            }
            other => panic!("expected UnusedKeys, got {other:?}"),
        }
    }

    #[test]
    fn strict_mode_passes_once_every_leaf_is_read() {
        let cfg = Config::from_str(SAMPLE, true).unwrap();
        for path in [
            "sys.frequency",
            "sys.lineSize",
            "sys.caches.l1d.size",
            "sys.caches.l1d.latency",
            "sys.caches.l2.size",
            "sys.caches.l2.latency",
        ] {
            cfg.get::<u32>(path, 0);
        }
        cfg.check_unused().unwrap();
    }

    #[test]
    fn get_required_fails_on_a_missing_key() {
        let cfg = Config::from_str(SAMPLE, false).unwrap();
        let err = cfg.get_required::<String>("sys.mem.techIni").unwrap_err();
        matches!(err, ConfigError::MissingKey(_));
    }
}

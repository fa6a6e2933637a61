//! # Config Resolver
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Domain Resolution                                    │
//! │                                                                         │
//! │  config/equipment.json ─────────┐                                       │
//! │                                 ├──► deep_merge ──► domains["equipment"]│
//! │  config/local_equipment.json ───┘    (local wins)                       │
//! │                                                                         │
//! │  get("equipment", "scale.connection.port", "COM1")                     │
//! │       │                                                                 │
//! │       ├── domain missing        ──► default                             │
//! │       ├── any segment missing   ──► default                             │
//! │       └── found                 ──► value                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Loading never fails. A missing or malformed file is logged and skipped,
//! and callers fall back to their defaults. Problems are also kept in
//! [`ConfigResolver::load_issues`] so a binary can report them once its
//! subscriber is installed. `local_*.json` files hold
//! per-terminal overrides (port names, tokens) and are not meant to be
//! committed.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::merge::deep_merge;

/// Domains read from the config directory, one file each.
pub const DOMAINS: [&str; 5] = ["api", "database", "equipment", "ui", "logging"];

/// Environment variable naming the config directory.
pub const CONFIG_DIR_ENV: &str = "PDV_CONFIG_DIR";

/// Picks the config directory.
///
/// `explicit` (a CLI flag) wins, then `PDV_CONFIG_DIR`, then `./config` when
/// it exists, then the platform config directory.
pub fn resolve_config_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    let local = PathBuf::from("config");
    if local.is_dir() {
        return local;
    }
    directories::ProjectDirs::from("com", "pdv", "pdv")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or(local)
}

#[derive(Debug, Clone)]
pub struct ConfigResolver {
    dir: PathBuf,
    domains: BTreeMap<String, Value>,
    issues: Vec<String>,
}

impl ConfigResolver {
    /// Loads every known domain from `dir`.
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let mut resolver = ConfigResolver::empty(dir);
        resolver.reload();
        resolver
    }

    /// Empty resolver rooted at `dir`; nothing is read.
    pub fn empty(dir: impl Into<PathBuf>) -> Self {
        ConfigResolver {
            dir: dir.into(),
            domains: BTreeMap::new(),
            issues: Vec::new(),
        }
    }

    /// Drops in-memory state and reads the files again.
    pub fn reload(&mut self) {
        self.domains.clear();
        self.issues.clear();
        if !self.dir.is_dir() {
            warn!(dir = %self.dir.display(), "Config directory does not exist");
            self.issues
                .push(format!("config directory {} does not exist", self.dir.display()));
            return;
        }
        for name in DOMAINS {
            if let Some(value) = load_domain(&self.dir, name, &mut self.issues) {
                self.domains.insert(name.to_string(), value);
            }
        }
        info!(
            dir = %self.dir.display(),
            loaded = self.domains.len(),
            "Configuration loaded"
        );
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Unreadable or malformed files met by the last load, one line each.
    pub fn load_issues(&self) -> &[String] {
        &self.issues
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    /// Whole resolved domain.
    pub fn domain(&self, domain: &str) -> Option<&Value> {
        self.domains.get(domain)
    }

    /// Value at a dotted path. An empty path addresses the whole domain.
    pub fn lookup(&self, domain: &str, path: &str) -> Option<&Value> {
        let mut current = self.domains.get(domain)?;
        if path.is_empty() {
            return Some(current);
        }
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Value at a dotted path, or `default` if the domain or any segment is
    /// missing.
    pub fn get(&self, domain: &str, path: &str, default: impl Into<Value>) -> Value {
        match self.lookup(domain, path) {
            Some(value) => value.clone(),
            None => default.into(),
        }
    }

    /// Typed read. `None` when missing or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, domain: &str, path: &str) -> Option<T> {
        let value = self.lookup(domain, path)?;
        match T::deserialize(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(domain, path, error = %e, "Config value has unexpected shape");
                None
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, domain: &str, path: &str, default: T) -> T {
        self.get_as(domain, path).unwrap_or(default)
    }

    /// Typed view of a section. `Ok(None)` when it is absent.
    pub fn try_section<T: DeserializeOwned>(
        &self,
        domain: &str,
        path: &str,
    ) -> ConfigResult<Option<T>> {
        match self.lookup(domain, path) {
            None => Ok(None),
            Some(value) => Ok(Some(T::deserialize(value)?)),
        }
    }

    /// Typed view of a section, falling back to `T::default()` with a
    /// warning if it does not deserialize.
    pub fn section<T: DeserializeOwned + Default>(&self, domain: &str, path: &str) -> T {
        match self.try_section(domain, path) {
            Ok(Some(section)) => section,
            Ok(None) => {
                debug!(domain, path, "Config section missing, using defaults");
                T::default()
            }
            Err(e) => {
                warn!(domain, path, error = %e, "Invalid config section, using defaults");
                T::default()
            }
        }
    }

    /// Sets a value, creating the domain and any intermediate objects.
    /// A non-object met on the way is replaced by an object.
    pub fn set(&mut self, domain: &str, path: &str, value: Value) -> ConfigResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::InvalidPath(path.to_string()));
        }
        let root = self
            .domains
            .entry(domain.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        set_path(root, &segments, value);
        Ok(())
    }

    /// Writes the full in-memory domain to `<domain>.json`, or to
    /// `local_<domain>.json` when `local` is set. Returns the file written.
    pub fn save(&self, domain: &str, local: bool) -> ConfigResult<PathBuf> {
        let value = self
            .domains
            .get(domain)
            .ok_or_else(|| ConfigError::UnknownDomain(domain.to_string()))?;

        let path = self.dir.join(file_name(domain, local));
        std::fs::create_dir_all(&self.dir).map_err(|source| ConfigError::Write {
            path: self.dir.clone(),
            source,
        })?;
        let mut contents = serde_json::to_string_pretty(value)?;
        contents.push('\n');
        std::fs::write(&path, contents).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), "Configuration saved");
        Ok(path)
    }
}

fn file_name(domain: &str, local: bool) -> String {
    if local {
        format!("local_{domain}.json")
    } else {
        format!("{domain}.json")
    }
}

fn set_path(target: &mut Value, segments: &[&str], new: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = new;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_path(child, rest, new);
    }
}

/// Base file deep-merged with its local override. An override alone still
/// produces a domain.
fn load_domain(dir: &Path, name: &str, issues: &mut Vec<String>) -> Option<Value> {
    let base = read_json(&dir.join(file_name(name, false)), issues);
    let local = read_json(&dir.join(file_name(name, true)), issues);

    match (base, local) {
        (None, None) => {
            warn!(domain = name, "Config file not found");
            None
        }
        (Some(base), None) => {
            debug!(domain = name, "Config loaded");
            Some(base)
        }
        (base, Some(local)) => {
            let mut value = base.unwrap_or_else(|| Value::Object(Map::new()));
            deep_merge(&mut value, local);
            debug!(domain = name, "Local config override applied");
            Some(value)
        }
    }
}

fn read_json(path: &Path, issues: &mut Vec<String>) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read config file");
            issues.push(format!("cannot read {}: {e}", path.display()));
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed config file ignored");
            issues.push(format!("malformed {} ignored: {e}", path.display()));
            None
        }
    }
}

//! Key/value configuration surface and the typed views the loader reads through it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{AssetSpec, LoaderError, LoaderResult};

/// Config key: `name -> locator` map of declared assets.
pub const KEY_ASSETS: &str = "assets";
/// Config key: `locator -> etag` map.
pub const KEY_ETAGS: &str = "assetEtags";
/// Config key: filenames the sync engine is allowed to delete.
pub const KEY_MANAGED: &str = "managedAssets";
/// Config key: operator silenced the missing-assets dialog.
pub const KEY_DONT_WARN_MISSING: &str = "dontWarnMissingAssets";
/// Config key: classifier marker overrides.
pub const KEY_MARKERS: &str = "classifierMarkers";
/// Config key: `name -> locator` map of the specs the last update fetched successfully.
pub const KEY_LAST_SYNCED: &str = "lastSyncedAssets";

/// A key/value store owned by the host application.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> LoaderResult<()>;
}

/// Read a key and deserialize it, treating missing or malformed values as absent.
pub fn get_typed<T: DeserializeOwned>(store: &dyn ConfigStore, key: &str) -> Option<T> {
    let value = store.get(key)?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Ignoring malformed config value for '{key}': {e}");
            None
        }
    }
}

/// Serialize a value and store it under a key.
pub fn set_typed<T: Serialize>(
    store: &dyn ConfigStore,
    key: &str,
    value: &T,
) -> LoaderResult<()> {
    store.set(key, serde_json::to_value(value)?)
}

/// Declared assets in name order.
pub fn asset_specs(store: &dyn ConfigStore) -> Vec<AssetSpec> {
    get_typed::<BTreeMap<String, String>>(store, KEY_ASSETS)
        .unwrap_or_default()
        .into_iter()
        .map(|(name, locator)| AssetSpec { name, locator })
        .collect()
}

pub fn etag_cache(store: &dyn ConfigStore) -> BTreeMap<String, String> {
    get_typed(store, KEY_ETAGS).unwrap_or_default()
}

pub fn managed_filenames(store: &dyn ConfigStore) -> BTreeSet<String> {
    get_typed(store, KEY_MANAGED).unwrap_or_default()
}

pub fn last_synced_assets(store: &dyn ConfigStore) -> BTreeMap<String, String> {
    get_typed(store, KEY_LAST_SYNCED).unwrap_or_default()
}

pub fn dont_warn_missing(store: &dyn ConfigStore) -> bool {
    get_typed(store, KEY_DONT_WARN_MISSING).unwrap_or(false)
}

/// In-memory store, used by tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets<'a>(assets: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        let map: Map<String, Value> = assets
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        store
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(KEY_ASSETS.to_string(), Value::Object(map));
        store
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> LoaderResult<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// Every `set` rewrites the file through a temporary sibling and a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store, creating an empty one if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> LoaderResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            tracing::info!("Opening config file: {}", path.display());
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&raw)? {
                    Value::Object(map) => map,
                    other => {
                        return Err(LoaderError::Config(format!(
                            "{} must contain a JSON object, found {}",
                            path.display(),
                            json_kind(&other)
                        )))
                    }
                }
            }
        } else {
            tracing::info!("Creating new config file: {}", path.display());
            Map::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &Map<String, Value>) -> LoaderResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(values)?;
        let tmp = tmp_sibling(&self.path);
        let written = std::fs::write(&tmp, &payload)
            .and_then(|_| std::fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> LoaderResult<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        self.persist(&values)
    }
}

/// `<path>.tmp`, the staging path used for every atomic replace.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_asset_specs_sorted_by_name() {
        let store = MemoryStore::with_assets([
            ("zeta", "https://x.test/z.js"),
            ("alpha", "https://x.test/a.css"),
        ]);
        let specs = asset_specs(&store);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "alpha");
        assert_eq!(specs[1].locator, "https://x.test/z.js");
    }

    #[test]
    fn test_malformed_values_read_as_absent() {
        let store = MemoryStore::new();
        store.set(KEY_MANAGED, json!("not a list")).unwrap();
        store.set(KEY_DONT_WARN_MISSING, json!(3)).unwrap();
        assert!(managed_filenames(&store).is_empty());
        assert!(!dont_warn_missing(&store));
    }

    #[test]
    fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.get(KEY_ASSETS).is_none());
        set_typed(&store, KEY_MANAGED, &vec!["a.js", "b.css"]).unwrap();
        store.set(KEY_DONT_WARN_MISSING, json!(true)).unwrap();

        assert!(!tmp_sibling(&path).exists());

        let reopened = JsonFileStore::open(&path).unwrap();
        let managed = managed_filenames(&reopened);
        assert!(managed.contains("a.js"));
        assert!(managed.contains("b.css"));
        assert!(dont_warn_missing(&reopened));
    }

    #[test]
    fn test_json_file_store_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let err = JsonFileStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_tmp_sibling() {
        assert_eq!(
            tmp_sibling(Path::new("/a/b/theme.css")),
            PathBuf::from("/a/b/theme.css.tmp")
        );
    }
}

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SITEURL_OPTION: &str = "wc_subscriptions_siteurl";
pub const IGNORE_DUPLICATE_NOTICE_OPTION: &str = "wcs_ignore_duplicate_siteurl_notice";

const OPTIONS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug)]
pub enum OptionStoreError {
    Read { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, message: String },
    UnsupportedSchema { path: PathBuf, version: u32 },
    Write { path: PathBuf, message: String },
    Poisoned,
}

impl std::fmt::Display for OptionStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionStoreError::Read { path, source } => {
                write!(f, "failed to read options file {}: {source}", path.display())
            }
            OptionStoreError::Parse { path, message } => {
                write!(f, "failed to parse options file {}: {message}", path.display())
            }
            OptionStoreError::UnsupportedSchema { path, version } => write!(
                f,
                "options file {} has unsupported schema_version={version}",
                path.display()
            ),
            OptionStoreError::Write { path, message } => {
                write!(f, "failed to write options file {}: {message}", path.display())
            }
            OptionStoreError::Poisoned => write!(f, "option store lock poisoned"),
        }
    }
}

impl std::error::Error for OptionStoreError {}

/// One change inside an [`OptionStore::apply`] batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionChange<'a> {
    Set { key: &'a str, value: &'a str },
    Delete { key: &'a str },
}

/// Key-value option storage shared with the billing system.
///
/// A batch handed to `apply` lands as a whole or not at all. Nothing beyond
/// a single batch is coordinated, so concurrent writers race with last
/// write winning.
pub trait OptionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, OptionStoreError>;

    /// Applies `changes` in order as one write.
    fn apply(&self, changes: &[OptionChange<'_>]) -> Result<(), OptionStoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), OptionStoreError> {
        self.apply(&[OptionChange::Set { key, value }])
    }

    /// Returns whether the key was present.
    fn delete(&self, key: &str) -> Result<bool, OptionStoreError> {
        let present = self.get(key)?.is_some();
        if present {
            self.apply(&[OptionChange::Delete { key }])?;
        }
        Ok(present)
    }

    /// Drops any cached view so the next read sees the backing storage.
    fn flush_cache(&self) -> Result<(), OptionStoreError> {
        Ok(())
    }

    fn get_or(&self, key: &str, default: &str) -> Result<String, OptionStoreError> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }
}

fn apply_changes(options: &mut BTreeMap<String, String>, changes: &[OptionChange<'_>]) {
    for change in changes {
        match *change {
            OptionChange::Set { key, value } => {
                options.insert(key.to_string(), value.to_string());
            }
            OptionChange::Delete { key } => {
                options.remove(key);
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryOptionStore {
    options: RwLock<BTreeMap<String, String>>,
}

impl MemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options<I, K, V>(options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            options: RwLock::new(
                options
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }
}

impl OptionStore for MemoryOptionStore {
    fn get(&self, key: &str) -> Result<Option<String>, OptionStoreError> {
        let guard = self
            .options
            .read()
            .map_err(|_| OptionStoreError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn apply(&self, changes: &[OptionChange<'_>]) -> Result<(), OptionStoreError> {
        let mut guard = self
            .options
            .write()
            .map_err(|_| OptionStoreError::Poisoned)?;
        apply_changes(&mut guard, changes);
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct OptionsSnapshot {
    #[serde(default = "options_schema_version")]
    schema_version: u32,
    #[serde(default)]
    options: BTreeMap<String, String>,
}

fn options_schema_version() -> u32 {
    OPTIONS_SCHEMA_VERSION
}

/// JSON-file backed store. Reads are served from a cache that
/// `flush_cache` refreshes; every mutation starts from the document on disk
/// so keys written by other processes survive, and is written back through
/// a temp file + rename.
pub struct JsonFileOptionStore {
    path: PathBuf,
    cache: RwLock<BTreeMap<String, String>>,
}

impl JsonFileOptionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, OptionStoreError> {
        let path = path.into();
        let options = load_options_from_disk(&path)?;
        debug!(
            "opened option store path={} keys={}",
            path.display(),
            options.len()
        );
        Ok(Self {
            path,
            cache: RwLock::new(options),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, OptionStoreError> {
        let mut guard = self.cache.write().map_err(|_| OptionStoreError::Poisoned)?;
        let mut next = load_options_from_disk(&self.path)?;
        let result = apply(&mut next);
        write_options_to_disk(&self.path, &next)?;
        *guard = next;
        Ok(result)
    }
}

impl OptionStore for JsonFileOptionStore {
    fn get(&self, key: &str) -> Result<Option<String>, OptionStoreError> {
        let guard = self.cache.read().map_err(|_| OptionStoreError::Poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn apply(&self, changes: &[OptionChange<'_>]) -> Result<(), OptionStoreError> {
        self.mutate(|options| apply_changes(options, changes))
    }

    fn delete(&self, key: &str) -> Result<bool, OptionStoreError> {
        self.mutate(|options| options.remove(key).is_some())
    }

    fn flush_cache(&self) -> Result<(), OptionStoreError> {
        let reloaded = load_options_from_disk(&self.path)?;
        let mut guard = self.cache.write().map_err(|_| OptionStoreError::Poisoned)?;
        *guard = reloaded;
        Ok(())
    }
}

fn load_options_from_disk(path: &Path) -> Result<BTreeMap<String, String>, OptionStoreError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = fs::read(path).map_err(|source| OptionStoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if data.iter().all(u8::is_ascii_whitespace) {
        warn!("options file is empty path={}", path.display());
        return Ok(BTreeMap::new());
    }
    let snapshot =
        serde_json::from_slice::<OptionsSnapshot>(&data).map_err(|err| OptionStoreError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    if snapshot.schema_version != OPTIONS_SCHEMA_VERSION {
        return Err(OptionStoreError::UnsupportedSchema {
            path: path.to_path_buf(),
            version: snapshot.schema_version,
        });
    }
    Ok(snapshot.options)
}

fn write_options_to_disk(
    path: &Path,
    options: &BTreeMap<String, String>,
) -> Result<(), OptionStoreError> {
    let write_error = |message: String| OptionStoreError::Write {
        path: path.to_path_buf(),
        message,
    };
    let snapshot = OptionsSnapshot {
        schema_version: OPTIONS_SCHEMA_VERSION,
        options: options.clone(),
    };
    let bytes = serde_json::to_vec_pretty(&snapshot)
        .map_err(|err| write_error(format!("serialize: {err}")))?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| {
            write_error(format!("create directory {}: {err}", parent.display()))
        })?;
    }

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, bytes)
        .map_err(|err| write_error(format!("write {}: {err}", temp_path.display())))?;

    fs::rename(&temp_path, path).map_err(|err| {
        let _ = fs::remove_file(&temp_path);
        write_error(format!("rename {}: {err}", temp_path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::{SystemTime, UNIX_EPOCH},
    };

    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    fn unique_path(name: &str) -> PathBuf {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("wcs-options-{name}-{now}-{seq}.json"))
    }

    #[test]
    fn memory_store_get_set_delete() {
        let store = MemoryOptionStore::new();
        assert_eq!(store.get(SITEURL_OPTION).expect("get"), None);
        assert_eq!(store.get_or(SITEURL_OPTION, "").expect("get_or"), "");

        store.set(SITEURL_OPTION, "https://a.test").expect("set");
        assert_eq!(
            store.get(SITEURL_OPTION).expect("get").as_deref(),
            Some("https://a.test")
        );
        assert!(store.delete(SITEURL_OPTION).expect("delete"));
        assert!(!store.delete(SITEURL_OPTION).expect("delete"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = unique_path("reopen");
        {
            let store = JsonFileOptionStore::open(&path).expect("open");
            store.set(SITEURL_OPTION, "https://shop.example.com").expect("set");
            store.set(IGNORE_DUPLICATE_NOTICE_OPTION, "yes").expect("set");
            assert!(store.delete(IGNORE_DUPLICATE_NOTICE_OPTION).expect("delete"));
        }

        let reopened = JsonFileOptionStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.get(SITEURL_OPTION).expect("get").as_deref(),
            Some("https://shop.example.com")
        );
        assert_eq!(reopened.get(IGNORE_DUPLICATE_NOTICE_OPTION).expect("get"), None);

        let raw = fs::read_to_string(&path).expect("options file should exist");
        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(parsed["schema_version"], 1);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn flush_cache_picks_up_external_writes() {
        let path = unique_path("flush");
        let store = JsonFileOptionStore::open(&path).expect("open");
        store.set(SITEURL_OPTION, "https://one.test").expect("set");

        fs::write(
            &path,
            r#"{"schema_version":1,"options":{"wc_subscriptions_siteurl":"https://two.test"}}"#,
        )
        .expect("external write");
        assert_eq!(
            store.get(SITEURL_OPTION).expect("get").as_deref(),
            Some("https://one.test")
        );
        store.flush_cache().expect("flush");
        assert_eq!(
            store.get(SITEURL_OPTION).expect("get").as_deref(),
            Some("https://two.test")
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn writes_keep_keys_added_by_other_processes() {
        let path = unique_path("external-keys");
        let store = JsonFileOptionStore::open(&path).expect("open");
        store.set(SITEURL_OPTION, "https://one.test").expect("set");

        fs::write(
            &path,
            r#"{"schema_version":1,"options":{"wc_subscriptions_siteurl":"https://one.test","woocommerce_version":"9.1.0"}}"#,
        )
        .expect("external write");
        store
            .apply(&[
                OptionChange::Set {
                    key: SITEURL_OPTION,
                    value: "https://two.test",
                },
                OptionChange::Delete {
                    key: IGNORE_DUPLICATE_NOTICE_OPTION,
                },
            ])
            .expect("apply");

        let reopened = JsonFileOptionStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.get("woocommerce_version").expect("get").as_deref(),
            Some("9.1.0")
        );
        assert_eq!(
            reopened.get(SITEURL_OPTION).expect("get").as_deref(),
            Some("https://two.test")
        );
        assert_eq!(
            store.get("woocommerce_version").expect("get").as_deref(),
            Some("9.1.0")
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_rejects_garbage_and_unknown_schema() {
        let garbage = unique_path("garbage");
        fs::write(&garbage, b"{not json").expect("write");
        let err = JsonFileOptionStore::open(&garbage)
            .err()
            .expect("garbage should not open");
        assert!(matches!(err, OptionStoreError::Parse { .. }));
        let _ = fs::remove_file(&garbage);

        let future = unique_path("future");
        fs::write(&future, br#"{"schema_version":7,"options":{}}"#).expect("write");
        let err = JsonFileOptionStore::open(&future)
            .err()
            .expect("unknown schema should not open");
        assert!(matches!(
            err,
            OptionStoreError::UnsupportedSchema { version: 7, .. }
        ));
        let _ = fs::remove_file(&future);
    }

    #[test]
    fn failed_write_leaves_cache_untouched() {
        let dir = unique_path("blocked-dir");
        fs::create_dir_all(&dir).expect("mkdir");
        // a directory squatting on the temp file name makes the write fail
        let path = dir.join("options.json");
        fs::create_dir_all(dir.join("options.json.tmp")).expect("mkdir tmp");

        let store = JsonFileOptionStore::open(&path).expect("open");
        let err = store
            .set(SITEURL_OPTION, "https://never.test")
            .expect_err("write should fail");
        assert!(matches!(err, OptionStoreError::Write { .. }));
        assert_eq!(store.get(SITEURL_OPTION).expect("get"), None);
        let _ = fs::remove_dir_all(&dir);
    }
}

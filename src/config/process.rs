//! Snapshots of process-wide state: environment variables, process
//! properties and the working directory.
//!
//! Builds never read ambient process state mid-algorithm. They take a
//! [`ProcessSnapshot`], either injected by the caller or obtained from
//! [`cached_snapshot`]. The cached snapshot is captured once and reused until
//! [`invalidate_caches`] is called, so changes to the environment or to the
//! property registry made after the first capture are not observed until then.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use super::ConfigError;

static PROPERTIES: RwLock<BTreeMap<String, String>> = RwLock::new(BTreeMap::new());
static SNAPSHOT: RwLock<Option<Arc<ProcessSnapshot>>> = RwLock::new(None);

/// Sets a process property, returning the previous value.
pub fn set_property(key: impl Into<String>, value: impl Into<String>) -> Option<String> {
    PROPERTIES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key.into(), value.into())
}

/// Removes a process property, returning the previous value.
pub fn clear_property(key: &str) -> Option<String> {
    PROPERTIES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(key)
}

/// Returns a copy of all process properties.
pub fn properties() -> BTreeMap<String, String> {
    PROPERTIES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Extracts `-Dkey=value` flags from command-line arguments.
///
/// Arguments that are not property flags are ignored. A flag without `=`
/// sets the property to an empty string.
pub fn parse_property_flags<I, S>(args: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .filter_map(|arg| {
            let flag = arg.as_ref().strip_prefix("-D")?;
            let (key, value) = flag.split_once('=').unwrap_or((flag, ""));
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Returns the cached process snapshot, capturing it on first use.
pub fn cached_snapshot() -> Result<Arc<ProcessSnapshot>, ConfigError> {
    if let Some(snapshot) = SNAPSHOT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return Ok(Arc::clone(snapshot));
    }

    let mut slot = SNAPSHOT.write().unwrap_or_else(PoisonError::into_inner);
    // Another thread may have captured while we waited for the lock.
    if let Some(snapshot) = slot.as_ref() {
        return Ok(Arc::clone(snapshot));
    }

    let snapshot = Arc::new(ProcessSnapshot::capture()?);
    *slot = Some(Arc::clone(&snapshot));
    Ok(snapshot)
}

/// Drops the cached process snapshot so the next build observes current
/// environment variables and process properties.
pub fn invalidate_caches() {
    log::debug!("invalidating cached process snapshot");
    *SNAPSHOT.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Environment variables, process properties and working directory as seen
/// at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    env: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
    cwd: PathBuf,
}

impl ProcessSnapshot {
    /// Creates an empty snapshot rooted at `cwd`.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            env: BTreeMap::new(),
            properties: BTreeMap::new(),
            cwd: cwd.as_ref().to_path_buf(),
        }
    }

    /// Captures the current process state. Environment entries that are not
    /// valid UTF-8 are skipped.
    pub fn capture() -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::WorkingDirectory)?;
        let env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();

        Ok(Self {
            env,
            properties: properties(),
            cwd,
        })
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds every `-Dkey=value` flag found in `args` as a property.
    pub fn with_property_flags<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.properties.extend(parse_property_flags(args));
        self
    }

    pub fn with_cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = cwd.as_ref().to_path_buf();
        self
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_parse_property_flags() {
        let flags = parse_property_flags([
            "serve",
            "-Dlogging.level=TRACE",
            "-DENV=test",
            "-Dempty",
            "-D=nokey",
            "--port=1",
        ]);

        assert_eq!(
            flags,
            vec![
                ("logging.level".to_string(), "TRACE".to_string()),
                ("ENV".to_string(), "test".to_string()),
                ("empty".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_snapshot_builders() {
        let snapshot = ProcessSnapshot::new("/srv/app")
            .with_env("ENV", "test")
            .with_property("port", "1")
            .with_property_flags(["-Dport=2"]);

        assert_eq!(snapshot.env_var("ENV"), Some("test"));
        assert_eq!(snapshot.property("port"), Some("2"));
        assert_eq!(snapshot.cwd(), Path::new("/srv/app"));
    }

    #[test]
    #[serial]
    fn test_cached_snapshot_is_stale_until_invalidated() {
        let key = "confstack.test.cache";
        clear_property(key);
        invalidate_caches();

        let before = cached_snapshot().unwrap();
        assert_eq!(before.property(key), None);

        set_property(key, "1");
        let stale = cached_snapshot().unwrap();
        assert_eq!(stale.property(key), None);

        invalidate_caches();
        let fresh = cached_snapshot().unwrap();
        assert_eq!(fresh.property(key), Some("1"));

        clear_property(key);
        invalidate_caches();
    }

    #[test]
    #[serial]
    fn test_property_registry() {
        let key = "confstack.test.registry";
        assert_eq!(set_property(key, "a"), None);
        assert_eq!(set_property(key, "b"), Some("a".to_string()));
        assert_eq!(properties().get(key).map(String::as_str), Some("b"));
        assert_eq!(clear_property(key), Some("b".to_string()));
        assert!(!properties().contains_key(key));
    }
}

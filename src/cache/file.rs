//! File-based activation store with atomic writes.
//!
//! Stores one `activation.json` per product under a machine-wide directory:
//! - Linux and other Unix: `/var/lib/activation-keys/<product>/`
//! - macOS: `/Library/Application Support/activation-keys/<product>/`
//! - Windows: `%ProgramData%\activation-keys\<product>\`
//!
//! `ACTIVATION_KEYS_DIR` overrides the location. Uses temp file + rename for
//! atomic writes.

use crate::cache::format::ActivationRecord;
use crate::cache::ActivationStore;
use crate::{LicensingError, Result};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory under the machine data dir that holds all products.
const ROOT_DIR_NAME: &str = "activation-keys";

/// File holding a product's slot.
const RECORD_FILE: &str = "activation.json";

/// Environment variable that replaces the machine-wide root.
pub const ROOT_ENV_VAR: &str = "ACTIVATION_KEYS_DIR";

/// Machine-wide application data directory.
#[cfg(windows)]
fn machine_data_dir() -> Option<PathBuf> {
    env::var_os("ProgramData").map(PathBuf::from)
}

#[cfg(target_os = "macos")]
fn machine_data_dir() -> Option<PathBuf> {
    Some(PathBuf::from("/Library/Application Support"))
}

#[cfg(all(unix, not(target_os = "macos")))]
fn machine_data_dir() -> Option<PathBuf> {
    Some(PathBuf::from("/var/lib"))
}

#[cfg(not(any(windows, unix)))]
fn machine_data_dir() -> Option<PathBuf> {
    None
}

/// Root used by [`FileActivationStore::new`].
///
/// Shared by every user account on the machine, so one machine takes one
/// device slot per product.
pub fn default_root() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(ROOT_ENV_VAR).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    machine_data_dir()
        .map(|base| base.join(ROOT_DIR_NAME))
        .ok_or_else(|| {
            LicensingError::CacheIO("Could not find a machine-wide data directory".to_string())
        })
}

/// File-based activation store.
#[derive(Debug, Clone)]
pub struct FileActivationStore {
    /// Directory holding one subdirectory per product.
    root: PathBuf,
}

impl FileActivationStore {
    /// Create a store under the machine-wide [`default_root`].
    ///
    /// # Errors
    /// - `CacheIO` - the platform has no machine-wide data directory
    /// - `CacheAccess` - the root cannot be created (e.g. not running with
    ///   write access to the system data directory)
    pub fn new() -> Result<Self> {
        Self::with_root(default_root()?)
    }

    /// Create a store rooted at a specific directory.
    pub fn with_root(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).map_err(|source| LicensingError::CacheAccess {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Directory holding all product slots.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make sure the slot of `namespace` can be created, read and written.
    ///
    /// # Errors
    /// - `ConfigError` - the namespace is not a usable directory name
    /// - `CacheAccess` - the slot cannot be opened (e.g. permissions)
    pub fn open_namespace(&self, namespace: &str) -> Result<()> {
        let dir = self.namespace_dir(namespace)?;
        let access = |source: io::Error| LicensingError::CacheAccess {
            path: dir.clone(),
            source,
        };

        fs::create_dir_all(&dir).map_err(access)?;

        let probe = dir.join(".access");
        fs::write(&probe, b"").map_err(access)?;
        fs::remove_file(&probe).map_err(access)?;

        let record = dir.join(RECORD_FILE);
        if record.exists() {
            fs::read_to_string(&record).map_err(access)?;
        }

        debug!(namespace, path = %dir.display(), "Opened activation slot");
        Ok(())
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        if namespace.is_empty()
            || namespace == "."
            || namespace == ".."
            || namespace.contains(&['/', '\\', '\0'][..])
        {
            return Err(LicensingError::ConfigError(format!(
                "invalid product name {:?}",
                namespace
            )));
        }
        Ok(self.root.join(namespace))
    }

    fn record_path(&self, namespace: &str) -> Result<PathBuf> {
        Ok(self.namespace_dir(namespace)?.join(RECORD_FILE))
    }

    /// Remove the namespace directory if nothing is left in it.
    fn remove_if_empty(&self, namespace: &str) -> Result<()> {
        let dir = self.namespace_dir(namespace)?;
        if !dir.exists() {
            return Ok(());
        }

        let mut entries = fs::read_dir(&dir)
            .map_err(|e| LicensingError::CacheIO(format!("Failed to read slot dir: {}", e)))?;
        if entries.next().is_none() {
            fs::remove_dir(&dir)
                .map_err(|e| LicensingError::CacheIO(format!("Failed to remove slot dir: {}", e)))?;
        }
        Ok(())
    }
}

impl ActivationStore for FileActivationStore {
    fn open(&self, namespace: &str) -> Result<()> {
        self.open_namespace(namespace)
    }

    fn load(&self, namespace: &str) -> Result<Option<ActivationRecord>> {
        let path = self.record_path(namespace)?;

        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .map_err(|e| LicensingError::CacheIO(format!("Failed to read activation: {}", e)))?;

        let record = ActivationRecord::from_json(&json)?;
        Ok(Some(record))
    }

    fn save(&self, namespace: &str, record: &ActivationRecord) -> Result<()> {
        let target_path = self.record_path(namespace)?;
        let dir = self.namespace_dir(namespace)?;
        let temp_path = dir.join(format!("{}.tmp", RECORD_FILE));

        fs::create_dir_all(&dir)
            .map_err(|e| LicensingError::CacheIO(format!("Failed to create slot dir: {}", e)))?;

        let json = record.to_json()?;

        // Write to temp file
        fs::write(&temp_path, &json)
            .map_err(|e| LicensingError::CacheIO(format!("Failed to write temp file: {}", e)))?;

        // Atomic rename
        fs::rename(&temp_path, &target_path)
            .map_err(|e| LicensingError::CacheIO(format!("Failed to rename activation: {}", e)))?;

        Ok(())
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        let path = self.record_path(namespace)?;

        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| LicensingError::CacheIO(format!("Failed to clear activation: {}", e)))?;
        }

        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        // Validate both names before touching anything.
        self.namespace_dir(to)?;
        if from == to {
            return Ok(());
        }

        match self.load(from)? {
            Some(record) if !record.is_empty() => self.save(to, &record)?,
            _ => fs::create_dir_all(self.namespace_dir(to)?)
                .map_err(|e| LicensingError::CacheIO(format!("Failed to create slot dir: {}", e)))?,
        }

        self.clear(from)?;
        self.remove_if_empty(from)?;
        debug!(from, to, "Moved activation slot");
        Ok(())
    }
}

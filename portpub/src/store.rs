//! File-backed snapshot of published containers.
//!
//! The engine itself is in-memory; the CLI keeps its bindings in a JSON file
//! so that successive invocations share one view of occupied host ports.
//! The pool is never persisted: it is rebuilt from the stored bindings.

// Standard library
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// External crates
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use portpub_config::EngineConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

// Internal imports
use crate::mapping::Binding;
use crate::resolver::PortMapper;
use crate::spec::Exposure;

/// What the store knows about one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exposed: Vec<Exposure>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

impl ContainerRecord {
    pub fn new(exposed: Vec<Exposure>, bindings: Vec<Binding>) -> Self {
        Self {
            created_at: Utc::now(),
            exposed,
            bindings,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerRecord>,
}

impl StateSnapshot {
    /// Rebuilds a mapper holding every stored binding.
    pub fn mapper(&self, config: &EngineConfig) -> Result<PortMapper> {
        let bindings = self
            .containers
            .values()
            .flat_map(|record| record.bindings.iter().cloned());
        PortMapper::from_bindings(config, bindings).context("Stored bindings are inconsistent")
    }
}

/// JSON state file guarded by an exclusive lock on a sidecar `.lock` file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current snapshot; a missing or empty file is an empty snapshot.
    pub fn load(&self) -> Result<StateSnapshot> {
        read_snapshot(&self.path)
    }

    /// Read-modify-write under the exclusive lock.
    ///
    /// The snapshot is written back only if `update_fn` succeeds.
    pub fn update<T, F>(&self, update_fn: F) -> Result<T>
    where
        F: FnOnce(&mut StateSnapshot) -> Result<T>,
    {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create state directory: {:?}", parent))?;
            }
        }

        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", lock_path))?;

        acquire_exclusive(&lock_file)?;
        let _guard = scopeguard::guard((), |_| {
            let _ = FileExt::unlock(&lock_file);
        });

        let mut snapshot = read_snapshot(&self.path)?;
        let result = update_fn(&mut snapshot)?;

        let json_content = serde_json::to_string_pretty(&snapshot)
            .with_context(|| "Failed to serialize state to JSON")?;

        let thread_id = std::thread::current().id();
        let temp_path = self
            .path
            .with_extension(format!("json.tmp.{}.{:?}", std::process::id(), thread_id));
        fs::write(&temp_path, &json_content)
            .with_context(|| format!("Failed to write temporary file: {:?}", temp_path))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| "Failed to atomically rename temporary file")?;

        debug!(path = %self.path.display(), containers = snapshot.containers.len(), "state saved");
        Ok(result)
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "bindings.json".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

fn read_snapshot(path: &Path) -> Result<StateSnapshot> {
    if !path.exists() {
        return Ok(StateSnapshot::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {:?}", path))?;
    if content.trim().is_empty() {
        return Ok(StateSnapshot::default());
    }
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {:?}", path))
}

fn acquire_exclusive(file: &fs::File) -> Result<()> {
    const MAX_RETRIES: u32 = 500;
    const RETRY_DELAY: Duration = Duration::from_millis(10);
    const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

    let lock_start = Instant::now();
    let mut attempts = 0;

    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempts += 1;
                if lock_start.elapsed() > LOCK_TIMEOUT {
                    anyhow::bail!(
                        "Timeout waiting for exclusive lock on state file after {} attempts: {}",
                        attempts,
                        e
                    );
                }
                if attempts >= MAX_RETRIES {
                    anyhow::bail!(
                        "Maximum retry attempts ({}) exceeded for lock acquisition: {}",
                        MAX_RETRIES,
                        e
                    );
                }
                std::thread::sleep(RETRY_DELAY);
            }
        }
    }
}

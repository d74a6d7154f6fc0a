use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Persistence collaborator for the tamper counter. Missing or unreadable
/// values read as zero; write failures surface as details the engine logs
/// and tolerates.
pub trait CounterStore {
    fn get_counter(&self, key: &str) -> u64;
    fn set_counter(&self, key: &str, value: u64) -> Result<(), String>;
}

/// One value per key file under a state directory.
pub struct FileCounterStore {
    dir: PathBuf,
}

impl FileCounterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_env() -> Self {
        let dir = std::env::var("TAMPER_GUARD_STATE_DIR")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/var/lib/tamper-guard"));
        Self { dir }
    }
}

impl CounterStore for FileCounterStore {
    fn get_counter(&self, key: &str) -> u64 {
        std::fs::read_to_string(self.dir.join(key))
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }

    fn set_counter(&self, key: &str, value: u64) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|err| format!("create state dir {}: {}", self.dir.display(), err))?;
        let path = self.dir.join(key);
        std::fs::write(&path, value.to_string())
            .map_err(|err| format!("write {}: {}", path.display(), err))
    }
}

/// In-memory store for tests and hosts without a writable state directory.
#[derive(Default)]
pub struct MemoryCounterStore {
    values: Mutex<HashMap<String, u64>>,
}

impl CounterStore for MemoryCounterStore {
    fn get_counter(&self, key: &str) -> u64 {
        self.values
            .lock()
            .map(|values| values.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn set_counter(&self, key: &str, value: u64) -> Result<(), String> {
        match self.values.lock() {
            Ok(mut values) => {
                values.insert(key.to_string(), value);
                Ok(())
            }
            Err(_) => Err("counter store lock poisoned".to_string()),
        }
    }
}

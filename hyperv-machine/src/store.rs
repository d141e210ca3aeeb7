//! Persistence of the machine descriptor.

use anyhow::{Context, Result};
use hyperv_driver::VmDescriptor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the persisted descriptor inside the machine directory.
const CONFIG_FILE: &str = "config.json";

/// Machine directory holding `config.json` and the VM disk.
pub struct MachineStore {
    dir: PathBuf,
}

impl MachineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Load the descriptor of an existing machine.
    pub fn load(&self) -> Result<VmDescriptor> {
        let path = self.config_path();
        let content = std::fs::read(&path)
            .with_context(|| format!("Machine config not found: {}", path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse machine config: {}", path.display()))
    }

    /// Write the descriptor, creating the machine directory if needed.
    pub fn save(&self, descriptor: &VmDescriptor) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.config_path();
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(descriptor)?;

        // Replace the old config only once the new one is fully written
        std::fs::write(&temp_path, content)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to install machine config: {}", path.display()))?;

        debug!(path = %path.display(), "Machine config saved");
        Ok(())
    }

    /// Delete the persisted descriptor.
    pub fn delete(&self) -> Result<()> {
        let path = self.config_path();
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = MachineStore::new(dir.path().join("crc"));

        let descriptor = VmDescriptor::new("crc", store.dir())
            .with_virtual_switch("ExternalSwitch")
            .with_memory(4096);
        store.save(&descriptor).unwrap();

        assert_eq!(store.load().unwrap(), descriptor);

        store.delete().unwrap();
        assert!(store.load().is_err());
        // Deleting twice is fine
        store.delete().unwrap();
    }

    #[test]
    fn test_save_replaces_previous_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = MachineStore::new(dir.path());

        let first = VmDescriptor::new("crc", dir.path()).with_memory(4096);
        let second = first.clone().with_memory(16384).with_cpu(8);
        store.save(&first).unwrap();
        store.save(&second).unwrap();

        assert_eq!(store.load().unwrap(), second);
        // No temporary file is left next to the config
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(CONFIG_FILE)]);
    }

    #[test]
    fn test_load_corrupt_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{").unwrap();

        let store = MachineStore::new(dir.path());
        assert!(store.load().is_err());
    }
}

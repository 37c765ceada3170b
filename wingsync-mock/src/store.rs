use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use wingsync_embedded::LocalStorage;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to replace stored item: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Flash stand-in: one file per key in a directory, plus a backup copy read
/// when the primary is missing or unreadable. Writes go through a temporary
/// file so a crash never leaves a half written item.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn paths(&self, key: &str) -> Result<(PathBuf, PathBuf), StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok((self.root.join(key), self.root.join(format!("{key}.bak"))))
    }

    fn write(&self, path: &Path, value: &str) -> Result<(), StoreError> {
        let mut file = NamedTempFile::new_in(&self.root)?;
        file.write_all(value.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path)?;
        Ok(())
    }
}

fn read(path: &Path) -> Result<Option<String>, io::Error> {
    match fs::read_to_string(path) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn remove(path: &Path) -> Result<(), io::Error> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl LocalStorage for FileStorage {
    type Error = StoreError;

    fn get_item(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let (primary, backup) = self.paths(key)?;
        match read(&primary) {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {}
            Err(e) => tracing::warn!("Primary copy of {} unreadable, trying backup: {}", key, e),
        }
        let value = read(&backup)?;
        if value.is_some() {
            tracing::warn!("Loaded {} from backup", key);
        }
        Ok(value)
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        let (primary, backup) = self.paths(key)?;
        self.write(&primary, value)?;
        self.write(&backup, value)?;
        tracing::trace!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), Self::Error> {
        let (primary, backup) = self.paths(key)?;
        remove(&primary)?;
        remove(&backup)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wingsync_embedded::{ResumeStore, SettingsStore};

    use super::*;

    #[test]
    fn test_items_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage.save_settings(r#"{"steps":[100,0,0]}"#).unwrap();
        storage.save_resume(&[10, 0, 0]).unwrap();

        let reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(
            reopened.load_settings().unwrap().as_deref(),
            Some(r#"{"steps":[100,0,0]}"#)
        );
        assert_eq!(reopened.load_resume().unwrap(), Some([10, 0, 0]));
    }

    #[test]
    fn test_remove_missing_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();

        assert!(storage.remove_item("resume").is_ok());
        assert_eq!(storage.get_item("resume").unwrap(), None);

        storage.set_item("resume", "1;2;3").unwrap();
        storage.remove_item("resume").unwrap();
        assert_eq!(storage.get_item("resume").unwrap(), None);
    }

    #[test]
    fn test_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage.set_item("settings", r#"{"lock":true}"#).unwrap();

        fs::remove_file(dir.path().join("settings")).unwrap();
        assert_eq!(
            storage.get_item("settings").unwrap().as_deref(),
            Some(r#"{"lock":true}"#)
        );

        fs::create_dir(dir.path().join("settings")).unwrap();
        assert_eq!(
            storage.get_item("settings").unwrap().as_deref(),
            Some(r#"{"lock":true}"#)
        );
    }

    #[test]
    fn test_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();

        assert!(matches!(
            storage.set_item("../escape", "x"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}

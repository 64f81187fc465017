/*
 * Per-user application settings. Currently only the path of the last opened
 * model document is remembered, so the editor can reopen it on start.
 *
 * `ConfigManagerOperations` hides where the setting lives; `CoreConfigManager`
 * keeps it in a text file under the platform's local configuration directory.
 */
use crate::core::path_utils;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const LAST_DOCUMENT_PATH_FILENAME: &str = "last_document_path.txt";

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    NoProjectDirectory,
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {e}"),
            ConfigError::NoProjectDirectory => {
                write!(f, "Could not determine the configuration directory")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub trait ConfigManagerOperations: Send + Sync {
    fn load_last_document_path(&self, app_name: &str) -> Result<Option<PathBuf>>;
    fn save_last_document_path(&self, app_name: &str, document_path: Option<&Path>) -> Result<()>;
}

pub struct CoreConfigManager {}

impl CoreConfigManager {
    pub fn new() -> Self {
        CoreConfigManager {}
    }
}

impl Default for CoreConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn read_pointer_file(file_path: &Path) -> Result<Option<PathBuf>> {
    if !file_path.exists() {
        log::debug!("CoreConfigManager: Pointer file {file_path:?} does not exist.");
        return Ok(None);
    }
    let contents = fs::read_to_string(file_path)?;
    let path_text = contents.trim();
    if path_text.is_empty() {
        log::debug!("CoreConfigManager: Pointer file {file_path:?} is empty.");
        Ok(None)
    } else {
        log::debug!("CoreConfigManager: Loaded '{path_text}' from {file_path:?}.");
        Ok(Some(PathBuf::from(path_text)))
    }
}

/// Writes `document_path` (or nothing, to clear it) into the pointer file.
fn write_pointer_file(file_path: &Path, document_path: Option<&Path>) -> Result<()> {
    let mut file = File::create(file_path)?;
    if let Some(path) = document_path {
        file.write_all(path.to_string_lossy().as_bytes())?;
    }
    Ok(())
}

impl ConfigManagerOperations for CoreConfigManager {
    fn load_last_document_path(&self, app_name: &str) -> Result<Option<PathBuf>> {
        log::trace!("CoreConfigManager: Loading last document path for app '{app_name}'");
        let config_dir = path_utils::get_base_app_config_local_dir(app_name)
            .ok_or(ConfigError::NoProjectDirectory)?;
        read_pointer_file(&config_dir.join(LAST_DOCUMENT_PATH_FILENAME))
    }

    fn save_last_document_path(&self, app_name: &str, document_path: Option<&Path>) -> Result<()> {
        log::trace!(
            "CoreConfigManager: Saving last document path {document_path:?} for app '{app_name}'"
        );
        let config_dir = path_utils::get_base_app_config_local_dir(app_name)
            .ok_or(ConfigError::NoProjectDirectory)?;
        write_pointer_file(&config_dir.join(LAST_DOCUMENT_PATH_FILENAME), document_path)?;
        log::debug!("CoreConfigManager: Saved last document path {document_path:?}.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // Same pointer-file logic as `CoreConfigManager`, rooted in a temp dir.
    struct TestConfigManager {
        mock_config_dir: PathBuf,
    }

    impl ConfigManagerOperations for TestConfigManager {
        fn load_last_document_path(&self, _app_name: &str) -> Result<Option<PathBuf>> {
            read_pointer_file(&self.mock_config_dir.join(LAST_DOCUMENT_PATH_FILENAME))
        }

        fn save_last_document_path(
            &self,
            _app_name: &str,
            document_path: Option<&Path>,
        ) -> Result<()> {
            write_pointer_file(
                &self.mock_config_dir.join(LAST_DOCUMENT_PATH_FILENAME),
                document_path,
            )
        }
    }

    #[test]
    fn test_core_config_manager_save_and_load_document_path() {
        // Arrange
        let unique_app_name = format!("TestApp_CoreConfig_{}", rand::random::<u64>());
        let manager = CoreConfigManager::new();
        let document_path = PathBuf::from("/tmp/models/model.json");

        // Act
        manager
            .save_last_document_path(&unique_app_name, Some(document_path.as_path()))
            .expect("Saving last document path should succeed.");
        let loaded = manager.load_last_document_path(&unique_app_name);

        // Assert
        match loaded {
            Ok(Some(path)) => assert_eq!(path, document_path),
            Ok(None) => panic!("Expected a document path, got None."),
            Err(e) => panic!("Failed to load document path: {e:?}"),
        }

        if let Some(dir) = path_utils::get_base_app_config_local_dir(&unique_app_name) {
            if let Err(e) = fs::remove_dir_all(&dir) {
                eprintln!("Test cleanup failed for {dir:?}: {e}");
            }
        }
    }

    #[test]
    fn test_load_when_nothing_saved() {
        let dir = tempdir().unwrap();
        let manager = TestConfigManager {
            mock_config_dir: dir.path().to_path_buf(),
        };
        assert!(manager.load_last_document_path("AnyApp").unwrap().is_none());
    }

    #[test]
    fn test_saving_none_clears_path() {
        let dir = tempdir().unwrap();
        let manager = TestConfigManager {
            mock_config_dir: dir.path().to_path_buf(),
        };
        manager
            .save_last_document_path("AnyApp", Some(Path::new("/tmp/a.json")))
            .unwrap();
        manager.save_last_document_path("AnyApp", None).unwrap();
        assert!(manager.load_last_document_path("AnyApp").unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_previous_path() {
        let dir = tempdir().unwrap();
        let manager = TestConfigManager {
            mock_config_dir: dir.path().to_path_buf(),
        };
        manager
            .save_last_document_path("AnyApp", Some(Path::new("/tmp/one.json")))
            .unwrap();
        manager
            .save_last_document_path("AnyApp", Some(Path::new("/tmp/two.json")))
            .unwrap();
        assert_eq!(
            manager.load_last_document_path("AnyApp").unwrap(),
            Some(PathBuf::from("/tmp/two.json"))
        );
    }
}

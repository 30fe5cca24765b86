use std::path::{Path, PathBuf};

use crate::watcher::{load_settings, WorkspaceEventReceiver};
use crate::{ProfileError, Settings, WatcherError, WorkspaceWatcher};

const DEFAULT_WORKSPACE_PATH: &str = ".config/padmux";
const SETTINGS_FILE_NAME: &str = "padmux.yaml";

/// Directory holding the settings file.
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn new(path: Option<&Path>) -> Result<Self, ProfileError> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            std::fs::create_dir_all(&path)?;
        } else if !path.is_dir() {
            return Err(ProfileError::PathIsNotDirectory(
                path.display().to_string(),
            ));
        }

        Ok(Self { path })
    }

    pub fn start_settings_watcher(
        &self,
    ) -> Result<(WorkspaceWatcher, WorkspaceEventReceiver), ProfileError> {
        WorkspaceWatcher::new_with_starting_event(&self.settings_path())
            .map_err(|e| ProfileError::Watcher(Box::new(e)))
    }

    /// Read the settings file once.
    pub fn load(&self) -> Result<Settings, ProfileError> {
        load_settings(&self.settings_path()).map_err(|e| match e {
            WatcherError::Parse(e) => e,
            WatcherError::Io(e) => ProfileError::PathError(e),
            other => ProfileError::Watcher(Box::new(other)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings_path(&self) -> PathBuf {
        self.path.join(SETTINGS_FILE_NAME)
    }

    pub fn default_path() -> Result<PathBuf, ProfileError> {
        std::env::var("HOME")
            .map(PathBuf::from)
            .map(|p| p.join(DEFAULT_WORKSPACE_PATH))
            .map_err(|_| ProfileError::EnvVarNotSet("HOME".to_string()))
    }
}

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use std::fs;

use notify::{Config, Error as NotifyError, RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{
    new_debouncer_opt, DebounceEventResult, DebouncedEventKind, Debouncer,
};
use thiserror::Error;

use crate::{parse_settings, ProfileError, Settings};

const DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] ProfileError),
}

pub enum WorkspaceEvent {
    Changed(Settings),
    Removed,
    Error(WatcherError),
}

type WorkspaceEventSender = mpsc::Sender<WorkspaceEvent>;
pub type WorkspaceEventReceiver = mpsc::Receiver<WorkspaceEvent>;

/// Watches one settings file and emits a parsed snapshot on every change.
pub struct WorkspaceWatcher {
    #[allow(dead_code)]
    watcher: Debouncer<RecommendedWatcher>,
}

/// Read and parse the settings file.
pub(crate) fn load_settings(path: &Path) -> Result<Settings, WatcherError> {
    let content = fs::read_to_string(path)?;
    Ok(parse_settings(&content)?)
}

fn send_settings_event(path: &Path, tx: &WorkspaceEventSender) {
    let event = match load_settings(path) {
        Ok(settings) => WorkspaceEvent::Changed(settings),
        Err(e) => WorkspaceEvent::Error(e),
    };
    let _ = tx.send(event);
}

impl WorkspaceWatcher {
    /// Watch `path`. The parent directory is watched so editors that save by
    /// renaming a temporary file are still picked up.
    pub fn new_with_sender(
        path: &Path,
        tx: WorkspaceEventSender,
    ) -> Result<Self, WatcherError> {
        let file: PathBuf = path.to_owned();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = path.file_name().map(ToOwned::to_owned);

        let debouncer_config = notify_debouncer_mini::Config::default()
            .with_timeout(DEBOUNCE_TIMEOUT)
            .with_notify_config(Config::default());
        let mut debouncer = new_debouncer_opt::<_, RecommendedWatcher>(
            debouncer_config,
            move |events: DebounceEventResult| match events {
                Ok(events) => {
                    let touched = events.iter().any(|event| {
                        matches!(
                            event.kind,
                            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                        ) && event.path.file_name() == file_name.as_deref()
                    });
                    if !touched {
                        return;
                    }
                    if file.exists() {
                        send_settings_event(&file, &tx);
                    } else {
                        let _ = tx.send(WorkspaceEvent::Removed);
                    }
                }
                Err(error) => {
                    let _ = tx.send(WorkspaceEvent::Error(WatcherError::Notify(error)));
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(Self { watcher: debouncer })
    }

    pub fn new(path: &Path) -> Result<(Self, WorkspaceEventReceiver), WatcherError> {
        let (tx, rx) = mpsc::channel();

        Ok((Self::new_with_sender(path, tx)?, rx))
    }

    /// Like [`WorkspaceWatcher::new`], with the current file contents queued
    /// as the first event.
    pub fn new_with_starting_event(
        path: &Path,
    ) -> Result<(Self, WorkspaceEventReceiver), WatcherError> {
        let (tx, rx) = mpsc::channel();

        if path.exists() {
            send_settings_event(path, &tx);
        } else {
            let _ = tx.send(WorkspaceEvent::Removed);
        }
        Ok((Self::new_with_sender(path, tx)?, rx))
    }
}

mod descriptor;
mod parse;
mod settings;
mod v1;
mod watcher;
mod workspace;

use thiserror::Error;

pub use descriptor::{Descriptor, DescriptorError, DescriptorSet, PovDirection};
pub use parse::parse_settings;
pub use settings::{
    ButtonChord, ControllerKind, FeedbackTuning, MacroAction, MacroDefinition,
    MacroTrigger, MappingProfile, RepeatPolicy, Settings, Shaping, SlotAssignment,
    SlotSettings, TriggerMode, MAX_SLOTS,
};
pub use watcher::{WatcherError, WorkspaceEvent, WorkspaceEventReceiver, WorkspaceWatcher};
pub use v1::Error as SettingsError;
pub use workspace::Workspace;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("yaml deserialize error: {0}")]
    YamlDeserializeError(#[from] serde_yaml::Error),
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),
    #[error("v1 settings error: {0}")]
    V1ProfileError(#[from] v1::Error),

    #[error("environment variable not set: {0}")]
    EnvVarNotSet(String),
    #[error("path is not a directory: {0}")]
    PathIsNotDirectory(String),
    #[error("path error: {0}")]
    PathError(#[from] std::io::Error),
    #[error("watcher error: {0}")]
    Watcher(#[from] Box<WatcherError>),
}

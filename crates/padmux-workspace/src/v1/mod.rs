pub(crate) mod combo;
mod parse;
mod profile;

use thiserror::Error;

use crate::descriptor::DescriptorError;

pub(crate) use profile::SettingsV1;

#[derive(Error, Debug)]
pub enum Error {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
    #[error("invalid action in macro {0}: {1}")]
    InvalidAction(String, String),
    #[error("invalid button: {0}")]
    InvalidButton(String),
    #[error("invalid axis: {0}")]
    InvalidAxis(String),
    #[error("invalid controller kind: {0}")]
    InvalidKind(String),
    #[error("invalid trigger mode: {0}")]
    InvalidMode(String),
    #[error("invalid repeat: {0}")]
    InvalidRepeat(String),
    #[error("slot {0} out of range")]
    InvalidSlot(usize),
    #[error("slot {0} declared twice")]
    DuplicateSlot(usize),
    #[error("unknown profile: {0}")]
    UnknownProfile(String),
    #[error("key parse error: {0}")]
    KeyParse(String),
    #[error("{control}: {source}")]
    Descriptor {
        control: String,
        #[source]
        source: DescriptorError,
    },
}

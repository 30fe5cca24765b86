use serde::Deserialize;

use crate::{v1::SettingsV1, ProfileError, Settings};

/// Parse a yaml settings document.
pub fn parse_settings(input: &str) -> Result<Settings, ProfileError> {
    let version = parse_version(input)?;
    match version {
        1 => {
            let raw: SettingsV1 = serde_yaml::from_str(input)?;
            Ok(raw.to_settings()?)
        }
        _ => Err(ProfileError::UnsupportedVersion(version)),
    }
}

/// Settings document with only its version read.
#[derive(Debug, Clone, Deserialize)]
struct VersionedSettings {
    version: u8,
}

fn parse_version(input: &str) -> Result<u8, ProfileError> {
    let raw: VersionedSettings = serde_yaml::from_str(input)?;
    Ok(raw.version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_error_when_version_missing() {
        let yaml = "slots: []\n";
        assert!(matches!(
            parse_settings(yaml),
            Err(ProfileError::YamlDeserializeError(_))
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        assert!(matches!(
            parse_settings("version: 2\n"),
            Err(ProfileError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn example_settings_parse() {
        let settings =
            parse_settings(include_str!("../../../padmux.example.yaml")).unwrap();
        assert_eq!(settings.slots.len(), 2);
        assert_eq!(settings.profiles.len(), 2);
        assert_eq!(settings.assignments_for_slot(0).count(), 2);
    }

    #[test]
    fn minimal_document_is_empty_settings() {
        let settings = parse_settings("version: 1\n").unwrap();
        assert!(settings.slots.is_empty());
        assert!(settings.assignments.is_empty());
    }
}

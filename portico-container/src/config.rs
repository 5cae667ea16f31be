//! Container configuration.

use serde::{Deserialize, Serialize};

use crate::profile::Profile;

/// Settings fixed when a container is created.
///
/// Deserializable, so it can come straight from an application's config
/// file:
///
/// ```
/// use portico_container::config::ContainerConfig;
/// use portico_container::profile::Profile;
///
/// let config: ContainerConfig = serde_json::from_str(
///     r#"{ "profile": "Production", "allowed_sources": ["app::adapters"] }"#,
/// ).unwrap();
/// assert_eq!(config.profile, Some(Profile::PRODUCTION));
/// assert!(!config.allow_override);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Active environment tag. `None` disables profile filtering.
    pub profile: Option<Profile>,
    /// Replace existing plain registrations instead of failing.
    pub allow_override: bool,
    /// Discovery allow-list; stored and exposed, never interpreted.
    pub allowed_sources: Option<Vec<String>>,
}

impl ContainerConfig {
    pub fn with_profile(profile: impl Into<Profile>) -> Self {
        Self {
            profile: Some(profile.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ContainerConfig::default();
        assert_eq!(config.profile, None);
        assert!(!config.allow_override);
        assert_eq!(config.allowed_sources, None);
    }

    #[test]
    fn serde_roundtrip_lowercases_profile() {
        let config: ContainerConfig =
            serde_json::from_str(r#"{ "profile": "TEST", "allow_override": true }"#).unwrap();
        assert_eq!(config.profile, Some(Profile::TEST));
        assert!(config.allow_override);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["profile"], "test");
    }

    #[test]
    fn with_profile() {
        assert_eq!(ContainerConfig::with_profile("ci").profile, Some(Profile::CI));
    }
}

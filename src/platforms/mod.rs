/*!
 * Platform registry.
 *
 * Computes the ordered list of platforms a repair may try. The list is a
 * pure function of the configuration: the active platform comes first when
 * it carries credentials, followed by every other platform with credentials
 * in configured order.
 */

use crate::app_config::{Config, PlatformConfig};

/// Credential placeholder used by demo and local entries
pub const NO_KEY_REQUIRED: &str = "no_key_required";

/// A platform that may be used for repair attempts
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPlatform {
    /// The platform configuration
    pub platform: PlatformConfig,
    /// Position in the configured list
    pub index: usize,
    /// Name shown in logs and reports
    pub display_name: String,
}

impl ValidPlatform {
    fn new(platform: &PlatformConfig, index: usize) -> Self {
        let display_name = if platform.name.trim().is_empty() {
            format!("Platform {}", index)
        } else {
            platform.name.clone()
        };
        Self {
            platform: platform.clone(),
            index,
            display_name,
        }
    }
}

/// Whether a platform can be used for repair attempts
pub fn is_usable(platform: &PlatformConfig) -> bool {
    platform.has_credentials()
}

/// Ordered list of usable platforms, active one first
///
/// An empty result means there is nothing to retry against; callers treat
/// that as a configuration error.
pub fn valid_platforms(config: &Config) -> Vec<ValidPlatform> {
    let active = config.activate_platform;
    let mut valid = Vec::with_capacity(config.platforms.len());

    if let Some(platform) = config.platforms.get(active) {
        if is_usable(platform) {
            valid.push(ValidPlatform::new(platform, active));
        }
    }

    valid.extend(
        config
            .platforms
            .iter()
            .enumerate()
            .filter(|(index, platform)| *index != active && is_usable(platform))
            .map(|(index, platform)| ValidPlatform::new(platform, index)),
    );

    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::ApiFormat;

    fn platforms(keys: &[&str]) -> Vec<PlatformConfig> {
        keys.iter()
            .enumerate()
            .map(|(i, key)| PlatformConfig::new(format!("p{}", i), ApiFormat::OpenAI).with_keys([*key]))
            .collect()
    }

    fn config(keys: &[&str], active: usize) -> Config {
        Config {
            platforms: platforms(keys),
            activate_platform: active,
            ..Config::default()
        }
    }

    fn indices(valid: &[ValidPlatform]) -> Vec<usize> {
        valid.iter().map(|v| v.index).collect()
    }

    #[test]
    fn test_validPlatforms_shouldPlaceActiveFirst() {
        let config = config(&["k0", NO_KEY_REQUIRED, "k2", "k3"], 2);
        assert_eq!(indices(&valid_platforms(&config)), vec![2, 0, 3]);
    }

    #[test]
    fn test_validPlatforms_withUnusableActive_shouldKeepConfiguredOrder() {
        let config = config(&["k0", "", "k2"], 1);
        assert_eq!(indices(&valid_platforms(&config)), vec![0, 2]);
    }

    #[test]
    fn test_validPlatforms_withAllSentinel_shouldBeEmpty() {
        let config = config(&[NO_KEY_REQUIRED; 14], 0);
        assert!(valid_platforms(&config).is_empty());
    }

    #[test]
    fn test_validPlatforms_withActiveOutOfRange_shouldListAllUsable() {
        let config = config(&["k0", "k1"], 7);
        assert_eq!(indices(&valid_platforms(&config)), vec![0, 1]);
    }

    #[test]
    fn test_validPlatforms_shouldBeDeterministic() {
        let config = config(&["a", "", "b", NO_KEY_REQUIRED, "c"], 4);
        assert_eq!(valid_platforms(&config), valid_platforms(&config));
        assert_eq!(indices(&valid_platforms(&config)), vec![4, 0, 2]);
    }

    #[test]
    fn test_validPlatform_displayName_shouldFallBackToIndex() {
        let mut config = config(&["k0"], 0);
        config.platforms[0].name = String::new();
        assert_eq!(valid_platforms(&config)[0].display_name, "Platform 0");
    }
}

/*!
 * Tests for the valid-platform list
 */

use transfix::app_config::{ApiFormat, PlatformConfig};
use transfix::platforms::{NO_KEY_REQUIRED, valid_platforms};

use crate::common::{config_with, numbered_platforms, platform};

fn indices(platforms: Vec<PlatformConfig>, active: usize) -> Vec<usize> {
    valid_platforms(&config_with(platforms, active))
        .into_iter()
        .map(|p| p.index)
        .collect()
}

#[test]
fn test_validPlatforms_fourteenConfigured_twoUsable_shouldPutActiveFirst() {
    assert_eq!(indices(numbered_platforms(14, &[10, 12]), 12), vec![12, 10]);
}

#[test]
fn test_validPlatforms_allSentinel_shouldBeEmpty() {
    assert!(indices(numbered_platforms(14, &[]), 3).is_empty());
}

#[test]
fn test_validPlatforms_singleUsableActive_shouldHaveOneEntry() {
    let valid = valid_platforms(&config_with(numbered_platforms(5, &[2]), 2));
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].index, 2);
    assert_eq!(valid[0].display_name, "p2");
}

#[test]
fn test_validPlatforms_everyActiveChoice_shouldKeepInvariants() {
    let usable = [1, 3, 4, 7];
    for active in 0..8 {
        let result = indices(numbered_platforms(8, &usable), active);

        // Exactly the usable set
        let mut sorted = result.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, usable.to_vec(), "active {}", active);

        // Active first when usable, others in configured order
        let rest: Vec<usize> = if usable.contains(&active) {
            assert_eq!(result[0], active);
            result[1..].to_vec()
        } else {
            result.clone()
        };
        assert!(rest.windows(2).all(|w| w[0] < w[1]), "active {}: {:?}", active, result);
    }
}

#[test]
fn test_validPlatforms_blankOrSentinelKeys_shouldBeExcluded() {
    let platforms = vec![
        platform("blank", "   "),
        PlatformConfig::new("empty", ApiFormat::Anthropic),
        platform("sentinel", NO_KEY_REQUIRED),
        PlatformConfig::new("mixed", ApiFormat::Google).with_keys([NO_KEY_REQUIRED, "real"]),
        PlatformConfig::new("local", ApiFormat::SakuraLLM),
    ];
    assert_eq!(indices(platforms, 0), vec![3]);
}

#[test]
fn test_validPlatforms_shouldBeDeterministic() {
    let config = config_with(numbered_platforms(6, &[0, 2, 5]), 5);
    assert_eq!(valid_platforms(&config), valid_platforms(&config));
}

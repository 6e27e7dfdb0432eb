//! Capability merge policy for model refreshes.
//!
//! Fresh catalog values replace stored ones, except where the user pinned
//! a field by hand. Pinned values win and the overrides carry forward.

use std::collections::HashMap;

use parley_types::provider::{ManualOverrides, ModelCapabilities};

/// Merge freshly detected capabilities with the stored entry for one model.
pub fn merge_capabilities(
    fresh: ModelCapabilities,
    stored: Option<&ModelCapabilities>,
) -> ModelCapabilities {
    let Some(overrides) = stored.and_then(|s| s.manual_overrides) else {
        return fresh;
    };
    apply_overrides(fresh, overrides)
}

fn apply_overrides(mut caps: ModelCapabilities, overrides: ManualOverrides) -> ModelCapabilities {
    if let Some(vision) = overrides.vision {
        caps.vision = vision;
    }
    if let Some(audio) = overrides.audio {
        caps.audio = audio;
    }
    if let Some(files) = overrides.files {
        caps.files = files;
    }
    if let Some(multimodal) = overrides.multimodal {
        caps.multimodal = multimodal;
    }
    caps.manual_overrides = Some(overrides);
    caps
}

/// Merge a refreshed capability map into the stored one for a model list.
///
/// Models missing from `fresh` keep their stored entry unchanged, overrides
/// included; with no stored entry they get none. Models outside `models`
/// are dropped.
pub fn merge_capability_map(
    models: &[String],
    fresh: &HashMap<String, ModelCapabilities>,
    stored: &HashMap<String, ModelCapabilities>,
) -> HashMap<String, ModelCapabilities> {
    models
        .iter()
        .filter_map(|model| {
            let previous = stored.get(model);
            let merged = match fresh.get(model) {
                Some(caps) => merge_capabilities(caps.clone(), previous),
                None => previous.cloned()?,
            };
            Some((model.clone(), merged))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_vision() -> ModelCapabilities {
        ModelCapabilities {
            vision: true,
            multimodal: true,
            context_length: Some(128_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_manual_override_wins() {
        let stored = ModelCapabilities {
            manual_overrides: Some(ManualOverrides {
                vision: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge_capabilities(fresh_vision(), Some(&stored));

        assert!(!merged.vision);
        assert!(merged.multimodal);
        assert_eq!(merged.context_length, Some(128_000));
        assert_eq!(merged.manual_overrides.unwrap().vision, Some(false));
    }

    #[test]
    fn test_no_overrides_takes_fresh() {
        let stored = ModelCapabilities {
            audio: true,
            ..Default::default()
        };
        let merged = merge_capabilities(fresh_vision(), Some(&stored));
        assert_eq!(merged, fresh_vision());
        assert_eq!(merge_capabilities(fresh_vision(), None), fresh_vision());
    }

    #[test]
    fn test_map_merge_keeps_stored_when_catalog_misses_model() {
        let models = vec!["gpt-4o".to_string(), "local-model".to_string()];
        let fresh = HashMap::from([("gpt-4o".to_string(), fresh_vision())]);
        let stored = HashMap::from([
            (
                "local-model".to_string(),
                ModelCapabilities {
                    files: true,
                    ..Default::default()
                },
            ),
            ("retired".to_string(), ModelCapabilities::default()),
        ]);

        let merged = merge_capability_map(&models, &fresh, &stored);
        assert_eq!(merged.len(), 2);
        assert!(merged["gpt-4o"].vision);
        assert!(merged["local-model"].files);
        assert!(!merged.contains_key("retired"));
    }

    #[test]
    fn test_map_merge_omits_model_unknown_everywhere() {
        let models = vec!["brand-new".to_string()];
        let merged = merge_capability_map(&models, &HashMap::new(), &HashMap::new());
        assert!(merged.is_empty());
    }
}

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Options the bundled backend and downloader understand from the
/// `quantization` mapping. Anything else in the mapping is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationOptions {
    /// Preferred GGUF weight variant, e.g. "Q4_K_M"
    pub variant: Option<String>,
    /// Memory-map the weights instead of reading them into memory
    pub use_mmap: bool,
    /// Lock the weights in RAM
    pub use_mlock: bool,
}

impl Default for QuantizationOptions {
    fn default() -> Self {
        Self {
            variant: None,
            use_mmap: true,
            use_mlock: false,
        }
    }
}

impl QuantizationOptions {
    pub fn from_map(map: &BTreeMap<String, Value>) -> Self {
        let mut options = Self::default();
        let mut load_in_4bit = false;
        let mut load_in_8bit = false;

        for (key, value) in map {
            match key.as_str() {
                "variant" => match value.as_str() {
                    Some(variant) if !variant.trim().is_empty() => {
                        options.variant = Some(variant.trim().to_string());
                    }
                    _ => warn!(?value, "Ignoring quantization.variant: expected a non-empty string"),
                },
                "use_mmap" => match value.as_bool() {
                    Some(flag) => options.use_mmap = flag,
                    None => warn!(?value, "Ignoring quantization.use_mmap: expected a boolean"),
                },
                "use_mlock" => match value.as_bool() {
                    Some(flag) => options.use_mlock = flag,
                    None => warn!(?value, "Ignoring quantization.use_mlock: expected a boolean"),
                },
                "load_in_4bit" => load_in_4bit = value.as_bool().unwrap_or(false),
                "load_in_8bit" => load_in_8bit = value.as_bool().unwrap_or(false),
                other => debug!(key = other, "Quantization option not used by this backend"),
            }
        }

        if options.variant.is_none() {
            if load_in_4bit {
                options.variant = Some("Q4_K_M".to_string());
            } else if load_in_8bit {
                options.variant = Some("Q8_0".to_string());
            }
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> BTreeMap<String, Value> {
        value
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn test_empty_map_gives_defaults() {
        let options = QuantizationOptions::from_map(&BTreeMap::new());
        assert_eq!(options, QuantizationOptions::default());
        assert!(options.use_mmap);
        assert!(!options.use_mlock);
    }

    #[test]
    fn test_explicit_variant_wins_over_bit_flags() {
        let options = QuantizationOptions::from_map(&map(json!({
            "variant": "Q5_K_M",
            "load_in_4bit": true
        })));
        assert_eq!(options.variant.as_deref(), Some("Q5_K_M"));
    }

    #[test]
    fn test_bit_flags_select_variant() {
        let four = QuantizationOptions::from_map(&map(json!({ "load_in_4bit": true })));
        assert_eq!(four.variant.as_deref(), Some("Q4_K_M"));

        let eight = QuantizationOptions::from_map(&map(json!({ "load_in_8bit": true })));
        assert_eq!(eight.variant.as_deref(), Some("Q8_0"));
    }

    #[test]
    fn test_wrong_types_are_ignored() {
        let options = QuantizationOptions::from_map(&map(json!({
            "use_mmap": "yes",
            "use_mlock": true,
            "variant": 4,
            "bnb_4bit_compute_dtype": "float16"
        })));
        assert!(options.use_mmap);
        assert!(options.use_mlock);
        assert_eq!(options.variant, None);
    }
}

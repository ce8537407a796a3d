//! Layered configuration loading.
//!
//! Layers are applied in order: built-in defaults, an optional user JSON
//! file, then dotted `key=value` overrides such as `split.split_ratio=0.1`.
//! Override values are parsed as JSON when possible and taken as plain
//! strings otherwise, so `data.path=/data/x.csv` needs no quoting. A value
//! that parses as JSON but does not fit its field (`data.name=2024`) falls
//! back to the plain string.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::PipelineConfig;
use crate::error::{PreprocessingError, Result, ResultExt};

/// Build a validated configuration from defaults, a file and overrides.
pub fn load_config(file: Option<&Path>, overrides: &[String]) -> Result<PipelineConfig> {
    let mut value = serde_json::to_value(PipelineConfig::default())?;

    if let Some(path) = file {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read configuration '{}'", path.display()))?;
        let user: Value = serde_json::from_str(&content).map_err(|e| {
            PreprocessingError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })?;
        if !user.is_object() {
            return Err(PreprocessingError::InvalidConfiguration(format!(
                "{}: top-level value must be an object",
                path.display()
            )));
        }
        debug!("Loaded configuration file {}", path.display());
        merge(&mut value, user);
    }

    for item in overrides {
        let (key, raw) = split_override(item)?;
        let mut layered = value.clone();
        set_key(&mut layered, key, parse_value(raw))?;
        if !fits(&layered) {
            let mut as_string = value.clone();
            set_key(&mut as_string, key, Value::String(raw.to_string()))?;
            if fits(&as_string) {
                layered = as_string;
            }
        }
        value = layered;
    }

    let config: PipelineConfig = serde_json::from_value(value)
        .map_err(|e| PreprocessingError::InvalidConfiguration(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

fn split_override(item: &str) -> Result<(&str, &str)> {
    let (key, raw) = item.split_once('=').ok_or_else(|| {
        PreprocessingError::InvalidConfiguration(format!(
            "override '{}' is not of the form key=value",
            item
        ))
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(PreprocessingError::InvalidConfiguration(format!(
            "override '{}' has an empty key",
            item
        )));
    }
    Ok((key, raw))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn fits(value: &Value) -> bool {
    PipelineConfig::deserialize(value).is_ok()
}

/// Set one dotted key of a configuration tree.
///
/// Every key segment must already exist; unknown keys are rejected.
fn set_key(target: &mut Value, key: &str, value: Value) -> Result<()> {
    let mut node = target;
    let segments: Vec<&str> = key.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| unknown_key(key))?;

    for segment in parents {
        node = node
            .as_object_mut()
            .and_then(|map| map.get_mut(*segment))
            .ok_or_else(|| unknown_key(key))?;
    }

    let map: &mut Map<String, Value> = node.as_object_mut().ok_or_else(|| unknown_key(key))?;
    if !map.contains_key(*last) {
        return Err(unknown_key(key));
    }
    debug!("Override {} = {}", key, value);
    map.insert(last.to_string(), value);
    Ok(())
}

fn unknown_key(key: &str) -> PreprocessingError {
    PreprocessingError::InvalidConfiguration(format!("unknown configuration key '{}'", key))
}

/// Recursively merge `overlay` into `base`; objects merge, everything else replaces.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::SplitKey;
    use crate::stages::StageKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_only() {
        let config = load_config(None, &[]).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_file_then_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"data": {"path": "/data/uspto.csv", "proc_dir": "/out"},
                "split": {"split_ratio": 0.2, "index_column": "products"}}"#,
        )
        .unwrap();

        let overrides = vec![
            "split.split_ratio=0.1".to_string(),
            "common.sequence=[\"import\", \"split\"]".to_string(),
            "data.name=run1".to_string(),
        ];
        let config = load_config(Some(path.as_path()), &overrides).unwrap();

        assert_eq!(config.data.path, Some(PathBuf::from("/data/uspto.csv")));
        assert_eq!(config.data.name.as_deref(), Some("run1"));
        assert_eq!(config.split.split_ratio, 0.1);
        assert_eq!(config.split.index_column, SplitKey::Products);
        assert_eq!(config.common.sequence, vec![StageKind::Import, StageKind::Split]);
        // Untouched sections keep their defaults.
        assert_eq!(config.preprocess.max_reactants, 10);
    }

    #[test]
    fn test_numeric_looking_value_for_string_field() {
        let overrides = vec![
            "data.name=2024".to_string(),
            "split.hash_seed=7".to_string(),
            "common.reaction_column_name=true".to_string(),
        ];
        let config = load_config(None, &overrides).unwrap();
        assert_eq!(config.data.name.as_deref(), Some("2024"));
        assert_eq!(config.split.hash_seed, 7);
        assert_eq!(config.common.reaction_column_name, "true");
    }

    #[test]
    fn test_unknown_override_key() {
        let err = load_config(None, &["split.ratio=0.1".to_string()]).unwrap_err();
        assert!(err.to_string().contains("split.ratio"));
        assert!(load_config(None, &["nosection.x=1".to_string()]).is_err());
        assert!(load_config(None, &["split.split_ratio".to_string()]).is_err());
    }

    #[test]
    fn test_invalid_value_rejected_after_layering() {
        let err = load_config(None, &["split.split_ratio=0.6".to_string()]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    }

    #[test]
    fn test_unknown_file_field_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"split": {"splt_ratio": 0.2}}"#).unwrap();
        assert!(load_config(Some(path.as_path()), &[]).is_err());
    }
}

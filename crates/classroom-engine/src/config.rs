//! Configuration for the classroom engine.
//!
//! Settings are read from `classroom.json`. Every field is optional; a missing
//! file means defaults throughout.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "classroom.json";

/// Default weight of one exercise in an enrollment's point total.
const fn default_points_per_exercise() -> u32 {
    10
}

/// Default max score for authored exercises that omit one.
const fn default_max_score() -> u32 {
    100
}

/// Default store snapshot path.
fn default_data_file() -> String {
    ".classroom/store.json".to_string()
}

/// Default interval between periodic snapshots.
const fn default_snapshot_interval() -> u64 {
    30
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Points each exercise contributes to `totalPoints`.
    #[serde(default = "default_points_per_exercise")]
    pub points_per_exercise: u32,

    /// Max score given to authored exercises without one.
    #[serde(default = "default_max_score")]
    pub default_max_score: u32,

    /// Where the store snapshot is kept.
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Seconds between periodic snapshots while serving.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            points_per_exercise: default_points_per_exercise(),
            default_max_score: default_max_score(),
            data_file: default_data_file(),
            snapshot_interval_secs: default_snapshot_interval(),
        }
    }
}

impl Config {
    /// Loads `classroom.json` from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            EngineError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `classroom.json` from `dir`, or defaults if there is none.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConfigParseError` for unreadable files or invalid
    /// JSON, and `EngineError::ConfigValidationError` for out-of-range values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(EngineError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| EngineError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.points_per_exercise == 0 {
            return Err(EngineError::config_validation(
                "pointsPerExercise must be greater than 0",
                "Set pointsPerExercise to at least 1 in your classroom.json",
            ));
        }

        if self.default_max_score == 0 {
            return Err(EngineError::config_validation(
                "defaultMaxScore must be greater than 0",
                "Set defaultMaxScore to at least 1 in your classroom.json",
            ));
        }

        if self.data_file.trim().is_empty() {
            return Err(EngineError::config_validation(
                "dataFile must not be empty",
                "Provide a snapshot path in your classroom.json (e.g. '.classroom/store.json')",
            ));
        }

        if self.snapshot_interval_secs == 0 {
            return Err(EngineError::config_validation(
                "snapshotIntervalSecs must be greater than 0",
                "Set snapshotIntervalSecs to at least 1 second in your classroom.json",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.json", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.points_per_exercise, 10);
        assert_eq!(config.default_max_score, 100);
        assert_eq!(config.data_file, ".classroom/store.json");
        assert_eq!(config.snapshot_interval_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialization_with_overrides() {
        let config: Config =
            serde_json::from_str(r#"{"pointsPerExercise": 5, "dataFile": "data.json"}"#).unwrap();
        assert_eq!(config.points_per_exercise, 5);
        assert_eq!(config.data_file, "data.json");
        assert_eq!(config.default_max_score, 100);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config: Config = serde_json::from_str(r#"{"somethingElse": true}"#).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file_valid_json() {
        let path = write_temp("classroom_valid", r#"{"defaultMaxScore": 20}"#);
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.default_max_score, 20);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let path = write_temp("classroom_invalid", "{ not valid json }");
        let err = Config::load_from_file(&path).unwrap_err();
        assert!(
            matches!(&err, EngineError::ConfigParseError { path: p, message } if *p == path && !message.is_empty()),
            "Expected ConfigParseError with correct path, got: {err:?}"
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config = Config::load_from_file(Path::new("/nonexistent/path/classroom.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_dir_finds_classroom_json() {
        let dir = std::env::temp_dir().join(format!("classroom_cfg_dir-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("classroom.json"), r#"{"snapshotIntervalSecs": 5}"#).unwrap();

        let config = Config::load_from_dir(&dir).unwrap();
        assert_eq!(config.snapshot_interval_secs, 5);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validation_rejects_zero_points() {
        let config = Config {
            points_per_exercise: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("pointsPerExercise"));
        assert!(err.contains("Suggestion"));
    }

    #[test]
    fn test_validation_rejects_empty_data_file() {
        let config = Config {
            data_file: "  ".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            EngineError::ConfigValidationError { .. }
        ));
    }

    #[test]
    fn test_load_from_file_validates_after_parsing() {
        let path = write_temp("classroom_zero_max", r#"{"defaultMaxScore": 0}"#);
        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, EngineError::ConfigValidationError { .. }));
        std::fs::remove_file(&path).ok();
    }
}

//! YAML document I/O shared by the host config and the preset store
//!
//! `read_yaml`/`write_yaml` are strict and report every failure. The
//! `load_config`/`save_config` pair on top is what the host calls: a broken
//! config file must never stop the flattener from starting.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::FlattenResult;

/// Read a YAML document; `Ok(None)` when the file does not exist
pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> FlattenResult<Option<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_yaml::from_str(&contents)?))
}

/// Write a YAML document, replacing `path` only once the new text is on disk
pub(crate) fn write_yaml<T: Serialize>(value: &T, path: &Path) -> FlattenResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(value)?;

    let staging = staging_path(path);
    std::fs::write(&staging, yaml)?;
    if let Err(e) = std::fs::rename(&staging, path) {
        // Best effort; the original error is the one worth reporting
        let _ = std::fs::remove_file(&staging);
        return Err(e.into());
    }
    Ok(())
}

/// `config.yaml` stages as `config.yaml.tmp` in the same directory
fn staging_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Load a config, falling back to `T::default()` when the file is missing
/// or unusable
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match read_yaml(path) {
        Ok(Some(config)) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("No config at {:?}, starting from defaults", path);
            T::default()
        }
        Err(e) => {
            log::warn!("Ignoring config at {:?} ({}), starting from defaults", path, e);
            T::default()
        }
    }
}

/// Save a config, creating its directory if needed
pub fn save_config<T: Serialize>(config: &T, path: &Path) -> anyhow::Result<()> {
    write_yaml(config, path).with_context(|| format!("Failed to save config to {:?}", path))?;
    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlattenerConfig;
    use crate::detection::Algorithm;
    use crate::error::FlattenError;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: FlattenerConfig = load_config(Path::new("/nonexistent/path/config.yaml"));
        assert_eq!(config, FlattenerConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = FlattenerConfig::default();
        config.flatten.target_pitch = 261.63;
        config.detection.algorithm = Algorithm::Dio;
        config.output.mix = 0.4;

        save_config(&config, &path).unwrap();
        let loaded: FlattenerConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        save_config(&FlattenerConfig::default(), &path).unwrap();
        save_config(&FlattenerConfig::default(), &path).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("config.yaml")]);
    }

    #[test]
    fn test_invalid_yaml_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "flatten: [this is not a map").unwrap();

        let loaded: FlattenerConfig = load_config(&path);
        assert_eq!(loaded, FlattenerConfig::default());
    }

    #[test]
    fn test_read_yaml_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        assert!(matches!(read_yaml::<FlattenerConfig>(&path), Ok(None)));

        std::fs::write(&path, "flatten: [this is not a map").unwrap();
        assert!(matches!(
            read_yaml::<FlattenerConfig>(&path),
            Err(FlattenError::Yaml(_))
        ));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "flatten:\n  target_pitch: 300.0\n").unwrap();

        let loaded: FlattenerConfig = load_config(&path);
        assert_eq!(loaded.flatten.target_pitch, 300.0);
        assert_eq!(loaded.tracking, FlattenerConfig::default().tracking);
    }
}

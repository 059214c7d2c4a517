//! Factory and user presets
//!
//! Presets are whole [`FlattenerConfig`] documents stored as YAML:
//!
//! ```text
//! presets/
//! ├── factory/   # read-only, shipped defaults
//! └── user/      # saved from the live host
//! ```
//!
//! A user preset shadows a factory preset of the same name.

use std::path::{Path, PathBuf};

use super::io::{read_yaml, write_yaml};
use super::FlattenerConfig;
use crate::error::{FlattenError, FlattenResult};

const FACTORY_FOLDER: &str = "factory";
const USER_FOLDER: &str = "user";

/// Name of the preset written by [`PresetStore::ensure_factory_defaults`]
pub const DEFAULT_PRESET_NAME: &str = "Default";

/// Where a listed preset lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetSource {
    Factory,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetEntry {
    pub name: String,
    pub source: PresetSource,
}

/// Preset folders rooted at one directory
#[derive(Debug, Clone)]
pub struct PresetStore {
    root: PathBuf,
}

impl PresetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn factory_dir(&self) -> PathBuf {
        self.root.join(FACTORY_FOLDER)
    }

    fn user_dir(&self) -> PathBuf {
        self.root.join(USER_FOLDER)
    }

    /// Write the factory default preset if it is missing
    pub fn ensure_factory_defaults(&self) -> FlattenResult<()> {
        let dir = self.factory_dir();
        std::fs::create_dir_all(&dir)?;
        std::fs::create_dir_all(self.user_dir())?;

        let path = dir.join(format!("{}.yaml", DEFAULT_PRESET_NAME));
        if !path.exists() {
            write_yaml(&FlattenerConfig::default(), &path)?;
            log::info!("ensure_factory_defaults: Wrote {:?}", path);
        }
        Ok(())
    }

    /// Factory presets first, then user presets, each sorted by name
    pub fn list(&self) -> Vec<PresetEntry> {
        let factory = list_yaml_files_in(&self.factory_dir())
            .into_iter()
            .map(|name| PresetEntry {
                name,
                source: PresetSource::Factory,
            });
        let user = list_yaml_files_in(&self.user_dir())
            .into_iter()
            .map(|name| PresetEntry {
                name,
                source: PresetSource::User,
            });
        factory.chain(user).collect()
    }

    /// Load a preset, preferring the user copy over the factory one
    pub fn load(&self, name: &str) -> FlattenResult<FlattenerConfig> {
        validate_name(name)?;
        let file = format!("{}.yaml", name);
        for path in [self.user_dir().join(&file), self.factory_dir().join(&file)] {
            if let Some(config) = read_yaml::<FlattenerConfig>(&path)? {
                log::info!("load_preset: Loaded {:?}", path);
                return Ok(config.sanitized());
            }
        }
        Err(FlattenError::PresetNotFound(name.to_string()))
    }

    /// Save a user preset, replacing any previous user preset of that name
    pub fn save_user(&self, name: &str, config: &FlattenerConfig) -> FlattenResult<()> {
        validate_name(name)?;
        let path = self.user_dir().join(format!("{}.yaml", name));
        write_yaml(config, &path)?;
        log::info!("save_preset: Saved '{}' to {:?}", name, path);
        Ok(())
    }

    /// Delete a user preset; factory presets are read-only
    pub fn delete_user(&self, name: &str) -> FlattenResult<()> {
        validate_name(name)?;
        let file = format!("{}.yaml", name);
        let path = self.user_dir().join(&file);
        if !path.exists() {
            if self.factory_dir().join(&file).exists() {
                return Err(FlattenError::ReadOnlyPreset(name.to_string()));
            }
            return Err(FlattenError::PresetNotFound(name.to_string()));
        }

        std::fs::remove_file(&path)?;
        log::info!("delete_preset: Deleted '{}'", name);
        Ok(())
    }
}

fn validate_name(name: &str) -> FlattenResult<()> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed != name
        || name.contains(['/', '\\'])
        || name == "."
        || name == "..";
    if bad {
        return Err(FlattenError::InvalidPresetName(name.to_string()));
    }
    Ok(())
}

/// `.yaml` file stems in a directory, sorted
fn list_yaml_files_in(folder: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(entries) = std::fs::read_dir(folder) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "yaml") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().to_string());
                }
            }
        }
    }
    names.sort();
    names
}

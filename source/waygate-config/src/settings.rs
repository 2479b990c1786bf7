//! Settings for the filter engine: where scripts live on disk, how often the
//! directories are rescanned, and which file suffix is eligible.
//!
//! Loading follows the same two-layer shape as the rest of the gateway's
//! ambient config: a TOML file provides the base, CLI flags override it.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::error::SettingsError;

/// The three well-known stage directories, plus any number of user-named
/// custom kinds (`kind name -> directory`).
#[derive(Debug, Clone)]
pub struct FilterDirectories {
    pub pre: PathBuf,
    pub route: PathBuf,
    pub post: PathBuf,
    pub error: Option<PathBuf>,
    pub custom: BTreeMap<String, PathBuf>,
}

impl FilterDirectories {
    /// All directories paired with the filter kind they feed, in a
    /// deterministic order (pre, route, post, error, then custom sorted by
    /// name).
    pub fn iter(&self) -> impl Iterator<Item = (String, &PathBuf)> {
        let fixed = [
            ("pre".to_string(), Some(&self.pre)),
            ("route".to_string(), Some(&self.route)),
            ("post".to_string(), Some(&self.post)),
            ("error".to_string(), self.error.as_ref()),
        ];

        fixed
            .into_iter()
            .filter_map(|(kind, dir)| dir.map(|d| (kind, d)))
            .chain(self.custom.iter().map(|(k, v)| (k.clone(), v)))
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub directories: FilterDirectories,
    pub poll_interval: Duration,
    pub script_extension: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            directories: FilterDirectories {
                pre: PathBuf::from("filters/pre"),
                route: PathBuf::from("filters/route"),
                post: PathBuf::from("filters/post"),
                error: Some(PathBuf::from("filters/error")),
                custom: BTreeMap::new(),
            },
            poll_interval: Duration::from_secs(5),
            script_extension: "rhai".to_string(),
        }
    }
}

/// On-disk representation, deserialized straight from TOML. Every field is
/// optional so a partial file can still be layered on top of defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub pre_dir: Option<PathBuf>,
    pub route_dir: Option<PathBuf>,
    pub post_dir: Option<PathBuf>,
    pub error_dir: Option<PathBuf>,
    pub custom_dirs: BTreeMap<String, PathBuf>,
    pub poll_interval: Option<String>,
    pub script_extension: Option<String>,
}

impl RawSettings {
    pub fn from_file(path: &std::path::Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn into_settings(self) -> Result<EngineSettings, SettingsError> {
        let defaults = EngineSettings::default();

        let poll_interval = match self.poll_interval {
            Some(raw) => humantime::parse_duration(&raw).map_err(|source| SettingsError::BadInterval { raw, source })?,
            None => defaults.poll_interval,
        };

        Ok(EngineSettings {
            directories: FilterDirectories {
                pre: self.pre_dir.unwrap_or(defaults.directories.pre),
                route: self.route_dir.unwrap_or(defaults.directories.route),
                post: self.post_dir.unwrap_or(defaults.directories.post),
                error: self.error_dir.or(defaults.directories.error),
                custom: self.custom_dirs,
            },
            poll_interval,
            script_extension: self.script_extension.unwrap_or(defaults.script_extension),
        })
    }
}

//! Settings profiles
//!
//! A profile is a complete settings file kept next to the main settings
//! file. When the main file names a profile, every setting is read from
//! that profile instead.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::AppConfig;

/// Files in the settings directory that are never profiles
const RESERVED_FILES: &[&str] = &["settings.json", "cache.json"];

/// Outcome of switching profiles
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileSelection {
    /// File name of the profile, always ending in `.json`
    pub name: String,
    pub path: PathBuf,
    /// Whether the profile did not exist and was created with defaults
    pub created: bool,
}

/// Lists, creates and selects profiles in one directory
#[derive(Clone, Debug)]
pub struct ProfileManager {
    base_dir: PathBuf,
    settings_name: Option<String>,
}

impl ProfileManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            settings_name: None,
        }
    }

    /// Manager for the profiles stored beside a settings file
    pub fn for_settings(settings_path: &Path) -> Self {
        let base_dir = settings_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            base_dir,
            settings_name: settings_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Profile file names, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir).context("Failed to read profile directory")? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if self.is_reserved(&name) {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    fn is_reserved(&self, name: &str) -> bool {
        RESERVED_FILES.contains(&name) || self.settings_name.as_deref() == Some(name)
    }

    /// Path of a profile; `.json` is appended when missing
    pub fn profile_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.base_dir.join(profile_file_name(name)?))
    }

    /// Make `name` the active profile of the settings file, creating the
    /// profile with default settings first if it does not exist
    pub fn select(&self, settings_path: &Path, name: &str) -> Result<ProfileSelection> {
        let name = profile_file_name(name)?;
        if self.is_reserved(&name) {
            bail!("{name} is reserved and cannot be used as a profile");
        }

        std::fs::create_dir_all(&self.base_dir).context("Failed to create profile directory")?;
        let path = self.base_dir.join(&name);

        let created = !path.exists();
        if created {
            let profile = AppConfig {
                tests_dir: Some(self.base_dir.join("tests")),
                ..AppConfig::default()
            };
            profile.save(&path)?;
            info!("Created profile {}", path.display());
        }

        let mut settings = AppConfig::load_or_default(settings_path)?;
        settings.profile = Some(name.clone());
        settings.save(settings_path)?;
        debug!("Active profile of {} is now {}", settings_path.display(), name);

        Ok(ProfileSelection {
            name,
            path,
            created,
        })
    }
}

/// Normalize a profile name to its file name
pub fn profile_file_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        bail!("Invalid profile name: {name:?}");
    }

    if name.to_lowercase().ends_with(".json") {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}.json"))
    }
}

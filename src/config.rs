//! Scheduler configuration.
//!
//! Configuration can be loaded from:
//! 1. a TOML file with a `[scheduler]` table
//! 2. environment variables with the `SCHEDULE_TASK_` prefix
//!
//! Environment variables override the file.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [scheduler]
//! api_level = 21
//! max_pending_triggers = 64
//! state_path = "/var/lib/app/tasks.json"
//! package_name = "com.example.app"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dispatch::CapabilityProfile;
use crate::error::SchedulerError;

/// Everything the [`Scheduler`](crate::Scheduler) needs from its host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Explicit capability profile. Takes precedence over `api_level`.
    pub capability: Option<CapabilityProfile>,

    /// Platform API level the profile is derived from when `capability` is
    /// unset.
    pub api_level: Option<u32>,

    /// Per-mechanism cap on pending triggers. Unlimited when unset.
    pub max_pending_triggers: Option<usize>,

    /// Where to keep the registry snapshot. Memory-only when unset.
    pub state_path: Option<PathBuf>,

    /// Platform tag added to every trigger payload.
    pub package_name: String,
}

impl SchedulerConfig {
    /// Parses configuration from TOML content.
    ///
    /// A missing `[scheduler]` table yields the defaults.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] if the TOML is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self, SchedulerError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            scheduler: SchedulerConfig,
        }

        let full: FullConfig = toml::from_str(content).map_err(|e| SchedulerError::Config(e.to_string()))?;
        Ok(full.scheduler)
    }

    /// Loads configuration from a file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies `SCHEDULE_TASK_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("SCHEDULE_TASK_API_LEVEL").and_then(|v| v.parse().ok()) {
            self.api_level = Some(level);
        }
        if let Some(max) = lookup("SCHEDULE_TASK_MAX_PENDING").and_then(|v| v.parse().ok()) {
            self.max_pending_triggers = Some(max);
        }
        if let Some(path) = lookup("SCHEDULE_TASK_STATE_PATH") {
            self.state_path = Some(PathBuf::from(path));
        }
        if let Some(name) = lookup("SCHEDULE_TASK_PACKAGE_NAME") {
            self.package_name = name;
        }
    }

    /// The capability profile in effect.
    pub fn capability_profile(&self) -> CapabilityProfile {
        match (self.capability, self.api_level) {
            (Some(profile), _) => profile,
            (None, Some(level)) => CapabilityProfile::from_api_level(level),
            (None, None) => CapabilityProfile::default(),
        }
    }

    /// Sets the capability profile.
    pub fn with_capability(mut self, capability: CapabilityProfile) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Sets the platform API level.
    pub fn with_api_level(mut self, level: u32) -> Self {
        self.api_level = Some(level);
        self
    }

    /// Sets the per-mechanism pending trigger cap.
    pub fn with_max_pending_triggers(mut self, max: usize) -> Self {
        self.max_pending_triggers = Some(max);
        self
    }

    /// Sets the registry snapshot path.
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    /// Sets the platform package tag.
    pub fn with_package_name(mut self, name: impl Into<String>) -> Self {
        self.package_name = name.into();
        self
    }
}

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use siteflow_cloud::{PollPolicies, PollPolicy, STATUS_DIR};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that names the settings file directly
pub const CONFIG_PATH_ENV: &str = "SITEFLOW_CONFIG_PATH";

/// Per-user configuration directory (`~/.config/siteflow`)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("siteflow"))
}

/// Locate the settings file
///
/// Search order:
/// 1. `SITEFLOW_CONFIG_PATH` (must exist when set)
/// 2. `./siteflow.yaml`
/// 3. `./.siteflow/config.yaml`
/// 4. `~/.config/siteflow/config.yaml`
///
/// Running without a settings file is normal, so "not found" is `Ok(None)`.
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ExplicitPathMissing(path));
    }

    let current_dir = std::env::current_dir()?;
    let local = [
        current_dir.join("siteflow.yaml"),
        current_dir.join(STATUS_DIR).join("config.yaml"),
    ];
    if let Some(path) = local.into_iter().find(|p| p.is_file()) {
        return Ok(Some(path));
    }

    if let Ok(config_dir) = get_config_dir() {
        let global = config_dir.join("config.yaml");
        if global.is_file() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// Settings file contents
///
/// ```yaml
/// profile: prod
/// region: eu-west-1
/// status_dir: deploy/status
/// poll:
///   certificate: { attempts: 90, interval_secs: 20 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub status_dir: Option<PathBuf>,
    pub poll: PollSettings,
}

/// Overrides for the built-in wait policies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSettings {
    pub validation_records: Option<PollSetting>,
    pub certificate: Option<PollSetting>,
    pub deployment: Option<PollSetting>,
    pub teardown: Option<PollSetting>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSetting {
    pub attempts: u32,
    pub interval_secs: u64,
}

impl PollSetting {
    fn to_policy(self) -> PollPolicy {
        PollPolicy::new(self.attempts, Duration::from_secs(self.interval_secs))
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        // An empty file is a valid, empty configuration
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate(path)?;
        Ok(settings)
    }

    /// Find and load the settings file, falling back to defaults
    pub fn discover() -> Result<(Self, Option<PathBuf>)> {
        match find_settings_file()? {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let entries = [
            ("validation_records", self.poll.validation_records),
            ("certificate", self.poll.certificate),
            ("deployment", self.poll.deployment),
            ("teardown", self.poll.teardown),
        ];
        for (name, setting) in entries {
            if setting.is_some_and(|s| s.attempts == 0) {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    message: format!("poll.{}.attempts must be at least 1", name),
                });
            }
        }
        Ok(())
    }

    /// Directory that holds status files
    pub fn status_dir(&self) -> PathBuf {
        self.status_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(STATUS_DIR))
    }

    /// Built-in poll policies with this file's overrides applied
    pub fn poll_policies(&self) -> PollPolicies {
        let mut policies = PollPolicies::default();
        if let Some(s) = self.poll.validation_records {
            policies.validation_records = s.to_policy();
        }
        if let Some(s) = self.poll.certificate {
            policies.certificate = s.to_policy();
        }
        if let Some(s) = self.poll.deployment {
            policies.deployment = s.to_policy();
        }
        if let Some(s) = self.poll.teardown {
            policies.teardown = s.to_policy();
        }
        policies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("siteflow"));
    }

    #[test]
    #[serial]
    fn test_find_settings_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("siteflow.yaml"), "region: eu-west-1\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, find_settings_file);

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().unwrap().ends_with("siteflow.yaml"));
    }

    #[test]
    #[serial]
    fn test_root_file_wins_over_status_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let status_dir = temp_dir.path().join(STATUS_DIR);
        fs::create_dir(&status_dir).unwrap();
        fs::write(status_dir.join("config.yaml"), "region: us-west-2\n").unwrap();
        fs::write(temp_dir.path().join("siteflow.yaml"), "region: eu-west-1\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, find_settings_file);

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().unwrap().ends_with("siteflow.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_settings_file_in_status_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let status_dir = temp_dir.path().join(STATUS_DIR);
        fs::create_dir(&status_dir).unwrap();
        fs::write(status_dir.join("config.yaml"), "profile: dev\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, find_settings_file);

        std::env::set_current_dir(original_dir).unwrap();
        assert!(result.unwrap().unwrap().ends_with(".siteflow/config.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_settings_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "profile: custom\n").unwrap();

        let result = temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), find_settings_file);
        assert_eq!(result.unwrap(), Some(config_path));
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing.yaml");

        let result = temp_env::with_var(CONFIG_PATH_ENV, Some(&missing), find_settings_file);
        assert!(matches!(result, Err(ConfigError::ExplicitPathMissing(p)) if p == missing));
    }

    #[test]
    fn test_load_full_settings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("siteflow.yaml");
        fs::write(
            &path,
            "profile: prod\n\
             region: eu-west-1\n\
             status_dir: deploy/status\n\
             poll:\n  \
               certificate: { attempts: 90, interval_secs: 20 }\n  \
               teardown: { attempts: 5, interval_secs: 0 }\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.profile.as_deref(), Some("prod"));
        assert_eq!(settings.region.as_deref(), Some("eu-west-1"));
        assert_eq!(settings.status_dir(), PathBuf::from("deploy/status"));

        let policies = settings.poll_policies();
        let defaults = PollPolicies::default();
        assert_eq!(
            policies.certificate,
            PollPolicy::new(90, Duration::from_secs(20))
        );
        assert_eq!(policies.teardown, PollPolicy::new(5, Duration::ZERO));
        assert_eq!(policies.deployment, defaults.deployment);
        assert_eq!(policies.validation_records, defaults.validation_records);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("siteflow.yaml");
        fs::write(&path, "\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.status_dir(), PathBuf::from(".siteflow"));
        assert_eq!(settings.poll_policies(), PollPolicies::default());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("siteflow.yaml");
        fs::write(&path, "regoin: eu-west-1\n").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("siteflow.yaml"));
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("siteflow.yaml");
        fs::write(&path, "poll:\n  deployment: { attempts: 0, interval_secs: 5 }\n").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(err.to_string().contains("poll.deployment.attempts"));
    }
}
